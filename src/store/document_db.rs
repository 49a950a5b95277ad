//! MongoDB-backed [`DocumentStore`] implementation.
//!
//! The adapter owns one driver [`Client`] (a connection pool) for its whole
//! lifetime and works on a single `database.collection` namespace.
//!
//! Identity: when an id is supplied it is written to `_id` and the document
//! is upserted with `replace_one`, so storing the same record twice leaves a
//! single document. Without an id the driver generates an `ObjectId`.
//!
//! Records BSON cannot represent (e.g. unsigned integers above `i64::MAX` in
//! the extra fields) are logged and reported as
//! [`StoreOutcome::Skipped`]; the store stays usable.

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Collection};
use std::fmt;
use tracing::{debug, warn};

use super::{DocumentStore, StoreOutcome};
use crate::config::DocumentDbConfig;
use crate::error::{Result, StoreError};
use crate::models::MovieRecord;

const APP_NAME: &str = "movieindex";

pub struct DocumentDbStore {
    client: Client,
    collection: Collection<Document>,
    namespace: String,
}

impl fmt::Debug for DocumentDbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentDbStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl DocumentDbStore {
    /// Build the client handle without talking to the server.
    ///
    /// The driver connects lazily; the first operation surfaces
    /// unreachable servers or bad credentials. Use [`open`](Self::open) to
    /// check up front.
    pub fn connect(config: &DocumentDbConfig) -> Result<Self> {
        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: config.host.clone(),
            port: Some(config.port),
        }];
        options.app_name = Some(APP_NAME.to_string());

        if let Some(creds) = &config.credentials {
            let mut credential = Credential::default();
            credential.username = Some(creds.user.clone());
            credential.password = creds.password.clone();
            credential.source = Some(creds.auth_source.clone());
            options.credential = Some(credential);
        }

        if let Some(timeout) = config.timeout {
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options)?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        Ok(Self {
            client,
            collection,
            namespace: format!("{}.{}", config.database, config.collection),
        })
    }

    /// Connect and ping the database.
    pub async fn open(config: &DocumentDbConfig) -> Result<Self> {
        let store = Self::connect(config)?;
        debug!(namespace = %store.namespace, host = %config.host, port = config.port, "pinging document database");
        store
            .client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl DocumentStore for DocumentDbStore {
    async fn count(&self, id: Option<&str>) -> Result<u64> {
        let filter = match normalize_id(id) {
            Some(id) => doc! { "_id": id },
            None => doc! {},
        };
        debug!(namespace = %self.namespace, ?filter, "counting documents");
        Ok(self.collection.count_documents(filter).await?)
    }

    async fn store(&self, record: &MovieRecord, id: Option<&str>) -> Result<StoreOutcome> {
        let id = normalize_id(id);

        let document = match encode_document(record, id) {
            Ok(document) => document,
            Err(reason) => return Ok(skip(record, reason)),
        };

        debug!(namespace = %self.namespace, id, "storing document");
        match id {
            Some(id) => {
                let result = self
                    .collection
                    .replace_one(doc! { "_id": id }, document)
                    .upsert(true)
                    .await;
                match result {
                    Ok(_) => Ok(StoreOutcome::Stored { id: id.to_string() }),
                    Err(e) => encoding_or_error(record, e),
                }
            }
            None => match self.collection.insert_one(document).await {
                Ok(inserted) => Ok(StoreOutcome::Stored {
                    id: render_id(&inserted.inserted_id),
                }),
                Err(e) => encoding_or_error(record, e),
            },
        }
    }

    async fn close(self) -> Result<()> {
        debug!(namespace = %self.namespace, "closing document database store");
        let Self {
            client, collection, ..
        } = self;
        drop(collection);
        client.shutdown().await;
        Ok(())
    }
}

fn normalize_id(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|id| !id.is_empty())
}

/// Encode a record as a BSON document, attaching `_id` when given.
pub fn encode_document(
    record: &MovieRecord,
    id: Option<&str>,
) -> std::result::Result<Document, String> {
    let mut document = bson::to_document(record)
        .map_err(|e| format!("cannot encode record '{}' as BSON: {}", record.id, e))?;
    if let Some(id) = id {
        document.insert("_id", id);
    }
    Ok(document)
}

fn skip(record: &MovieRecord, reason: String) -> StoreOutcome {
    warn!(record = %record.id, %reason, "skipping record");
    StoreOutcome::Skipped { reason }
}

/// Driver-side serialization failures are per-record skips; anything else
/// is a real failure.
fn encoding_or_error(record: &MovieRecord, err: mongodb::error::Error) -> Result<StoreOutcome> {
    match err.kind.as_ref() {
        ErrorKind::BsonSerialization(e) => Ok(skip(
            record,
            format!("cannot encode record '{}' as BSON: {}", record.id, e),
        )),
        _ => Err(StoreError::Database(err)),
    }
}

fn render_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentDbSection;
    use serde_json::json;

    fn overflowing_record() -> MovieRecord {
        let mut record = MovieRecord::with_id("tt0000001", "Too Many Votes");
        record.extra.insert("votes".to_string(), json!(u64::MAX));
        record
    }

    #[test]
    fn test_encode_document_sets_native_id() {
        let record = MovieRecord::with_id("tt0111161", "The Shawshank Redemption");
        let document = encode_document(&record, Some("tt0111161")).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "tt0111161");
        assert_eq!(document.get_str("name").unwrap(), "The Shawshank Redemption");
        assert!(document.get_array("cast").unwrap().is_empty());
    }

    #[test]
    fn test_encode_document_without_id_leaves_id_to_driver() {
        let record = MovieRecord::with_id("tt0111161", "The Shawshank Redemption");
        let document = encode_document(&record, None).unwrap();
        assert!(document.get("_id").is_none());
        assert_eq!(document.get_str("id").unwrap(), "tt0111161");
    }

    #[test]
    fn test_encode_document_rejects_out_of_range_integers() {
        let reason = encode_document(&overflowing_record(), Some("tt0000001")).unwrap_err();
        assert!(reason.contains("tt0000001"));
    }

    #[test]
    fn test_driver_serialization_error_is_a_skip() {
        let record = overflowing_record();
        let err = mongodb::error::Error::from(bson::to_document(&record).unwrap_err());

        match encoding_or_error(&record, err).unwrap() {
            StoreOutcome::Skipped { reason } => assert!(reason.contains("tt0000001")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_other_driver_errors_propagate() {
        let record = overflowing_record();
        let err = mongodb::error::Error::from(std::io::ErrorKind::ConnectionRefused);

        let err = encoding_or_error(&record, err).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_render_id() {
        assert_eq!(render_id(&Bson::String("tt1".into())), "tt1");
        let oid = bson::oid::ObjectId::new();
        assert_eq!(render_id(&Bson::ObjectId(oid)), oid.to_hex());
    }

    #[tokio::test]
    async fn test_unencodable_record_is_skipped_and_store_stays_usable() {
        let section: DocumentDbSection = toml::from_str(
            r#"
            host = "127.0.0.1"
            port = 1
            database = "movieindex_test"
            collection = "movies"
            timeout_secs = 1
            "#,
        )
        .unwrap();
        let store = DocumentDbStore::connect(&DocumentDbConfig::from_section(&section).unwrap())
            .unwrap();

        for _ in 0..2 {
            let outcome = store
                .store(&overflowing_record(), Some("tt0000001"))
                .await
                .unwrap();
            assert!(matches!(outcome, StoreOutcome::Skipped { .. }));
        }

        store.close().await.unwrap();
    }
}
