//! Storage abstraction for movieindex.
//!
//! The [`DocumentStore`] trait is the single contract the ingestion pipeline
//! talks to. Two adapters implement it:
//!
//! | Adapter | Backend | Transport |
//! |---------|---------|-----------|
//! | [`SearchIndexStore`] | Elasticsearch | HTTP(S) REST via `reqwest` |
//! | [`DocumentDbStore`] | MongoDB | native driver connection pool |
//!
//! [`Backend`] wraps whichever adapter the configuration selects, so the
//! choice is made once, at open time, and never per call.
//!
//! # Lifecycle
//!
//! A store owns one backend connection. [`close`](DocumentStore::close)
//! consumes the store, so it cannot run twice. [`with_store`] runs a body
//! against a borrowed store and closes it on every exit path.

pub mod document_db;
pub mod search_index;

use async_trait::async_trait;

use crate::config::{Engine, StoreConfig};
use crate::error::{Result, StoreError};
use crate::models::MovieRecord;

pub use document_db::DocumentDbStore;
pub use search_index::SearchIndexStore;

/// Result of a successful [`DocumentStore::store`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The record was persisted under `id` (supplied or backend-generated).
    Stored { id: String },
    /// The record could not be encoded for the backend and was not written.
    Skipped { reason: String },
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored { .. })
    }
}

/// Uniform persistence contract over both backends.
///
/// "Not found" is `Ok(false)` / `Ok(0)`. Every `Err` is a configuration or
/// transport problem the caller must be able to tell apart from absence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of stored documents, scoped to one identifier when given.
    async fn count(&self, id: Option<&str>) -> Result<u64>;

    /// Whether a document with the record's identifier is already stored.
    ///
    /// A record with a blank id falls back to an unscoped count.
    async fn exists(&self, record: &MovieRecord) -> Result<bool> {
        Ok(self.count(record.catalog_id()).await? > 0)
    }

    /// Persist `record`, under `id` when one is supplied.
    ///
    /// Storing twice under the same `id` overwrites the first document.
    async fn store(&self, record: &MovieRecord, id: Option<&str>) -> Result<StoreOutcome>;

    /// Release the backend connection.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// The configured backend, selected once by [`Engine`].
#[derive(Debug)]
pub enum Backend {
    SearchIndex(SearchIndexStore),
    DocumentDb(DocumentDbStore),
}

impl Backend {
    /// Open the adapter described by `config`.
    ///
    /// The document database is pinged here, so unreachable servers and
    /// rejected credentials fail before the first record.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::SearchIndex(cfg) => Ok(Backend::SearchIndex(SearchIndexStore::new(cfg)?)),
            StoreConfig::DocumentDb(cfg) => {
                Ok(Backend::DocumentDb(DocumentDbStore::open(cfg).await?))
            }
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Backend::SearchIndex(_) => Engine::Elasticsearch,
            Backend::DocumentDb(_) => Engine::Mongodb,
        }
    }
}

#[async_trait]
impl DocumentStore for Backend {
    async fn count(&self, id: Option<&str>) -> Result<u64> {
        match self {
            Backend::SearchIndex(s) => s.count(id).await,
            Backend::DocumentDb(s) => s.count(id).await,
        }
    }

    async fn exists(&self, record: &MovieRecord) -> Result<bool> {
        match self {
            Backend::SearchIndex(s) => s.exists(record).await,
            Backend::DocumentDb(s) => s.exists(record).await,
        }
    }

    async fn store(&self, record: &MovieRecord, id: Option<&str>) -> Result<StoreOutcome> {
        match self {
            Backend::SearchIndex(s) => s.store(record, id).await,
            Backend::DocumentDb(s) => s.store(record, id).await,
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            Backend::SearchIndex(s) => s.close().await,
            Backend::DocumentDb(s) => s.close().await,
        }
    }
}

/// Run `body` against `store`, then close the store exactly once.
///
/// `close` runs whether the body returns `Ok` or `Err`. The body's error
/// wins over a close error; a close error after a successful body is
/// returned as-is.
///
/// ```no_run
/// # use movieindex::store::{with_store, DocumentStore, SearchIndexStore};
/// # async fn demo(store: SearchIndexStore) -> movieindex::error::Result<()> {
/// let total = with_store(store, async |s| s.count(None).await).await?;
/// println!("{} documents", total);
/// # Ok(())
/// # }
/// ```
pub async fn with_store<S, T, E, F>(store: S, body: F) -> std::result::Result<T, E>
where
    S: DocumentStore,
    E: From<StoreError>,
    F: AsyncFnOnce(&S) -> std::result::Result<T, E>,
{
    let result = body(&store).await;
    let closed = store.close().await;

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(E::from(e)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close store after error");
            Err(e)
        }
    }
}
