//! Elasticsearch-backed [`DocumentStore`] implementation.
//!
//! Every operation is one HTTP request built from the base URL validated at
//! construction plus the configured index name:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `count(None)` | `GET <base>/<index>/_search` with `{"size": 0}` |
//! | `count(Some(id))` | `GET <base>/<index>/_search` with an `ids` query |
//! | `store(rec, None)` | `POST <base>/<index>/<doc_type>` |
//! | `store(rec, Some(id))` | `POST <base>/<index>/<doc_type>/<id>` (overwrite) |
//!
//! Only 200 and 201 count as success. There is no retry or backoff here;
//! transport failures go straight back to the caller.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{DocumentStore, StoreOutcome};
use crate::config::SearchIndexConfig;
use crate::error::{Result, StoreError};
use crate::models::MovieRecord;

const USER_AGENT: &str = concat!("movieindex/", env!("CARGO_PKG_VERSION"));
const JSON_UTF8: &str = "application/json; charset=utf-8";
const BACKEND: &str = "elasticsearch";
const MAX_SUBJECT_CHARS: usize = 500;

/// HTTP adapter for an Elasticsearch index.
///
/// Holds no connection state beyond the `reqwest` client and the resolved
/// base URL.
#[derive(Debug)]
pub struct SearchIndexStore {
    client: reqwest::Client,
    config: SearchIndexConfig,
}

impl SearchIndexStore {
    pub fn new(config: &SearchIndexConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::config(format!(
                    "malformed source URL '{}': cannot carry a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl DocumentStore for SearchIndexStore {
    async fn count(&self, id: Option<&str>) -> Result<u64> {
        let id = normalize_id(id);
        let url = self.endpoint(&[self.config.index.as_str(), "_search"])?;
        let query = count_query(id);
        let query_text = query.to_string();

        debug!(%url, id, "counting documents");
        let resp = self
            .client
            .get(url)
            .header(CONTENT_TYPE, JSON_UTF8)
            .body(query_text.clone())
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !is_accepted(status) {
            if status == StatusCode::NOT_FOUND && is_missing_index(&text) {
                // Nothing was ever written to this index.
                debug!(index = %self.config.index, "index does not exist yet");
                return Ok(0);
            }
            return Err(StoreError::Rejected {
                operation: "count",
                status: status.as_u16(),
                subject: subject(id, &query_text),
                reason: reason_text(status, &text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| StoreError::InvalidResponse {
            backend: BACKEND,
            message: format!("search response is not JSON: {}", e),
        })?;
        total_hits(&body).ok_or_else(|| StoreError::InvalidResponse {
            backend: BACKEND,
            message: "search response has no hits.total".to_string(),
        })
    }

    async fn store(&self, record: &MovieRecord, id: Option<&str>) -> Result<StoreOutcome> {
        let id = normalize_id(id);

        let body = match serde_json::to_string(record) {
            Ok(body) => body,
            Err(e) => {
                let reason = format!("cannot encode record '{}' as JSON: {}", record.id, e);
                warn!(record = %record.id, error = %e, "skipping record");
                return Ok(StoreOutcome::Skipped { reason });
            }
        };

        let mut segments = vec![self.config.index.as_str(), self.config.doc_type.as_str()];
        if let Some(id) = id {
            segments.push(id);
        }
        let mut url = self.endpoint(&segments)?;
        if self.config.refresh {
            url.query_pairs_mut().append_pair("refresh", "wait_for");
        }

        debug!(%url, id, "storing document");
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_UTF8)
            .body(body.clone())
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !is_accepted(status) {
            return Err(StoreError::Rejected {
                operation: "store",
                status: status.as_u16(),
                subject: subject(id, &body),
                reason: reason_text(status, &text),
            });
        }

        let assigned = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("_id").and_then(Value::as_str).map(str::to_string))
            .or_else(|| id.map(str::to_string));

        match assigned {
            Some(id) => Ok(StoreOutcome::Stored { id }),
            None => Err(StoreError::InvalidResponse {
                backend: BACKEND,
                message: "index response has no _id".to_string(),
            }),
        }
    }

    async fn close(self) -> Result<()> {
        debug!(base_url = %self.config.base_url, "closing search index store");
        drop(self.client);
        Ok(())
    }
}

fn normalize_id(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|id| !id.is_empty())
}

fn is_accepted(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

fn count_query(id: Option<&str>) -> Value {
    match id {
        Some(id) => json!({ "size": 0, "query": { "ids": { "values": [id] } } }),
        None => json!({ "size": 0 }),
    }
}

/// Supplied id when there is one, otherwise the (truncated) request body.
fn subject(id: Option<&str>, body: &str) -> String {
    match id {
        Some(id) => format!("id '{}'", id),
        None => {
            let rendered: String = body.chars().take(MAX_SUBJECT_CHARS).collect();
            format!("document {}", rendered)
        }
    }
}

/// `hits.total` is a number before Elasticsearch 7 and `{value, relation}` after.
fn total_hits(body: &Value) -> Option<u64> {
    let total = body.get("hits")?.get("total")?;
    total
        .as_u64()
        .or_else(|| total.get("value").and_then(Value::as_u64))
}

fn is_missing_index(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| {
            v.pointer("/error/type")
                .and_then(Value::as_str)
                .map(|t| t == "index_not_found_exception")
        })
        .unwrap_or(false)
}

/// Extract the backend's reason text from an error response.
fn reason_text(status: StatusCode, text: &str) -> String {
    let parsed = serde_json::from_str::<Value>(text).ok();
    let reason = parsed.as_ref().and_then(|v| {
        v.pointer("/error/reason")
            .and_then(Value::as_str)
            .or_else(|| v.get("error").and_then(Value::as_str))
            .map(str::to_string)
    });

    reason
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(MAX_SUBJECT_CHARS).collect())
        })
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "unknown error".to_string())
}
