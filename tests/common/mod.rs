//! In-process Elasticsearch stand-in for integration tests.
//!
//! Implements just enough of the REST surface the search index adapter
//! uses: `GET /{index}/_search` (total hits, optional `ids` query) and
//! `POST /{index}/{type}[/{id}]` (index with overwrite by id).

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use movieindex::config::{SearchIndexConfig, SearchIndexSection};
use movieindex::models::{CastMember, MovieRecord};

/// A request as seen by the mock.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: &'static str,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct MockIndex {
    docs: Arc<Mutex<BTreeMap<String, Value>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    next_id: Arc<AtomicUsize>,
    /// When set, every request fails with this status.
    outage: Arc<Mutex<Option<StatusCode>>>,
    /// Ids whose index requests are refused with 400.
    refused: Arc<Mutex<HashSet<String>>>,
    /// Answer searches with `index_not_found_exception` until first write.
    lazy_index: Arc<Mutex<bool>>,
}

impl MockIndex {
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn documents(&self) -> BTreeMap<String, Value> {
        self.docs.lock().unwrap().clone()
    }

    pub fn set_outage(&self, status: Option<StatusCode>) {
        *self.outage.lock().unwrap() = status;
    }

    pub fn refuse(&self, id: &str) {
        self.refused.lock().unwrap().insert(id.to_string());
    }

    pub fn set_lazy_index(&self, lazy: bool) {
        *self.lazy_index.lock().unwrap() = lazy;
    }

    fn record(&self, method: &'static str, path: String, query: Option<String>, headers: &HeaderMap, body: &Bytes) {
        self.seen.lock().unwrap().push(SeenRequest {
            method,
            path,
            query,
            headers: headers.clone(),
            body: String::from_utf8_lossy(body).to_string(),
        });
    }

    fn outage_response(&self) -> Option<Response> {
        self.outage.lock().unwrap().map(|status| {
            (
                status,
                Json(json!({
                    "error": {"type": "cluster_block_exception", "reason": "cluster is read-only"},
                    "status": status.as_u16()
                })),
            )
                .into_response()
        })
    }
}

async fn search(
    State(mock): State<MockIndex>,
    Path(index): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.record("GET", format!("/{}/_search", index), query, &headers, &body);
    if let Some(resp) = mock.outage_response() {
        return resp;
    }
    if *mock.lazy_index.lock().unwrap() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {"type": "index_not_found_exception", "reason": format!("no such index [{}]", index)},
                "status": 404
            })),
        )
            .into_response();
    }

    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let docs = mock.docs.lock().unwrap();
    let total = match request.pointer("/query/ids/values").and_then(Value::as_array) {
        Some(ids) => ids
            .iter()
            .filter_map(Value::as_str)
            .filter(|id| docs.contains_key(*id))
            .count(),
        None => docs.len(),
    };

    Json(json!({
        "took": 1,
        "hits": {"total": {"value": total, "relation": "eq"}, "hits": []}
    }))
    .into_response()
}

fn write_document(mock: &MockIndex, index: &str, id: String, body: &Bytes) -> Response {
    if let Some(resp) = mock.outage_response() {
        return resp;
    }
    if mock.refused.lock().unwrap().contains(&id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {"type": "mapper_parsing_exception", "reason": "failed to parse field [year]"},
                "status": 400
            })),
        )
            .into_response();
    }
    let document: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    mock.set_lazy_index(false);
    let replaced = mock.docs.lock().unwrap().insert(id.clone(), document).is_some();
    let (status, result) = if replaced {
        (StatusCode::OK, "updated")
    } else {
        (StatusCode::CREATED, "created")
    };
    (
        status,
        Json(json!({"_index": index, "_id": id, "result": result})),
    )
        .into_response()
}

async fn index_generated(
    State(mock): State<MockIndex>,
    Path((index, doc_type)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.record("POST", format!("/{}/{}", index, doc_type), query, &headers, &body);
    let id = format!("gen-{}", mock.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    write_document(&mock, &index, id, &body)
}

async fn index_with_id(
    State(mock): State<MockIndex>,
    Path((index, doc_type, id)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.record("POST", format!("/{}/{}/{}", index, doc_type, id), query, &headers, &body);
    write_document(&mock, &index, id, &body)
}

/// Start the mock on an ephemeral port.
pub async fn spawn_mock() -> (MockIndex, SocketAddr) {
    let mock = MockIndex::default();
    let app = Router::new()
        .route("/{index}/_search", get(search))
        .route("/{index}/{doc_type}", post(index_generated))
        .route("/{index}/{doc_type}/{id}", post(index_with_id))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, addr)
}

pub fn section_for(addr: SocketAddr) -> SearchIndexSection {
    toml::from_str(&format!(
        r#"
        scheme = "http"
        host = "127.0.0.1"
        port = {}
        index = "movies"
        "#,
        addr.port()
    ))
    .unwrap()
}

pub fn config_for(addr: SocketAddr) -> SearchIndexConfig {
    SearchIndexConfig::from_section(&section_for(addr)).unwrap()
}

pub fn movie(id: &str, name: &str) -> MovieRecord {
    MovieRecord {
        id: id.to_string(),
        name: name.to_string(),
        kind: "movie".to_string(),
        year: 1994,
        genres: vec!["Drama".to_string()],
        rating: 8.1,
        directors: vec!["Jane Doe".to_string()],
        cast: vec![CastMember {
            actor: "John Roe".to_string(),
            role: "Lead".to_string(),
        }],
        extra: Default::default(),
    }
}
