//! Core data models used throughout movieindex.
//!
//! A [`MovieRecord`] is the normalized, backend-agnostic shape of one
//! catalog entry. Both storage backends persist it field for field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized catalog entry handed to a [`DocumentStore`](crate::store::DocumentStore).
///
/// Every named field is required. Catalog fields without a dedicated slot
/// travel in [`extra`](MovieRecord::extra) and are stored alongside the
/// named ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    /// External catalog identifier (e.g. `tt0111161`).
    pub id: String,
    pub name: String,
    /// Catalog kind: `movie`, `tv series`, `episode`, ...
    pub kind: String,
    pub year: i32,
    pub genres: Vec<String>,
    pub rating: f64,
    pub directors: Vec<String>,
    pub cast: Vec<CastMember>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// One credited performer and the role they played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastMember {
    pub actor: String,
    pub role: String,
}

impl MovieRecord {
    /// Minimal record carrying only an identifier and a title.
    ///
    /// Remaining fields take neutral values; used when probing for
    /// existence by id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: "movie".to_string(),
            year: 0,
            genres: Vec::new(),
            rating: 0.0,
            directors: Vec::new(),
            cast: Vec::new(),
            extra: Map::new(),
        }
    }

    /// The catalog id, or `None` when it is blank.
    pub fn catalog_id(&self) -> Option<&str> {
        let id = self.id.trim();
        (!id.is_empty()).then_some(id)
    }
}
