//! Error taxonomy of the storage layer.
//!
//! Configuration and transport failures are always surfaced as a
//! [`StoreError`]; "not found" is never an error. Records the backend cannot
//! encode are not errors either, they come back as
//! [`StoreOutcome::Skipped`](crate::store::StoreOutcome::Skipped).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid backend configuration, detected before any request is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP request to the search index could not be completed.
    #[error("search index request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The search index answered with a status outside {200, 201}.
    #[error("search index rejected {operation} (HTTP {status}) for {subject}: {reason}")]
    Rejected {
        operation: &'static str,
        status: u16,
        /// Supplied document id, or the rendered request body.
        subject: String,
        /// Reason text reported by the backend.
        reason: String,
    },

    /// The backend answered successfully but the payload was not understood.
    #[error("unexpected response from {backend}: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },

    /// Any failure reported by the document database driver.
    #[error("document database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        StoreError::Config(message.into())
    }
}
