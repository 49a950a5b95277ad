//! # movieindex
//!
//! A movie catalog indexer. Normalized movie records are persisted into one
//! of two interchangeable document backends behind a single storage
//! contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────────────┐
//! │   Records   │──▶│   Ingest    │──▶│   DocumentStore    │
//! │ JSON / JSONL│   │ exists+store│   │ Elasticsearch|Mongo│
//! └─────────────┘   └─────────────┘   └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! movieindex check                          # open the store, print its size
//! movieindex load movies.jsonl --skip-existing
//! movieindex exists tt0111161
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and backend validation |
//! | [`models`] | The normalized movie record |
//! | [`store`] | `DocumentStore` contract and the two adapters |
//! | [`ingest`] | Indexing run orchestration |
//! | [`error`] | Storage error taxonomy |

pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod store;
