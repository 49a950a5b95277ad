//! Ingestion pipeline orchestration.
//!
//! Coordinates one indexing run: read normalized records → open the
//! configured store → for each record optionally check existence, then
//! store it under its catalog id → close the store. Records are processed
//! strictly one at a time against a single store instance.
//!
//! Whether a store failure aborts the run or only skips the record is the
//! caller's choice ([`IndexOptions::keep_going`]); the store layer itself
//! never swallows transport errors.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info};

use crate::config::StoreConfig;
use crate::models::MovieRecord;
use crate::store::{with_store, Backend, DocumentStore, StoreOutcome};

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Check `exists` first and leave already-stored records alone. Records
    /// without a catalog id are always stored.
    pub skip_existing: bool,
    /// Log store failures and continue with the next record instead of
    /// aborting the run.
    pub keep_going: bool,
    /// Process at most this many records.
    pub limit: Option<usize>,
}

/// Counters for one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub seen: u64,
    pub stored: u64,
    pub already_present: u64,
    pub skipped_invalid: u64,
    pub failed: u64,
}

/// Index `records` into an already-open store.
///
/// Each record is stored under its catalog id, so re-running over the same
/// input overwrites instead of duplicating.
pub async fn index_records<S>(
    store: &S,
    records: &[MovieRecord],
    options: &IndexOptions,
) -> Result<IndexReport>
where
    S: DocumentStore,
{
    let mut report = IndexReport::default();
    let limit = options.limit.unwrap_or(records.len());

    for record in records.iter().take(limit) {
        report.seen += 1;

        // Without a catalog id there is nothing to look up.
        if options.skip_existing && record.catalog_id().is_some() {
            let present = store
                .exists(record)
                .await
                .with_context(|| format!("Failed to check whether '{}' is stored", record.id))?;
            if present {
                debug!(record = %record.id, "already stored, skipping");
                report.already_present += 1;
                continue;
            }
        }

        match store.store(record, record.catalog_id()).await {
            Ok(StoreOutcome::Stored { id }) => {
                debug!(record = %record.id, %id, "stored");
                report.stored += 1;
            }
            Ok(StoreOutcome::Skipped { .. }) => {
                report.skipped_invalid += 1;
            }
            Err(e) if options.keep_going => {
                error!(record = %record.id, error = %e, "failed to store record");
                report.failed += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to store '{}'", record.id));
            }
        }
    }

    Ok(report)
}

/// Open the configured backend, index `records`, and close the backend on
/// every exit path.
pub async fn run_index(
    config: &StoreConfig,
    records: &[MovieRecord],
    options: &IndexOptions,
) -> Result<IndexReport> {
    let backend = Backend::open(config)
        .await
        .with_context(|| format!("Failed to open {} store", config.engine()))?;

    let engine = backend.engine();
    let report = with_store(backend, async |store| {
        index_records(store, records, options).await
    })
    .await?;

    info!(
        %engine,
        seen = report.seen,
        stored = report.stored,
        already_present = report.already_present,
        skipped_invalid = report.skipped_invalid,
        failed = report.failed,
        "index run finished"
    );
    Ok(report)
}

/// Read normalized records from a JSON array or JSON-lines file.
pub fn load_records(path: &Path) -> Result<Vec<MovieRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file: {}", path.display()))?;
    parse_records(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_records(content: &str) -> Result<Vec<MovieRecord>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid JSON array of records");
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid record on line {}", n + 1))
        })
        .collect()
}
