//! Ingestion: raw upload → normalizer → full replace of the store snapshot
//!
//! Failures are logged and returned to the trigger. Nothing is written unless
//! normalization succeeds, so a bad upload leaves the previous snapshot in place.

use crate::normalize::normalize_table;
use crate::store::RecordStore;
use crate::Result;
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};

/// Summary of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub columns: Vec<String>,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub records_stored: usize,
    pub elapsed_ms: u128,
}

/// Normalize `payload` and replace the store's snapshot with the result
pub async fn ingest(store: &dyn RecordStore, payload: &[u8]) -> Result<IngestReport> {
    let started = Instant::now();
    info!(
        bytes = payload.len(),
        backend = store.backend().as_str(),
        "Raw dataset received, normalizing"
    );

    let table = normalize_table(payload).map_err(|e| {
        error!(error = %e, "Normalization failed; store left unchanged");
        e
    })?;

    if table.rows_dropped > 0 {
        warn!(
            dropped = table.rows_dropped,
            read = table.rows_read,
            "Dropped rows with missing values"
        );
    }
    info!(
        rows = table.records.len(),
        columns = table.columns.len(),
        "Normalization complete"
    );

    let stored = store.replace_all(&table.records).await.map_err(|e| {
        error!(error = %e, "Store replace failed");
        e
    })?;
    if stored < table.records.len() {
        warn!(
            stored,
            normalized = table.records.len(),
            "Store skipped records during replace"
        );
    }

    let report = IngestReport {
        records_stored: stored,
        columns: table.columns,
        rows_read: table.rows_read,
        rows_dropped: table.rows_dropped,
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        stored = report.records_stored,
        elapsed_ms = report.elapsed_ms as u64,
        "Snapshot replaced"
    );
    Ok(report)
}
