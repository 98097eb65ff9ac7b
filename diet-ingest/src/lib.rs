//! diet-ingest library - ingestion trigger
//!
//! Reads one raw delimited upload (a file or stdin), normalizes it and replaces
//! the configured store's snapshot. In watch mode the input file is polled and
//! re-ingested whenever its modification time changes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use diet_common::store::encode_csv;
use diet_common::{ingest, normalize::normalize_table, Error, IngestReport, RecordStore, Result};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

/// Where the raw upload comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// `-` means stdin; anything else is a file path
    pub fn parse(value: &str) -> Self {
        if value == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(value))
        }
    }

    /// Read the whole payload
    pub async fn read(&self) -> Result<Vec<u8>> {
        match self {
            InputSource::Stdin => {
                let mut buf = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| Error::MalformedInput(format!("Failed to read stdin: {}", e)))?;
                Ok(buf)
            }
            InputSource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                Error::MalformedInput(format!("Failed to read {}: {}", path.display(), e))
            }),
        }
    }
}

/// Normalize `payload` without writing anything
pub fn dry_run(payload: &[u8]) -> Result<IngestReport> {
    let table = normalize_table(payload)?;
    Ok(IngestReport {
        records_stored: 0,
        rows_read: table.rows_read,
        rows_dropped: table.rows_dropped,
        columns: table.columns,
        elapsed_ms: 0,
    })
}

/// Normalize `payload` and write the canonical CSV table to `out` instead of a store.
///
/// The export is itself a valid upload: ingesting it yields the same records.
pub async fn export(payload: &[u8], out: &Path) -> Result<IngestReport> {
    let table = normalize_table(payload)?;
    let bytes = encode_csv(&table.records)?;
    tokio::fs::write(out, &bytes)
        .await
        .map_err(|e| Error::StoreIo(format!("Failed to write {}: {}", out.display(), e)))?;
    info!(records = table.records.len(), path = %out.display(), "Exported canonical table");

    Ok(IngestReport {
        records_stored: table.records.len(),
        rows_read: table.rows_read,
        rows_dropped: table.rows_dropped,
        columns: table.columns,
        elapsed_ms: 0,
    })
}

/// Ingest one payload from `source` into `store`
pub async fn run_once(store: &dyn RecordStore, source: &InputSource) -> Result<IngestReport> {
    let payload = source.read().await?;
    ingest(store, &payload).await
}

/// Poll `path` every `interval` and re-ingest whenever its modification time changes.
///
/// The first poll always ingests. Failed runs are logged and retried on the next
/// change; the loop only ends when `shutdown` resolves. Returns the number of
/// successful ingestions.
pub async fn watch<F>(
    store: &dyn RecordStore,
    path: &Path,
    interval: Duration,
    shutdown: F,
) -> usize
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    let mut last_seen: Option<SystemTime> = None;
    let mut succeeded = 0usize;

    info!(path = %path.display(), interval_ms = interval.as_millis() as u64, "Watching upload");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(ingestions = succeeded, "Watch stopped");
                return succeeded;
            }
            _ = ticker.tick() => {}
        }

        let modified = match modified_time(path).await {
            Some(t) => t,
            None => {
                debug!(path = %path.display(), "Upload not present");
                continue;
            }
        };
        if last_seen == Some(modified) {
            continue;
        }
        last_seen = Some(modified);

        let source = InputSource::File(path.to_path_buf());
        match run_once(store, &source).await {
            Ok(report) => {
                succeeded += 1;
                info!(
                    stored = report.records_stored,
                    dropped = report.rows_dropped,
                    "Upload ingested"
                );
            }
            Err(e @ Error::MalformedInput(_)) => {
                warn!(error = %e, "Upload rejected; waiting for the next change");
            }
            Err(e) => {
                error!(error = %e, "Ingestion failed; waiting for the next change");
            }
        }
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok()
}
