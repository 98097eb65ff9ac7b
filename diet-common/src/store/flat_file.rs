//! Flat-file backend: one typed CSV blob in a directory-backed object store
//!
//! The blob header carries each column's value kind (`diet_type:text`,
//! `protein(g):number`), so a snapshot reads back exactly as it was written. Headers
//! without kinds are treated as a raw upload and normalized.
//!
//! Writes go to a temporary blob in the same container and are renamed over the live
//! blob, so readers see either the old or the new snapshot.

use super::{bounded, RecordFilter, RecordStore};
use crate::config::{BackendKind, FlatFileSettings};
use crate::normalize::normalize;
use crate::record::CanonicalRecord;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FlatFileStore {
    settings: FlatFileSettings,
    timeout: Duration,
}

impl FlatFileStore {
    /// Open the container, creating it under an existing root if needed
    pub async fn open(settings: FlatFileSettings, timeout: Duration) -> Result<Self> {
        let root_ok = match tokio::time::timeout(timeout, tokio::fs::metadata(&settings.root)).await {
            Ok(Ok(meta)) => meta.is_dir(),
            Ok(Err(_)) => false,
            Err(_) => {
                return Err(Error::StoreUnavailable(format!(
                    "Object store root {} did not respond within {} ms",
                    settings.root.display(),
                    timeout.as_millis()
                )))
            }
        };
        if !root_ok {
            return Err(Error::StoreUnavailable(format!(
                "Object store root not found: {}",
                settings.root.display()
            )));
        }

        let container = settings.container_path();
        tokio::fs::create_dir_all(&container).await.map_err(|e| {
            Error::StoreUnavailable(format!(
                "Cannot open container {}: {}",
                container.display(),
                e
            ))
        })?;

        let store = Self { settings, timeout };
        store.sweep_abandoned_staging().await;

        info!(blob = %store.blob_path().display(), "Opened flat-file store");
        Ok(store)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.settings.blob_path()
    }

    fn staging_prefix(&self) -> String {
        format!(".{}.", self.settings.blob)
    }

    /// Remove staged blobs left behind by writers that never finished.
    ///
    /// A live writer holds its staged blob for at most the store timeout, so only
    /// files older than that are touched.
    async fn sweep_abandoned_staging(&self) {
        let container = self.settings.container_path();
        let mut entries = match tokio::fs::read_dir(&container).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(container = %container.display(), error = %e, "Cannot scan for staged blobs");
                return;
            }
        };

        let prefix = self.staging_prefix();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Stopped scanning for staged blobs");
                    break;
                }
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".tmp") {
                continue;
            }

            let age = entry
                .metadata()
                .await
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            if age.map_or(true, |age| age < self.timeout) {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => info!(path = %entry.path().display(), "Removed abandoned staged blob"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove staged blob"),
            }
        }
    }

    /// Load the whole snapshot. A missing or empty blob is an empty snapshot.
    async fn load(&self) -> Result<Vec<CanonicalRecord>> {
        let path = self.blob_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(blob = %path.display(), "Blob not written yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::StoreIo(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        decode_blob(&bytes).map_err(|e| {
            Error::StoreIo(format!("Stored blob {} is unreadable: {}", path.display(), e))
        })
    }

    async fn overwrite(&self, records: &[CanonicalRecord]) -> Result<usize> {
        let bytes = encode_blob(records)?;
        let target = self.blob_path();
        let mut staged = StagedBlob::new(self.settings.container_path().join(format!(
            "{}{}.tmp",
            self.staging_prefix(),
            uuid::Uuid::new_v4()
        )));

        write_synced(staged.path(), &bytes).await.map_err(|e| {
            Error::StoreIo(format!("Failed to stage {}: {}", staged.path().display(), e))
        })?;

        tokio::fs::rename(staged.path(), &target).await.map_err(|e| {
            Error::StoreIo(format!("Failed to publish {}: {}", target.display(), e))
        })?;
        staged.published();

        info!(records = records.len(), blob = %target.display(), "Overwrote blob");
        Ok(records.len())
    }
}

#[async_trait]
impl RecordStore for FlatFileStore {
    fn backend(&self) -> BackendKind {
        BackendKind::FlatFile
    }

    async fn replace_all(&self, records: &[CanonicalRecord]) -> Result<usize> {
        bounded(self.timeout, "overwrite blob", self.overwrite(records)).await
    }

    async fn query_page(&self, filter: &RecordFilter) -> Result<Vec<CanonicalRecord>> {
        let snapshot = bounded(self.timeout, "read blob", self.load()).await?;
        Ok(filter.apply(snapshot))
    }
}

/// Staged blob that is removed when dropped unless it was renamed into place.
///
/// Covers every early exit, including the write future being dropped on timeout.
struct StagedBlob {
    path: PathBuf,
    published: bool,
}

impl StagedBlob {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            published: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn published(&mut self) {
        self.published = true;
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staged blob");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Text,
    Number,
    Json,
}

impl CellKind {
    fn as_str(self) -> &'static str {
        match self {
            CellKind::Text => "text",
            CellKind::Number => "number",
            CellKind::Json => "json",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(CellKind::Text),
            "number" => Some(CellKind::Number),
            "json" => Some(CellKind::Json),
            _ => None,
        }
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => CellKind::Text,
            Value::Number(_) => CellKind::Number,
            _ => CellKind::Json,
        }
    }

    fn encode(self, value: &Value) -> Result<String> {
        match (self, value) {
            (CellKind::Text, Value::String(s)) => Ok(s.clone()),
            (CellKind::Number, Value::Number(n)) => Ok(n.to_string()),
            (_, other) => serde_json::to_string(other)
                .map_err(|e| Error::StoreIo(format!("Failed to encode value: {}", e))),
        }
    }

    fn decode(self, cell: &str) -> std::result::Result<Value, String> {
        match self {
            CellKind::Text => Ok(Value::String(cell.to_string())),
            CellKind::Number => serde_json::from_str::<Number>(cell)
                .map(Value::Number)
                .map_err(|e| format!("'{}' is not a number: {}", cell, e)),
            CellKind::Json => serde_json::from_str(cell).map_err(|e| format!("'{}': {}", cell, e)),
        }
    }
}

/// Field names shared by every record in the batch, in first-record order
fn batch_header(records: &[CanonicalRecord]) -> Result<Vec<&str>> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = first.field_names().collect();
    if header.is_empty() {
        return Err(Error::MalformedInput("record 1 has no fields".to_string()));
    }

    for (index, record) in records.iter().enumerate() {
        if record.len() != header.len() {
            return Err(Error::MalformedInput(format!(
                "record {} has {} fields, batch header has {}",
                index + 1,
                record.len(),
                header.len()
            )));
        }
        if let Some(field) = header.iter().find(|f| record.get(f).is_none()) {
            return Err(Error::MalformedInput(format!(
                "record {} lacks field '{}'",
                index + 1,
                field
            )));
        }
    }
    Ok(header)
}

/// Serialize records as the typed blob the flat-file store keeps.
///
/// A column is `text` when every value is a string, `number` when every value is a
/// number, and `json` otherwise. An empty slice encodes to an empty blob.
pub fn encode_blob(records: &[CanonicalRecord]) -> Result<Vec<u8>> {
    let header = batch_header(records)?;
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let kinds: Vec<CellKind> = header
        .iter()
        .map(|field| {
            let mut values = records.iter().filter_map(|r| r.get(field));
            let first = values.next().map(CellKind::of).unwrap_or(CellKind::Json);
            if first != CellKind::Json && values.all(|v| CellKind::of(v) == first) {
                first
            } else {
                CellKind::Json
            }
        })
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(
        header
            .iter()
            .zip(&kinds)
            .map(|(field, kind)| format!("{}:{}", field, kind.as_str())),
    )?;

    for record in records {
        let mut row = Vec::with_capacity(header.len());
        for (field, kind) in header.iter().zip(&kinds) {
            let value = record.get(field).unwrap_or(&Value::Null);
            row.push(kind.encode(value)?);
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::StoreIo(format!("Failed to flush CSV: {}", e)))
}

/// Parse a stored blob back into records.
///
/// Typed blobs decode cell-for-cell with no row dropped. A header without kinds is a
/// raw table and goes through the normalizer.
pub fn decode_blob(bytes: &[u8]) -> Result<Vec<CanonicalRecord>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let typed: Option<Vec<(String, CellKind)>> = headers
        .iter()
        .map(|label| {
            let (field, kind) = label.rsplit_once(':')?;
            Some((field.to_string(), CellKind::parse(kind)?))
        })
        .collect();
    let columns = match typed {
        Some(columns) if !columns.is_empty() => columns,
        _ => return normalize(bytes),
    };

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| Error::MalformedInput(format!("row {}: {}", index + 1, e)))?;
        let mut record = CanonicalRecord::new();
        for ((field, kind), cell) in columns.iter().zip(row.iter()) {
            let value = kind.decode(cell).map_err(|e| {
                Error::MalformedInput(format!("row {}, field '{}': {}", index + 1, field, e))
            })?;
            record.insert(field.clone(), value);
        }
        records.push(record);
    }
    Ok(records)
}

/// Serialize records as a plain canonical CSV table, the normalizer's own format.
///
/// The header comes from the first record; every record must carry the same field set.
/// An empty slice encodes to an empty blob.
pub fn encode_csv(records: &[CanonicalRecord]) -> Result<Vec<u8>> {
    let header = batch_header(records)?;
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in records {
        let row: Vec<String> = header
            .iter()
            .map(|field| record.text(field).unwrap_or_default().into_owned())
            .collect();
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::StoreIo(format!("Failed to flush CSV: {}", e)))
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> FlatFileSettings {
        FlatFileSettings {
            root: dir.path().to_path_buf(),
            container: "data".into(),
            blob: "clean_diets.csv".into(),
        }
    }

    fn rec(diet: &str, name: &str, protein: f64) -> CanonicalRecord {
        CanonicalRecord::from_fields([
            ("diet_type", json!(diet)),
            ("recipe_name", json!(name)),
            ("protein(g)", json!(protein)),
        ])
    }

    fn container_entries(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_encode_csv_roundtrips_through_normalizer() {
        let records = vec![rec("vegan", "Tofu, Bowl", 20.0), rec("keto", "Bacon \"Salad\"", 15.5)];
        let bytes = encode_csv(&records).unwrap();
        assert_eq!(normalize(&bytes).unwrap(), records);
    }

    #[test]
    fn test_blob_keeps_numeric_text_and_missing_tokens() {
        let records = vec![
            CanonicalRecord::from_fields([
                ("diet_type", json!("vegan")),
                ("recipe_name", json!("1984")),
                ("protein(g)", json!(3.141592653589793)),
            ]),
            CanonicalRecord::from_fields([
                ("diet_type", json!("keto")),
                ("recipe_name", json!("None")),
                ("protein(g)", json!(7)),
            ]),
            CanonicalRecord::from_fields([
                ("diet_type", json!("")),
                ("recipe_name", json!("NA")),
                ("protein(g)", json!(-0.5)),
            ]),
        ];

        let bytes = encode_blob(&records).unwrap();
        let header = String::from_utf8_lossy(&bytes).lines().next().unwrap().to_string();
        assert_eq!(header, "diet_type:text,recipe_name:text,protein(g):number");
        assert_eq!(decode_blob(&bytes).unwrap(), records);
    }

    #[test]
    fn test_blob_mixed_column_is_json() {
        let records = vec![
            CanonicalRecord::from_fields([("label:x", json!("12")), ("n", json!(1))]),
            CanonicalRecord::from_fields([("label:x", json!(12)), ("n", json!(2.5))]),
        ];
        let bytes = encode_blob(&records).unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("label:x:json,n:number"));
        assert_eq!(decode_blob(&bytes).unwrap(), records);
    }

    #[test]
    fn test_untyped_blob_is_normalized() {
        let bytes = b"Diet_type,Recipe_name\nvegan,Tofu\nketo,NA\n";
        let records = decode_blob(bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recipe_name(), Some("Tofu"));
    }

    #[test]
    fn test_encode_rejects_mismatched_fields() {
        let records = vec![
            rec("vegan", "Tofu", 20.0),
            CanonicalRecord::from_fields([("diet_type", json!("keto"))]),
        ];
        assert!(matches!(encode_blob(&records), Err(Error::MalformedInput(_))));
        assert!(matches!(encode_csv(&records), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_encode_empty_is_empty_blob() {
        assert!(encode_blob(&[]).unwrap().is_empty());
        assert!(encode_csv(&[]).unwrap().is_empty());
        assert!(decode_blob(b"").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut s = settings(&dir);
        s.root = dir.path().join("nope");
        let err = FlatFileStore::open(s, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unwritten_blob_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::open(settings(&dir), Duration::from_secs(1)).await.unwrap();
        let page = store.query_page(&RecordFilter::unfiltered(0, 9)).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_staging_files() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::open(settings(&dir), Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.replace_all(&[rec("vegan", "Tofu", 20.0)]).await.unwrap(), 1);
        store.replace_all(&[rec("keto", "Bacon", 15.5)]).await.unwrap();

        assert_eq!(container_entries(&dir), vec!["clean_diets.csv".to_string()]);

        let page = store.query_page(&RecordFilter::unfiltered(0, 9)).await.unwrap();
        assert_eq!(page, vec![rec("keto", "Bacon", 15.5)]);
    }

    #[test]
    fn test_unpublished_staged_blob_is_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".clean_diets.csv.abc.tmp");
        std::fs::write(&path, b"partial").unwrap();

        drop(StagedBlob::new(path.clone()));
        assert!(!path.exists());

        let kept = dir.path().join("kept.csv");
        std::fs::write(&kept, b"x").unwrap();
        let mut staged = StagedBlob::new(kept.clone());
        staged.published();
        drop(staged);
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_open_sweeps_abandoned_staging_files() {
        let dir = TempDir::new().unwrap();
        let container = dir.path().join("data");
        std::fs::create_dir_all(&container).unwrap();

        let abandoned = container.join(".clean_diets.csv.1111.tmp");
        std::fs::write(&abandoned, b"partial").unwrap();
        File::options()
            .write(true)
            .open(&abandoned)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let fresh = container.join(".clean_diets.csv.2222.tmp");
        std::fs::write(&fresh, b"in flight").unwrap();
        let unrelated = container.join(".other.csv.3333.tmp");
        std::fs::write(&unrelated, b"x").unwrap();
        File::options()
            .write(true)
            .open(&unrelated)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        FlatFileStore::open(settings(&dir), Duration::from_secs(60)).await.unwrap();

        assert_eq!(
            container_entries(&dir),
            vec![
                ".clean_diets.csv.2222.tmp".to_string(),
                ".other.csv.3333.tmp".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_store_io() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileStore::open(settings(&dir), Duration::from_secs(1)).await.unwrap();

        for corrupt in [&b"a,b\n1,2,3\n"[..], &b"a:text,b:number\nx,not-a-number\n"[..]] {
            std::fs::write(store.blob_path(), corrupt).unwrap();
            let err = store
                .query_page(&RecordFilter::unfiltered(0, 9))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::StoreIo(_)), "got {:?}", err);
        }
    }
}
