//! Raw table normalization
//!
//! Turns a raw delimited upload into canonical records:
//! 1. rows with any missing cell are dropped (no imputation)
//! 2. column labels are trimmed and lower-cased
//! 3. columns whose every kept cell is a finite number become numeric
//!
//! The transform is pure. Feeding its own CSV output back in yields the same records.

use crate::record::CanonicalRecord;
use crate::{Error, Result};
use serde_json::{Number, Value};
use std::collections::HashSet;

/// Cell tokens treated as missing, matching the pandas `read_csv` defaults
const MISSING_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Normalization output with bookkeeping for ingestion logs
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    /// Canonical column labels in header order
    pub columns: Vec<String>,
    /// Kept rows
    pub records: Vec<CanonicalRecord>,
    /// Data rows in the payload (header excluded)
    pub rows_read: usize,
    /// Rows dropped for containing a missing cell
    pub rows_dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

/// Normalize a raw payload into canonical records
pub fn normalize(payload: &[u8]) -> Result<Vec<CanonicalRecord>> {
    normalize_table(payload).map(|table| table.records)
}

/// Normalize a raw payload, keeping the column list and row counts
pub fn normalize_table(payload: &[u8]) -> Result<NormalizedTable> {
    let payload = payload.strip_prefix(UTF8_BOM).unwrap_or(payload);
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::MalformedInput(format!("payload is not valid UTF-8: {}", e)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(Error::MalformedInput("missing header row".to_string()));
    }
    let columns = canonical_columns(headers.iter())?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut rows_read = 0usize;
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| {
            Error::MalformedInput(format!("data row {}: {}", index + 1, e))
        })?;
        rows_read += 1;

        if row.iter().any(is_missing) {
            continue;
        }
        rows.push(row.iter().map(str::to_string).collect());
    }

    let kinds: Vec<ColumnKind> = (0..columns.len())
        .map(|col| infer_kind(rows.iter().map(|row| row[col].as_str())))
        .collect();

    let records: Vec<CanonicalRecord> = rows
        .into_iter()
        .map(|row| {
            CanonicalRecord::from_fields(
                columns
                    .iter()
                    .zip(kinds.iter())
                    .zip(row)
                    .map(|((name, kind), cell)| (name.clone(), coerce(cell, *kind))),
            )
        })
        .collect();

    let rows_dropped = rows_read - records.len();
    Ok(NormalizedTable {
        columns,
        records,
        rows_read,
        rows_dropped,
    })
}

/// Canonical form of a raw column label
pub fn canonical_label(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// True when a raw cell counts as a missing value
pub fn is_missing(cell: &str) -> bool {
    cell.trim().is_empty() || MISSING_TOKENS.contains(&cell)
}

fn canonical_columns<'a>(labels: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for (index, raw) in labels.enumerate() {
        let label = canonical_label(raw);
        if label.is_empty() {
            return Err(Error::MalformedInput(format!(
                "column {} has a blank label",
                index + 1
            )));
        }
        if !seen.insert(label.clone()) {
            return Err(Error::MalformedInput(format!(
                "duplicate column label after normalization: {}",
                label
            )));
        }
        columns.push(label);
    }

    Ok(columns)
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut kind = ColumnKind::Integer;
    let mut any = false;

    for cell in cells {
        any = true;
        if kind == ColumnKind::Integer && cell.parse::<i64>().is_ok() {
            continue;
        }
        match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => kind = ColumnKind::Float,
            _ => return ColumnKind::Text,
        }
    }

    // Columns with no kept cells carry no evidence; keep them textual.
    if any {
        kind
    } else {
        ColumnKind::Text
    }
}

fn coerce(cell: String, kind: ColumnKind) -> Value {
    match kind {
        ColumnKind::Integer => cell
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(cell)),
        ColumnKind::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(cell)),
        ColumnKind::Text => Value::String(cell),
    }
}
