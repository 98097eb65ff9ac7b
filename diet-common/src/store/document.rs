//! Document collection backend (SQLite, one JSON document per record)

use super::{bounded, RecordFilter, RecordStore, SearchScope};
use crate::config::{validate_collection_name, BackendKind, DocumentSettings};
use crate::record::{CanonicalRecord, DIET_TYPE};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collection-per-table document store
///
/// Rows carry an autoincrement `id` that fixes ingestion order; it is never returned.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    collection: String,
    batch_size: usize,
    timeout: Duration,
}

impl DocumentStore {
    /// Connect and make sure the collection table exists
    pub async fn connect(settings: &DocumentSettings, timeout: Duration) -> Result<Self> {
        validate_collection_name(&settings.collection)?;

        let options = SqliteConnectOptions::from_str(&settings.url)
            .map_err(|e| Error::Config(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(timeout);

        let connect = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(timeout)
            .connect_with(options);

        let pool = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                return Err(Error::StoreUnavailable(format!(
                    "Failed to connect to document store: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(Error::StoreUnavailable(format!(
                    "Connecting to document store timed out after {} ms",
                    timeout.as_millis()
                )))
            }
        };

        let store = Self {
            pool,
            collection: settings.collection.clone(),
            batch_size: settings.batch_size.max(1),
            timeout,
        };
        store.ensure_collection().await?;

        info!(collection = %store.collection, "Connected to document store");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc TEXT NOT NULL
            )",
            self.collection
        );
        bounded(self.timeout, "create collection", async {
            sqlx::query(&sql).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    /// Delete-all then insert-many inside one transaction.
    ///
    /// A failed batch falls back to one insert per record; records that still fail are
    /// skipped and logged. SQLite rolls back only the failing statement, so earlier
    /// batches in the transaction are unaffected.
    async fn replace_in_transaction(&self, records: &[CanonicalRecord]) -> Result<usize> {
        let docs = records
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| Error::StoreIo(format!("Failed to encode document: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!("DELETE FROM \"{}\"", self.collection))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        debug!(deleted, "Cleared collection");

        let mut inserted = 0usize;
        let mut skipped = 0usize;
        for (batch_index, batch) in docs.chunks(self.batch_size).enumerate() {
            match insert_batch(&mut tx, &self.collection, batch).await {
                Ok(()) => {
                    inserted += batch.len();
                    debug!(inserted, total = docs.len(), "Inserted batch");
                }
                Err(e) => {
                    warn!(
                        batch = batch_index + 1,
                        error = %e,
                        "Batch insert failed, retrying one record at a time"
                    );
                    for doc in batch {
                        match insert_batch(&mut tx, &self.collection, std::slice::from_ref(doc)).await {
                            Ok(()) => inserted += 1,
                            Err(e) => {
                                skipped += 1;
                                warn!(error = %e, "Skipping record that could not be inserted");
                            }
                        }
                    }
                }
            }
        }

        tx.commit().await?;

        if skipped > 0 {
            warn!(inserted, skipped, "Replace completed with skipped records");
        } else {
            info!(inserted, collection = %self.collection, "Replaced collection");
        }
        Ok(inserted)
    }

    async fn select_page(&self, filter: &RecordFilter) -> Result<Vec<CanonicalRecord>> {
        if !filter.is_sql_foldable() {
            return self.select_page_in_memory(filter).await;
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT doc FROM \"{}\" WHERE 1 = 1", self.collection));

        if let Some(diet) = &filter.diet {
            qb.push(" AND ");
            push_field_contains(&mut qb, DIET_TYPE, diet);
        }

        if let Some(search) = &filter.search {
            match &filter.scope {
                SearchScope::Fields(fields) => {
                    qb.push(" AND (");
                    for (i, field) in fields.iter().enumerate() {
                        if i > 0 {
                            qb.push(" OR ");
                        }
                        push_field_contains(&mut qb, field, search);
                    }
                    qb.push(")");
                }
                SearchScope::AllFields => {
                    qb.push(
                        " AND EXISTS (SELECT 1 FROM json_each(doc) \
                         WHERE instr(lower(CAST(json_each.value AS TEXT)), ",
                    );
                    qb.push_bind(search.clone());
                    qb.push(") > 0)");
                }
            }
        }

        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(clamp_i64(filter.limit));
        qb.push(" OFFSET ");
        qb.push_bind(clamp_i64(filter.offset));

        let docs: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        decode_docs(&docs)
    }

    /// SQLite's `lower()` folds ASCII only, so needles with other letters are matched
    /// over the whole collection in memory
    async fn select_page_in_memory(&self, filter: &RecordFilter) -> Result<Vec<CanonicalRecord>> {
        debug!("Non-ASCII needle, filtering collection in memory");
        let docs: Vec<String> =
            sqlx::query_scalar(&format!("SELECT doc FROM \"{}\" ORDER BY id", self.collection))
                .fetch_all(&self.pool)
                .await?;
        Ok(filter.apply(decode_docs(&docs)?))
    }
}

fn decode_docs(docs: &[String]) -> Result<Vec<CanonicalRecord>> {
    docs.iter()
        .map(|doc| {
            serde_json::from_str::<CanonicalRecord>(doc)
                .map_err(|e| Error::StoreIo(format!("Corrupt document in collection: {}", e)))
        })
        .collect()
}

#[async_trait]
impl RecordStore for DocumentStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn replace_all(&self, records: &[CanonicalRecord]) -> Result<usize> {
        bounded(self.timeout, "replace collection", self.replace_in_transaction(records)).await
    }

    async fn query_page(&self, filter: &RecordFilter) -> Result<Vec<CanonicalRecord>> {
        bounded(self.timeout, "query collection", self.select_page(filter)).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

async fn insert_batch(
    conn: &mut SqliteConnection,
    collection: &str,
    docs: &[String],
) -> sqlx::Result<()> {
    if docs.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("INSERT INTO \"{}\" (doc) ", collection));
    qb.push_values(docs, |mut row, doc| {
        row.push_bind(doc.clone());
    });
    qb.build().execute(conn).await?;
    Ok(())
}

/// `instr(lower(<field as text>), <needle>) > 0`; NULL (absent field) never matches
fn push_field_contains(qb: &mut QueryBuilder<Sqlite>, field: &str, folded_needle: &str) {
    qb.push("instr(lower(CAST(json_extract(doc, ");
    qb.push_bind(json_path(field));
    qb.push(") AS TEXT)), ");
    qb.push_bind(folded_needle.to_string());
    qb.push(") > 0");
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field)
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
