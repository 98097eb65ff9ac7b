//! Store adapters
//!
//! Both backends implement [`RecordStore`] and must be indistinguishable to the query
//! engine: same filter semantics, same ingestion-order results, no internal ids.
//!
//! - [`DocumentStore`]: one JSON document per record in a SQLite collection table,
//!   filters pushed down as SQL predicates
//! - [`FlatFileStore`]: one typed CSV blob, filtered in memory after loading
//!
//! Value rendering and case folding live in [`matching`] so both paths agree.

use crate::config::{BackendKind, BackendSettings, Settings};
use crate::record::CanonicalRecord;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

mod document;
mod flat_file;
pub mod matching;

pub use document::DocumentStore;
pub use flat_file::{decode_blob, encode_blob, encode_csv, FlatFileStore};
pub use matching::fold_case;
use matching::{contains_folded, is_sql_foldable, match_text};

/// Which fields a free-text search inspects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Only these canonical fields
    Fields(Vec<String>),
    /// The string form of every field in the record
    AllFields,
}

/// Resolved filter and page window handed to a backend
///
/// `diet` and `search` are already lower-cased needles and are `None` when the
/// corresponding filter is inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub diet: Option<String>,
    pub search: Option<String>,
    pub scope: SearchScope,
    /// Records to skip in the filtered result set
    pub offset: u64,
    /// Maximum records to return
    pub limit: u64,
}

impl RecordFilter {
    /// Filter that matches everything and returns `limit` records from `offset`
    pub fn unfiltered(offset: u64, limit: u64) -> Self {
        Self {
            diet: None,
            search: None,
            scope: SearchScope::AllFields,
            offset,
            limit,
        }
    }

    /// In-memory evaluation of the diet and search predicates
    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        if let Some(diet) = &self.diet {
            let hit = record
                .get(crate::record::DIET_TYPE)
                .map(|v| contains_folded(&match_text(v), diet))
                .unwrap_or(false);
            if !hit {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let hit = match &self.scope {
                SearchScope::Fields(fields) => fields.iter().any(|f| {
                    record
                        .get(f)
                        .map(|v| contains_folded(&match_text(v), search))
                        .unwrap_or(false)
                }),
                SearchScope::AllFields => record
                    .fields()
                    .any(|(_, v)| contains_folded(&match_text(v), search)),
            };
            if !hit {
                return false;
            }
        }

        true
    }

    /// True when every active needle can be evaluated with SQLite's ASCII `lower()`
    pub fn is_sql_foldable(&self) -> bool {
        [&self.diet, &self.search]
            .into_iter()
            .flatten()
            .all(|needle| is_sql_foldable(needle))
    }

    /// Apply the predicates and the page window to an in-memory snapshot
    pub fn apply<I>(&self, records: I) -> Vec<CanonicalRecord>
    where
        I: IntoIterator<Item = CanonicalRecord>,
    {
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = usize::try_from(self.limit).unwrap_or(usize::MAX);
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .skip(skip)
            .take(take)
            .collect()
    }
}


/// Capability interface every backend implements
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Discard the current snapshot and store `records` in its place, returning the
    /// number of records actually stored.
    ///
    /// An empty slice drains the store. On failure the previous snapshot is kept.
    async fn replace_all(&self, records: &[CanonicalRecord]) -> Result<usize>;

    /// Records matching `filter`, sliced to its page window, in ingestion order
    async fn query_page(&self, filter: &RecordFilter) -> Result<Vec<CanonicalRecord>>;

    /// Release backend resources held by this handle
    async fn close(&self) {}
}

/// Open the backend selected by `settings`
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn RecordStore>> {
    match &settings.backend {
        BackendSettings::Document(doc) => {
            let store = DocumentStore::connect(doc, settings.store_timeout).await?;
            Ok(Arc::new(store))
        }
        BackendSettings::FlatFile(ff) => {
            let store = FlatFileStore::open(ff.clone(), settings.store_timeout).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Run a backend operation under `limit`; expiry is a [`Error::StoreIo`]
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::StoreIo(format!(
            "{} timed out after {} ms",
            operation,
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(diet: &str, name: &str, cuisine: &str) -> CanonicalRecord {
        CanonicalRecord::from_fields([
            ("diet_type", json!(diet)),
            ("recipe_name", json!(name)),
            ("cuisine_type", json!(cuisine)),
            ("protein(g)", json!(21.5)),
        ])
    }

    fn filter(diet: Option<&str>, search: Option<&str>, scope: SearchScope) -> RecordFilter {
        RecordFilter {
            diet: diet.map(fold_case),
            search: search.map(fold_case),
            scope,
            offset: 0,
            limit: 100,
        }
    }

    fn default_scope() -> SearchScope {
        SearchScope::Fields(vec![
            "recipe_name".into(),
            "diet_type".into(),
            "cuisine_type".into(),
        ])
    }

    #[test]
    fn test_diet_is_case_insensitive_substring() {
        let f = filter(Some("PALEO"), None, default_scope());
        assert!(f.matches(&rec("Paleo-Vegan", "Stew", "french")));
        assert!(!f.matches(&rec("keto", "Paleo Stew", "french")));
    }

    #[test]
    fn test_search_limited_to_fields() {
        let f = filter(None, Some("21.5"), default_scope());
        assert!(!f.matches(&rec("vegan", "Bowl", "asian")));

        let f = filter(None, Some("21.5"), SearchScope::AllFields);
        assert!(f.matches(&rec("vegan", "Bowl", "asian")));
    }

    #[test]
    fn test_diet_and_search_combine_with_and() {
        let f = filter(Some("vegan"), Some("salad"), default_scope());
        assert!(f.matches(&rec("vegan", "Kale Salad", "american")));
        assert!(!f.matches(&rec("keto", "Bacon Salad", "american")));
        assert!(!f.matches(&rec("vegan", "Tofu Bowl", "asian")));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let f = filter(Some("vegan"), None, default_scope());
        let record = CanonicalRecord::from_fields([("recipe_name", json!("vegan pie"))]);
        assert!(!f.matches(&record));
    }

    #[test]
    fn test_apply_windows_after_filtering() {
        let records = vec![
            rec("vegan", "A", "x"),
            rec("keto", "B", "x"),
            rec("vegan", "C", "x"),
            rec("vegan", "D", "x"),
        ];
        let mut f = filter(Some("vegan"), None, default_scope());
        f.offset = 1;
        f.limit = 1;

        let page = f.apply(records);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].recipe_name(), Some("C"));
    }

    #[test]
    fn test_unicode_needle_matches_any_case() {
        let f = filter(Some("CRÈME"), None, default_scope());
        assert!(f.matches(&rec("Crème-Vegan", "Tart", "french")));
        assert!(!f.is_sql_foldable());
        assert!(filter(Some("vegan"), Some("bowl"), default_scope()).is_sql_foldable());
    }

    #[tokio::test]
    async fn test_bounded_times_out_as_store_io() {
        let result: Result<()> = bounded(Duration::from_millis(10), "slow read", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::StoreIo(msg)) if msg.contains("slow read")));
    }
}
