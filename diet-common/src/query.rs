//! Query engine
//!
//! Turns request parameters into a [`RecordFilter`], runs it against the configured
//! store and applies the output projection. Read-only.

use crate::config::QuerySettings;
use crate::pagination::PageRequest;
use crate::projection::Projection;
use crate::record::CanonicalRecord;
use crate::store::{fold_case, RecordFilter, RecordStore, SearchScope};
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Diet value meaning "no diet filter"
pub const ALL_DIETS: &str = "All Diets";

/// One validated recipe query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeQuery {
    pub diet: Option<String>,
    pub search: Option<String>,
    pub page: PageRequest,
    /// Overrides the configured default projection when set
    pub projection: Option<Projection>,
}

impl RecipeQuery {
    /// Validate raw request parameters
    pub fn from_params(
        diet: Option<&str>,
        search: Option<&str>,
        page: Option<&str>,
        page_size: Option<&str>,
        projection: Option<&str>,
        settings: &QuerySettings,
    ) -> Result<Self> {
        let page = PageRequest::parse(page, page_size, settings.default_page_size)?;
        let projection = match projection.map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(Projection::parse(p)?),
        };
        Ok(Self {
            diet: diet.map(str::to_string),
            search: search.map(str::to_string),
            page,
            projection,
        })
    }

    /// First page, default size, no filters
    pub fn all(settings: &QuerySettings) -> Self {
        Self {
            diet: None,
            search: None,
            page: PageRequest {
                page: 1,
                page_size: u64::from(settings.default_page_size),
            },
            projection: None,
        }
    }
}

/// Query engine over one store
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn RecordStore>,
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn RecordStore>, settings: QuerySettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Resolve the backend filter for a query
    pub fn filter_for(&self, query: &RecipeQuery) -> RecordFilter {
        let diet = query
            .diet
            .as_deref()
            .filter(|d| !d.is_empty() && *d != ALL_DIETS)
            .map(fold_case);
        let search = query
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(fold_case);
        let scope = if self.settings.search_all_fields {
            SearchScope::AllFields
        } else {
            SearchScope::Fields(self.settings.search_fields.clone())
        };

        RecordFilter {
            diet,
            search,
            scope,
            offset: query.page.offset(),
            limit: query.page.limit(),
        }
    }

    /// Canonical records for a query
    pub async fn query(&self, query: &RecipeQuery) -> Result<Vec<CanonicalRecord>> {
        let filter = self.filter_for(query);
        let records = self.store.query_page(&filter).await?;
        debug!(
            ?filter,
            backend = self.store.backend().as_str(),
            returned = records.len(),
            "Query complete"
        );
        Ok(records)
    }

    /// Records for a query in the requested (or configured) output shape
    pub async fn query_projected(&self, query: &RecipeQuery) -> Result<Vec<Map<String, Value>>> {
        let projection = query
            .projection
            .unwrap_or_else(|| Projection::from_flag(self.settings.display_projection));
        let records = self.query(query).await?;
        Ok(records.into_iter().map(|r| projection.apply(r)).collect())
    }
}
