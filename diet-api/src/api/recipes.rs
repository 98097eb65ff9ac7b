//! Recipe query endpoint
//!
//! `GET /api/dietapi?diet=&search=&page=&pageSize=&projection=`
//!
//! Returns a bare JSON array of records for the requested page. No total count is
//! returned; an empty array past the last page is the end-of-data signal.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use diet_common::RecipeQuery;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ApiResult;
use crate::AppState;

/// Raw query parameters; numeric validation happens in [`RecipeQuery::from_params`]
#[derive(Debug, Default, Deserialize)]
pub struct RecipeParams {
    pub diet: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub projection: Option<String>,
}

/// GET /api/dietapi
///
/// Query strings that fail to deserialize (a repeated key, say) are reported through
/// [`ApiError`](crate::error::ApiError) like every other bad parameter.
pub async fn get_recipes(
    State(state): State<AppState>,
    params: Result<Query<RecipeParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Map<String, Value>>>> {
    let Query(params) = params?;
    let query = RecipeQuery::from_params(
        params.diet.as_deref(),
        params.search.as_deref(),
        params.page.as_deref(),
        params.page_size.as_deref(),
        params.projection.as_deref(),
        state.engine.settings(),
    )?;

    let records = state.engine.query_projected(&query).await?;
    Ok(Json(records))
}

/// Build recipe routes. `/api/DietApi` is kept for clients using the old casing.
pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/api/dietapi", get(get_recipes))
        .route("/api/DietApi", get(get_recipes))
}
