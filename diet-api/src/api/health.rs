//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Configured store backend
    pub backend: String,
}

/// GET /health
///
/// Liveness only: answers without touching the store.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "diet-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.backend().as_str().to_string(),
    })
}

/// Build health check routes (`/health` and `/api/health`)
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
}
