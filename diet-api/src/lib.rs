//! diet-api library - read-only recipe query service
//!
//! Serves paginated, filtered recipe records from whichever store the process is
//! configured for. Every response carries `Access-Control-Allow-Origin: *`.

use axum::Router;
use diet_common::config::BackendKind;
use diet_common::QueryEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Query engine over the configured store (read-only)
    pub engine: QueryEngine,
}

impl AppState {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    pub fn backend(&self) -> BackendKind {
        self.engine.store().backend()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::recipe_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
