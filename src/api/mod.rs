//! API module
//!
//! HTTP API endpoints.

pub mod routes;

pub use routes::create_router;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::engine::ComplianceEngine;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: ComplianceEngine,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(routes::health_check))
        .nest("/api/v1", create_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
