//! The voxflow conversation server
//!
//! One axum application: per-conversation WebSocket routes, health, and a
//! Prometheus metrics endpoint.

mod metrics_endpoint;
mod state;
mod ws;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use metrics_endpoint::init_metrics;
pub use state::{AppState, AssistantStore, InMemoryAssistantStore};

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint::render))
        .route("/v1/talk/:source/:assistant_id", get(ws::talk))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
