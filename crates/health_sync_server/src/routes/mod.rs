//! HTTP surface: webhook ingestion, metric queries, insights, liveness.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;

pub mod ingest;
pub mod insights;
pub mod metrics;

/// Outer bound on any single request; the insight collaborator's own 30s
/// timeout sits inside it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/hae/webhook/{user_id}", post(ingest::hae_webhook))
        .route("/api/metrics", get(metrics::get_metrics))
        .route("/api/insights", get(insights::get_insights))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .with_state(state)
}

#[axum::debug_handler]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[axum::debug_handler]
async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    ([("content-type", "text/plain; version=0.0.4")], body)
}
