//! The export tool's webhook.
//!
//! Whatever happens, the caller gets the full response shape back: the
//! exporter retries on anything else, and a retry of a half-failed batch is
//! exactly what the idempotent writer is for.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use tracing::{error, info};

use health_sync_core::{IngestReport, ingest_payload};

use crate::auth::verify_webhook_key;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub processed: ProcessedCounts,
    pub request_hash: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ProcessedCounts {
    pub metrics: u64,
    pub sleep: u64,
    pub workouts: u64,
}

impl WebhookResponse {
    fn success(user_id: &str, report: &IngestReport) -> Self {
        Self {
            success: true,
            message: format!("Successfully processed health data for user {user_id}"),
            processed: ProcessedCounts {
                metrics: report.metrics,
                sleep: report.sleep,
                workouts: report.workouts,
            },
            request_hash: "success".into(),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            processed: ProcessedCounts::default(),
            request_hash: "error".into(),
        }
    }
}

#[axum::debug_handler]
pub async fn hae_webhook(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    counter!("health_sync_webhook_calls_total").increment(1);

    if !verify_webhook_key(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(WebhookResponse::failure("invalid or missing API key".into())),
        );
    }

    // Parse leniently by hand: a syntactically broken body must still get
    // the response shape, not a framework rejection.
    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            error!(user_id, error = %e, "webhook body is not JSON");
            return (
                StatusCode::OK,
                Json(WebhookResponse::failure(format!(
                    "Failed to process health data: {e}"
                ))),
            );
        }
    };

    let call_id = raw
        .get("request_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match ingest_payload(&state.store, &user_id, raw, Utc::now()).await {
        Ok(report) => {
            info!(
                user_id,
                call_id,
                metrics = report.metrics,
                sleep = report.sleep,
                workouts = report.workouts,
                skipped = report.skipped.len(),
                "processed export payload"
            );
            (StatusCode::OK, Json(WebhookResponse::success(&user_id, &report)))
        }
        Err(e) => {
            error!(user_id, call_id, error = %e, "webhook call failed");
            (
                StatusCode::OK,
                Json(WebhookResponse::failure(format!(
                    "Failed to process health data: {e}"
                ))),
            )
        }
    }
}
