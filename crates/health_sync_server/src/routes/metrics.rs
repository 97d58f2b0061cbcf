//! Range-filtered metric queries.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use health_sync_core::extract::WORKOUT_METRIC;
use health_sync_core::store::HRV_METRIC;
use health_sync_core::{MetricPoint, TimeRange};

use crate::auth::AuthorizedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 1000;
const MAX_LIMIT: i64 = 5000;

/// Queryable metric kinds; each maps onto its own storage shape.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRateVariability,
    Workout,
    Sleep,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub metric: MetricKind,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub data: Vec<MetricPoint>,
    pub total_count: i64,
}

#[axum::debug_handler]
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    user: AuthorizedUser,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from >= to
    {
        return Err(ApiError::BadRequest(
            "'from' date must be before 'to' date".into(),
        ));
    }

    let range = TimeRange {
        from: query.from,
        to: query.to,
    };

    let (data, total_count) = match query.metric {
        MetricKind::Sleep => (
            state.store.sleep_points(&user.id, range, limit).await?,
            state.store.sleep_count(&user.id, range).await?,
        ),
        MetricKind::HeartRateVariability => (
            state
                .store
                .metric_points(&user.id, HRV_METRIC, range, limit)
                .await?,
            state.store.metric_count(&user.id, HRV_METRIC, range).await?,
        ),
        // Workout values are calorie totals; the dashboard displays them as such.
        MetricKind::Workout => (
            state
                .store
                .metric_points(&user.id, WORKOUT_METRIC, range, limit)
                .await?,
            state
                .store
                .metric_count(&user.id, WORKOUT_METRIC, range)
                .await?,
        ),
    };

    Ok(Json(MetricsResponse { data, total_count }))
}
