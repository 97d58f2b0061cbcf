//! Period-over-period statistics plus a generated recommendation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthorizedUser;
use crate::error::{ApiError, ApiResult};
use crate::insight::PeriodData;
use crate::state::AppState;

const DEFAULT_RANGE_HOURS: i64 = 24;
const MAX_RANGE_HOURS: i64 = 168;

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    pub range_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MetricChanges {
    pub hrv_change_percent: f64,
    pub sleep_duration_change: f64,
    pub workout_calorie_change: f64,
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub period_hours: i64,
    pub current: PeriodData,
    pub previous: PeriodData,
    pub changes: MetricChanges,
    pub insight: String,
}

/// Current window is the last `range_hours` from `now`; the previous window
/// is the same duration immediately before it.
fn periods(now: DateTime<Utc>, range_hours: i64) -> ((DateTime<Utc>, DateTime<Utc>), (DateTime<Utc>, DateTime<Utc>)) {
    let current_start = now - Duration::hours(range_hours);
    let previous_start = now - Duration::hours(range_hours * 2);
    ((current_start, now), (previous_start, current_start))
}

async fn period_data(
    state: &AppState,
    user_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ApiResult<PeriodData> {
    Ok(PeriodData {
        hrv: state.store.hrv_stats(user_id, start, end).await?,
        sleep: state.store.sleep_stats(user_id, start, end).await?,
        workout: state.store.workout_stats(user_id, start, end).await?,
    })
}

#[axum::debug_handler]
pub async fn get_insights(
    State(state): State<Arc<AppState>>,
    user: AuthorizedUser,
    Query(query): Query<InsightsQuery>,
) -> ApiResult<Json<InsightsResponse>> {
    let range_hours = query.range_hours.unwrap_or(DEFAULT_RANGE_HOURS);
    if !(1..=MAX_RANGE_HOURS).contains(&range_hours) {
        return Err(ApiError::BadRequest(format!(
            "range_hours must be between 1 and {MAX_RANGE_HOURS}"
        )));
    }

    let ((cur_start, cur_end), (prev_start, prev_end)) = periods(Utc::now(), range_hours);
    let current = period_data(&state, &user.id, cur_start, cur_end).await?;
    let previous = period_data(&state, &user.id, prev_start, prev_end).await?;

    let hrv_change_percent = if previous.hrv.avg > 0.0 {
        (current.hrv.avg - previous.hrv.avg) / previous.hrv.avg * 100.0
    } else {
        0.0
    };
    let changes = MetricChanges {
        hrv_change_percent,
        sleep_duration_change: current.sleep.avg_duration_hours - previous.sleep.avg_duration_hours,
        workout_calorie_change: current.workout.total_calories - previous.workout.total_calories,
    };

    let insight = state.insight.generate(&current, &previous, range_hours).await;

    Ok(Json(InsightsResponse {
        period_hours: range_hours,
        current,
        previous,
        changes,
        insight,
    }))
}
