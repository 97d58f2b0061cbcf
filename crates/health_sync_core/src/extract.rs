//! Derived-value computation between validated records and storage rows.
//!
//! All arithmetic here mirrors what the companion mobile exporter expects to
//! see back in the dashboards: hour fields become truncated integer minutes,
//! efficiency is total sleep over time in bed, and workout calories come from
//! whichever of the two energy encodings the record carries.

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;

use crate::IngestError;
use crate::records::{
    CommonPoint, HeartRateValues, RawMetricBlock, SleepEntry, WorkoutRecord,
    validate_heart_rate_point,
};

/// Metric name under which workout calorie totals are stored.
pub const WORKOUT_METRIC: &str = "workout";
/// Unit attached to workout calorie rows.
pub const WORKOUT_UNIT: &str = "cal";

/// Row destined for the `health_metrics` table.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRow {
    pub metric_name: String,
    pub metric_unit: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Row destined for the `sleep_metrics` table.
#[derive(Clone, Debug, PartialEq)]
pub struct SleepRow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_total_minutes: i64,
    pub duration_in_bed_minutes: i64,
    pub duration_awake_minutes: i64,
    pub duration_light_minutes: i64,
    pub duration_deep_minutes: i64,
    pub duration_rem_minutes: i64,
    pub efficiency: f64,
}

/// Everything the workout extractor derives; only `row` is persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkoutExtract {
    pub row: Option<MetricRow>,
    pub duration_minutes: f64,
    pub heart_rate: Option<HeartRateValues>,
}

fn hours_to_minutes(hours: f64) -> i64 {
    (hours * 60.0) as i64
}

/// Common metric point -> one `health_metrics` row, unit taken from the block.
pub fn extract_common(block: &RawMetricBlock, point: &CommonPoint) -> MetricRow {
    MetricRow {
        metric_name: block.name.clone(),
        metric_unit: block.units.clone(),
        timestamp: point.date.with_timezone(&Utc),
        value: point.qty,
    }
}

/// Sleep entry -> one `sleep_metrics` row.
///
/// Core sleep lands in the light-sleep column: the exporter's vocabulary
/// calls light sleep "core", the schema predates it.
pub fn extract_sleep(entry: &SleepEntry) -> SleepRow {
    let total_minutes = hours_to_minutes(entry.total_sleep);
    let in_bed_minutes = (entry.sleep_end - entry.sleep_start).num_seconds() / 60;
    let efficiency = if in_bed_minutes > 0 {
        total_minutes as f64 / in_bed_minutes as f64 * 100.0
    } else {
        0.0
    };

    SleepRow {
        start_time: entry.sleep_start.with_timezone(&Utc),
        end_time: entry.sleep_end.with_timezone(&Utc),
        duration_total_minutes: total_minutes,
        duration_in_bed_minutes: in_bed_minutes,
        duration_awake_minutes: hours_to_minutes(entry.awake),
        duration_light_minutes: hours_to_minutes(entry.core),
        duration_deep_minutes: hours_to_minutes(entry.deep),
        duration_rem_minutes: hours_to_minutes(entry.rem),
        efficiency,
    }
}

/// Pull a required numeric `qty` out of an open-schema energy object.
fn qty_of(obj: &serde_json::Map<String, Value>) -> Result<Option<f64>, IngestError> {
    match obj.get("qty") {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            IngestError::Extraction(format!("energy qty is not numeric: {v}"))
        }),
    }
}

/// Total calories across the two mutually-exclusive energy encodings.
///
/// A single `activeEnergyBurned` aggregate wins over the `activeEnergy`
/// timeseries; series elements without a `qty` contribute nothing.
fn total_calories(workout: &WorkoutRecord) -> Result<f64, IngestError> {
    if let Some(aggregate) = &workout.active_energy_burned {
        return Ok(qty_of(aggregate)?.unwrap_or(0.0));
    }
    let mut total = 0.0;
    if let Some(series) = &workout.active_energy {
        for element in series {
            if let Some(obj) = element.as_object()
                && let Some(qty) = qty_of(obj)?
            {
                total += qty;
            }
        }
    }
    Ok(total)
}

/// Best-effort heart-rate summary over the workout's `heartRateData` series.
/// Malformed elements are simply ignored; this feeds logging only.
fn heart_rate_summary(series: &[Value]) -> Option<HeartRateValues> {
    let mut avg_sum = 0.0;
    let mut avg_count = 0usize;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    for element in series {
        let Ok(point) = validate_heart_rate_point(element) else {
            continue;
        };
        if let Some(a) = point.qty.avg {
            avg_sum += a;
            avg_count += 1;
        }
        if let Some(m) = point.qty.min {
            min = Some(min.map_or(m, |cur: f64| cur.min(m)));
        }
        if let Some(m) = point.qty.max {
            max = Some(max.map_or(m, |cur: f64| cur.max(m)));
        }
    }
    if avg_count == 0 && min.is_none() && max.is_none() {
        return None;
    }
    Some(HeartRateValues {
        avg: (avg_count > 0).then(|| avg_sum / avg_count as f64),
        min,
        max,
    })
}

/// Workout record -> calorie row plus derived duration.
///
/// A row is produced only when total calories are positive; zero-calorie
/// workouts are a valid no-op, not an error. The row timestamp is the
/// workout's start when present, otherwise `now` (the ingestion call's
/// current time).
pub fn extract_workout(
    workout: &WorkoutRecord,
    now: DateTime<Utc>,
) -> Result<WorkoutExtract, IngestError> {
    let calories = total_calories(workout)?;
    if calories < 0.0 {
        return Err(IngestError::Extraction(format!(
            "negative calorie total: {calories}"
        )));
    }

    let duration_minutes = match (workout.start, workout.end) {
        (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 60.0,
        _ => workout.duration.unwrap_or(0.0),
    };

    let timestamp = workout
        .start
        .map_or(now, |s: DateTime<FixedOffset>| s.with_timezone(&Utc));

    let row = (calories > 0.0).then(|| MetricRow {
        metric_name: WORKOUT_METRIC.into(),
        metric_unit: WORKOUT_UNIT.into(),
        timestamp,
        value: calories,
    });

    let heart_rate = workout
        .heart_rate_data
        .as_deref()
        .and_then(heart_rate_summary);

    Ok(WorkoutExtract {
        row,
        duration_minutes,
        heart_rate,
    })
}
