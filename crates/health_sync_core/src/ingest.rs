//! Ingestion orchestration: discriminate, validate, extract, write.
//!
//! One call walks every metric block and the workout array, isolating
//! failures at the single-record level. A bad data point is logged, counted
//! as skipped and left behind; the rest of its block continues. Only two
//! conditions fail the whole call: an envelope that does not parse, and a
//! storage pool that cannot be reached (both handled by the caller).

use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::IngestError;
use crate::extract::{extract_common, extract_sleep, extract_workout};
use crate::records::{self, MetricShape, RawMetricBlock};
use crate::store::Store;

/// Per-call outcome summary plus the diagnostics for every skipped record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    pub metrics: u64,
    pub sleep: u64,
    pub workouts: u64,
    pub skipped: Vec<SkipDiagnostic>,
}

/// Where and why one record was dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct SkipDiagnostic {
    /// Block name, or "workouts" for the top-level workout array.
    pub block: String,
    /// Index of the record within its array.
    pub index: usize,
    pub reason: String,
}

/// Run one ingestion call against an already-parsed JSON document.
///
/// `now` is the call's current time, stamped onto workouts without a start;
/// passing it in keeps the pipeline deterministic under test.
pub async fn ingest_payload(
    store: &Store,
    user_id: &str,
    raw: Value,
    now: DateTime<Utc>,
) -> Result<IngestReport, IngestError> {
    let payload = records::parse_envelope(raw)?;
    store.ping().await?;
    let mut report = IngestReport::default();

    debug!(
        user_id,
        metrics = payload.data.metrics.len(),
        workouts = payload.data.workouts.len(),
        request_id = payload.request_id.as_deref().unwrap_or("-"),
        "processing export payload"
    );

    for block in &payload.data.metrics {
        match block.shape() {
            MetricShape::Sleep => ingest_sleep_block(store, user_id, block, &mut report).await,
            MetricShape::Common => ingest_common_block(store, user_id, block, &mut report).await,
        }
    }

    ingest_workouts(store, user_id, &payload.data.workouts, now, &mut report).await;

    counter!("health_sync_records_inserted_total")
        .increment(report.metrics + report.sleep + report.workouts);
    counter!("health_sync_records_skipped_total").increment(report.skipped.len() as u64);

    Ok(report)
}

async fn ingest_common_block(
    store: &Store,
    user_id: &str,
    block: &RawMetricBlock,
    report: &mut IngestReport,
) {
    for (index, raw) in block.data.iter().enumerate() {
        let outcome = async {
            let point = records::validate_common_point(raw)?;
            let row = extract_common(block, &point);
            store.insert_metric_row(user_id, &row).await
        }
        .await;

        match outcome {
            Ok(()) => report.metrics += 1,
            Err(e) => skip(report, &block.name, index, e),
        }
    }
}

async fn ingest_sleep_block(
    store: &Store,
    user_id: &str,
    block: &RawMetricBlock,
    report: &mut IngestReport,
) {
    for (index, raw) in block.data.iter().enumerate() {
        let outcome = async {
            let entry = records::validate_sleep_entry(raw)?;
            let row = extract_sleep(&entry);
            store.insert_sleep_row(user_id, &row).await
        }
        .await;

        match outcome {
            Ok(()) => report.sleep += 1,
            Err(e) => skip(report, &block.name, index, e),
        }
    }
}

async fn ingest_workouts(
    store: &Store,
    user_id: &str,
    workouts: &[Value],
    now: DateTime<Utc>,
    report: &mut IngestReport,
) {
    for (index, raw) in workouts.iter().enumerate() {
        let outcome = async {
            let workout = records::validate_workout(raw)?;
            let extract = extract_workout(&workout, now)?;
            if let Some(hr) = &extract.heart_rate {
                debug!(
                    index,
                    avg = hr.avg,
                    min = hr.min,
                    max = hr.max,
                    "workout heart-rate summary"
                );
            }
            match extract.row {
                Some(row) => {
                    store.insert_metric_row(user_id, &row).await?;
                    debug!(
                        index,
                        workout_type = workout.workout_type.as_deref().unwrap_or("unknown"),
                        calories = row.value,
                        duration_minutes = extract.duration_minutes,
                        timestamp = %row.timestamp,
                        "inserted workout"
                    );
                    Ok(true)
                }
                // Zero calories: a valid no-op, not an error.
                None => Ok(false),
            }
        }
        .await;

        match outcome {
            Ok(true) => report.workouts += 1,
            Ok(false) => {}
            Err(e) => skip(report, "workouts", index, e),
        }
    }
}

fn skip(report: &mut IngestReport, block: &str, index: usize, error: IngestError) {
    warn!(block, index, error = %error, "skipping record");
    report.skipped.push(SkipDiagnostic {
        block: block.to_string(),
        index,
        reason: error.to_string(),
    });
}
