//! Payload model for the export webhook.
//!
//! The envelope and metric blocks are parsed strictly; the records *inside*
//! a block stay as raw JSON until per-record validation so that one malformed
//! data point cannot take down its neighbours. Workout energy and heart-rate
//! sub-records are open schemas carried through untyped.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;

use crate::IngestError;
use crate::timestamp::{deserialize_export_timestamp, deserialize_opt_export_timestamp};

/// Metric block name that routes a block through sleep extraction.
pub const SLEEP_ANALYSIS: &str = "sleep_analysis";

/// Top-level webhook envelope: `{data: {metrics, workouts}, request_id?}`.
#[derive(Debug, Deserialize)]
pub struct ExportPayload {
    pub data: DataNode,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DataNode {
    #[serde(default)]
    pub metrics: Vec<RawMetricBlock>,
    #[serde(default)]
    pub workouts: Vec<Value>,
}

/// One metric block; `data` elements are validated one by one downstream.
#[derive(Debug, Deserialize)]
pub struct RawMetricBlock {
    pub name: String,
    pub units: String,
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Closed set of shapes a metric block can take, decided once per block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricShape {
    Sleep,
    Common,
}

impl RawMetricBlock {
    /// Tag dispatch on the block's `name` field. Evaluated once per block;
    /// every data point inside shares the classification.
    pub fn shape(&self) -> MetricShape {
        if self.name == SLEEP_ANALYSIS {
            MetricShape::Sleep
        } else {
            MetricShape::Common
        }
    }
}

/// Parse the envelope. Failure here is the call-level `PayloadShape` error;
/// everything below it is recovered per record.
pub fn parse_envelope(raw: Value) -> Result<ExportPayload, IngestError> {
    serde_json::from_value(raw).map_err(|e| IngestError::PayloadShape(e.to_string()))
}

/// One scalar measurement (HRV, steps, resting heart rate, ...).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CommonPoint {
    #[serde(deserialize_with = "deserialize_export_timestamp")]
    pub date: DateTime<FixedOffset>,
    pub qty: f64,
}

/// A night of sleep as the exporter reports it, hour-denominated.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SleepEntry {
    #[serde(deserialize_with = "deserialize_export_timestamp")]
    pub date: DateTime<FixedOffset>,
    pub asleep: f64,
    pub awake: f64,
    pub core: f64,
    pub deep: f64,
    pub rem: f64,
    #[serde(rename = "sleepStart", deserialize_with = "deserialize_export_timestamp")]
    pub sleep_start: DateTime<FixedOffset>,
    #[serde(rename = "sleepEnd", deserialize_with = "deserialize_export_timestamp")]
    pub sleep_end: DateTime<FixedOffset>,
    pub source: String,
    #[serde(rename = "totalSleep")]
    pub total_sleep: f64,
}

/// One element of a workout's active-energy timeseries.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EnergyPoint {
    #[serde(deserialize_with = "deserialize_export_timestamp")]
    pub date: DateTime<FixedOffset>,
    pub qty: f64,
    #[serde(default)]
    pub source: Option<String>,
    pub units: String,
}

/// Aggregated heart-rate values inside a workout timeseries element.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct HeartRateValues {
    #[serde(rename = "Avg", default)]
    pub avg: Option<f64>,
    #[serde(rename = "Min", default)]
    pub min: Option<f64>,
    #[serde(rename = "Max", default)]
    pub max: Option<f64>,
}

/// One element of a workout's heart-rate timeseries.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HeartRatePoint {
    #[serde(deserialize_with = "deserialize_export_timestamp")]
    pub date: DateTime<FixedOffset>,
    pub qty: HeartRateValues,
    #[serde(default)]
    pub source: Option<String>,
    pub units: String,
}

/// A workout record. Every field is optional and the nested energy and
/// heart-rate payloads keep their raw JSON form; the extractor inspects them
/// opportunistically.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkoutRecord {
    #[serde(default, deserialize_with = "deserialize_opt_export_timestamp")]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "deserialize_opt_export_timestamp")]
    pub end: Option<DateTime<FixedOffset>>,
    /// Explicit duration hint in minutes, used when start/end are absent.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(rename = "workoutType", default)]
    pub workout_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Single aggregate energy object, e.g. `{"qty": 320.5, "units": "cal"}`.
    #[serde(rename = "activeEnergyBurned", default)]
    pub active_energy_burned: Option<serde_json::Map<String, Value>>,
    /// Alternative encoding: a timeseries whose `qty` values are summed.
    #[serde(rename = "activeEnergy", default)]
    pub active_energy: Option<Vec<Value>>,
    #[serde(rename = "heartRateData", default)]
    pub heart_rate_data: Option<Vec<Value>>,
    #[serde(rename = "heartRateRecovery", default)]
    pub heart_rate_recovery: Option<Vec<Value>>,
    #[serde(default)]
    pub intensity: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub source: Option<String>,
}

fn shape_error(shape: &'static str, e: serde_json::Error) -> IngestError {
    IngestError::RecordShape {
        shape,
        reason: e.to_string(),
    }
}

/// Validate one data point of a common metric block.
pub fn validate_common_point(raw: &Value) -> Result<CommonPoint, IngestError> {
    serde_json::from_value(raw.clone()).map_err(|e| shape_error("common point", e))
}

/// Validate one data point of a `sleep_analysis` block.
pub fn validate_sleep_entry(raw: &Value) -> Result<SleepEntry, IngestError> {
    serde_json::from_value(raw.clone()).map_err(|e| shape_error("sleep session", e))
}

/// Validate one element of an active-energy timeseries.
pub fn validate_energy_point(raw: &Value) -> Result<EnergyPoint, IngestError> {
    serde_json::from_value(raw.clone()).map_err(|e| shape_error("energy point", e))
}

/// Validate one element of a heart-rate timeseries.
pub fn validate_heart_rate_point(raw: &Value) -> Result<HeartRatePoint, IngestError> {
    serde_json::from_value(raw.clone()).map_err(|e| shape_error("heart-rate point", e))
}

/// Validate one record of the top-level workout array.
pub fn validate_workout(raw: &Value) -> Result<WorkoutRecord, IngestError> {
    serde_json::from_value(raw.clone()).map_err(|e| shape_error("workout record", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_defaults_missing_arrays_to_empty() {
        let payload = parse_envelope(json!({"data": {}})).expect("envelope");
        assert!(payload.data.metrics.is_empty());
        assert!(payload.data.workouts.is_empty());
        assert!(payload.request_id.is_none());
    }

    #[test]
    fn envelope_without_data_node_is_a_payload_shape_error() {
        let res = parse_envelope(json!({"metrics": []}));
        assert!(matches!(res, Err(IngestError::PayloadShape(_))));
    }

    #[test]
    fn block_named_sleep_analysis_discriminates_as_sleep() {
        let block = RawMetricBlock {
            name: SLEEP_ANALYSIS.into(),
            units: "hr".into(),
            data: vec![],
        };
        assert_eq!(block.shape(), MetricShape::Sleep);
    }

    #[test]
    fn any_other_block_name_discriminates_as_common() {
        let block = RawMetricBlock {
            name: "heart_rate_variability".into(),
            units: "ms".into(),
            data: vec![],
        };
        assert_eq!(block.shape(), MetricShape::Common);
    }

    #[test]
    fn common_point_parses_export_timestamp() {
        let point = validate_common_point(&json!({
            "date": "2025-06-25 07:30:00 +0200",
            "qty": 52.3
        }))
        .expect("point");
        assert_eq!(point.qty, 52.3);
    }

    #[test]
    fn common_point_without_qty_is_a_record_shape_error() {
        let res = validate_common_point(&json!({"date": "2025-06-25 07:30:00 +0200"}));
        assert!(matches!(res, Err(IngestError::RecordShape { shape, .. }) if shape == "common point"));
    }

    #[test]
    fn sleep_entry_requires_all_stage_fields() {
        let res = validate_sleep_entry(&json!({
            "date": "2025-06-25 00:00:00 +0200",
            "asleep": 7.1,
            "sleepStart": "2025-06-24 23:10:00 +0200",
            "sleepEnd": "2025-06-25 07:05:00 +0200",
            "source": "Watch",
            "totalSleep": 7.1
        }));
        assert!(res.is_err());
    }

    #[test]
    fn workout_tolerates_unknown_nested_energy_fields() {
        let workout = validate_workout(&json!({
            "start": "2025-07-01 06:05:54 +0200",
            "end": "2025-07-01 06:50:12 +0200",
            "activeEnergyBurned": {"qty": 412.0, "units": "cal", "vendorExtra": {"x": 1}},
            "heartRateData": [{"date": "2025-07-01 06:06:00 +0200", "qty": {"Avg": 132.0}, "units": "count/min"}]
        }))
        .expect("workout");
        assert!(workout.active_energy_burned.is_some());
        assert_eq!(workout.heart_rate_data.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn workout_with_non_object_energy_aggregate_is_rejected() {
        let res = validate_workout(&json!({"activeEnergyBurned": 412.0}));
        assert!(matches!(res, Err(IngestError::RecordShape { shape, .. }) if shape == "workout record"));
    }

    #[test]
    fn heart_rate_point_accepts_partial_aggregates() {
        let point = validate_heart_rate_point(&json!({
            "date": "2025-07-01 06:06:00 +0200",
            "qty": {"Avg": 131.5, "Max": 164.0},
            "units": "count/min"
        }))
        .expect("point");
        assert_eq!(point.qty.avg, Some(131.5));
        assert_eq!(point.qty.min, None);
    }

    #[test]
    fn energy_point_with_iso_timestamp_parses() {
        let point = validate_energy_point(&json!({
            "date": "2025-07-01T06:10:00Z",
            "qty": 12.5,
            "units": "cal"
        }))
        .expect("point");
        assert_eq!(point.qty, 12.5);
    }
}
