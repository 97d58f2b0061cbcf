//! Normalization of the export tool's datetime strings.
//!
//! The mobile exporter emits timestamps in the Swift/ObjC style
//! `"2025-06-25 00:00:00 +0200"` (numeric offset, no colon). Some payloads
//! carry RFC3339 instead, occasionally with a trailing `Z`.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::IngestError;

/// Fixed pattern tried first: `YYYY-MM-DD HH:MM:SS ±HHMM`.
const EXPORT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Parse an export timestamp string into an instant with offset.
///
/// Attempt 1 is the exporter's own format; attempt 2 treats the input as
/// RFC3339 after rewriting a trailing `Z` to `+00:00`. No timezone is assumed
/// beyond what the string encodes.
pub fn parse_export_timestamp(s: &str) -> Result<DateTime<FixedOffset>, IngestError> {
    if let Ok(dt) = DateTime::parse_from_str(s, EXPORT_FORMAT) {
        return Ok(dt);
    }
    let iso = if let Some(stripped) = s.strip_suffix('Z') {
        format!("{stripped}+00:00")
    } else {
        s.to_string()
    };
    DateTime::parse_from_rfc3339(&iso).map_err(|_| IngestError::TimestampFormat(s.to_string()))
}

/// Accept an already-instant JSON number (Unix epoch seconds) unchanged.
fn instant_from_epoch(secs: f64) -> Result<DateTime<FixedOffset>, IngestError> {
    let millis = (secs * 1000.0).round() as i64;
    match Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => Ok(dt.fixed_offset()),
        _ => Err(IngestError::TimestampFormat(secs.to_string())),
    }
}

/// Serde adapter for record fields holding export timestamps.
pub fn deserialize_export_timestamp<'de, D>(
    deserializer: D,
) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => parse_export_timestamp(&s).map_err(D::Error::custom),
        serde_json::Value::Number(n) => {
            let secs = n.as_f64().ok_or_else(|| D::Error::custom("non-finite epoch"))?;
            instant_from_epoch(secs).map_err(D::Error::custom)
        }
        other => Err(D::Error::custom(format!(
            "expected timestamp string or epoch number, got {other}"
        ))),
    }
}

/// Same adapter for optional fields; absent or null resolves to `None`.
pub fn deserialize_opt_export_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => parse_export_timestamp(&s)
            .map(Some)
            .map_err(D::Error::custom),
        Some(serde_json::Value::Number(n)) => {
            let secs = n.as_f64().ok_or_else(|| D::Error::custom("non-finite epoch"))?;
            instant_from_epoch(secs).map(Some).map_err(D::Error::custom)
        }
        Some(other) => Err(D::Error::custom(format!(
            "expected timestamp string or epoch number, got {other}"
        ))),
    }
}
