//! Core ingestion pipeline for personal health telemetry.
//!
//! The mobile export tool posts a loosely-structured JSON document mixing
//! scalar metric series, sleep sessions and workout records. This crate owns
//! everything between that document and the two storage tables: timestamp
//! normalization, shape discrimination, per-record validation, derived-value
//! extraction and idempotent writes.

use thiserror::Error;

pub mod extract;
pub mod ingest;
pub mod records;
pub mod store;
pub mod timestamp;

pub use extract::{MetricRow, SleepRow};
pub use ingest::{IngestReport, SkipDiagnostic, ingest_payload};
pub use records::{ExportPayload, MetricShape, RawMetricBlock};
pub use store::{MetricPoint, MetricStats, SleepStats, Store, TimeRange, WorkoutStats};

/// Errors across the ingestion pipeline.
///
/// The first three are record-level: the orchestrator logs them, counts the
/// record as skipped and moves on. The last three fail the whole call.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("timestamp matches neither known format: {0:?}")]
    TimestampFormat(String),

    #[error("record is not a valid {shape}: {reason}")]
    RecordShape {
        shape: &'static str,
        reason: String,
    },

    #[error("extraction contradiction: {0}")]
    Extraction(String),

    #[error("payload envelope not recognized: {0}")]
    PayloadShape(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl IngestError {
    /// Whether this error fails the whole ingestion call rather than a
    /// single record.
    pub fn is_call_level(&self) -> bool {
        matches!(
            self,
            IngestError::PayloadShape(_) | IngestError::StorageUnavailable(_)
        )
    }
}
