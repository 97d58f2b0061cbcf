//! Storage access through a sqlx SQLite pool.
//!
//! Two tables hold everything: `health_metrics` for scalar series (HRV,
//! workout calories, anything the exporter sends by name) and `sleep_metrics`
//! for sessions. Writes go through `ON CONFLICT ... DO NOTHING` against the
//! natural key, which is the sole concurrency-control mechanism: first write
//! wins, re-delivery is a no-op.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::IngestError;
use crate::extract::{MetricRow, SleepRow, WORKOUT_METRIC};

/// Metric name the exporter uses for heart-rate variability.
pub const HRV_METRIC: &str = "heart_rate_variability";

/// Optional time window; each bound is inclusive when given.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One `(timestamp, value)` pair served by the query endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// HRV aggregate over a period; zeros when the period holds no rows.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MetricStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SleepStats {
    pub avg_duration_hours: f64,
    pub avg_efficiency: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WorkoutStats {
    pub total_calories: f64,
    pub session_count: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect and run migrations. A failure here is the call-level
    /// storage-unavailable condition; nothing downstream runs without a pool.
    pub async fn connect(database_url: &str) -> Result<Self, IngestError> {
        // Create the SQLite file on first run.
        let options = if database_url.starts_with("sqlite:") && !database_url.contains('?') {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };
        let pool = SqlitePool::connect(&options)
            .await
            .map_err(|e| IngestError::StorageUnavailable(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Cheap connectivity probe. Run at ingestion-call start so that an
    /// unreachable store fails the call atomically instead of surfacing as a
    /// skip on every record.
    pub async fn ping(&self) -> Result<(), IngestError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| IngestError::StorageUnavailable(e.to_string()))
    }

    pub async fn migrate(&self) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS health_metrics (
                user_id TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                metric_unit TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                value REAL NOT NULL,
                UNIQUE (user_id, metric_name, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sleep_metrics (
                user_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration_total_minutes INTEGER NOT NULL,
                duration_in_bed_minutes INTEGER NOT NULL,
                duration_awake_minutes INTEGER NOT NULL,
                duration_light_minutes INTEGER NOT NULL,
                duration_deep_minutes INTEGER NOT NULL,
                duration_rem_minutes INTEGER NOT NULL,
                efficiency REAL NOT NULL,
                UNIQUE (user_id, start_time)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert-or-ignore one scalar metric row. On natural-key collision the
    /// incoming row is discarded and the stored one left untouched.
    pub async fn insert_metric_row(
        &self,
        user_id: &str,
        row: &MetricRow,
    ) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            INSERT INTO health_metrics (user_id, metric_name, metric_unit, timestamp, value)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, metric_name, timestamp) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&row.metric_name)
        .bind(&row.metric_unit)
        .bind(row.timestamp)
        .bind(row.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert-or-ignore one sleep session row, keyed on `(user, start)`.
    pub async fn insert_sleep_row(&self, user_id: &str, row: &SleepRow) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            INSERT INTO sleep_metrics (
                user_id, start_time, end_time, duration_total_minutes,
                duration_in_bed_minutes, duration_awake_minutes,
                duration_light_minutes, duration_deep_minutes,
                duration_rem_minutes, efficiency
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, start_time) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(row.start_time)
        .bind(row.end_time)
        .bind(row.duration_total_minutes)
        .bind(row.duration_in_bed_minutes)
        .bind(row.duration_awake_minutes)
        .bind(row.duration_light_minutes)
        .bind(row.duration_deep_minutes)
        .bind(row.duration_rem_minutes)
        .bind(row.efficiency)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Range-filtered scalar series for one metric name, ascending.
    pub async fn metric_points(
        &self,
        user_id: &str,
        metric_name: &str,
        range: TimeRange,
        limit: i64,
    ) -> Result<Vec<MetricPoint>, IngestError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT timestamp, value FROM health_metrics WHERE user_id = ",
        );
        qb.push_bind(user_id);
        qb.push(" AND metric_name = ");
        qb.push_bind(metric_name);
        push_range(&mut qb, "timestamp", range);
        qb.push(" ORDER BY timestamp ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| {
                Ok(MetricPoint {
                    timestamp: r.try_get("timestamp")?,
                    value: r.try_get("value")?,
                })
            })
            .collect()
    }

    /// Sleep sessions served as duration-in-hours keyed by session start.
    pub async fn sleep_points(
        &self,
        user_id: &str,
        range: TimeRange,
        limit: i64,
    ) -> Result<Vec<MetricPoint>, IngestError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT start_time AS timestamp, duration_total_minutes / 60.0 AS value \
             FROM sleep_metrics WHERE user_id = ",
        );
        qb.push_bind(user_id);
        push_range(&mut qb, "start_time", range);
        qb.push(" ORDER BY start_time ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| {
                Ok(MetricPoint {
                    timestamp: r.try_get("timestamp")?,
                    value: r.try_get("value")?,
                })
            })
            .collect()
    }

    /// Total matching rows for pagination, ignoring `limit`.
    pub async fn metric_count(
        &self,
        user_id: &str,
        metric_name: &str,
        range: TimeRange,
    ) -> Result<i64, IngestError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS n FROM health_metrics WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND metric_name = ");
        qb.push_bind(metric_name);
        push_range(&mut qb, "timestamp", range);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("n")?)
    }

    pub async fn sleep_count(&self, user_id: &str, range: TimeRange) -> Result<i64, IngestError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS n FROM sleep_metrics WHERE user_id = ");
        qb.push_bind(user_id);
        push_range(&mut qb, "start_time", range);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("n")?)
    }

    /// HRV avg/min/max over a closed period.
    pub async fn hrv_stats(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricStats, IngestError> {
        let row = sqlx::query(
            r#"
            SELECT AVG(value) AS avg_val, MIN(value) AS min_val, MAX(value) AS max_val
            FROM health_metrics
            WHERE user_id = ? AND metric_name = ? AND timestamp BETWEEN ? AND ?
            "#,
        )
        .bind(user_id)
        .bind(HRV_METRIC)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let avg: Option<f64> = row.try_get("avg_val")?;
        Ok(MetricStats {
            avg: avg.unwrap_or(0.0),
            min: row.try_get::<Option<f64>, _>("min_val")?.unwrap_or(0.0),
            max: row.try_get::<Option<f64>, _>("max_val")?.unwrap_or(0.0),
        })
    }

    /// Average sleep duration (hours) and efficiency over a closed period.
    pub async fn sleep_stats(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SleepStats, IngestError> {
        let row = sqlx::query(
            r#"
            SELECT AVG(duration_total_minutes) / 60.0 AS avg_duration_hours,
                   AVG(efficiency) AS avg_efficiency
            FROM sleep_metrics
            WHERE user_id = ? AND start_time BETWEEN ? AND ?
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(SleepStats {
            avg_duration_hours: row
                .try_get::<Option<f64>, _>("avg_duration_hours")?
                .unwrap_or(0.0),
            avg_efficiency: row
                .try_get::<Option<f64>, _>("avg_efficiency")?
                .unwrap_or(0.0),
        })
    }

    /// Workout calories and session count over a closed period. Session count
    /// is the number of stored workout rows (one per calorie-bearing workout).
    pub async fn workout_stats(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WorkoutStats, IngestError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(value), 0.0) AS total_calories, COUNT(*) AS session_count
            FROM health_metrics
            WHERE user_id = ? AND metric_name = ? AND timestamp BETWEEN ? AND ?
            "#,
        )
        .bind(user_id)
        .bind(WORKOUT_METRIC)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(WorkoutStats {
            total_calories: row.try_get("total_calories")?,
            session_count: row.try_get("session_count")?,
        })
    }
}

fn push_range(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, range: TimeRange) {
    if let Some(from) = range.from {
        qb.push(format!(" AND {column} >= "));
        qb.push_bind(from);
    }
    if let Some(to) = range.to {
        qb.push(format!(" AND {column} <= "));
        qb.push_bind(to);
    }
}
