//! Outbound natural-language insight generation.
//!
//! The collaborator is a black box: structured period statistics in, one
//! free-text recommendation out. Every failure mode (missing credentials,
//! non-2xx, transport error, timeout) degrades to a static sentence; the
//! insights endpoint never fails because the generator did.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use health_sync_core::{MetricStats, SleepStats, WorkoutStats};

use crate::config::InsightConfig;

/// Statistics for one comparison period, also serialized into the insights
/// response body.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PeriodData {
    pub hrv: MetricStats,
    pub sleep: SleepStats,
    pub workout: WorkoutStats,
}

pub const FALLBACK_UNCONFIGURED: &str =
    "AI insights temporarily unavailable. Please configure insight service credentials.";
pub const FALLBACK_SERVICE_ERROR: &str =
    "AI insights temporarily unavailable due to service error.";
pub const FALLBACK_GENERIC: &str =
    "AI insights temporarily unavailable. Analysis shows your metrics are being tracked successfully.";

const SYSTEM_PROMPT: &str = "You are a holistic health coach. Provide concise, actionable \
                             health recommendations based on biometric trends.";

/// Bounded timeout on the outbound call; beyond it the static fallback wins.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an outbound generation attempt produced no usable text. Never leaves
/// this module as an error: each case maps onto one fallback sentence.
#[derive(Debug, Error)]
enum UpstreamInsightError {
    #[error("insight service not configured")]
    Unconfigured,

    #[error("insight service returned {0}")]
    Service(reqwest::StatusCode),

    #[error("insight transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("insight reply unusable: {0}")]
    Malformed(String),
}

impl UpstreamInsightError {
    fn fallback(&self) -> &'static str {
        match self {
            UpstreamInsightError::Unconfigured => FALLBACK_UNCONFIGURED,
            UpstreamInsightError::Service(_) => FALLBACK_SERVICE_ERROR,
            UpstreamInsightError::Transport(_) | UpstreamInsightError::Malformed(_) => {
                FALLBACK_GENERIC
            }
        }
    }
}

#[async_trait]
pub trait InsightGenerator: Send + Sync + 'static {
    /// Produce a one-paragraph recommendation from period-over-period stats.
    /// Infallible by contract: implementations substitute a fallback string.
    async fn generate(
        &self,
        current: &PeriodData,
        previous: &PeriodData,
        period_hours: i64,
    ) -> String;
}

/// Production generator talking to an OpenAI-compatible chat-completions API.
pub struct ChatInsightGenerator {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    model: Option<String>,
    base_url: String,
}

impl ChatInsightGenerator {
    pub fn new(config: &InsightConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client build should not fail");
        Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Prompt shown to the model, built from both periods.
pub fn build_user_prompt(current: &PeriodData, previous: &PeriodData, period_hours: i64) -> String {
    let hrv_change = if previous.hrv.avg > 0.0 {
        (current.hrv.avg - previous.hrv.avg) / previous.hrv.avg * 100.0
    } else {
        0.0
    };
    format!(
        "Last {period_hours}h: HRV avg {:.1}ms ({:+.1}% change), Sleep avg {:.1}h (efficiency {:.0}%), Workout burned {:.0}kcal in {} sessions.\n\n\
         Previous {period_hours}h: HRV avg {:.1}ms, Sleep avg {:.1}h (efficiency {:.0}%), Workout burned {:.0}kcal in {} sessions.\n\n\
         Provide a single holistic health recommendation based on these trends.",
        current.hrv.avg,
        hrv_change,
        current.sleep.avg_duration_hours,
        current.sleep.avg_efficiency,
        current.workout.total_calories,
        current.workout.session_count,
        previous.hrv.avg,
        previous.sleep.avg_duration_hours,
        previous.sleep.avg_efficiency,
        previous.workout.total_calories,
        previous.workout.session_count,
    )
}

impl ChatInsightGenerator {
    async fn try_generate(
        &self,
        current: &PeriodData,
        previous: &PeriodData,
        period_hours: i64,
    ) -> Result<String, UpstreamInsightError> {
        let (Some(api_key), Some(model)) = (&self.api_key, &self.model) else {
            return Err(UpstreamInsightError::Unconfigured);
        };

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(current, previous, period_hours)}
            ],
            "max_tokens": 200,
            "temperature": 0.7
        });

        let url = format!("{}/api/v1/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamInsightError::Service(response.status()));
        }

        let reply = response.json::<serde_json::Value>().await?;
        reply["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| UpstreamInsightError::Malformed("no message content".into()))
    }
}

#[async_trait]
impl InsightGenerator for ChatInsightGenerator {
    async fn generate(
        &self,
        current: &PeriodData,
        previous: &PeriodData,
        period_hours: i64,
    ) -> String {
        match self.try_generate(current, previous, period_hours).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "substituting insight fallback");
                e.fallback().to_string()
            }
        }
    }
}
