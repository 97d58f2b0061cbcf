use std::net::SocketAddr;

use secrecy::SecretString;

use crate::error::ApiError;

const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Process configuration, constructed once at startup and passed by
/// reference into the components that need it.
#[derive(Clone, Debug)]
pub struct Config {
    pub address: SocketAddr,
    pub database_url: SecretString,
    /// Shared key the export tool sends in `x-api-key`. When set, webhook
    /// calls without a matching key are rejected; when unset the webhook is
    /// open (the exporter cannot hold per-user credentials).
    pub webhook_key: Option<SecretString>,
    /// Bearer token guarding the query/insight endpoints. When unset those
    /// endpoints trust the fronting proxy entirely.
    pub auth_token: Option<SecretString>,
    pub insight: InsightConfig,
    pub max_body_bytes: usize,
}

/// Outbound text-generation collaborator. Either credential missing means
/// insights fall back to a static sentence instead of calling out.
#[derive(Clone, Debug)]
pub struct InsightConfig {
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function. This avoids mutating global environment in tests and keeps
    /// `from_env()` small and safe.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, ApiError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let address = get("HEALTH_SYNC_ADDRESS")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
        let database_url = get("HEALTH_SYNC_DATABASE_URL")
            .ok_or_else(|| ApiError::Config("HEALTH_SYNC_DATABASE_URL missing".into()))?;
        let max_body_bytes = get("MAX_HTTP_BODY_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Ok(Self {
            address,
            database_url: SecretString::new(database_url.into()),
            webhook_key: get("HEALTH_SYNC_WEBHOOK_KEY").map(|k| SecretString::new(k.into())),
            auth_token: get("HEALTH_SYNC_AUTH_TOKEN").map(|k| SecretString::new(k.into())),
            insight: InsightConfig {
                api_key: get("HEALTH_SYNC_INSIGHT_API_KEY").map(|k| SecretString::new(k.into())),
                model: get("HEALTH_SYNC_INSIGHT_MODEL"),
                base_url: get("HEALTH_SYNC_INSIGHT_BASE_URL")
                    .unwrap_or_else(|| "https://api.venice.ai".into()),
            },
            max_body_bytes,
        })
    }
}
