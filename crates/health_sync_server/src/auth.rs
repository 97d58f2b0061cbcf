//! Authorization plumbing.
//!
//! Session verification proper lives in front of this service; what arrives
//! here is an opaque "authorized user with a stable identifier" capability:
//! the fronting proxy injects `x-user-id` after verifying the session, and an
//! optional shared bearer token pins the proxy itself. The webhook uses a
//! separate shared key because the export tool cannot hold user credentials.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use secrecy::ExposeSecret;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller of a query/insight endpoint.
#[derive(Clone, Debug)]
pub struct AuthorizedUser {
    pub id: String,
}

impl FromRequestParts<Arc<AppState>> for AuthorizedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(expected) = &state.config.auth_token {
            let bearer = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            if bearer != Some(expected.expose_secret()) {
                return Err(ApiError::Unauthorized);
            }
        }

        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(AuthorizedUser { id: id.to_string() })
    }
}

/// Check the export tool's shared webhook key. Open when no key is
/// configured; a configured key must match exactly.
pub fn verify_webhook_key(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.webhook_key {
        None => true,
        Some(expected) => headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|provided| provided == expected.expose_secret()),
    }
}
