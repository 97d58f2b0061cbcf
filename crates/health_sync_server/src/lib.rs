//! HTTP service over the health-sync ingestion core.
//!
//! Routes: the export tool's webhook, range-filtered metric queries, the
//! period-over-period insights endpoint, liveness and a Prometheus render.

pub mod auth;
pub mod config;
pub mod error;
pub mod insight;
pub mod routes;
pub mod state;
pub mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
