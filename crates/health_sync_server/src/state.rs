use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use health_sync_core::Store;

use crate::config::Config;
use crate::insight::InsightGenerator;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub insight: Arc<dyn InsightGenerator>,
    /// Absent in tests, where no global recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}
