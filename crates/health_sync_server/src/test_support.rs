//! Shared helpers for unit and integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use health_sync_core::Store;

use crate::config::{Config, InsightConfig};
use crate::insight::{InsightGenerator, PeriodData};
use crate::routes::build_router;
use crate::state::AppState;

/// Generator returning a fixed sentence; keeps tests off the network.
pub struct StaticInsight(pub String);

#[async_trait]
impl InsightGenerator for StaticInsight {
    async fn generate(&self, _: &PeriodData, _: &PeriodData, _: i64) -> String {
        self.0.clone()
    }
}

/// A state backed by a process-private in-memory database. The `configure`
/// hook mutates the default open configuration (no webhook key, no bearer).
pub async fn test_state(configure: impl FnOnce(&mut Config)) -> Arc<AppState> {
    test_state_with_insight(configure, Arc::new(StaticInsight("test insight".into()))).await
}

pub async fn test_state_with_insight(
    configure: impl FnOnce(&mut Config),
    insight: Arc<dyn InsightGenerator>,
) -> Arc<AppState> {
    let url = format!(
        "sqlite:file:{}?mode=memory&cache=shared",
        uuid::Uuid::new_v4().simple()
    );
    let mut config = Config {
        address: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url: SecretString::new(url.clone().into()),
        webhook_key: None,
        auth_token: None,
        insight: InsightConfig {
            api_key: None,
            model: None,
            base_url: "http://127.0.0.1:1".into(),
        },
        max_body_bytes: 1024 * 1024,
    };
    configure(&mut config);

    let store = Store::connect(&url).await.expect("in-memory store");
    Arc::new(AppState {
        store,
        config,
        insight,
        metrics: None,
    })
}

/// Serve the router on an ephemeral port; returns the base URL.
pub async fn spawn_server(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("server run");
    });
    format!("http://{addr}")
}
