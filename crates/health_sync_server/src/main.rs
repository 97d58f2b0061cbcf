use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use secrecy::ExposeSecret;
use tokio::signal;
use tracing::info;

use health_sync_core::Store;
use health_sync_server::insight::ChatInsightGenerator;
use health_sync_server::{AppState, Config, build_router};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Configure logging from `HEALTH_SYNC_LOG_LEVEL` (or fallback to
    // `RUST_LOG`, default `info`).
    let log_env = std::env::var("HEALTH_SYNC_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_env.clone())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::info!(%log_env, "health_sync_server: log filter");

    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%e, "invalid configuration; aborting startup");
            std::process::exit(1);
        }
    };

    // No pool, no service: storage must be reachable before we take traffic.
    let store = match Store::connect(config.database_url.expose_secret()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(%e, "storage unavailable; aborting startup");
            std::process::exit(1);
        }
    };

    let insight = Arc::new(ChatInsightGenerator::new(&config.insight));
    let addr = config.address;
    let state = Arc::new(AppState {
        store,
        config,
        insight,
        metrics: Some(handle),
    });

    let app = build_router(state);
    info!(%addr, "starting HTTP server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service());
    if let Err(e) = server
        .with_graceful_shutdown(async {
            signal::ctrl_c()
                .await
                .expect("failed to install ctrl+c handler");
        })
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
