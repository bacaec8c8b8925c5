pub mod api;
pub mod config;
pub mod dashboard;
pub mod fetch;
pub mod models;
pub mod monitoring;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::api::ApiContext;
use crate::config::MonitorConfig;
use crate::fetch::{FetchSettings, HttpSource, InMemoryStore, ResourceError, ScopeMonitor, StatusPoller};
use crate::monitoring::MonitoringEngine;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("Cannot build upstream client: {0}")]
    Upstream(#[from] ResourceError),
    #[error("{0}")]
    Server(String),
}

pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = Arc::new(MonitorConfig::load()?);
    let source = Arc::new(HttpSource::from_config(&config)?);
    let monitor = Arc::new(ScopeMonitor::new(
        source,
        Arc::new(InMemoryStore::new()),
        FetchSettings::from_config(&config),
    ));
    let poller = Arc::new(StatusPoller::new(monitor.clone(), config.poll_interval()));
    let engine = Arc::new(MonitoringEngine::new(&config));

    let cancel = CancellationToken::new();
    let poller_task = poller.spawn(cancel.clone());

    let ctx = ApiContext::new(engine, monitor.clone(), poller, config.clone());
    let server = api::start_api_server(ctx, &config.bind_addr)
        .await
        .map_err(StartupError::Server)?;
    tracing::info!(addr = %server.addr, upstream = %config.upstream_url, "Monitor ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }

    tracing::info!("Shutting down");
    cancel.cancel();
    server.shutdown().await;
    if let Err(e) = monitor.shutdown() {
        tracing::error!("Cannot cancel in-flight fetches: {e}");
    }
    if let Err(e) = poller_task.await {
        tracing::error!("Status poller task failed: {e}");
    }
    Ok(())
}
