use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::config::credentials::CredentialConfig;
use crate::config::settings::SettingsConfig;
use crate::history::HistoryStore;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::server::routes::sign_router;
use crate::upstream::{SharedTokenManager, SignClient};

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub sign: SignClient,
    pub tokens: SharedTokenManager,
    pub history: Arc<HistoryStore>,
    pub credentials: Arc<CredentialConfig>,
}

impl AppState {
    pub async fn new(
        sign: SignClient,
        tokens: SharedTokenManager,
        history: HistoryStore,
        credentials: CredentialConfig,
    ) -> Self {
        let metrics = get_metrics().await;
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            sign,
            tokens,
            history: Arc::new(history),
            credentials: Arc::new(credentials),
        }
    }
}

/// Every route the service serves.
pub fn router(state: AppState, settings_config: &SettingsConfig) -> Router {
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(sign_router())
        .with_state(state)
}

/// Start the Axum server and run until SIGINT/SIGTERM.
pub async fn start(settings_config: &SettingsConfig, state: AppState) -> Result<()> {
    let metrics = get_metrics().await;
    let app = router(state, settings_config);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port))
        .await
        .with_context(|| format!("failed to bind {}:{}", bind_addr, port))?;
    info!("listening on {}:{}", bind_addr, port);
    metrics.up.set(1);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    metrics.up.set(0);
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        // without signal handlers, run until the process is killed
        return futures::future::pending().await;
    };
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown..."),
        _ = sigterm.recv() => info!("Received SIGTERM. Initiating graceful shutdown..."),
    }
}
