use std::sync::Arc;

use anyhow::Context;
use opcbridge_api::config::ServerConfig;
use opcbridge_api::state::AppState;
use opcbridge_api::{app, logging};
use opcbridge_upstream::{BridgeManager, GatewayClient, PollerExit};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;

    // --- Tracing ---
    logging::init_tracing(config.log_format)?;
    tracing::info!(
        host = %config.host,
        port = %config.port,
        endpoint = %config.bridge.endpoint,
        node_id = %config.bridge.node_id,
        api_key = config.api_key.is_some(),
        "Loaded server configuration",
    );

    // --- Listener (must precede the poller) ---
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    // --- Bridge poller ---
    let manager = BridgeManager::start(GatewayClient::new(), config.bridge.poller_config());
    tracing::info!("Bridge manager started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        snapshots: manager.cache(),
        metrics: manager.metrics(),
    };

    // --- Router ---
    let app = app::build_router(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    match manager.shutdown(config.shutdown_timeout()).await {
        Some(PollerExit::Cancelled) => tracing::info!("Bridge poller stopped"),
        Some(PollerExit::RetriesExhausted { attempts, .. }) => {
            tracing::info!(attempts, "Bridge poller had already given up");
        }
        None => tracing::warn!("Bridge poller did not exit cleanly"),
    }

    served.context("Server error")?;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
