//! Binary runner for the ReGen wallet session service.
//!
//! Loads the wallet configuration, builds the configured connector, restores
//! the previous session if one was persisted and serves the HTTP API.

use std::sync::Arc;

use wallet_http_api::{WalletApiState, build_router};
use wallet_runtime::{SessionContext, WalletConfig, WalletConnector, WalletError, build_provider};

const DEFAULT_API_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> Result<(), WalletError> {
    dotenvy::dotenv().ok();
    setup_log();

    // ── 1. Configuration ─────────────────────────────────────────────────────
    let config = WalletConfig::from_env()?;
    let connector = WalletConnector::from_config(&config.connector);
    tracing::info!(
        network = %config.network.name,
        chain_id = config.network.chain_id,
        connector = connector.name(),
        contracts = config.contracts.len(),
        "Starting ReGen wallet service"
    );

    // ── 2. Wallet provider + session context ─────────────────────────────────
    let provider = build_provider(&config)?;
    let context = Arc::new(SessionContext::from_config(&config, provider)?);

    let session = context.initialize().await;
    match session.address {
        Some(address) => tracing::info!(%address, chain_id = ?session.chain_id, "Previous session restored"),
        None => tracing::info!("No session restored, waiting for connect"),
    }

    // ── 3. HTTP API ──────────────────────────────────────────────────────────
    let port: u16 = std::env::var("WALLET_API_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_API_PORT);

    let router = build_router(Arc::new(WalletApiState::new(context)));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| WalletError::ConfigError(format!("Wallet API bind failed on port {port}: {e}")))?;
    tracing::info!("Wallet API listening on 0.0.0.0:{port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| WalletError::HttpError(format!("Wallet API server error: {e}")))?;

    tracing::info!("Wallet service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
