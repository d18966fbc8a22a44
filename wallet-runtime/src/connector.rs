use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConnectorConfig, WalletConfig};
use crate::error::WalletError;
use crate::pairing::PairingProvider;
use crate::provider::WalletProvider;
use crate::rpc::JsonRpcProvider;
use crate::simulated::SimulatedWallet;

/// The wallet flavours a deployment can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletConnector {
    Simulated,
    ExtensionPairing,
    InjectedProvider,
}

impl WalletConnector {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        match config {
            ConnectorConfig::Simulated { .. } => WalletConnector::Simulated,
            ConnectorConfig::ExtensionPairing { .. } => WalletConnector::ExtensionPairing,
            ConnectorConfig::InjectedProvider { .. } => WalletConnector::InjectedProvider,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletConnector::Simulated => "simulated",
            WalletConnector::ExtensionPairing => "extension_pairing",
            WalletConnector::InjectedProvider => "injected_provider",
        }
    }
}

/// Build the provider for the configured connector.
///
/// `Ok(None)` means no wallet was detected; the session context then reports
/// `ProviderUnavailable` on connect. Must run inside a tokio runtime because
/// the injected provider starts its event poller.
pub fn build_provider(config: &WalletConfig) -> Result<Option<Arc<dyn WalletProvider>>, WalletError> {
    let connector = WalletConnector::from_config(&config.connector);
    let provider: Option<Arc<dyn WalletProvider>> = match &config.connector {
        ConnectorConfig::InjectedProvider {
            endpoint,
            poll_interval_ms,
        } => match endpoint {
            Some(endpoint) => {
                let provider = Arc::new(JsonRpcProvider::new(endpoint.clone(), config.request_timeout())?);
                provider.spawn_event_poller(Duration::from_millis((*poll_interval_ms).max(100)));
                Some(provider)
            }
            None => None,
        },
        ConnectorConfig::ExtensionPairing {
            endpoint,
            app,
            extensions,
        } => {
            if extensions.is_empty() {
                None
            } else {
                let transport = Arc::new(JsonRpcProvider::new(endpoint.clone(), config.request_timeout())?);
                let network = config.network.name.to_lowercase().replace("hedera ", "");
                Some(Arc::new(PairingProvider::new(
                    transport,
                    app.clone(),
                    network,
                    extensions.clone(),
                )))
            }
        }
        ConnectorConfig::Simulated {
            private_keys,
            chain_id,
        } => {
            let wallet =
                SimulatedWallet::new(private_keys, chain_id.unwrap_or(config.network.chain_id))?;
            Some(Arc::new(wallet))
        }
    };

    match &provider {
        Some(_) => tracing::info!(connector = connector.name(), "Wallet provider ready"),
        None => tracing::warn!(connector = connector.name(), "No wallet provider detected"),
    }
    Ok(provider)
}
