//! Extension-pairing wallet flow.
//!
//! Before the first account request the dapp pairs with a discovered wallet
//! extension: it sends a [`PairingRequest`] (`wallet_pair`) and receives the
//! paired account ids. The request only lives for the handshake. Everything
//! else is forwarded to the underlying provider unchanged.

use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::provider::{ProviderError, RpcError, WalletProvider};
use crate::types::{AppMetadata, ExtensionMetadata, ProviderMessage, parse_accounts};

/// Transient handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    pub pairing_string: String,
    pub discovered_extension_metadata: ExtensionMetadata,
}

impl PairingRequest {
    /// Pairing string = hex of `{metadata, network, topic}` JSON.
    pub fn new(app: &AppMetadata, network: &str, extension: ExtensionMetadata) -> Self {
        let topic = hex::encode(rand::random::<[u8; 16]>());
        let payload = json!({ "metadata": app, "network": network, "topic": topic });
        Self {
            pairing_string: hex::encode(payload.to_string()),
            discovered_extension_metadata: extension,
        }
    }
}

pub struct PairingProvider {
    inner: Arc<dyn WalletProvider>,
    app: AppMetadata,
    network: String,
    extensions: Vec<ExtensionMetadata>,
    paired: Mutex<Option<Vec<Address>>>,
}

impl std::fmt::Debug for PairingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingProvider")
            .field("app", &self.app.name)
            .field("network", &self.network)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl PairingProvider {
    pub fn new(
        inner: Arc<dyn WalletProvider>,
        app: AppMetadata,
        network: impl Into<String>,
        extensions: Vec<ExtensionMetadata>,
    ) -> Self {
        Self {
            inner,
            app,
            network: network.into(),
            extensions,
            paired: Mutex::new(None),
        }
    }

    fn paired_accounts(&self) -> Option<Vec<Address>> {
        self.paired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn pair(&self) -> Result<Vec<Address>, ProviderError> {
        if let Some(accounts) = self.paired_accounts() {
            return Ok(accounts);
        }
        let Some(extension) = self.extensions.first().cloned() else {
            tracing::warn!("No wallet extension discovered for pairing");
            return Err(RpcError::new(4900, "No wallet extension detected").into());
        };

        let request = PairingRequest::new(&self.app, &self.network, extension);
        tracing::info!(extension = %request.discovered_extension_metadata.name, "Pairing with wallet extension");
        let response = self.inner.request("wallet_pair", json!([request])).await?;

        let ids = response.get("accountIds").unwrap_or(&response);
        let accounts = parse_accounts(ids).map_err(|e| RpcError::new(-32603, e.to_string()))?;
        *self.paired.lock().unwrap_or_else(PoisonError::into_inner) = Some(accounts.clone());
        Ok(accounts)
    }
}

#[async_trait]
impl WalletProvider for PairingProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            "eth_requestAccounts" => self.pair().await.map(|a| json!(a)),
            "eth_accounts" => Ok(json!(self.paired_accounts().unwrap_or_default())),
            _ => self.inner.request(method, params).await,
        }
    }

    fn events(&self) -> broadcast::Receiver<ProviderMessage> {
        self.inner.events()
    }
}
