//! JSON-RPC 2.0 wallet bridge.
//!
//! Forwards EIP-1193 requests to an HTTP endpoint. The bridge has no push
//! channel, so `accountsChanged` / `chainChanged` are derived by polling
//! `eth_accounts` and `eth_chainId`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::error::WalletError;
use crate::provider::{ProviderError, RpcError, WalletProvider};
use crate::types::ProviderMessage;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug)]
pub struct JsonRpcProvider {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderMessage>,
}

impl JsonRpcProvider {
    /// `timeout` bounds every HTTP round trip, including the event polls.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, WalletError> {
        let endpoint = endpoint.into();
        endpoint
            .parse::<url::Url>()
            .map_err(|e| WalletError::ConfigError(format!("Invalid wallet endpoint '{endpoint}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            endpoint,
            client,
            next_id: AtomicU64::new(1),
            events,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("Invalid JSON-RPC response: {e}")))?;
        match (body.result, body.error) {
            (_, Some(error)) => Err(ProviderError::Rpc(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    /// Poll the bridge and publish changes as provider events. The task ends
    /// once the provider is dropped.
    pub fn spawn_event_poller(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_accounts: Option<Value> = None;
            let mut last_chain: Option<Value> = None;
            loop {
                ticker.tick().await;
                let Some(provider) = weak.upgrade() else { break };

                match provider.send("eth_accounts", json!([])).await {
                    Ok(accounts) => {
                        if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                            provider.publish("accountsChanged", accounts.clone());
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(e) => tracing::debug!("eth_accounts poll failed: {e}"),
                }

                match provider.send("eth_chainId", json!([])).await {
                    Ok(chain) => {
                        if last_chain.as_ref().is_some_and(|prev| *prev != chain) {
                            provider.publish("chainChanged", chain.clone());
                        }
                        last_chain = Some(chain);
                    }
                    Err(e) => tracing::debug!("eth_chainId poll failed: {e}"),
                }
            }
        })
    }

    fn publish(&self, event: &str, payload: Value) {
        tracing::debug!(event, %payload, "wallet event");
        let _ = self.events.send(ProviderMessage {
            event: event.to_string(),
            payload,
        });
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.send(method, params).await
    }

    fn events(&self) -> broadcast::Receiver<ProviderMessage> {
        self.events.subscribe()
    }
}
