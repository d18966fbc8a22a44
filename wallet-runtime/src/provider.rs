//! Provider adapter over an EIP-1193 style wallet.
//!
//! A [`WalletProvider`] is the raw request/response + event object a wallet
//! exposes. [`ProviderAdapter`] wraps it, bounds every call with a timeout
//! and translates provider failures into [`WalletError`] before anything
//! reaches the session state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{USER_REJECTED_CODE, WalletError};
use crate::types::{
    NetworkDescriptor, ProviderEvent, ProviderEventKind, ProviderMessage, parse_accounts,
    parse_chain_id,
};

/// Default bound on any wallet prompt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC / EIP-1193 error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("rpc error {0}")]
    Rpc(RpcError),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<RpcError> for ProviderError {
    fn from(e: RpcError) -> Self {
        ProviderError::Rpc(e)
    }
}

/// The injected wallet object: `request({method, params})` plus `on(event)`.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Stream of raw `accountsChanged` / `chainChanged` notifications.
    fn events(&self) -> broadcast::Receiver<ProviderMessage>;
}

/// Handle returned by [`ProviderAdapter::subscribe`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    kind: ProviderEventKind,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn kind(&self) -> ProviderEventKind {
        self.kind
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Option<Arc<dyn WalletProvider>>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("detected", &self.provider.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderAdapter {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Is a wallet provider present in the environment.
    pub fn detect(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::ProviderUnavailable)
    }

    /// Send a raw request, bounded by the adapter timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let provider = self.provider()?;
        tracing::debug!(method, "wallet request");
        match tokio::time::timeout(self.timeout, provider.request(method, params)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(translate(method, e)),
            Err(_) => {
                tracing::warn!(method, secs = self.timeout.as_secs(), "wallet request timed out");
                Err(WalletError::ProviderTimeout {
                    method: method.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }

    /// `eth_accounts`: authorized accounts, never prompts.
    pub async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        let value = self.request("eth_accounts", json!([])).await?;
        parse_accounts(&value)
    }

    /// `eth_requestAccounts`: prompts the user to authorize the site.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        parse_accounts(&value)
    }

    pub async fn chain_id(&self) -> Result<u64, WalletError> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_chain_id(&value)
    }

    pub async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": format!("{chain_id:#x}") }]),
        )
        .await
        .map(|_| ())
    }

    pub async fn add_chain(&self, network: &NetworkDescriptor) -> Result<(), WalletError> {
        self.request("wallet_addEthereumChain", json!([network.add_chain_params()]))
            .await
            .map(|_| ())
    }

    /// `personal_sign` (EIP-191). Returns the 0x-prefixed 65-byte signature.
    pub async fn personal_sign(
        &self,
        message: &[u8],
        account: Address,
    ) -> Result<String, WalletError> {
        let value = self
            .request(
                "personal_sign",
                json!([format!("0x{}", hex::encode(message)), account]),
            )
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::InvalidResponse(format!("Invalid signature: {value}")))
    }

    /// `eth_sendTransaction`, signed and submitted by the wallet.
    pub async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<B256, WalletError> {
        let mut tx = json!({ "from": from, "to": to, "data": data });
        if !value.is_zero() {
            tx["value"] = json!(format!("{value:#x}"));
        }
        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| WalletError::InvalidResponse(format!("Invalid tx hash: {result}")))?;
        hash.parse::<B256>()
            .map_err(|e| WalletError::InvalidResponse(format!("Invalid tx hash '{hash}': {e}")))
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, from: Address, to: Address, data: &Bytes) -> Result<Bytes, WalletError> {
        let result = self
            .request(
                "eth_call",
                json!([{ "from": from, "to": to, "data": data }, "latest"]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| WalletError::InvalidResponse(format!("Invalid call result: {result}")))?;
        raw.parse::<Bytes>()
            .map_err(|e| WalletError::InvalidResponse(format!("Invalid call result '{raw}': {e}")))
    }

    /// Run `handler` for every event of `kind`. The returned handle
    /// unsubscribes when dropped. Must be called inside a tokio runtime.
    ///
    /// Events are handled in order: the next one is not read until the
    /// handler's future completes, so handlers should not await slow wallet
    /// requests inline.
    pub fn subscribe<F, Fut>(
        &self,
        kind: ProviderEventKind,
        handler: F,
    ) -> Result<Subscription, WalletError>
    where
        F: Fn(ProviderEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.provider()?.events();
        let task = tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "provider event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if msg.event != kind.event_name() {
                    continue;
                }
                match ProviderEvent::from_message(&msg) {
                    Ok(Some(event)) => handler(event).await,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(event = %msg.event, "Ignoring malformed event: {e}"),
                }
            }
        });
        Ok(Subscription { kind, task })
    }
}

fn translate(method: &str, err: ProviderError) -> WalletError {
    match err {
        ProviderError::Rpc(rpc) if rpc.code == USER_REJECTED_CODE => {
            tracing::info!(method, "user rejected wallet request");
            WalletError::UserRejected(rpc.message)
        }
        ProviderError::Rpc(rpc) => WalletError::Rpc {
            code: rpc.code,
            message: rpc.message,
        },
        ProviderError::Transport(message) => WalletError::HttpError(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UNRECOGNIZED_CHAIN_CODE;

    #[test]
    fn test_translate_user_rejection() {
        let err = translate(
            "eth_requestAccounts",
            ProviderError::Rpc(RpcError::new(4001, "User rejected the request.")),
        );
        assert_eq!(err, WalletError::UserRejected("User rejected the request.".into()));
    }

    #[test]
    fn test_translate_keeps_rpc_code() {
        let err = translate(
            "wallet_switchEthereumChain",
            ProviderError::Rpc(RpcError::new(UNRECOGNIZED_CHAIN_CODE, "Unrecognized chain")),
        );
        assert_eq!(err.rpc_code(), Some(UNRECOGNIZED_CHAIN_CODE));
    }

    #[test]
    fn test_translate_transport() {
        let err = translate("eth_chainId", ProviderError::Transport("connection refused".into()));
        assert!(matches!(err, WalletError::HttpError(_)));
    }

    #[tokio::test]
    async fn test_absent_provider() {
        let adapter = ProviderAdapter::new(None);
        assert!(!adapter.detect());
        assert_eq!(
            adapter.request_accounts().await.unwrap_err(),
            WalletError::ProviderUnavailable
        );
        assert!(
            adapter
                .subscribe(ProviderEventKind::ChainChanged, |_| async {})
                .is_err()
        );
    }
}
