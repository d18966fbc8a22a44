use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::error::{UNRECOGNIZED_CHAIN_CODE, WalletError};
use crate::provider::ProviderAdapter;
use crate::types::NetworkDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkOutcome {
    /// Already on the required chain; no prompt shown.
    AlreadyActive,
    /// `wallet_switchEthereumChain` accepted.
    Switched,
    /// Chain was unknown to the wallet and `wallet_addEthereumChain` accepted.
    Added,
}

/// Keeps the wallet on the required chain.
///
/// A failed attempt for a given `(current, required)` pair is remembered so
/// that repeating `ensure` does not prompt again until the wallet reports a
/// chain change ([`NetworkGuard::reset`]).
#[derive(Debug)]
pub struct NetworkGuard {
    adapter: ProviderAdapter,
    networks: HashMap<u64, NetworkDescriptor>,
    failed: Mutex<Option<(u64, u64)>>,
}

impl NetworkGuard {
    pub fn new(adapter: ProviderAdapter, networks: impl IntoIterator<Item = NetworkDescriptor>) -> Self {
        Self {
            adapter,
            networks: networks.into_iter().map(|n| (n.chain_id, n)).collect(),
            failed: Mutex::new(None),
        }
    }

    pub fn descriptor(&self, chain_id: u64) -> Option<&NetworkDescriptor> {
        self.networks.get(&chain_id)
    }

    /// Forget the last failed attempt. Call whenever the wallet chain changes.
    pub fn reset(&self) {
        *self.failed.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn ensure(&self, current: u64, required: u64) -> Result<NetworkOutcome, WalletError> {
        if current == required {
            self.reset();
            return Ok(NetworkOutcome::AlreadyActive);
        }

        let mismatch = |reason: String| WalletError::NetworkMismatch {
            expected: required,
            actual: current,
            reason,
        };

        if *self.failed.lock().unwrap_or_else(PoisonError::into_inner) == Some((current, required)) {
            return Err(mismatch(
                "previous switch attempt failed, configure the network manually".into(),
            ));
        }

        tracing::info!(current, required, "Requesting network switch");
        let result = match self.adapter.switch_chain(required).await {
            Ok(()) => Ok(NetworkOutcome::Switched),
            Err(e) if e.rpc_code() == Some(UNRECOGNIZED_CHAIN_CODE) => {
                match self.networks.get(&required) {
                    Some(network) => {
                        tracing::info!(chain = %network.name, "Chain unknown to wallet, adding it");
                        self.adapter
                            .add_chain(network)
                            .await
                            .map(|()| NetworkOutcome::Added)
                            .map_err(|e| mismatch(format!("failed to add {}: {e}", network.name)))
                    }
                    None => Err(mismatch(format!("no descriptor for chain {required}"))),
                }
            }
            Err(e) => Err(mismatch(format!("failed to switch network: {e}"))),
        };

        match &result {
            Ok(outcome) => {
                tracing::info!(?outcome, required, "Wallet on required network");
                self.reset();
            }
            Err(e) => {
                tracing::warn!("Network switch failed: {e}");
                *self.failed.lock().unwrap_or_else(PoisonError::into_inner) = Some((current, required));
            }
        }
        result
    }
}
