//! Contract factory: logical name -> handle bound to the active signer.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::sol_types::SolCall;

use crate::error::WalletError;
use crate::provider::ProviderAdapter;
use crate::types::ContractDescriptor;

/// The account currently able to sign, as reported by the wallet.
#[derive(Debug, Clone)]
pub struct WalletSigner {
    address: Address,
    chain_id: u64,
    adapter: ProviderAdapter,
}

impl WalletSigner {
    pub fn new(address: Address, chain_id: u64, adapter: ProviderAdapter) -> Self {
        Self {
            address,
            chain_id,
            adapter,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// EIP-191 `personal_sign` of a UTF-8 message.
    pub async fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        self.adapter.personal_sign(message.as_bytes(), self.address).await
    }
}

/// Static mapping of logical contract names to deployed contracts.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, Arc<ContractDescriptor>>,
}

impl ContractRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = ContractDescriptor>) -> Self {
        Self {
            contracts: descriptors
                .into_iter()
                .map(|d| (d.logical_name.clone(), Arc::new(d)))
                .collect(),
        }
    }

    pub fn get(&self, logical_name: &str) -> Option<&Arc<ContractDescriptor>> {
        self.contracts.get(logical_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractDescriptor> {
        self.contracts.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractFactory {
    registry: ContractRegistry,
}

impl ContractFactory {
    pub fn new(registry: ContractRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Resolve `logical_name` and bind it to `signer`.
    pub fn try_get_contract(
        &self,
        logical_name: &str,
        signer: Option<&WalletSigner>,
    ) -> Result<ContractHandle, WalletError> {
        let signer = signer.ok_or(WalletError::NotConnected)?;
        let descriptor = self
            .registry
            .get(logical_name)
            .ok_or_else(|| WalletError::ContractNotConfigured(logical_name.to_string()))?;
        Ok(ContractHandle {
            descriptor: descriptor.clone(),
            signer: signer.clone(),
        })
    }

    /// Like [`Self::try_get_contract`], but logs and returns `None` on failure.
    pub fn get_contract(
        &self,
        logical_name: &str,
        signer: Option<&WalletSigner>,
    ) -> Option<ContractHandle> {
        match self.try_get_contract(logical_name, signer) {
            Ok(handle) => Some(handle),
            Err(WalletError::NotConnected) => {
                tracing::warn!(contract = logical_name, "No active signer, cannot bind contract");
                None
            }
            Err(e) => {
                tracing::error!(contract = logical_name, "{e}");
                None
            }
        }
    }
}

/// A contract bound to the signer that was active when it was requested.
///
/// Do not keep one across account changes; request a fresh handle instead.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    descriptor: Arc<ContractDescriptor>,
    signer: WalletSigner,
}

impl ContractHandle {
    pub fn logical_name(&self) -> &str {
        &self.descriptor.logical_name
    }

    pub fn address(&self) -> Address {
        self.descriptor.address
    }

    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    pub fn signer(&self) -> &WalletSigner {
        &self.signer
    }

    fn check_interface<C: SolCall>(&self) -> Result<(), WalletError> {
        if self.descriptor.has_selector(C::SELECTOR) {
            Ok(())
        } else {
            Err(WalletError::ContractNotConfigured(format!(
                "{} has no function {}",
                self.descriptor.logical_name,
                C::SIGNATURE
            )))
        }
    }

    /// Read-only call (`eth_call`) decoded into the call's return type.
    pub async fn call<C: SolCall>(&self, call: &C) -> Result<C::Return, WalletError> {
        self.check_interface::<C>()?;
        let data = Bytes::from(call.abi_encode());
        let raw = self
            .signer
            .adapter
            .call(self.signer.address, self.descriptor.address, &data)
            .await?;
        C::abi_decode_returns(&raw).map_err(|e| {
            WalletError::InvalidResponse(format!("{} returned undecodable data: {e}", C::SIGNATURE))
        })
    }

    /// State-changing call signed and submitted by the wallet.
    pub async fn send<C: SolCall>(&self, call: &C) -> Result<B256, WalletError> {
        self.send_with_value(call, U256::ZERO).await
    }

    pub async fn send_with_value<C: SolCall>(
        &self,
        call: &C,
        value: U256,
    ) -> Result<B256, WalletError> {
        self.check_interface::<C>()?;
        let data = Bytes::from(call.abi_encode());
        let hash = self
            .signer
            .adapter
            .send_transaction(self.signer.address, self.descriptor.address, &data, value)
            .await?;
        tracing::info!(
            contract = %self.descriptor.logical_name,
            function = C::SIGNATURE,
            tx = %hash,
            "Transaction submitted"
        );
        Ok(hash)
    }
}
