use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Native currency advertised in `wallet_addEthereumChain`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to add and select a network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub native_currency: NativeCurrency,
}

impl NetworkDescriptor {
    pub fn hedera_testnet() -> Self {
        Self {
            chain_id: 296,
            name: "Hedera Testnet".into(),
            rpc_url: "https://testnet.hashio.io/api".into(),
            explorer_url: "https://hashscan.io/testnet".into(),
            native_currency: NativeCurrency {
                name: "HBAR".into(),
                symbol: "HBAR".into(),
                decimals: 18,
            },
        }
    }

    /// Chain id in the `0x`-prefixed hex form wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Block-explorer page for a deployed contract.
    pub fn contract_url(&self, address: &Address) -> String {
        format!("{}/contract/{address}", self.explorer_url.trim_end_matches('/'))
    }

    /// Parameter object for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.name,
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
        })
    }
}

/// A deployed contract: logical name, address and interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDescriptor {
    pub logical_name: String,
    pub address: Address,
    pub interface: JsonAbi,
}

impl ContractDescriptor {
    /// Whether the interface declares a function with this selector.
    pub fn has_selector(&self, selector: [u8; 4]) -> bool {
        self.interface.functions().any(|f| f.selector().0 == selector)
    }
}

/// Events an EIP-1193 provider delivers to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
}

impl ProviderEventKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            ProviderEventKind::AccountsChanged => "accountsChanged",
            ProviderEventKind::ChainChanged => "chainChanged",
        }
    }
}

/// Raw event as emitted by a provider: `provider.on(event, payload)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMessage {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Normalized provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

impl ProviderEvent {
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => ProviderEventKind::ChainChanged,
        }
    }

    /// Parse a raw provider message. Unknown events yield `Ok(None)`.
    pub fn from_message(msg: &ProviderMessage) -> Result<Option<Self>, WalletError> {
        match msg.event.as_str() {
            "accountsChanged" => Ok(Some(ProviderEvent::AccountsChanged(parse_accounts(
                &msg.payload,
            )?))),
            "chainChanged" => Ok(Some(ProviderEvent::ChainChanged(parse_chain_id(
                &msg.payload,
            )?))),
            _ => Ok(None),
        }
    }
}

/// Parse an account list (`["0xabc...", ...]`).
pub fn parse_accounts(value: &serde_json::Value) -> Result<Vec<Address>, WalletError> {
    let list = value.as_array().ok_or_else(|| {
        WalletError::InvalidResponse(format!("expected account list, got {value}"))
    })?;
    list.iter()
        .map(|v| {
            let s = v.as_str().ok_or_else(|| {
                WalletError::InvalidResponse(format!("account is not a string: {v}"))
            })?;
            s.parse::<Address>()
                .map_err(|e| WalletError::InvalidResponse(format!("Invalid account '{s}': {e}")))
        })
        .collect()
}

/// Parse a chain id given either as a hex string (`"0x128"`), a decimal
/// string or a JSON number.
pub fn parse_chain_id(value: &serde_json::Value) -> Result<u64, WalletError> {
    let invalid = || WalletError::InvalidResponse(format!("Invalid chain id: {value}"));
    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(invalid),
        serde_json::Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid()),
            None => s.parse::<u64>().map_err(|_| invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Metadata the dapp presents during extension pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icons: Vec<String>,
    pub url: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "ReGen Marketplace".into(),
            description: "Circular Economy Marketplace".into(),
            icons: Vec::new(),
            url: "http://localhost:5173".into(),
        }
    }
}

/// A wallet extension found during discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}
