//! Static configuration: network parameters, contract table and connector.
//!
//! Loaded once at startup from TOML, with a few environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::contracts::{ACCESS_CONTROL, GREEN_POINTS, LIFECYCLE_EVENT, PRODUCT_PASSPORT, builtin_abi};
use crate::error::WalletError;
use crate::factory::ContractRegistry;
use crate::simulated::DEV_PRIVATE_KEY;
use crate::types::{AppMetadata, ContractDescriptor, ExtensionMetadata, NetworkDescriptor};

fn default_timeout_secs() -> u64 {
    30
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".regen-wallet")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_private_keys() -> Vec<String> {
    vec![DEV_PRIVATE_KEY.to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Bound on every wallet prompt.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    pub network: NetworkDescriptor,
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectorConfig {
    /// JSON-RPC wallet bridge. No endpoint means no wallet is present.
    InjectedProvider {
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
    ExtensionPairing {
        endpoint: String,
        #[serde(default)]
        app: AppMetadata,
        #[serde(default)]
        extensions: Vec<ExtensionMetadata>,
    },
    Simulated {
        #[serde(default = "default_private_keys")]
        private_keys: Vec<String>,
        /// Chain the simulated wallet starts on (defaults to the target network).
        #[serde(default)]
        chain_id: Option<u64>,
    },
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig::InjectedProvider {
            endpoint: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// One `[contracts.<Name>]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractEntry {
    #[serde(default)]
    pub address: String,
    /// Human-readable signatures, e.g. `"function getBalance(address) view returns (uint256)"`.
    #[serde(default)]
    pub abi: Vec<String>,
    /// Compiled artifact (`{"abi": [...]}`) or bare ABI array, relative to the config file.
    #[serde(default)]
    pub abi_path: Option<PathBuf>,
}

impl WalletConfig {
    /// The deployed ReGen Marketplace contracts on Hedera Testnet.
    pub fn hedera_testnet() -> Self {
        let contracts = [
            (ACCESS_CONTROL, "0x5e8df4A8869613A89Cd08288a0389012446fBEE5"),
            (PRODUCT_PASSPORT, "0xb6fb89abEAd1dFb8A344e4b905F56afdb93F48f7"),
            (LIFECYCLE_EVENT, "0x8Fd15D6dd8d2E8Dba3eb595e0871212385A7A036"),
            (GREEN_POINTS, "0x2Ed3B5104630685B6a1660E3953C834917271178"),
        ]
        .into_iter()
        .map(|(name, address)| {
            (
                name.to_string(),
                ContractEntry {
                    address: address.to_string(),
                    ..Default::default()
                },
            )
        })
        .collect();

        Self {
            request_timeout_secs: default_timeout_secs(),
            state_dir: default_state_dir(),
            network: NetworkDescriptor::hedera_testnet(),
            connector: ConnectorConfig::default(),
            contracts,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, WalletError> {
        toml::from_str(raw).map_err(|e| WalletError::ConfigError(format!("Invalid config: {e}")))
    }

    /// Load from a TOML file. Relative `abi_path`s resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WalletError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in config.contracts.values_mut() {
            if let Some(p) = entry.abi_path.as_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        }
        Ok(config)
    }

    /// Load `WALLET_CONFIG` if set, otherwise the built-in defaults, then
    /// apply the environment overrides.
    pub fn from_env() -> Result<Self, WalletError> {
        let mut config = match std::env::var("WALLET_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::hedera_testnet(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides: `WALLET_PROVIDER_URL`, `WALLET_STATE_DIR`, `WALLET_REQUEST_TIMEOUT_SECS`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), WalletError> {
        if let Some(url) = lookup("WALLET_PROVIDER_URL") {
            match &mut self.connector {
                ConnectorConfig::InjectedProvider { endpoint, .. } => *endpoint = Some(url),
                ConnectorConfig::ExtensionPairing { endpoint, .. } => *endpoint = url,
                ConnectorConfig::Simulated { .. } => {
                    tracing::warn!("WALLET_PROVIDER_URL ignored for the simulated connector");
                }
            }
        }
        if let Some(dir) = lookup("WALLET_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("WALLET_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.parse().map_err(|e| {
                WalletError::ConfigError(format!("Invalid WALLET_REQUEST_TIMEOUT_SECS '{secs}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the contract registry. Entries lacking an address or an
    /// interface are left out (and reported) so lookups fail with
    /// `ContractNotConfigured`.
    pub fn contract_registry(&self) -> Result<ContractRegistry, WalletError> {
        let mut descriptors = Vec::new();
        for (name, entry) in &self.contracts {
            if entry.address.trim().is_empty() {
                tracing::warn!(contract = %name, "No address configured, skipping");
                continue;
            }
            let address: Address = entry.address.parse().map_err(|e| {
                WalletError::ConfigError(format!("Invalid address for {name} '{}': {e}", entry.address))
            })?;
            let Some(interface) = entry.interface(name)? else {
                tracing::warn!(contract = %name, "No interface configured, skipping");
                continue;
            };
            descriptors.push(ContractDescriptor {
                logical_name: name.clone(),
                address,
                interface,
            });
        }
        Ok(ContractRegistry::new(descriptors))
    }
}

impl ContractEntry {
    /// Resolve the interface: file, then inline signatures, then built-in.
    fn interface(&self, name: &str) -> Result<Option<JsonAbi>, WalletError> {
        if let Some(path) = &self.abi_path {
            return load_abi_file(path).map(Some);
        }
        if !self.abi.is_empty() {
            return JsonAbi::parse(self.abi.iter().map(String::as_str))
                .map(Some)
                .map_err(|e| WalletError::ConfigError(format!("Invalid ABI for {name}: {e}")));
        }
        match builtin_abi(name) {
            Some(sigs) => JsonAbi::parse(sigs.iter().copied())
                .map(Some)
                .map_err(|e| WalletError::ConfigError(format!("Invalid built-in ABI for {name}: {e}"))),
            None => Ok(None),
        }
    }
}

fn load_abi_file(path: &Path) -> Result<JsonAbi, WalletError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WalletError::ConfigError(format!("Cannot read ABI {}: {e}", path.display())))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let abi = match value.get("abi") {
        Some(abi) => abi.clone(),
        None => value,
    };
    serde_json::from_value(abi)
        .map_err(|e| WalletError::ConfigError(format!("Invalid ABI in {}: {e}", path.display())))
}
