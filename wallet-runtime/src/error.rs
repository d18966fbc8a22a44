use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Wallet does not know the requested chain (`wallet_switchEthereumChain`).
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("No wallet provider detected")]
    ProviderUnavailable,

    #[error("User rejected the request: {0}")]
    UserRejected(String),

    #[error("Timeout: wallet did not answer {method} within {secs}s")]
    ProviderTimeout { method: String, secs: u64 },

    #[error("Network mismatch: expected chain {expected}, wallet is on {actual} ({reason})")]
    NetworkMismatch {
        expected: u64,
        actual: u64,
        reason: String,
    },

    #[error("Contract not configured: {0}")]
    ContractNotConfigured(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Provider error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl WalletError {
    /// Stable machine-readable tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::ProviderUnavailable => "provider_unavailable",
            WalletError::UserRejected(_) => "user_rejected",
            WalletError::ProviderTimeout { .. } => "provider_timeout",
            WalletError::NetworkMismatch { .. } => "network_mismatch",
            WalletError::ContractNotConfigured(_) => "contract_not_configured",
            WalletError::NotConnected => "not_connected",
            WalletError::Rpc { .. } => "rpc",
            WalletError::InvalidResponse(_) => "invalid_response",
            WalletError::InvalidInput(_) => "invalid_input",
            WalletError::ConfigError(_) => "config",
            WalletError::StorageError(_) => "storage",
            WalletError::SerializationError(_) => "serialization",
            WalletError::HttpError(_) => "http",
        }
    }

    /// Inline message shown next to the wallet button.
    pub fn user_message(&self) -> String {
        match self {
            WalletError::ProviderUnavailable => {
                "No wallet extension found. Install MetaMask or HashPack and reload.".into()
            }
            WalletError::UserRejected(_) => {
                "You rejected the wallet request. Click connect to try again.".into()
            }
            WalletError::ProviderTimeout { .. } => {
                "The wallet did not respond. Open the extension and try again.".into()
            }
            WalletError::NetworkMismatch { expected, .. } => {
                format!("Please switch your wallet to chain {expected} (add it manually if needed).")
            }
            WalletError::ContractNotConfigured(name) => {
                format!("Contract {name} is not configured for this deployment.")
            }
            WalletError::NotConnected => "Connect your wallet first.".into(),
            other => format!("Wallet error: {other}"),
        }
    }

    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            WalletError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_network_mismatch(&self) -> bool {
        matches!(self, WalletError::NetworkMismatch { .. })
    }
}

impl Serialize for WalletError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("WalletError", 3)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.user_message())?;
        s.serialize_field("detail", &self.to_string())?;
        s.end()
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        WalletError::HttpError(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::SerializationError(e.to_string())
    }
}
