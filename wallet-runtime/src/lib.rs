//! Wallet session runtime for the ReGen marketplace.
//!
//! Connects to an EIP-1193 style wallet, keeps a single session state in
//! sync with wallet events, holds the wallet on the required network and
//! hands out contract handles bound to the active signer.

pub mod config;
pub mod connector;
pub mod context;
pub mod contracts;
pub mod error;
pub mod factory;
pub mod network;
pub mod pairing;
pub mod provider;
pub mod rewards;
pub mod rpc;
pub mod session;
pub mod simulated;
pub mod storage;
pub mod types;

pub use config::{ConnectorConfig, ContractEntry, WalletConfig};
pub use connector::{WalletConnector, build_provider};
pub use context::SessionContext;
pub use error::WalletError;
pub use factory::{ContractFactory, ContractHandle, ContractRegistry, WalletSigner};
pub use network::{NetworkGuard, NetworkOutcome};
pub use provider::{ProviderAdapter, ProviderError, RpcError, Subscription, WalletProvider};
pub use rewards::PointsReason;
pub use session::{ConnectionStatus, Session, SessionState};
pub use simulated::SimulatedWallet;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::*;
