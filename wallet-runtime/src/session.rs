//! Session state machine.
//!
//! Transitions never fail: errors are recorded in `last_error` and the state
//! always settles on `Idle` or `Connected`.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──ok──▶ Connected(address, chain)
//!  ▲                    │                 │  accountsChanged([a, ..]) ─▶ Connected(a)
//!  └──────error─────────┘                 │  chainChanged(c)          ─▶ Connected(chain = c)
//!  ◀──────────── accountsChanged([]) / disconnect ──────┘
//! ```

use alloy::primitives::Address;
use serde::Serialize;

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected { address: Address },
}

/// Read-only snapshot handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub address: Option<Address>,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub chain_id: Option<u64>,
    pub required_chain_id: u64,
    pub last_error: Option<WalletError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    status: ConnectionStatus,
    chain_id: Option<u64>,
    last_error: Option<WalletError>,
    required_chain_id: u64,
}

impl SessionState {
    pub fn new(required_chain_id: u64) -> Self {
        Self {
            status: ConnectionStatus::Idle,
            chain_id: None,
            last_error: None,
            required_chain_id,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn address(&self) -> Option<Address> {
        match self.status {
            ConnectionStatus::Connected { address } => Some(address),
            _ => None,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn required_chain_id(&self) -> u64 {
        self.required_chain_id
    }

    pub fn last_error(&self) -> Option<&WalletError> {
        self.last_error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status, ConnectionStatus::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    /// Connected and on the required chain.
    pub fn on_required_chain(&self) -> bool {
        self.is_connected() && self.chain_id == Some(self.required_chain_id)
    }

    pub fn snapshot(&self) -> Session {
        Session {
            address: self.address(),
            is_connected: self.is_connected(),
            is_connecting: self.is_connecting(),
            chain_id: self.chain_id,
            required_chain_id: self.required_chain_id,
            last_error: self.last_error.clone(),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// `Idle -> Connecting`. Returns `false` (and changes nothing) when an
    /// attempt is already pending or the session is connected.
    pub fn begin_connect(&mut self) -> bool {
        if self.status != ConnectionStatus::Idle {
            return false;
        }
        self.status = ConnectionStatus::Connecting;
        self.last_error = None;
        true
    }

    /// `* -> Connected(address, chain_id)`. Also used by the silent restore.
    pub fn connect_succeeded(&mut self, address: Address, chain_id: u64) {
        self.status = ConnectionStatus::Connected { address };
        self.chain_id = Some(chain_id);
        self.last_error = self.mismatch_for(chain_id);
    }

    /// `Connecting -> Idle` with the error recorded. A failure that arrives
    /// after an event already connected the session is stale and ignored.
    pub fn connect_failed(&mut self, error: WalletError) {
        match self.status {
            ConnectionStatus::Connected { .. } => {
                tracing::debug!("Ignoring stale connect failure: {error}");
            }
            ConnectionStatus::Connecting | ConnectionStatus::Idle => {
                self.status = ConnectionStatus::Idle;
                self.last_error = Some(error);
            }
        }
    }

    /// Apply an `accountsChanged` payload.
    ///
    /// A non-empty list always selects its first account. An empty list
    /// drops a connected session to `Idle`; a pending attempt is left to
    /// resolve on its own.
    pub fn accounts_changed(&mut self, accounts: &[Address]) {
        match (accounts.first(), self.status) {
            (Some(&address), ConnectionStatus::Connected { .. }) => {
                self.status = ConnectionStatus::Connected { address };
            }
            (Some(&address), _) => {
                self.status = ConnectionStatus::Connected { address };
                self.last_error = self.chain_id.and_then(|c| self.mismatch_for(c));
            }
            (None, ConnectionStatus::Connected { .. }) => {
                self.status = ConnectionStatus::Idle;
                self.chain_id = None;
                self.last_error = None;
            }
            (None, _) => {}
        }
    }

    /// Apply a `chainChanged` payload. The address is untouched.
    pub fn chain_changed(&mut self, chain_id: u64) {
        self.chain_id = Some(chain_id);
        if !self.is_connected() {
            return;
        }
        if let Some(mismatch) = self.mismatch_for(chain_id) {
            self.last_error = Some(mismatch);
        } else if self
            .last_error
            .as_ref()
            .is_some_and(WalletError::is_network_mismatch)
        {
            self.last_error = None;
        }
    }

    /// Record a failed network switch while staying connected.
    pub fn network_failed(&mut self, error: WalletError) {
        self.last_error = Some(error);
    }

    /// The wallet confirmed a switch to the required chain.
    pub fn network_switched(&mut self) {
        self.chain_changed(self.required_chain_id);
    }

    /// Explicit disconnect: back to an empty `Idle` session.
    pub fn disconnect(&mut self) {
        *self = Self::new(self.required_chain_id);
    }

    fn mismatch_for(&self, chain_id: u64) -> Option<WalletError> {
        (chain_id != self.required_chain_id).then(|| WalletError::NetworkMismatch {
            expected: self.required_chain_id,
            actual: chain_id,
            reason: "wallet is on a different network".into(),
        })
    }
}
