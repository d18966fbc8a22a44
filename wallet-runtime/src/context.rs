//! Process-wide wallet session.
//!
//! [`SessionContext`] owns the single [`SessionState`] and is the only place
//! that applies transitions to it. Consumers read snapshots or watch for
//! changes; they never mutate the state directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::Address;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;

use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::factory::{ContractFactory, ContractHandle, ContractRegistry, WalletSigner};
use crate::network::{NetworkGuard, NetworkOutcome};
use crate::provider::{ProviderAdapter, Subscription, WalletProvider};
use crate::session::{Session, SessionState};
use crate::storage::{FileStore, KeyValueStore, LAST_ACCOUNT_KEY};
use crate::types::{NetworkDescriptor, ProviderEvent, ProviderEventKind};

type ConnectAttempt = Shared<BoxFuture<'static, Result<Session, WalletError>>>;

/// In-flight connect attempt, tagged with the generation that started it.
struct PendingConnect {
    generation: u64,
    attempt: ConnectAttempt,
}

pub struct SessionContext {
    adapter: ProviderAdapter,
    network: NetworkDescriptor,
    guard: NetworkGuard,
    factory: ContractFactory,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
    pending_connect: Mutex<Option<PendingConnect>>,
    subscriptions: Mutex<Vec<Subscription>>,
    /// Bumped on every explicit disconnect; a connect attempt started in an
    /// older generation does not apply its result.
    generation: AtomicU64,
    initialized: AtomicBool,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("adapter", &self.adapter)
            .field("network", &self.network.name)
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn new(
        adapter: ProviderAdapter,
        network: NetworkDescriptor,
        registry: ContractRegistry,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let guard = NetworkGuard::new(adapter.clone(), [network.clone()]);
        let (state, _) = watch::channel(SessionState::new(network.chain_id));
        Self {
            adapter,
            network,
            guard,
            factory: ContractFactory::new(registry),
            store,
            state,
            pending_connect: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    /// Wire a context from configuration, persisting under `state_dir`.
    pub fn from_config(
        config: &WalletConfig,
        provider: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Self, WalletError> {
        let adapter = ProviderAdapter::new(provider).with_timeout(config.request_timeout());
        let store = FileStore::in_dir(&config.state_dir)?;
        tracing::info!(path = %store.path().display(), "Session storage opened");
        let registry = config.contract_registry()?;
        Ok(Self::new(adapter, config.network.clone(), registry, Arc::new(store)))
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    pub fn registry(&self) -> &ContractRegistry {
        self.factory.registry()
    }

    pub fn provider_detected(&self) -> bool {
        self.adapter.detect()
    }

    pub fn session(&self) -> Session {
        self.state.borrow().snapshot()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// One-time startup: silently restore the last session if an address was
    /// persisted and the wallet still authorizes an account. Never prompts.
    pub async fn initialize(self: &Arc<Self>) -> Session {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return self.session();
        }

        let stored = match self.store.get(LAST_ACCOUNT_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to read persisted account: {e}");
                None
            }
        };
        let Some(stored) = stored else {
            tracing::debug!("No persisted account, starting idle");
            return self.session();
        };
        if !self.adapter.detect() {
            tracing::info!(account = %stored, "Wallet not detected, skipping restore");
            return self.session();
        }
        if let Err(e) = self.attach_listeners() {
            tracing::warn!("Failed to subscribe to wallet events: {e}");
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let restored = async {
            let accounts = self.adapter.accounts().await?;
            let Some(&address) = accounts.first() else {
                return Ok(None);
            };
            let chain_id = self.adapter.chain_id().await?;
            Ok::<_, WalletError>(Some((address, chain_id)))
        }
        .await;

        if generation != self.generation.load(Ordering::SeqCst) {
            return self.session();
        }
        match restored {
            Ok(Some((address, chain_id))) => {
                let applied = self.state.send_if_modified(|s| {
                    if s.is_connected() || s.is_connecting() {
                        return false;
                    }
                    s.connect_succeeded(address, chain_id);
                    true
                });
                if applied {
                    tracing::info!(%address, chain_id, "Session restored");
                    self.persist(address);
                }
            }
            Ok(None) => {
                tracing::info!(account = %stored, "Wallet no longer authorizes an account");
                self.clear_persisted();
            }
            Err(e) => {
                tracing::warn!("Silent restore failed: {e}");
                self.clear_persisted();
            }
        }
        self.session()
    }

    /// Prompt the wallet for accounts.
    ///
    /// Returns the current session without prompting when already connected.
    /// A call made while another attempt is pending awaits that attempt.
    pub async fn connect(self: &Arc<Self>) -> Result<Session, WalletError> {
        if !self.adapter.detect() {
            let err = WalletError::ProviderUnavailable;
            tracing::warn!("{err}");
            self.state.send_modify(|s| s.connect_failed(err.clone()));
            return Err(err);
        }

        let attempt = {
            let mut pending = self
                .pending_connect
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match pending.as_ref() {
                Some(in_flight) => {
                    tracing::debug!("Connect already in progress, joining it");
                    in_flight.attempt.clone()
                }
                None => {
                    if self.state.borrow().is_connected() {
                        return Ok(self.session());
                    }
                    let started = self.state.send_if_modified(SessionState::begin_connect);
                    if !started {
                        tracing::warn!("Session is connecting without a tracked attempt");
                        return Err(WalletError::NotConnected);
                    }
                    let generation = self.generation.load(Ordering::SeqCst);
                    // Spawned so the attempt settles even if every caller goes away.
                    let task = tokio::spawn(Arc::clone(self).run_connect(generation));
                    let attempt = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(WalletError::InvalidResponse(format!("Connect task failed: {e}")))
                        })
                    }
                    .boxed()
                    .shared();
                    *pending = Some(PendingConnect {
                        generation,
                        attempt: attempt.clone(),
                    });
                    attempt
                }
            }
        };
        attempt.await
    }

    async fn run_connect(self: Arc<Self>, generation: u64) -> Result<Session, WalletError> {
        let result = self.establish().await;

        let outcome = if generation != self.generation.load(Ordering::SeqCst) {
            tracing::info!("Connect attempt superseded by disconnect");
            Err(WalletError::NotConnected)
        } else {
            match result {
                Ok((address, chain_id)) => {
                    self.state.send_modify(|s| s.connect_succeeded(address, chain_id));
                    self.persist(address);
                    tracing::info!(%address, chain_id, "Wallet connected");
                    if chain_id != self.network.chain_id {
                        // Mismatch is recorded in the session; connect itself succeeded.
                        let _ = self.ensure_network().await;
                    }
                    Ok(self.session())
                }
                Err(e) => {
                    tracing::warn!("Wallet connect failed: {e}");
                    self.state.send_modify(|s| s.connect_failed(e.clone()));
                    Err(e)
                }
            }
        };

        let mut pending = self
            .pending_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A newer attempt may own the slot after a disconnect.
        if pending.as_ref().is_some_and(|p| p.generation == generation) {
            pending.take();
        }
        outcome
    }

    async fn establish(self: &Arc<Self>) -> Result<(Address, u64), WalletError> {
        self.attach_listeners()?;
        let accounts = self.adapter.request_accounts().await?;
        let address = accounts
            .first()
            .copied()
            .ok_or_else(|| WalletError::InvalidResponse("Wallet returned no accounts".into()))?;
        let chain_id = self.adapter.chain_id().await?;
        Ok((address, chain_id))
    }

    /// Explicit teardown: reset to `Idle`, forget the persisted address and
    /// stop listening to wallet events.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.pending_connect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.clear_persisted();
        self.guard.reset();
        self.state.send_modify(SessionState::disconnect);
        tracing::info!("Wallet disconnected");
    }

    /// Make sure the wallet is on the required chain, prompting at most once
    /// per observed chain.
    pub async fn ensure_network(&self) -> Result<NetworkOutcome, WalletError> {
        let (connected, current) = {
            let state = self.state.borrow();
            (state.is_connected(), state.chain_id())
        };
        if !connected {
            return Err(WalletError::NotConnected);
        }
        let current = match current {
            Some(chain_id) => chain_id,
            None => self.adapter.chain_id().await?,
        };

        match self.guard.ensure(current, self.network.chain_id).await {
            Ok(NetworkOutcome::AlreadyActive) => {
                self.state.send_if_modified(|s| {
                    if s.chain_id() == Some(current) {
                        return false;
                    }
                    s.chain_changed(current);
                    true
                });
                Ok(NetworkOutcome::AlreadyActive)
            }
            Ok(outcome) => {
                self.state.send_modify(SessionState::network_switched);
                Ok(outcome)
            }
            Err(e) => {
                self.state.send_modify(|s| s.network_failed(e.clone()));
                Err(e)
            }
        }
    }

    // ── Events ───────────────────────────────────────────────────────────────

    fn attach_listeners(self: &Arc<Self>) -> Result<(), WalletError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !subscriptions.is_empty() {
            return Ok(());
        }
        for kind in [ProviderEventKind::AccountsChanged, ProviderEventKind::ChainChanged] {
            let weak = Arc::downgrade(self);
            let subscription = self.adapter.subscribe(kind, move |event| {
                let weak = weak.clone();
                async move {
                    let Some(context) = weak.upgrade() else { return };
                    if context.apply_event(event) {
                        // Off the event loop so later events are not held up by the lookup.
                        tokio::spawn(async move { context.refresh_chain_id().await });
                    }
                }
            })?;
            subscriptions.push(subscription);
        }
        tracing::debug!("Subscribed to wallet events");
        Ok(())
    }

    /// Apply a wallet event. Safe to call at any time, including while a
    /// connect attempt is pending.
    pub async fn handle_event(&self, event: ProviderEvent) {
        if self.apply_event(event) {
            self.refresh_chain_id().await;
        }
    }

    /// State half of [`Self::handle_event`]. Returns `true` when the session
    /// is connected but its chain id is still unknown.
    fn apply_event(&self, event: ProviderEvent) -> bool {
        tracing::debug!(?event, "Wallet event");
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                // Storage first, so watchers of the state see it settled.
                match accounts.first() {
                    Some(&address) => self.persist(address),
                    None => self.clear_persisted(),
                }
                self.state.send_modify(|s| s.accounts_changed(&accounts));
                let state = self.state.borrow();
                state.is_connected() && state.chain_id().is_none()
            }
            ProviderEvent::ChainChanged(chain_id) => {
                self.guard.reset();
                self.state.send_modify(|s| s.chain_changed(chain_id));
                false
            }
        }
    }

    async fn refresh_chain_id(&self) {
        match self.adapter.chain_id().await {
            Ok(chain_id) => {
                // A chainChanged event may have answered first.
                self.state.send_if_modified(|s| {
                    if !s.is_connected() || s.chain_id().is_some() {
                        return false;
                    }
                    s.chain_changed(chain_id);
                    true
                });
            }
            Err(e) => tracing::warn!("Failed to read chain id: {e}"),
        }
    }

    // ── Signer & contracts ───────────────────────────────────────────────────

    /// The active signer, or why there is none.
    pub fn try_signer(&self) -> Result<WalletSigner, WalletError> {
        let state = self.state.borrow();
        let address = state.address().ok_or(WalletError::NotConnected)?;
        if !state.on_required_chain() {
            return Err(WalletError::NetworkMismatch {
                expected: state.required_chain_id(),
                actual: state.chain_id().unwrap_or_default(),
                reason: "switch the wallet to the required network first".into(),
            });
        }
        Ok(WalletSigner::new(
            address,
            state.required_chain_id(),
            self.adapter.clone(),
        ))
    }

    /// Only available while connected on the required chain.
    pub fn signer(&self) -> Option<WalletSigner> {
        self.try_signer().ok()
    }

    pub fn try_get_contract(&self, logical_name: &str) -> Result<ContractHandle, WalletError> {
        let signer = self.try_signer()?;
        self.factory.try_get_contract(logical_name, Some(&signer))
    }

    /// Handle bound to the current signer; `None` (logged) when there is no
    /// signer or the name is not configured.
    pub fn get_contract(&self, logical_name: &str) -> Option<ContractHandle> {
        self.factory
            .get_contract(logical_name, self.signer().as_ref())
    }

    pub async fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        self.try_signer()?.sign_message(message).await
    }

    // ── Storage ──────────────────────────────────────────────────────────────

    fn persist(&self, address: Address) {
        if let Err(e) = self.store.set(LAST_ACCOUNT_KEY, &address.to_string()) {
            tracing::warn!("Failed to persist account: {e}");
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.store.remove(LAST_ACCOUNT_KEY) {
            tracing::warn!("Failed to clear persisted account: {e}");
        }
    }
}
