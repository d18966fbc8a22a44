//! End-to-end session flows against a simulated wallet.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use wallet_runtime::contracts::GREEN_POINTS;
use wallet_runtime::simulated::DEV_PRIVATE_KEY;
use wallet_runtime::storage::LAST_ACCOUNT_KEY;
use wallet_runtime::{
    ContractRegistry, FileStore, KeyValueStore, MemoryStore, NetworkDescriptor, ProviderAdapter,
    ProviderEvent, SessionContext, SessionState, SimulatedWallet, WalletConfig, WalletError,
    WalletProvider,
};

const HEDERA_TESTNET: u64 = 296;
const SECOND_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

fn wallet(chain_id: u64) -> Arc<SimulatedWallet> {
    Arc::new(
        SimulatedWallet::new(&[DEV_PRIVATE_KEY.to_string(), SECOND_KEY.to_string()], chain_id)
            .expect("wallet"),
    )
}

fn registry() -> ContractRegistry {
    WalletConfig::hedera_testnet()
        .contract_registry()
        .expect("registry")
}

fn context(
    wallet: Option<&Arc<SimulatedWallet>>,
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
) -> Arc<SessionContext> {
    let provider = wallet.map(|w| w.clone() as Arc<dyn WalletProvider>);
    Arc::new(SessionContext::new(
        ProviderAdapter::new(provider).with_timeout(timeout),
        NetworkDescriptor::hedera_testnet(),
        registry(),
        store,
    ))
}

fn default_context(wallet: &Arc<SimulatedWallet>, store: Arc<dyn KeyValueStore>) -> Arc<SessionContext> {
    context(Some(wallet), store, Duration::from_secs(30))
}

async fn wait_for(ctx: &SessionContext, predicate: impl FnMut(&SessionState) -> bool) {
    let mut rx = ctx.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("session did not reach the expected state")
        .expect("session state channel closed");
}

// ── Connect ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_provider_absent_stays_idle() {
    let ctx = context(None, Arc::new(MemoryStore::new()), Duration::from_secs(30));
    let err = ctx.connect().await.unwrap_err();
    assert_eq!(err, WalletError::ProviderUnavailable);

    let session = ctx.session();
    assert!(!session.is_connected);
    assert!(!session.is_connecting);
    assert!(session.address.is_none());
}

#[tokio::test]
async fn test_connect_on_required_chain_has_no_network_prompt() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));

    let session = ctx.connect().await.unwrap();
    assert!(session.is_connected);
    assert_eq!(session.address, Some(wallet.accounts()[0]));
    assert_eq!(session.chain_id, Some(HEDERA_TESTNET));
    assert!(session.last_error.is_none());
    assert_eq!(wallet.request_count("wallet_switchEthereumChain"), 0);
    assert_eq!(wallet.request_count("wallet_addEthereumChain"), 0);
}

#[tokio::test]
async fn test_mismatched_chain_switches_then_adds() {
    let wallet = wallet(1);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));

    let session = ctx.connect().await.unwrap();
    assert!(session.is_connected);
    assert_eq!(session.chain_id, Some(HEDERA_TESTNET));
    assert!(session.last_error.is_none());

    let requests = wallet.requests();
    let switch = requests
        .iter()
        .position(|(m, _)| m == "wallet_switchEthereumChain")
        .expect("switch requested");
    let (add_method, add_params) = &requests[switch + 1];
    assert_eq!(add_method, "wallet_addEthereumChain");
    assert_eq!(add_params[0]["chainId"], "0x128");
    assert_eq!(add_params[0]["chainName"], "Hedera Testnet");
    assert_eq!(add_params[0]["rpcUrls"][0], "https://testnet.hashio.io/api");
    assert_eq!(add_params[0]["blockExplorerUrls"][0], "https://hashscan.io/testnet");
    assert_eq!(add_params[0]["nativeCurrency"]["symbol"], "HBAR");
    assert_eq!(add_params[0]["nativeCurrency"]["decimals"], 18);
}

#[tokio::test]
async fn test_failed_switch_flags_mismatch_and_withholds_signer() {
    let wallet = wallet(1);
    wallet.reject("wallet_switchEthereumChain");
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));

    let session = ctx.connect().await.unwrap();
    assert!(session.is_connected);
    assert_eq!(session.chain_id, Some(1));
    assert!(matches!(
        session.last_error,
        Some(WalletError::NetworkMismatch { expected: 296, actual: 1, .. })
    ));
    assert!(ctx.signer().is_none());
    assert!(ctx.get_contract(GREEN_POINTS).is_none());
    assert!(ctx.try_get_contract(GREEN_POINTS).unwrap_err().is_network_mismatch());
}

#[tokio::test]
async fn test_prompt_timeout_is_distinct_from_rejection() {
    let wallet = wallet(HEDERA_TESTNET);
    wallet.hang("eth_requestAccounts");
    let ctx = context(Some(&wallet), Arc::new(MemoryStore::new()), Duration::from_millis(50));

    let err = ctx.connect().await.unwrap_err();
    assert!(matches!(err, WalletError::ProviderTimeout { ref method, .. } if method == "eth_requestAccounts"));
    assert_ne!(err.kind(), "user_rejected");
    assert!(!ctx.session().is_connected);
    assert!(!ctx.session().is_connecting);
}

#[tokio::test]
async fn test_concurrent_connects_share_one_prompt() {
    let wallet = wallet(HEDERA_TESTNET);
    wallet.hang("eth_requestAccounts");
    let ctx = context(Some(&wallet), Arc::new(MemoryStore::new()), Duration::from_millis(100));

    let (a, b) = tokio::join!(ctx.connect(), ctx.connect());
    assert!(matches!(a, Err(WalletError::ProviderTimeout { .. })));
    assert_eq!(a, b);
    assert_eq!(wallet.request_count("eth_requestAccounts"), 1);

    // A fresh attempt after the first settled prompts again.
    wallet.clear_script("eth_requestAccounts");
    let (a, b) = tokio::join!(ctx.connect(), ctx.connect());
    assert_eq!(a.unwrap().address, b.unwrap().address);
    assert_eq!(wallet.request_count("eth_requestAccounts"), 2);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_keeps_single_attempt() {
    let wallet = wallet(HEDERA_TESTNET);
    wallet.hang("eth_requestAccounts");
    let ctx = context(Some(&wallet), Arc::new(MemoryStore::new()), Duration::from_millis(300));

    let first = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.disconnect();

    tokio::time::sleep(Duration::from_millis(130)).await;
    let second = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(wallet.request_count("eth_requestAccounts"), 2);

    // The abandoned attempt settles while the new one is still waiting.
    assert_eq!(first.await.unwrap(), Err(WalletError::NotConnected));
    assert!(ctx.session().is_connecting);

    let third = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(wallet.request_count("eth_requestAccounts"), 2);

    let second = second.await.unwrap();
    assert!(matches!(second, Err(WalletError::ProviderTimeout { .. })));
    assert_eq!(third.await.unwrap(), second);
    assert!(!ctx.session().is_connecting);
}

#[tokio::test]
async fn test_abandoned_connect_still_times_out() {
    let wallet = wallet(HEDERA_TESTNET);
    wallet.hang("eth_requestAccounts");
    let ctx = context(Some(&wallet), Arc::new(MemoryStore::new()), Duration::from_millis(100));

    let dropped = tokio::time::timeout(Duration::from_millis(30), ctx.connect()).await;
    assert!(dropped.is_err());
    assert!(ctx.session().is_connecting);

    wait_for(&ctx, |s| !s.is_connecting()).await;
    let session = ctx.session();
    assert!(!session.is_connected);
    assert!(matches!(session.last_error, Some(WalletError::ProviderTimeout { .. })));
}

#[tokio::test]
async fn test_abandoned_connect_applies_late_approval() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));

    // Caller gives up before the wallet has a chance to answer.
    let dropped = tokio::time::timeout(Duration::ZERO, ctx.connect()).await;
    assert!(dropped.is_err());

    wait_for(&ctx, |s| s.is_connected()).await;
    assert_eq!(ctx.session().address, Some(wallet.accounts()[0]));
}

// ── Network guard ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ensure_network_prompts_at_most_once() {
    let wallet = wallet(1);
    wallet.reject("wallet_switchEthereumChain");
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    ctx.connect().await.unwrap();
    let prompts = wallet.request_count("wallet_switchEthereumChain");

    assert!(ctx.ensure_network().await.unwrap_err().is_network_mismatch());
    assert!(ctx.ensure_network().await.unwrap_err().is_network_mismatch());
    assert_eq!(wallet.request_count("wallet_switchEthereumChain"), prompts);

    // A chain change re-arms the guard.
    wallet.add_known_chain(HEDERA_TESTNET);
    wallet.clear_script("wallet_switchEthereumChain");
    ctx.handle_event(ProviderEvent::ChainChanged(1)).await;
    ctx.ensure_network().await.unwrap();
    assert_eq!(wallet.request_count("wallet_switchEthereumChain"), prompts + 1);
    assert!(ctx.signer().is_some());
}

// ── Wallet events ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_accounts_event_disconnects_and_clears_storage() {
    let wallet = wallet(HEDERA_TESTNET);
    let store = Arc::new(MemoryStore::new());
    let ctx = default_context(&wallet, store.clone());
    ctx.connect().await.unwrap();
    assert!(store.get(LAST_ACCOUNT_KEY).unwrap().is_some());

    wallet.set_accounts(vec![]);
    wait_for(&ctx, |s| !s.is_connected()).await;

    let session = ctx.session();
    assert!(session.address.is_none());
    assert!(session.chain_id.is_none());
    assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_account_switch_rebinds_contract_handles() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    ctx.connect().await.unwrap();
    let accounts = wallet.accounts();

    let before = ctx.get_contract(GREEN_POINTS).unwrap();
    assert_eq!(before.signer().address(), accounts[0]);

    wallet.set_accounts(vec![accounts[1], accounts[0]]);
    let second = accounts[1];
    wait_for(&ctx, move |s| s.address() == Some(second)).await;

    let after = ctx.get_contract(GREEN_POINTS).unwrap();
    assert_eq!(after.signer().address(), accounts[1]);
    assert_eq!(before.signer().address(), accounts[0]);
}

#[tokio::test]
async fn test_pending_chain_lookup_does_not_block_account_events() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = context(Some(&wallet), Arc::new(MemoryStore::new()), Duration::from_secs(5));
    ctx.connect().await.unwrap();

    // Dropping all accounts forgets the chain id.
    wallet.set_accounts(Vec::new());
    wait_for(&ctx, |s| !s.is_connected()).await;

    wallet.hang("eth_chainId");
    let first = Address::repeat_byte(0x11);
    let second = Address::repeat_byte(0x22);
    wallet.set_accounts(vec![first]);
    wait_for(&ctx, |s| s.address() == Some(first)).await;
    wallet.set_accounts(vec![second]);

    let mut rx = ctx.subscribe();
    tokio::time::timeout(
        Duration::from_millis(500),
        rx.wait_for(|s| s.address() == Some(second)),
    )
    .await
    .expect("account event held up by the chain id lookup")
    .unwrap();
    assert_eq!(ctx.session().chain_id, None);
}

#[tokio::test]
async fn test_chain_event_keeps_address() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    let address = ctx.connect().await.unwrap().address;

    wallet.set_chain(1);
    wait_for(&ctx, |s| s.chain_id() == Some(1)).await;

    let session = ctx.session();
    assert_eq!(session.address, address);
    assert!(session.last_error.as_ref().is_some_and(WalletError::is_network_mismatch));
}

#[tokio::test]
async fn test_address_tracks_last_accounts_event() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    ctx.connect().await.unwrap();

    let a = Address::repeat_byte(0xa1);
    let b = Address::repeat_byte(0xb2);
    let c = Address::repeat_byte(0xc3);
    let sequences: Vec<Vec<Vec<Address>>> = vec![
        vec![vec![a], vec![b, a], vec![c]],
        vec![vec![a], vec![]],
        vec![vec![], vec![b]],
        vec![vec![b], vec![], vec![a, c], vec![c, a]],
        vec![vec![], vec![]],
    ];

    for sequence in sequences {
        for accounts in &sequence {
            ctx.handle_event(ProviderEvent::AccountsChanged(accounts.clone()))
                .await;
        }
        let expected = sequence.last().and_then(|last| last.first().copied());
        let session = ctx.session();
        assert_eq!(session.address, expected, "sequence {sequence:?}");
        assert_eq!(session.is_connected, expected.is_some());
    }
}

// ── Contract factory ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_contract_without_signer_returns_none() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    assert!(ctx.get_contract(GREEN_POINTS).is_none());
    assert!(ctx.get_contract("Marketplace").is_none());
}

#[tokio::test]
async fn test_get_contract_unknown_name_returns_none() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    ctx.connect().await.unwrap();
    assert!(ctx.get_contract(GREEN_POINTS).is_some());
    assert!(ctx.get_contract("Marketplace").is_none());
    assert_eq!(
        ctx.try_get_contract("Marketplace").unwrap_err(),
        WalletError::ContractNotConfigured("Marketplace".into())
    );
}

// ── Persistence across restarts ─────────────────────────────────────────────

#[tokio::test]
async fn test_restart_restores_silently() {
    let dir = tempfile::tempdir().unwrap();
    let wallet = wallet(HEDERA_TESTNET);

    let first = default_context(&wallet, Arc::new(FileStore::in_dir(dir.path()).unwrap()));
    let address = first.connect().await.unwrap().address;
    drop(first);

    let second = default_context(&wallet, Arc::new(FileStore::in_dir(dir.path()).unwrap()));
    let session = second.initialize().await;
    assert!(session.is_connected);
    assert_eq!(session.address, address);
    assert_eq!(wallet.request_count("eth_requestAccounts"), 1);

    // Only runs once per context.
    let accounts_queries = wallet.request_count("eth_accounts");
    second.initialize().await;
    assert_eq!(wallet.request_count("eth_accounts"), accounts_queries);
}

#[tokio::test]
async fn test_disconnect_prevents_restore() {
    let dir = tempfile::tempdir().unwrap();
    let wallet = wallet(HEDERA_TESTNET);

    let first = default_context(&wallet, Arc::new(FileStore::in_dir(dir.path()).unwrap()));
    first.connect().await.unwrap();
    first.disconnect();
    assert!(!first.session().is_connected);
    drop(first);

    let store = FileStore::in_dir(dir.path()).unwrap();
    assert_eq!(store.get(LAST_ACCOUNT_KEY).unwrap(), None);

    let second = default_context(&wallet, Arc::new(store));
    let session = second.initialize().await;
    assert!(!session.is_connected);
    assert_eq!(wallet.request_count("eth_accounts"), 0);
}

#[tokio::test]
async fn test_disconnect_stops_event_handling() {
    let wallet = wallet(HEDERA_TESTNET);
    let ctx = default_context(&wallet, Arc::new(MemoryStore::new()));
    ctx.connect().await.unwrap();
    ctx.disconnect();

    wallet.set_accounts(vec![Address::repeat_byte(0x42)]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!ctx.session().is_connected);
}
