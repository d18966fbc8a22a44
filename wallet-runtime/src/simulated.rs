//! In-process wallet backed by local keys.
//!
//! Serves the `simulated` connector and doubles as a scriptable provider for
//! tests: every request is recorded, and individual methods can be made to
//! reject, fail or hang.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, B256, Bytes, keccak256};
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::error::{UNRECOGNIZED_CHAIN_CODE, USER_REJECTED_CODE, WalletError};
use crate::provider::{ProviderError, RpcError, WalletProvider};
use crate::types::{ProviderMessage, parse_chain_id};

/// Hardhat / Anvil development account #0.
pub const DEV_PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

#[derive(Debug, Clone)]
enum Scripted {
    Fail(RpcError),
    Hang,
}

#[derive(Debug)]
struct SimState {
    signers: Vec<PrivateKeySigner>,
    accounts: Vec<Address>,
    authorized: bool,
    chain_id: u64,
    known_chains: HashSet<u64>,
    scripted: HashMap<String, Scripted>,
    call_results: HashMap<[u8; 4], Bytes>,
    requests: Vec<(String, Value)>,
    nonce: u64,
}

pub struct SimulatedWallet {
    state: Mutex<SimState>,
    events: broadcast::Sender<ProviderMessage>,
}

impl std::fmt::Debug for SimulatedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedWallet").finish_non_exhaustive()
    }
}

impl SimulatedWallet {
    /// Create a wallet holding the given hex private keys, on `chain_id`.
    pub fn new(private_keys: &[String], chain_id: u64) -> Result<Self, WalletError> {
        let signers = private_keys
            .iter()
            .map(|k| {
                k.parse::<PrivateKeySigner>()
                    .map_err(|e| WalletError::ConfigError(format!("Invalid private key: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let accounts = signers.iter().map(|s| s.address()).collect();
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            state: Mutex::new(SimState {
                signers,
                accounts,
                authorized: false,
                chain_id,
                known_chains: HashSet::from([chain_id]),
                scripted: HashMap::new(),
                call_results: HashMap::new(),
                requests: Vec::new(),
                nonce: 0,
            }),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: &str, payload: Value) {
        // No subscribers is fine.
        let _ = self.events.send(ProviderMessage {
            event: event.to_string(),
            payload,
        });
    }

    // ── Scripting ────────────────────────────────────────────────────────────

    /// Treat the site as already authorized (as after a previous session).
    pub fn authorize(&self) {
        self.lock().authorized = true;
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.lock().accounts.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.lock().chain_id
    }

    /// Chains the wallet can switch to without `wallet_addEthereumChain`.
    pub fn add_known_chain(&self, chain_id: u64) {
        self.lock().known_chains.insert(chain_id);
    }

    /// The user picks different accounts in the wallet UI.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        let payload = json!(accounts);
        self.lock().accounts = accounts;
        self.emit("accountsChanged", payload);
    }

    /// The user switches network in the wallet UI.
    pub fn set_chain(&self, chain_id: u64) {
        {
            let mut state = self.lock();
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self.emit("chainChanged", json!(format!("{chain_id:#x}")));
    }

    /// Every subsequent `method` request is declined by the user.
    pub fn reject(&self, method: &str) {
        self.fail(method, RpcError::new(USER_REJECTED_CODE, "User rejected the request."));
    }

    pub fn fail(&self, method: &str, error: RpcError) {
        self.lock()
            .scripted
            .insert(method.to_string(), Scripted::Fail(error));
    }

    /// Every subsequent `method` request shows a prompt nobody answers.
    pub fn hang(&self, method: &str) {
        self.lock().scripted.insert(method.to_string(), Scripted::Hang);
    }

    pub fn clear_script(&self, method: &str) {
        self.lock().scripted.remove(method);
    }

    /// Raw return data for `eth_call` with this selector.
    pub fn set_call_result(&self, selector: [u8; 4], data: Bytes) {
        self.lock().call_results.insert(selector, data);
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.lock().requests.iter().filter(|(m, _)| m == method).count()
    }

    // ── Request handling ─────────────────────────────────────────────────────

    async fn sign(&self, params: &Value) -> Result<Value, ProviderError> {
        let (message_hex, account) = match params.as_array().map(Vec::as_slice) {
            Some([Value::String(m), Value::String(a)]) => (m.clone(), a.clone()),
            _ => return Err(invalid_params("personal_sign expects [message, account]")),
        };
        let message = hex::decode(message_hex.trim_start_matches("0x"))
            .map_err(|e| invalid_params(&format!("message is not hex: {e}")))?;
        let account: Address = account
            .parse()
            .map_err(|e| invalid_params(&format!("bad account: {e}")))?;
        let signer = self
            .lock()
            .signers
            .iter()
            .find(|s| s.address() == account)
            .cloned()
            .ok_or_else(|| RpcError::new(4100, "Unknown account"))?;
        let signature = signer
            .sign_message(&message)
            .await
            .map_err(|e| RpcError::new(-32603, e.to_string()))?;
        Ok(json!(format!("0x{}", hex::encode(signature.as_bytes()))))
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        let mut state = self.lock();
        match method {
            "eth_accounts" => {
                if state.authorized {
                    Ok(json!(state.accounts))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_requestAccounts" => {
                state.authorized = true;
                Ok(json!(state.accounts))
            }
            "eth_chainId" => Ok(json!(format!("{:#x}", state.chain_id))),
            "wallet_switchEthereumChain" => {
                let target = chain_param(params)?;
                if !state.known_chains.contains(&target) {
                    return Err(RpcError::new(
                        UNRECOGNIZED_CHAIN_CODE,
                        format!("Unrecognized chain ID {target:#x}"),
                    )
                    .into());
                }
                state.chain_id = target;
                drop(state);
                self.emit("chainChanged", json!(format!("{target:#x}")));
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let target = chain_param(params)?;
                state.known_chains.insert(target);
                state.chain_id = target;
                drop(state);
                self.emit("chainChanged", json!(format!("{target:#x}")));
                Ok(Value::Null)
            }
            "eth_sendTransaction" => {
                if !state.authorized {
                    return Err(RpcError::new(4100, "Unauthorized").into());
                }
                state.nonce += 1;
                let mut seed = serde_json::to_vec(params).unwrap_or_default();
                seed.extend_from_slice(&state.nonce.to_be_bytes());
                let hash: B256 = keccak256(seed);
                Ok(json!(hash))
            }
            "eth_call" => {
                let data = params
                    .get(0)
                    .and_then(|tx| tx.get("data"))
                    .and_then(Value::as_str)
                    .and_then(|d| d.parse::<Bytes>().ok())
                    .ok_or_else(|| invalid_params("eth_call expects a data field"))?;
                let selector: [u8; 4] = data
                    .get(..4)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| invalid_params("calldata shorter than a selector"))?;
                let result = state.call_results.get(&selector).cloned().unwrap_or_default();
                Ok(json!(result))
            }
            other => Err(RpcError::new(4200, format!("Unsupported method {other}")).into()),
        }
    }
}

fn invalid_params(message: &str) -> ProviderError {
    RpcError::new(-32602, message).into()
}

fn chain_param(params: &Value) -> Result<u64, ProviderError> {
    let raw = params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .ok_or_else(|| invalid_params("missing chainId"))?;
    parse_chain_id(raw).map_err(|e| invalid_params(&e.to_string()))
}

#[async_trait]
impl WalletProvider for SimulatedWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let scripted = {
            let mut state = self.lock();
            state.requests.push((method.to_string(), params.clone()));
            state.scripted.get(method).cloned()
        };
        match scripted {
            Some(Scripted::Fail(err)) => return Err(err.into()),
            Some(Scripted::Hang) => std::future::pending::<()>().await,
            None => {}
        }
        if method == "personal_sign" {
            return self.sign(&params).await;
        }
        self.handle(method, &params)
    }

    fn events(&self) -> broadcast::Receiver<ProviderMessage> {
        self.events.subscribe()
    }
}
