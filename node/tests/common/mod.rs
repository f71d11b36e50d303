// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use alloy::primitives::{address, Address, Bytes, B256, U256};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use plumise_agent_kernel::abi;
use plumise_agent_kernel::tx::{Receipt, SignedTransaction, TxStatus};
use plumise_agent_node::config::AgentConfig;
use plumise_agent_node::errors::{AgentError, RejectionKind};
use plumise_agent_node::network::ChainRpc;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const REWARD_POOL: Address = address!("00000000000000000000000000000000000000aa");
pub const REGISTRY: Address = address!("00000000000000000000000000000000000000bb");

/// Config with every interval shrunk to test scale.
pub fn test_config() -> AgentConfig {
    let mut cfg = AgentConfig::new(TEST_KEY);
    cfg.lifecycle.receipt_poll_interval = Duration::from_millis(5);
    cfg.lifecycle.receipt_timeout = Duration::from_millis(200);
    cfg.lifecycle.registration_backoff = Duration::from_millis(5);
    cfg.lifecycle.report_backoff = Duration::from_millis(5);
    cfg.lifecycle.report_timeout = Duration::from_secs(2);
    cfg.lifecycle.shutdown_grace = Duration::from_secs(1);
    cfg
}

#[derive(Debug)]
pub struct ChainState {
    pub chain_id: u64,
    /// Next nonce the chain will accept.
    pub nonce: u64,
    pub balance: U256,
    pub gas_price: u128,
    pub sent: Vec<SignedTransaction>,
    pub pending_reward: U256,
    pub epoch: u64,
    pub registered_in_registry: bool,
    /// `getCurrentEpoch` reverts, as on a pool that lacks it.
    pub epoch_reverts: bool,
    /// Popped one per `send_raw_transaction` before anything else.
    pub send_errors: VecDeque<AgentError>,
    /// Transactions to these targets are mined with status 0.
    pub revert_to: HashSet<Address>,
    /// Receipts never appear.
    pub withhold_receipts: bool,
}

/// In-memory chain behind the `ChainRpc` seam.
pub struct MockChain {
    pub state: Mutex<ChainState>,
    pub send_delay: Duration,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(send_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState {
                chain_id: 41956,
                nonce: 0,
                balance: U256::from(10u128.pow(18)),
                gas_price: 1_000_000_000,
                sent: Vec::new(),
                pending_reward: U256::ZERO,
                epoch: 7,
                registered_in_registry: false,
                epoch_reverts: false,
                send_errors: VecDeque::new(),
                revert_to: HashSet::new(),
                withhold_receipts: false,
            }),
            send_delay,
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn sent(&self) -> Vec<SignedTransaction> {
        self.with(|s| s.sent.clone())
    }

    pub fn sent_to(&self, to: Address) -> Vec<SignedTransaction> {
        self.sent().into_iter().filter(|tx| tx.to() == to).collect()
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn chain_id(&self) -> Result<u64, AgentError> {
        Ok(self.with(|s| s.chain_id))
    }

    async fn block_number(&self) -> Result<u64, AgentError> {
        Ok(self.with(|s| s.sent.len() as u64))
    }

    async fn balance(&self, _who: Address) -> Result<U256, AgentError> {
        Ok(self.with(|s| s.balance))
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, AgentError> {
        let sel: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| AgentError::InvalidInput("short calldata".into()))?;
        let word = self.with(|s| {
            if sel == abi::selector(abi::SIG_GET_CURRENT_EPOCH) && s.epoch_reverts {
                return Err(AgentError::Rpc {
                    code: 3,
                    message: "execution reverted".into(),
                });
            }
            Ok(if sel == abi::selector(abi::SIG_GET_PENDING_REWARD) {
                s.pending_reward
            } else if sel == abi::selector(abi::SIG_GET_CURRENT_EPOCH) {
                U256::from(s.epoch)
            } else if sel == abi::selector(abi::SIG_IS_REGISTERED) {
                U256::from(s.registered_in_registry as u64)
            } else {
                U256::ZERO
            })
        })?;
        Ok(Bytes::from(word.to_be_bytes::<32>().to_vec()))
    }

    async fn transaction_count(&self, _who: Address) -> Result<u64, AgentError> {
        Ok(self.with(|s| s.nonce))
    }

    async fn gas_price(&self) -> Result<u128, AgentError> {
        Ok(self.with(|s| s.gas_price))
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<B256, AgentError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.with(|s| {
            if let Some(e) = s.send_errors.pop_front() {
                return Err(e);
            }
            if tx.nonce() != s.nonce {
                return Err(AgentError::ChainRejection {
                    kind: RejectionKind::BadNonce,
                    message: format!("nonce too low: have {}, want {}", tx.nonce(), s.nonce),
                });
            }
            s.nonce += 1;
            if tx.to() == REWARD_POOL && tx.request.data == abi::claim_reward_call() && !s.revert_to.contains(&REWARD_POOL) {
                s.pending_reward = U256::ZERO;
            }
            s.sent.push(tx.clone());
            Ok(tx.hash)
        })
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, AgentError> {
        Ok(self.with(|s| {
            if s.withhold_receipts {
                return None;
            }
            let idx = s.sent.iter().position(|tx| tx.hash == tx_hash)?;
            let status = if s.revert_to.contains(&s.sent[idx].to()) {
                TxStatus::Failure
            } else {
                TxStatus::Success
            };
            Some(Receipt {
                tx_hash,
                status,
                block_number: Some(idx as u64 + 1),
            })
        }))
    }
}

/// Requests seen by a mock Oracle.
#[derive(Default)]
pub struct OracleLog {
    pub attempts: AtomicUsize,
    pub accepted: Mutex<Vec<Value>>,
    pub report_ids: Mutex<Vec<String>>,
}

#[derive(Clone, Copy)]
pub enum OracleMode {
    /// HTTP 500 for the first `n` requests, then 200.
    FailFirst(usize),
    /// HTTP 200 with `{"status":"error"}` forever.
    SoftError,
    /// Accepts after sleeping this long.
    Hang(Duration),
}

struct OracleState {
    mode: OracleMode,
    log: Arc<OracleLog>,
}

async fn report_handler(
    State(state): State<Arc<OracleState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = state.log.attempts.fetch_add(1, Ordering::SeqCst);
    if let Some(id) = headers.get("x-report-id").and_then(|v| v.to_str().ok()) {
        state.log.report_ids.lock().unwrap().push(id.to_string());
    }
    match state.mode {
        OracleMode::FailFirst(k) if n < k => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "message": "unavailable"})),
        ),
        OracleMode::FailFirst(_) => {
            state.log.accepted.lock().unwrap().push(body);
            (StatusCode::OK, Json(json!({"status": "ok"})))
        }
        OracleMode::Hang(delay) => {
            tokio::time::sleep(delay).await;
            state.log.accepted.lock().unwrap().push(body);
            (StatusCode::OK, Json(json!({"status": "ok"})))
        }
        OracleMode::SoftError => (
            StatusCode::OK,
            Json(json!({"status": "error", "message": "bad signature"})),
        ),
    }
}

/// Spawn a mock Oracle on an ephemeral port. Returns its base URL.
pub async fn spawn_oracle(mode: OracleMode) -> (String, Arc<OracleLog>) {
    let log = Arc::new(OracleLog::default());
    let state = Arc::new(OracleState { mode, log: log.clone() });
    let app = Router::new()
        .route("/api/v1/report", post(report_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), log)
}
