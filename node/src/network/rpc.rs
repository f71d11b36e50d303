// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain access over JSON-RPC 2.0.
//!
//! `ChainRpc` is the seam every chain-facing loop goes through, so tests can
//! swap in an in-memory chain. `JsonRpcClient` is the HTTP implementation.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use plumise_agent_kernel::tx::{Receipt, SignedTransaction, TxStatus};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::{AgentError, RejectionKind};

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, AgentError>;

    async fn block_number(&self) -> Result<u64, AgentError>;

    async fn balance(&self, who: Address) -> Result<U256, AgentError>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AgentError>;

    /// Next nonce for `who`, counting pending transactions.
    async fn transaction_count(&self, who: Address) -> Result<u64, AgentError>;

    async fn gas_price(&self) -> Result<u128, AgentError>;

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<B256, AgentError>;

    /// `None` while the transaction is not yet mined.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, AgentError>;
}

/// Poll for a receipt every `poll` until `timeout` elapses.
pub async fn wait_for_receipt(
    rpc: &dyn ChainRpc,
    tx_hash: B256,
    poll: Duration,
    timeout: Duration,
) -> Result<Receipt, AgentError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match rpc.receipt(tx_hash).await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {}
            Err(e) if e.is_retryable() => {
                tracing::debug!(tx = %tx_hash, error = %e, "receipt poll failed");
            }
            Err(e) => return Err(e),
        }
        if tokio::time::Instant::now() + poll > deadline {
            return Err(AgentError::Timeout(format!(
                "no receipt for {tx_hash} after {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(poll).await;
    }
}

#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, AgentError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AgentError::Network(format!("{method}: HTTP {status}")));
        }

        let mut envelope: Value = resp.json().await?;
        if let Some(err) = envelope.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(AgentError::Rpc { code, message });
        }

        match envelope.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(AgentError::Rpc {
                code: 0,
                message: format!("{method}: response has neither result nor error"),
            }),
        }
    }
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    async fn chain_id(&self) -> Result<u64, AgentError> {
        parse_u64(&self.request("eth_chainId", json!([])).await?)
    }

    async fn block_number(&self) -> Result<u64, AgentError> {
        parse_u64(&self.request("eth_blockNumber", json!([])).await?)
    }

    async fn balance(&self, who: Address) -> Result<U256, AgentError> {
        parse_u256(&self.request("eth_getBalance", json!([who, "latest"])).await?)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AgentError> {
        let result = self
            .request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        parse_bytes(&result)
    }

    async fn transaction_count(&self, who: Address) -> Result<u64, AgentError> {
        parse_u64(&self.request("eth_getTransactionCount", json!([who, "pending"])).await?)
    }

    async fn gas_price(&self) -> Result<u128, AgentError> {
        let price = parse_u256(&self.request("eth_gasPrice", json!([])).await?)?;
        u128::try_from(price).map_err(|_| AgentError::Rpc {
            code: 0,
            message: "gas price does not fit in 128 bits".into(),
        })
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<B256, AgentError> {
        let result = self
            .request("eth_sendRawTransaction", json!([tx.raw]))
            .await
            .map_err(into_rejection)?;
        parse_b256(&result)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, AgentError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(tx_hash, &result).map(Some)
    }
}

/// A node refusing a raw transaction is a chain rejection, unless the
/// error code says the node itself is struggling.
fn into_rejection(e: AgentError) -> AgentError {
    match e {
        AgentError::Rpc { code, message } if !matches!(code, -32603 | -32005) => {
            AgentError::ChainRejection {
                kind: RejectionKind::classify(&message),
                message,
            }
        }
        other => other,
    }
}

fn as_hex_str(v: &Value) -> Result<&str, AgentError> {
    v.as_str().ok_or_else(|| AgentError::Rpc {
        code: 0,
        message: format!("expected hex string, got {v}"),
    })
}

fn parse_u64(v: &Value) -> Result<u64, AgentError> {
    let s = as_hex_str(v)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| AgentError::Rpc {
        code: 0,
        message: format!("bad quantity {s:?}: {e}"),
    })
}

fn parse_u256(v: &Value) -> Result<U256, AgentError> {
    let s = as_hex_str(v)?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| AgentError::Rpc {
        code: 0,
        message: format!("bad quantity {s:?}: {e}"),
    })
}

fn parse_bytes(v: &Value) -> Result<Bytes, AgentError> {
    let s = as_hex_str(v)?;
    hex::decode(s.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| AgentError::Rpc {
            code: 0,
            message: format!("bad data {s:?}: {e}"),
        })
}

fn parse_b256(v: &Value) -> Result<B256, AgentError> {
    let s = as_hex_str(v)?;
    s.parse::<B256>().map_err(|e| AgentError::Rpc {
        code: 0,
        message: format!("bad hash {s:?}: {e}"),
    })
}

fn parse_receipt(tx_hash: B256, v: &Value) -> Result<Receipt, AgentError> {
    let status = match v.get("status") {
        Some(s) if parse_u64(s)? == 1 => TxStatus::Success,
        Some(_) => TxStatus::Failure,
        None => TxStatus::Success,
    };
    let block_number = match v.get("blockNumber") {
        Some(b) if !b.is_null() => Some(parse_u64(b)?),
        _ => None,
    };
    Ok(Receipt {
        tx_hash,
        status,
        block_number,
    })
}
