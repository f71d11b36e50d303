// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use plumise_agent_kernel::error::KernelError;
use plumise_agent_kernel::tx::Receipt;
use serde_json::json;
use thiserror::Error;

/// Why the chain refused a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Nonce too low / too high / already used. Resync and retry once.
    BadNonce,
    InsufficientFunds,
    NotRegistered,
    /// Mined with status 0.
    Reverted,
    Other,
}

impl RejectionKind {
    /// Classify a node's error message.
    pub fn classify(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        if m.contains("nonce too low")
            || m.contains("nonce too high")
            || m.contains("invalid nonce")
            || m.contains("already known")
            || m.contains("replacement transaction underpriced")
        {
            RejectionKind::BadNonce
        } else if m.contains("insufficient funds") {
            RejectionKind::InsufficientFunds
        } else if m.contains("not registered") {
            RejectionKind::NotRegistered
        } else if m.contains("revert") {
            RejectionKind::Reverted
        } else {
            RejectionKind::Other
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Chain rejected transaction ({kind:?}): {message}")]
    ChainRejection { kind: RejectionKind, message: String },
    #[error("Oracle returned {status}: {message}")]
    Oracle { status: u16, message: String },
    #[error("Signature error: {0}")]
    Signature(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Agent is not registered")]
    NotRegistered,
    #[error("Registration failed; on-chain lifecycle disabled")]
    RegistrationFailed,
    #[error("Cancelled by shutdown")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Transient failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Network(_) | AgentError::Timeout(_) => true,
            AgentError::Oracle { status, .. } => *status >= 500 || *status == 429,
            AgentError::Rpc { code, .. } => *code == -32603 || *code == -32005,
            _ => false,
        }
    }

    /// Failures the lifecycle cannot recover from without operator action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Signature(_) | AgentError::Config(_) | AgentError::RegistrationFailed
        )
    }

    pub fn is_bad_nonce(&self) -> bool {
        matches!(
            self,
            AgentError::ChainRejection { kind: RejectionKind::BadNonce, .. }
        )
    }
}

impl From<KernelError> for AgentError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Signature(msg) => AgentError::Signature(msg),
            KernelError::InvalidInput(msg) => AgentError::InvalidInput(msg),
            other => AgentError::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AgentError::Timeout(e.to_string())
        } else {
            AgentError::Network(e.to_string())
        }
    }
}

/// Outcome of submitting a transaction and waiting for its receipt.
#[derive(Debug)]
pub enum TxOutcome {
    Confirmed(Receipt),
    /// Network trouble or a timeout; try again next cycle.
    Retryable(AgentError),
    /// Explicit rejection or a broken signer; do not loop on it.
    Fatal(AgentError),
}

impl TxOutcome {
    pub fn from_error(e: AgentError) -> Self {
        if e.is_retryable() {
            TxOutcome::Retryable(e)
        } else {
            TxOutcome::Fatal(e)
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed(_))
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AgentError::NotRegistered => StatusCode::CONFLICT,
            AgentError::Network(_) | AgentError::Timeout(_) | AgentError::Oracle { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
