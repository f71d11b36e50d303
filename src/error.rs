// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Caller handed in a value the operation refuses (negative latency, bad length...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Key material could not be loaded or a signature could not be produced.
    #[error("Signature error: {0}")]
    Signature(String),
    /// Canonical encoding failed.
    #[error("Encoding error: {0}")]
    Encoding(String),
    /// A state machine was asked to take a transition it does not allow.
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: &'static str, event: &'static str },
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
