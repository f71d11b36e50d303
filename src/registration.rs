// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! On-chain registration state machine.
//!
//! ```text
//! Unregistered --Submitted--> Registering --Confirmed--> Registered
//!      |                       |    ^
//!      |                       +----+ Rejected { retries_remain: true }
//!      |                       |
//!      |                       +--Rejected { retries_remain: false }--> Failed
//!      +--FoundOnChain--> Registered
//! ```
//!
//! `SignerFault` moves any non-terminal state to `Failed`: without a working
//! key nothing further can be signed.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    Submitted,
    Confirmed,
    Rejected { retries_remain: bool },
    FoundOnChain,
    SignerFault,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registering => "registering",
            RegistrationState::Registered => "registered",
            RegistrationState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationState::Registered | RegistrationState::Failed)
    }

    pub fn transition(self, event: RegistrationEvent) -> KernelResult<RegistrationState> {
        use RegistrationEvent as Ev;
        use RegistrationState as St;

        match (self, event) {
            (St::Unregistered, Ev::Submitted) => Ok(St::Registering),
            (St::Unregistered, Ev::FoundOnChain) => Ok(St::Registered),
            (St::Registering, Ev::Submitted) => Ok(St::Registering),
            (St::Registering, Ev::FoundOnChain) => Ok(St::Registered),
            (St::Registering, Ev::Confirmed) => Ok(St::Registered),
            (St::Registering, Ev::Rejected { retries_remain: true }) => Ok(St::Registering),
            (St::Registering, Ev::Rejected { retries_remain: false }) => Ok(St::Failed),
            (St::Unregistered | St::Registering, Ev::SignerFault) => Ok(St::Failed),
            (from, ev) => Err(KernelError::InvalidTransition {
                from: from.as_str(),
                event: ev.as_str(),
            }),
        }
    }
}

impl RegistrationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationEvent::Submitted => "submitted",
            RegistrationEvent::Confirmed => "confirmed",
            RegistrationEvent::Rejected { .. } => "rejected",
            RegistrationEvent::FoundOnChain => "found_on_chain",
            RegistrationEvent::SignerFault => "signer_fault",
        }
    }
}
