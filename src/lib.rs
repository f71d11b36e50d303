// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! plumise-agent-kernel: the deterministic, network-free core of a Plumise compute agent.
//!
//! Everything in here is pure or guarded by short in-process locks, so it is
//! safe to call from the inference path. Network I/O lives in `plumise-agent-node`.

pub mod config;
pub mod error;
pub mod metrics;
pub mod keys;
pub mod proof;
pub mod report;
pub mod abi;
pub mod tx;
pub mod reward;
pub mod registration;

#[cfg(test)]
pub mod tests;
