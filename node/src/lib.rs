// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod network;
pub mod nonce;
pub mod identity;
pub mod agent;
pub mod reporter;
pub mod rewards;
pub mod proof_submitter;
pub mod supervisor;
pub mod runtime;
pub mod api;
pub mod server;
