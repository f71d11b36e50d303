// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod metrics_tests;
pub mod proof_tests;
pub mod registration_tests;

/// Well-known development key (first Hardhat/Anvil account).
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
