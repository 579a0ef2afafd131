//! ARBITER: Collectible Card Arbitrage Valuation Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod retry;
pub mod lookup;
pub mod vision;
pub mod extract;
pub mod engine;
pub mod storage;
