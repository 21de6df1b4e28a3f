//! ASSETWATCH — on-chain asset detection & reconciliation engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod engine;
pub mod registry;
pub mod sources;
pub mod store;
pub mod types;
