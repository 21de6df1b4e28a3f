//! External ownership sources.
//!
//! Defines the source traits and provides implementations for:
//! - RPC balance checker — one batched call for fungible-token balances
//! - Marketplace API — current collectible ownership for an owner
//!
//! Both are opaque collaborators: they may fail, they may be slow. The
//! reconciliation engine treats an `Err` from either as "no new data
//! this cycle" — never as "the owner holds nothing".

pub mod balances;
pub mod marketplace;

use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::BalanceMap;

/// Batched balance queries for fungible-token candidates.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch balances for every candidate contract in one batched call.
    ///
    /// Partial per-address failures must not discard the rest of the
    /// batch; affected addresses are simply absent from the result.
    /// A transport/timeout failure is an `Err`.
    async fn fetch_balances(&self, owner: Address, candidates: &[Address]) -> Result<BalanceMap>;
}

/// Marketplace view of which collectibles an owner currently holds.
#[async_trait]
pub trait CollectibleSource: Send + Sync {
    /// Fetch the marketplace's current owned list for `owner`.
    ///
    /// Returns raw API items; address/id normalization happens in the
    /// engine so a single malformed item can be dropped in isolation.
    /// A transport/timeout failure is an `Err` — callers must be able
    /// to distinguish it from a successful empty response.
    async fn fetch_owned(&self, owner: Address) -> Result<Vec<ApiCollectible>>;
}

/// One collectible as reported by the marketplace API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollectible {
    /// Token id as a string — decimal or 0x-hex, validated downstream.
    pub token_id: String,
    pub contract_address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
}
