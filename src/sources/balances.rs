//! Batched fungible-token balance fetcher.
//!
//! One `eth_call` against a single-call balance-checker contract
//! answers every candidate in a detection cycle. Calldata is assembled
//! by hand (selector + ABI-encoded address arrays) and the response is
//! decoded positionally: one 32-byte word per candidate.
//!
//! A malformed word only loses that one address; a transport or RPC
//! failure is an `Err` which the engine degrades to "no new data this
//! cycle" — never to "zero balance for all candidates".

use alloy_primitives::{hex, keccak256, Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::BalanceSource;
use crate::types::BalanceMap;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Upper bound on the batched balance call.
const BALANCE_TIMEOUT_SECS: u64 = 10;

/// Solidity signature of the balance-checker entry point.
const BALANCES_SIGNATURE: &str = "balances(address[],address[])";

// ---------------------------------------------------------------------------
// JSON-RPC response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Balance source backed by a JSON-RPC node and a deployed
/// single-call balance-checker contract.
pub struct RpcBalanceClient {
    http: Client,
    rpc_url: String,
    /// Address of the balance-checker contract.
    checker: Address,
}

impl RpcBalanceClient {
    pub fn new(rpc_url: String, checker: Address) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(BALANCE_TIMEOUT_SECS))
            .user_agent("ASSETWATCH/0.1.0 (asset-detection-engine)")
            .build()
            .context("Failed to build HTTP client for balance RPC")?;

        Ok(Self {
            http,
            rpc_url,
            checker,
        })
    }

    /// 4-byte selector for `balances(address[],address[])`.
    fn selector() -> [u8; 4] {
        let hash = keccak256(BALANCES_SIGNATURE.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// ABI-encode `balances([owner], candidates)`.
    ///
    /// Layout: selector, two offset words, then each address array as a
    /// length word followed by left-padded 32-byte elements.
    fn encode_call(owner: Address, candidates: &[Address]) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32 * (4 + candidates.len()));
        data.extend_from_slice(&Self::selector());

        let word = |v: u64| U256::from(v).to_be_bytes::<32>();
        let addr_word = |a: &Address| {
            let mut w = [0u8; 32];
            w[12..].copy_from_slice(a.as_slice());
            w
        };

        // Head: offsets of the two dynamic arrays, relative to the start
        // of the argument block.
        let users_offset = 64u64;
        let tokens_offset = users_offset + 32 * 2; // len word + one owner word
        data.extend_from_slice(&word(users_offset));
        data.extend_from_slice(&word(tokens_offset));

        // users = [owner]
        data.extend_from_slice(&word(1));
        data.extend_from_slice(&addr_word(&owner));

        // tokens = candidates
        data.extend_from_slice(&word(candidates.len() as u64));
        for candidate in candidates {
            data.extend_from_slice(&addr_word(candidate));
        }

        data
    }

    /// Decode the returned `uint256[]` positionally against `candidates`.
    ///
    /// Tolerates a short or partially malformed response: affected
    /// addresses are skipped with a warning, the rest of the batch
    /// survives.
    fn decode_balances(candidates: &[Address], return_data: &[u8]) -> BalanceMap {
        let mut balances = BalanceMap::with_capacity(candidates.len());

        // offset word + length word precede the elements
        if return_data.len() < 64 {
            warn!(
                len = return_data.len(),
                "Balance response too short, no balances decoded"
            );
            return balances;
        }

        let reported_len = U256::from_be_slice(&return_data[32..64]);
        let reported_len = usize::try_from(reported_len).unwrap_or(0);
        let elements = &return_data[64..];

        for (i, candidate) in candidates.iter().enumerate() {
            if i >= reported_len {
                warn!(
                    address = %candidate.to_checksum(None),
                    "Balance missing from batch response, skipping"
                );
                continue;
            }
            let start = i * 32;
            let end = start + 32;
            if end > elements.len() {
                warn!(
                    address = %candidate.to_checksum(None),
                    "Truncated balance word, skipping"
                );
                continue;
            }
            balances.insert(*candidate, U256::from_be_slice(&elements[start..end]));
        }

        balances
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceClient {
    async fn fetch_balances(&self, owner: Address, candidates: &[Address]) -> Result<BalanceMap> {
        if candidates.is_empty() {
            return Ok(BalanceMap::new());
        }

        let calldata = Self::encode_call(owner, candidates);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {
                    "to": self.checker.to_checksum(None),
                    "data": format!("0x{}", hex::encode(&calldata)),
                },
                "latest",
            ],
        });

        debug!(
            candidates = candidates.len(),
            owner = %owner.to_checksum(None),
            "Fetching batched balances"
        );

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("Balance RPC request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Balance RPC error {status}: {text}");
        }

        let rpc: RpcResponse = resp
            .json()
            .await
            .context("Failed to parse balance RPC response")?;

        if let Some(err) = rpc.error {
            anyhow::bail!("Balance call reverted ({}): {}", err.code, err.message);
        }

        let result = rpc
            .result
            .context("Balance RPC response missing result field")?;
        let return_data = hex::decode(result.trim_start_matches("0x"))
            .context("Balance RPC result is not valid hex")?;

        Ok(Self::decode_balances(candidates, &return_data))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
