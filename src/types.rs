//! Shared types for the ASSETWATCH engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that source, store, and engine
//! modules can depend on them without circular references.
//!
//! All address identity flows through [`parse_address`] and all token
//! ids through [`parse_token_id`] — the two central normalizers that
//! make mixed-case / mixed-radix inputs collapse to one identity before
//! any set operation.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Detection-input errors. These are never fatal — a malformed item is
/// dropped from the cycle's results and the pass continues.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("invalid contract address: {0:?}")]
    BadAddress(String),

    #[error("invalid token id: {0:?}")]
    BadTokenId(String),
}

// ---------------------------------------------------------------------------
// Normalizers
// ---------------------------------------------------------------------------

/// Parse an address from any casing into its canonical 20-byte form.
///
/// Accepts with or without a `0x` prefix. Since identity lives in the
/// raw bytes, two casings of the same address compare equal everywhere
/// downstream; display uses the EIP-55 checksum form.
pub fn parse_address(input: &str) -> Result<Address, AssetError> {
    input
        .trim()
        .parse::<Address>()
        .map_err(|_| AssetError::BadAddress(input.to_string()))
}

/// Parse a token id from a decimal or `0x`-hex string.
///
/// Non-numeric or overflowing ids are detection-input errors; callers
/// drop the offending item rather than aborting the pass.
pub fn parse_token_id(input: &str) -> Result<u64, AssetError> {
    let s = input.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| AssetError::BadTokenId(input.to_string()))
}

// ---------------------------------------------------------------------------
// Chain / account
// ---------------------------------------------------------------------------

/// EVM chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Ethereum mainnet — the only chain asset detection runs against.
    pub const MAINNET: ChainId = ChainId(1);
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// Immutable capture of the active account at the start of a detection
/// cycle. Result application re-checks this against the live value and
/// discards on mismatch, so a stale in-flight cycle never mutates state
/// for the wrong owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Active owner address, if any account is selected.
    pub address: Option<Address>,
    pub chain: ChainId,
}

impl Default for AccountSnapshot {
    fn default() -> Self {
        Self {
            address: None,
            chain: ChainId::MAINNET,
        }
    }
}

impl fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(addr) => write!(f, "{} @ {}", addr.to_checksum(None), self.chain),
            None => write!(f, "<no account> @ {}", self.chain),
        }
    }
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// A tracked fungible (ERC-20-style) token. Identity is the contract
/// address; the engine only ever refreshes `balance` / `balance_error`
/// on an existing entry, never removes one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    /// Raw on-chain balance (smallest unit).
    pub balance: U256,
    /// Set when the last balance read for this token failed.
    #[serde(default)]
    pub balance_error: bool,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} decimals, balance {})",
            self.symbol,
            self.address.to_checksum(None),
            self.decimals,
            self.balance,
        )
    }
}

/// Identity of a collectible: the (contract, token id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectibleKey {
    pub address: Address,
    pub token_id: u64,
}

impl CollectibleKey {
    pub fn new(address: Address, token_id: u64) -> Self {
        Self { address, token_id }
    }
}

impl fmt::Display for CollectibleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address.to_checksum(None), self.token_id)
    }
}

/// A tracked non-fungible (ERC-721-style) collectible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collectible {
    pub address: Address,
    pub token_id: u64,
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// True when this record was created by detection (as opposed to a
    /// manual user add).
    pub detected: bool,
}

impl Collectible {
    pub fn key(&self) -> CollectibleKey {
        CollectibleKey::new(self.address, self.token_id)
    }
}

impl fmt::Display for Collectible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key())
    }
}

/// Transient per-cycle mapping contract → balance. Never persisted.
pub type BalanceMap = HashMap<Address, U256>;

// ---------------------------------------------------------------------------
// Store snapshot
// ---------------------------------------------------------------------------

/// Full snapshot of the asset store, as published on its change stream.
///
/// The engine holds one of these per cycle (plus the store's mutator
/// capability) and never reaches into store internals, so a concurrent
/// user action can never produce a torn read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetState {
    pub tokens: Vec<Token>,
    pub collectibles: Vec<Collectible>,
    /// User-dismissed token contracts. Append-only, consulted but never
    /// mutated by detection.
    pub ignored_tokens: HashSet<Address>,
    /// User-dismissed collectible pairs. Append-only likewise.
    pub ignored_collectibles: HashSet<CollectibleKey>,
}

impl AssetState {
    /// Addresses of all currently tracked tokens, as a normalized set.
    pub fn tracked_token_addresses(&self) -> HashSet<Address> {
        self.tokens.iter().map(|t| t.address).collect()
    }

    /// Keys of all currently tracked collectibles.
    pub fn tracked_collectible_keys(&self) -> HashSet<CollectibleKey> {
        self.collectibles.iter().map(|c| c.key()).collect()
    }

    pub fn is_token_ignored(&self, address: &Address) -> bool {
        self.ignored_tokens.contains(address)
    }

    pub fn is_collectible_ignored(&self, key: &CollectibleKey) -> bool {
        self.ignored_collectibles.contains(key)
    }
}

// ---------------------------------------------------------------------------
// Cycle reporting
// ---------------------------------------------------------------------------

/// Why a detection cycle was skipped. A skip is a deliberate no-op,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Active chain does not support asset detection.
    UnsupportedChain,
    /// Detection administratively disabled.
    Disabled,
    /// No active owner address selected.
    NoAccount,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedChain => write!(f, "unsupported chain"),
            SkipReason::Disabled => write!(f, "detection disabled"),
            SkipReason::NoAccount => write!(f, "no active account"),
        }
    }
}

/// Summary of one detection cycle (token pass + collectible pass),
/// logged by the scheduler after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub account: AccountSnapshot,
    pub skipped: Option<SkipReason>,
    pub tokens_added: usize,
    pub collectibles_added: usize,
    pub collectibles_removed: usize,
    /// Malformed items dropped during normalization.
    pub items_dropped: usize,
    pub token_fetch_failed: bool,
    pub collectible_fetch_failed: bool,
    /// True when results were discarded because the active account
    /// changed while the cycle was in flight.
    pub stale_discarded: bool,
}

impl CycleReport {
    pub fn new(account: AccountSnapshot) -> Self {
        Self {
            started_at: Utc::now(),
            account,
            skipped: None,
            tokens_added: 0,
            collectibles_added: 0,
            collectibles_removed: 0,
            items_dropped: 0,
            token_fetch_failed: false,
            collectible_fetch_failed: false,
            stale_discarded: false,
        }
    }

    pub fn skipped(account: AccountSnapshot, reason: SkipReason) -> Self {
        let mut report = Self::new(account);
        report.skipped = Some(reason);
        report
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

impl Token {
    /// Build a token with sensible defaults; used by tests and mocks.
    pub fn sample(address: &str, symbol: &str) -> Self {
        Token {
            address: address.trim().parse().unwrap_or(Address::ZERO),
            symbol: symbol.to_string(),
            decimals: 18,
            balance: U256::from(1u64),
            balance_error: false,
        }
    }
}

impl Collectible {
    /// Build a collectible with sensible defaults; used by tests and mocks.
    pub fn sample(address: &str, token_id: u64) -> Self {
        Collectible {
            address: address.trim().parse().unwrap_or(Address::ZERO),
            token_id,
            name: format!("Sample #{token_id}"),
            description: String::new(),
            image_url: String::new(),
            detected: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
