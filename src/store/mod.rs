//! Asset store.
//!
//! Canonical owner of Token / Collectible / ignore-list records. The
//! reconciliation engine only ever sees a snapshot plus the mutator
//! capability below — it never touches store internals, so concurrent
//! user actions can't produce torn reads.
//!
//! Every mutation republishes a full snapshot on the change stream;
//! subscribers always observe a complete, consistent state.

use alloy_primitives::Address;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::types::{AssetState, Collectible, CollectibleKey, Token};

/// Mutator + snapshot surface of the asset store.
///
/// Additions are batch/atomic from the caller's point of view: one call,
/// one change event. Ignore lists are append-only and populated by
/// explicit user action — detection consults them but never writes them.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Read a consistent snapshot of the full state.
    fn snapshot(&self) -> AssetState;

    /// Upsert a batch of tokens in one atomic step. Existing entries
    /// (same address) only have their balance and error flag refreshed;
    /// symbol and decimals are immutable once created.
    async fn add_tokens(&self, tokens: Vec<Token>);

    /// Track a collectible. Adding an already-tracked key is a no-op.
    async fn add_collectible(&self, collectible: Collectible);

    /// Untrack a collectible. Removing an unknown key is a no-op.
    async fn remove_collectible(&self, key: CollectibleKey);

    /// User action: dismiss a token contract.
    fn ignore_token(&self, address: Address);

    /// User action: dismiss a collectible.
    fn ignore_collectible(&self, key: CollectibleKey);

    /// Subscribe to the change stream. The receiver always holds the
    /// latest full snapshot.
    fn subscribe(&self) -> watch::Receiver<AssetState>;
}

/// In-memory asset store. Persistence, if any, belongs to a surrounding
/// generic store and is out of scope here.
pub struct MemoryStore {
    state: Mutex<AssetState>,
    changes: watch::Sender<AssetState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_state(AssetState::default())
    }

    pub fn with_state(initial: AssetState) -> Self {
        let (changes, _) = watch::channel(initial.clone());
        Self {
            state: Mutex::new(initial),
            changes,
        }
    }

    /// Run `mutate` under the lock, then publish the resulting snapshot.
    fn apply<F: FnOnce(&mut AssetState)>(&self, mutate: F) {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            mutate(&mut state);
            state.clone()
        };
        self.changes.send_replace(snapshot);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    fn snapshot(&self) -> AssetState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn add_tokens(&self, tokens: Vec<Token>) {
        if tokens.is_empty() {
            return;
        }
        let count = tokens.len();
        self.apply(|state| {
            for token in tokens {
                match state.tokens.iter_mut().find(|t| t.address == token.address) {
                    Some(existing) => {
                        existing.balance = token.balance;
                        existing.balance_error = token.balance_error;
                    }
                    None => state.tokens.push(token),
                }
            }
        });
        debug!(count, "Token batch applied");
    }

    async fn add_collectible(&self, collectible: Collectible) {
        self.apply(|state| {
            let key = collectible.key();
            if !state.collectibles.iter().any(|c| c.key() == key) {
                debug!(collectible = %collectible, "Collectible tracked");
                state.collectibles.push(collectible);
            }
        });
    }

    async fn remove_collectible(&self, key: CollectibleKey) {
        self.apply(|state| {
            let before = state.collectibles.len();
            state.collectibles.retain(|c| c.key() != key);
            if state.collectibles.len() < before {
                debug!(key = %key, "Collectible untracked");
            }
        });
    }

    fn ignore_token(&self, address: Address) {
        self.apply(|state| {
            state.ignored_tokens.insert(address);
        });
    }

    fn ignore_collectible(&self, key: CollectibleKey) {
        self.apply(|state| {
            state.ignored_collectibles.insert(key);
        });
    }

    fn subscribe(&self) -> watch::Receiver<AssetState> {
        self.changes.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
