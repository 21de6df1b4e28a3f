//! Reconciliation engine.
//!
//! One detection cycle diffs the externally reported ownership picture
//! against the asset store's tracked state, respecting user ignore
//! lists, and emits minimal add/remove operations:
//!
//! - **Token pass** — additions only. A balance reading zero never
//!   untracks a token (a momentary zero from a fetch glitch must not
//!   cause flapping). Tracked tokens get their balance and error flag
//!   refreshed from the same batched call.
//! - **Collectible pass** — additions plus tombstone removals. The
//!   removal-candidate set is snapshotted before the fetch, and is only
//!   flushed after a *successful* fetch: a failed fetch must never be
//!   confused with "owns nothing".
//!
//! Each cycle captures an immutable account snapshot at start and
//! re-checks it against the live value before every mutation step,
//! discarding results that landed after an account switch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::registry::ContractRegistry;
use crate::sources::{BalanceSource, CollectibleSource};
use crate::store::AssetStore;
use crate::types::{
    parse_address, parse_token_id, AccountSnapshot, ChainId, Collectible, CollectibleKey,
    CycleReport, SkipReason, Token,
};

// ---------------------------------------------------------------------------
// Pass outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TokenPassOutcome {
    added: usize,
    fetch_failed: bool,
    stale: bool,
}

#[derive(Debug, Default)]
struct CollectiblePassOutcome {
    added: usize,
    removed: usize,
    dropped: usize,
    fetch_failed: bool,
    stale: bool,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// The asset detection & reconciliation engine.
///
/// Holds read access to the account watch, the injected registry and
/// sources, and the asset store's mutator capability. One `run_cycle`
/// executes the token pass and the collectible pass concurrently; both
/// complete before the call returns.
pub struct Detector {
    registry: Arc<ContractRegistry>,
    balances: Arc<dyn BalanceSource>,
    marketplace: Arc<dyn CollectibleSource>,
    store: Arc<dyn AssetStore>,
    account: watch::Receiver<AccountSnapshot>,
    enabled: AtomicBool,
}

impl Detector {
    pub fn new(
        registry: Arc<ContractRegistry>,
        balances: Arc<dyn BalanceSource>,
        marketplace: Arc<dyn CollectibleSource>,
        store: Arc<dyn AssetStore>,
        account: watch::Receiver<AccountSnapshot>,
    ) -> Self {
        Self {
            registry,
            balances,
            marketplace,
            store,
            account,
            enabled: AtomicBool::new(true),
        }
    }

    /// Administratively enable/disable detection. A disabled engine
    /// turns every cycle into a no-op, not an error.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Run one full detection cycle.
    ///
    /// The three gates (supported chain, enabled, active address) are
    /// evaluated once here; if any fails the cycle is a no-op. Failures
    /// inside a pass degrade locally — nothing in a cycle is fatal, and
    /// the report is informational only.
    pub async fn run_cycle(&self) -> CycleReport {
        let snapshot = *self.account.borrow();

        if snapshot.chain != ChainId::MAINNET {
            debug!(chain = %snapshot.chain, "Skipping cycle: unsupported chain");
            return CycleReport::skipped(snapshot, SkipReason::UnsupportedChain);
        }
        if !self.is_enabled() {
            debug!("Skipping cycle: detection disabled");
            return CycleReport::skipped(snapshot, SkipReason::Disabled);
        }
        let Some(owner) = snapshot.address else {
            debug!("Skipping cycle: no active account");
            return CycleReport::skipped(snapshot, SkipReason::NoAccount);
        };

        info!(account = %snapshot, "Starting detection cycle");

        let (tokens, collectibles) = tokio::join!(
            self.token_pass(owner, snapshot),
            self.collectible_pass(owner, snapshot),
        );

        let mut report = CycleReport::new(snapshot);
        report.tokens_added = tokens.added;
        report.token_fetch_failed = tokens.fetch_failed;
        report.collectibles_added = collectibles.added;
        report.collectibles_removed = collectibles.removed;
        report.items_dropped = collectibles.dropped;
        report.collectible_fetch_failed = collectibles.fetch_failed;
        report.stale_discarded = tokens.stale || collectibles.stale;
        report
    }

    /// Results must only land for the account the cycle started with.
    fn is_stale(&self, snapshot: AccountSnapshot) -> bool {
        *self.account.borrow() != snapshot
    }

    // -- Token pass --------------------------------------------------------

    /// Discover new nonzero-balance tokens and refresh tracked balances,
    /// all from one batched call. Never removes anything.
    async fn token_pass(&self, owner: Address, snapshot: AccountSnapshot) -> TokenPassOutcome {
        let state = self.store.snapshot();
        let tracked = state.tracked_token_addresses();
        let candidates = self.registry.candidate_fungible_tokens(&tracked);

        // One batch covers discovery candidates and tracked refreshes.
        let mut query = candidates.clone();
        query.extend(tracked.iter().copied());

        let balances = match self.balances.fetch_balances(owner, &query).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Balance fetch failed, no token data this cycle");
                return TokenPassOutcome {
                    fetch_failed: true,
                    ..TokenPassOutcome::default()
                };
            }
        };

        let mut staged = Vec::new();
        let mut newly_discovered = 0usize;

        for address in candidates {
            // Per-address failures are isolated: a missing entry just
            // means no discovery for that contract this cycle.
            let Some(balance) = balances.get(&address) else {
                continue;
            };
            if balance.is_zero() {
                continue;
            }
            if state.is_token_ignored(&address) {
                debug!(address = %address.to_checksum(None), "Ignored token skipped");
                continue;
            }
            let Some(meta) = self.registry.lookup(&address) else {
                continue;
            };
            staged.push(Token {
                address,
                symbol: meta.symbol.clone(),
                decimals: meta.decimals,
                balance: *balance,
                balance_error: false,
            });
            newly_discovered += 1;
        }

        // Refresh tracked tokens from the same response. A zero balance
        // only updates the record; removal is never automatic.
        for token in &state.tokens {
            let refreshed = match balances.get(&token.address) {
                Some(balance) => Token {
                    balance: *balance,
                    balance_error: false,
                    ..token.clone()
                },
                None => Token {
                    balance_error: true,
                    ..token.clone()
                },
            };
            staged.push(refreshed);
        }

        if self.is_stale(snapshot) {
            warn!(account = %snapshot, "Account changed mid-cycle, discarding token results");
            return TokenPassOutcome {
                stale: true,
                ..TokenPassOutcome::default()
            };
        }

        if !staged.is_empty() {
            self.store.add_tokens(staged).await;
        }

        if newly_discovered > 0 {
            info!(count = newly_discovered, "New tokens detected");
        }

        TokenPassOutcome {
            added: newly_discovered,
            ..TokenPassOutcome::default()
        }
    }

    // -- Collectible pass ---------------------------------------------------

    /// Reconcile tracked collectibles against the marketplace's owned
    /// list: add unreported-but-owned, tombstone tracked-but-unreported.
    async fn collectible_pass(
        &self,
        owner: Address,
        snapshot: AccountSnapshot,
    ) -> CollectiblePassOutcome {
        let state = self.store.snapshot();
        let tracked = state.tracked_collectible_keys();

        // Removal candidates, snapshotted before the fetch. Ignored keys
        // and manual user adds are off the table from the start: detection
        // may neither delete a dismissed item nor undo a manual add.
        let mut removal_candidates: HashSet<CollectibleKey> = state
            .collectibles
            .iter()
            .filter(|c| c.detected && !state.is_collectible_ignored(&c.key()))
            .map(|c| c.key())
            .collect();

        let reported = match self.marketplace.fetch_owned(owner).await {
            Ok(items) => items,
            Err(e) => {
                // A failed fetch is not "owns nothing" — leaving the
                // removal candidates unflushed is the whole point.
                warn!(error = %e, "Ownership fetch failed, no collectible data this cycle");
                return CollectiblePassOutcome {
                    fetch_failed: true,
                    ..CollectiblePassOutcome::default()
                };
            }
        };

        let mut additions: HashMap<CollectibleKey, Collectible> = HashMap::new();
        let mut dropped = 0usize;

        for item in reported {
            let address = match parse_address(&item.contract_address) {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed collectible entry");
                    dropped += 1;
                    continue;
                }
            };
            let token_id = match parse_token_id(&item.token_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed collectible entry");
                    dropped += 1;
                    continue;
                }
            };

            let key = CollectibleKey::new(address, token_id);
            if state.is_collectible_ignored(&key) {
                debug!(key = %key, "Ignored collectible skipped");
                continue;
            }

            removal_candidates.remove(&key);

            if !tracked.contains(&key) {
                additions.entry(key).or_insert(Collectible {
                    address,
                    token_id,
                    name: item.name,
                    description: item.description,
                    image_url: item.image_url,
                    detected: true,
                });
            }
        }

        if self.is_stale(snapshot) {
            warn!(account = %snapshot, "Account changed mid-cycle, discarding collectible results");
            return CollectiblePassOutcome {
                dropped,
                stale: true,
                ..CollectiblePassOutcome::default()
            };
        }

        // Additions are order-independent (identity is the key pair) and
        // run concurrently. The tombstone step is a barrier: it must not
        // start until every addition has landed, or an item could be
        // removed and re-added within one cycle.
        let added = additions.len();
        join_all(
            additions
                .into_values()
                .map(|collectible| self.store.add_collectible(collectible)),
        )
        .await;

        let removed = removal_candidates.len();
        for key in removal_candidates {
            self.store.remove_collectible(key).await;
        }

        if added > 0 || removed > 0 {
            info!(added, removed, "Collectibles reconciled");
        }

        CollectiblePassOutcome {
            added,
            removed,
            dropped,
            ..CollectiblePassOutcome::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
