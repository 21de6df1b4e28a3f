//! End-to-end detection scenarios across detector, store, scheduler,
//! and composer.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use tokio::time::timeout;

use assetwatch::engine::composer::{
    forward_assets, forward_detection, StateComposer, MODULE_ASSETS, MODULE_DETECTION,
};
use assetwatch::engine::scheduler::DetectionScheduler;
use assetwatch::store::AssetStore;
use assetwatch::types::{Collectible, CollectibleKey};

use crate::mock_sources::{addr, api_item, Harness, BAYC, DAI, USDC};

// ---------------------------------------------------------------------------
// Literal reconciliation scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_tracked_pair_reported_in_other_casing_is_a_noop() {
    // tracked = {(0xAB…, 5)}, marketplace reports the same pair in
    // lowercase → no add (already tracked), no remove.
    let h = Harness::new();
    h.store.add_collectible(Collectible::sample(BAYC, 5)).await;
    h.marketplace
        .set_owned(vec![api_item(&BAYC.to_lowercase(), "5")]);

    let report = h.detector.run_cycle().await;

    assert_eq!(report.collectibles_added, 0);
    assert_eq!(report.collectibles_removed, 0);
    assert_eq!(h.store.snapshot().collectibles.len(), 1);
}

#[tokio::test]
async fn scenario_successful_empty_response_untracks() {
    // tracked = {(0xAB…, 5)}, marketplace successfully returns [] →
    // the pair is tombstoned.
    let h = Harness::new();
    h.store.add_collectible(Collectible::sample(BAYC, 5)).await;

    let report = h.detector.run_cycle().await;

    assert_eq!(report.collectibles_removed, 1);
    assert!(h.store.snapshot().collectibles.is_empty());
}

#[tokio::test]
async fn scenario_ignored_token_with_balance_is_not_added() {
    // candidates = {0xCD…}, ignore-tokens = {0xCD…}, balance = 100 →
    // no token added.
    let h = Harness::new();
    h.store.ignore_token(addr(DAI));
    h.balances.set_balance(DAI, 100);

    let report = h.detector.run_cycle().await;

    assert_eq!(report.tokens_added, 0);
    assert!(h.store.snapshot().tokens.is_empty());
}

// ---------------------------------------------------------------------------
// Failure-mode behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_failure_does_not_untrack_but_empty_does() {
    let h = Harness::new();
    h.store.add_collectible(Collectible::sample(BAYC, 5)).await;

    // Transient marketplace outage: nothing may be removed.
    h.marketplace.set_error("502 bad gateway");
    let report = h.detector.run_cycle().await;
    assert!(report.collectible_fetch_failed);
    assert_eq!(h.store.snapshot().collectibles.len(), 1);

    // Outage clears and the owner genuinely holds nothing: tombstone.
    h.marketplace.clear_error();
    let report = h.detector.run_cycle().await;
    assert_eq!(report.collectibles_removed, 1);
    assert!(h.store.snapshot().collectibles.is_empty());
}

#[tokio::test]
async fn balance_outage_only_silences_the_token_pass() {
    let h = Harness::new();
    h.balances.set_error("rpc timeout");
    h.marketplace.set_owned(vec![api_item(BAYC, "7")]);

    let report = h.detector.run_cycle().await;

    // Token pass degraded, collectible pass unaffected.
    assert!(report.token_fetch_failed);
    assert_eq!(report.collectibles_added, 1);
    assert!(h.store.snapshot().tokens.is_empty());
    assert_eq!(h.store.snapshot().collectibles.len(), 1);
}

#[tokio::test]
async fn zero_balance_after_discovery_keeps_token_tracked() {
    let h = Harness::new();
    h.balances.set_balance(DAI, 500);
    h.detector.run_cycle().await;
    assert_eq!(h.store.snapshot().tokens.len(), 1);

    h.balances.set_balance(DAI, 0);
    h.detector.run_cycle().await;

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.tokens.len(), 1, "zero balance must not untrack");
    assert_eq!(snapshot.tokens[0].balance, U256::ZERO);
}

// ---------------------------------------------------------------------------
// Idempotence & ignore lists over full cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_cycles_with_stable_world_are_idempotent() {
    let h = Harness::new();
    h.balances.set_balance(DAI, 42);
    h.balances.set_balance(USDC, 1);
    h.marketplace
        .set_owned(vec![api_item(BAYC, "1"), api_item(BAYC, "2")]);

    let first = h.detector.run_cycle().await;
    assert_eq!(first.tokens_added, 2);
    assert_eq!(first.collectibles_added, 2);

    for _ in 0..3 {
        let report = h.detector.run_cycle().await;
        assert_eq!(report.tokens_added, 0);
        assert_eq!(report.collectibles_added, 0);
        assert_eq!(report.collectibles_removed, 0);
    }

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.tokens.len(), 2);
    assert_eq!(snapshot.collectibles.len(), 2);
}

#[tokio::test]
async fn ignored_collectible_is_never_readded_after_dismissal() {
    let h = Harness::new();
    h.marketplace.set_owned(vec![api_item(BAYC, "5")]);

    // First cycle tracks it.
    h.detector.run_cycle().await;
    assert_eq!(h.store.snapshot().collectibles.len(), 1);

    // User dismisses it and removes it from tracking.
    let key = CollectibleKey::new(addr(BAYC), 5);
    h.store.ignore_collectible(key);
    h.store.remove_collectible(key).await;

    // Marketplace still reports ownership — detection must not re-add.
    let report = h.detector.run_cycle().await;
    assert_eq!(report.collectibles_added, 0);
    assert!(h.store.snapshot().collectibles.is_empty());
}

// ---------------------------------------------------------------------------
// Scheduler + composer wiring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn account_change_drives_cycle_and_composed_state() {
    let h = Harness::new();
    h.balances.set_balance(DAI, 7);
    h.marketplace.set_owned(vec![api_item(BAYC, "9")]);

    // Hand the harness's account sender to a scheduler so account
    // changes flow through it.
    let initial = *h.account_tx.subscribe().borrow();
    let (scheduler, handle) = DetectionScheduler::new(
        h.detector.clone(),
        Duration::from_secs(3600),
        h.account_tx,
    );

    let composer = Arc::new(StateComposer::new());
    tokio::spawn(forward_assets(composer.clone(), h.store.subscribe()));
    tokio::spawn(forward_detection(composer.clone(), scheduler.reports()));

    let mut merged_rx = composer.subscribe();
    let task = tokio::spawn(scheduler.run());

    handle.account_changed(initial).await;

    timeout(Duration::from_secs(2), async {
        loop {
            {
                let merged = merged_rx.borrow();
                let tokens = merged[MODULE_ASSETS]["tokens"].as_array().map(|a| a.len());
                let detection_done = !merged[MODULE_DETECTION].is_null();
                if tokens == Some(1) && detection_done {
                    break;
                }
            }
            merged_rx.changed().await.unwrap();
        }
    })
    .await
    .expect("composed state never converged");

    let merged = composer.merged();
    assert_eq!(merged[MODULE_ASSETS]["collectibles"].as_array().unwrap().len(), 1);
    assert_eq!(merged[MODULE_DETECTION]["tokens_added"], 1);

    handle.stop().await;
    task.await.unwrap();
}
