//! Detection scheduler.
//!
//! Drives detection cycles on a configurable interval and reacts to
//! upstream events: an account change cancels the pending timer, runs
//! one out-of-band cycle immediately, and rearms. Interval changes take
//! effect at the next arm, never retroactively on an armed timer.
//!
//! The loop is sequential, so exactly one cycle is ever in flight; the
//! timer rearms after every cycle regardless of how the cycle went, and
//! no cycle error is surfaced to command senders.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::reconcile::Detector;
use crate::types::{AccountSnapshot, CycleReport};

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Upstream announced a new active account/chain.
    AccountChanged(AccountSnapshot),
    /// Change the detection interval, effective at the next arm.
    SetInterval(Duration),
    /// Administratively enable/disable the engine.
    SetEnabled(bool),
    /// Shut the scheduler down.
    Stop,
}

/// Clonable handle for feeding commands to the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub async fn account_changed(&self, snapshot: AccountSnapshot) {
        let _ = self
            .tx
            .send(SchedulerCommand::AccountChanged(snapshot))
            .await;
    }

    pub async fn set_interval(&self, interval: Duration) {
        let _ = self.tx.send(SchedulerCommand::SetInterval(interval)).await;
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(SchedulerCommand::SetEnabled(enabled)).await;
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(SchedulerCommand::Stop).await;
    }
}

/// Interval-driven cycle runner.
pub struct DetectionScheduler {
    detector: Arc<Detector>,
    interval: Duration,
    commands: mpsc::Receiver<SchedulerCommand>,
    /// Publishes account changes to the detector's account watch.
    account_tx: watch::Sender<AccountSnapshot>,
    /// Last cycle report, for observers (state composer, logs, tests).
    reports: watch::Sender<Option<CycleReport>>,
}

impl DetectionScheduler {
    pub fn new(
        detector: Arc<Detector>,
        interval: Duration,
        account_tx: watch::Sender<AccountSnapshot>,
    ) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::channel(16);
        let (reports, _) = watch::channel(None);
        (
            Self {
                detector,
                interval,
                commands,
                account_tx,
                reports,
            },
            SchedulerHandle { tx },
        )
    }

    /// Subscribe to per-cycle reports.
    pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    /// Run until `Stop` is received or every handle is dropped.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs_f64(), "Detection scheduler running");

        loop {
            // Arm the timer with the currently configured interval. The
            // armed timer is only cancelled by an account change; other
            // commands are handled without disturbing it.
            let sleep = tokio::time::sleep(self.interval);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = self.commands.recv() => match cmd {
                        Some(SchedulerCommand::AccountChanged(snapshot)) => {
                            info!(account = %snapshot, "Account changed, running out-of-band cycle");
                            self.account_tx.send_replace(snapshot);
                            break;
                        }
                        Some(SchedulerCommand::SetInterval(interval)) => {
                            info!(
                                interval_secs = interval.as_secs_f64(),
                                "Detection interval updated, effective at next arm"
                            );
                            self.interval = interval;
                        }
                        Some(SchedulerCommand::SetEnabled(enabled)) => {
                            info!(enabled, "Detection toggled");
                            self.detector.set_enabled(enabled);
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Detection scheduler stopping");
                            return;
                        }
                    }
                }
            }

            let report = self.detector.run_cycle().await;
            log_report(&report);
            self.reports.send_replace(Some(report));
        }
    }
}

/// Log a human-readable cycle summary.
fn log_report(report: &CycleReport) {
    match report.skipped {
        Some(reason) => debug!(reason = %reason, "Cycle skipped"),
        None => info!(
            account = %report.account,
            tokens_added = report.tokens_added,
            collectibles_added = report.collectibles_added,
            collectibles_removed = report.collectibles_removed,
            dropped = report.items_dropped,
            token_fetch_failed = report.token_fetch_failed,
            collectible_fetch_failed = report.collectible_fetch_failed,
            stale = report.stale_discarded,
            "Cycle complete"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
