//! State composer.
//!
//! Merges per-module state snapshots into one observable state tree.
//! Keys are partitioned by module name, so there is no conflict
//! resolution: the merged view for a key is always that module's most
//! recent snapshot, never a stale or torn one.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::types::{AssetState, CycleReport};

/// Module key for the asset store's snapshot.
pub const MODULE_ASSETS: &str = "assets";
/// Module key for the last detection cycle report.
pub const MODULE_DETECTION: &str = "detection";

/// Folds child-module snapshots into a single flat state tree and
/// republishes the merged view on every child change.
pub struct StateComposer {
    modules: Mutex<BTreeMap<String, Value>>,
    merged: watch::Sender<Value>,
}

impl StateComposer {
    pub fn new() -> Self {
        let (merged, _) = watch::channel(Value::Object(serde_json::Map::new()));
        Self {
            modules: Mutex::new(BTreeMap::new()),
            merged,
        }
    }

    /// Replace one module's entry and republish the merged snapshot.
    pub fn update(&self, module: &str, snapshot: Value) {
        let merged = {
            let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
            modules.insert(module.to_string(), snapshot);
            Value::Object(
                modules
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        };
        debug!(module, "Composed state updated");
        self.merged.send_replace(merged);
    }

    /// Current merged snapshot.
    pub fn merged(&self) -> Value {
        self.merged.borrow().clone()
    }

    /// Subscribe to merged-state changes.
    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.merged.subscribe()
    }
}

impl Default for StateComposer {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward asset-store change events into the `"assets"` key until the
/// store side closes.
pub async fn forward_assets(
    composer: std::sync::Arc<StateComposer>,
    mut rx: watch::Receiver<AssetState>,
) {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        composer.update(
            MODULE_ASSETS,
            serde_json::to_value(&snapshot).unwrap_or_default(),
        );
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Forward cycle reports into the `"detection"` key until the scheduler
/// side closes.
pub async fn forward_detection(
    composer: std::sync::Arc<StateComposer>,
    mut rx: watch::Receiver<Option<CycleReport>>,
) {
    loop {
        if let Some(report) = rx.borrow_and_update().clone() {
            composer.update(
                MODULE_DETECTION,
                serde_json::to_value(&report).unwrap_or_default(),
            );
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
