//! Console listener - logs committed cycles for testing and debugging
//!
//! Useful for watching a device feed without wiring a real feedback
//! subsystem, and for validating change detection during development.

use super::ChangeListener;
use crate::diff::ChangeSet;
use crate::model::Snapshot;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub struct ConsoleListener {
    /// Committed cycles seen so far
    cycles: AtomicU64,
}

impl ConsoleListener {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
        }
    }

    pub fn cycles_seen(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

impl Default for ConsoleListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeListener for ConsoleListener {
    async fn on_snapshot(&self, changes: &ChangeSet, snapshot: &Snapshot) {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            "📸 [{}] cycle #{}: {} input(s), {} overlay(s), {} change(s)",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            cycle,
            snapshot.inputs.len(),
            snapshot.overlays.len(),
            changes.len()
        );

        if !changes.is_empty() {
            match serde_json::to_string(&changes.records) {
                Ok(json) => debug!(records = %json, "change records"),
                Err(e) => warn!("failed to render change records: {e}"),
            }
        }
    }
}
