//! Ingestion engine: the owned "current snapshot" cell and the cycle that
//! replaces it.
//!
//! One cycle (parse → canonicalize → build → diff → commit → notify) runs
//! at a time. The current snapshot is swapped atomically on commit only, so
//! readers always see a fully built snapshot; a failed or abandoned cycle
//! leaves it untouched. The previous snapshot lives exactly as long as one
//! diff.

pub mod console;

use crate::adapter::{build_adapter, SnapshotParser};
use crate::config::{BackpressureMode, MirrorConfig};
use crate::diff::{diff, ChangeSet};
use crate::error::MirrorError;
use crate::model::{build_snapshot, Snapshot};
use crate::tree::canonicalize;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

pub use console::ConsoleListener;

/// Host-supplied observer, called once per committed cycle with the change
/// set and the new snapshot. The engine awaits the call but never retries
/// it — listener failures are the host's responsibility.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_snapshot(&self, changes: &ChangeSet, snapshot: &Snapshot);
}

/// How an `update` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The cycle committed and listeners were notified.
    Applied,
    /// A newer snapshot arrived first; this payload was coalesced away.
    /// Policy, not failure — the processed counter does not move.
    Superseded,
}

/// Live mirror of the device's state.
pub struct StateMirror {
    adapter: Arc<dyn SnapshotParser>,
    mode: BackpressureMode,
    listeners: parking_lot::RwLock<Vec<Arc<dyn ChangeListener>>>,

    /// The only shared mutable resource: swapped as one unit on commit.
    current: parking_lot::RwLock<Arc<Snapshot>>,

    /// Serializes ingestion cycles.
    cycle: Mutex<()>,
    /// Coalesce mode: depth-1 queue of the most recent pending payload.
    pending: parking_lot::Mutex<Option<(u64, String)>>,
    /// Sequence of the newest arrival, for cooperative abandonment.
    newest: AtomicU64,
    /// Committed cycles, visible to the host.
    processed: AtomicU64,
}

impl StateMirror {
    pub fn new(config: &MirrorConfig) -> Self {
        Self::with_adapter(build_adapter(config), config.backpressure)
    }

    pub fn with_adapter(adapter: Arc<dyn SnapshotParser>, mode: BackpressureMode) -> Self {
        Self {
            adapter,
            mode,
            listeners: parking_lot::RwLock::new(Vec::new()),
            current: parking_lot::RwLock::new(Arc::new(Snapshot::default())),
            cycle: Mutex::new(()),
            pending: parking_lot::Mutex::new(None),
            newest: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        }
    }

    /// Subscribe to committed cycles.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// The current snapshot. Always fully built and internally consistent.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Monotonic count of committed cycles. Failed and superseded cycles
    /// do not move it.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Ingest one raw snapshot document.
    pub async fn update(&self, raw: &str) -> Result<UpdateOutcome, MirrorError> {
        match self.mode {
            BackpressureMode::Reject => {
                let _guard = self.cycle.try_lock().map_err(|_| MirrorError::Busy)?;
                self.run_cycle(raw, None).await
            }
            BackpressureMode::Coalesce => {
                let seq = self.newest.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    // The slot only ever moves forward; a caller polled late
                    // must not clobber a newer pending payload
                    let mut pending = self.pending.lock();
                    if pending.as_ref().map_or(true, |(s, _)| *s < seq) {
                        *pending = Some((seq, raw.to_string()));
                    }
                }

                let _guard = self.cycle.lock().await;
                // Whoever gets here first drains the latest pending
                // payload; anyone else's was already consumed or replaced
                let Some((pending_seq, pending_raw)) = self.pending.lock().take() else {
                    trace!("pending payload already drained, superseded");
                    return Ok(UpdateOutcome::Superseded);
                };
                self.run_cycle(&pending_raw, Some(pending_seq)).await
            }
        }
    }

    /// One full cycle under the cycle guard. `seq` is present in coalesce
    /// mode and enables cooperative abandonment at the safe checkpoints —
    /// between stages, never mid-commit.
    async fn run_cycle(&self, raw: &str, seq: Option<u64>) -> Result<UpdateOutcome, MirrorError> {
        let tree = self.adapter.parse(raw).await?;
        if self.superseded(seq) {
            trace!("cycle superseded after parse, abandoning");
            return Ok(UpdateOutcome::Superseded);
        }

        let canonical = canonicalize(tree);
        let snapshot = Arc::new(build_snapshot(&canonical)?);
        if self.superseded(seq) {
            trace!("cycle superseded after build, abandoning");
            return Ok(UpdateOutcome::Superseded);
        }

        let changes = {
            let current = self.current.read();
            diff(&current, &snapshot)
        };

        // Commit: the swap is the single mutation readers can observe
        *self.current.write() = Arc::clone(&snapshot);
        self.processed.fetch_add(1, Ordering::SeqCst);
        debug!(
            inputs = snapshot.inputs.len(),
            changes = changes.len(),
            "snapshot committed"
        );

        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            listener.on_snapshot(&changes, &snapshot).await;
        }
        Ok(UpdateOutcome::Applied)
    }

    fn superseded(&self, seq: Option<u64>) -> bool {
        seq.is_some_and(|s| self.newest.load(Ordering::SeqCst) > s)
    }
}
