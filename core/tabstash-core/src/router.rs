//! Event dispatch: wires host events into the identity registry, capture
//! scheduler, snapshot store, and restoration engine.
//!
//! [`SessionTracker`] is the embedder-facing facade. The host binding owns
//! the actual event loop and feeds it `handle_event` / `tick` with
//! monotonic milliseconds; everything in here runs on that single logical
//! thread.

use std::rc::Rc;

use tabstash_protocol::{HostEvent, HostWindowId, StorageArea, StorageEvent};

use crate::config::TrackerConfig;
use crate::debounce::CaptureScheduler;
use crate::host::HostApi;
use crate::identity::IdentityRegistry;
use crate::restore::RestorationEngine;
use crate::snapshot::SnapshotBuilder;
use crate::storage::{keys, KeyValueStore};
use crate::store::SnapshotStore;
use crate::Result;

/// A window-removed event waiting out its settle delay before the final
/// snapshot attempt.
#[derive(Debug, Clone, Copy)]
struct PendingClose {
    window_id: HostWindowId,
    due_ms: u64,
    /// Set once the identity was registered just-in-time and a single
    /// retry has been scheduled.
    retried: bool,
}

/// The session tracker: event router plus the components it drives.
pub struct SessionTracker {
    config: TrackerConfig,
    registry: IdentityRegistry,
    builder: SnapshotBuilder,
    store: SnapshotStore,
    restorer: RestorationEngine,
    scheduler: CaptureScheduler,
    pending_closes: Vec<PendingClose>,
}

impl SessionTracker {
    pub fn new(
        host: Rc<dyn HostApi>,
        kv: Rc<dyn KeyValueStore>,
        config: TrackerConfig,
    ) -> Self {
        let registry = IdentityRegistry::new(
            Rc::clone(&host),
            Rc::clone(&kv),
            config.reopen_match_threshold,
        );
        let builder = SnapshotBuilder::new(Rc::clone(&host));
        let store = SnapshotStore::new(Rc::clone(&kv), &config);
        let restorer = RestorationEngine::new(Rc::clone(&host));
        let scheduler = CaptureScheduler::new(config.capture_debounce_ms);
        SessionTracker {
            config,
            registry,
            builder,
            store,
            restorer,
            scheduler,
            pending_closes: Vec::new(),
        }
    }

    /// Startup: every open window gets an identity, and the store runs an
    /// opportunistic retention pass.
    pub fn initialize(&self) -> Result<()> {
        self.registry.initialize()?;
        if let Err(e) = self.store.cleanup() {
            tracing::warn!(error = %e, "Startup cleanup failed");
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event Dispatch
    // ─────────────────────────────────────────────────────────────────────

    /// Routes one host event. `now_ms` is the embedder's monotonic clock.
    pub fn handle_event(&mut self, event: &HostEvent, now_ms: u64) -> Result<()> {
        match event {
            HostEvent::WindowCreated { window } => {
                let snapshots = self.store.get_all();
                if !self.registry.reconcile_reopened(window.id, &snapshots)? {
                    self.registry.register_window(window.id)?;
                }
            }
            HostEvent::WindowRemoved { window_id } => {
                // The close-triggered capture supersedes any pending
                // debounced one.
                self.scheduler.cancel(*window_id);
                self.pending_closes.push(PendingClose {
                    window_id: *window_id,
                    due_ms: now_ms + self.config.close_settle_ms,
                    retried: false,
                });
            }
            HostEvent::TabUpdated { window_id, change, .. } => {
                if change.is_capture_worthy() {
                    self.scheduler.note_activity(*window_id, now_ms);
                }
            }
            HostEvent::TabCreated { .. }
            | HostEvent::TabRemoved { .. }
            | HostEvent::TabAttached { .. }
            | HostEvent::TabDetached { .. }
            | HostEvent::GroupUpdated { .. } => {
                self.scheduler.note_activity(event.window_id(), now_ms);
            }
        }
        Ok(())
    }

    /// Routes a persistence-layer change notification. Returns whether the
    /// local snapshots document was reasserted over sync.
    pub fn handle_storage_event(
        &self,
        event: &StorageEvent,
        sync: &dyn KeyValueStore,
    ) -> Result<bool> {
        if !self.config.sync_enabled
            || event.area != StorageArea::Sync
            || !event.touches(keys::SNAPSHOTS)
        {
            return Ok(false);
        }
        self.store.reassert_over_sync(sync)
    }

    /// Fires everything whose deadline has passed: debounced captures and
    /// settled close-captures.
    pub fn tick(&mut self, now_ms: u64) -> Result<()> {
        for window_id in self.scheduler.take_due(now_ms) {
            if let Err(e) = self.capture(window_id) {
                tracing::debug!(window_id, error = %e, "Debounced capture failed");
            }
        }

        let due: Vec<PendingClose> = {
            let (due, waiting): (Vec<_>, Vec<_>) = self
                .pending_closes
                .iter()
                .copied()
                .partition(|p| p.due_ms <= now_ms);
            self.pending_closes = waiting;
            due
        };
        for pending in due {
            self.final_capture(pending, now_ms);
        }
        Ok(())
    }

    /// The next deadline the embedder should schedule a `tick` for.
    pub fn next_wakeup(&self) -> Option<u64> {
        let close = self.pending_closes.iter().map(|p| p.due_ms).min();
        match (self.scheduler.next_deadline(), close) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Capture Paths
    // ─────────────────────────────────────────────────────────────────────

    /// Immediate snapshot of a window, registering identity just-in-time.
    /// Returns false if the window refused a snapshot (zero tabs).
    pub fn capture(&self, window_id: HostWindowId) -> Result<bool> {
        let logical = match self.registry.logical_id(window_id)? {
            Some(logical) => logical,
            None => self.registry.register_window(window_id)?,
        };
        match self.builder.build(window_id)? {
            Some(snapshot) => {
                self.store.put(&logical, snapshot)?;
                tracing::debug!(window_id, logical_id = %logical, "Snapshot captured");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Final snapshot for a closing window. Tabs are often still queryable
    /// for a moment after the close notification; losing that last state
    /// is worse than strict close-means-gone semantics.
    fn final_capture(&mut self, pending: PendingClose, now_ms: u64) {
        let window_id = pending.window_id;
        let logical = match self.registry.logical_id(window_id) {
            Ok(Some(logical)) => logical,
            Ok(None) => {
                // Identity never settled for this window. Register it
                // just-in-time and retry once after a short delay.
                match self.registry.register_window(window_id) {
                    Ok(logical) if !pending.retried => {
                        tracing::debug!(window_id, logical_id = %logical, "JIT identity for closing window");
                        self.pending_closes.push(PendingClose {
                            window_id,
                            due_ms: now_ms + self.config.close_retry_ms,
                            retried: true,
                        });
                        return;
                    }
                    Ok(logical) => logical,
                    Err(e) => {
                        tracing::warn!(window_id, error = %e, "JIT registration failed, final snapshot lost");
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(window_id, error = %e, "Identity lookup failed, final snapshot lost");
                return;
            }
        };

        match self.builder.build(window_id) {
            Ok(Some(snapshot)) => {
                if let Err(e) = self.store.put(&logical, snapshot) {
                    tracing::warn!(window_id, error = %e, "Final snapshot store failed");
                } else {
                    tracing::info!(window_id, logical_id = %logical, "Final snapshot stored");
                }
            }
            Ok(None) => {
                tracing::debug!(window_id, "Closing window had no tabs, final snapshot skipped");
            }
            Err(e) => {
                // Expected once the host has fully torn the window down.
                tracing::debug!(window_id, error = %e, "Window no longer queryable, final snapshot skipped");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Restoration & Access
    // ─────────────────────────────────────────────────────────────────────

    /// Focus-or-reconstruct a logical window. See [`RestorationEngine`].
    pub fn restore(&self, logical_id: &str) -> Result<bool> {
        self.restorer.restore(logical_id, &self.registry, &self.store)
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
