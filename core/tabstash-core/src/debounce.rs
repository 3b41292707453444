//! Per-window trailing-edge debounce for snapshot capture.
//!
//! Tab events arrive in bursts (a restored window fires dozens in a few
//! hundred milliseconds). The scheduler keeps one logical deadline per
//! window; every event resets that window's deadline to a full quiet
//! interval, so a burst produces exactly one capture reflecting the state
//! as of the last event.
//!
//! Deadlines are plain data keyed by window, not OS timers: the embedder
//! supplies monotonic milliseconds to [`note_activity`] and drains
//! [`take_due`] from its event loop, which keeps reset/cancel semantics
//! race-free within the single-threaded model.
//!
//! [`note_activity`]: CaptureScheduler::note_activity
//! [`take_due`]: CaptureScheduler::take_due

use std::collections::HashMap;

use tabstash_protocol::HostWindowId;

/// Debounced capture deadlines, one per window.
#[derive(Debug)]
pub struct CaptureScheduler {
    quiet_ms: u64,
    deadlines: HashMap<HostWindowId, u64>,
}

impl CaptureScheduler {
    pub fn new(quiet_ms: u64) -> Self {
        CaptureScheduler {
            quiet_ms,
            deadlines: HashMap::new(),
        }
    }

    /// Records activity for a window, resetting its deadline to a full
    /// quiet interval from `now_ms`.
    pub fn note_activity(&mut self, window_id: HostWindowId, now_ms: u64) {
        self.deadlines.insert(window_id, now_ms + self.quiet_ms);
    }

    /// Drains every window whose quiet interval has elapsed.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<HostWindowId> {
        let due: Vec<HostWindowId> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now_ms)
            .map(|(&window_id, _)| window_id)
            .collect();
        for window_id in &due {
            self.deadlines.remove(window_id);
        }
        due
    }

    /// Drops a window's pending deadline, if any. Called when the window
    /// closes and the final-snapshot path supersedes the debounced one.
    pub fn cancel(&mut self, window_id: HostWindowId) {
        self.deadlines.remove(&window_id);
    }

    /// Whether a capture is pending for the window.
    pub fn is_pending(&self, window_id: HostWindowId) -> bool {
        self.deadlines.contains_key(&window_id)
    }

    /// The earliest pending deadline, letting the embedder sleep precisely
    /// instead of polling.
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.values().copied().min()
    }

    pub fn quiet_ms(&self) -> u64 {
        self.quiet_ms
    }
}
