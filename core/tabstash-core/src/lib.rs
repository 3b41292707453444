//! # tabstash-core
//!
//! Core library for tabstash: durable window identity, debounced snapshot
//! capture, bounded snapshot storage, and window restoration over an
//! abstract windowing host.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The host binding owns
//!   the event loop and supplies monotonic milliseconds to the router.
//! - **Not thread-safe**: Clients provide their own synchronization.
//! - **Injected stores**: Components receive their key-value store and
//!   host API explicitly; there are no ambient singletons, so tests
//!   substitute in-memory implementations freely.
//! - **Graceful degradation**: Corrupt persisted data decodes to empty or
//!   is skipped per entry; host failures degrade to a missing snapshot,
//!   never a crash.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use tabstash_core::{SessionTracker, TrackerConfig, storage::FileStore};
//!
//! let kv = Rc::new(FileStore::open(root, quota)?);
//! let mut tracker = SessionTracker::new(host, kv, TrackerConfig::default());
//! tracker.initialize()?;
//! // feed host events: tracker.handle_event(&event, now_ms)
//! // and drive deadlines: tracker.tick(now_ms)
//! ```

pub mod config;
pub mod debounce;
pub mod error;
pub mod host;
pub mod identity;
pub mod placeholder;
pub mod restore;
pub mod router;
pub mod snapshot;
pub mod storage;
pub mod store;

pub use config::TrackerConfig;
pub use debounce::CaptureScheduler;
pub use error::{Result, StashError};
pub use host::HostApi;
pub use identity::{IdentityRegistry, LogicalWindowId, MatchStrategy, UrlOverlapStrategy};
pub use restore::RestorationEngine;
pub use router::SessionTracker;
pub use snapshot::{Snapshot, SnapshotBuilder, TabGroupRecord, TabRecord};
pub use store::{
    CleanupStats, DeletedSnapshotRecord, ItemCounts, QuotaLevel, SnapshotMap, SnapshotStore,
    StorageStats,
};
