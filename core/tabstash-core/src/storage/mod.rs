//! Key-value persistence seam.
//!
//! The engine persists a small number of top-level keys, each read and
//! written as a whole JSON value; the backing store offers no partial
//! update primitive. Every mutation in the engine therefore follows a
//! re-fetch-then-write discipline, and last-write-wins at the key level
//! is the accepted consistency model.
//!
//! Stores are injected into components rather than reached through
//! ambient singletons, so tests substitute [`MemoryStore`] freely.

use serde_json::Value;

use tabstash_protocol::StorageEstimate;

use crate::Result;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// The top-level keys the tracker persists.
pub mod keys {
    /// Host window ID → logical window ID map.
    pub const IDENTITY_MAP: &str = "identity-map";
    /// Logical window ID → current snapshot map (versioned document).
    pub const SNAPSHOTS: &str = "snapshots";
    /// Tracker configuration.
    pub const CONFIG: &str = "config";
    /// Undo buffer of recently deleted snapshots.
    pub const DELETED_SNAPSHOTS: &str = "deleted-snapshots";
}

/// Coarse whole-value key-value persistence.
///
/// Implementations are not required to be thread-safe; the engine is
/// single-threaded by design and clients provide their own synchronization
/// if they need it.
pub trait KeyValueStore {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replaces the value stored under `key`.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Removes `key` entirely. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Usage/quota estimate, when the backend can provide one.
    fn estimate(&self) -> Option<StorageEstimate> {
        None
    }
}
