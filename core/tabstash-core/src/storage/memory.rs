//! In-memory store for tests and embedders that manage persistence
//! themselves.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use tabstash_protocol::StorageEstimate;

use super::KeyValueStore;
use crate::Result;

/// HashMap-backed [`KeyValueStore`].
///
/// Interior mutability keeps the trait object shareable across components
/// within the single-threaded engine. Not `Sync`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, Value>>,
    estimate: RefCell<Option<StorageEstimate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Sets the estimate returned by [`KeyValueStore::estimate`]. Tests use
    /// this to exercise quota warning levels.
    pub fn set_estimate(&self, estimate: Option<StorageEstimate>) {
        *self.estimate.borrow_mut() = estimate;
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }

    fn estimate(&self) -> Option<StorageEstimate> {
        *self.estimate.borrow()
    }
}
