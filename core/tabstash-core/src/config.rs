//! Tracker configuration, persisted as a whole JSON value under one key.
//!
//! Loading is defensive: a missing, corrupt, or partially invalid value
//! decodes to defaults (field-level serde defaults fill gaps), never an
//! error. Configuration problems must not take down a long-lived tracker.

use serde::{Deserialize, Serialize};

use crate::storage::{keys, KeyValueStore};

/// Quiet interval the capture scheduler waits after the last tab event.
pub const DEFAULT_CAPTURE_DEBOUNCE_MS: u64 = 5_000;

/// Fallback quota estimate when the persistence layer cannot report one.
/// Matches the common host local-storage default of 10 MiB.
pub const DEFAULT_QUOTA_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerConfig {
    /// Quiet interval for the debounced capture scheduler, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub capture_debounce_ms: u64,

    /// Delay between a window-removed event and the final snapshot attempt,
    /// letting the host's own event pipeline settle.
    #[serde(default = "default_close_settle_ms")]
    pub close_settle_ms: u64,

    /// Delay before the single retry of a final snapshot whose identity
    /// mapping was not yet settled.
    #[serde(default = "default_close_retry_ms")]
    pub close_retry_ms: u64,

    /// Unstarred snapshots older than this are removed by cleanup.
    #[serde(default = "default_snapshot_ttl_days")]
    pub snapshot_ttl_days: i64,

    /// How long a deleted snapshot stays restorable in the undo buffer.
    #[serde(default = "default_undo_ttl_secs")]
    pub undo_ttl_secs: i64,

    /// Reopened-window reconciliation accepts a match only strictly above
    /// this URL-overlap score.
    #[serde(default = "default_match_threshold")]
    pub reopen_match_threshold: f64,

    /// Whether remote sync-area changes trigger local reassertion.
    #[serde(default)]
    pub sync_enabled: bool,

    /// Quota estimate used when the persistence layer reports none.
    #[serde(default = "default_quota_bytes")]
    pub fallback_quota_bytes: u64,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_CAPTURE_DEBOUNCE_MS
}

fn default_close_settle_ms() -> u64 {
    200
}

fn default_close_retry_ms() -> u64 {
    150
}

fn default_snapshot_ttl_days() -> i64 {
    30
}

fn default_undo_ttl_secs() -> i64 {
    300
}

fn default_match_threshold() -> f64 {
    0.70
}

fn default_quota_bytes() -> u64 {
    DEFAULT_QUOTA_BYTES
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            capture_debounce_ms: default_debounce_ms(),
            close_settle_ms: default_close_settle_ms(),
            close_retry_ms: default_close_retry_ms(),
            snapshot_ttl_days: default_snapshot_ttl_days(),
            undo_ttl_secs: default_undo_ttl_secs(),
            reopen_match_threshold: default_match_threshold(),
            sync_enabled: false,
            fallback_quota_bytes: default_quota_bytes(),
        }
    }
}

impl TrackerConfig {
    /// Loads configuration from the store, returning defaults if the key is
    /// missing or the stored value does not decode.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(keys::CONFIG) {
            Ok(Some(value)) => match serde_json::from_value::<TrackerConfig>(value) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "Config value malformed, using defaults");
                    TrackerConfig::default()
                }
            },
            Ok(None) => TrackerConfig::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Config read failed, using defaults");
                TrackerConfig::default()
            }
        }
    }

    /// Persists the configuration.
    pub fn save(&self, store: &dyn KeyValueStore) -> crate::Result<()> {
        let value = serde_json::to_value(self).map_err(|e| crate::StashError::Json {
            context: "serialize config".to_string(),
            source: e,
        })?;
        store.set(keys::CONFIG, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn default_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.capture_debounce_ms, 5_000);
        assert_eq!(config.close_settle_ms, 200);
        assert_eq!(config.snapshot_ttl_days, 30);
        assert_eq!(config.undo_ttl_secs, 300);
        assert!((config.reopen_match_threshold - 0.70).abs() < f64::EPSILON);
        assert!(!config.sync_enabled);
    }

    #[test]
    fn load_missing_key_returns_defaults() {
        let store = MemoryStore::new();
        let config = TrackerConfig::load(&store);
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn load_corrupt_value_returns_defaults() {
        let store = MemoryStore::new();
        store
            .set(keys::CONFIG, serde_json::json!("not an object"))
            .unwrap();
        let config = TrackerConfig::load(&store);
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn partial_value_fills_missing_fields_with_defaults() {
        let store = MemoryStore::new();
        store
            .set(keys::CONFIG, serde_json::json!({"capture_debounce_ms": 2000}))
            .unwrap();
        let config = TrackerConfig::load(&store);
        assert_eq!(config.capture_debounce_ms, 2_000);
        assert_eq!(config.snapshot_ttl_days, 30);
    }

    #[test]
    fn save_then_load_round_trip() {
        let store = MemoryStore::new();
        let mut config = TrackerConfig::default();
        config.sync_enabled = true;
        config.capture_debounce_ms = 2_000;
        config.save(&store).unwrap();

        let loaded = TrackerConfig::load(&store);
        assert_eq!(loaded, config);
    }
}
