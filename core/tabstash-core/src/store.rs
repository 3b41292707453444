//! Persisted snapshot map with undo, retention, and quota accounting.
//!
//! One current snapshot per logical window (single-slot, latest write
//! wins). The map is owned exclusively by [`SnapshotStore`] and mutated
//! only through its API; every mutation re-fetches the persisted document
//! before writing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tabstash_protocol::StorageEstimate;

use crate::config::TrackerConfig;
use crate::identity::LogicalWindowId;
use crate::snapshot::Snapshot;
use crate::storage::{keys, KeyValueStore};
use crate::{Result, StashError};

/// Logical window ID → current snapshot.
pub type SnapshotMap = BTreeMap<LogicalWindowId, Snapshot>;

/// Version of the persisted snapshots document (and the export format).
const SNAPSHOTS_VERSION: u32 = 1;

/// The on-disk shape of the snapshots key.
///
/// Entries are kept as raw JSON at this layer so one corrupt snapshot is
/// skipped instead of poisoning the whole map.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotsFile {
    version: u32,
    snapshots: BTreeMap<String, serde_json::Value>,
}

impl Default for SnapshotsFile {
    fn default() -> Self {
        SnapshotsFile {
            version: SNAPSHOTS_VERSION,
            snapshots: BTreeMap::new(),
        }
    }
}

/// A deleted snapshot parked in the undo buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletedSnapshotRecord {
    pub logical_window_id: LogicalWindowId,
    pub snapshot: Snapshot,
    pub deleted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Storage accounting, recomputed on demand rather than incrementally
/// tracked, so it cannot drift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    /// Quota estimate (host storage estimate, else the configured default).
    pub total_bytes: u64,
    /// Sum of serialized snapshot sizes. Approximate: content length, not
    /// exact on-disk size.
    pub used_bytes: u64,
    pub last_update: DateTime<Utc>,
    pub item_counts: ItemCounts,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ItemCounts {
    pub snapshots: u32,
    pub deleted: u32,
}

/// Graded quota warning. Advisory only; the store never refuses a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLevel {
    /// Below 60% of quota.
    Normal,
    /// At or above 60%.
    Notice,
    /// At or above 75%.
    Warning,
    /// At or above 90%.
    Critical,
}

impl QuotaLevel {
    fn from_fraction(fraction: f64) -> Self {
        if fraction >= 0.90 {
            QuotaLevel::Critical
        } else if fraction >= 0.75 {
            QuotaLevel::Warning
        } else if fraction >= 0.60 {
            QuotaLevel::Notice
        } else {
            QuotaLevel::Normal
        }
    }
}

/// What a cleanup pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub snapshots_removed: u32,
    pub undo_records_purged: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot Store
// ═══════════════════════════════════════════════════════════════════════════════

pub struct SnapshotStore {
    store: Rc<dyn KeyValueStore>,
    snapshot_ttl: Duration,
    undo_ttl: Duration,
    fallback_quota_bytes: u64,
    last_stats: RefCell<Option<StorageStats>>,
}

impl SnapshotStore {
    pub fn new(store: Rc<dyn KeyValueStore>, config: &TrackerConfig) -> Self {
        SnapshotStore {
            store,
            snapshot_ttl: Duration::days(config.snapshot_ttl_days),
            undo_ttl: Duration::seconds(config.undo_ttl_secs),
            fallback_quota_bytes: config.fallback_quota_bytes,
            last_stats: RefCell::new(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Loads the snapshot map. Lenient per-entry decode: a corrupt or
    /// invalid entry is skipped with a warning, never allowed to crash
    /// enumeration of the rest.
    fn load_map(&self) -> SnapshotMap {
        let value = match self.store.get(keys::SNAPSHOTS) {
            Ok(Some(value)) => value,
            Ok(None) => return SnapshotMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot map read failed, treating as empty");
                return SnapshotMap::new();
            }
        };
        let file = match serde_json::from_value::<SnapshotsFile>(value) {
            Ok(file) if file.version == SNAPSHOTS_VERSION => file,
            Ok(file) => {
                tracing::warn!(version = file.version, "Unsupported snapshots version, treating as empty");
                return SnapshotMap::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot map malformed, treating as empty");
                return SnapshotMap::new();
            }
        };

        let mut map = SnapshotMap::new();
        for (logical_id, raw) in file.snapshots {
            match serde_json::from_value::<Snapshot>(raw) {
                Ok(snapshot) => match snapshot.validate() {
                    Ok(()) => {
                        map.insert(logical_id, snapshot);
                    }
                    Err(reason) => {
                        tracing::warn!(logical_id = %logical_id, reason = %reason, "Skipping invalid stored snapshot");
                    }
                },
                Err(e) => {
                    tracing::warn!(logical_id = %logical_id, error = %e, "Skipping undecodable stored snapshot");
                }
            }
        }
        map
    }

    fn save_map(&self, map: &SnapshotMap) -> Result<()> {
        let file = SnapshotsFile {
            version: SNAPSHOTS_VERSION,
            snapshots: map
                .iter()
                .map(|(id, snapshot)| {
                    serde_json::to_value(snapshot)
                        .map(|v| (id.clone(), v))
                        .map_err(|e| StashError::Json {
                            context: format!("serialize snapshot {id}"),
                            source: e,
                        })
                })
                .collect::<Result<_>>()?,
        };
        let value = serde_json::to_value(&file).map_err(|e| StashError::Json {
            context: "serialize snapshot map".to_string(),
            source: e,
        })?;
        self.store.set(keys::SNAPSHOTS, value)
    }

    fn load_undo(&self) -> Vec<DeletedSnapshotRecord> {
        let records: Vec<DeletedSnapshotRecord> = match self.store.get(keys::DELETED_SNAPSHOTS) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Undo buffer malformed, treating as empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Undo buffer read failed, treating as empty");
                Vec::new()
            }
        };

        // Lazy purge: expired records drop out on every read.
        let now = Utc::now();
        let live: Vec<DeletedSnapshotRecord> =
            records.iter().filter(|r| r.expires_at > now).cloned().collect();
        if live.len() != records.len() {
            if let Err(e) = self.save_undo(&live) {
                tracing::warn!(error = %e, "Failed to persist undo buffer purge");
            }
        }
        live
    }

    fn save_undo(&self, records: &[DeletedSnapshotRecord]) -> Result<()> {
        let value = serde_json::to_value(records).map_err(|e| StashError::Json {
            context: "serialize undo buffer".to_string(),
            source: e,
        })?;
        self.store.set(keys::DELETED_SNAPSHOTS, value)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_all(&self) -> SnapshotMap {
        self.load_map()
    }

    pub fn get(&self, logical_id: &str) -> Option<Snapshot> {
        self.load_map().get(logical_id).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Replaces the current snapshot for a logical window.
    ///
    /// Starred status and custom name are sticky: a routine capture (which
    /// carries neither) does not clear what the user set. An explicitly
    /// starred or named incoming snapshot wins as usual.
    pub fn put(&self, logical_id: &str, mut snapshot: Snapshot) -> Result<()> {
        snapshot
            .validate()
            .map_err(|details| StashError::InvalidShape {
                key: keys::SNAPSHOTS.to_string(),
                details,
            })?;

        let mut map = self.load_map();
        if let Some(existing) = map.get(logical_id) {
            if existing.starred && !snapshot.starred {
                snapshot.starred = true;
            }
            if snapshot.custom_name.is_none() {
                snapshot.custom_name = existing.custom_name.clone();
            }
        }
        map.insert(logical_id.to_string(), snapshot);
        self.save_map(&map)?;
        self.recompute_stats(&map);
        Ok(())
    }

    /// Moves the current snapshot into the undo buffer and removes it from
    /// the live map. Returns false if nothing was stored.
    pub fn delete(&self, logical_id: &str) -> Result<bool> {
        let mut map = self.load_map();
        let Some(snapshot) = map.remove(logical_id) else {
            return Ok(false);
        };

        let now = Utc::now();
        let mut undo = self.load_undo();
        undo.retain(|r| r.logical_window_id != logical_id);
        undo.push(DeletedSnapshotRecord {
            logical_window_id: logical_id.to_string(),
            snapshot,
            deleted_at: now,
            expires_at: now + self.undo_ttl,
        });
        self.save_undo(&undo)?;
        self.save_map(&map)?;
        self.recompute_stats(&map);
        Ok(true)
    }

    /// Restores a deleted snapshot from the undo buffer if it has not
    /// expired. Returns false otherwise.
    pub fn undo_delete(&self, logical_id: &str) -> Result<bool> {
        let mut undo = self.load_undo();
        let Some(position) = undo.iter().position(|r| r.logical_window_id == logical_id) else {
            return Ok(false);
        };
        let record = undo.remove(position);

        let mut map = self.load_map();
        map.insert(record.logical_window_id.clone(), record.snapshot);
        self.save_map(&map)?;
        self.save_undo(&undo)?;
        self.recompute_stats(&map);
        Ok(true)
    }

    /// Sets or clears the user-facing name of a stored snapshot.
    pub fn rename(&self, logical_id: &str, name: Option<&str>) -> Result<bool> {
        let mut map = self.load_map();
        let Some(snapshot) = map.get_mut(logical_id) else {
            return Ok(false);
        };
        snapshot.custom_name = name.map(|n| n.to_string());
        self.save_map(&map)?;
        Ok(true)
    }

    /// Stars or unstars a stored snapshot. Starred snapshots are exempt
    /// from cleanup and keep their flag across routine overwrites.
    pub fn toggle_star(&self, logical_id: &str, starred: bool) -> Result<bool> {
        let mut map = self.load_map();
        let Some(snapshot) = map.get_mut(logical_id) else {
            return Ok(false);
        };
        snapshot.starred = starred;
        self.save_map(&map)?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Retention
    // ─────────────────────────────────────────────────────────────────────

    /// Enforces the retention policy: unstarred snapshots older than the
    /// TTL are removed; starred snapshots are never touched. Runs
    /// opportunistically (on load), not on a background timer, so
    /// staleness is bounded by usage frequency.
    pub fn cleanup(&self) -> Result<CleanupStats> {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupStats> {
        let mut stats = CleanupStats::default();
        let cutoff = now - self.snapshot_ttl;

        let mut map = self.load_map();
        let before = map.len();
        map.retain(|_, snapshot| snapshot.starred || snapshot.timestamp > cutoff);
        stats.snapshots_removed = (before - map.len()) as u32;
        if stats.snapshots_removed > 0 {
            self.save_map(&map)?;
            self.recompute_stats(&map);
        }

        let undo = self.load_undo();
        let live: Vec<DeletedSnapshotRecord> =
            undo.iter().filter(|r| r.expires_at > now).cloned().collect();
        stats.undo_records_purged = (undo.len() - live.len()) as u32;
        if stats.undo_records_purged > 0 {
            self.save_undo(&live)?;
        }

        if stats.snapshots_removed > 0 || stats.undo_records_purged > 0 {
            tracing::info!(
                snapshots_removed = stats.snapshots_removed,
                undo_records_purged = stats.undo_records_purged,
                "Snapshot cleanup pass"
            );
        }
        Ok(stats)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Quota Accounting
    // ─────────────────────────────────────────────────────────────────────

    /// Recomputes storage accounting from scratch.
    pub fn stats(&self) -> StorageStats {
        let map = self.load_map();
        self.recompute_stats(&map)
    }

    /// The stats computed by the most recent mutation or [`stats`] call.
    pub fn last_stats(&self) -> Option<StorageStats> {
        self.last_stats.borrow().clone()
    }

    fn recompute_stats(&self, map: &SnapshotMap) -> StorageStats {
        let used_bytes: u64 = map
            .values()
            .map(|s| serde_json::to_string(s).map(|j| j.len() as u64).unwrap_or(0))
            .sum();
        let total_bytes = self
            .store
            .estimate()
            .map(|StorageEstimate { quota_bytes, .. }| quota_bytes)
            .unwrap_or(self.fallback_quota_bytes);
        let stats = StorageStats {
            total_bytes,
            used_bytes,
            last_update: Utc::now(),
            item_counts: ItemCounts {
                snapshots: map.len() as u32,
                deleted: self.load_undo().len() as u32,
            },
        };
        tracing::debug!(
            used_bytes = stats.used_bytes,
            total_bytes = stats.total_bytes,
            snapshots = stats.item_counts.snapshots,
            "Storage stats recomputed"
        );
        *self.last_stats.borrow_mut() = Some(stats.clone());
        stats
    }

    /// Graded quota warning for the current usage. Advisory only; callers
    /// decide whether to warn or block.
    pub fn check_limits(&self) -> QuotaLevel {
        let stats = self.stats();
        if stats.total_bytes == 0 {
            return QuotaLevel::Normal;
        }
        QuotaLevel::from_fraction(stats.used_bytes as f64 / stats.total_bytes as f64)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Export / Import
    // ─────────────────────────────────────────────────────────────────────

    /// Serializes the whole snapshot map for backup, in the same versioned
    /// document shape the store persists.
    pub fn export_json(&self) -> Result<String> {
        let map = self.load_map();
        let file = SnapshotsFile {
            version: SNAPSHOTS_VERSION,
            snapshots: map
                .iter()
                .map(|(id, snapshot)| {
                    serde_json::to_value(snapshot)
                        .map(|v| (id.clone(), v))
                        .map_err(|e| StashError::Json {
                            context: format!("serialize snapshot {id}"),
                            source: e,
                        })
                })
                .collect::<Result<_>>()?,
        };
        serde_json::to_string_pretty(&file).map_err(|e| StashError::Json {
            context: "serialize export".to_string(),
            source: e,
        })
    }

    /// Validates and merges an exported document into the live store.
    ///
    /// The document shape (object, supported version) is checked up front;
    /// individual snapshots failing validation are skipped with a warning.
    /// Returns the number of snapshots merged.
    pub fn import_json(&self, json: &str) -> Result<usize> {
        let file: SnapshotsFile = serde_json::from_str(json)
            .map_err(|e| StashError::ImportRejected(format!("not a snapshots document: {e}")))?;
        if file.version != SNAPSHOTS_VERSION {
            return Err(StashError::ImportRejected(format!(
                "unsupported version {}",
                file.version
            )));
        }

        let mut map = self.load_map();
        let mut imported = 0;
        for (logical_id, raw) in file.snapshots {
            match serde_json::from_value::<Snapshot>(raw) {
                Ok(snapshot) if snapshot.validate().is_ok() => {
                    map.insert(logical_id, snapshot);
                    imported += 1;
                }
                Ok(_) => {
                    tracing::warn!(logical_id = %logical_id, "Skipping invalid snapshot in import");
                }
                Err(e) => {
                    tracing::warn!(logical_id = %logical_id, error = %e, "Skipping undecodable snapshot in import");
                }
            }
        }
        self.save_map(&map)?;
        self.recompute_stats(&map);
        Ok(imported)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sync Reassertion
    // ─────────────────────────────────────────────────────────────────────

    /// Local-wins merge policy for a dual-homed store: on an observed
    /// remote change to the snapshots key, write the authoritative local
    /// copy back over the synced one. Whole-map last-writer-wins; the
    /// reasserting device effectively wins concurrent edits.
    pub fn reassert_over_sync(&self, sync: &dyn KeyValueStore) -> Result<bool> {
        let local = match self.store.get(keys::SNAPSHOTS)? {
            Some(value) => value,
            None => serde_json::to_value(SnapshotsFile::default()).map_err(|e| StashError::Json {
                context: "serialize empty snapshots document".to_string(),
                source: e,
            })?,
        };
        let remote = sync.get(keys::SNAPSHOTS)?;
        if remote.as_ref() == Some(&local) {
            return Ok(false);
        }
        sync.set(keys::SNAPSHOTS, local)?;
        tracing::info!("Reasserted local snapshots over sync");
        Ok(true)
    }
}
