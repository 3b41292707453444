//! Durable window identity.
//!
//! The host reassigns numeric window IDs on every restart, so the tracker
//! keys everything by its own logical window ID (a UUID minted once per
//! logical window). This module owns the persisted host-ID → logical-ID
//! map, heals it through liveness probes, and recovers identity for
//! reopened windows by URL-set similarity.
//!
//! Persistence discipline: the map is one whole JSON value with no partial
//! update primitive, so every mutation re-fetches the stored map
//! immediately before writing. Last-write-wins at the map level is the
//! accepted model.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use tabstash_protocol::HostWindowId;

use crate::host::HostApi;
use crate::storage::{keys, KeyValueStore};
use crate::store::SnapshotMap;
use crate::Result;

/// Stable identifier for a logical window: a UUID v4 string, never reused
/// while any snapshot or mapping references it.
pub type LogicalWindowId = String;

/// Host window ID → logical window ID, as persisted.
pub type IdentityMap = BTreeMap<HostWindowId, LogicalWindowId>;

// ═══════════════════════════════════════════════════════════════════════════════
// Reopened-Window Matching
// ═══════════════════════════════════════════════════════════════════════════════

/// Scoring strategy for reopened-window identity recovery.
///
/// Pluggable so the algorithm and threshold can be swapped or tested
/// independently of the registry's control flow.
pub trait MatchStrategy {
    /// Similarity in `0.0..=1.0` between a live window's tab URLs and a
    /// stored snapshot's tab URLs.
    fn score(&self, window_urls: &[&str], snapshot_urls: &[&str]) -> f64;
}

/// Default strategy: distinct shared URLs over the smaller tab count.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlOverlapStrategy;

impl MatchStrategy for UrlOverlapStrategy {
    fn score(&self, window_urls: &[&str], snapshot_urls: &[&str]) -> f64 {
        let denominator = window_urls.len().min(snapshot_urls.len());
        if denominator == 0 {
            return 0.0;
        }
        let window_set: HashSet<&str> = window_urls.iter().copied().collect();
        let snapshot_set: HashSet<&str> = snapshot_urls.iter().copied().collect();
        let matching = window_set.intersection(&snapshot_set).count();
        matching as f64 / denominator as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns the persisted identity map and its reconciliation rules.
pub struct IdentityRegistry {
    host: Rc<dyn HostApi>,
    store: Rc<dyn KeyValueStore>,
    strategy: Box<dyn MatchStrategy>,
    /// Reopen matches must score strictly above this.
    match_threshold: f64,
}

impl IdentityRegistry {
    pub fn new(host: Rc<dyn HostApi>, store: Rc<dyn KeyValueStore>, match_threshold: f64) -> Self {
        IdentityRegistry {
            host,
            store,
            strategy: Box::new(UrlOverlapStrategy),
            match_threshold,
        }
    }

    /// Replaces the reopen-matching strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn MatchStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Loads the identity map, dropping malformed entries with a warning.
    /// A missing or structurally invalid value decodes to an empty map.
    fn load_map(&self) -> IdentityMap {
        let value = match self.store.get(keys::IDENTITY_MAP) {
            Ok(Some(value)) => value,
            Ok(None) => return IdentityMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Identity map read failed, treating as empty");
                return IdentityMap::new();
            }
        };
        let Some(object) = value.as_object() else {
            tracing::warn!("Identity map is not an object, treating as empty");
            return IdentityMap::new();
        };

        let mut map = IdentityMap::new();
        for (raw_key, raw_value) in object {
            let parsed = raw_key.parse::<HostWindowId>().ok();
            let logical = raw_value.as_str().filter(|s| !s.is_empty());
            match (parsed, logical) {
                (Some(host_id), Some(logical)) => {
                    map.insert(host_id, logical.to_string());
                }
                _ => {
                    tracing::warn!(key = %raw_key, "Dropping malformed identity map entry");
                }
            }
        }
        map
    }

    fn save_map(&self, map: &IdentityMap) -> Result<()> {
        let object: serde_json::Map<String, serde_json::Value> = map
            .iter()
            .map(|(host_id, logical)| (host_id.to_string(), serde_json::Value::from(logical.clone())))
            .collect();
        self.store.set(keys::IDENTITY_MAP, serde_json::Value::Object(object))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration & Lookup
    // ─────────────────────────────────────────────────────────────────────

    /// Idempotently registers a host window, minting a new logical ID only
    /// if none is mapped yet.
    pub fn register_window(&self, host_id: HostWindowId) -> Result<LogicalWindowId> {
        let mut map = self.load_map();
        if let Some(existing) = map.get(&host_id) {
            return Ok(existing.clone());
        }
        let logical = uuid::Uuid::new_v4().to_string();
        map.insert(host_id, logical.clone());
        self.save_map(&map)?;
        tracing::info!(host_id, logical_id = %logical, "Registered window");
        Ok(logical)
    }

    /// The logical ID currently mapped to `host_id`, if any.
    pub fn logical_id(&self, host_id: HostWindowId) -> Result<Option<LogicalWindowId>> {
        Ok(self.load_map().get(&host_id).cloned())
    }

    /// The live host window currently bound to `logical_id`.
    ///
    /// Every candidate entry is liveness-probed; entries whose window no
    /// longer exists are evicted from the persisted map as a side effect,
    /// so the map self-heals on lookup.
    pub fn find_host_id(&self, logical_id: &str) -> Result<Option<HostWindowId>> {
        let map = self.load_map();
        let candidates: Vec<HostWindowId> = map
            .iter()
            .filter(|(_, logical)| logical.as_str() == logical_id)
            .map(|(&host_id, _)| host_id)
            .collect();

        let mut live = None;
        let mut stale = Vec::new();
        for host_id in candidates {
            if self.host.window_exists(host_id) {
                live = Some(host_id);
            } else {
                stale.push(host_id);
            }
        }

        if !stale.is_empty() {
            // Re-fetch before writing: the probe loop above is a suspension
            // window in an async host binding.
            let mut map = self.load_map();
            for host_id in &stale {
                map.remove(host_id);
            }
            self.save_map(&map)?;
            tracing::debug!(logical_id, evicted = stale.len(), "Evicted stale identity entries");
        }

        Ok(live)
    }

    /// Binds `host_id` to an existing logical ID, evicting any other host
    /// entries still pointing at it.
    pub fn adopt(&self, host_id: HostWindowId, logical_id: &str) -> Result<()> {
        let mut map = self.load_map();
        map.retain(|_, logical| logical.as_str() != logical_id);
        map.insert(host_id, logical_id.to_string());
        self.save_map(&map)
    }

    /// Startup reconciliation: every currently open window gets an identity,
    /// independent of event-ordering races during boot.
    pub fn initialize(&self) -> Result<()> {
        let windows = self.host.list_windows()?;
        let mut map = self.load_map();
        let mut registered = 0u32;
        for window in &windows {
            if !map.contains_key(&window.id) {
                map.insert(window.id, uuid::Uuid::new_v4().to_string());
                registered += 1;
            }
        }
        if registered > 0 {
            self.save_map(&map)?;
        }
        tracing::info!(open_windows = windows.len(), registered, "Identity registry initialized");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reopened-Window Reconciliation
    // ─────────────────────────────────────────────────────────────────────

    /// Heuristic identity recovery for a just-created window.
    ///
    /// Scores the window's tab URLs against every stored snapshot and
    /// accepts the best match strictly above the threshold, provided that
    /// snapshot's logical ID has no other live host window. On acceptance
    /// the mapping is adopted and `true` returned; otherwise the caller
    /// falls back to plain registration.
    pub fn reconcile_reopened(
        &self,
        host_id: HostWindowId,
        snapshots: &SnapshotMap,
    ) -> Result<bool> {
        let tabs = match self.host.list_tabs(host_id) {
            Ok(tabs) => tabs,
            Err(e) => {
                tracing::warn!(host_id, error = %e, "Tab listing failed during reconciliation");
                return Ok(false);
            }
        };
        let window_urls: Vec<&str> = tabs.iter().map(|t| t.url.as_str()).collect();
        if window_urls.is_empty() {
            return Ok(false);
        }

        let mut best: Option<(&str, f64)> = None;
        for (logical, snapshot) in snapshots {
            let score = self.strategy.score(&window_urls, &snapshot.tab_urls());
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((logical.as_str(), score));
            }
        }

        let Some((logical, score)) = best else {
            return Ok(false);
        };
        if score <= self.match_threshold {
            return Ok(false);
        }

        // The matched identity must not belong to another live window;
        // the probe also evicts stale entries for it.
        if let Some(existing) = self.find_host_id(logical)? {
            if existing != host_id {
                tracing::debug!(
                    host_id,
                    logical_id = logical,
                    existing_host = existing,
                    "Reopen match rejected, identity is live elsewhere"
                );
                return Ok(false);
            }
        }

        self.adopt(host_id, logical)?;
        tracing::info!(host_id, logical_id = logical, score, "Reconciled reopened window");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use crate::snapshot::{Snapshot, TabRecord};
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn registry(host: &Rc<FakeHost>, store: &Rc<MemoryStore>) -> IdentityRegistry {
        IdentityRegistry::new(
            Rc::clone(host) as Rc<dyn HostApi>,
            Rc::clone(store) as Rc<dyn KeyValueStore>,
            0.70,
        )
    }

    fn snapshot_of(urls: &[&str]) -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            tabs: urls
                .iter()
                .enumerate()
                .map(|(i, url)| TabRecord {
                    host_tab_id: i as u64 + 1,
                    url: url.to_string(),
                    title: String::new(),
                    pinned: false,
                    group_id: None,
                    index: i as u32,
                    favicon_url: None,
                })
                .collect(),
            groups: vec![],
            custom_name: None,
            starred: false,
        }
    }

    #[test]
    fn register_is_idempotent() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);
        let window = host.open_window(&["https://a.example"]);

        let first = registry.register_window(window).unwrap();
        let second = registry.register_window(window).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn registrations_survive_registry_recreation() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let window = host.open_window(&["https://a.example"]);

        let logical = registry(&host, &store).register_window(window).unwrap();
        let reloaded = registry(&host, &store).logical_id(window).unwrap();
        assert_eq!(reloaded, Some(logical));
    }

    #[test]
    fn initialize_registers_every_open_window() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let w1 = host.open_window(&["https://a.example"]);
        let w2 = host.open_window(&["https://b.example"]);

        let registry = registry(&host, &store);
        registry.initialize().unwrap();

        assert!(registry.logical_id(w1).unwrap().is_some());
        assert!(registry.logical_id(w2).unwrap().is_some());
    }

    #[test]
    fn find_host_id_returns_live_and_evicts_stale() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);

        let stale = host.open_window(&["https://a.example"]);
        let logical = registry.register_window(stale).unwrap();
        host.close_window(stale);

        let live = host.open_window(&["https://a.example"]);
        // Simulate the reopened window adopting the same identity while the
        // stale entry is still on disk.
        {
            let mut map = registry.load_map();
            map.insert(live, logical.clone());
            registry.save_map(&map).unwrap();
        }

        assert_eq!(registry.find_host_id(&logical).unwrap(), Some(live));
        // Stale entry evicted as a side effect.
        assert!(registry.logical_id(stale).unwrap().is_none());
    }

    #[test]
    fn find_host_id_for_closed_window_returns_none() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);

        let window = host.open_window(&["https://a.example"]);
        let logical = registry.register_window(window).unwrap();
        host.close_window(window);

        assert_eq!(registry.find_host_id(&logical).unwrap(), None);
        assert!(registry.logical_id(window).unwrap().is_none());
    }

    #[test]
    fn corrupt_identity_map_treated_as_empty() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        store
            .set(keys::IDENTITY_MAP, serde_json::json!(["not", "an", "object"]))
            .unwrap();
        let registry = registry(&host, &store);
        let window = host.open_window(&["https://a.example"]);
        assert!(registry.logical_id(window).unwrap().is_none());
    }

    #[test]
    fn malformed_entries_are_dropped_and_valid_ones_kept() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        store
            .set(
                keys::IDENTITY_MAP,
                serde_json::json!({"7": "uuid-seven", "not-a-number": "x", "8": ""}),
            )
            .unwrap();
        let registry = registry(&host, &store);
        assert_eq!(registry.logical_id(7).unwrap().as_deref(), Some("uuid-seven"));
        assert!(registry.logical_id(8).unwrap().is_none());
    }

    #[test]
    fn url_overlap_score() {
        let strategy = UrlOverlapStrategy;
        assert_eq!(strategy.score(&[], &[]), 0.0);
        assert_eq!(strategy.score(&["a"], &["a"]), 1.0);
        // 2 of min(4, 2) = 1.0
        assert_eq!(strategy.score(&["a", "b", "c", "d"], &["a", "b"]), 1.0);
        // 7 of min(10, 10)
        let window: Vec<&str> = vec!["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let snapshot: Vec<&str> = vec!["a", "b", "c", "d", "e", "f", "g", "x", "y", "z"];
        let score = strategy.score(&window, &snapshot);
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn reconcile_accepts_full_match() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);

        let mut snapshots = SnapshotMap::new();
        snapshots.insert(
            "u1".to_string(),
            snapshot_of(&["https://a.example", "https://b.example"]),
        );

        let reopened = host.open_window(&["https://a.example", "https://b.example"]);
        assert!(registry.reconcile_reopened(reopened, &snapshots).unwrap());
        assert_eq!(registry.logical_id(reopened).unwrap().as_deref(), Some("u1"));
    }

    #[test]
    fn reconcile_rejects_exact_threshold_match() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);

        let window_urls: Vec<String> = (0..10).map(|i| format!("https://w{i}.example")).collect();
        let mut snapshot_urls: Vec<&str> = window_urls.iter().map(|s| s.as_str()).collect();
        // Exactly 7 of 10 shared.
        let replacements = ["https://x.example", "https://y.example", "https://z.example"];
        for (slot, replacement) in snapshot_urls.iter_mut().rev().zip(replacements) {
            *slot = replacement;
        }

        let mut snapshots = SnapshotMap::new();
        snapshots.insert("u1".to_string(), snapshot_of(&snapshot_urls));

        let window_refs: Vec<&str> = window_urls.iter().map(|s| s.as_str()).collect();
        let reopened = host.open_window(&window_refs);

        // 70% exactly: threshold is strictly greater-than, so no match.
        assert!(!registry.reconcile_reopened(reopened, &snapshots).unwrap());
        assert!(registry.logical_id(reopened).unwrap().is_none());
    }

    #[test]
    fn reconcile_rejects_when_identity_is_live_elsewhere() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);

        let urls = ["https://a.example", "https://b.example"];
        let original = host.open_window(&urls);
        let logical = registry.register_window(original).unwrap();

        let mut snapshots = SnapshotMap::new();
        snapshots.insert(logical.clone(), snapshot_of(&urls));

        // Same tab set opened in a second window while the original lives.
        let copycat = host.open_window(&urls);
        assert!(!registry.reconcile_reopened(copycat, &snapshots).unwrap());
        assert!(registry.logical_id(copycat).unwrap().is_none());
    }

    #[test]
    fn reconcile_with_no_snapshots_falls_through() {
        let host = Rc::new(FakeHost::new());
        let store = Rc::new(MemoryStore::new());
        let registry = registry(&host, &store);
        let window = host.open_window(&["https://a.example"]);
        assert!(!registry.reconcile_reopened(window, &SnapshotMap::new()).unwrap());
    }
}
