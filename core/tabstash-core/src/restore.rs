//! Window restoration from stored snapshots.
//!
//! Restoring prefers focusing an already-open window with the right
//! identity over building a duplicate. Reconstruction creates placeholder
//! tabs (instant window, deferred page loads); the placeholder page
//! navigates to the real URL once its tab becomes visible.

use std::collections::BTreeMap;
use std::rc::Rc;

use tabstash_protocol::{GroupStyle, HostGroupId, HostTabId, HostWindowId, TabCreateSpec};

use crate::host::HostApi;
use crate::identity::IdentityRegistry;
use crate::placeholder::{self, PlaceholderMeta};
use crate::snapshot::{Snapshot, TabRecord};
use crate::store::SnapshotStore;
use crate::Result;

/// Rebuilds host windows from snapshots.
pub struct RestorationEngine {
    host: Rc<dyn HostApi>,
}

impl RestorationEngine {
    pub fn new(host: Rc<dyn HostApi>) -> Self {
        RestorationEngine { host }
    }

    /// Focuses the live window bound to `logical_id`, or reconstructs one
    /// from its stored snapshot.
    ///
    /// Returns `Ok(false)` when there is nothing to restore (no snapshot,
    /// or no restorable tabs). Window creation failure is the only fatal
    /// error; individual tab and group failures are logged and skipped.
    pub fn restore(
        &self,
        logical_id: &str,
        registry: &IdentityRegistry,
        store: &SnapshotStore,
    ) -> Result<bool> {
        if let Some(host_id) = registry.find_host_id(logical_id)? {
            match self.host.focus_window(host_id) {
                Ok(()) => {
                    tracing::info!(logical_id, host_id, "Focused already-open window");
                    return Ok(true);
                }
                Err(e) => {
                    // The window vanished between probe and focus; rebuild.
                    tracing::warn!(logical_id, host_id, error = %e, "Focus failed, reconstructing");
                }
            }
        }

        let Some(snapshot) = store.get(logical_id) else {
            tracing::warn!(logical_id, "No snapshot stored, nothing to restore");
            return Ok(false);
        };
        self.reconstruct(logical_id, &snapshot, registry)
    }

    fn reconstruct(
        &self,
        logical_id: &str,
        snapshot: &Snapshot,
        registry: &IdentityRegistry,
    ) -> Result<bool> {
        let mut tabs: Vec<&TabRecord> =
            snapshot.tabs.iter().filter(|t| is_restorable(&t.url)).collect();
        if tabs.is_empty() {
            tracing::warn!(logical_id, "Snapshot has no restorable tabs");
            return Ok(false);
        }
        tabs.sort_by_key(|t| t.index);

        // Window creation is fatal for the call if it fails.
        let first = tabs[0];
        let window = self.host.create_window(TabCreateSpec {
            url: placeholder_url(first),
            pinned: first.pinned,
            index: None,
            active: true,
        })?;
        tracing::info!(logical_id, host_id = window.id, tabs = tabs.len(), "Reconstructing window");

        // Track which new tab carries each restored record, for grouping.
        let mut created: Vec<(&TabRecord, HostTabId)> = Vec::with_capacity(tabs.len());
        if let Ok(initial) = self.host.list_tabs(window.id) {
            if let Some(first_tab) = initial.first() {
                created.push((first, first_tab.id));
            }
        }

        for record in &tabs[1..] {
            match self.host.create_tab(
                window.id,
                TabCreateSpec {
                    url: placeholder_url(record),
                    pinned: record.pinned,
                    index: None,
                    active: false,
                },
            ) {
                Ok(tab) => created.push((record, tab.id)),
                Err(e) => {
                    tracing::warn!(
                        logical_id,
                        url = %record.url,
                        error = %e,
                        "Tab creation failed, continuing restoration"
                    );
                }
            }
        }

        self.restore_groups(logical_id, snapshot, window.id, &created);

        registry.adopt(window.id, logical_id)?;
        Ok(true)
    }

    /// Regroups restored tabs and reapplies group styling, best-effort.
    fn restore_groups(
        &self,
        logical_id: &str,
        snapshot: &Snapshot,
        window_id: HostWindowId,
        created: &[(&TabRecord, HostTabId)],
    ) {
        let mut members: BTreeMap<HostGroupId, Vec<HostTabId>> = BTreeMap::new();
        for (record, tab_id) in created {
            if let Some(group_id) = record.group_id {
                members.entry(group_id).or_default().push(*tab_id);
            }
        }

        for (original_group, tab_ids) in members {
            let new_group = match self.host.group_tabs(window_id, &tab_ids) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(logical_id, original_group, error = %e, "Group creation failed, continuing");
                    continue;
                }
            };
            // A dangling reference (group lookup failed at capture time)
            // restores the grouping without styling.
            let Some(record) = snapshot.groups.iter().find(|g| g.group_id == original_group) else {
                continue;
            };
            let style = GroupStyle {
                title: record.title.clone(),
                color: record.color.clone(),
                collapsed: Some(record.collapsed),
            };
            if let Err(e) = self.host.update_group(new_group, &style) {
                tracing::warn!(logical_id, new_group, error = %e, "Group styling failed, continuing");
            }
        }
    }
}

/// Only web pages come back; internal and host-special pages do not.
fn is_restorable(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn placeholder_url(record: &TabRecord) -> String {
    placeholder::encode(&PlaceholderMeta {
        url: record.url.clone(),
        title: record.title.clone(),
        favicon_url: record.favicon_url.clone(),
    })
}
