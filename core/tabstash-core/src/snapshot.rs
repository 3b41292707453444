//! Snapshot values and the builder that captures them from live host state.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tabstash_protocol::{HostGroupId, HostTab, HostTabId, HostWindowId};

use crate::host::HostApi;
use crate::placeholder;
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot Types
// ═══════════════════════════════════════════════════════════════════════════════

/// One tab's metadata at capture time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabRecord {
    pub host_tab_id: HostTabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub group_id: Option<HostGroupId>,
    pub index: u32,
    #[serde(default)]
    pub favicon_url: Option<String>,
}

/// Style of a tab group referenced by at least one tab in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabGroupRecord {
    pub group_id: HostGroupId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub collapsed: bool,
}

/// A point-in-time capture of one window's tabs and tab groups.
///
/// Tabs are ordered by their host position index at capture time. A tab's
/// `group_id` normally references an entry in `groups`; when the group-info
/// lookup failed at build time the reference dangles and the group's
/// styling is simply absent on restore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub tabs: Vec<TabRecord>,
    #[serde(default)]
    pub groups: Vec<TabGroupRecord>,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub starred: bool,
}

impl Snapshot {
    /// Content equality: identical tabs and groups, timestamp ignored.
    /// Building twice over unchanged state yields `same_content` snapshots.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.tabs == other.tabs && self.groups == other.groups
    }

    /// Tab URLs in position order, as used by reopened-window matching.
    pub fn tab_urls(&self) -> Vec<&str> {
        self.tabs.iter().map(|t| t.url.as_str()).collect()
    }

    /// Structural validity check applied at every read boundary.
    ///
    /// Dangling group references are allowed (documented builder
    /// inconsistency); an empty tab list or a tab without a URL is not.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.tabs.is_empty() {
            return Err("snapshot has no tabs".to_string());
        }
        if let Some(tab) = self.tabs.iter().find(|t| t.url.is_empty()) {
            return Err(format!("tab {} has an empty url", tab.host_tab_id));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Captures immutable [`Snapshot`] values from live window state.
pub struct SnapshotBuilder {
    host: Rc<dyn HostApi>,
}

impl SnapshotBuilder {
    pub fn new(host: Rc<dyn HostApi>) -> Self {
        SnapshotBuilder { host }
    }

    /// Builds a snapshot of `window_id`, or `None` if the window currently
    /// has zero tabs (about to close, or invalid — never worth persisting).
    ///
    /// Group-info lookups are best-effort: a failed lookup omits that
    /// group's record and keeps the tabs' membership, logged and accepted.
    pub fn build(&self, window_id: HostWindowId) -> Result<Option<Snapshot>> {
        let mut host_tabs = self.host.list_tabs(window_id)?;
        if host_tabs.is_empty() {
            return Ok(None);
        }
        host_tabs.sort_by_key(|t| t.index);

        let tabs: Vec<TabRecord> = host_tabs.iter().map(tab_record).collect();

        let mut group_ids: Vec<HostGroupId> = Vec::new();
        for tab in &host_tabs {
            if let Some(group_id) = tab.group_id {
                if !group_ids.contains(&group_id) {
                    group_ids.push(group_id);
                }
            }
        }

        let mut groups = Vec::new();
        for group_id in group_ids {
            match self.host.get_group(group_id) {
                Ok(Some(group)) => groups.push(TabGroupRecord {
                    group_id: group.id,
                    title: group.title,
                    color: group.color,
                    collapsed: group.collapsed,
                }),
                Ok(None) => {
                    tracing::warn!(window_id, group_id, "Group vanished during capture, styling omitted");
                }
                Err(e) => {
                    tracing::warn!(window_id, group_id, error = %e, "Group lookup failed, styling omitted");
                }
            }
        }

        Ok(Some(Snapshot {
            timestamp: Utc::now(),
            tabs,
            groups,
            custom_name: None,
            starred: false,
        }))
    }
}

/// Converts a live tab into its record, seeing through placeholder tabs.
///
/// A restored-but-unloaded tab still points at the placeholder page; its
/// record must carry the original URL/title/favicon the placeholder
/// encoded, not the placeholder itself.
fn tab_record(tab: &HostTab) -> TabRecord {
    if let Some(meta) = placeholder::decode(&tab.url) {
        TabRecord {
            host_tab_id: tab.id,
            url: meta.url,
            title: meta.title,
            pinned: tab.pinned,
            group_id: tab.group_id,
            index: tab.index,
            favicon_url: meta.favicon_url,
        }
    } else {
        TabRecord {
            host_tab_id: tab.id,
            url: tab.url.clone(),
            title: tab.title.clone(),
            pinned: tab.pinned,
            group_id: tab.group_id,
            index: tab.index,
            favicon_url: tab.favicon_url.clone(),
        }
    }
}
