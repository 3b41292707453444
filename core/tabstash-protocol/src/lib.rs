//! Host surface types for the tabstash engine.
//!
//! This crate is shared by the engine and its host bindings to prevent
//! schema drift. A host binding (browser extension bridge, test fake)
//! translates the native windowing/tab API into these types; the engine
//! never sees host-specific shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-assigned window identifier. Numeric, reused after windows close.
pub type HostWindowId = u64;

/// Host-assigned tab identifier.
pub type HostTabId = u64;

/// Host-assigned tab-group identifier.
pub type HostGroupId = u64;

// ═══════════════════════════════════════════════════════════════════════════════
// Live host state
// ═══════════════════════════════════════════════════════════════════════════════

/// A currently open host window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostWindow {
    pub id: HostWindowId,
    #[serde(default)]
    pub focused: bool,
}

/// A live tab as reported by the host.
///
/// `index` is the host-assigned position within its window at query time,
/// not creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostTab {
    pub id: HostTabId,
    pub window_id: HostWindowId,
    pub index: u32,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub group_id: Option<HostGroupId>,
    #[serde(default)]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Style and state of a tab group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TabGroup {
    pub id: HostGroupId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub collapsed: bool,
}

/// Parameters for creating a tab in an existing window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabCreateSpec {
    pub url: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub active: bool,
}

/// Requested style changes for a tab group. `None` fields are left as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GroupStyle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub collapsed: Option<bool>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Host events
// ═══════════════════════════════════════════════════════════════════════════════

/// Fields that changed in a tab-updated notification.
///
/// Hosts fire updates for many uninteresting transitions (loading spinners,
/// audible state); [`TabChange::is_capture_worthy`] is the filter the event
/// router applies before resetting a window's capture timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TabChange {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl TabChange {
    /// True when the update reflects a settled, snapshot-relevant change:
    /// a completed load or a title change.
    pub fn is_capture_worthy(&self) -> bool {
        self.status.as_deref() == Some("complete") || self.title.is_some()
    }
}

/// A windowing/tab event from the host, normalized for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    WindowCreated { window: HostWindow },
    WindowRemoved { window_id: HostWindowId },
    TabCreated { tab: HostTab },
    TabRemoved { tab_id: HostTabId, window_id: HostWindowId },
    TabUpdated { tab_id: HostTabId, window_id: HostWindowId, change: TabChange },
    TabAttached { tab_id: HostTabId, window_id: HostWindowId },
    TabDetached { tab_id: HostTabId, window_id: HostWindowId },
    GroupUpdated { group_id: HostGroupId, window_id: HostWindowId },
}

impl HostEvent {
    /// The window this event concerns.
    pub fn window_id(&self) -> HostWindowId {
        match self {
            HostEvent::WindowCreated { window } => window.id,
            HostEvent::WindowRemoved { window_id } => *window_id,
            HostEvent::TabCreated { tab } => tab.window_id,
            HostEvent::TabRemoved { window_id, .. } => *window_id,
            HostEvent::TabUpdated { window_id, .. } => *window_id,
            HostEvent::TabAttached { window_id, .. } => *window_id,
            HostEvent::TabDetached { window_id, .. } => *window_id,
            HostEvent::GroupUpdated { window_id, .. } => *window_id,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Storage notifications
// ═══════════════════════════════════════════════════════════════════════════════

/// Which persistence area a change notification came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageArea {
    Local,
    Sync,
}

/// One changed key within a storage-change notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageChange {
    pub key: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

/// A change notification from the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageEvent {
    pub area: StorageArea,
    pub changes: Vec<StorageChange>,
}

impl StorageEvent {
    /// True if any change in this notification touches `key`.
    pub fn touches(&self, key: &str) -> bool {
        self.changes.iter().any(|c| c.key == key)
    }
}

/// Quota/usage report from the persistence layer, when available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageEstimate {
    pub quota_bytes: u64,
    pub used_bytes: u64,
}
