//! The windowing/tab host seam.
//!
//! The engine talks to the surrounding windowing environment exclusively
//! through [`HostApi`]. A production binding adapts the real extension-style
//! API; [`fake::FakeHost`] provides a scriptable in-memory implementation
//! for tests.

use tabstash_protocol::{
    GroupStyle, HostGroupId, HostTab, HostTabId, HostWindow, HostWindowId, TabCreateSpec, TabGroup,
};

use crate::Result;

pub mod fake;

/// Abstract host windowing/tab API surface.
///
/// Every method maps to a single host call; implementations convert host
/// rejections into [`crate::StashError::Host`] rather than panicking.
pub trait HostApi {
    /// Enumerates all currently open windows.
    fn list_windows(&self) -> Result<Vec<HostWindow>>;

    /// Fetches a window by ID. `Ok(None)` means the window no longer
    /// exists; this doubles as the liveness probe.
    fn get_window(&self, id: HostWindowId) -> Result<Option<HostWindow>>;

    /// Lists the tabs of a window in host position order.
    fn list_tabs(&self, window_id: HostWindowId) -> Result<Vec<HostTab>>;

    /// Fetches tab-group info by ID, if the group exists.
    fn get_group(&self, id: HostGroupId) -> Result<Option<TabGroup>>;

    /// Creates a new window containing a single tab.
    fn create_window(&self, first_tab: TabCreateSpec) -> Result<HostWindow>;

    /// Creates a tab in an existing window.
    fn create_tab(&self, window_id: HostWindowId, spec: TabCreateSpec) -> Result<HostTab>;

    /// Puts the given tabs of a window into a new group.
    fn group_tabs(&self, window_id: HostWindowId, tab_ids: &[HostTabId]) -> Result<HostGroupId>;

    /// Applies style changes to a group.
    fn update_group(&self, id: HostGroupId, style: &GroupStyle) -> Result<()>;

    /// Brings a window to the foreground.
    fn focus_window(&self, id: HostWindowId) -> Result<()>;

    /// Liveness probe: does the window still exist?
    ///
    /// A negative probe is the expected signal for a closed window. Any
    /// other probe failure is logged and treated conservatively as gone.
    fn window_exists(&self, id: HostWindowId) -> bool {
        match self.get_window(id) {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(window_id = id, error = %e, "Liveness probe failed, treating window as gone");
                false
            }
        }
    }
}
