//! In-memory host used by unit and integration tests.
//!
//! State mutations mirror what a real windowing host would do: tab indices
//! are recomputed on insert/remove, window IDs are minted from a counter
//! that tests can pin to simulate host ID reuse, and individual operations
//! can be armed to fail for partial-failure coverage.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use tabstash_protocol::{
    GroupStyle, HostGroupId, HostTab, HostTabId, HostWindow, HostWindowId, TabCreateSpec, TabGroup,
};

use super::HostApi;
use crate::{Result, StashError};

#[derive(Debug, Default)]
struct WindowState {
    focused: bool,
    tabs: Vec<HostTab>,
}

/// Scriptable [`HostApi`] implementation.
#[derive(Debug, Default)]
pub struct FakeHost {
    windows: RefCell<BTreeMap<HostWindowId, WindowState>>,
    groups: RefCell<BTreeMap<HostGroupId, TabGroup>>,
    next_window_id: Cell<HostWindowId>,
    next_tab_id: Cell<HostTabId>,
    next_group_id: Cell<HostGroupId>,
    fail_window_create: Cell<bool>,
    fail_tab_creates: Cell<u32>,
    fail_group_ops: Cell<bool>,
    focused: Cell<Option<HostWindowId>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = FakeHost::default();
        host.next_window_id.set(1);
        host.next_tab_id.set(1);
        host.next_group_id.set(1);
        host
    }

    // ─────────────────────────────────────────────────────────────────────
    // Test scripting
    // ─────────────────────────────────────────────────────────────────────

    /// Pins the ID the next created window will receive. Lets tests model
    /// the host reassigning or reusing numeric IDs across restarts.
    pub fn set_next_window_id(&self, id: HostWindowId) {
        self.next_window_id.set(id);
    }

    /// Opens a window with one tab per URL, returning its ID.
    pub fn open_window(&self, urls: &[&str]) -> HostWindowId {
        let id = self.next_window_id.get();
        self.next_window_id.set(id + 1);
        self.windows.borrow_mut().insert(id, WindowState::default());
        for url in urls {
            self.add_tab(id, url);
        }
        id
    }

    /// Appends a tab to a window, returning its ID.
    pub fn add_tab(&self, window_id: HostWindowId, url: &str) -> HostTabId {
        let tab_id = self.next_tab_id.get();
        self.next_tab_id.set(tab_id + 1);
        let mut windows = self.windows.borrow_mut();
        let state = windows.get_mut(&window_id).expect("window exists");
        let index = state.tabs.len() as u32;
        state.tabs.push(HostTab {
            id: tab_id,
            window_id,
            index,
            url: url.to_string(),
            title: format!("Tab {tab_id}"),
            pinned: false,
            group_id: None,
            favicon_url: None,
            active: state.tabs.is_empty(),
        });
        tab_id
    }

    /// Removes a tab and reindexes the remainder.
    pub fn remove_tab(&self, window_id: HostWindowId, tab_id: HostTabId) {
        let mut windows = self.windows.borrow_mut();
        if let Some(state) = windows.get_mut(&window_id) {
            state.tabs.retain(|t| t.id != tab_id);
            for (i, tab) in state.tabs.iter_mut().enumerate() {
                tab.index = i as u32;
            }
        }
    }

    /// Closes a window, dropping its tabs.
    pub fn close_window(&self, window_id: HostWindowId) {
        self.windows.borrow_mut().remove(&window_id);
        if self.focused.get() == Some(window_id) {
            self.focused.set(None);
        }
    }

    /// Sets a tab's title.
    pub fn set_tab_title(&self, window_id: HostWindowId, tab_id: HostTabId, title: &str) {
        let mut windows = self.windows.borrow_mut();
        if let Some(tab) = windows
            .get_mut(&window_id)
            .and_then(|s| s.tabs.iter_mut().find(|t| t.id == tab_id))
        {
            tab.title = title.to_string();
        }
    }

    /// Sets a tab's pinned flag.
    pub fn set_tab_pinned(&self, window_id: HostWindowId, tab_id: HostTabId, pinned: bool) {
        let mut windows = self.windows.borrow_mut();
        if let Some(tab) = windows
            .get_mut(&window_id)
            .and_then(|s| s.tabs.iter_mut().find(|t| t.id == tab_id))
        {
            tab.pinned = pinned;
        }
    }

    /// Defines a group and assigns the given tabs to it directly,
    /// bypassing `group_tabs` bookkeeping.
    pub fn seed_group(
        &self,
        window_id: HostWindowId,
        tab_ids: &[HostTabId],
        group: TabGroup,
    ) -> HostGroupId {
        let group_id = group.id;
        self.groups.borrow_mut().insert(group_id, group);
        let mut windows = self.windows.borrow_mut();
        if let Some(state) = windows.get_mut(&window_id) {
            for tab in state.tabs.iter_mut() {
                if tab_ids.contains(&tab.id) {
                    tab.group_id = Some(group_id);
                }
            }
        }
        group_id
    }

    /// Drops a group definition while leaving tab membership intact,
    /// so group-info lookups fail for it.
    pub fn forget_group(&self, group_id: HostGroupId) {
        self.groups.borrow_mut().remove(&group_id);
    }

    /// Arms the next window creation to fail.
    pub fn fail_next_window_create(&self) {
        self.fail_window_create.set(true);
    }

    /// Arms the next `n` tab creations to fail.
    pub fn fail_next_tab_creates(&self, n: u32) {
        self.fail_tab_creates.set(n);
    }

    /// Makes group create/update operations fail until disarmed.
    pub fn set_group_ops_failing(&self, failing: bool) {
        self.fail_group_ops.set(failing);
    }

    /// The currently focused window, if any.
    pub fn focused_window(&self) -> Option<HostWindowId> {
        self.focused.get()
    }

    /// Number of currently open windows.
    pub fn window_count(&self) -> usize {
        self.windows.borrow().len()
    }

    /// URLs of a window's tabs in position order.
    pub fn tab_urls(&self, window_id: HostWindowId) -> Vec<String> {
        self.windows
            .borrow()
            .get(&window_id)
            .map(|s| s.tabs.iter().map(|t| t.url.clone()).collect())
            .unwrap_or_default()
    }
}

impl HostApi for FakeHost {
    fn list_windows(&self) -> Result<Vec<HostWindow>> {
        Ok(self
            .windows
            .borrow()
            .iter()
            .map(|(&id, state)| HostWindow {
                id,
                focused: state.focused,
            })
            .collect())
    }

    fn get_window(&self, id: HostWindowId) -> Result<Option<HostWindow>> {
        Ok(self.windows.borrow().get(&id).map(|state| HostWindow {
            id,
            focused: state.focused,
        }))
    }

    fn list_tabs(&self, window_id: HostWindowId) -> Result<Vec<HostTab>> {
        match self.windows.borrow().get(&window_id) {
            Some(state) => Ok(state.tabs.clone()),
            None => Err(StashError::host("list_tabs", "no such window")),
        }
    }

    fn get_group(&self, id: HostGroupId) -> Result<Option<TabGroup>> {
        if self.fail_group_ops.get() {
            return Err(StashError::host("get_group", "group ops failing"));
        }
        Ok(self.groups.borrow().get(&id).cloned())
    }

    fn create_window(&self, first_tab: TabCreateSpec) -> Result<HostWindow> {
        if self.fail_window_create.replace(false) {
            return Err(StashError::host("create_window", "window create failing"));
        }
        // Window creation is one atomic host call; armed tab failures only
        // apply to standalone create_tab calls.
        let id = self.open_window(&[]);
        let tab_id = self.add_tab(id, &first_tab.url);
        if first_tab.pinned {
            self.set_tab_pinned(id, tab_id, true);
        }
        Ok(HostWindow { id, focused: true })
    }

    fn create_tab(&self, window_id: HostWindowId, spec: TabCreateSpec) -> Result<HostTab> {
        let remaining = self.fail_tab_creates.get();
        if remaining > 0 {
            self.fail_tab_creates.set(remaining - 1);
            return Err(StashError::host("create_tab", "tab create failing"));
        }
        if !self.windows.borrow().contains_key(&window_id) {
            return Err(StashError::host("create_tab", "no such window"));
        }
        let tab_id = self.add_tab(window_id, &spec.url);
        if spec.pinned {
            self.set_tab_pinned(window_id, tab_id, true);
        }
        let windows = self.windows.borrow();
        let tab = windows
            .get(&window_id)
            .and_then(|s| s.tabs.iter().find(|t| t.id == tab_id))
            .cloned()
            .expect("tab just created");
        Ok(tab)
    }

    fn group_tabs(&self, window_id: HostWindowId, tab_ids: &[HostTabId]) -> Result<HostGroupId> {
        if self.fail_group_ops.get() {
            return Err(StashError::host("group_tabs", "group ops failing"));
        }
        let group_id = self.next_group_id.get();
        self.next_group_id.set(group_id + 1);
        self.groups.borrow_mut().insert(
            group_id,
            TabGroup {
                id: group_id,
                ..Default::default()
            },
        );
        let mut windows = self.windows.borrow_mut();
        let state = windows
            .get_mut(&window_id)
            .ok_or_else(|| StashError::host("group_tabs", "no such window"))?;
        for tab in state.tabs.iter_mut() {
            if tab_ids.contains(&tab.id) {
                tab.group_id = Some(group_id);
            }
        }
        Ok(group_id)
    }

    fn update_group(&self, id: HostGroupId, style: &GroupStyle) -> Result<()> {
        if self.fail_group_ops.get() {
            return Err(StashError::host("update_group", "group ops failing"));
        }
        let mut groups = self.groups.borrow_mut();
        let group = groups
            .get_mut(&id)
            .ok_or_else(|| StashError::host("update_group", "no such group"))?;
        if let Some(title) = &style.title {
            group.title = Some(title.clone());
        }
        if let Some(color) = &style.color {
            group.color = Some(color.clone());
        }
        if let Some(collapsed) = style.collapsed {
            group.collapsed = collapsed;
        }
        Ok(())
    }

    fn focus_window(&self, id: HostWindowId) -> Result<()> {
        if !self.windows.borrow().contains_key(&id) {
            return Err(StashError::host("focus_window", "no such window"));
        }
        self.focused.set(Some(id));
        Ok(())
    }
}
