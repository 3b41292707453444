//! End-to-end window lifecycle scenarios against the fake host and an
//! in-memory store: register → burst-capture → close → reopen → restore →
//! retention → delete/undo.

use std::rc::Rc;

use chrono::{Duration, Utc};

use tabstash_core::host::fake::FakeHost;
use tabstash_core::host::HostApi;
use tabstash_core::storage::{KeyValueStore, MemoryStore};
use tabstash_core::{SessionTracker, TrackerConfig};
use tabstash_protocol::{HostEvent, HostWindow, HostWindowId};

struct Harness {
    host: Rc<FakeHost>,
    tracker: SessionTracker,
}

fn harness() -> Harness {
    harness_with(TrackerConfig::default())
}

fn harness_with(config: TrackerConfig) -> Harness {
    let host = Rc::new(FakeHost::new());
    let kv = Rc::new(MemoryStore::new());
    let tracker = SessionTracker::new(
        Rc::clone(&host) as Rc<dyn HostApi>,
        Rc::clone(&kv) as Rc<dyn KeyValueStore>,
        config,
    );
    Harness { host, tracker }
}

fn window_created(id: HostWindowId) -> HostEvent {
    HostEvent::WindowCreated {
        window: HostWindow { id, focused: true },
    }
}

fn tab_created(host: &FakeHost, window_id: HostWindowId, url: &str) -> HostEvent {
    let tab_id = host.add_tab(window_id, url);
    let tab = host
        .list_tabs(window_id)
        .unwrap()
        .into_iter()
        .find(|t| t.id == tab_id)
        .unwrap();
    HostEvent::TabCreated { tab }
}

/// Scenario 1: a window created after startup gets registered through its
/// window-created event, and a burst of tab events within the quiet
/// interval produces exactly one snapshot in creation order.
#[test]
fn new_window_burst_produces_single_snapshot() {
    let mut h = harness();
    h.host.set_next_window_id(7);
    let window = h.host.open_window(&[]);
    assert_eq!(window, 7);

    h.tracker.handle_event(&window_created(7), 0).unwrap();
    let logical = h.tracker.registry().logical_id(7).unwrap().unwrap();

    let a = tab_created(&h.host, 7, "https://a.example");
    h.tracker.handle_event(&a, 1_000).unwrap();
    let b = tab_created(&h.host, 7, "https://b.example");
    h.tracker.handle_event(&b, 1_050).unwrap();

    // Nothing before the quiet interval elapses from the *last* event.
    h.tracker.tick(6_049).unwrap();
    assert!(h.tracker.store().get(&logical).is_none());

    h.tracker.tick(6_050).unwrap();
    let snapshot = h.tracker.store().get(&logical).unwrap();
    assert_eq!(
        snapshot.tab_urls(),
        vec!["https://a.example", "https://b.example"]
    );

    // Exactly one build: later ticks change nothing.
    h.tracker.tick(60_000).unwrap();
    assert_eq!(h.tracker.store().get(&logical).unwrap().timestamp, snapshot.timestamp);
}

/// Scenario 2: closing the window stores a final snapshot after the settle
/// delay while tabs are still briefly queryable; the identity entry stays
/// until a later liveness probe finds it gone.
#[test]
fn close_stores_final_state() {
    let mut h = harness();
    let window = h.host.open_window(&["https://a.example"]);
    h.tracker.handle_event(&window_created(window), 0).unwrap();
    let logical = h.tracker.registry().logical_id(window).unwrap().unwrap();

    let b = tab_created(&h.host, window, "https://b.example");
    h.tracker.handle_event(&b, 100).unwrap();

    h.tracker
        .handle_event(&HostEvent::WindowRemoved { window_id: window }, 150)
        .unwrap();
    // Settle delay passes; the fake still serves the window's tabs.
    h.tracker.tick(350).unwrap();

    let snapshot = h.tracker.store().get(&logical).unwrap();
    assert_eq!(
        snapshot.tab_urls(),
        vec!["https://a.example", "https://b.example"]
    );
    // Identity entry survives until probed.
    assert_eq!(h.tracker.registry().logical_id(window).unwrap(), Some(logical));
}

/// Scenarios 3 and 3b: the host's reopen feature brings the window back
/// under a new numeric ID; URL similarity recovers the old identity, and a
/// subsequent restore focuses the live window instead of duplicating it.
#[test]
fn reopen_recovers_identity_and_restore_focuses() {
    let mut h = harness();
    h.host.set_next_window_id(7);
    let window = h.host.open_window(&["https://a.example", "https://b.example"]);
    h.tracker.handle_event(&window_created(window), 0).unwrap();
    let logical = h.tracker.registry().logical_id(window).unwrap().unwrap();
    assert!(h.tracker.capture(window).unwrap());

    h.host.close_window(window);
    h.tracker
        .handle_event(&HostEvent::WindowRemoved { window_id: window }, 100)
        .unwrap();
    h.tracker.tick(1_000).unwrap();

    // Reopened with the same tab URLs under hostId 9.
    h.host.set_next_window_id(9);
    let reopened = h.host.open_window(&["https://a.example", "https://b.example"]);
    h.tracker.handle_event(&window_created(reopened), 2_000).unwrap();

    // 100% match: the old identity is reused, no new logical ID minted.
    assert_eq!(h.tracker.registry().logical_id(9).unwrap(), Some(logical.clone()));

    // Restore while open: focus, not reconstruction.
    let windows_before = h.host.window_count();
    assert!(h.tracker.restore(&logical).unwrap());
    assert_eq!(h.host.window_count(), windows_before);
    assert_eq!(h.host.focused_window(), Some(9));
}

/// Restoration proper: the window is gone entirely, so a new one is built
/// from placeholder tabs and adopts the old identity.
#[test]
fn restore_reconstructs_when_window_is_gone() {
    let mut h = harness();
    let window = h.host.open_window(&["https://a.example", "https://b.example"]);
    h.tracker.handle_event(&window_created(window), 0).unwrap();
    let logical = h.tracker.registry().logical_id(window).unwrap().unwrap();
    assert!(h.tracker.capture(window).unwrap());
    h.host.close_window(window);

    assert!(h.tracker.restore(&logical).unwrap());
    assert_eq!(h.host.window_count(), 1);

    let new_host_id = h.tracker.registry().find_host_id(&logical).unwrap().unwrap();
    assert_ne!(new_host_id, window);
    assert_eq!(h.host.tab_urls(new_host_id).len(), 2);

    // The restored (still unloaded) window snapshots with original URLs,
    // not placeholder URLs.
    assert!(h.tracker.capture(new_host_id).unwrap());
    let snapshot = h.tracker.store().get(&logical).unwrap();
    assert_eq!(
        snapshot.tab_urls(),
        vec!["https://a.example", "https://b.example"]
    );
}

/// Scenario 4: a starred snapshot outlives the retention TTL; an unstarred
/// one of the same age does not.
#[test]
fn cleanup_respects_starred_flag() {
    let h = harness();
    let w1 = h.host.open_window(&["https://a.example"]);
    let w2 = h.host.open_window(&["https://b.example"]);
    h.tracker.capture(w1).unwrap();
    h.tracker.capture(w2).unwrap();

    let u1 = h.tracker.registry().logical_id(w1).unwrap().unwrap();
    let u2 = h.tracker.registry().logical_id(w2).unwrap().unwrap();
    h.tracker.store().toggle_star(&u1, true).unwrap();

    // 31 days pass with no activity; cleanup runs on the next load.
    let later = Utc::now() + Duration::days(31);
    let stats = h.tracker.store().cleanup_at(later).unwrap();

    assert_eq!(stats.snapshots_removed, 1);
    assert!(h.tracker.store().get(&u1).is_some());
    assert!(h.tracker.store().get(&u2).is_none());
}

/// Scenario 5: delete then undo within the window restores the snapshot
/// unchanged; once expired, undo reports false.
#[test]
fn delete_undo_within_window_then_expiry() {
    let h = harness();
    let window = h.host.open_window(&["https://a.example"]);
    h.tracker.capture(window).unwrap();
    let u1 = h.tracker.registry().logical_id(window).unwrap().unwrap();
    let original = h.tracker.store().get(&u1).unwrap();

    assert!(h.tracker.store().delete(&u1).unwrap());
    assert!(h.tracker.store().get(&u1).is_none());
    assert!(h.tracker.store().undo_delete(&u1).unwrap());
    assert_eq!(h.tracker.store().get(&u1).unwrap(), original);

    // With an immediate-expiry undo window, the record is gone on read.
    let mut config = TrackerConfig::default();
    config.undo_ttl_secs = 0;
    let h2 = harness_with(config);
    let window = h2.host.open_window(&["https://a.example"]);
    h2.tracker.capture(window).unwrap();
    let u = h2.tracker.registry().logical_id(window).unwrap().unwrap();
    h2.tracker.store().delete(&u).unwrap();
    assert!(!h2.tracker.store().undo_delete(&u).unwrap());
}

/// A title change after the initial capture schedules a fresh capture that
/// reflects the new title.
#[test]
fn title_change_recaptures_window() {
    let mut h = harness();
    let window = h.host.open_window(&["https://a.example"]);
    h.tracker.handle_event(&window_created(window), 0).unwrap();
    let logical = h.tracker.registry().logical_id(window).unwrap().unwrap();
    assert!(h.tracker.capture(window).unwrap());

    let tab = h.host.list_tabs(window).unwrap().remove(0);
    h.host.set_tab_title(window, tab.id, "Renamed page");
    h.tracker
        .handle_event(
            &HostEvent::TabUpdated {
                tab_id: tab.id,
                window_id: window,
                change: tabstash_protocol::TabChange {
                    title: Some("Renamed page".to_string()),
                    ..Default::default()
                },
            },
            1_000,
        )
        .unwrap();

    h.tracker.tick(6_000).unwrap();
    let snapshot = h.tracker.store().get(&logical).unwrap();
    assert_eq!(snapshot.tabs[0].title, "Renamed page");
}

/// Startup reconciliation: windows opened while the tracker was down are
/// registered by initialize(), independent of event ordering.
#[test]
fn initialize_registers_preexisting_windows() {
    let h = harness();
    let w1 = h.host.open_window(&["https://a.example"]);
    let w2 = h.host.open_window(&["https://b.example"]);

    h.tracker.initialize().unwrap();

    assert!(h.tracker.registry().logical_id(w1).unwrap().is_some());
    assert!(h.tracker.registry().logical_id(w2).unwrap().is_some());
}
