//! End-to-end scheduler behavior in virtual time.

use popup_core::{
    EngineOptions, FileStore, KeyValueStore, MemoryStore, Mutation, PopupEngine, PopupPosition,
    SchedulerState, StorageConfig, VirtualPage, VisualState, DISMISSAL_STORAGE_KEY,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn activity(title: &str, city: &str) -> serde_json::Value {
    json!({
        "productTitle": title,
        "productImage": format!("https://cdn.example.com/{}.png", title),
        "city": city,
        "timeAgo": "5 minutes ago"
    })
}

fn payload_with(settings: serde_json::Value, titles: &[&str]) -> String {
    let activities: Vec<_> = titles.iter().map(|t| activity(t, "Denver")).collect();
    json!({
        "settings": settings,
        "activities": activities,
        "pageType": "index",
        "productId": null
    })
    .to_string()
}

fn scenario_payload() -> String {
    payload_with(
        json!({
            "popupEnabled": true,
            "popupPosition": "BOTTOM_LEFT",
            "popupDelay": 5,
            "displayDuration": 4
        }),
        &["A", "B"],
    )
}

fn boot_with(store: MemoryStore) -> PopupEngine<VirtualPage, MemoryStore> {
    PopupEngine::boot(
        &scenario_payload(),
        VirtualPage::blank(),
        store,
        &EngineOptions::default(),
    )
    .expect("scenario payload is valid")
}

fn boot() -> PopupEngine<VirtualPage, MemoryStore> {
    boot_with(MemoryStore::new())
}

fn current_title<S: popup_core::Surface, K: KeyValueStore>(
    engine: &PopupEngine<S, K>,
) -> Option<String> {
    engine
        .current_popup()
        .map(|popup| popup.activity.product_title.clone())
}

fn mounted_count(engine: &PopupEngine<VirtualPage, MemoryStore>) -> usize {
    engine
        .surface()
        .mutations()
        .iter()
        .filter(|m| matches!(m, Mutation::PopupMounted { .. }))
        .count()
}

#[test]
fn documented_timeline() {
    let mut engine = boot();
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);

    engine.advance_to(ms(4999));
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);
    assert_eq!(engine.surface().popup_count(), 0);

    engine.advance_to(secs(5));
    assert_eq!(engine.scheduler_state(), SchedulerState::Showing);
    assert_eq!(current_title(&engine).as_deref(), Some("A"));

    engine.advance_to(secs(9));
    assert_eq!(engine.scheduler_state(), SchedulerState::Idle);

    engine.advance_to(ms(9300));
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);
    assert_eq!(engine.surface().popup_count(), 0);

    engine.advance_to(ms(13999));
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);

    engine.advance_to(secs(14));
    assert_eq!(engine.scheduler_state(), SchedulerState::Showing);
    assert_eq!(current_title(&engine).as_deref(), Some("B"));
}

#[test]
fn popup_enters_then_becomes_visible_next_frame() {
    let mut engine = boot();
    engine.advance_to(secs(5));
    let popups = engine.surface().popups();
    assert_eq!(popups.len(), 1);
    assert_eq!(popups[0].1, VisualState::Entering);
    assert_eq!(popups[0].2.position, PopupPosition::BottomLeft);

    engine.advance(ms(16));
    assert_eq!(engine.surface().popups()[0].1, VisualState::Visible);
    assert_eq!(
        engine.current_popup().map(|p| p.visual),
        Some(VisualState::Visible)
    );
}

#[test]
fn hide_runs_exit_animation_before_removal() {
    let mut engine = boot();
    engine.advance_to(secs(9));

    let popups = engine.surface().popups();
    assert_eq!(popups.len(), 1);
    assert_eq!(popups[0].1, VisualState::Exiting);
    assert!(engine.current_popup().is_none());

    engine.advance_to(ms(9299));
    assert_eq!(engine.surface().popup_count(), 1);
    engine.advance_to(ms(9300));
    assert_eq!(engine.surface().popup_count(), 0);
}

#[test]
fn feed_cycles_round_robin() {
    let mut engine = boot();
    let mut seen = Vec::new();
    // Shows at 5, 14, 23, 32, 41.
    for t in [5, 14, 23, 32, 41] {
        engine.advance_to(secs(t));
        seen.push(current_title(&engine).unwrap_or_default());
    }
    assert_eq!(seen, vec!["A", "B", "A", "B", "A"]);
}

#[test]
fn throttled_browser_never_sees_a_popup() {
    let mut engine = boot_with(MemoryStore::with_entry(DISMISSAL_STORAGE_KEY, "3"));
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
    assert_eq!(engine.pending_timers(), 0);

    engine.advance(secs(120));
    assert_eq!(mounted_count(&engine), 0);
    assert!(!engine.trigger_display());
}

#[test]
fn corrupt_dismissal_value_is_treated_as_zero() {
    let mut engine = boot_with(MemoryStore::with_entry(DISMISSAL_STORAGE_KEY, "lots"));
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);
    engine.advance_to(secs(5));
    assert!(engine.dismiss());
    assert_eq!(engine.dismissals().current_count(), 1);
}

#[test]
fn unknown_position_falls_back_to_bottom_left() {
    let raw = payload_with(
        json!({"popupEnabled": true, "popupPosition": "MIDDLE", "popupDelay": 1, "displayDuration": 1}),
        &["A"],
    );
    let mut engine =
        PopupEngine::boot(&raw, VirtualPage::blank(), MemoryStore::new(), &EngineOptions::default())
            .unwrap();
    assert_eq!(engine.settings().popup_position, PopupPosition::BottomLeft);

    engine.advance_to(secs(1));
    let html = engine
        .surface()
        .mutations()
        .iter()
        .find_map(|m| match m {
            Mutation::PopupMounted { html, .. } => Some(html.clone()),
            _ => None,
        })
        .unwrap();
    assert!(html.contains("sp-popup--bottom-left"));
}

#[test]
fn dismissal_records_once_and_hides() {
    let mut engine = boot();
    engine.advance_to(secs(6));

    assert!(engine.dismiss());
    assert_eq!(engine.dismissals().current_count(), 1);
    assert_eq!(engine.scheduler_state(), SchedulerState::Idle);

    // The popup is already leaving; a second click and the old auto-hide are inert.
    assert!(!engine.dismiss());
    engine.advance_to(secs(9));
    assert_eq!(engine.dismissals().current_count(), 1);
    assert_eq!(
        engine.dismissals().store().get(DISMISSAL_STORAGE_KEY).as_deref(),
        Some("1")
    );
}

#[test]
fn next_show_is_measured_from_dismissal() {
    let mut engine = boot();
    engine.advance_to(secs(6));
    engine.dismiss();

    engine.advance_to(ms(10999));
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);
    engine.advance_to(secs(11));
    assert_eq!(engine.scheduler_state(), SchedulerState::Showing);
    assert_eq!(current_title(&engine).as_deref(), Some("B"));
}

#[test]
fn auto_hide_never_counts_as_dismissal() {
    let mut engine = boot();
    engine.advance(secs(100));
    assert!(engine.scheduler().displayed_count() >= 10);
    assert_eq!(engine.dismissals().current_count(), 0);
    assert_eq!(engine.dismissals().store().get(DISMISSAL_STORAGE_KEY), None);
}

#[test]
fn dismiss_without_popup_is_inert() {
    let mut engine = boot();
    assert!(!engine.dismiss());
    assert_eq!(engine.dismissals().current_count(), 0);
}

#[test]
fn third_dismissal_stops_the_loop_within_one_cycle() {
    let mut engine = boot();

    for expected in 1..=3u32 {
        let deadline = engine.next_deadline().expect("loop still running");
        engine.advance_to(deadline);
        while engine.scheduler_state() != SchedulerState::Showing {
            let deadline = engine.next_deadline().expect("loop still running");
            engine.advance_to(deadline);
        }
        assert!(engine.dismiss());
        assert_eq!(engine.dismissals().current_count(), expected);
    }

    assert_eq!(engine.scheduler_state(), SchedulerState::Idle);
    engine.advance(ms(300));
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
    assert_eq!(engine.pending_timers(), 0);
    assert_eq!(engine.surface().popup_count(), 0);

    let mounted = mounted_count(&engine);
    engine.advance(secs(60));
    assert_eq!(mounted_count(&engine), mounted);
}

#[test]
fn dismissal_crossing_threshold_mid_run_stops() {
    let mut engine = boot_with(MemoryStore::with_entry(DISMISSAL_STORAGE_KEY, "2"));
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);

    engine.advance_to(secs(5));
    assert!(engine.dismiss());
    engine.advance(ms(300));
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn trigger_while_showing_replaces_popup() {
    let mut engine = boot();
    engine.advance_to(secs(5));
    let first = engine.current_popup().unwrap().element;

    assert!(engine.trigger_display());
    assert_eq!(engine.surface().popup_count(), 1);
    assert!(!engine.surface().contains(first));
    assert_eq!(current_title(&engine).as_deref(), Some("B"));
    assert_eq!(engine.scheduler_state(), SchedulerState::Showing);
}

#[test]
fn trigger_during_exit_removes_leaving_popup() {
    let mut engine = boot();
    engine.advance_to(ms(9100));
    assert_eq!(engine.surface().popups()[0].1, VisualState::Exiting);

    assert!(engine.trigger_display());
    let popups = engine.surface().popups();
    assert_eq!(popups.len(), 1);
    assert_eq!(popups[0].1, VisualState::Entering);

    // The cancelled exit never fires, so nothing removes the new popup early.
    engine.advance_to(ms(9400));
    assert_eq!(engine.surface().popup_count(), 1);
}

#[test]
fn rapid_triggers_keep_one_popup() {
    let mut engine = boot();
    for _ in 0..10 {
        engine.trigger_display();
        assert_eq!(engine.surface().popup_count(), 1);
    }
    // Only the newest popup's reveal and auto-hide remain.
    assert_eq!(engine.pending_timers(), 2);
}

#[test]
fn teardown_is_idempotent_and_leak_free() {
    let mut engine = boot();
    engine.advance_to(ms(5005));
    assert!(engine.pending_timers() > 0);

    engine.destroy();
    assert_eq!(engine.pending_timers(), 0);
    assert!(!engine.observer_armed());
    assert_eq!(engine.surface().popup_count(), 0);
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);

    engine.destroy();
    assert_eq!(engine.pending_timers(), 0);
    assert!(engine.is_destroyed());

    engine.advance(secs(60));
    assert_eq!(engine.surface().popup_count(), 0);
    assert!(!engine.trigger_display());
    assert!(!engine.dismiss());
}

#[test]
fn teardown_during_exit_removes_leaving_popup() {
    let mut engine = boot();
    engine.advance_to(ms(9100));
    engine.destroy();
    assert_eq!(engine.surface().popup_count(), 0);
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn missing_container_does_not_start() {
    let mut engine = PopupEngine::boot(
        &scenario_payload(),
        VirtualPage::without_container(),
        MemoryStore::new(),
        &EngineOptions::default(),
    )
    .unwrap();
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
    engine.advance(secs(30));
    assert_eq!(engine.surface().popup_count(), 0);
}

#[test]
fn empty_feed_exits_quietly() {
    let raw = payload_with(json!({"popupEnabled": true}), &[]);
    let engine =
        PopupEngine::boot(&raw, VirtualPage::blank(), MemoryStore::new(), &EngineOptions::default())
            .unwrap();
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn disabled_popups_stop_immediately() {
    let raw = payload_with(json!({"popupEnabled": false}), &["A"]);
    let engine =
        PopupEngine::boot(&raw, VirtualPage::blank(), MemoryStore::new(), &EngineOptions::default())
            .unwrap();
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
}

#[test]
fn unusable_payload_does_not_boot() {
    for raw in ["", "null", "{", r#"{"activities": []}"#, "[1,2]"] {
        let engine = PopupEngine::boot(
            raw,
            VirtualPage::blank(),
            MemoryStore::new(),
            &EngineOptions::default(),
        );
        assert!(engine.is_none(), "payload {:?}", raw);
    }
}

#[test]
fn dismissals_survive_reload() {
    let mut engine = boot();
    engine.advance_to(secs(5));
    engine.dismiss();
    engine.destroy();

    let (_, store) = engine.into_parts();
    let reloaded = boot_with(store);
    assert_eq!(reloaded.dismissals().current_count(), 1);
    assert_eq!(reloaded.scheduler_state(), SchedulerState::Waiting);
}

#[test]
fn file_store_throttles_across_visits() {
    let tmp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(tmp.path().to_path_buf());

    for _visit in 0..3 {
        let mut engine = PopupEngine::boot(
            &scenario_payload(),
            VirtualPage::blank(),
            FileStore::open(&storage),
            &EngineOptions::default(),
        )
        .unwrap();
        engine.advance_to(secs(5));
        assert!(engine.dismiss());
        engine.destroy();
    }

    let engine = PopupEngine::boot(
        &scenario_payload(),
        VirtualPage::blank(),
        FileStore::open(&storage),
        &EngineOptions::default(),
    )
    .unwrap();
    assert_eq!(engine.dismissals().current_count(), 3);
    assert_eq!(engine.scheduler_state(), SchedulerState::Stopped);
}

#[test]
fn options_override_exit_animation() {
    let options = EngineOptions {
        exit_animation_ms: 1000,
        ..Default::default()
    };
    let mut engine =
        PopupEngine::boot(&scenario_payload(), VirtualPage::blank(), MemoryStore::new(), &options)
            .unwrap();
    engine.advance_to(ms(9999));
    assert_eq!(engine.surface().popup_count(), 1);
    engine.advance_to(secs(10));
    assert_eq!(engine.surface().popup_count(), 0);
    // Delay still counts from the hide at 9s.
    engine.advance_to(secs(14));
    assert_eq!(current_title(&engine).as_deref(), Some("B"));
}

#[test]
fn zero_timings_still_advance() {
    let raw = payload_with(
        json!({"popupEnabled": true, "popupDelay": 0, "displayDuration": 0}),
        &["A", "B"],
    );
    let options = EngineOptions {
        exit_animation_ms: 0,
        ..Default::default()
    };
    let mut engine =
        PopupEngine::boot(&raw, VirtualPage::blank(), MemoryStore::new(), &options).unwrap();

    // One cycle per millisecond: shown and hidden at t, removed at t + 1ms.
    engine.advance(ms(10));
    assert_eq!(engine.now(), ms(10));
    assert!((10..=11).contains(&engine.scheduler().displayed_count()));
    assert!(engine.surface().popup_count() <= 1);

    engine.destroy();
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn popup_is_marked_removed_before_leaving_the_page() {
    let mut engine = boot();
    engine.advance_to(ms(9300));

    let mutations = engine.surface().mutations();
    let removed_at = mutations
        .iter()
        .position(|m| matches!(m, Mutation::Removed { .. }))
        .expect("popup removed after exit");
    let Mutation::Removed { element } = &mutations[removed_at] else {
        unreachable!()
    };
    assert_eq!(
        mutations[removed_at - 1],
        Mutation::PopupState {
            popup: *element,
            state: VisualState::Removed
        }
    );
}

#[test]
fn null_position_still_boots() {
    let raw = payload_with(
        json!({"popupEnabled": true, "popupPosition": null, "popupDelay": 5, "displayDuration": 4}),
        &["A"],
    );
    let mut engine =
        PopupEngine::boot(&raw, VirtualPage::blank(), MemoryStore::new(), &EngineOptions::default())
            .expect("null position is not fatal");
    assert_eq!(engine.settings().popup_position, PopupPosition::BottomLeft);
    engine.advance_to(secs(5));
    assert_eq!(engine.scheduler_state(), SchedulerState::Showing);
}

#[test]
fn bad_badge_inputs_leave_popups_running() {
    let raw = json!({
        "settings": {"popupEnabled": true, "counterEnabled": true, "popupDelay": 5, "displayDuration": 4},
        "activities": [activity("A", "Denver")],
        "pageType": "product",
        "productId": 12.5,
        "purchaseCount": -1
    })
    .to_string();
    let mut engine =
        PopupEngine::boot(&raw, VirtualPage::blank(), MemoryStore::new(), &EngineOptions::default())
            .expect("badge inputs are not fatal");
    assert_eq!(engine.scheduler_state(), SchedulerState::Waiting);
    assert_eq!(engine.surface().badge_count(), 0);

    engine.advance_to(secs(5));
    assert_eq!(current_title(&engine).as_deref(), Some("A"));
}
