//! Contract Test: Transition Detection & History
//!
//! Constraints verified:
//! - Only status changes are recorded; first observations are silent
//! - Replaying an identical snapshot records and sends nothing
//! - Resources sharing a location under one rule are tracked apart
//! - Notifications per key = observed status changes - 1
//! - History per key stays bounded with no equal adjacent records
//! - A failing channel never blocks history or other rules
//! - History survives restarts through the file store and config seeding
//!
//! If this test fails, users get spurious or missing notifications.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::*;
use stockwatch_core::{
    EngineConfig, FileHistoryStore, HISTORY_LIMIT, HistoryStore, MonitorEvent, TransitionRecord,
    WatchRule,
};
use tokio_test::assert_ok;

#[tokio::test]
async fn single_location_change_records_and_notifies_once() {
    let source = ScriptedSource::new();
    let channel = RecordingChannel::new();
    let (monitor, _events, store) = monitor(&source, &channel);

    assert_ok!(
        monitor
            .configure(config(vec![WatchRule::new("w1").with_identifier("X")]))
            .await
    );

    source.push_ok(vec![resource("X", &[("A", "unavailable"), ("B", "available")])]);
    let first = monitor.trigger().await.unwrap();
    assert_eq!(first.transitions, 2, "first observations are recorded");
    assert_eq!(first.notifications_sent, 0, "first observations are silent");

    source.push_ok(vec![resource("X", &[("A", "available"), ("B", "available")])]);
    let second = monitor.trigger().await.unwrap();
    assert_eq!(second.transitions, 1);
    assert_eq!(second.notifications_sent, 1);

    assert_eq!(store.history("w1", "A").await.unwrap().len(), 2);
    assert_eq!(store.history("w1", "B").await.unwrap().len(), 1);

    let messages = channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("*Datacenter:* A"));
    assert!(messages[0].contains("unavailable → available"));
}

#[tokio::test]
async fn identical_snapshot_replay_is_idempotent() {
    let snapshot = vec![
        resource("X", &[("gra1", "available"), ("bhs1", "72H")]),
        resource("Y", &[("gra2", "unavailable")]),
    ];
    let source = ScriptedSource::serving(snapshot);
    let channel = RecordingChannel::new();
    let (monitor, _events, _store) = monitor(&source, &channel);

    monitor
        .configure(config(vec![
            WatchRule::new("x-only").with_identifier("X"),
            WatchRule::new("gra").with_location("GRA"),
        ]))
        .await
        .unwrap();

    let first = monitor.trigger().await.unwrap();
    assert_eq!(first.transitions, 4);

    let replay = monitor.trigger().await.unwrap();
    assert_eq!(replay.transitions, 0);
    assert_eq!(replay.notifications_sent + replay.notifications_failed, 0);
    assert_eq!(channel.attempts(), 0);
}

#[tokio::test]
async fn resources_sharing_a_location_are_tracked_apart() {
    let source = ScriptedSource::serving(vec![
        resource("X", &[("gra1", "available")]),
        resource("Y", &[("gra1", "unavailable")]),
    ]);
    let channel = RecordingChannel::new();
    let (monitor, _events, store) = monitor(&source, &channel);

    monitor
        .configure(config(vec![WatchRule::new("gra").with_location("gra")]))
        .await
        .unwrap();

    let first = monitor.trigger().await.unwrap();
    assert_eq!(first.transitions, 2);
    assert_eq!(first.notifications_sent, 0);

    for _ in 0..2 {
        let replay = monitor.trigger().await.unwrap();
        assert_eq!(replay.transitions, 0, "replay must not alternate between resources");
        assert_eq!(replay.notifications_sent + replay.notifications_failed, 0);
    }
    assert_eq!(channel.attempts(), 0);

    assert_eq!(store.history("gra", "X/gra1").await.unwrap().len(), 1);
    assert_eq!(store.history("gra", "Y/gra1").await.unwrap().len(), 1);
    assert!(store.history("gra", "gra1").await.unwrap().is_empty());

    // One product flips: exactly one notification, naming that product
    source.set_fallback(vec![
        resource("X", &[("gra1", "available")]),
        resource("Y", &[("gra1", "available")]),
    ]);
    let flip = monitor.trigger().await.unwrap();
    assert_eq!(flip.transitions, 1);
    assert_eq!(flip.notifications_sent, 1);
    assert_eq!(channel.messages().len(), 1);
    assert!(channel.messages()[0].contains("unavailable → available"));

    let rules = monitor.rules().await.unwrap();
    assert_eq!(rules[0].history["Y/gra1"].len(), 2);
    assert_eq!(rules[0].history["Y/gra1"].last().unwrap().location, "gra1");
}

#[tokio::test]
async fn notification_count_is_changes_minus_one() {
    let statuses = [
        "unavailable", "unavailable", "available", "available", "120H", "unavailable",
        "unavailable", "available",
    ];
    let source = ScriptedSource::new();
    for status in statuses {
        source.push_ok(vec![resource("X", &[("gra1", status)])]);
    }
    let channel = RecordingChannel::new();
    let (monitor, _events, store) = monitor(&source, &channel);
    monitor.configure(config(vec![WatchRule::new("w1")])).await.unwrap();

    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for i in 0..statuses.len() {
        monitor.trigger_at(base + Duration::minutes(i as i64)).await.unwrap();
    }

    // unavailable -> available -> 120H -> unavailable -> available
    let distinct_runs = 5;
    assert_eq!(store.history("w1", "X/gra1").await.unwrap().len(), distinct_runs);
    assert_eq!(channel.delivered(), distinct_runs - 1);
}

#[tokio::test]
async fn history_is_bounded_and_never_repeats() {
    let source = ScriptedSource::new();
    let channel = RecordingChannel::new();
    let (monitor, _events, store) = monitor(&source, &channel);
    monitor.configure(config(vec![WatchRule::new("w1")])).await.unwrap();

    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for i in 0..40 {
        // Every third cycle repeats the previous status
        let status = if (i / 3) % 2 == 0 { "available" } else { "unavailable" };
        source.push_ok(vec![resource("X", &[("gra1", status)])]);
        monitor.trigger_at(base + Duration::minutes(i)).await.unwrap();
    }

    let history = store.history("w1", "X/gra1").await.unwrap();
    assert_eq!(history.len(), HISTORY_LIMIT);
    for pair in history.windows(2) {
        assert_ne!(pair[0].status, pair[1].status, "adjacent records must differ");
        assert!(pair[0].timestamp <= pair[1].timestamp, "timestamps must not decrease");
    }
}

#[tokio::test]
async fn disabled_rules_are_ignored() {
    let source = ScriptedSource::serving(vec![resource("X", &[("gra1", "available")])]);
    let channel = RecordingChannel::new();
    let (monitor, _events, store) = monitor(&source, &channel);

    monitor
        .configure(config(vec![WatchRule::new("off").with_enabled(false)]))
        .await
        .unwrap();
    let report = monitor.trigger().await.unwrap();

    assert_eq!(report.transitions, 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn failing_channel_does_not_block_the_cycle() {
    let source = ScriptedSource::new();
    let channel = RecordingChannel::with_behavior(ChannelBehavior::Fail);
    let (monitor, mut events, store) = monitor(&source, &channel);

    monitor
        .configure(config(vec![
            WatchRule::new("first").with_identifier("X"),
            WatchRule::new("second").with_identifier("Y"),
        ]))
        .await
        .unwrap();

    source.push_ok(vec![
        resource("X", &[("gra1", "unavailable")]),
        resource("Y", &[("bhs1", "unavailable")]),
    ]);
    monitor.trigger().await.unwrap();

    source.push_ok(vec![
        resource("X", &[("gra1", "available")]),
        resource("Y", &[("bhs1", "available")]),
    ]);
    let report = monitor.trigger().await.unwrap();

    assert_eq!(report.transitions, 2);
    assert_eq!(report.notifications_failed, 2);
    assert_eq!(channel.attempts(), 2, "both rules were processed");

    // History advanced and the notification time was stamped despite failure
    assert_eq!(store.history("second", "bhs1").await.unwrap().len(), 2);
    let rule = store.rule_history("first").await.unwrap().unwrap();
    assert!(rule.last_notification.is_some());

    let failures = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::NotificationFailed { .. }))
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn rejected_and_undeliverable_notifications_still_record_history() {
    let source = ScriptedSource::new();
    let channel = RecordingChannel::with_behavior(ChannelBehavior::Reject);
    let (monitor, _events, store) = monitor(&source, &channel);

    let mut cfg = config(vec![WatchRule::new("w1")]);
    monitor.configure(cfg.clone()).await.unwrap();

    source.push_ok(vec![resource("X", &[("gra1", "unavailable")])]);
    monitor.trigger().await.unwrap();
    source.push_ok(vec![resource("X", &[("gra1", "available")])]);
    let rejected = monitor.trigger().await.unwrap();
    assert_eq!(rejected.notifications_failed, 1);

    // Disabled channel: nothing is attempted, history still moves
    cfg.channel.enabled = false;
    monitor.configure(cfg).await.unwrap();
    source.push_ok(vec![resource("X", &[("gra1", "unavailable")])]);
    let skipped = monitor.trigger().await.unwrap();
    assert_eq!(skipped.transitions, 1);
    assert_eq!(skipped.notifications_failed, 1);
    assert_eq!(channel.attempts(), 1);
    assert_eq!(store.history("w1", "X/gra1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn file_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let channel = RecordingChannel::new();
    let cfg = config(vec![WatchRule::new("w1").with_identifier("X")]);

    {
        let source = ScriptedSource::serving(vec![resource("X", &[("gra1", "unavailable")])]);
        let store = FileHistoryStore::new(&path).await.unwrap();
        let (monitor, _events) =
            monitor_with_store(&source, &channel, Box::new(store), EngineConfig::default());
        monitor.configure(cfg.clone()).await.unwrap();
        monitor.trigger().await.unwrap();
        monitor.shutdown().await.unwrap();
    }

    let source = ScriptedSource::serving(vec![resource("X", &[("gra1", "available")])]);
    let store = FileHistoryStore::new(&path).await.unwrap();
    let (monitor, _events) =
        monitor_with_store(&source, &channel, Box::new(store), EngineConfig::default());
    monitor.configure(cfg).await.unwrap();

    let report = monitor.trigger().await.unwrap();
    assert_eq!(report.notifications_sent, 1, "change across restart is notified");
}

#[tokio::test]
async fn history_carried_in_config_seeds_the_store() {
    let source = ScriptedSource::serving(vec![resource("X", &[("gra1", "available")])]);
    let channel = RecordingChannel::new();
    let (monitor, _events, _store) = monitor(&source, &channel);

    let mut rule = WatchRule::new("w1").with_identifier("X");
    rule.history.entry("gra1".to_string()).or_default().record(TransitionRecord::new(
        "gra1",
        "unavailable",
        Utc::now() - Duration::hours(2),
    ));
    monitor.configure(config(vec![rule])).await.unwrap();

    let report = monitor.trigger().await.unwrap();
    assert_eq!(report.notifications_sent, 1);
    assert!(channel.messages()[0].contains("Since last change: 2h"));

    let rules = monitor.rules().await.unwrap();
    assert_eq!(rules[0].history["gra1"].len(), 2);
    assert!(rules[0].last_notification.is_some());
}

#[tokio::test]
async fn removed_rules_lose_their_history() {
    let source = ScriptedSource::serving(vec![resource("X", &[("gra1", "available")])]);
    let channel = RecordingChannel::new();
    let (monitor, _events, store) = monitor(&source, &channel);

    monitor
        .configure(config(vec![WatchRule::new("keep"), WatchRule::new("drop")]))
        .await
        .unwrap();
    monitor.trigger().await.unwrap();

    monitor.configure(config(vec![WatchRule::new("keep")])).await.unwrap();
    let mut rules = store.list_rules().await.unwrap();
    rules.sort();
    assert_eq!(rules, vec!["keep".to_string()]);
}
