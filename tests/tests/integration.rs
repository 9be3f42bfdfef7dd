//! End-to-end scenarios for the virtual clock service.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration as TimeDelta, TimeZone, Utc};
use chronoshift::{
    ClockConfig, ClockError, ClockService, HttpPolicy, LogLevel, MemoryKvStore,
};
use chronoshift_testing::{FailingKvStore, RecordingSink, accelerated_service, service_with};
use tokio::time::{Duration, sleep};

#[tokio::test]
async fn accelerated_clock_advances_from_travel_target() {
    let service = accelerated_service(100).await;
    let target = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap();
    service.time_travel_to(target);

    // 20 real milliseconds at 100x is at least 2 virtual seconds.
    sleep(Duration::from_millis(20)).await;
    let now = service.now();
    assert!(now >= target + TimeDelta::seconds(1), "virtual time lagged: {now}");
    assert!(now < target + TimeDelta::minutes(2), "virtual time overshot: {now}");
}

#[tokio::test]
async fn travel_near_hour_boundary_then_fast_forward_fires_new_hour() {
    let service = accelerated_service(100).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    let _sub = service.on_new_hour(Arc::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    }));

    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 15, 9, 59, 50).unwrap());
    service.fast_forward(TimeDelta::minutes(2));
    service.trigger_event_check();

    assert!(fired.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn throttle_policy_allows_three_then_denies() {
    let service = service_with(
        ClockConfig::new()
            .with_rate(100)
            .with_http_policy(HttpPolicy::Throttle)
            .with_throttle_limit(3),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    for i in 0..3 {
        assert!(service.guard("/a").is_allowed(), "request {i} should pass");
    }
    let verdict = service.guard("/a");
    assert!(!verdict.is_allowed());
    assert!(verdict.reason.unwrap().contains("Throttle limit"));
}

#[tokio::test]
async fn pattern_precedence_blocks_admin_inside_allowed_api() {
    let service = service_with(
        ClockConfig::new()
            .with_rate(100)
            .with_http_policy(HttpPolicy::Allow)
            .allow_pattern("/api/*")
            .block_pattern("/api/admin*"),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    assert!(service.guard("/api/users").is_allowed());
    assert!(!service.guard("/api/admin/delete").is_allowed());
}

#[tokio::test]
async fn production_guard_accepts_rate_one_and_rejects_acceleration() {
    let ok = ClockService::new(
        ClockConfig::new().with_rate(1).production(),
        Arc::new(MemoryKvStore::new()),
    );
    ok.initialize().await.unwrap();
    assert!(ok.is_initialized());

    let bad = ClockService::new(
        ClockConfig::new().with_rate(100).production(),
        Arc::new(MemoryKvStore::new()),
    );
    let err = bad.initialize().await.unwrap_err();
    assert!(matches!(err, ClockError::ProductionViolation(100)));
}

#[tokio::test]
async fn paused_clock_is_exact_and_resume_moves_forward() {
    let service = accelerated_service(100).await;
    service.pause();
    let frozen = service.now();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(service.now(), frozen, "paused clock drifted");

    service.resume();
    sleep(Duration::from_millis(10)).await;
    assert!(service.now() > frozen);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persisted_anchor_survives_restart_with_same_version() {
    let kv: Arc<MemoryKvStore> = Arc::new(MemoryKvStore::new());
    let target = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap();

    let first = service_with(
        ClockConfig::new().with_app_version("1.0.0"),
        Arc::clone(&kv) as Arc<dyn chronoshift::KvStore>,
    )
    .await;
    first.time_travel_to(target);
    // The travel persists its anchor off-thread.
    sleep(Duration::from_millis(50)).await;
    first.dispose();

    let second = service_with(
        ClockConfig::new().with_app_version("1.0.0"),
        Arc::clone(&kv) as Arc<dyn chronoshift::KvStore>,
    )
    .await;
    let drift = second.now() - target;
    assert!(drift >= TimeDelta::zero());
    assert!(drift < TimeDelta::minutes(1), "restored anchor drifted: {drift}");
}

#[tokio::test]
async fn changed_app_version_discards_persisted_anchor() {
    let kv: Arc<MemoryKvStore> = Arc::new(MemoryKvStore::new());
    let target = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap();

    let first = service_with(
        ClockConfig::new().with_app_version("1.0.0"),
        Arc::clone(&kv) as Arc<dyn chronoshift::KvStore>,
    )
    .await;
    first.time_travel_to(target);
    sleep(Duration::from_millis(50)).await;
    first.dispose();

    let second = service_with(
        ClockConfig::new().with_app_version("2.0.0"),
        Arc::clone(&kv) as Arc<dyn chronoshift::KvStore>,
    )
    .await;
    // The 2030 anchor is gone; the clock restarts at real time.
    let drift = (second.now() - Utc::now()).num_seconds().abs();
    assert!(drift < 60, "expected a fresh anchor, drifted {drift}s");
}

#[tokio::test]
async fn clear_all_state_removes_persisted_keys() {
    let kv: Arc<MemoryKvStore> = Arc::new(MemoryKvStore::new());
    let service = service_with(
        ClockConfig::new().with_app_version("1.0.0"),
        Arc::clone(&kv) as Arc<dyn chronoshift::KvStore>,
    )
    .await;

    assert!(!kv.is_empty());
    service.clear_all_state().await.unwrap();
    assert!(kv.is_empty());
    // Live state is untouched.
    assert!(service.is_initialized());
}

#[tokio::test]
async fn failing_store_does_not_destabilize_the_clock() {
    let service = service_with(
        ClockConfig::new().with_rate(100),
        Arc::new(FailingKvStore),
    )
    .await;

    let target = Utc.with_ymd_and_hms(2031, 2, 3, 4, 5, 6).unwrap();
    service.time_travel_to(target);
    sleep(Duration::from_millis(20)).await;

    let now = service.now();
    assert!(now >= target);
    assert!(now < target + TimeDelta::minutes(2));
    // Explicit persistence calls do surface the fault.
    assert!(service.clear_all_state().await.is_err());
}

// ---------------------------------------------------------------------------
// Configuration coercions observed through the log sink
// ---------------------------------------------------------------------------

#[tokio::test]
async fn out_of_range_config_rate_coerces_to_one_with_warning() {
    let sink = RecordingSink::new();
    let sink_clone = Arc::clone(&sink);
    let service = service_with(
        ClockConfig::new()
            .with_rate(1_000_000)
            .with_log_sink(Arc::new(move |msg, level| sink_clone.record(msg, level))),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    assert_eq!(service.clock_rate(), 1);
    assert!(sink.contains("out of range"));
    assert!(
        sink.entries()
            .iter()
            .any(|(_, level)| *level == LogLevel::Warn)
    );
}

#[tokio::test]
async fn change_notifications_cover_every_mutation() {
    let service = accelerated_service(10).await;
    let mut changes = service.subscribe_changes();

    let target = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    service.time_travel_to(target);
    service.fast_forward(TimeDelta::hours(1));
    service.pause();
    service.resume();
    service.set_rate(20).unwrap();
    service.reset().await;

    use chronoshift::ClockChange;
    assert_eq!(changes.recv().await.unwrap(), ClockChange::TimeTravelled(target));
    assert!(matches!(changes.recv().await.unwrap(), ClockChange::FastForwarded(_)));
    assert_eq!(changes.recv().await.unwrap(), ClockChange::Paused);
    assert_eq!(changes.recv().await.unwrap(), ClockChange::Resumed);
    assert_eq!(changes.recv().await.unwrap(), ClockChange::RateChanged(20));
    assert_eq!(changes.recv().await.unwrap(), ClockChange::Reset);
}
