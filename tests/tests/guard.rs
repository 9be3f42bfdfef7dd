//! HTTP guard behavior through a live service.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chronoshift::{ClockConfig, GuardAction, HttpPolicy, MemoryKvStore};
use chronoshift_testing::service_with;
use parking_lot::Mutex;

#[tokio::test]
async fn real_time_mode_never_blocks() {
    let service = service_with(
        ClockConfig::new()
            .with_http_policy(HttpPolicy::Block)
            .block_pattern("*"),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    assert!(service.is_allowed("/anything/at/all"));
}

#[tokio::test]
async fn default_block_policy_denies_with_rate_reason() {
    let service = service_with(
        ClockConfig::new().with_rate(100),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    let verdict = service.guard("/api/refresh");
    assert_eq!(verdict.action, GuardAction::Block);
    assert!(verdict.reason.unwrap().contains("rate=100x"));
}

#[tokio::test]
async fn denied_callback_sees_path_and_reason() {
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);

    let service = service_with(
        ClockConfig::new()
            .with_rate(50)
            .with_http_policy(HttpPolicy::Block)
            .with_denied_callback(Arc::new(move |path, reason| {
                seen_clone.lock().push((path.to_string(), reason.to_string()));
            })),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    service.guard("/jobs/poll");
    let entries = seen.lock();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "/jobs/poll");
    assert!(entries[0].1.contains("accelerated mode active"));
}

#[tokio::test]
async fn throttle_budget_is_shared_across_paths_and_resettable() {
    let service = service_with(
        ClockConfig::new()
            .with_rate(100)
            .with_http_policy(HttpPolicy::Throttle)
            .with_throttle_limit(2),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    assert!(service.guard("/a").is_allowed());
    assert!(service.guard("/b").is_allowed());
    assert_eq!(service.guard("/c").action, GuardAction::Throttle);

    service.reset_throttle();
    assert!(service.guard("/d").is_allowed());
}

#[tokio::test]
async fn explicit_allows_bypass_the_throttle_budget() {
    let service = service_with(
        ClockConfig::new()
            .with_rate(100)
            .with_http_policy(HttpPolicy::Throttle)
            .with_throttle_limit(1)
            .allow_pattern("/health"),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    // Pattern-allowed requests never touch the budget.
    for _ in 0..5 {
        assert!(service.guard("/health").is_allowed());
    }
    assert!(service.guard("/data").is_allowed());
    assert_eq!(service.guard("/data").action, GuardAction::Throttle);
}

#[tokio::test]
async fn globs_treat_metacharacters_literally() {
    let service = service_with(
        ClockConfig::new()
            .with_rate(100)
            .with_http_policy(HttpPolicy::Block)
            .allow_pattern("/api/v1.2/test")
            .allow_pattern("/files/report-?.pdf"),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    assert!(service.is_allowed("/api/v1.2/test"));
    assert!(!service.is_allowed("/api/v1X2/test"));
    assert!(service.is_allowed("/files/report-7.pdf"));
    assert!(!service.is_allowed("/files/report-10.pdf"));
}

#[tokio::test]
async fn denials_count_blocks_and_throttles() {
    let denials = Arc::new(AtomicUsize::new(0));
    let denials_clone = Arc::clone(&denials);

    let service = service_with(
        ClockConfig::new()
            .with_rate(100)
            .with_http_policy(HttpPolicy::Throttle)
            .with_throttle_limit(1)
            .block_pattern("/admin/*")
            .with_denied_callback(Arc::new(move |_, _| {
                denials_clone.fetch_add(1, Ordering::SeqCst);
            })),
        Arc::new(MemoryKvStore::new()),
    )
    .await;

    service.guard("/admin/users"); // block
    service.guard("/feed"); // allow, consumes the budget
    service.guard("/feed"); // throttle
    assert_eq!(denials.load(Ordering::SeqCst), 2);
}
