//! Boundary event behavior under time jumps.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration as TimeDelta, TimeZone, Utc};
use chronoshift::BoundaryKind;
use chronoshift_testing::accelerated_service;
use parking_lot::Mutex;

#[tokio::test]
async fn simultaneous_boundaries_deliver_in_fixed_order() {
    let service = accelerated_service(0).await;
    // Park the clock just before a Sunday -> Monday noon crossing, then
    // subscribe so the parking jump itself is not recorded.
    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 16, 11, 59, 0).unwrap());

    let order: Arc<Mutex<Vec<BoundaryKind>>> = Arc::new(Mutex::new(Vec::new()));
    let mut subs = Vec::new();
    for kind in BoundaryKind::ALL {
        let order = Arc::clone(&order);
        subs.push(service.subscribe(kind, Arc::new(move |_| order.lock().push(kind))));
    }

    // Monday 12:01 crosses hour, noon, day, week-start, and week-end at once.
    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 17, 12, 1, 0).unwrap());
    assert_eq!(*order.lock(), BoundaryKind::ALL.to_vec());
}

#[tokio::test]
async fn overshooting_noon_fires_exactly_once_for_the_landing_day() {
    let service = accelerated_service(0).await;
    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 15, 14, 0, 0).unwrap());

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    let _sub = service.on_noon(Arc::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    }));

    // Two days ahead, landing well past noon.
    service.fast_forward(TimeDelta::hours(49));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Checking again without movement stays quiet.
    service.trigger_event_check();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn landing_before_noon_on_a_later_day_does_not_fire() {
    let service = accelerated_service(0).await;
    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 15, 14, 0, 0).unwrap());

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    let _sub = service.on_noon(Arc::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    }));

    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 17, 9, 0, 0).unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn week_end_fires_on_seven_day_jump_within_matching_weekdays() {
    let service = accelerated_service(0).await;
    // Tuesday.
    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 11, 9, 0, 0).unwrap());

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    let _sub = service.on_week_end(Arc::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    }));

    service.fast_forward(TimeDelta::days(7));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rewinds_never_fire_and_do_not_poison_future_checks() {
    let service = accelerated_service(0).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    let _sub = service.on_new_day(Arc::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    }));

    // The jump into 2030 is itself a new day.
    service.time_travel_to(Utc.with_ymd_and_hms(2030, 6, 15, 23, 0, 0).unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Rewinding ten days fires nothing.
    service.fast_forward(TimeDelta::days(-10));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // The detector keeps its pre-rewind anchor, so only movement past it
    // fires again.
    service.fast_forward(TimeDelta::days(11));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reset_rearms_detectors_without_retroactive_fires() {
    let service = accelerated_service(0).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    let _sub = service.on_new_day(Arc::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    }));

    service.time_travel_to(Utc.with_ymd_and_hms(2035, 1, 1, 8, 0, 0).unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Reset jumps the clock back to real time; the detectors re-arm there
    // instead of treating the rewind as history.
    service.reset().await;
    service.trigger_event_check();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subscription_handles_and_counts_track_subscribers() {
    let service = accelerated_service(0).await;
    let event = service.event(BoundaryKind::NewHour);
    assert!(!event.has_subscribers());

    let first = service.on_new_hour(Arc::new(|_| {}));
    let second = service.on_new_hour(Arc::new(|_| {}));
    assert_eq!(event.subscriber_count(), 2);

    assert!(first.revoke());
    assert_eq!(event.subscriber_count(), 1);

    event.clear();
    assert!(!second.revoke());
    assert_eq!(event.subscriber_count(), 0);
}
