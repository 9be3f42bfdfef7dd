//! Boundary events: subscriptions and firing.
//!
//! A [`BoundaryEvent`] pairs one [`BoundaryKind`] predicate with an ordered
//! subscriber list and the virtual instant it last fired at. The service
//! sweeps all five events (in [`BoundaryKind::ALL`] order) from its periodic
//! ticker and at the tail of every virtual-time mutation.

pub mod boundary;

pub use boundary::BoundaryKind;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::logging::LogBridge;

/// Subscriber callback, invoked with the virtual instant that fired.
pub type EventCallback = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

/// Identifier of one subscription within its event.
pub type SubscriptionId = u64;

struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
}

#[derive(Default)]
struct EventState {
    subscribers: Vec<Subscriber>,
    last_fired_at: Option<DateTime<Utc>>,
    next_id: SubscriptionId,
}

/// One boundary detector with its subscriber list.
pub struct BoundaryEvent {
    kind: BoundaryKind,
    state: Mutex<EventState>,
    log: LogBridge,
}

impl BoundaryEvent {
    pub fn new(kind: BoundaryKind, log: LogBridge) -> Self {
        Self {
            kind,
            state: Mutex::new(EventState::default()),
            log,
        }
    }

    pub fn kind(&self) -> BoundaryKind {
        self.kind
    }

    /// Register a callback. Subscribers are notified in registration order.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push(Subscriber { id, callback });
        id
    }

    /// Remove one subscription. Unknown ids are a no-op, so revoking twice
    /// is safe.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id != id);
        state.subscribers.len() != before
    }

    /// Drop every subscriber.
    pub fn clear(&self) {
        self.state.lock().subscribers.clear();
    }

    pub fn has_subscribers(&self) -> bool {
        !self.state.lock().subscribers.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Set the firing anchor without notifying anyone. Called at service
    /// initialization and reset so that no boundary is crossed
    /// retroactively.
    pub fn initialize(&self, current: DateTime<Utc>) {
        self.state.lock().last_fired_at = Some(current);
    }

    pub fn last_fired_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_fired_at
    }

    /// Evaluate the predicate against `current` and notify subscribers when
    /// it fires. Returns whether it fired.
    ///
    /// `last_fired_at` is advanced before any callback runs, so a re-entrant
    /// read from a callback observes the event as already fired. Callbacks
    /// run outside the lock and may themselves subscribe or unsubscribe; a
    /// panicking callback is caught and logged and never interrupts the
    /// remaining notifications.
    pub fn check_and_trigger(&self, current: DateTime<Utc>) -> bool {
        let callbacks: Vec<EventCallback> = {
            let mut state = self.state.lock();
            if state.subscribers.is_empty() {
                return false;
            }
            let prev = state.last_fired_at.unwrap_or(current);
            if !self.kind.should_fire(prev, current) {
                return false;
            }
            state.last_fired_at = Some(current);
            state.subscribers.iter().map(|s| s.callback.clone()).collect()
        };

        self.log
            .debug(&format!("{} fired at {current}", self.kind));
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(current))).is_err() {
                self.log
                    .error(&format!("{} subscriber panicked; continuing", self.kind));
            }
        }
        true
    }
}

impl std::fmt::Debug for BoundaryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryEvent")
            .field("kind", &self.kind)
            .field("subscribers", &self.subscriber_count())
            .field("last_fired_at", &self.last_fired_at())
            .finish()
    }
}

// ============================================================================
// Subscription handle
// ============================================================================

/// Revokes exactly one subscription when consumed.
///
/// Like a timer handle, the subscription is intentionally not `Clone`:
/// ownership models the exclusive right to revoke. Dropping the handle
/// without calling [`revoke`](Subscription::revoke) leaves the subscription
/// active for the lifetime of the service.
pub struct Subscription {
    event: Arc<BoundaryEvent>,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(event: Arc<BoundaryEvent>, id: SubscriptionId) -> Self {
        Self { event, id }
    }

    pub fn kind(&self) -> BoundaryKind {
        self.event.kind()
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription. Returns `false` when it was already gone
    /// (e.g. removed by `clear()`).
    pub fn revoke(self) -> bool {
        self.event.unsubscribe(self.id)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.event.kind())
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// EventSet
// ============================================================================

/// The five boundary events in their fixed evaluation order.
pub struct EventSet {
    events: Vec<Arc<BoundaryEvent>>,
}

impl EventSet {
    pub fn new(log: LogBridge) -> Self {
        Self {
            events: BoundaryKind::ALL
                .iter()
                .map(|kind| Arc::new(BoundaryEvent::new(*kind, log.clone())))
                .collect(),
        }
    }

    pub fn get(&self, kind: BoundaryKind) -> &Arc<BoundaryEvent> {
        // ALL and the constructor share the same ordering.
        let idx = BoundaryKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &self.events[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BoundaryEvent>> {
        self.events.iter()
    }

    /// Anchor every detector at `current` without firing.
    pub fn initialize_all(&self, current: DateTime<Utc>) {
        for event in &self.events {
            event.initialize(current);
        }
    }

    /// Evaluate every detector with subscribers against `current`, in fixed
    /// order. Returns how many fired.
    pub fn sweep(&self, current: DateTime<Utc>) -> usize {
        self.events
            .iter()
            .filter(|event| event.check_and_trigger(current))
            .count()
    }

    /// Drop all subscribers from all detectors.
    pub fn clear_all(&self) {
        for event in &self.events {
            event.clear();
        }
    }
}

impl std::fmt::Debug for EventSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.events.iter()).finish()
    }
}
