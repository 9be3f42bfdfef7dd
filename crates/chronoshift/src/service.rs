//! Clock service orchestrator.
//!
//! [`ClockService`] owns every subsystem — the time transform, the five
//! boundary events, the HTTP guard, the persistence wrapper, and the
//! periodic event-check ticker — and exposes the public mutation surface.
//!
//! Time mutations (`time_travel_to`, `fast_forward`, `pause`, `resume`,
//! `set_rate`) are synchronous and non-blocking: state updates happen under
//! a short-lived lock and persistence writes are fire-and-forget. Only
//! `initialize`, `reset`, `clear_all_state`, and `wait` suspend.
//!
//! Every observable state change is broadcast as a [`ClockChange`] so hosts
//! can rebind UI state off a single signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration as TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::time::{MissedTickBehavior, interval};

use crate::config::{ClockConfig, MAX_CLOCK_RATE};
use crate::error::{ClockError, ClockResult};
use crate::events::{BoundaryEvent, BoundaryKind, EventCallback, EventSet, Subscription};
use crate::guard::{GuardVerdict, HttpGuard};
use crate::logging::LogBridge;
use crate::store::{ClockStore, KvStore};
use crate::timer::{self, DelayedCallback, PeriodicCallback, TimerHandle};
use crate::transform::{ClockState, TimeTransform};

/// Buffered change notifications per receiver. A lagging receiver skips
/// intermediate values; it never blocks a mutation.
const CHANGE_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// ClockChange / ClockSnapshot
// ============================================================================

/// One observable state change, broadcast at the tail of each mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ClockChange {
    Initialized,
    /// Carries the virtual instant that was jumped to.
    TimeTravelled(DateTime<Utc>),
    /// Carries the virtual instant that was landed on.
    FastForwarded(DateTime<Utc>),
    Paused,
    Resumed,
    /// Carries the rate that is now in effect.
    RateChanged(u32),
    Reset,
}

/// Serializable point-in-time view of the service, for host debug UIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub initialized: bool,
    pub production: bool,
    pub rate: u32,
    pub state: ClockState,
    pub now: DateTime<Utc>,
    pub base_real: DateTime<Utc>,
    pub base_virtual: DateTime<Utc>,
    pub last_event_check: Option<DateTime<Utc>>,
}

// ============================================================================
// ClockService
// ============================================================================

/// The virtual clock: time transform, boundary events, HTTP guard, timers,
/// and persistence behind one handle.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use chronoshift::{ClockConfig, ClockService, MemoryKvStore};
///
/// let service = ClockService::new(
///     ClockConfig::new().with_rate(100),
///     Arc::new(MemoryKvStore::new()),
/// );
/// service.initialize().await?;
///
/// let _sub = service.on_new_day(Arc::new(|day| println!("new day: {day}")));
/// service.fast_forward(chrono::Duration::days(1));
/// ```
pub struct ClockService {
    config: ClockConfig,
    log: LogBridge,
    /// Back-reference handed to the ticker task so it can sweep without
    /// keeping the service alive.
    weak_self: Weak<ClockService>,
    transform: Mutex<TimeTransform>,
    events: EventSet,
    guard: HttpGuard,
    store: ClockStore,
    changes: broadcast::Sender<ClockChange>,
    /// Cancel handle of the running ticker task. Replacing or dropping the
    /// sender stops the task.
    ticker: Mutex<Option<oneshot::Sender<()>>>,
    initialized: AtomicBool,
    last_event_check: Mutex<Option<DateTime<Utc>>>,
}

impl ClockService {
    /// Build a service around the given configuration and store backend.
    /// No state is loaded and no tasks run until [`initialize`](Self::initialize).
    pub fn new(config: ClockConfig, kv: Arc<dyn KvStore>) -> Arc<Self> {
        let log = LogBridge::new(config.log_sink.clone());
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            guard: HttpGuard::from_config(&config, log.clone()),
            events: EventSet::new(log.clone()),
            store: ClockStore::new(kv, log.clone()),
            transform: Mutex::new(TimeTransform::new(Utc::now())),
            changes,
            ticker: Mutex::new(None),
            initialized: AtomicBool::new(false),
            last_event_check: Mutex::new(None),
            log,
            config,
        })
    }

    /// Validate the configured rate, apply environment guards, load the
    /// persisted anchor, arm the detectors, and start the event ticker.
    ///
    /// # Errors
    ///
    /// [`ClockError::ProductionViolation`] when the configuration carries a
    /// rate other than 1 together with `is_production`. Persistence failures
    /// are logged and swallowed.
    pub async fn initialize(&self) -> ClockResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            self.log.warn("initialize called on an initialized clock; ignoring");
            return Ok(());
        }

        let rate = effective_rate(
            self.config.clock_rate,
            self.config.is_production,
            self.config.force_enable,
            cfg!(debug_assertions),
            &self.log,
        )?;

        let real_now = Utc::now();
        let restored = self.store.load_base(self.config.app_version.as_deref()).await;
        let base_virtual = {
            let mut transform = self.transform.lock();
            *transform = match restored {
                Some(base) => TimeTransform::restored(base, rate, real_now),
                None => TimeTransform::with_rate(rate, real_now),
            };
            transform.base_virtual()
        };

        if let Err(e) = self
            .store
            .persist(base_virtual, self.config.app_version.as_deref())
            .await
        {
            self.log.warn(&format!("failed to persist clock state: {e}"));
        }

        self.events.initialize_all(self.now());
        self.start_ticker();
        self.initialized.store(true, Ordering::Release);
        self.log.info(&format!("virtual clock initialized (rate={rate}x)"));
        self.notify(ClockChange::Initialized);
        Ok(())
    }

    /// Stop the ticker and drop every event subscriber. Terminal.
    pub fn dispose(&self) {
        *self.ticker.lock() = None;
        self.events.clear_all();
        self.initialized.store(false, Ordering::Release);
        self.log.info("virtual clock disposed");
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current virtual time.
    pub fn now(&self) -> DateTime<Utc> {
        self.transform.lock().now(Utc::now())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_production(&self) -> bool {
        self.config.is_production
    }

    /// Rate currently in effect (post coercion and clamping).
    pub fn clock_rate(&self) -> u32 {
        self.transform.lock().rate()
    }

    pub fn state(&self) -> ClockState {
        self.transform.lock().state()
    }

    pub fn is_paused(&self) -> bool {
        self.transform.lock().is_paused()
    }

    /// Virtual instant of the most recent event sweep.
    pub fn last_event_check_time(&self) -> Option<DateTime<Utc>> {
        *self.last_event_check.lock()
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Serializable view of the whole service state.
    pub fn snapshot(&self) -> ClockSnapshot {
        let real_now = Utc::now();
        let transform = self.transform.lock();
        ClockSnapshot {
            initialized: self.is_initialized(),
            production: self.config.is_production,
            rate: transform.rate(),
            state: transform.state(),
            now: transform.now(real_now),
            base_real: transform.base_real(),
            base_virtual: transform.base_virtual(),
            last_event_check: *self.last_event_check.lock(),
        }
    }

    /// Receive a notification for every observable state change.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ClockChange> {
        self.changes.subscribe()
    }

    // ------------------------------------------------------------------
    // Time mutations
    // ------------------------------------------------------------------

    /// Jump to an arbitrary virtual instant.
    pub fn time_travel_to(&self, target: DateTime<Utc>) {
        {
            self.transform.lock().time_travel_to(target, Utc::now());
        }
        self.store.persist_base_detached(target);
        self.log.info(&format!("time travelled to {target}"));
        self.trigger_event_check();
        self.notify(ClockChange::TimeTravelled(target));
    }

    /// Advance (or rewind, with a negative delta) virtual time.
    pub fn fast_forward(&self, delta: TimeDelta) {
        let target = { self.transform.lock().fast_forward(delta, Utc::now()) };
        self.store.persist_base_detached(target);
        self.log.info(&format!("fast forwarded to {target}"));
        self.trigger_event_check();
        self.notify(ClockChange::FastForwarded(target));
    }

    /// Freeze virtual time. Idempotent.
    pub fn pause(&self) {
        let transitioned = self.transform.lock().pause(Utc::now());
        if transitioned {
            self.log.info("virtual clock paused");
            self.notify(ClockChange::Paused);
        }
    }

    /// Resume virtual time progression. Idempotent.
    pub fn resume(&self) {
        let transitioned = self.transform.lock().resume(Utc::now());
        if transitioned {
            self.log.info("virtual clock resumed");
            self.notify(ClockChange::Resumed);
        }
    }

    /// Return to real time: both anchors move to the current real instant,
    /// the pause ledger clears, and the detectors re-arm so no boundary is
    /// crossed retroactively.
    pub async fn reset(&self) {
        let real_now = Utc::now();
        {
            self.transform.lock().reset(real_now);
        }
        if let Err(e) = self
            .store
            .persist(real_now, self.config.app_version.as_deref())
            .await
        {
            self.log.warn(&format!("failed to persist reset state: {e}"));
        }
        self.events.initialize_all(self.now());
        self.log.info("virtual clock reset to real time");
        self.notify(ClockChange::Reset);
    }

    /// Change the clock rate, preserving the current virtual instant.
    ///
    /// The rate is clamped to `[0, 100_000]`; the event ticker restarts at
    /// the cadence the new rate calls for. In-flight timers keep the rate
    /// they were created under.
    ///
    /// # Errors
    ///
    /// [`ClockError::ProductionViolation`] for any rate other than 1 on a
    /// production service.
    pub fn set_rate(&self, rate: u32) -> ClockResult<()> {
        if self.config.is_production && rate != 1 {
            return Err(ClockError::ProductionViolation(rate));
        }
        let clamped = rate.min(MAX_CLOCK_RATE);
        if clamped != rate {
            self.log
                .warn(&format!("clock rate {rate} is out of range; clamping to {clamped}"));
        }

        let base_virtual = {
            let mut transform = self.transform.lock();
            transform.set_rate(clamped, Utc::now());
            transform.base_virtual()
        };
        self.store.persist_base_detached(base_virtual);
        self.start_ticker();
        self.log.info(&format!("clock rate set to {clamped}x"));
        self.notify(ClockChange::RateChanged(clamped));
        Ok(())
    }

    /// Multiply the current rate by 2.
    pub fn increase_rate(&self) -> ClockResult<u32> {
        self.scale_rate(2.0)
    }

    /// Multiply the current rate by 0.5.
    pub fn decrease_rate(&self) -> ClockResult<u32> {
        self.scale_rate(0.5)
    }

    /// Multiply the current rate by an arbitrary factor, rounding to the
    /// nearest integer rate. Returns the rate now in effect.
    pub fn scale_rate(&self, multiplier: f64) -> ClockResult<u32> {
        let current = self.clock_rate();
        let next = ((current as f64) * multiplier)
            .round()
            .clamp(0.0, MAX_CLOCK_RATE as f64) as u32;
        self.set_rate(next)?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Direct access to one boundary detector.
    pub fn event(&self, kind: BoundaryKind) -> &Arc<BoundaryEvent> {
        self.events.get(kind)
    }

    /// Subscribe a callback to one boundary.
    pub fn subscribe(&self, kind: BoundaryKind, callback: EventCallback) -> Subscription {
        let event = Arc::clone(self.events.get(kind));
        let id = event.subscribe(callback);
        Subscription::new(event, id)
    }

    pub fn on_new_hour(&self, callback: EventCallback) -> Subscription {
        self.subscribe(BoundaryKind::NewHour, callback)
    }

    pub fn on_noon(&self, callback: EventCallback) -> Subscription {
        self.subscribe(BoundaryKind::AtNoon, callback)
    }

    pub fn on_new_day(&self, callback: EventCallback) -> Subscription {
        self.subscribe(BoundaryKind::NewDay, callback)
    }

    pub fn on_week_start(&self, callback: EventCallback) -> Subscription {
        self.subscribe(BoundaryKind::WeekStart, callback)
    }

    pub fn on_week_end(&self, callback: EventCallback) -> Subscription {
        self.subscribe(BoundaryKind::WeekEnd, callback)
    }

    /// Sweep every detector against the current virtual time. Runs from the
    /// ticker and at the tail of every virtual-time mutation; hosts can call
    /// it directly after out-of-band changes.
    pub fn trigger_event_check(&self) {
        let current = self.now();
        *self.last_event_check.lock() = Some(current);
        self.events.sweep(current);
    }

    // ------------------------------------------------------------------
    // HTTP guard
    // ------------------------------------------------------------------

    /// Evaluate the HTTP policy for a request path at the current rate.
    pub fn guard(&self, path: &str) -> GuardVerdict {
        self.guard.guard(path, self.clock_rate())
    }

    /// Whether a request path would currently be let through.
    pub fn is_allowed(&self, path: &str) -> bool {
        self.guard.is_allowed(path, self.clock_rate())
    }

    /// Restore the full throttle budget.
    pub fn reset_throttle(&self) {
        self.guard.reset_throttle();
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Schedule a repeating callback every `period` of *virtual* time.
    /// The real period is `period / rate`, snapshotted now.
    pub fn periodic(&self, period: std::time::Duration, callback: PeriodicCallback) -> TimerHandle {
        let scaled =
            timer::scale_duration(period, self.clock_rate(), self.config.is_production, &self.log);
        timer::spawn_periodic(scaled, callback, self.log.clone())
    }

    /// Schedule a one-shot callback after `delay` of *virtual* time.
    pub fn delayed(&self, delay: std::time::Duration, callback: DelayedCallback) -> TimerHandle {
        let scaled =
            timer::scale_duration(delay, self.clock_rate(), self.config.is_production, &self.log);
        timer::spawn_delayed(scaled, callback, self.log.clone())
    }

    /// Wait for `delay` of *virtual* time to elapse.
    pub async fn wait(&self, delay: std::time::Duration) {
        let scaled =
            timer::scale_duration(delay, self.clock_rate(), self.config.is_production, &self.log);
        tokio::time::sleep(scaled).await;
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Remove both persisted keys. Live state is untouched.
    pub async fn clear_all_state(&self) -> ClockResult<()> {
        self.store.clear().await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// (Re)start the event-check ticker at the cadence the current rate
    /// calls for. Replacing the stored cancel handle stops the previous
    /// task. The task holds only a weak reference; it winds down on its own
    /// when the last service handle drops.
    fn start_ticker(&self) {
        let period = event_check_interval(self.clock_rate());
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let weak = self.weak_self.clone();

        if tokio::runtime::Handle::try_current().is_err() {
            self.log.debug("no async runtime; event ticker not started");
            return;
        }

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => return,
                    _ = ticker.tick() => {
                        let Some(service) = weak.upgrade() else { return };
                        if !service.is_paused() {
                            service.trigger_event_check();
                        }
                    }
                }
            }
        });

        *self.ticker.lock() = Some(cancel_tx);
    }

    fn notify(&self, change: ClockChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}

impl std::fmt::Debug for ClockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockService")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("rate", &self.clock_rate())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ClockService {
    fn drop(&mut self) {
        // Dropping the cancel sender stops the ticker task if dispose was
        // never called.
        *self.ticker.lock() = None;
    }
}

/// Ticker cadence for a given rate: accelerated clocks are swept more often
/// so boundary events land close to their virtual instant.
fn event_check_interval(rate: u32) -> std::time::Duration {
    if rate > 1 {
        std::time::Duration::from_millis(u64::from(1000 / rate).clamp(50, 1000))
    } else {
        std::time::Duration::from_secs(1)
    }
}

/// Resolve the rate a service actually runs at, applying the production
/// guard and the release-build downgrade.
fn effective_rate(
    requested: u32,
    production: bool,
    force_enable: bool,
    debug_build: bool,
    log: &LogBridge,
) -> ClockResult<u32> {
    if production {
        if requested != 1 {
            return Err(ClockError::ProductionViolation(requested));
        }
        return Ok(1);
    }

    let mut rate = requested;
    if rate > MAX_CLOCK_RATE {
        log.warn(&format!("configured clock rate {rate} is out of range; using 1"));
        rate = 1;
    }
    if !debug_build && !force_enable && rate != 1 {
        log.warn("acceleration in release builds requires force_enable; using rate 1");
        rate = 1;
    }
    Ok(rate)
}
