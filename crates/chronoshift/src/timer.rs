//! Rate-scaled timers.
//!
//! Virtual timers compress real durations by the clock rate: a daily-reward
//! timer of 24 hours fires after 864 real seconds at 100×. The rate is
//! snapshotted when the timer is created; a later rate change does not
//! re-scale in-flight timers — hosts re-create them after calling
//! `set_rate` when that matters.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{Duration, MissedTickBehavior, interval, sleep};

use crate::logging::LogBridge;

/// Callback for periodic timers; receives the fire count (1-based).
pub type PeriodicCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Callback for one-shot timers.
pub type DelayedCallback = Box<dyn FnOnce() + Send>;

/// Controls one scheduled timer task.
///
/// The handle is intentionally not `Clone` — ownership models the exclusive
/// right to cancel. Dropping the handle without cancelling leaves the timer
/// running.
pub struct TimerHandle {
    cancel_tx: oneshot::Sender<()>,
}

impl TimerHandle {
    /// Cancel the timer. Returns `true` if the background task was still
    /// running, `false` if it had already finished.
    pub fn cancel(self) -> bool {
        self.cancel_tx.send(()).is_ok()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancel_tx", &"<channel>")
            .finish()
    }
}

/// Compress a real duration by the clock rate.
///
/// Production and rate-1 clocks pass the duration through. Rate 0 cannot
/// scale (the clock is frozen, the timer is not); the unscaled duration is
/// used and a warning logged. Scaled results are floored at one millisecond
/// so `tokio::time::interval` never sees a zero period.
pub(crate) fn scale_duration(d: Duration, rate: u32, production: bool, log: &LogBridge) -> Duration {
    if production || rate == 1 {
        return d;
    }
    if rate == 0 {
        log.warn("clock rate is 0; timer runs at its real duration");
        return d;
    }
    (d / rate).max(Duration::from_millis(1))
}

/// Spawn a repeating timer with the given (already scaled) period.
pub(crate) fn spawn_periodic(period: Duration, callback: PeriodicCallback, log: LogBridge) -> TimerHandle {
    let (cancel_tx, mut cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately; consume
        // it so the callback first fires one full period from now.
        ticker.tick().await;

        let mut fired: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut cancel_rx => return,
                _ = ticker.tick() => {
                    fired += 1;
                    let cb = Arc::clone(&callback);
                    if catch_unwind(AssertUnwindSafe(|| cb(fired))).is_err() {
                        log.error("periodic timer callback panicked; continuing");
                    }
                }
            }
        }
    });
    TimerHandle { cancel_tx }
}

/// Spawn a one-shot timer with the given (already scaled) delay.
pub(crate) fn spawn_delayed(delay: Duration, callback: DelayedCallback, log: LogBridge) -> TimerHandle {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel_rx => {}
            _ = sleep(delay) => {
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    log.error("delayed timer callback panicked");
                }
            }
        }
    });
    TimerHandle { cancel_tx }
}
