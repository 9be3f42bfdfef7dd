//! Real ↔ virtual time projection.
//!
//! [`TimeTransform`] is the pure state machine at the center of the clock: a
//! pair of anchors (`base_real`, `base_virtual`), an integer rate, and a
//! pause ledger. Every method takes the current real instant from the caller
//! instead of reading the system clock, so the projection is fully
//! deterministic under test.
//!
//! While running:
//!
//! ```text
//! now() = base_virtual + rate · ((real_now − base_real) − paused_offset)
//! ```
//!
//! While paused, `paused_at` stands in for `real_now`, freezing the result.
//! `paused_offset` accumulates completed pause spans and resets to zero on
//! every re-anchoring operation (time travel, fast-forward, rate change,
//! reset).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Whether virtual time is currently progressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    Running,
    Paused,
}

/// The anchor/rate/pause state machine behind `now()`.
#[derive(Debug, Clone)]
pub struct TimeTransform {
    base_real: DateTime<Utc>,
    base_virtual: DateTime<Utc>,
    rate: u32,
    state: ClockState,
    paused_at: Option<DateTime<Utc>>,
    paused_offset: Duration,
    /// Whether a virtual anchor has ever been established. Until one is,
    /// a rate-1 transform passes real time through untouched.
    anchored: bool,
}

impl TimeTransform {
    /// A passthrough transform anchored at `real_now` with rate 1.
    pub fn new(real_now: DateTime<Utc>) -> Self {
        Self::with_rate(1, real_now)
    }

    /// A fresh transform at the given rate, anchored at `real_now`.
    pub fn with_rate(rate: u32, real_now: DateTime<Utc>) -> Self {
        Self {
            base_real: real_now,
            base_virtual: real_now,
            rate,
            state: ClockState::Running,
            paused_at: None,
            paused_offset: Duration::zero(),
            anchored: false,
        }
    }

    /// A transform restored from a persisted virtual anchor.
    pub fn restored(base_virtual: DateTime<Utc>, rate: u32, real_now: DateTime<Utc>) -> Self {
        Self {
            base_real: real_now,
            base_virtual,
            rate,
            state: ClockState::Running,
            paused_at: None,
            paused_offset: Duration::zero(),
            anchored: true,
        }
    }

    /// Current virtual time for the given real instant.
    pub fn now(&self, real_now: DateTime<Utc>) -> DateTime<Utc> {
        if self.rate == 1 && !self.anchored {
            return real_now;
        }
        let effective_real = match self.state {
            ClockState::Running => real_now,
            ClockState::Paused => self.paused_at.unwrap_or(real_now),
        };
        let elapsed = (effective_real - self.base_real) - self.paused_offset;
        self.base_virtual + scale(elapsed, self.rate)
    }

    /// Jump to an arbitrary virtual instant, re-anchoring there.
    pub fn time_travel_to(&mut self, target: DateTime<Utc>, real_now: DateTime<Utc>) {
        self.base_real = real_now;
        self.base_virtual = target;
        self.paused_offset = Duration::zero();
        self.anchored = true;
        if self.state == ClockState::Paused {
            self.paused_at = Some(real_now);
        }
    }

    /// Advance (or, with a negative duration, rewind) virtual time by `delta`.
    pub fn fast_forward(&mut self, delta: Duration, real_now: DateTime<Utc>) -> DateTime<Utc> {
        let target = self.now(real_now) + delta;
        self.time_travel_to(target, real_now);
        target
    }

    /// Freeze virtual time. Returns `false` when already paused.
    pub fn pause(&mut self, real_now: DateTime<Utc>) -> bool {
        if self.state == ClockState::Paused {
            return false;
        }
        self.state = ClockState::Paused;
        self.paused_at = Some(real_now);
        true
    }

    /// Resume progression. Returns `false` when not paused.
    pub fn resume(&mut self, real_now: DateTime<Utc>) -> bool {
        if self.state != ClockState::Paused {
            return false;
        }
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_offset += real_now - paused_at;
        }
        self.state = ClockState::Running;
        true
    }

    /// Drop the virtual anchor and return to real time.
    pub fn reset(&mut self, real_now: DateTime<Utc>) {
        self.base_real = real_now;
        self.base_virtual = real_now;
        self.state = ClockState::Running;
        self.paused_at = None;
        self.paused_offset = Duration::zero();
        self.anchored = false;
    }

    /// Change the rate, re-anchoring so the current virtual time is
    /// preserved exactly.
    ///
    /// Both anchors and (when paused) `paused_at` move to `real_now` and
    /// `paused_offset` zeroes; a pause in progress simply restarts its span
    /// at the rate change, with no discontinuity at resume.
    pub fn set_rate(&mut self, rate: u32, real_now: DateTime<Utc>) {
        let current = self.now(real_now);
        self.base_virtual = current;
        self.base_real = real_now;
        self.paused_offset = Duration::zero();
        if self.state == ClockState::Paused {
            self.paused_at = Some(real_now);
        }
        self.rate = rate;
        self.anchored = true;
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ClockState::Paused
    }

    pub fn base_virtual(&self) -> DateTime<Utc> {
        self.base_virtual
    }

    pub fn base_real(&self) -> DateTime<Utc> {
        self.base_real
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }
}

/// Multiply a real-time delta by the integer rate at microsecond precision.
fn scale(elapsed: Duration, rate: u32) -> Duration {
    match elapsed.num_microseconds() {
        Some(us) => Duration::microseconds(us.saturating_mul(rate as i64)),
        // Magnitude beyond i64 microseconds; fall back to millisecond math.
        None => Duration::milliseconds(elapsed.num_milliseconds().saturating_mul(rate as i64)),
    }
}
