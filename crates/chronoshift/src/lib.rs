//! chronoshift — a virtual-time kernel.
//!
//! Simulates a user-controllable wall clock for apps that depend on
//! date/time progression: accelerate, pause, jump, and rewind "now" while
//! boundary events, timers, and date predicates stay causally consistent.
//! An HTTP guard keeps the accelerated clock from amplifying request
//! traffic to real backends.

// configuration
pub mod config;

// error types
pub mod error;

// boundary events
pub mod events;

// global accessor + date predicates
pub mod global;

// HTTP guard
pub mod guard;

// log bridge
pub mod logging;

// clock service orchestrator
pub mod service;

// persistence
pub mod store;

// virtual timers
pub mod timer;

// real <-> virtual projection
pub mod transform;

pub use config::{ClockConfig, HttpPolicy, MAX_CLOCK_RATE};
pub use error::{ClockError, ClockResult};
pub use events::{BoundaryEvent, BoundaryKind, EventCallback, Subscription};
pub use global::{
    clock, difference_from_virtual_now, is_different_from_virtual_now, is_in_virtual_future,
    is_in_virtual_past, is_virtual_today, is_virtual_yesterday, reset_global, setup,
};
pub use guard::{GuardAction, GuardVerdict};
pub use logging::{LogLevel, LogSink};
pub use service::{ClockChange, ClockService, ClockSnapshot};
pub use store::{KvStore, MemoryKvStore};
pub use timer::TimerHandle;
pub use transform::ClockState;
