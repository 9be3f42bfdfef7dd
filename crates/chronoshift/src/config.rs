//! Service configuration.
//!
//! A [`ClockConfig`] is built once by the host and handed to
//! [`ClockService::new`](crate::service::ClockService::new). It is immutable
//! after `initialize`; the only runtime-mutable knob is the clock rate, via
//! [`ClockService::set_rate`](crate::service::ClockService::set_rate).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logging::LogSink;

/// Upper bound accepted for the clock rate. Values above this are clamped
/// (`set_rate`) or coerced to 1 (configuration).
pub const MAX_CLOCK_RATE: u32 = 100_000;

/// Default HTTP throttle budget per 60-second wall-clock window.
pub const DEFAULT_THROTTLE_LIMIT: u32 = 10;

/// Default policy applied to request paths that match neither pattern list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HttpPolicy {
    /// Let unmatched requests through.
    Allow,
    /// Reject unmatched requests while the clock is accelerated.
    Block,
    /// Let unmatched requests through up to the throttle budget.
    Throttle,
}

/// Callback invoked when the HTTP guard denies a request: `(path, reason)`.
pub type DeniedCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Immutable configuration for a [`ClockService`](crate::service::ClockService).
///
/// # Example
///
/// ```rust,ignore
/// use chronoshift::config::{ClockConfig, HttpPolicy};
///
/// let config = ClockConfig::new()
///     .with_rate(100)
///     .with_app_version("2.4.0")
///     .with_http_policy(HttpPolicy::Throttle)
///     .with_throttle_limit(3)
///     .allow_pattern("/api/*")
///     .block_pattern("/api/admin*");
/// ```
#[derive(Clone)]
pub struct ClockConfig {
    /// Multiplier applied to elapsed real time. 1 = passthrough, 0 = frozen.
    pub clock_rate: u32,
    /// Hard guard: forces rate 1 and rejects acceleration.
    pub is_production: bool,
    /// Permits acceleration in release builds.
    pub force_enable: bool,
    /// Version sentinel for the persisted anchor. A mismatch with the stored
    /// version discards the persisted virtual time.
    pub app_version: Option<String>,
    /// Optional host logging callback.
    pub log_sink: Option<LogSink>,
    /// Policy for request paths matching neither pattern list.
    pub http_policy: HttpPolicy,
    /// Glob patterns that are always allowed.
    pub http_allowed_patterns: Vec<String>,
    /// Glob patterns that are always blocked. Takes precedence over allows.
    pub http_blocked_patterns: Vec<String>,
    /// Allowed requests per 60-second wall-clock window under `Throttle`.
    pub http_throttle_limit: u32,
    /// Invoked with `(path, reason)` whenever the guard denies a request.
    pub on_http_request_denied: Option<DeniedCallback>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            clock_rate: 1,
            is_production: false,
            force_enable: false,
            app_version: None,
            log_sink: None,
            http_policy: HttpPolicy::Block,
            http_allowed_patterns: Vec::new(),
            http_blocked_patterns: Vec::new(),
            http_throttle_limit: DEFAULT_THROTTLE_LIMIT,
            on_http_request_denied: None,
        }
    }
}

impl ClockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clock rate.
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.clock_rate = rate;
        self
    }

    /// Enable the production guard.
    pub fn production(mut self) -> Self {
        self.is_production = true;
        self
    }

    /// Permit acceleration in release builds.
    pub fn with_force_enable(mut self, force: bool) -> Self {
        self.force_enable = force;
        self
    }

    /// Set the version sentinel used for the persisted anchor.
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Attach a host logging callback.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Set the default HTTP policy.
    pub fn with_http_policy(mut self, policy: HttpPolicy) -> Self {
        self.http_policy = policy;
        self
    }

    /// Append one always-allowed glob pattern.
    pub fn allow_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.http_allowed_patterns.push(pattern.into());
        self
    }

    /// Append one always-blocked glob pattern.
    pub fn block_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.http_blocked_patterns.push(pattern.into());
        self
    }

    /// Replace the allowed pattern list.
    pub fn with_allowed_patterns(mut self, patterns: Vec<String>) -> Self {
        self.http_allowed_patterns = patterns;
        self
    }

    /// Replace the blocked pattern list.
    pub fn with_blocked_patterns(mut self, patterns: Vec<String>) -> Self {
        self.http_blocked_patterns = patterns;
        self
    }

    /// Set the throttle budget per 60-second window. Values of 0 are lifted
    /// to 1 so a `Throttle` policy can never deadlock every request.
    pub fn with_throttle_limit(mut self, limit: u32) -> Self {
        self.http_throttle_limit = limit.max(1);
        self
    }

    /// Attach a denial callback.
    pub fn with_denied_callback(mut self, cb: DeniedCallback) -> Self {
        self.on_http_request_denied = Some(cb);
        self
    }
}

impl fmt::Debug for ClockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockConfig")
            .field("clock_rate", &self.clock_rate)
            .field("is_production", &self.is_production)
            .field("force_enable", &self.force_enable)
            .field("app_version", &self.app_version)
            .field("log_sink", &self.log_sink.as_ref().map(|_| "<callback>"))
            .field("http_policy", &self.http_policy)
            .field("http_allowed_patterns", &self.http_allowed_patterns)
            .field("http_blocked_patterns", &self.http_blocked_patterns)
            .field("http_throttle_limit", &self.http_throttle_limit)
            .field(
                "on_http_request_denied",
                &self.on_http_request_denied.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}
