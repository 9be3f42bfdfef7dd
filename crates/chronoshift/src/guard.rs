//! HTTP guard: glob policy evaluation plus wall-clock throttling.
//!
//! An accelerated clock multiplies everything driven by time — including
//! polling loops and refresh timers. The guard sits in front of outbound
//! requests and keeps that amplification away from real backends: explicit
//! blocks beat explicit allows beat the default policy, and throttling is
//! measured against the *real* clock so no rate setting can widen the
//! budget.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ClockConfig, DeniedCallback, HttpPolicy};
use crate::logging::LogBridge;

/// Sliding window over which throttled requests are counted.
pub const THROTTLE_WINDOW: Duration = Duration::from_secs(60);

/// Outcome category of one guard evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardAction {
    Allow,
    Block,
    Throttle,
}

/// Result of guarding one request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub action: GuardAction,
    /// Human-readable denial reason; `None` for allows.
    pub reason: Option<String>,
}

impl GuardVerdict {
    fn allow() -> Self {
        Self {
            action: GuardAction::Allow,
            reason: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.action == GuardAction::Allow
    }
}

/// Glob policy evaluator with a wall-clock sliding-window throttle.
pub struct HttpGuard {
    policy: HttpPolicy,
    allowed_patterns: Vec<String>,
    blocked_patterns: Vec<String>,
    throttle_limit: u32,
    on_denied: Option<DeniedCallback>,
    request_log: Mutex<VecDeque<Instant>>,
    compiled: Mutex<HashMap<String, Option<Regex>>>,
    log: LogBridge,
}

impl HttpGuard {
    pub fn from_config(config: &ClockConfig, log: LogBridge) -> Self {
        Self {
            policy: config.http_policy,
            allowed_patterns: config.http_allowed_patterns.clone(),
            blocked_patterns: config.http_blocked_patterns.clone(),
            throttle_limit: config.http_throttle_limit.max(1),
            on_denied: config.on_http_request_denied.clone(),
            request_log: Mutex::new(VecDeque::new()),
            compiled: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Evaluate the policy for `path` under the given clock rate.
    ///
    /// Rate 1 is real-time mode and always allows. Precedence otherwise:
    /// blocked patterns, then allowed patterns, then the default policy.
    pub fn guard(&self, path: &str, rate: u32) -> GuardVerdict {
        if rate == 1 {
            return GuardVerdict::allow();
        }

        if self.matches_any(&self.blocked_patterns, path) {
            return self.deny_blocked(path, rate);
        }
        if self.matches_any(&self.allowed_patterns, path) {
            return GuardVerdict::allow();
        }

        match self.policy {
            HttpPolicy::Allow => GuardVerdict::allow(),
            HttpPolicy::Block => self.deny_blocked(path, rate),
            HttpPolicy::Throttle => self.check_throttle(path),
        }
    }

    /// Whether `path` would be let through right now. Note that under a
    /// `Throttle` policy this consumes budget exactly like [`guard`].
    ///
    /// [`guard`]: HttpGuard::guard
    pub fn is_allowed(&self, path: &str, rate: u32) -> bool {
        self.guard(path, rate).is_allowed()
    }

    /// Forget all recorded requests, restoring the full throttle budget.
    pub fn reset_throttle(&self) {
        self.request_log.lock().clear();
    }

    /// Requests currently counted against the throttle window.
    pub fn throttled_request_count(&self) -> usize {
        let now = Instant::now();
        let mut log = self.request_log.lock();
        Self::evict_expired(&mut log, now);
        log.len()
    }

    fn deny_blocked(&self, path: &str, rate: u32) -> GuardVerdict {
        let reason = format!("accelerated mode active (rate={rate}x)");
        self.log.warn(&format!("blocked {path}: {reason}"));
        self.notify_denied(path, &reason);
        GuardVerdict {
            action: GuardAction::Block,
            reason: Some(reason),
        }
    }

    fn check_throttle(&self, path: &str) -> GuardVerdict {
        let now = Instant::now();
        let allowed = {
            let mut log = self.request_log.lock();
            Self::evict_expired(&mut log, now);
            if (log.len() as u32) < self.throttle_limit {
                log.push_back(now);
                true
            } else {
                false
            }
        };

        if allowed {
            return GuardVerdict::allow();
        }

        let reason = format!("Throttle limit ({}/min) exceeded", self.throttle_limit);
        self.log.warn(&format!("throttled {path}: {reason}"));
        self.notify_denied(path, &reason);
        GuardVerdict {
            action: GuardAction::Throttle,
            reason: Some(reason),
        }
    }

    fn evict_expired(log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = log.front() {
            if now.duration_since(*oldest) >= THROTTLE_WINDOW {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    fn notify_denied(&self, path: &str, reason: &str) {
        if let Some(cb) = &self.on_denied {
            cb(path, reason);
        }
    }

    fn matches_any(&self, patterns: &[String], path: &str) -> bool {
        patterns.iter().any(|pattern| {
            let mut compiled = self.compiled.lock();
            let entry = compiled.entry(pattern.clone()).or_insert_with(|| {
                match Regex::new(&glob_to_regex(pattern)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        self.log
                            .warn(&format!("glob pattern '{pattern}' failed to compile: {e}"));
                        None
                    }
                }
            });
            entry.as_ref().is_some_and(|re| re.is_match(path))
        })
    }
}

impl std::fmt::Debug for HttpGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGuard")
            .field("policy", &self.policy)
            .field("allowed_patterns", &self.allowed_patterns)
            .field("blocked_patterns", &self.blocked_patterns)
            .field("throttle_limit", &self.throttle_limit)
            .finish_non_exhaustive()
    }
}

/// Translate a glob into an anchored regular expression.
///
/// `*` matches any run of characters (including empty), `?` exactly one;
/// everything else is literal.
pub(crate) fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 4);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&ch.to_string())),
        }
    }
    out.push('$');
    out
}
