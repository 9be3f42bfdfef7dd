//! Log bridge between the crate and the host application.
//!
//! The clock logs everything through [`tracing`]; hosts that want to surface
//! clock activity in their own UI (a debug panel, an on-device console)
//! additionally receive every message through an optional [`LogSink`]
//! callback supplied in the configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Severity of a message delivered to the host's [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Host-provided logging callback: `(message, level)`.
pub type LogSink = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;

/// Fans every clock log message out to `tracing` and, when configured, the
/// host's [`LogSink`].
#[derive(Clone, Default)]
pub struct LogBridge {
    sink: Option<LogSink>,
}

impl LogBridge {
    pub fn new(sink: Option<LogSink>) -> Self {
        Self { sink }
    }

    /// Emit one message at the given level.
    pub fn emit(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "chronoshift", "{msg}"),
            LogLevel::Info => tracing::info!(target: "chronoshift", "{msg}"),
            LogLevel::Warn => tracing::warn!(target: "chronoshift", "{msg}"),
            LogLevel::Error => tracing::error!(target: "chronoshift", "{msg}"),
        }
        if let Some(sink) = &self.sink {
            sink(msg, level);
        }
    }

    pub fn debug(&self, msg: &str) {
        self.emit(LogLevel::Debug, msg);
    }

    pub fn info(&self, msg: &str) {
        self.emit(LogLevel::Info, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.emit(LogLevel::Warn, msg);
    }

    pub fn error(&self, msg: &str) {
        self.emit(LogLevel::Error, msg);
    }
}

impl fmt::Debug for LogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBridge")
            .field("sink", &self.sink.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
