//! Key-value persistence for the virtual anchor.
//!
//! The clock persists exactly two keys through a host-provided [`KvStore`]:
//! the virtual anchor as epoch milliseconds and the app version that wrote
//! it. Any string/int store satisfies the trait; [`MemoryKvStore`] ships as
//! the default for tests and ephemeral hosts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{ClockError, ClockResult};
use crate::logging::LogBridge;

/// Persisted key: virtual anchor as i64 epoch milliseconds.
pub const KEY_BASE_TIMESTAMP: &str = "virtual_clock_base_timestamp";

/// Persisted key: app version that last initialized the clock.
pub const KEY_APP_VERSION: &str = "virtual_clock_app_version";

// ============================================================================
// KvStore trait
// ============================================================================

/// Minimal key-value persistence contract.
///
/// Implementations may be backed by anything that stores strings and 64-bit
/// integers (shared preferences, a file, a database row). Operations may be
/// asynchronous; no transactional guarantees are required.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read an integer value. `Ok(None)` when the key is absent.
    async fn get_i64(&self, key: &str) -> ClockResult<Option<i64>>;

    /// Write an integer value, creating or replacing the entry.
    async fn set_i64(&self, key: &str, value: i64) -> ClockResult<()>;

    /// Read a string value. `Ok(None)` when the key is absent.
    async fn get_string(&self, key: &str) -> ClockResult<Option<String>>;

    /// Write a string value, creating or replacing the entry.
    async fn set_string(&self, key: &str, value: &str) -> ClockResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> ClockResult<()>;
}

// ============================================================================
// MemoryKvStore
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum StoreValue {
    Int(i64),
    Text(String),
}

/// In-memory [`KvStore`] backed by a hash map.
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<HashMap<String, StoreValue>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get_i64(&self, key: &str) -> ClockResult<Option<i64>> {
        Ok(match self.data.lock().get(key) {
            Some(StoreValue::Int(v)) => Some(*v),
            _ => None,
        })
    }

    async fn set_i64(&self, key: &str, value: i64) -> ClockResult<()> {
        self.data.lock().insert(key.to_string(), StoreValue::Int(value));
        Ok(())
    }

    async fn get_string(&self, key: &str) -> ClockResult<Option<String>> {
        Ok(match self.data.lock().get(key) {
            Some(StoreValue::Text(v)) => Some(v.clone()),
            _ => None,
        })
    }

    async fn set_string(&self, key: &str, value: &str) -> ClockResult<()> {
        self.data
            .lock()
            .insert(key.to_string(), StoreValue::Text(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClockResult<()> {
        self.data.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// ClockStore
// ============================================================================

/// Wraps the host [`KvStore`] with the clock's load/persist rules.
#[derive(Clone)]
pub struct ClockStore {
    inner: Arc<dyn KvStore>,
    log: LogBridge,
}

impl ClockStore {
    pub fn new(inner: Arc<dyn KvStore>, log: LogBridge) -> Self {
        Self { inner, log }
    }

    /// Load the persisted virtual anchor, applying the version gate.
    ///
    /// When `app_version` is `Some` and the persisted version is absent or
    /// different, the persisted anchor is discarded. When `app_version` is
    /// `None` no gating applies. Store read failures are logged and treated
    /// as an absent anchor.
    pub async fn load_base(&self, app_version: Option<&str>) -> Option<DateTime<Utc>> {
        if let Some(expected) = app_version {
            match self.inner.get_string(KEY_APP_VERSION).await {
                Ok(Some(stored)) if stored == expected => {}
                Ok(stored) => {
                    self.log.info(&format!(
                        "app version changed ({:?} -> {expected}); discarding persisted virtual time",
                        stored
                    ));
                    return None;
                }
                Err(e) => {
                    self.log.warn(&format!("failed to read persisted app version: {e}"));
                    return None;
                }
            }
        }

        match self.inner.get_i64(KEY_BASE_TIMESTAMP).await {
            Ok(Some(ms)) => match DateTime::<Utc>::from_timestamp_millis(ms) {
                Some(base) => Some(base),
                None => {
                    self.log.warn(&format!("persisted timestamp {ms} is out of range; ignoring"));
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.log.warn(&format!("failed to read persisted virtual time: {e}"));
                None
            }
        }
    }

    /// Persist the anchor and, when given, the app version. Errors surface
    /// to the caller.
    pub async fn persist(
        &self,
        base_virtual: DateTime<Utc>,
        app_version: Option<&str>,
    ) -> ClockResult<()> {
        self.inner
            .set_i64(KEY_BASE_TIMESTAMP, base_virtual.timestamp_millis())
            .await?;
        if let Some(version) = app_version {
            self.inner.set_string(KEY_APP_VERSION, version).await?;
        }
        Ok(())
    }

    /// Persist the anchor without blocking the caller.
    ///
    /// Spawned onto the ambient tokio runtime; failures (including the
    /// absence of a runtime) are logged and swallowed so time mutations stay
    /// synchronous and infallible.
    pub fn persist_base_detached(&self, base_virtual: DateTime<Utc>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.log.debug("no async runtime; skipping anchor persistence");
            return;
        };
        let store = Arc::clone(&self.inner);
        let log = self.log.clone();
        let ms = base_virtual.timestamp_millis();
        handle.spawn(async move {
            if let Err(e) = store.set_i64(KEY_BASE_TIMESTAMP, ms).await {
                log.warn(&format!("failed to persist virtual anchor: {e}"));
            }
        });
    }

    /// Remove both persisted keys. Live clock state is untouched.
    pub async fn clear(&self) -> ClockResult<()> {
        self.inner.remove(KEY_BASE_TIMESTAMP).await?;
        self.inner.remove(KEY_APP_VERSION).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ClockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockStore").finish_non_exhaustive()
    }
}

// Lets store construction sites produce uniform errors without caring about
// the backend's native error type.
impl From<std::io::Error> for ClockError {
    fn from(e: std::io::Error) -> Self {
        ClockError::Store(e.to_string())
    }
}
