//! Shared fixtures for chronoshift integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use chronoshift::error::{ClockError, ClockResult};
use chronoshift::{ClockConfig, ClockService, KvStore, LogLevel, MemoryKvStore};
use parking_lot::Mutex;

/// Build and initialize a service at the given rate over a fresh in-memory
/// store.
pub async fn accelerated_service(rate: u32) -> Arc<ClockService> {
    let service = ClockService::new(
        ClockConfig::new().with_rate(rate),
        Arc::new(MemoryKvStore::new()),
    );
    service.initialize().await.expect("initialize failed");
    service
}

/// Build and initialize a service with a custom configuration and store.
pub async fn service_with(config: ClockConfig, kv: Arc<dyn KvStore>) -> Arc<ClockService> {
    let service = ClockService::new(config, kv);
    service.initialize().await.expect("initialize failed");
    service
}

/// Log sink that records every `(message, level)` pair it sees.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(String, LogLevel)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<(String, LogLevel)> {
        self.entries.lock().clone()
    }

    pub fn record(&self, msg: &str, level: LogLevel) {
        self.entries.lock().push((msg.to_string(), level));
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|(msg, _)| msg.contains(needle))
    }
}

/// A store whose every operation fails, for exercising persistence-fault
/// tolerance.
pub struct FailingKvStore;

#[async_trait]
impl KvStore for FailingKvStore {
    async fn get_i64(&self, _key: &str) -> ClockResult<Option<i64>> {
        Err(ClockError::Store("backend unavailable".into()))
    }

    async fn set_i64(&self, _key: &str, _value: i64) -> ClockResult<()> {
        Err(ClockError::Store("backend unavailable".into()))
    }

    async fn get_string(&self, _key: &str) -> ClockResult<Option<String>> {
        Err(ClockError::Store("backend unavailable".into()))
    }

    async fn set_string(&self, _key: &str, _value: &str) -> ClockResult<()> {
        Err(ClockError::Store("backend unavailable".into()))
    }

    async fn remove(&self, _key: &str) -> ClockResult<()> {
        Err(ClockError::Store("backend unavailable".into()))
    }
}
