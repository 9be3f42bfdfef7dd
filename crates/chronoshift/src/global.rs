//! Process-wide accessor and date predicates.
//!
//! Most hosts run exactly one virtual clock. [`setup`] installs a service
//! into a process-wide slot, [`clock`] retrieves it, and the date predicates
//! below answer the questions apps actually ask ("is this timestamp the
//! virtual today?") against that service. [`reset_global`] tears the slot
//! down so tests can start clean.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::config::ClockConfig;
use crate::error::{ClockError, ClockResult};
use crate::service::ClockService;
use crate::store::KvStore;

/// Two readings within this tolerance count as "the same instant".
const SAME_INSTANT_TOLERANCE_MS: i64 = 1_000;

static GLOBAL: RwLock<Option<Arc<ClockService>>> = RwLock::new(None);

/// Construct, initialize, and install the process-wide clock service.
///
/// When a service is already installed it is returned untouched; call
/// [`reset_global`] first to replace it.
pub async fn setup(config: ClockConfig, kv: Arc<dyn KvStore>) -> ClockResult<Arc<ClockService>> {
    if let Some(existing) = GLOBAL.read().clone() {
        return Ok(existing);
    }

    let service = ClockService::new(config, kv);
    service.initialize().await?;

    let mut slot = GLOBAL.write();
    match &*slot {
        // Another caller won the race while we were initializing; theirs
        // stays installed.
        Some(existing) => {
            let existing = Arc::clone(existing);
            drop(slot);
            service.dispose();
            Ok(existing)
        }
        None => {
            *slot = Some(Arc::clone(&service));
            Ok(service)
        }
    }
}

/// The installed clock service.
///
/// # Errors
///
/// [`ClockError::NotInitialized`] before [`setup`] has completed.
pub fn clock() -> ClockResult<Arc<ClockService>> {
    GLOBAL.read().clone().ok_or(ClockError::NotInitialized)
}

/// Whether a global service is installed.
pub fn is_set() -> bool {
    GLOBAL.read().is_some()
}

/// Dispose and remove the installed service.
pub fn reset_global() {
    if let Some(service) = GLOBAL.write().take() {
        service.dispose();
    }
}

// ============================================================================
// Date predicates
// ============================================================================

/// Whether `instant` falls on the current virtual calendar day.
pub fn is_virtual_today(instant: DateTime<Utc>) -> ClockResult<bool> {
    Ok(clock()?.now().date_naive() == instant.date_naive())
}

/// Whether `instant` falls on the virtual calendar day before today.
pub fn is_virtual_yesterday(instant: DateTime<Utc>) -> ClockResult<bool> {
    let today = clock()?.now().date_naive();
    Ok(today.pred_opt().is_some_and(|y| y == instant.date_naive()))
}

/// Whether `instant` lies strictly before virtual now.
pub fn is_in_virtual_past(instant: DateTime<Utc>) -> ClockResult<bool> {
    Ok(instant < clock()?.now())
}

/// Whether `instant` lies strictly after virtual now.
pub fn is_in_virtual_future(instant: DateTime<Utc>) -> ClockResult<bool> {
    Ok(instant > clock()?.now())
}

/// Whether `instant` differs from virtual now by more than one second.
pub fn is_different_from_virtual_now(instant: DateTime<Utc>) -> ClockResult<bool> {
    let delta = difference_from_virtual_now(instant)?;
    Ok(delta.num_milliseconds().abs() > SAME_INSTANT_TOLERANCE_MS)
}

/// Signed offset of `instant` from virtual now; positive when `instant` is
/// in the virtual future.
pub fn difference_from_virtual_now(instant: DateTime<Utc>) -> ClockResult<Duration> {
    Ok(instant - clock()?.now())
}
