//! Crate-level error types for `chronoshift`.
//!
//! The virtual clock deliberately raises on very few paths. Invalid rates and
//! environment downgrades are coerced and logged, HTTP policy outcomes are
//! returned as verdicts, and persistence failures on hot paths are logged and
//! swallowed so that a misconfigured acceleration cannot crash the host app.

use thiserror::Error;

/// All errors raised by the virtual clock.
///
/// Marked `#[non_exhaustive]` so that new variants can be added in future
/// minor releases without breaking callers that match exhaustively.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClockError {
    /// Acceleration was requested while the production guard is active.
    ///
    /// Raised by `initialize` when the configuration carries a rate other
    /// than 1 together with `is_production`, and by `set_rate` on a
    /// production service.
    #[error("clock rate {0} rejected: acceleration is disabled in production")]
    ProductionViolation(u32),

    /// The global accessor was used before `setup()` completed.
    #[error("virtual clock is not initialized; call setup() first")]
    NotInitialized,

    /// A key-value store operation failed.
    ///
    /// Only surfaced from explicit persistence calls (`initialize`,
    /// `clear_all_state`, direct store usage). Fire-and-forget writes from
    /// time mutations log and swallow this instead.
    #[error("store error: {0}")]
    Store(String),
}

/// Convenience result alias used across the crate.
pub type ClockResult<T> = Result<T, ClockError>;
