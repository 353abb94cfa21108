//! Error taxonomy shared by the store, engine and scheduler.

use thiserror::Error;

/// Errors surfaced by the order pipeline.
///
/// `TransientFailure` and `TerminalFailure` describe what happened to a single
/// order during a tick; they are reported, never propagated out of a tick.
/// `StoreUnavailable` aborts the tick that hit it. `Configuration` is only
/// produced while validating settings at startup.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Attempt failed (hard failure or unresolved timeout); the order stays queued.
    #[error("order {reference} failed attempt {retries}; rescheduled")]
    TransientFailure { reference: String, retries: u32 },

    /// Retries exhausted; the order is terminal and dead-lettered.
    #[error("order {reference} failed permanently after {retries} attempts")]
    TerminalFailure { reference: String, retries: u32 },

    /// The persistence layer rejected a read or write.
    #[error("order store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Invalid thresholds or durations in the configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T, E = OrderError> = std::result::Result<T, E>;
