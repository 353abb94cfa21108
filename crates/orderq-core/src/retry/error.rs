//! Submission error type for outcome classification.

use thiserror::Error;

/// Error returned by a single HTTP submission (curl failure or non-2xx status).
/// Kept separate so we can classify it into an `Outcome` before anything else sees it.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
}
