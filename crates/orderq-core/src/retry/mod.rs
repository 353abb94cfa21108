//! Backoff policy and outcome classification.
//!
//! This module holds the pure pieces of the retry engine: the capped
//! exponential backoff law and the mapping from transport results (HTTP
//! status codes, curl errors) onto the three-way submission `Outcome`.

mod classify;
mod error;
mod outcome;
mod policy;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::SubmitError;
pub use outcome::Outcome;
pub use policy::BackoffPolicy;
