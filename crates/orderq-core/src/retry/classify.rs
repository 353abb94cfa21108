//! Classify HTTP status and curl errors into submission outcomes.

use super::error::SubmitError;
use super::outcome::Outcome;

/// Classify a non-2xx HTTP status code.
///
/// 409 means the order already exists downstream, which is a success for an
/// idempotent create. 408 and 504 mean an intermediary gave up waiting, so the
/// origin may still have created the order.
pub fn classify_http_status(code: u32) -> Outcome {
    match code {
        200..=299 | 409 => Outcome::Created,
        408 | 504 => Outcome::AmbiguousTimeout,
        _ => Outcome::HardFailure,
    }
}

/// Classify a curl error.
///
/// Anything that can happen after the request left the socket is ambiguous;
/// only failures before a connection was made are hard failures.
pub fn classify_curl_error(e: &curl::Error) -> Outcome {
    if e.is_operation_timedout()
        || e.is_got_nothing()
        || e.is_recv_error()
        || e.is_read_error()
        || e.is_send_error()
        || e.is_partial_file()
    {
        return Outcome::AmbiguousTimeout;
    }
    Outcome::HardFailure
}

/// Classify a submission error (curl or HTTP) into an `Outcome`.
pub fn classify(e: &SubmitError) -> Outcome {
    match e {
        SubmitError::Curl(ce) => classify_curl_error(ce),
        SubmitError::Http(code) => classify_http_status(*code),
    }
}
