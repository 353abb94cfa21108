//! Submission clients: one attempt to create an order downstream.
//!
//! Every client resolves to one of the three `Outcome`s; transport errors are
//! classified before they reach the engine. Whenever a client learns that the
//! order now exists downstream it records that in the idempotency oracle
//! before returning, which is what makes retrying an ambiguous attempt safe.

mod http;
mod simulated;

use async_trait::async_trait;

use crate::retry::Outcome;

pub(crate) use http::CONNECT_TIMEOUT;
pub use http::HttpSubmissionClient;
pub use simulated::SimulatedClient;

#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Perform one creation attempt for `reference`.
    async fn submit(&self, reference: &str) -> Outcome;
}
