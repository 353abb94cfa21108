//! HTTP submission client (libcurl).
//!
//! POSTs `{"order_reference": ...}` to the configured endpoint with the
//! reference doubling as the `Idempotency-Key` header, and classifies the
//! result: 2xx/409 created, timeouts ambiguous, everything else a hard failure.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::SubmissionClient;
use crate::oracle::IdempotencyOracle;
use crate::retry::{classify, Outcome, SubmitError};

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSubmissionClient {
    endpoint: String,
    timeout: Duration,
    oracle: Arc<dyn IdempotencyOracle>,
}

impl HttpSubmissionClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, oracle: Arc<dyn IdempotencyOracle>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            oracle,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// One blocking POST. Runs in the current thread; call from `spawn_blocking`.
fn post_order(endpoint: &str, reference: &str, timeout: Duration) -> Result<(), SubmitError> {
    let body = serde_json::json!({ "order_reference": reference }).to_string();

    let mut easy = curl::easy::Easy::new();
    easy.url(endpoint)?;
    easy.post(true)?;
    easy.post_fields_copy(body.as_bytes())?;
    easy.connect_timeout(CONNECT_TIMEOUT.min(timeout))?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Content-Type: application/json")?;
    list.append(&format!("Idempotency-Key: {}", reference))?;
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        // Response body is not needed; only the status code matters.
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(SubmitError::Http(code))
    }
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
    async fn submit(&self, reference: &str) -> Outcome {
        let endpoint = self.endpoint.clone();
        let owned = reference.to_string();
        let timeout = self.timeout;
        let res = tokio::task::spawn_blocking(move || post_order(&endpoint, &owned, timeout)).await;

        let outcome = match res {
            Ok(Ok(())) => Outcome::Created,
            Ok(Err(err)) => {
                let outcome = classify(&err);
                tracing::debug!(order = %reference, error = %err, %outcome, "submission error");
                outcome
            }
            Err(join_err) => {
                // The request may or may not have left the process.
                tracing::warn!(order = %reference, error = %join_err, "submission task failed");
                Outcome::AmbiguousTimeout
            }
        };

        if outcome == Outcome::Created {
            if let Err(err) = self.oracle.record_created(reference).await {
                // Downstream confirmed the order; the engine marks it created regardless.
                tracing::warn!(order = %reference, error = %err, "could not record created order");
            }
        }
        outcome
    }
}
