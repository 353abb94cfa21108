//! Retry engine: the per-tick core of the scheduler.
//!
//! A tick claims a bounded batch of due orders, attempts each one
//! concurrently through the submission client, resolves ambiguous outcomes
//! through the idempotency oracle, applies the backoff policy, and persists
//! every resulting transition in one transaction. If the store fails at any
//! point the tick writes nothing and releases its claims; the scheduler
//! tries again on its next tick.

mod report;
mod transition;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::client::SubmissionClient;
use crate::config::OrderqConfig;
use crate::error::{OrderError, Result};
use crate::oracle::IdempotencyOracle;
use crate::order_db::{Order, OrderDb, OrderRef, OrderStatus, Transition};
use crate::retry::{BackoffPolicy, Outcome};

pub use report::TickReport;
use transition::{plan, Resolution};

/// Engine tuning, usually built from `OrderqConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub policy: BackoffPolicy,
    /// Failed attempts after which an order becomes terminally `failed`.
    pub max_retries: u32,
    /// Lease taken on claimed orders for the duration of a tick.
    pub claim_lease: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::default(),
            max_retries: 5,
            claim_lease: Duration::from_secs(300),
        }
    }
}

impl EngineSettings {
    pub fn from_config(cfg: &OrderqConfig) -> Result<Self> {
        Ok(Self {
            policy: cfg.backoff_policy()?,
            max_retries: cfg.max_retries,
            claim_lease: cfg.claim_lease(),
        })
    }
}

#[derive(Clone)]
pub struct RetryEngine {
    db: OrderDb,
    client: Arc<dyn SubmissionClient>,
    oracle: Arc<dyn IdempotencyOracle>,
    settings: EngineSettings,
}

impl RetryEngine {
    pub fn new(
        db: OrderDb,
        client: Arc<dyn SubmissionClient>,
        oracle: Arc<dyn IdempotencyOracle>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            db,
            client,
            oracle,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Attempt up to `batch_limit` orders that are due at `now` (Unix ms).
    ///
    /// All in-flight attempts finish before this returns.
    pub async fn tick(&self, now: i64, batch_limit: u32) -> Result<TickReport> {
        let orders = self
            .db
            .claim_due(now, batch_limit, self.settings.claim_lease)
            .await?;
        if orders.is_empty() {
            tracing::debug!("no orders due");
            return Ok(TickReport::default());
        }
        let claimed: Vec<OrderRef> = orders.iter().map(|o| o.order_reference.clone()).collect();

        let mut join_set = JoinSet::new();
        for order in orders {
            let client = Arc::clone(&self.client);
            let oracle = Arc::clone(&self.oracle);
            let max_retries = self.settings.max_retries;
            join_set.spawn(async move {
                let resolution = attempt(client.as_ref(), oracle.as_ref(), &order, max_retries).await;
                (order, resolution)
            });
        }

        let mut planned: Vec<(Transition, Resolution)> = Vec::with_capacity(claimed.len());
        let mut abort: Option<OrderError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((order, Ok(resolution))) => {
                    let t = plan(
                        &order,
                        resolution,
                        now,
                        &self.settings.policy,
                        self.settings.max_retries,
                    );
                    planned.push((t, resolution));
                }
                Ok((order, Err(err))) => {
                    tracing::warn!(order = %order.order_reference, error = %err, "oracle check failed");
                    abort.get_or_insert(err);
                }
                Err(join_err) => {
                    // The order stays claimed; it becomes due again when the lease expires.
                    tracing::error!(error = %join_err, "attempt task failed");
                }
            }
        }

        if let Some(err) = abort {
            self.release(&claimed).await;
            return Err(err);
        }

        let transitions: Vec<Transition> = planned.iter().map(|(t, _)| t.clone()).collect();
        let applied = match self.db.apply_transitions(&transitions).await {
            Ok(applied) => applied,
            Err(err) => {
                self.release(&claimed).await;
                return Err(err);
            }
        };

        let report = summarize(&planned, &applied);
        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            rescheduled = report.rescheduled,
            recovered = report.recovered_after_timeout,
            superseded = report.superseded,
            "tick complete"
        );
        Ok(report)
    }

    async fn release(&self, claimed: &[OrderRef]) {
        if let Err(err) = self.db.release_claims(claimed).await {
            tracing::warn!(error = %err, "could not release claims; they expire with the lease");
        }
    }
}

/// Submit once and resolve the outcome. The oracle is consulted only after an
/// ambiguous attempt, or when a hard failure would exhaust the order's retries.
async fn attempt(
    client: &dyn SubmissionClient,
    oracle: &dyn IdempotencyOracle,
    order: &Order,
    max_retries: u32,
) -> Result<Resolution> {
    let reference = order.order_reference.as_str();
    let outcome = client.submit(reference).await;
    let resolution = match outcome {
        Outcome::Created => Resolution::Created,
        Outcome::AmbiguousTimeout => {
            if oracle.exists(reference).await? {
                Resolution::Confirmed { after: outcome }
            } else {
                Resolution::Failed(outcome)
            }
        }
        Outcome::HardFailure => {
            let exhausting = order.retries.saturating_add(1) >= max_retries;
            if exhausting && oracle.exists(reference).await? {
                Resolution::Confirmed { after: outcome }
            } else {
                Resolution::Failed(outcome)
            }
        }
    };
    tracing::debug!(order = %reference, %outcome, ?resolution, "attempt resolved");
    Ok(resolution)
}

/// Tally only what the store accepted. A rejected transition means the order
/// was already settled elsewhere (e.g. by another engine after our lease ran out).
fn summarize(planned: &[(Transition, Resolution)], applied: &[bool]) -> TickReport {
    let mut report = TickReport::default();
    for ((t, resolution), &written) in planned.iter().zip(applied) {
        report.processed += 1;
        if !written {
            report.superseded += 1;
            tracing::warn!(
                order = %t.order_reference,
                planned = t.status.as_str(),
                "transition rejected by the store; order already settled"
            );
            continue;
        }
        match t.status {
            OrderStatus::Created => {
                report.succeeded += 1;
                if matches!(resolution, Resolution::Confirmed { .. }) {
                    report.recovered_after_timeout += 1;
                    tracing::info!(order = %t.order_reference, "order confirmed created despite failed attempt");
                }
            }
            OrderStatus::Queued => {
                report.rescheduled += 1;
                let err = OrderError::TransientFailure {
                    reference: t.order_reference.clone(),
                    retries: t.retries,
                };
                tracing::debug!(next_retry_at = t.next_retry_at, "{}", err);
            }
            OrderStatus::Failed => {
                report.failed += 1;
                report.terminal_failures.push(t.order_reference.clone());
                let err = OrderError::TerminalFailure {
                    reference: t.order_reference.clone(),
                    retries: t.retries,
                };
                tracing::warn!(last_outcome = %t.last_outcome, "{}", err);
            }
        }
    }
    report.terminal_failures.sort();
    report
}

#[cfg(test)]
mod tests;
