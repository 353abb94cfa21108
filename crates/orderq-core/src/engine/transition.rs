//! Pure per-order state machine: `queued -> created | failed | queued (rescheduled)`.

use crate::order_db::{add_ms, Order, OrderStatus, Transition};
use crate::retry::{BackoffPolicy, Outcome};

/// What one attempt amounted to once the oracle has been consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Downstream confirmed creation.
    Created,
    /// Ambiguous (or last-chance) attempt that the oracle shows was created.
    Confirmed { after: Outcome },
    /// Attempt did not create the order.
    Failed(Outcome),
}

/// Compute the new state for `order` after an attempt at `now`.
///
/// A confirmed order keeps its retry count: an attempt that actually
/// succeeded is never counted as a failure.
pub(crate) fn plan(
    order: &Order,
    resolution: Resolution,
    now: i64,
    policy: &BackoffPolicy,
    max_retries: u32,
) -> Transition {
    let (status, retries, next_retry_at, last_outcome) = match resolution {
        Resolution::Created => (OrderStatus::Created, order.retries, now, Outcome::Created),
        Resolution::Confirmed { after } => (OrderStatus::Created, order.retries, now, after),
        Resolution::Failed(outcome) => {
            let retries = order.retries.saturating_add(1);
            if retries >= max_retries {
                (OrderStatus::Failed, retries, now, outcome)
            } else {
                let next = add_ms(now, policy.delay_after_failure(retries));
                (OrderStatus::Queued, retries, next, outcome)
            }
        }
    };
    Transition {
        order_reference: order.order_reference.clone(),
        status,
        retries,
        last_attempt_at: now,
        next_retry_at,
        last_outcome,
    }
}
