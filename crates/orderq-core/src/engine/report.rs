use crate::order_db::OrderRef;

/// Per-tick tallies for logging and metrics collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Orders attempted this tick.
    pub processed: u32,
    /// Orders that reached `created` (including the recovered ones).
    pub succeeded: u32,
    /// Orders that reached terminal `failed`.
    pub failed: u32,
    /// Orders that stay queued with a later `next_retry_at`.
    pub rescheduled: u32,
    /// Attempts whose result the store rejected because the order was already settled.
    pub superseded: u32,
    /// Subset of `succeeded` whose attempt was ambiguous or exhausted but the oracle had the order.
    pub recovered_after_timeout: u32,
    /// References that failed permanently this tick, for manual inspection.
    pub terminal_failures: Vec<OrderRef>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.processed == 0
    }
}
