//! Types used by the order database.

use crate::retry::Outcome;

/// Order reference (primary key), unique for the lifetime of the store.
pub type OrderRef = String;

/// Lifecycle state stored as a string in the database.
///
/// `Created` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Queued,
    Created,
    Failed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Queued => "queued",
            OrderStatus::Created => "created",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(OrderStatus::Queued),
            "created" => Some(OrderStatus::Created),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Queued)
    }
}

/// Full order record. Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_reference: OrderRef,
    pub status: OrderStatus,
    pub retries: u32,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    pub next_retry_at: i64,
    /// Lease deadline set by `claim_due`; None when unclaimed.
    pub claimed_until: Option<i64>,
}

/// New state for one order, written atomically by `apply_transition(s)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub order_reference: OrderRef,
    pub status: OrderStatus,
    pub retries: u32,
    pub last_attempt_at: i64,
    pub next_retry_at: i64,
    /// Outcome of the attempt that produced this transition (dead-letter reason).
    pub last_outcome: Outcome,
}

/// Per-status totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: u64,
    pub created: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.queued + self.created + self.failed
    }
}

/// Durable record of an order that failed permanently, kept for manual handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub order_reference: OrderRef,
    pub retries: u32,
    pub last_attempt_at: Option<i64>,
    pub reason: String,
    pub recorded_at: i64,
}
