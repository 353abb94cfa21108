//! Persistent order database (SQLite via sqlx).
//!
//! System of record for every order's lifecycle, plus the durable
//! idempotency set (`created_orders`) and the dead-letter sink for orders
//! that failed permanently.

mod db;
mod dead_letter;
mod oracle;
mod orders;
mod types;

pub use db::{now_ms, OrderDb};
pub(crate) use db::add_ms;
pub use types::*;

#[cfg(test)]
pub(crate) use db::open_memory;
