//! Scheduler loop.
//!
//! Fires the retry engine at a fixed interval, ingests scheduled bursts of
//! new orders unless the queued backlog is over the throttle threshold, and
//! reports cumulative totals on shutdown. Ticks never overlap: the loop only
//! waits for the next tick (or a shutdown signal) between ticks, so a tick in
//! progress always finishes its in-flight attempts.

mod batch;
mod clock;
mod run;

pub use batch::{backlog_batch_size, batch_limit};
pub use clock::Clock;
pub use run::{
    ingest_throttled, IngestResult, RunSummary, Scheduler, SchedulerSettings, TickSummary,
};
