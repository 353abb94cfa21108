//! `orderq ingest <N>` – generate and queue new orders, honoring the throttle.

use anyhow::Result;
use orderq_core::config::OrderqConfig;
use orderq_core::order_db::{now_ms, OrderDb};
use orderq_core::scheduler::{ingest_throttled, IngestResult};

pub async fn run_ingest(
    db: &OrderDb,
    cfg: &OrderqConfig,
    count: u32,
    prefix: Option<&str>,
) -> Result<()> {
    let prefix = prefix.unwrap_or(&cfg.reference_prefix);
    if prefix.trim().is_empty() {
        anyhow::bail!("reference prefix must not be empty");
    }
    match ingest_throttled(db, count, prefix, cfg.max_queue_size_before_throttle, now_ms()).await? {
        IngestResult::Ingested(n) => println!("Ingested {n} order(s) with prefix {prefix}"),
        IngestResult::Throttled { queued } => println!(
            "Skipped: {queued} order(s) queued (throttle at {})",
            cfg.max_queue_size_before_throttle
        ),
    }
    Ok(())
}
