//! `orderq run` – run the scheduler loop.

use anyhow::Result;
use orderq_core::config::OrderqConfig;
use orderq_core::order_db::{now_ms, OrderDb};
use orderq_core::scheduler::{Clock, Scheduler, SchedulerSettings};
use std::time::Duration;

use super::client::{build_engine, ClientArgs};

pub async fn run_scheduler(
    db: &OrderDb,
    cfg: &OrderqConfig,
    args: &ClientArgs,
    ticks: Option<u64>,
    pace_ms: u64,
) -> Result<()> {
    let engine = build_engine(db, cfg, args)?;
    let interval = cfg.cron_interval()?;
    // Simulated runs advance logical time by one interval per tick.
    let clock = if args.simulate {
        Clock::Simulated {
            start_ms: now_ms(),
            step: interval,
            pace: Duration::from_millis(pace_ms),
        }
    } else {
        Clock::Wall { interval }
    };
    let scheduler = Scheduler::new(db.clone(), engine, SchedulerSettings::from_config(cfg), clock);

    let summary = scheduler.run(ticks, shutdown_signal()).await?;
    println!(
        "Ran {} tick(s): ingested {}, attempts {}, recovered after timeout {}",
        summary.ticks, summary.ingested, summary.attempts, summary.recovered_after_timeout
    );
    if summary.aborted_ticks > 0 || summary.throttled_ingests > 0 {
        println!(
            "Aborted ticks: {}, throttled ingestions: {}",
            summary.aborted_ticks, summary.throttled_ingests
        );
    }
    println!(
        "Orders: {} created, {} failed, {} queued",
        summary.created, summary.failed, summary.queued
    );
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
