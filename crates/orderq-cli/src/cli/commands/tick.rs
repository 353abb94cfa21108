//! `orderq tick` – one retry pass over the orders due now.

use anyhow::Result;
use orderq_core::config::OrderqConfig;
use orderq_core::order_db::{now_ms, OrderDb};
use orderq_core::scheduler::{Clock, Scheduler, SchedulerSettings};

use super::client::{build_engine, ClientArgs};

pub async fn run_tick(db: &OrderDb, cfg: &OrderqConfig, args: &ClientArgs) -> Result<()> {
    let engine = build_engine(db, cfg, args)?;
    let clock = Clock::Wall {
        interval: cfg.cron_interval()?,
    };
    let scheduler = Scheduler::new(db.clone(), engine, SchedulerSettings::from_config(cfg), clock);

    let (limit, report) = scheduler.retry_pass(now_ms()).await?;
    if report.is_idle() {
        println!("No orders due.");
        return Ok(());
    }
    println!(
        "Processed {} of at most {limit}: {} created ({} recovered after timeout), {} rescheduled, {} failed",
        report.processed,
        report.succeeded,
        report.recovered_after_timeout,
        report.rescheduled,
        report.failed
    );
    if report.superseded > 0 {
        println!("  {} already settled elsewhere", report.superseded);
    }
    for reference in &report.terminal_failures {
        println!("  failed: {reference}");
    }
    Ok(())
}
