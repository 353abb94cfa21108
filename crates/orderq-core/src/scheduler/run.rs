//! The scheduler loop and its per-tick step.

use std::future::Future;

use crate::config::{IngestBatch, OrderqConfig};
use crate::engine::{RetryEngine, TickReport};
use crate::error::Result;
use crate::order_db::{OrderDb, OrderStatus, StatusCounts};

use super::batch::batch_limit;
use super::clock::Clock;

/// Scheduler tuning, usually built from `OrderqConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub max_retry_per_cron: u32,
    pub max_queue_size_before_throttle: u64,
    pub adaptive_batch: bool,
    pub reference_prefix: String,
    pub ingest: Vec<IngestBatch>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&OrderqConfig::default())
    }
}

impl SchedulerSettings {
    pub fn from_config(cfg: &OrderqConfig) -> Self {
        Self {
            max_retry_per_cron: cfg.max_retry_per_cron,
            max_queue_size_before_throttle: cfg.max_queue_size_before_throttle,
            adaptive_batch: cfg.adaptive_batch,
            reference_prefix: cfg.reference_prefix.clone(),
            ingest: cfg.ingest.clone(),
        }
    }

    /// Orders scheduled for ingestion on tick `index` (bursts on the same tick add up).
    fn scheduled_ingest(&self, index: u64) -> Option<u32> {
        let mut bursts = self.ingest.iter().filter(|b| b.tick == index).peekable();
        bursts.peek()?;
        Some(bursts.fold(0u32, |acc, b| acc.saturating_add(b.count)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    Ingested(u32),
    /// Skipped because `queued` orders were already waiting.
    Throttled { queued: u64 },
}

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub index: u64,
    pub now: i64,
    pub ingest: Option<IngestResult>,
    pub batch_limit: u32,
    pub report: TickReport,
}

/// Cumulative totals for one `Scheduler::run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks abandoned because the store (or the oracle) was unavailable.
    pub aborted_ticks: u64,
    pub ingested: u64,
    pub throttled_ingests: u64,
    pub attempts: u64,
    pub recovered_after_timeout: u64,
    /// Store totals at shutdown.
    pub created: u64,
    pub failed: u64,
    pub queued: u64,
}

impl RunSummary {
    fn record(&mut self, tick: &TickSummary) {
        match tick.ingest {
            Some(IngestResult::Ingested(n)) => self.ingested += u64::from(n),
            Some(IngestResult::Throttled { .. }) => self.throttled_ingests += 1,
            None => {}
        }
        self.attempts += u64::from(tick.report.processed);
        self.recovered_after_timeout += u64::from(tick.report.recovered_after_timeout);
    }

    fn set_counts(&mut self, counts: StatusCounts) {
        self.created = counts.created;
        self.failed = counts.failed;
        self.queued = counts.queued;
    }
}

pub struct Scheduler {
    db: OrderDb,
    engine: RetryEngine,
    settings: SchedulerSettings,
    clock: Clock,
}

impl Scheduler {
    pub fn new(db: OrderDb, engine: RetryEngine, settings: SchedulerSettings, clock: Clock) -> Self {
        Self {
            db,
            engine,
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run ticks until `max_ticks` have fired (None = no limit) or `shutdown` resolves.
    ///
    /// Shutdown is only observed between ticks. A tick that fails on the store
    /// is logged and counted; the loop carries on with the next one.
    pub async fn run<F>(&self, max_ticks: Option<u64>, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = self.clock.ticker();
        let mut summary = RunSummary::default();
        let mut index: u64 = 0;

        while max_ticks.map_or(true, |max| index < max) {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!(ticks = index, "shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let now = self.clock.now_for_tick(index);
            match self.run_tick(index, now).await {
                Ok(tick) => summary.record(&tick),
                Err(err) => {
                    summary.aborted_ticks += 1;
                    tracing::warn!(tick = index, error = %err, "tick aborted; retrying on the next tick");
                }
            }
            index += 1;
        }
        summary.ticks = index;

        match self.db.status_counts().await {
            Ok(counts) => summary.set_counts(counts),
            Err(err) => tracing::warn!(error = %err, "could not read final order counts"),
        }
        tracing::info!(
            ticks = summary.ticks,
            aborted = summary.aborted_ticks,
            ingested = summary.ingested,
            attempts = summary.attempts,
            created = summary.created,
            failed = summary.failed,
            queued = summary.queued,
            "scheduler stopped"
        );
        Ok(summary)
    }

    /// One tick: scheduled ingestion (subject to the throttle), then one retry pass.
    pub async fn run_tick(&self, index: u64, now: i64) -> Result<TickSummary> {
        let ingest = match self.settings.scheduled_ingest(index) {
            Some(count) => Some(self.ingest(count, now).await?),
            None => None,
        };
        let (batch_limit, report) = self.retry_pass(now).await?;
        Ok(TickSummary {
            index,
            now,
            ingest,
            batch_limit,
            report,
        })
    }

    /// Size the batch and run the engine once. Returns the batch limit used.
    pub async fn retry_pass(&self, now: i64) -> Result<(u32, TickReport)> {
        let backlog = if self.settings.adaptive_batch {
            self.db.count_by_status(OrderStatus::Queued).await?
        } else {
            0
        };
        let limit = batch_limit(
            self.settings.max_retry_per_cron,
            self.settings.adaptive_batch,
            backlog,
        );
        tracing::debug!(now, batch_limit = limit, backlog, "retry pass");
        let report = self.engine.tick(now, limit).await?;
        Ok((limit, report))
    }

    pub async fn ingest(&self, count: u32, now: i64) -> Result<IngestResult> {
        ingest_throttled(
            &self.db,
            count,
            &self.settings.reference_prefix,
            self.settings.max_queue_size_before_throttle,
            now,
        )
        .await
    }
}

/// Ingest `count` fresh orders unless `threshold` or more orders are already queued.
pub async fn ingest_throttled(
    db: &OrderDb,
    count: u32,
    reference_prefix: &str,
    threshold: u64,
    now: i64,
) -> Result<IngestResult> {
    let queued = db.count_by_status(OrderStatus::Queued).await?;
    if queued >= threshold {
        tracing::warn!(
            queued,
            threshold,
            requested = count,
            "queue at throttle threshold; skipping ingestion"
        );
        return Ok(IngestResult::Throttled { queued });
    }

    let references = db.upsert_batch(count, reference_prefix, now).await?;
    let inserted = references.len() as u32;
    if inserted < count {
        tracing::warn!(requested = count, inserted, "some generated references already existed");
    }
    tracing::info!(count = inserted, queued, "ingested new orders");
    Ok(IngestResult::Ingested(inserted))
}
