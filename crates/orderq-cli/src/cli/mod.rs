//! CLI for the orderq retry scheduler.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use orderq_core::config;
use orderq_core::order_db::OrderDb;

use commands::{
    run_add, run_dead_letters, run_ingest, run_scheduler, run_status, run_tick, ClientArgs,
};

/// Top-level CLI for the orderq retry scheduler.
#[derive(Debug, Parser)]
#[command(name = "orderq")]
#[command(about = "orderq: durable order submission with retries and backoff", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue orders by reference (existing references are left alone).
    Add {
        /// Order references.
        #[arg(required = true)]
        references: Vec<String>,
    },

    /// Generate and queue N new orders, unless the queue is over the throttle threshold.
    Ingest {
        /// Number of orders to generate.
        count: u32,
        /// Reference prefix (defaults to `reference_prefix` from config).
        #[arg(long, value_name = "P")]
        prefix: Option<String>,
    },

    /// Run a single retry pass over the orders due now.
    Tick {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Run the scheduler loop until interrupted (or for N ticks).
    Run {
        /// Stop after N ticks.
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        #[command(flatten)]
        client: ClientArgs,
        /// With --simulate: real pause between ticks, in milliseconds.
        #[arg(long, default_value = "0", value_name = "MS")]
        pace_ms: u64,
    },

    /// Show order counts (and optionally the most recent orders).
    Status {
        /// List orders, newest first.
        #[arg(long)]
        list: bool,
        /// Maximum orders to list.
        #[arg(long, default_value = "50", value_name = "N")]
        limit: u32,
    },

    /// List orders that failed permanently.
    DeadLetters,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        cfg.validate()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = OrderDb::open_default().await?;

        match cli.command {
            CliCommand::Add { references } => run_add(&db, &references).await?,
            CliCommand::Ingest { count, prefix } => {
                run_ingest(&db, &cfg, count, prefix.as_deref()).await?
            }
            CliCommand::Tick { client } => run_tick(&db, &cfg, &client).await?,
            CliCommand::Run {
                ticks,
                client,
                pace_ms,
            } => run_scheduler(&db, &cfg, &client, ticks, pace_ms).await?,
            CliCommand::Status { list, limit } => run_status(&db, list, limit).await?,
            CliCommand::DeadLetters => run_dead_letters(&db).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
