use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::CONNECT_TIMEOUT;
use crate::error::OrderError;
use crate::retry::BackoffPolicy;

/// Backoff parameters (`[backoff]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry, in seconds (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Upper bound on any backoff delay, in seconds.
    pub max_delay_secs: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 1.0,
            max_delay_secs: 16.0,
        }
    }
}

/// One scheduled ingestion burst: `count` new orders on scheduler tick `tick` (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestBatch {
    pub tick: u64,
    pub count: u32,
}

/// Outcome weights for the simulated downstream (`[simulation]` section).
///
/// Weights are relative; they do not need to sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Timeout with nothing created downstream.
    pub timeout_weight: f64,
    /// Timeout reported although the order was created.
    pub timeout_after_create_weight: f64,
    /// Create, or report a duplicate if the order already exists.
    pub create_or_duplicate_weight: f64,
    /// Clean success.
    pub success_weight: f64,
    /// Fixed RNG seed for reproducible runs (None = OS entropy).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timeout_weight: 0.5,
            timeout_after_create_weight: 0.2,
            create_or_duplicate_weight: 0.2,
            success_weight: 0.1,
            seed: None,
        }
    }
}

/// Global configuration loaded from `~/.config/orderq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderqConfig {
    /// Failed attempts after which an order becomes terminally `failed`.
    pub max_retries: u32,
    /// Upper bound on orders attempted per scheduler tick.
    pub max_retry_per_cron: u32,
    /// Ingestion is skipped while this many orders (or more) are queued.
    pub max_queue_size_before_throttle: u64,
    /// Scheduler tick interval in seconds.
    pub cron_interval_secs: f64,
    /// How long a claimed order stays invisible to other engines, in seconds.
    pub claim_lease_secs: u64,
    /// Size each tick's batch by backlog tiers (still capped by `max_retry_per_cron`).
    #[serde(default)]
    pub adaptive_batch: bool,
    /// Prefix for generated order references.
    pub reference_prefix: String,
    /// Downstream endpoint for real submissions (None = must pass `--endpoint` or `--simulate`).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-request timeout for the HTTP client, in seconds.
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Ingestion bursts keyed by tick index.
    #[serde(default)]
    pub ingest: Vec<IngestBatch>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for OrderqConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_retry_per_cron: 20,
            max_queue_size_before_throttle: 100,
            cron_interval_secs: 3600.0,
            claim_lease_secs: 300,
            adaptive_batch: false,
            reference_prefix: "ORD".to_string(),
            endpoint: None,
            http_timeout_secs: 10,
            backoff: BackoffConfig::default(),
            ingest: default_ingest_schedule(),
            simulation: SimulationConfig::default(),
        }
    }
}

fn default_ingest_schedule() -> Vec<IngestBatch> {
    [(0, 5), (4, 10), (8, 20), (12, 50), (18, 30), (24, 60), (36, 40)]
        .into_iter()
        .map(|(tick, count)| IngestBatch { tick, count })
        .collect()
}

fn secs(name: &str, value: f64) -> Result<Duration, OrderError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| OrderError::Configuration(format!("{name} = {value}: {e}")))
}

impl OrderqConfig {
    /// Reject thresholds that would make the scheduler misbehave. Called once at startup.
    pub fn validate(&self) -> Result<(), OrderError> {
        let bad = |msg: String| Err(OrderError::Configuration(msg));

        if self.max_retries == 0 {
            return bad("max_retries must be at least 1".into());
        }
        if self.max_retry_per_cron == 0 {
            return bad("max_retry_per_cron must be at least 1".into());
        }
        if self.max_queue_size_before_throttle == 0 {
            return bad("max_queue_size_before_throttle must be at least 1".into());
        }
        if self.claim_lease_secs == 0 {
            return bad("claim_lease_secs must be at least 1".into());
        }
        if self.http_timeout_secs == 0 {
            return bad("http_timeout_secs must be at least 1".into());
        }
        // A lease must outlive one whole attempt, or the order is due again while in flight.
        let longest_attempt = self.http_timeout() + CONNECT_TIMEOUT;
        if self.claim_lease() <= longest_attempt {
            return bad(format!(
                "claim_lease_secs ({}) must exceed http_timeout_secs plus the {}s connect timeout ({}s)",
                self.claim_lease_secs,
                CONNECT_TIMEOUT.as_secs(),
                longest_attempt.as_secs()
            ));
        }
        if self.reference_prefix.trim().is_empty() {
            return bad("reference_prefix must not be empty".into());
        }
        let interval = secs("cron_interval_secs", self.cron_interval_secs)?;
        if interval.is_zero() {
            return bad("cron_interval_secs must be positive".into());
        }
        let policy = self.backoff_policy()?;
        if policy.max_delay < policy.base_delay {
            return bad(format!(
                "backoff.max_delay_secs ({}) is below backoff.base_delay_secs ({})",
                self.backoff.max_delay_secs, self.backoff.base_delay_secs
            ));
        }

        let sim = &self.simulation;
        let weights = [
            sim.timeout_weight,
            sim.timeout_after_create_weight,
            sim.create_or_duplicate_weight,
            sim.success_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return bad("simulation weights must be finite and non-negative".into());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return bad("simulation weights must not all be zero".into());
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> Result<BackoffPolicy, OrderError> {
        Ok(BackoffPolicy::new(
            secs("backoff.base_delay_secs", self.backoff.base_delay_secs)?,
            secs("backoff.max_delay_secs", self.backoff.max_delay_secs)?,
        ))
    }

    pub fn cron_interval(&self) -> Result<Duration, OrderError> {
        secs("cron_interval_secs", self.cron_interval_secs)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("orderq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<OrderqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = OrderqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load and validate configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<OrderqConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: OrderqConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
