//! Submission client selection shared by `tick` and `run`.

use anyhow::Result;
use clap::Args;
use orderq_core::client::{HttpSubmissionClient, SimulatedClient, SubmissionClient};
use orderq_core::config::OrderqConfig;
use orderq_core::engine::{EngineSettings, RetryEngine};
use orderq_core::oracle::IdempotencyOracle;
use orderq_core::order_db::OrderDb;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Args)]
pub struct ClientArgs {
    /// Submit to a simulated downstream instead of an HTTP endpoint.
    #[arg(long, conflicts_with = "endpoint")]
    pub simulate: bool,
    /// Downstream endpoint (overrides `endpoint` from config).
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,
}

/// Build the engine; the store doubles as the idempotency oracle.
pub fn build_engine(db: &OrderDb, cfg: &OrderqConfig, args: &ClientArgs) -> Result<RetryEngine> {
    let oracle: Arc<dyn IdempotencyOracle> = Arc::new(db.clone());
    let client: Arc<dyn SubmissionClient> = if args.simulate {
        tracing::info!("submitting to the simulated downstream");
        Arc::new(SimulatedClient::new(Arc::clone(&oracle), &cfg.simulation))
    } else {
        let endpoint = args
            .endpoint
            .clone()
            .or_else(|| cfg.endpoint.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("no endpoint configured; pass --endpoint URL or --simulate")
            })?;
        tracing::info!(%endpoint, "submitting over HTTP");
        Arc::new(HttpSubmissionClient::new(
            endpoint,
            cfg.http_timeout(),
            Arc::clone(&oracle),
        ))
    };
    let settings = EngineSettings::from_config(cfg)?;
    Ok(RetryEngine::new(db.clone(), client, oracle, settings))
}
