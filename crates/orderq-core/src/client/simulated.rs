//! Simulated downstream with random, weighted outcomes.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

use super::SubmissionClient;
use crate::config::SimulationConfig;
use crate::oracle::IdempotencyOracle;
use crate::retry::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Draw {
    Timeout,
    TimeoutAfterCreate,
    CreateOrDuplicate,
    Success,
}

/// Stand-in for an unreliable downstream. The oracle plays the part of the
/// downstream order store: an order "exists" once it has been recorded there.
pub struct SimulatedClient {
    oracle: Arc<dyn IdempotencyOracle>,
    weights: [(Draw, f64); 4],
    rng: Mutex<StdRng>,
}

impl SimulatedClient {
    pub fn new(oracle: Arc<dyn IdempotencyOracle>, cfg: &SimulationConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            oracle,
            weights: [
                (Draw::Timeout, cfg.timeout_weight),
                (Draw::TimeoutAfterCreate, cfg.timeout_after_create_weight),
                (Draw::CreateOrDuplicate, cfg.create_or_duplicate_weight),
                (Draw::Success, cfg.success_weight),
            ],
            rng: Mutex::new(rng),
        }
    }

    fn draw(&self) -> Draw {
        let total: f64 = self.weights.iter().map(|(_, w)| w).sum();
        let mut point = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.random::<f64>() * total
        };
        for (draw, weight) in self.weights {
            if point < weight {
                return draw;
            }
            point -= weight;
        }
        // Floating point leftovers land on the last non-zero bucket.
        self.weights
            .iter()
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(d, _)| *d)
            .unwrap_or(Draw::Timeout)
    }

    /// Create the order downstream. A creation we cannot record is a failed creation.
    async fn create(&self, reference: &str) -> Option<bool> {
        match self.oracle.record_created(reference).await {
            Ok(first) => Some(first),
            Err(err) => {
                tracing::warn!(order = %reference, error = %err, "simulated create failed to record");
                None
            }
        }
    }
}

#[async_trait]
impl SubmissionClient for SimulatedClient {
    async fn submit(&self, reference: &str) -> Outcome {
        match self.draw() {
            Draw::Timeout => Outcome::AmbiguousTimeout,
            Draw::TimeoutAfterCreate => match self.create(reference).await {
                Some(_) => Outcome::AmbiguousTimeout,
                None => Outcome::HardFailure,
            },
            Draw::CreateOrDuplicate => match self.create(reference).await {
                Some(true) => Outcome::Created,
                Some(false) => {
                    tracing::debug!(order = %reference, "duplicate order reported by downstream");
                    Outcome::Created
                }
                None => Outcome::HardFailure,
            },
            Draw::Success => match self.create(reference).await {
                Some(_) => Outcome::Created,
                None => Outcome::HardFailure,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MemoryOracle;

    fn only(draw: Draw, seed: u64) -> SimulationConfig {
        SimulationConfig {
            timeout_weight: (draw == Draw::Timeout) as u8 as f64,
            timeout_after_create_weight: (draw == Draw::TimeoutAfterCreate) as u8 as f64,
            create_or_duplicate_weight: (draw == Draw::CreateOrDuplicate) as u8 as f64,
            success_weight: (draw == Draw::Success) as u8 as f64,
            seed: Some(seed),
        }
    }

    #[tokio::test]
    async fn pure_timeout_creates_nothing() {
        let oracle = Arc::new(MemoryOracle::new());
        let client = SimulatedClient::new(oracle.clone(), &only(Draw::Timeout, 1));
        for _ in 0..10 {
            assert_eq!(client.submit("ORD-1").await, Outcome::AmbiguousTimeout);
        }
        assert!(oracle.is_empty());
    }

    #[tokio::test]
    async fn timeout_after_create_records_before_returning() {
        let oracle = Arc::new(MemoryOracle::new());
        let client = SimulatedClient::new(oracle.clone(), &only(Draw::TimeoutAfterCreate, 1));
        assert_eq!(client.submit("ORD-1").await, Outcome::AmbiguousTimeout);
        assert!(oracle.exists("ORD-1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_is_reported_as_created_once() {
        let oracle = Arc::new(MemoryOracle::new());
        let client = SimulatedClient::new(oracle.clone(), &only(Draw::CreateOrDuplicate, 1));
        assert_eq!(client.submit("ORD-1").await, Outcome::Created);
        assert_eq!(client.submit("ORD-1").await, Outcome::Created);
        assert_eq!(oracle.len(), 1);
    }

    #[tokio::test]
    async fn seeded_runs_are_reproducible() {
        let cfg = SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        };
        let a = SimulatedClient::new(Arc::new(MemoryOracle::new()), &cfg);
        let b = SimulatedClient::new(Arc::new(MemoryOracle::new()), &cfg);
        let draws_a: Vec<_> = (0..50).map(|_| a.draw()).collect();
        let draws_b: Vec<_> = (0..50).map(|_| b.draw()).collect();
        assert_eq!(draws_a, draws_b);
        // Default weights put half the mass on plain timeouts.
        assert!(draws_a.contains(&Draw::Timeout));
    }
}
