//! Engine tests against an in-memory store and a scripted downstream.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{EngineSettings, RetryEngine};
use crate::client::SubmissionClient;
use crate::error::{OrderError, Result};
use crate::oracle::{IdempotencyOracle, MemoryOracle};
use crate::order_db::{open_memory, OrderDb, OrderStatus};
use crate::retry::{BackoffPolicy, Outcome};

#[derive(Debug, Clone, Copy)]
enum Step {
    Return(Outcome),
    /// Downstream creates the order but the caller only sees a timeout.
    CreateThenTimeout,
}

/// Downstream double: per-reference scripts, then a fallback step forever.
struct ScriptedClient {
    oracle: Arc<MemoryOracle>,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Step,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(oracle: Arc<MemoryOracle>, fallback: Step) -> Self {
        Self {
            oracle,
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(self, reference: &str, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(reference.to_string(), steps.iter().copied().collect());
        self
    }

    fn calls_for(&self, reference: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == reference)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SubmissionClient for ScriptedClient {
    async fn submit(&self, reference: &str) -> Outcome {
        self.calls.lock().unwrap().push(reference.to_string());
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(reference)
            .and_then(|q| q.pop_front())
            .unwrap_or(self.fallback);
        match step {
            Step::Return(Outcome::Created) => {
                self.oracle.record_created(reference).await.unwrap();
                Outcome::Created
            }
            Step::Return(outcome) => outcome,
            Step::CreateThenTimeout => {
                self.oracle.record_created(reference).await.unwrap();
                Outcome::AmbiguousTimeout
            }
        }
    }
}

/// Oracle whose backing store is down.
struct UnavailableOracle;

#[async_trait]
impl IdempotencyOracle for UnavailableOracle {
    async fn exists(&self, _reference: &str) -> Result<bool> {
        Err(OrderError::StoreUnavailable(sqlx::Error::PoolClosed))
    }

    async fn record_created(&self, _reference: &str) -> Result<bool> {
        Err(OrderError::StoreUnavailable(sqlx::Error::PoolClosed))
    }
}

fn settings(max_retries: u32) -> EngineSettings {
    EngineSettings {
        policy: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(16)),
        max_retries,
        claim_lease: Duration::from_secs(60),
    }
}

fn engine(
    db: &OrderDb,
    client: &Arc<ScriptedClient>,
    oracle: &Arc<MemoryOracle>,
    max_retries: u32,
) -> RetryEngine {
    RetryEngine::new(
        db.clone(),
        client.clone(),
        oracle.clone(),
        settings(max_retries),
    )
}

async fn seed(db: &OrderDb, names: &[&str], now: i64) {
    let refs: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    db.insert_orders(&refs, now).await.unwrap();
}

/// Drive ticks at each order's `next_retry_at` until it is terminal; returns the offsets seen.
async fn backoff_offsets(max_retries: u32) -> (Vec<i64>, Arc<ScriptedClient>, OrderDb) {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        oracle.clone(),
        Step::Return(Outcome::HardFailure),
    ));
    let engine = engine(&db, &client, &oracle, max_retries);
    seed(&db, &["ORD-1"], 0).await;

    let mut offsets = Vec::new();
    let mut now = 0;
    loop {
        engine.tick(now, 10).await.unwrap();
        let order = db.get_order("ORD-1").await.unwrap().unwrap();
        if order.status.is_terminal() {
            break;
        }
        offsets.push(order.next_retry_at - now);
        now = order.next_retry_at;
    }
    (offsets, client, db)
}

#[tokio::test]
async fn hard_failures_back_off_then_fail_after_max_retries() {
    let (offsets, client, db) = backoff_offsets(5).await;
    assert_eq!(offsets, vec![1_000, 2_000, 4_000, 8_000]);
    assert_eq!(client.calls_for("ORD-1"), 5);

    let order = db.get_order("ORD-1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.retries, 5);
    assert_eq!(order.last_attempt_at, Some(15_000));

    let letters = db.list_dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].order_reference, "ORD-1");
}

#[tokio::test]
async fn backoff_offsets_are_capped() {
    let (offsets, client, _db) = backoff_offsets(7).await;
    assert_eq!(offsets, vec![1_000, 2_000, 4_000, 8_000, 16_000, 16_000]);
    assert_eq!(client.calls_for("ORD-1"), 7);
}

#[tokio::test]
async fn failed_orders_are_never_retried_again() {
    let (_offsets, client, db) = backoff_offsets(2).await;
    let oracle = Arc::new(MemoryOracle::new());
    let engine = engine(&db, &client, &oracle, 2);
    let before = db.get_order("ORD-1").await.unwrap().unwrap();
    for now in [100_000, 1_000_000, 10_000_000] {
        let report = engine.tick(now, 10).await.unwrap();
        assert!(report.is_idle());
    }
    assert_eq!(client.calls_for("ORD-1"), 2);
    assert_eq!(db.get_order("ORD-1").await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn ambiguous_timeout_found_in_oracle_is_created_without_retry() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(
        ScriptedClient::new(oracle.clone(), Step::Return(Outcome::HardFailure))
            .script("ORD-1", &[Step::CreateThenTimeout]),
    );
    let engine = engine(&db, &client, &oracle, 5);
    seed(&db, &["ORD-1"], 0).await;

    let report = engine.tick(10, 10).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.recovered_after_timeout, 1);
    assert_eq!(report.rescheduled, 0);

    let order = db.get_order("ORD-1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.retries, 0);
    assert_eq!(order.last_attempt_at, Some(10));
    assert_eq!(order.claimed_until, None);
}

#[tokio::test]
async fn unresolved_ambiguous_timeout_counts_as_failure() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        oracle.clone(),
        Step::Return(Outcome::AmbiguousTimeout),
    ));
    let engine = engine(&db, &client, &oracle, 5);
    seed(&db, &["ORD-1"], 0).await;

    let report = engine.tick(0, 10).await.unwrap();
    assert_eq!(report.rescheduled, 1);
    let order = db.get_order("ORD-1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Queued);
    assert_eq!(order.retries, 1);
    assert_eq!(order.next_retry_at, 1_000);
}

#[tokio::test]
async fn exhausted_order_found_in_oracle_is_created() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        oracle.clone(),
        Step::Return(Outcome::HardFailure),
    ));
    let engine = engine(&db, &client, &oracle, 1);
    seed(&db, &["ORD-1"], 0).await;
    // Created downstream by an earlier, unrecorded attempt.
    oracle.record_created("ORD-1").await.unwrap();

    let report = engine.tick(0, 10).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert!(report.terminal_failures.is_empty());
    let order = db.get_order("ORD-1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.retries, 0);
}

#[tokio::test]
async fn oracle_is_not_consulted_before_an_attempt() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        oracle.clone(),
        Step::Return(Outcome::HardFailure),
    ));
    let engine = engine(&db, &client, &oracle, 5);
    seed(&db, &["ORD-1"], 0).await;
    oracle.record_created("ORD-1").await.unwrap();

    // Hard failure with retries left: no oracle shortcut, the order is rescheduled.
    let report = engine.tick(0, 10).await.unwrap();
    assert_eq!(report.rescheduled, 1);
    assert_eq!(client.calls_for("ORD-1"), 1);
}

#[tokio::test]
async fn repeated_ambiguity_creates_at_most_once() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(oracle.clone(), Step::CreateThenTimeout));
    let engine = engine(&db, &client, &oracle, 5);
    seed(&db, &["a", "b", "c"], 0).await;

    for now in [0, 1_000, 10_000] {
        engine.tick(now, 10).await.unwrap();
    }
    assert_eq!(oracle.len(), 3);
    assert_eq!(client.total_calls(), 3);
    assert_eq!(db.status_counts().await.unwrap().created, 3);
}

#[tokio::test]
async fn batch_limit_bounds_work_and_prefers_fresh_orders() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(
        ScriptedClient::new(oracle.clone(), Step::Return(Outcome::Created))
            .script("veteran", &[Step::Return(Outcome::HardFailure)]),
    );
    let engine = engine(&db, &client, &oracle, 5);
    seed(&db, &["veteran"], 0).await;
    engine.tick(0, 1).await.unwrap();

    // veteran (1 retry, due at 1000) competes with three fresh orders.
    seed(&db, &["fresh-1"], 100).await;
    seed(&db, &["fresh-2"], 200).await;
    seed(&db, &["fresh-3"], 300).await;

    let report = engine.tick(5_000, 2).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(client.calls_for("fresh-1"), 1);
    assert_eq!(client.calls_for("fresh-2"), 1);
    assert_eq!(client.calls_for("veteran"), 1);

    let report = engine.tick(5_000, 2).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(client.calls_for("fresh-3"), 1);
    assert_eq!(client.calls_for("veteran"), 2);
    assert_eq!(db.count_by_status(OrderStatus::Queued).await.unwrap(), 0);
}

#[tokio::test]
async fn retries_are_monotonic_across_ticks() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        oracle.clone(),
        Step::Return(Outcome::AmbiguousTimeout),
    ));
    let engine = engine(&db, &client, &oracle, 10);
    let refs: Vec<String> = (0..8).map(|i| format!("ORD-{i}")).collect();
    db.insert_orders(&refs, 0).await.unwrap();

    let mut last: HashMap<String, u32> = HashMap::new();
    for tick in 0..40i64 {
        engine.tick(tick * 1_000, 3).await.unwrap();
        for order in db.list_orders(None, 100).await.unwrap() {
            let prev = last.insert(order.order_reference.clone(), order.retries);
            assert!(prev.unwrap_or(0) <= order.retries);
        }
    }
}

#[tokio::test]
async fn attempts_within_a_tick_run_concurrently() {
    struct BarrierClient(tokio::sync::Barrier);

    #[async_trait]
    impl SubmissionClient for BarrierClient {
        async fn submit(&self, _reference: &str) -> Outcome {
            // Deadlocks unless all three attempts are in flight together.
            self.0.wait().await;
            Outcome::Created
        }
    }

    let db = open_memory().await.unwrap();
    seed(&db, &["a", "b", "c"], 0).await;
    let engine = RetryEngine::new(
        db.clone(),
        Arc::new(BarrierClient(tokio::sync::Barrier::new(3))),
        Arc::new(MemoryOracle::new()),
        settings(5),
    );
    let report = tokio::time::timeout(Duration::from_secs(5), engine.tick(0, 3))
        .await
        .expect("attempts must not run one at a time")
        .unwrap();
    assert_eq!(report.succeeded, 3);
}

#[tokio::test]
async fn oracle_outage_aborts_tick_without_writes() {
    let db = open_memory().await.unwrap();
    let memory = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        memory.clone(),
        Step::Return(Outcome::AmbiguousTimeout),
    ));
    let engine = RetryEngine::new(
        db.clone(),
        client.clone(),
        Arc::new(UnavailableOracle),
        settings(5),
    );
    seed(&db, &["ORD-1"], 0).await;

    let err = engine.tick(0, 10).await.unwrap_err();
    assert!(matches!(err, OrderError::StoreUnavailable(_)));

    let order = db.get_order("ORD-1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Queued);
    assert_eq!(order.retries, 0);
    assert_eq!(order.last_attempt_at, None);
    // Claims were released, so the next tick picks the order up again.
    assert_eq!(order.claimed_until, None);
    assert_eq!(db.select_due(0, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn closed_store_is_reported_as_unavailable() {
    let db = open_memory().await.unwrap();
    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(
        oracle.clone(),
        Step::Return(Outcome::Created),
    ));
    let engine = engine(&db, &client, &oracle, 5);
    seed(&db, &["ORD-1"], 0).await;
    db.pool.close().await;

    let err = engine.tick(0, 10).await.unwrap_err();
    assert!(matches!(err, OrderError::StoreUnavailable(_)));
    assert_eq!(client.total_calls(), 0);
}

/// Downstream that answers with a hard failure only after `delay`.
struct SlowFailingClient {
    delay: Duration,
}

#[async_trait]
impl SubmissionClient for SlowFailingClient {
    async fn submit(&self, _reference: &str) -> Outcome {
        tokio::time::sleep(self.delay).await;
        Outcome::HardFailure
    }
}

#[tokio::test]
async fn transitions_rejected_by_the_store_are_not_reported() {
    let dir = tempfile::tempdir().unwrap();
    let db = OrderDb::open_at(dir.path().join("orders.db")).await.unwrap();
    seed(&db, &["X"], 0).await;

    // The slow engine's lease runs out while its attempt is still in flight.
    let slow = RetryEngine::new(
        db.clone(),
        Arc::new(SlowFailingClient {
            delay: Duration::from_millis(300),
        }),
        Arc::new(MemoryOracle::new()),
        EngineSettings {
            max_retries: 1,
            claim_lease: Duration::from_millis(1),
            ..settings(1)
        },
    );
    let slow_tick = tokio::spawn(async move { slow.tick(0, 10).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let oracle = Arc::new(MemoryOracle::new());
    let client = Arc::new(ScriptedClient::new(oracle.clone(), Step::Return(Outcome::Created)));
    let fast = engine(&db, &client, &oracle, 1);
    let report = fast.tick(1, 10).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let report = slow_tick.await.unwrap().unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.superseded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.rescheduled, 0);
    assert!(report.terminal_failures.is_empty());

    let order = db.get_order("X").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Created);
    assert!(db.list_dead_letters().await.unwrap().is_empty());
}
