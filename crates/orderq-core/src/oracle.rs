//! Idempotency oracle: "does this order already exist downstream?"
//!
//! Consulted only after an attempt came back ambiguous, or when retries run
//! out, never to skip an attempt. `record_created` is an atomic upsert so any
//! number of concurrent in-flight attempts record a reference at most once.
//! The durable implementation lives on `OrderDb`; `MemoryOracle` backs
//! simulations and tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::Result;

#[async_trait]
pub trait IdempotencyOracle: Send + Sync {
    /// True if the reference is known to have been created downstream.
    async fn exists(&self, reference: &str) -> Result<bool>;

    /// Record that the reference was created. Returns true only for the first record.
    async fn record_created(&self, reference: &str) -> Result<bool>;
}

/// In-process oracle backed by a mutex-guarded set.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    created: Mutex<HashSet<String>>,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct references recorded.
    pub fn len(&self) -> usize {
        self.set().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // A panic while holding the lock cannot leave a HashSet half-inserted.
        self.created.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdempotencyOracle for MemoryOracle {
    async fn exists(&self, reference: &str) -> Result<bool> {
        Ok(self.set().contains(reference))
    }

    async fn record_created(&self, reference: &str) -> Result<bool> {
        Ok(self.set().insert(reference.to_string()))
    }
}
