use std::time::Duration;

/// Capped exponential backoff: `delay(r) = min(max_delay, base_delay * 2^r)`.
///
/// Pure and deterministic; `delay` never decreases as `r` grows and never
/// exceeds `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay for a given retry count.
    pub fn delay(&self, retries: u32) -> Duration {
        // 2^63 times any non-zero base is already past any representable cap.
        let factor = 1u128 << retries.min(63);
        let nanos = self.base_delay.as_nanos().saturating_mul(factor);
        if nanos >= self.max_delay.as_nanos() {
            return self.max_delay;
        }
        u64::try_from(nanos)
            .map(Duration::from_nanos)
            .unwrap_or(self.max_delay)
    }

    /// Wait before the next attempt of an order that has now failed `retries`
    /// times (`retries >= 1`): the first failure waits `base_delay`.
    pub fn delay_after_failure(&self, retries: u32) -> Duration {
        self.delay(retries.saturating_sub(1))
    }
}
