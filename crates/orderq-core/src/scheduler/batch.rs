//! Per-tick batch size selection.

/// Backlog-tiered batch size: bigger backlogs get bigger batches.
pub fn backlog_batch_size(backlog: u64) -> u32 {
    match backlog {
        0..=4_999 => 500,
        5_000..=9_999 => 1_000,
        10_000..=49_999 => 2_500,
        _ => 5_000,
    }
}

/// Batch limit for one tick: the fixed cap, or the backlog tier capped by it.
pub fn batch_limit(max_retry_per_cron: u32, adaptive: bool, backlog: u64) -> u32 {
    if adaptive {
        backlog_batch_size(backlog).min(max_retry_per_cron)
    } else {
        max_retry_per_cron
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_grow_with_backlog() {
        assert_eq!(backlog_batch_size(0), 500);
        assert_eq!(backlog_batch_size(4_999), 500);
        assert_eq!(backlog_batch_size(5_000), 1_000);
        assert_eq!(backlog_batch_size(10_000), 2_500);
        assert_eq!(backlog_batch_size(1_000_000), 5_000);
    }

    #[test]
    fn cap_always_applies() {
        assert_eq!(batch_limit(20, false, 1_000_000), 20);
        assert_eq!(batch_limit(20, true, 1_000_000), 20);
        assert_eq!(batch_limit(2_000, true, 100), 500);
        assert_eq!(batch_limit(2_000, true, 60_000), 2_000);
    }
}
