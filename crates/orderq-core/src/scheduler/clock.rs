//! Tick timing: wall clock, or simulated time for dry runs.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::order_db::{add_ms, now_ms};

/// Source of tick timestamps and of the wait between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Real time; ticks fire every `interval`.
    Wall { interval: Duration },
    /// Logical time starting at `start_ms` and advancing `step` per tick,
    /// with a real pause of `pace` between ticks.
    Simulated {
        start_ms: i64,
        step: Duration,
        pace: Duration,
    },
}

impl Clock {
    /// Timestamp (Unix ms) for tick `index`.
    pub fn now_for_tick(&self, index: u64) -> i64 {
        match self {
            Clock::Wall { .. } => now_ms(),
            Clock::Simulated { start_ms, step, .. } => {
                let offset = step.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
                add_ms(*start_ms, offset)
            }
        }
    }

    pub(crate) fn ticker(&self) -> Ticker {
        match self {
            Clock::Wall { interval } => {
                let mut interval = tokio::time::interval(*interval);
                // A slow tick pushes the schedule back instead of firing a burst.
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Ticker::Interval(interval)
            }
            Clock::Simulated { pace, .. } => Ticker::Paced {
                pace: *pace,
                first: true,
            },
        }
    }
}

pub(crate) enum Ticker {
    Interval(Interval),
    Paced { pace: Duration, first: bool },
}

impl Ticker {
    /// Resolves when the next tick is due; the first tick fires immediately.
    pub(crate) async fn tick(&mut self) {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
            }
            Ticker::Paced { pace, first } => {
                if std::mem::take(first) {
                    return;
                }
                if !pace.is_zero() {
                    tokio::time::sleep(*pace).await;
                }
            }
        }
    }
}
