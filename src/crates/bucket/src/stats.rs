//! Per-bucket statistics
//!
//! Counters are written only while the owning bucket's lock is held, but are
//! stored in atomics so a telemetry collector can read them without
//! contending on that lock. The engine never resets them.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Sink for bucket events
///
/// A bucket always owns a sink. When no statistics are wanted it gets a
/// [`NoopStats`].
pub trait StatsSink: Send + Sync + fmt::Debug {
    /// An availability check found the level below zero
    fn record_underflow(&self);

    /// Tokens credited by a refill, before clamping to capacity
    fn record_inflow(&self, tokens: i64);

    /// One admitted message consuming `tokens`
    fn record_use(&self, tokens: i64);

    /// Microseconds a caller spent sleeping in the wait protocol
    fn record_wait(&self, micros: u64);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn record_underflow(&self) {}
    fn record_inflow(&self, _tokens: i64) {}
    fn record_use(&self, _tokens: i64) {}
    fn record_wait(&self, _micros: u64) {}
}

/// Atomic counters for one bucket
#[derive(Debug, Default)]
pub struct BucketStats {
    underflows: AtomicU64,
    aggregate_inflow: AtomicI64,
    tokens_used: AtomicI64,
    messages_passed: AtomicU64,
    micros_waited: AtomicU64,
}

/// Point-in-time copy of [`BucketStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Availability checks that found a deficit
    pub underflows: u64,
    /// Tokens credited by refills
    pub aggregate_inflow: i64,
    /// Tokens consumed
    pub tokens_used: i64,
    /// Messages admitted
    pub messages_passed: u64,
    /// Microseconds spent in the wait protocol
    pub micros_waited: u64,
}

impl BucketStats {
    /// Fresh zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            underflows: self.underflows.load(Ordering::Relaxed),
            aggregate_inflow: self.aggregate_inflow.load(Ordering::Relaxed),
            tokens_used: self.tokens_used.load(Ordering::Relaxed),
            messages_passed: self.messages_passed.load(Ordering::Relaxed),
            micros_waited: self.micros_waited.load(Ordering::Relaxed),
        }
    }
}

impl StatsSink for BucketStats {
    fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
    }

    fn record_inflow(&self, tokens: i64) {
        self.aggregate_inflow.fetch_add(tokens, Ordering::Relaxed);
    }

    fn record_use(&self, tokens: i64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
        self.messages_passed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_wait(&self, micros: u64) {
        self.micros_waited.fetch_add(micros, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_stats_accumulate() {
        let stats = BucketStats::new();
        stats.record_underflow();
        stats.record_inflow(15);
        stats.record_inflow(5);
        stats.record_use(3);
        stats.record_use(1);
        stats.record_wait(1_000);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.underflows, 1);
        assert_eq!(snapshot.aggregate_inflow, 20);
        assert_eq!(snapshot.tokens_used, 4);
        assert_eq!(snapshot.messages_passed, 2);
        assert_eq!(snapshot.micros_waited, 1_000);
    }

    #[test]
    fn test_noop_stats_accepts_everything() {
        let stats = NoopStats;
        stats.record_underflow();
        stats.record_use(i64::MAX);
        stats.record_wait(u64::MAX);
    }
}
