//! Tenant registry
//!
//! One bucket per configured tenant, built once from configuration. The set
//! of tenants is fixed after construction; limits can still be changed at
//! runtime through each bucket's handles.

use std::collections::HashMap;
use std::sync::Arc;

use quoter_bucket::{BucketQuoter, BucketStats, Clock, MonotonicClock, StatsSnapshot};
use quoter_config::{ClockResolution, LimiterConfiguration};
use tracing::{info, warn};

use crate::{Result, ServerError};

/// A tenant's bucket and its statistics
#[derive(Debug)]
pub struct TenantBucket<C: Clock = MonotonicClock> {
    key: String,
    quoter: Arc<BucketQuoter<C>>,
    stats: Arc<BucketStats>,
}

impl<C: Clock> TenantBucket<C> {
    /// Tenant key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The tenant's bucket
    pub fn quoter(&self) -> &Arc<BucketQuoter<C>> {
        &self.quoter
    }

    /// Counters recorded by the bucket
    pub fn stats(&self) -> &Arc<BucketStats> {
        &self.stats
    }

    /// Current state for status output
    pub fn status(&self) -> TenantStatus {
        TenantStatus {
            key: self.key.clone(),
            level: self.quoter.level(),
            capacity: self.quoter.capacity(),
            inflow: self.quoter.inflow(),
            stats: self.stats.snapshot(),
        }
    }
}

/// Point-in-time view of one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantStatus {
    pub key: String,
    pub level: i64,
    pub capacity: u64,
    pub inflow: u64,
    pub stats: StatsSnapshot,
}

/// Buckets keyed by tenant
#[derive(Debug)]
pub struct BucketRegistry<C: Clock = MonotonicClock> {
    buckets: HashMap<String, TenantBucket<C>>,
}

impl BucketRegistry<MonotonicClock> {
    /// Build from configuration on the configured monotonic clock
    pub fn from_config(config: &LimiterConfiguration) -> Self {
        let clock = match config.limiter.clock_resolution {
            ClockResolution::Millis => MonotonicClock::millis(),
            ClockResolution::Micros => MonotonicClock::micros(),
        };
        Self::from_config_with_clock(config, clock)
    }
}

impl<C: Clock + Clone> BucketRegistry<C> {
    /// Build from configuration with every bucket reading `clock`
    pub fn from_config_with_clock(config: &LimiterConfiguration, clock: C) -> Self {
        let mut buckets = HashMap::with_capacity(config.buckets.len());

        for entry in &config.buckets {
            let start_full = entry.starts_full(config.limiter.start_full);
            if entry.inflow == 0 {
                warn!(
                    tenant = %entry.key,
                    "Bucket has zero inflow and only recovers through manual credit"
                );
            }

            let stats = Arc::new(BucketStats::new());
            let quoter = BucketQuoter::builder(entry.inflow, entry.capacity)
                .start_full(start_full)
                .stats(stats.clone())
                .clock(clock.clone())
                .build();

            info!(
                tenant = %entry.key,
                inflow = entry.inflow,
                capacity = entry.capacity,
                start_full,
                "Configured bucket"
            );

            buckets.insert(
                entry.key.clone(),
                TenantBucket {
                    key: entry.key.clone(),
                    quoter: Arc::new(quoter),
                    stats,
                },
            );
        }

        info!("Bucket registry ready with {} tenant(s)", buckets.len());
        Self { buckets }
    }
}

impl<C: Clock> BucketRegistry<C> {
    /// Bucket for a tenant
    pub fn get(&self, key: &str) -> Option<&Arc<BucketQuoter<C>>> {
        self.buckets.get(key).map(|t| &t.quoter)
    }

    /// Bucket and statistics for a tenant
    pub fn tenant(&self, key: &str) -> Option<&TenantBucket<C>> {
        self.buckets.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Tenant keys in sorted order
    pub fn tenants(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.buckets.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Iterate over every tenant, unordered
    pub fn iter(&self) -> impl Iterator<Item = &TenantBucket<C>> {
        self.buckets.values()
    }

    /// Replace a tenant's limits, returning the previous `(inflow, capacity)`
    ///
    /// Takes effect at the bucket's next operation. Lowering the capacity
    /// does not reduce the level until the next refill clamps it.
    pub fn set_limits(&self, key: &str, inflow: u64, capacity: u64) -> Result<(u64, u64)> {
        let quoter = self
            .get(key)
            .ok_or_else(|| ServerError::UnknownTenant(key.to_string()))?;

        if i64::try_from(capacity).is_err() {
            return Err(ServerError::Internal(format!(
                "capacity {} exceeds {}",
                capacity,
                i64::MAX
            )));
        }

        let previous = (quoter.set_inflow(inflow), quoter.set_capacity(capacity));
        info!(
            tenant = %key,
            inflow,
            capacity,
            previous_inflow = previous.0,
            previous_capacity = previous.1,
            "Updated bucket limits"
        );
        Ok(previous)
    }

    /// Status of every tenant, sorted by key
    pub fn snapshot(&self) -> Vec<TenantStatus> {
        let mut statuses: Vec<TenantStatus> = self.buckets.values().map(|t| t.status()).collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }
}
