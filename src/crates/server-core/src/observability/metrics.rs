//! Prometheus metrics
//!
//! Bucket counters are read from each tenant's [`BucketStats`] at scrape
//! time by [`BucketCollector`]; admission outcomes are counted as they
//! happen by [`QuoterMetrics`].
//!
//! [`BucketStats`]: quoter_bucket::BucketStats

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use quoter_bucket::Clock;

use crate::admission::Admission;
use crate::error::ServerError;
use crate::registry::BucketRegistry;

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, ServerError> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| ServerError::Internal(format!("Failed to create metric: {}", e)))
}

fn gauge(name: &str, help: &str) -> Result<IntGaugeVec, ServerError> {
    IntGaugeVec::new(Opts::new(name, help), &["tenant"])
        .map_err(|e| ServerError::Internal(format!("Failed to create metric: {}", e)))
}

/// Scrape-time view of every tenant's bucket
pub struct BucketCollector<C: Clock> {
    registry: Arc<BucketRegistry<C>>,
    // Serialises reset-and-fill across concurrent scrapes
    scrape: Mutex<()>,

    underflows: IntCounterVec,
    inflow_tokens: IntCounterVec,
    tokens_used: IntCounterVec,
    messages_passed: IntCounterVec,
    wait_micros: IntCounterVec,
    level: IntGaugeVec,
    capacity: IntGaugeVec,
    inflow_rate: IntGaugeVec,
}

impl<C: Clock> BucketCollector<C> {
    pub fn new(registry: Arc<BucketRegistry<C>>) -> Result<Self, ServerError> {
        let tenant = &["tenant"];
        Ok(Self {
            registry,
            scrape: Mutex::new(()),
            underflows: counter(
                "quoter_bucket_underflows_total",
                "Availability checks that found the bucket in deficit",
                tenant,
            )?,
            inflow_tokens: counter(
                "quoter_bucket_inflow_tokens_total",
                "Tokens credited by refills",
                tenant,
            )?,
            tokens_used: counter(
                "quoter_bucket_tokens_used_total",
                "Tokens consumed",
                tenant,
            )?,
            messages_passed: counter(
                "quoter_bucket_messages_passed_total",
                "Messages admitted",
                tenant,
            )?,
            wait_micros: counter(
                "quoter_bucket_wait_microseconds_total",
                "Microseconds callers spent waiting for tokens",
                tenant,
            )?,
            level: gauge("quoter_bucket_level", "Current token level, negative in deficit")?,
            capacity: gauge("quoter_bucket_capacity", "Maximum tokens held")?,
            inflow_rate: gauge("quoter_bucket_inflow_rate", "Tokens credited per second")?,
        })
    }

    fn counters(&self) -> [&IntCounterVec; 5] {
        [
            &self.underflows,
            &self.inflow_tokens,
            &self.tokens_used,
            &self.messages_passed,
            &self.wait_micros,
        ]
    }

    fn gauges(&self) -> [&IntGaugeVec; 3] {
        [&self.level, &self.capacity, &self.inflow_rate]
    }
}

impl<C: Clock + 'static> Collector for BucketCollector<C> {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::new();
        for counter in self.counters() {
            descs.extend(counter.desc());
        }
        for gauge in self.gauges() {
            descs.extend(gauge.desc());
        }
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _scrape = self.scrape.lock();
        for counter in self.counters() {
            counter.reset();
        }
        for gauge in self.gauges() {
            gauge.reset();
        }

        for status in self.registry.snapshot() {
            let labels = [status.key.as_str()];
            let stats = status.stats;

            self.underflows
                .with_label_values(&labels)
                .inc_by(stats.underflows);
            self.inflow_tokens
                .with_label_values(&labels)
                .inc_by(stats.aggregate_inflow.max(0) as u64);
            self.tokens_used
                .with_label_values(&labels)
                .inc_by(stats.tokens_used.max(0) as u64);
            self.messages_passed
                .with_label_values(&labels)
                .inc_by(stats.messages_passed);
            self.wait_micros
                .with_label_values(&labels)
                .inc_by(stats.micros_waited);

            self.level.with_label_values(&labels).set(status.level);
            self.capacity
                .with_label_values(&labels)
                .set(i64::try_from(status.capacity).unwrap_or(i64::MAX));
            self.inflow_rate
                .with_label_values(&labels)
                .set(i64::try_from(status.inflow).unwrap_or(i64::MAX));
        }

        let mut families = Vec::new();
        for counter in self.counters() {
            families.extend(counter.collect());
        }
        for gauge in self.gauges() {
            families.extend(gauge.collect());
        }
        families
    }
}

/// Metrics registry for the quoter service
pub struct QuoterMetrics {
    registry: Registry,
    admissions: IntCounterVec,
}

impl QuoterMetrics {
    /// Create a registry with the admission counters registered
    pub fn new() -> Result<Self, ServerError> {
        let registry = Registry::new();
        let admissions = counter(
            "quoter_admissions_total",
            "Admission decisions by outcome",
            &["outcome"],
        )?;
        registry.register(Box::new(admissions.clone()))?;

        Ok(Self {
            registry,
            admissions,
        })
    }

    /// Expose every bucket in `buckets` at scrape time
    pub fn register_buckets<C: Clock + 'static>(
        &self,
        buckets: Arc<BucketRegistry<C>>,
    ) -> Result<(), ServerError> {
        self.registry
            .register(Box::new(BucketCollector::new(buckets)?))?;
        Ok(())
    }

    pub fn record_admission(&self, admission: Admission) {
        self.admissions
            .with_label_values(&[admission.label()])
            .inc();
    }

    /// Count of decisions with this outcome so far
    pub fn admissions(&self, admission: Admission) -> u64 {
        self.admissions
            .with_label_values(&[admission.label()])
            .get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> Result<String, ServerError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ServerError::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| ServerError::Internal(format!("Failed to convert metrics: {}", e)))
    }
}

impl std::fmt::Debug for QuoterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoterMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoter_bucket::ManualClock;
    use quoter_config::{BucketConfig, LimiterConfiguration};

    fn buckets(clock: ManualClock) -> Arc<BucketRegistry<ManualClock>> {
        let mut config = LimiterConfiguration::default();
        config.buckets = vec![
            BucketConfig {
                key: "alpha".to_string(),
                inflow: 5,
                capacity: 10,
                start_full: Some(true),
            },
            BucketConfig {
                key: "beta".to_string(),
                inflow: 1,
                capacity: 1,
                start_full: Some(false),
            },
        ];
        Arc::new(BucketRegistry::from_config_with_clock(&config, clock))
    }

    #[test]
    fn test_admission_counters() {
        let metrics = QuoterMetrics::new().unwrap();
        metrics.record_admission(Admission::Allowed);
        metrics.record_admission(Admission::Allowed);
        metrics.record_admission(Admission::UnknownTenant);

        assert_eq!(metrics.admissions(Admission::Allowed), 2);
        assert_eq!(metrics.admissions(Admission::TooManyRequests), 0);

        let text = metrics.render().unwrap();
        assert!(text.contains("quoter_admissions_total{outcome=\"allowed\"} 2"));
        assert!(text.contains("quoter_admissions_total{outcome=\"unknown_tenant\"} 1"));
    }

    #[test]
    fn test_bucket_collector_reads_live_state() {
        let clock = ManualClock::new();
        let registry = buckets(clock.clone());
        let metrics = QuoterMetrics::new().unwrap();
        metrics.register_buckets(registry.clone()).unwrap();

        let alpha = registry.get("alpha").unwrap();
        alpha.consume(12);
        assert!(!alpha.is_available());

        let text = metrics.render().unwrap();
        assert!(text.contains("quoter_bucket_level{tenant=\"alpha\"} -2"));
        assert!(text.contains("quoter_bucket_tokens_used_total{tenant=\"alpha\"} 12"));
        assert!(text.contains("quoter_bucket_messages_passed_total{tenant=\"alpha\"} 1"));
        assert!(text.contains("quoter_bucket_underflows_total{tenant=\"alpha\"} 1"));
        assert!(text.contains("quoter_bucket_capacity{tenant=\"beta\"} 1"));
        assert!(text.contains("quoter_bucket_inflow_rate{tenant=\"alpha\"} 5"));

        // A later scrape sees the refill
        clock.advance(2_000);
        alpha.available();
        let text = metrics.render().unwrap();
        assert!(text.contains("quoter_bucket_level{tenant=\"alpha\"} 8"));
        assert!(text.contains("quoter_bucket_inflow_tokens_total{tenant=\"alpha\"} 10"));
    }

    #[test]
    fn test_collector_registers_once() {
        let registry = buckets(ManualClock::new());
        let metrics = QuoterMetrics::new().unwrap();
        metrics.register_buckets(registry.clone()).unwrap();

        assert!(metrics.register_buckets(registry).is_err());
    }
}
