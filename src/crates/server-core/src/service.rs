//! Quoter service
//!
//! Wires the tenant registry, the admission controller and the metrics
//! registry together from one loaded configuration.

use std::sync::Arc;

use quoter_bucket::{Clock, MonotonicClock};
use quoter_config::LimiterConfiguration;
use tracing::info;

use crate::admission::{Admission, AdmissionController, WaitPolicy};
use crate::observability::QuoterMetrics;
use crate::registry::{BucketRegistry, TenantStatus};
use crate::Result;

/// Admission control service for a fixed set of tenants
#[derive(Debug)]
pub struct QuoterService<C: Clock = MonotonicClock> {
    config: Arc<LimiterConfiguration>,
    registry: Arc<BucketRegistry<C>>,
    controller: AdmissionController<C>,
    metrics: Arc<QuoterMetrics>,
}

impl QuoterService<MonotonicClock> {
    /// Build the service on the configured monotonic clock
    pub fn from_config(config: LimiterConfiguration) -> Result<Self> {
        config.validate()?;
        let registry = BucketRegistry::from_config(&config);
        Self::assemble(config, registry)
    }
}

impl<C: Clock + Clone + 'static> QuoterService<C> {
    /// Build the service with every bucket reading `clock`
    pub fn from_config_with_clock(config: LimiterConfiguration, clock: C) -> Result<Self> {
        config.validate()?;
        let registry = BucketRegistry::from_config_with_clock(&config, clock);
        Self::assemble(config, registry)
    }
}

impl<C: Clock + 'static> QuoterService<C> {
    fn assemble(config: LimiterConfiguration, registry: BucketRegistry<C>) -> Result<Self> {
        let registry = Arc::new(registry);
        let metrics = Arc::new(QuoterMetrics::new()?);
        metrics.register_buckets(registry.clone())?;

        let policy = WaitPolicy::from(&config.admission);
        let controller = AdmissionController::new(registry.clone())
            .with_policy(policy)
            .with_metrics(metrics.clone());

        info!(
            tenants = registry.len(),
            mode = %config.admission.mode,
            "Quoter service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            controller,
            metrics,
        })
    }

    pub fn config(&self) -> &LimiterConfiguration {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BucketRegistry<C>> {
        &self.registry
    }

    pub fn controller(&self) -> &AdmissionController<C> {
        &self.controller
    }

    pub fn metrics(&self) -> &Arc<QuoterMetrics> {
        &self.metrics
    }

    /// Admit one request under the configured policy
    pub fn admit(&self, tenant: &str) -> Admission {
        self.controller.admit(tenant)
    }

    /// Async variant of [`admit`](Self::admit)
    pub async fn admit_async(&self, tenant: &str) -> Admission {
        self.controller.admit_async(tenant).await
    }

    /// Status of every tenant, sorted by key
    pub fn status(&self) -> Vec<TenantStatus> {
        self.registry.snapshot()
    }

    /// Metrics in Prometheus text format
    pub fn render_metrics(&self) -> Result<String> {
        self.metrics.render()
    }
}
