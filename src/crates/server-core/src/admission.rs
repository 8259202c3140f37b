//! Admission decisions for tenant-keyed requests
//!
//! A host service extracts the tenant key (usually from the
//! [`SUBSCRIPTION_HEADER`]) and asks the [`AdmissionController`] whether the
//! request may proceed. The controller never touches the transport; it only
//! maps bucket state to an [`Admission`] carrying the HTTP status a host
//! should answer with.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use quoter_bucket::{Clock, MonotonicClock};
use quoter_config::{AdmissionConfig, AdmissionMode};
use tracing::{debug, warn};

use crate::observability::QuoterMetrics;
use crate::registry::BucketRegistry;

/// Request header carrying the tenant key
pub const SUBSCRIPTION_HEADER: &str = "X-Limiter-Subscription-ID";

/// Tokens claimed by one admitted request
pub const REQUEST_COST: u64 = 1;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// Token claimed, request may proceed
    Allowed,
    /// Bucket in deficit or wait deadline expired
    TooManyRequests,
    /// No bucket configured for the tenant
    UnknownTenant,
}

impl Admission {
    /// HTTP status code for this outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Admission::Allowed => 200,
            Admission::TooManyRequests => 429,
            Admission::UnknownTenant => 503,
        }
    }

    /// HTTP reason phrase for this outcome
    pub fn reason(&self) -> &'static str {
        match self {
            Admission::Allowed => "OK",
            Admission::TooManyRequests => "Too Many Requests",
            Admission::UnknownTenant => "Service Unavailable",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Admission::Allowed => "allowed",
            Admission::TooManyRequests => "too_many_requests",
            Admission::UnknownTenant => "unknown_tenant",
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.reason())
    }
}

/// How the controller claims a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Reject while the bucket is in deficit
    #[default]
    Reject,
    /// Wait for the bucket to recover, optionally bounded
    Wait { timeout: Option<Duration> },
}

impl From<&AdmissionConfig> for WaitPolicy {
    fn from(config: &AdmissionConfig) -> Self {
        match config.mode {
            AdmissionMode::Reject => WaitPolicy::Reject,
            AdmissionMode::Wait => WaitPolicy::Wait {
                timeout: config.wait_timeout_ms.map(Duration::from_millis),
            },
        }
    }
}

/// Maps tenant keys to admission decisions
pub struct AdmissionController<C: Clock = MonotonicClock> {
    registry: Arc<BucketRegistry<C>>,
    policy: WaitPolicy,
    metrics: Option<Arc<QuoterMetrics>>,
}

impl<C: Clock> AdmissionController<C> {
    /// Controller rejecting while a bucket is in deficit
    pub fn new(registry: Arc<BucketRegistry<C>>) -> Self {
        Self {
            registry,
            policy: WaitPolicy::Reject,
            metrics: None,
        }
    }

    pub fn with_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Count every decision in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<QuoterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub fn registry(&self) -> &Arc<BucketRegistry<C>> {
        &self.registry
    }

    /// Decide on one request, blocking the thread in wait mode
    pub fn admit(&self, tenant: &str) -> Admission {
        let admission = self.decide(tenant);
        self.finish(tenant, admission)
    }

    /// Decide on one request, sleeping on the tokio timer in wait mode
    pub async fn admit_async(&self, tenant: &str) -> Admission {
        let Some(quoter) = self.registry.get(tenant) else {
            return self.finish(tenant, Admission::UnknownTenant);
        };

        let admission = match self.policy {
            WaitPolicy::Reject => {
                Self::claim(quoter.is_available(), || quoter.consume(REQUEST_COST))
            }
            WaitPolicy::Wait { timeout } => {
                match quoter.consume_with_sleep_async(REQUEST_COST, timeout).await {
                    Ok(_) => Admission::Allowed,
                    Err(e) => {
                        warn!(tenant = %tenant, "{}", e);
                        Admission::TooManyRequests
                    }
                }
            }
        };
        self.finish(tenant, admission)
    }

    fn decide(&self, tenant: &str) -> Admission {
        let Some(quoter) = self.registry.get(tenant) else {
            return Admission::UnknownTenant;
        };

        match self.policy {
            WaitPolicy::Reject => {
                Self::claim(quoter.is_available(), || quoter.consume(REQUEST_COST))
            }
            WaitPolicy::Wait { timeout: None } => {
                quoter.consume_with_sleep(REQUEST_COST);
                Admission::Allowed
            }
            WaitPolicy::Wait {
                timeout: Some(timeout),
            } => match quoter.consume_with_sleep_timeout(REQUEST_COST, timeout) {
                Ok(()) => Admission::Allowed,
                Err(e) => {
                    warn!(tenant = %tenant, "{}", e);
                    Admission::TooManyRequests
                }
            },
        }
    }

    // The availability check and the consume are separate steps; a request
    // racing another may push the level below zero, which future inflow repays.
    fn claim(available: bool, consume: impl FnOnce()) -> Admission {
        if !available {
            return Admission::TooManyRequests;
        }
        consume();
        Admission::Allowed
    }

    fn finish(&self, tenant: &str, admission: Admission) -> Admission {
        debug!(
            tenant = %tenant,
            status = admission.status_code(),
            outcome = admission.label(),
            "Admission decision"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_admission(admission);
        }
        admission
    }
}

impl<C: Clock> fmt::Debug for AdmissionController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("tenants", &self.registry.len())
            .field("policy", &self.policy)
            .finish()
    }
}
