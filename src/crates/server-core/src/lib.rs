//! Quoter Server Core
//!
//! Tenant registry, admission decisions, logging setup and Prometheus
//! telemetry around the bucket engine.

pub mod admission;
pub mod error;
pub mod logging;
pub mod observability;
pub mod registry;
pub mod service;

pub use admission::{Admission, AdmissionController, WaitPolicy, SUBSCRIPTION_HEADER};
pub use error::{Result, ServerError};
pub use logging::init_logging;
pub use observability::{BucketCollector, QuoterMetrics};
pub use registry::{BucketRegistry, TenantBucket, TenantStatus};
pub use service::QuoterService;
