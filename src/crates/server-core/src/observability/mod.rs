//! Telemetry for the quoter service
//!
//! Prometheus collection over the tenant registry plus admission outcome
//! counters. Exposition is text only; serving it is up to the host.

pub mod metrics;

pub use metrics::{BucketCollector, QuoterMetrics};
