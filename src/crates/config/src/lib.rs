//! Quoter Configuration Management
//!
//! Provides configuration loading, parsing, and validation for the quoter
//! admission service: logging, limiter defaults, admission policy and the
//! per-tenant bucket list.

pub mod cli;
pub mod error;
pub mod limiter;
pub mod loader;

pub use cli::{Cli, Commands};
pub use error::{ConfigError, Result};
pub use limiter::{
    AdmissionConfig, AdmissionMode, BucketConfig, ClockResolution, LimiterConfig,
    LimiterConfiguration, LoggingConfig,
};
pub use loader::ConfigLoader;
