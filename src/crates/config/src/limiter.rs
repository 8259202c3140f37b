//! Limiter configuration structures

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::{ConfigError, Result};

/// Tenant shipped in the generated sample configuration
pub const SAMPLE_TENANT: &str = "897d9f58-6b42-4ca7-8229-2e04056490b7";

/// Complete limiter service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfiguration {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Bucket defaults
    pub limiter: LimiterConfig,
    /// Admission policy
    pub admission: AdmissionConfig,
    /// One bucket per tenant
    pub buckets: Vec<BucketConfig>,
}

impl Default for LimiterConfiguration {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            limiter: LimiterConfig::default(),
            admission: AdmissionConfig::default(),
            buckets: Vec::new(),
        }
    }
}

impl LimiterConfiguration {
    /// Defaults plus one sample tenant, written by `generate-config`
    pub fn sample() -> Self {
        Self {
            buckets: vec![BucketConfig {
                key: SAMPLE_TENANT.to_string(),
                inflow: 10,
                capacity: 10,
                start_full: None,
            }],
            ..Self::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty, compact)
    pub format: String,
    /// Log file path (if None, logs to stdout)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Defaults applied to every bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Buckets start at capacity instead of empty
    pub start_full: bool,
    /// Tick granularity of the refill clock
    pub clock_resolution: ClockResolution,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            start_full: true,
            clock_resolution: ClockResolution::Millis,
        }
    }
}

/// Tick granularity of the refill clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    Millis,
    Micros,
}

impl FromStr for ClockResolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "millis" | "ms" => Ok(ClockResolution::Millis),
            "micros" | "us" => Ok(ClockResolution::Micros),
            other => Err(ConfigError::InvalidValue {
                field: "limiter.clock_resolution".to_string(),
                message: format!("'{}' must be one of: millis, micros", other),
            }),
        }
    }
}

/// Admission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Reject immediately or wait for tokens
    pub mode: AdmissionMode,
    /// Upper bound on a waiting admission, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            mode: AdmissionMode::Reject,
            wait_timeout_ms: None,
        }
    }
}

/// How an admitted request claims its token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    /// Consume without waiting
    Reject,
    /// Sleep until the claim can be made, bounded by `wait_timeout_ms`
    Wait,
}

impl FromStr for AdmissionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(AdmissionMode::Reject),
            "wait" => Ok(AdmissionMode::Wait),
            other => Err(ConfigError::InvalidValue {
                field: "admission.mode".to_string(),
                message: format!("'{}' must be one of: reject, wait", other),
            }),
        }
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionMode::Reject => write!(f, "reject"),
            AdmissionMode::Wait => write!(f, "wait"),
        }
    }
}

/// Bucket for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    /// Tenant key, matched against the subscription header
    pub key: String,
    /// Tokens credited per second
    pub inflow: u64,
    /// Maximum tokens held
    pub capacity: u64,
    /// Per-bucket override of `limiter.start_full`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_full: Option<bool>,
}

impl BucketConfig {
    /// Whether this bucket starts at capacity
    pub fn starts_full(&self, default: bool) -> bool {
        self.start_full.unwrap_or(default)
    }
}

impl LimiterConfiguration {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    message: "Must be one of: trace, debug, info, warn, error".to_string(),
                });
            }
        }

        // Validate log format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.format".to_string(),
                    message: "Must be one of: json, pretty, compact".to_string(),
                });
            }
        }

        if let Some(path) = &self.logging.file_path {
            if path.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "logging.file_path".to_string(),
                    message: "Path cannot be empty".to_string(),
                });
            }
        }

        // Validate admission policy
        match (self.admission.mode, self.admission.wait_timeout_ms) {
            (AdmissionMode::Reject, Some(_)) => {
                return Err(ConfigError::Validation(
                    "admission.wait_timeout_ms only applies when admission.mode = \"wait\""
                        .to_string(),
                ));
            }
            (AdmissionMode::Wait, Some(0)) => {
                return Err(ConfigError::InvalidValue {
                    field: "admission.wait_timeout_ms".to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
            _ => {}
        }

        // Validate buckets
        let mut seen = HashSet::with_capacity(self.buckets.len());
        for (index, bucket) in self.buckets.iter().enumerate() {
            if bucket.key.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("buckets[{}].key", index),
                    message: "Tenant key cannot be empty".to_string(),
                });
            }
            if i64::try_from(bucket.capacity).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: format!("buckets[{}].capacity", index),
                    message: format!("Must not exceed {}", i64::MAX),
                });
            }
            if !seen.insert(bucket.key.as_str()) {
                return Err(ConfigError::DuplicateBucket(bucket.key.clone()));
            }
        }

        Ok(())
    }

    /// Bucket entry for a tenant
    pub fn bucket(&self, key: &str) -> Option<&BucketConfig> {
        self.buckets.iter().find(|b| b.key == key)
    }
}
