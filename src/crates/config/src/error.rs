//! Configuration error types

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Environment variable could not be applied
    #[error("Environment error: {0}")]
    Environment(String),

    /// Invalid value
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// Two buckets configured for the same tenant
    #[error("Duplicate bucket key: {0}")]
    DuplicateBucket(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
