//! Server error types

use thiserror::Error;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] quoter_config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Logging setup failed
    #[error("Logging error: {0}")]
    Logging(String),

    /// No bucket configured for the tenant
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Prometheus error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
