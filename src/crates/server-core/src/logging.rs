//! Logging configuration and setup
//!
//! Provides structured logging with configurable outputs and formats.

use crate::ServerError;
use quoter_config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging system
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stdout unless a file path is configured, in which case lines are appended
/// to that file without ANSI colours.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ServerError> {
    // Parse log level
    let level = parse_log_level(&config.level)?;

    // Create environment filter
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (writer, ansi) = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    // Initialize based on format
    match config.format.to_lowercase().as_str() {
        "json" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| ServerError::Logging(format!("Failed to set logger: {}", e)))?;
        }
        "pretty" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(ansi)
                .pretty()
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| ServerError::Logging(format!("Failed to set logger: {}", e)))?;
        }
        "compact" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(ansi)
                .compact()
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| ServerError::Logging(format!("Failed to set logger: {}", e)))?;
        }
        _ => {
            return Err(ServerError::Logging(format!(
                "Unknown log format: {}",
                config.format
            )));
        }
    }

    tracing::info!("Logging initialized with level: {}", level);
    Ok(())
}

/// Parse log level string
fn parse_log_level(level: &str) -> Result<Level, ServerError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ServerError::Logging(format!("Invalid log level: {}", level))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_unknown_format_rejected_before_install() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "xml".to_string(),
            file_path: None,
        };

        let err = init_logging(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown log format"));
    }

    #[test]
    fn test_file_logging() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("quoter.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "compact".to_string(),
            file_path: Some(path.to_string_lossy().into_owned()),
        };

        init_logging(&config).expect("first global subscriber in this binary");
        tracing::info!("bucket registry ready");

        let content = std::fs::read_to_string(&path).expect("log file written");
        assert!(content.contains("Logging initialized"));
    }
}
