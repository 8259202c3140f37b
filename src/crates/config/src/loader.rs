//! Configuration loading and parsing

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, LimiterConfiguration, Result};

/// Default search paths, first match wins
const CONFIG_PATHS: [&str; 3] = ["quoter.toml", "config/quoter.toml", "/etc/quoter/quoter.toml"];

/// Configuration loader with support for files and environment variables
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<LimiterConfiguration> {
        let path = path.as_ref();

        // Check if file exists
        if !path.exists() {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Configuration file not found: {}", path.display()),
            )));
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut config)?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML without environment overrides or validation
    pub fn parse(content: &str) -> Result<LimiterConfiguration> {
        Ok(toml::from_str(content)?)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<LimiterConfiguration> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<LimiterConfiguration> {
        let mut config = LimiterConfiguration::default();
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with file fallback to environment
    pub fn load() -> Result<LimiterConfiguration> {
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Check for explicit config file in environment
        if let Ok(config_file) = env::var("QUOTER_CONFIG_FILE") {
            return Self::from_file(config_file);
        }

        // Fall back to environment variables only
        Self::from_env()
    }

    /// Apply `QUOTER_*` environment variable overrides to configuration
    pub fn apply_env_overrides(config: &mut LimiterConfiguration) -> Result<()> {
        Self::apply_overrides(config, |name| env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(config: &mut LimiterConfiguration, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging configuration
        if let Some(log_level) = lookup("QUOTER_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Some(log_format) = lookup("QUOTER_LOG_FORMAT") {
            config.logging.format = log_format;
        }

        if let Some(log_file) = lookup("QUOTER_LOG_FILE") {
            config.logging.file_path = Some(log_file);
        }

        // Limiter configuration
        if let Some(start_full) = lookup("QUOTER_START_FULL") {
            config.limiter.start_full = start_full.parse().map_err(|e| {
                ConfigError::Environment(format!("Invalid QUOTER_START_FULL: {}", e))
            })?;
        }

        if let Some(resolution) = lookup("QUOTER_CLOCK_RESOLUTION") {
            config.limiter.clock_resolution = resolution.parse().map_err(|e| {
                ConfigError::Environment(format!("Invalid QUOTER_CLOCK_RESOLUTION: {}", e))
            })?;
        }

        // Admission configuration
        if let Some(mode) = lookup("QUOTER_ADMISSION_MODE") {
            config.admission.mode = mode.parse().map_err(|e| {
                ConfigError::Environment(format!("Invalid QUOTER_ADMISSION_MODE: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("QUOTER_WAIT_TIMEOUT_MS") {
            let timeout: u64 = timeout.parse().map_err(|e| {
                ConfigError::Environment(format!("Invalid QUOTER_WAIT_TIMEOUT_MS: {}", e))
            })?;
            config.admission.wait_timeout_ms = Some(timeout);
        }

        Ok(())
    }

    /// Render a configuration as TOML
    pub fn to_toml(config: &LimiterConfiguration) -> Result<String> {
        Ok(toml::to_string_pretty(config)?)
    }

    /// Create a sample configuration file with one sample tenant
    pub fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let toml_content = Self::to_toml(&LimiterConfiguration::sample())?;
        fs::write(path, toml_content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdmissionMode, ClockResolution};
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config_validation() {
        let config = LimiterConfiguration::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = LimiterConfiguration::default();
        ConfigLoader::apply_overrides(
            &mut config,
            lookup_from(&[
                ("QUOTER_LOG_LEVEL", "debug"),
                ("QUOTER_LOG_FORMAT", "json"),
                ("QUOTER_START_FULL", "false"),
                ("QUOTER_CLOCK_RESOLUTION", "micros"),
                ("QUOTER_ADMISSION_MODE", "wait"),
                ("QUOTER_WAIT_TIMEOUT_MS", "250"),
            ]),
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(!config.limiter.start_full);
        assert_eq!(config.limiter.clock_resolution, ClockResolution::Micros);
        assert_eq!(config.admission.mode, AdmissionMode::Wait);
        assert_eq!(config.admission.wait_timeout_ms, Some(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = LimiterConfiguration::default();
        let err = ConfigLoader::apply_overrides(
            &mut config,
            lookup_from(&[("QUOTER_START_FULL", "maybe")]),
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Environment(_)));
    }

    #[test]
    fn test_sample_config_round_trips_through_toml() {
        let rendered = ConfigLoader::to_toml(&LimiterConfiguration::sample()).unwrap();
        let parsed = ConfigLoader::from_toml_str(&rendered).unwrap();

        assert_eq!(parsed.buckets, LimiterConfiguration::sample().buckets);
    }
}
