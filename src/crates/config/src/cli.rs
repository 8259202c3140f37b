//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::LimiterConfiguration;

/// Quoter CLI
#[derive(Parser, Debug)]
#[command(name = "quoter")]
#[command(about = "Token bucket admission control for tenant-keyed services")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "quoter.toml")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Debug output (same as --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Log file override
    #[arg(long)]
    pub log_file: Option<String>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "quoter.toml")]
        output: PathBuf,
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Path to config file to validate
        #[arg(default_value = "quoter.toml")]
        config: PathBuf,
    },
    /// Print configured tenants and their bucket levels
    Status,
    /// Print telemetry in Prometheus text format
    Metrics,
    /// Run admission checks for a tenant and report the outcomes
    Admit {
        /// Tenant key
        tenant: String,
        /// Number of requests to admit
        #[arg(short = 'n', long, default_value_t = 1)]
        requests: u64,
        /// Pause between requests in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Wait for tokens instead of rejecting (overrides admission.mode)
        #[arg(long)]
        wait: bool,
        /// Upper bound on each wait in milliseconds
        #[arg(long, requires = "wait")]
        timeout_ms: Option<u64>,
    },
}

impl LimiterConfiguration {
    /// Apply command-line overrides on top of loaded configuration
    pub fn merge_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if cli.debug {
            self.logging.level = "debug".to_string();
        }
        if let Some(file) = &cli.log_file {
            self.logging.file_path = Some(file.clone());
        }
        self
    }
}
