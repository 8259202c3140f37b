//! Quoter Main Entry Point
//!
//! Command-line front end for the quoter: configuration generation and
//! validation, tenant status, metrics exposition and a local admission
//! driver.

use anyhow::{Context, Result};
use clap::Parser;
use quoter_config::{AdmissionMode, Cli, Commands, ConfigLoader, LimiterConfiguration};
use quoter_server_core::{init_logging, Admission, QuoterService};
use std::path::Path;
use std::process;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Handle commands that run before logging setup
    match &cli.command {
        Some(Commands::GenerateConfig { output, force }) => {
            if let Err(e) = generate_config_file(output, *force) {
                eprintln!("Failed to generate config: {:#}", e);
                process::exit(1);
            }
            return;
        }
        Some(Commands::ValidateConfig { config }) => {
            if validate_config(config).is_err() {
                process::exit(1);
            }
            return;
        }
        _ => {}
    }

    // Load configuration
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    // Initialize logging system
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Quoter version: {}", env!("CARGO_PKG_VERSION"));

    let command = cli.command.unwrap_or(Commands::Status);
    if let Err(e) = handle_command(command, config).await {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

/// Load configuration from file and apply CLI overrides
fn load_config(cli: &Cli) -> Result<LimiterConfiguration> {
    let config = if cli.config.exists() {
        ConfigLoader::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        ConfigLoader::from_env().context("Failed to load config from environment")?
    };

    Ok(config.merge_cli_overrides(cli))
}

/// Generate a default configuration file
fn generate_config_file(output_path: &Path, force: bool) -> Result<()> {
    if output_path.exists() && !force {
        return Err(anyhow::anyhow!(
            "Config file already exists: {:?}. Use --force to overwrite.",
            output_path
        ));
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    ConfigLoader::create_sample_config(output_path)
        .with_context(|| format!("Failed to write config file: {:?}", output_path))?;

    println!("Generated default configuration file: {:?}", output_path);
    Ok(())
}

/// Validate configuration file
fn validate_config(config_path: &Path) -> Result<()> {
    match ConfigLoader::from_file(config_path) {
        Ok(config) => {
            println!("Configuration file is valid: {:?}", config_path);
            println!("Tenants: {}", config.buckets.len());
            Ok(())
        }
        Err(e) => {
            println!("Configuration file is invalid: {:?}", config_path);
            println!("Error: {}", e);
            Err(e.into())
        }
    }
}

/// Handle subcommands that need a running service
async fn handle_command(command: Commands, mut config: LimiterConfiguration) -> Result<()> {
    match command {
        Commands::Status => {
            let service = QuoterService::from_config(config).context("Failed to build service")?;
            print_status(&service);
            Ok(())
        }
        Commands::Metrics => {
            let service = QuoterService::from_config(config).context("Failed to build service")?;
            let text = service
                .render_metrics()
                .context("Failed to render metrics")?;
            print!("{}", text);
            Ok(())
        }
        Commands::Admit {
            tenant,
            requests,
            interval_ms,
            wait,
            timeout_ms,
        } => {
            if wait {
                config.admission.mode = AdmissionMode::Wait;
                config.admission.wait_timeout_ms = timeout_ms;
            }
            let service = QuoterService::from_config(config).context("Failed to build service")?;
            run_admissions(&service, &tenant, requests, Duration::from_millis(interval_ms)).await;
            Ok(())
        }
        Commands::GenerateConfig { .. } | Commands::ValidateConfig { .. } => {
            // Already handled in main
            Ok(())
        }
    }
}

fn print_status(service: &QuoterService) {
    println!(
        "{:<40} {:>12} {:>12} {:>10} {:>10} {:>10}",
        "TENANT", "LEVEL", "CAPACITY", "INFLOW/S", "PASSED", "UNDERFLOW"
    );
    for status in service.status() {
        println!(
            "{:<40} {:>12} {:>12} {:>10} {:>10} {:>10}",
            status.key,
            status.level,
            status.capacity,
            status.inflow,
            status.stats.messages_passed,
            status.stats.underflows
        );
    }
}

async fn run_admissions(service: &QuoterService, tenant: &str, requests: u64, interval: Duration) {
    let mut allowed = 0u64;
    for i in 1..=requests {
        let admission = service.admit_async(tenant).await;
        if admission == Admission::Allowed {
            allowed += 1;
        }
        println!("request {:>5}: {}", i, admission);

        if i < requests && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    println!("{} of {} requests admitted", allowed, requests);
    if let Some(quoter) = service.registry().get(tenant) {
        println!("{}", quoter);
    }
}
