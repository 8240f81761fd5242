//! Batch Studio CLI Binary
//!
//! Command-line interface for concurrent prompt-to-image batch generation.

use anyhow::Context;
use batch_studio::cli::{Cli, RunContext};
use batch_studio::config::ConfigLoader;
use batch_studio::logging::{init_logging, LoggingConfig};
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    // Initialize logging early
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Batch Studio CLI starting");

    match run(&cli) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            match e.downcast_ref::<batch_studio::error::GenerationError>() {
                Some(generation_error) => eprintln!("{}", batch_studio::cli::map_error(generation_error)),
                None => eprintln!("{:#}", e),
            }
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let context = RunContext::new(cli.config.clone(), cli.data_dir.clone())
        .context("Failed to initialize batch studio")?;
    info!(data_dir = %context.data_dir().display(), "CLI context initialized");
    Ok(context.execute(&cli.command)?)
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = match &cli.config {
        Some(config_path) if config_path.exists() => ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default(),
        Some(_) => LoggingConfig::default(),
        None => ConfigLoader::load()
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default(),
    };

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_logging_config_default() {
        let temp = tempfile::tempdir().unwrap();
        let config_path = temp.path().join("missing.toml");
        let cli = Cli::try_parse_from([
            "batch-studio",
            "--config",
            config_path.to_str().unwrap(),
            "providers",
        ])
        .unwrap();
        let config = build_logging_config(&cli);
        assert_eq!(config.output, "stderr", "default output keeps stdout clean");
        assert_eq!(config.level, "info", "default level should be info");
    }

    #[test]
    fn test_build_logging_config_verbose_and_overrides() {
        let cli = Cli::try_parse_from([
            "batch-studio",
            "--verbose",
            "--log-format",
            "json",
            "--log-output",
            "stdout",
            "providers",
        ])
        .unwrap();
        let config = build_logging_config(&cli);
        assert_eq!(config.level, "debug", "verbose should set level to debug");
        assert_eq!(config.format, "json");
        assert_eq!(config.output, "stdout");
    }

    #[test]
    fn test_explicit_log_level_wins_over_verbose() {
        let cli = Cli::try_parse_from(["batch-studio", "--verbose", "--log-level", "warn", "providers"]).unwrap();
        assert_eq!(build_logging_config(&cli).level, "warn");
    }
}
