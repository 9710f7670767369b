//! Census CLI
//!
//! Command-line interface for discovering, searching, and querying Census
//! API datasets.

#![warn(clippy::all)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod commands;
mod config_handlers;

use anyhow::Result;
use census_core::{CensusConfig, SchedulingMode};
use clap::Parser;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose {
        "debug"
    } else {
        "info,census=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Config { action } => {
            config_handlers::handle_config_command(args.config.as_deref(), action)?;
        }
        command => {
            let config = effective_config(args.config.as_deref(), args.vintage, args.sequential)?;
            commands::run(&config, command).await?;
        }
    }
    Ok(())
}

/// Load the config file and apply command-line overrides.
fn effective_config(
    config_path: Option<&str>,
    vintage: Option<String>,
    sequential: bool,
) -> Result<CensusConfig> {
    let mut config = CensusConfig::load(config_path)?;
    if vintage.is_some() {
        config.vintage = vintage;
    }
    if sequential {
        config.discovery.scheduling = SchedulingMode::Sequential;
    }
    config.validate()?;
    tracing::debug!(
        base_url = %config.base_url,
        vintage = ?config.vintage,
        backend = %config.index.backend,
        "Effective configuration"
    );
    Ok(config)
}
