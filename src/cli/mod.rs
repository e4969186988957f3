//! CLI module for the netquery cache
//!
//! Subcommands inspect a cache built from the resolved configuration:
//! - `config`: print the configuration or its validation errors
//! - `stats`: print the stats snapshot, optionally after a demo workload
//! - `purge-disk`: delete overflow files left by earlier processes

pub mod purge_disk;
pub mod show_config;
pub mod stats;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Semantic result cache for network queries
#[derive(Parser)]
#[command(name = "netquery-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the resolved cache configuration as JSON
    Config,

    /// Print cache statistics as JSON
    Stats(stats::StatsArgs),

    /// Remove every overflow file under the configured disk path
    PurgeDisk,
}

/// Load `.env`, the layered configuration and the logger
pub(crate) fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    Ok(config)
}
