//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod acquire;
mod config_cmd;
mod fetch;
mod icons;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "throttle")]
#[command(about = "Rate-limited HTTP requests with bounded retries")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Send requests through the rate limiter and retry policy
    Fetch {
        /// URL to request
        url: String,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Extra header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short, long)]
        data: Option<String>,
        /// Number of requests to send
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
        /// Maximum requests in flight
        #[arg(short, long, default_value = "1")]
        concurrency: usize,
    },

    /// Take admissions from a rate limiter and print their timestamps
    Acquire {
        /// Number of admissions to take
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
        /// Admissions per window (defaults to rate_limit.limit)
        #[arg(short, long)]
        limit: Option<u32>,
        /// Window length in seconds (defaults to rate_limit.time_period)
        #[arg(short, long)]
        period: Option<f64>,
        /// Share the window through this SQLite file
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path).await?
        }
        None => Config::load().await,
    };

    match cli.command {
        Commands::Fetch {
            url,
            method,
            headers,
            data,
            count,
            concurrency,
        } => {
            let request = fetch::FetchArgs {
                url,
                method,
                headers,
                data,
                count,
                concurrency,
            };
            fetch::cmd_fetch(&config, request).await
        }
        Commands::Acquire {
            count,
            limit,
            period,
            state,
        } => acquire::cmd_acquire(&config, count, limit, period, state).await,
        Commands::Config => config_cmd::cmd_config_show(&config),
    }
}
