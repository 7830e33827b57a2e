//! Feedplay CLI - Headless Feed Media Driver
//!
//! Features:
//! - Manifest resolution against transcoder output
//! - Preload scheduling with live status
//! - Effective configuration dump

use clap::{Parser, Subcommand};
use feedplay_core::FeedConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Feedplay CLI - Feed video caching toolkit
#[derive(Parser)]
#[command(name = "feedplay")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Resolve, preload and inspect feed video assets", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a content location to its playable asset
    Resolve {
        /// URL or local path of the content location
        location: String,
    },

    /// Push locations through the load scheduler
    Preload {
        /// URLs or local paths of content locations
        #[arg(required = true)]
        locations: Vec<String>,

        /// Priority tier (high, normal, low)
        #[arg(short, long, default_value = "normal")]
        priority: String,

        /// Give up waiting after this many seconds
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },

    /// Print the effective configuration
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    feedplay_core::init();

    let config = match &cli.config {
        Some(path) => commands::load_config(path)?,
        None => FeedConfig::default(),
    };

    match cli.command {
        Commands::Resolve { location } => {
            commands::resolve(config, &location, &cli.format).await?;
        }
        Commands::Preload { locations, priority, timeout } => {
            commands::preload(config, &locations, &priority, timeout, &cli.format).await?;
        }
        Commands::Config { output } => {
            commands::show_config(&config, output)?;
        }
    }

    Ok(())
}
