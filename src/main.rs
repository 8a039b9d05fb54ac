//! Repocache - metadata repository cache manager
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use repocache::cli::{Cli, Commands};
use repocache::config::ConfigManager;
use repocache::error::RepoCacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RepoCacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("repocache=warn"),
        1 => EnvFilter::new("repocache=info"),
        _ => EnvFilter::new("repocache=debug"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Fetch(args) => repocache::cli::commands::fetch(args, &config).await,
        Commands::Evict(args) => repocache::cli::commands::evict(args, &config).await,
        Commands::List(args) => repocache::cli::commands::list(args, &config).await,
        Commands::Config(args) => {
            repocache::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
