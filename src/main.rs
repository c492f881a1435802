//! Flakepin - nixpkgs package pinning
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use flakepin::cli::{Cli, Commands};
use flakepin::config::ConfigManager;
use flakepin::error::FlakepinResult;
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

async fn run() -> FlakepinResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    // 0 = warn (spinner only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("flakepin=warn"),
        1 => EnvFilter::new("flakepin=info"),
        _ => EnvFilter::new("flakepin=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }

    debug!("Using config {}", manager.path().display());

    match cli.command {
        Commands::Resolve(args) => flakepin::cli::commands::resolve(args, &config).await,
        Commands::Config(args) => flakepin::cli::commands::config(args, &manager, &config).await,
    }
}
