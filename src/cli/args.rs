//! CLI argument definitions using clap derive

use crate::config::Strategy;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Flakepin - pin nixpkgs packages to an attribute path and commit
///
/// Resolves a package name and version to the nixpkgs attribute and
/// commit that provide it, for reproducible sandbox installs.
#[derive(Parser, Debug)]
#[command(name = "flakepin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FLAKEPIN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a package version to a nixpkgs attribute and commit
    Resolve(ResolveArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Package name, e.g. htop or nodejs
    pub name: String,

    /// Exact version, e.g. 3.2.1
    #[arg(value_name = "VERSION")]
    pub pkg_version: String,

    /// Target platform (defaults to resolver.system)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Channel to search, most preferred first (repeatable)
    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<String>,

    /// Override resolver.strategy
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip the durable resolution cache for this call
    #[arg(long)]
    pub no_durable: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
