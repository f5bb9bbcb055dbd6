//! CLI command definitions and dispatch.

mod append;
mod config;
mod flatten;
mod inspect;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use strata_core::StrataConfig;

/// Strata - compose and flatten OCI image layouts.
#[derive(Parser)]
#[command(name = "strata", version, about)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Flatten an image into a single tar archive
    Flatten(flatten::FlattenArgs),
    /// Append tar layers to an image
    Append(append::AppendArgs),
    /// Change an image's runtime configuration
    Config(config::ConfigArgs),
    /// Show an image's digests and layers
    Inspect(inspect::InspectArgs),
}

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<StrataConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(StrataConfig::load(path)?),
        None => Ok(StrataConfig::default()),
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Flatten(args) => flatten::execute(args, &config).await,
        Command::Append(args) => append::execute(args).await,
        Command::Config(args) => config::execute(args).await,
        Command::Inspect(args) => inspect::execute(args).await,
    }
}
