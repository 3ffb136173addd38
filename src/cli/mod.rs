//! Command-line interface.

/// Subcommand implementations
pub mod commands;
/// Human and JSON output
pub mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::domain::models::config::Config;
use crate::infrastructure::config::ConfigLoader;

/// Top-level command line.
#[derive(Parser, Debug)]
#[command(name = "autostop")]
#[command(about = "Online convergence monitoring for parallel MCMC chains", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file; defaults to .autostop/config.yaml and .autostop/local.yaml
    #[arg(short, long, global = true, env = "AUTOSTOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level, overriding the configuration
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tail the logs of running chains until they converge, then merge them
    Monitor(commands::monitor::MonitorArgs),
    /// Replay recorded chain logs and monitor them as if they were running
    Emulate(commands::emulate::EmulateArgs),
    /// Pairwise tree PSRF of finished tree logs
    CheckTrees(commands::check_trees::CheckTreesArgs),
    /// Burn-in and ESS of every column of a finished trace log
    Burnin(commands::burnin::BurninArgs),
}

/// Load the configuration from `path`, or from the default locations.
pub fn load_config(path: Option<&Path>, log_level: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(level) = log_level {
        config.logging.level = level.to_string();
        ConfigLoader::validate(&config)?;
    }
    Ok(config)
}

/// Print an error and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("Error:").red().bold());
    }
    std::process::exit(1);
}
