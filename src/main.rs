//! Autostop CLI entry point.

use anyhow::Context;
use clap::Parser;

use autostop::cli::{Cli, Commands};
use autostop::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match autostop::cli::load_config(cli.config.as_deref(), cli.log_level.as_deref()) {
        Ok(config) => config,
        Err(err) => autostop::cli::handle_error(err, cli.json),
    };
    let _logger = match LogConfig::try_from(&config.logging)
        .context("Invalid logging configuration")
        .and_then(|log_config| LoggerImpl::init(&log_config))
    {
        Ok(logger) => logger,
        Err(err) => autostop::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Monitor(args) => autostop::cli::commands::monitor::execute(args, config, cli.json).await,
        Commands::Emulate(args) => autostop::cli::commands::emulate::execute(args, config, cli.json).await,
        Commands::CheckTrees(args) => {
            autostop::cli::commands::check_trees::execute(args, config, cli.json).await
        }
        Commands::Burnin(args) => autostop::cli::commands::burnin::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        autostop::cli::handle_error(err, cli.json);
    }
}
