//! Implementation of the `autostop emulate` command.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::monitor::{run_and_report, RunArgs};
use crate::domain::models::config::Config;
use crate::domain::ports::ChainLayout;
use crate::infrastructure::chains::EmulatedChainFactory;

/// Arguments of `autostop emulate`.
#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Directory holding the recorded logs, named `chain{i}-{file}`
    pub source_dir: PathBuf,

    /// Delay between two replayed samples, in milliseconds
    #[arg(long, default_value = "10")]
    pub pace_ms: u64,

    /// Shared monitoring options
    #[command(flatten)]
    pub run: RunArgs,
}

/// Replay recorded logs through the monitor.
pub async fn execute(args: EmulateArgs, mut config: Config, json_mode: bool) -> Result<()> {
    args.run.apply(&mut config)?;

    let source = args
        .source_dir
        .canonicalize()
        .with_context(|| format!("Recording directory {} not found", args.source_dir.display()))?;
    std::fs::create_dir_all(&config.monitor.log_dir).with_context(|| {
        format!(
            "Failed to create log directory {}",
            config.monitor.log_dir.display()
        )
    })?;
    let target = config.monitor.log_dir.canonicalize()?;
    if source == target {
        bail!(
            "Replayed logs would overwrite the recording in {}; choose another --log-dir",
            source.display()
        );
    }

    let layout = ChainLayout::new(
        source,
        config.monitor.trace_log.clone(),
        config.monitor.tree_log.clone(),
    );
    let factory = EmulatedChainFactory::new(layout, Duration::from_millis(args.pace_ms));
    run_and_report(config, Some(Arc::new(factory)), !args.run.no_merge, json_mode).await
}
