//! Implementation of the `autostop monitor` command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use comfy_table::Cell;
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::application::{merge_logs, MergedLogs, Monitor};
use crate::cli::output::{format_value, list_table, output, verdict_cell, CommandOutput};
use crate::domain::models::config::Config;
use crate::domain::models::report::{CriterionStatus, MonitorReport, StopReason, TickOutcome};
use crate::domain::ports::{ChainFactory, StopSignal};
use crate::infrastructure::config::ConfigLoader;

/// Settings shared by every command that monitors chains.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Number of chains, overriding the configuration
    #[arg(short = 'n', long)]
    pub chains: Option<usize>,

    /// Directory holding the per-chain logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Directory receiving the combined logs
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Keep the per-chain logs only, without combining them
    #[arg(long)]
    pub no_merge: bool,
}

impl RunArgs {
    /// Apply the overrides and validate the result.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(chains) = self.chains {
            config.chains = chains;
        }
        if let Some(dir) = &self.log_dir {
            config.monitor.log_dir.clone_from(dir);
        }
        if let Some(dir) = &self.output_dir {
            config.monitor.output_dir.clone_from(dir);
        }
        ConfigLoader::validate(config).context("Invalid run settings")?;
        Ok(())
    }
}

/// Arguments of `autostop monitor`.
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Shared monitoring options
    #[command(flatten)]
    pub run: RunArgs,
}

/// Result of a monitoring run.
#[derive(Debug, Serialize)]
pub struct MonitorOutput {
    /// Session identifier
    pub session_id: Uuid,
    /// Why the run ended
    pub reason: StopReason,
    /// Whether every criterion passed on the last tick
    pub converged: bool,
    /// Ticks evaluated
    pub ticks: usize,
    /// Watermark of the last tick
    pub watermark: usize,
    /// Per-chain burn-in of the last tick
    pub burnin: Vec<usize>,
    /// When monitoring started
    pub started_at: DateTime<Utc>,
    /// When monitoring ended
    pub finished_at: DateTime<Utc>,
    /// Criterion results of the last tick
    pub criteria: Vec<CriterionStatus>,
    /// Combined logs, when merging ran
    pub merged: Option<MergedLogs>,
}

impl MonitorOutput {
    /// Summarise `report` for display.
    pub fn new(report: &MonitorReport, chain_count: usize, merged: Option<MergedLogs>) -> Self {
        Self {
            session_id: report.session_id,
            reason: report.reason,
            converged: report.converged(),
            ticks: report.ticks,
            watermark: report.last.as_ref().map_or(0, |last| last.watermark),
            burnin: report.burnin(chain_count),
            started_at: report.started_at,
            finished_at: report.finished_at,
            criteria: report
                .last
                .as_ref()
                .map(|last| last.criteria.clone())
                .unwrap_or_default(),
            merged,
        }
    }
}

impl CommandOutput for MonitorOutput {
    fn to_human(&self) -> String {
        let verdict = match self.reason {
            StopReason::Converged => style("Converged").green().bold(),
            StopReason::ChainsFinished => style("Chains finished before converging").yellow().bold(),
            StopReason::Requested => style("Stopped on request").yellow(),
        };
        let elapsed = self.finished_at - self.started_at;
        let mut lines = vec![
            format!("{verdict} after {} samples per chain", self.watermark),
            format!(
                "Session {} ({} ticks, {}s)",
                self.session_id,
                self.ticks,
                elapsed.num_seconds()
            ),
            format!(
                "Burn-in: {}",
                self.burnin
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ];

        if !self.criteria.is_empty() {
            let mut table = list_table(&["Criterion", "Passed", "Diagnostics"]);
            for status in &self.criteria {
                let values = status
                    .values
                    .iter()
                    .map(|(name, value)| format!("{name}={}", format_value(*value)))
                    .collect::<Vec<_>>()
                    .join("  ");
                table.add_row(vec![
                    Cell::new(&status.header),
                    verdict_cell(status.converged),
                    Cell::new(values),
                ]);
            }
            lines.push(String::new());
            lines.push(table.to_string());
        }

        if let Some(merged) = &self.merged {
            lines.push(String::new());
            for file in merged.trace.iter().chain(merged.trees.iter()) {
                lines.push(format!(
                    "Wrote {} samples to {}",
                    file.samples,
                    file.path.display()
                ));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Raise `stop` on Ctrl-C.
fn stop_on_interrupt(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            stop.raise();
        }
    });
}

/// Progress line on stderr every `every` ticks.
fn progress(json_mode: bool, every: usize) -> impl FnMut(&TickOutcome) {
    let term = console::Term::stderr();
    move |outcome: &TickOutcome| {
        if json_mode || !(outcome.converged || outcome.watermark % every == 0) {
            return;
        }
        let values = outcome
            .log_values()
            .iter()
            .map(|(name, value)| format!("{name}={}", format_value(*value)))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = term.write_line(&format!(
            "{} {values}",
            style(format!("[{}]", outcome.watermark)).dim()
        ));
    }
}

/// Monitor the configured chains, merge their logs and print the report.
pub(crate) async fn run_and_report(
    config: Config,
    factory: Option<Arc<dyn ChainFactory>>,
    merge: bool,
    json_mode: bool,
) -> Result<()> {
    let chain_count = config.chains;
    let output_dir = config.monitor.output_dir.clone();
    let monitor = Monitor::new(config);
    stop_on_interrupt(monitor.stop_signal());

    let report = monitor.run(factory, progress(json_mode, 100)).await?;
    let merged = if merge {
        Some(merge_logs(monitor.layout(), &report.burnin(chain_count), &output_dir)?)
    } else {
        None
    };
    output(&MonitorOutput::new(&report, chain_count, merged), json_mode);
    Ok(())
}

/// Monitor live chains, optionally launching them first.
pub async fn execute(args: MonitorArgs, mut config: Config, json_mode: bool) -> Result<()> {
    args.run.apply(&mut config)?;
    run_and_report(config, None, !args.run.no_merge, json_mode).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_override_and_validate() {
        let mut config = Config::default();
        let args = RunArgs {
            log_dir: Some(PathBuf::from("/tmp/logs")),
            ..Default::default()
        };
        args.apply(&mut config).unwrap();
        assert_eq!(config.monitor.log_dir, PathBuf::from("/tmp/logs"));

        // the default tree criterion only handles two chains
        let args = RunArgs {
            chains: Some(3),
            ..Default::default()
        };
        assert!(args.apply(&mut config).is_err());
    }

    #[test]
    fn test_output_without_ticks() {
        let report = MonitorReport {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            reason: StopReason::ChainsFinished,
            ticks: 0,
            last: None,
        };
        let out = MonitorOutput::new(&report, 2, None);
        assert_eq!(out.burnin, vec![0, 0]);
        assert_eq!(out.to_json()["reason"], "chains_finished");
        assert!(out.to_human().contains("0 samples"));
    }
}
