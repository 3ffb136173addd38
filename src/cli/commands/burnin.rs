//! Implementation of the `autostop burnin` command.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use comfy_table::Cell;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{format_value, list_table, output, verdict_cell, CommandOutput};
use crate::domain::models::config::Config;
use crate::domain::models::strategy::BurnInStrategy;
use crate::infrastructure::log_tail::TraceLog;
use crate::services::autocorrelation;
use crate::services::burn_in::BurnInEstimator;

/// Burn-in strategy names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Moving average against the last quarter
    MovingAverage,
    /// Range overlap, with ESS refinement
    RangeOverlap,
    /// Fixed percentage of the samples
    FixedFraction,
}

/// Arguments of `autostop burnin`.
#[derive(Args, Debug)]
pub struct BurninArgs {
    /// Trace log of a finished chain
    pub file: PathBuf,

    /// Burn-in strategy; defaults to the configured one
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Percentage used by the fixed-fraction strategy
    #[arg(long, default_value = "10")]
    pub percent: u32,

    /// Columns to analyse; all columns but the sample number by default
    #[arg(short, long, value_delimiter = ',')]
    pub columns: Vec<String>,
}

impl BurninArgs {
    fn strategy(&self, configured: BurnInStrategy) -> BurnInStrategy {
        match self.strategy {
            None => configured,
            Some(StrategyArg::MovingAverage) => BurnInStrategy::MovingAverage,
            Some(StrategyArg::RangeOverlap) => BurnInStrategy::RangeOverlap { refine: true },
            Some(StrategyArg::FixedFraction) => BurnInStrategy::FixedFraction {
                percent: self.percent,
            },
        }
    }
}

/// Burn-in of one trace column.
#[derive(Debug, Serialize)]
pub struct ColumnBurnin {
    /// Column label
    pub column: String,
    /// First sample kept
    pub burnin: usize,
    /// False when the strategy fell back
    pub stationary: bool,
    /// Mean after burn-in
    pub mean: f64,
    /// Effective sample size after burn-in, if enough samples remain
    pub ess: Option<f64>,
}

/// Result of `autostop burnin`.
#[derive(Debug, Serialize)]
pub struct BurninOutput {
    /// Analysed trace log
    pub file: PathBuf,
    /// Strategy name
    pub strategy: String,
    /// Samples in the log
    pub samples: usize,
    /// Per-column results
    pub columns: Vec<ColumnBurnin>,
}

impl CommandOutput for BurninOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["Column", "Burn-in", "Stationary", "Mean", "ESS"]);
        for column in &self.columns {
            table.add_row(vec![
                Cell::new(&column.column),
                Cell::new(column.burnin),
                verdict_cell(column.stationary),
                Cell::new(format_value(column.mean)),
                Cell::new(column.ess.map_or_else(|| "-".to_string(), |ess| format!("{ess:.1}"))),
            ]);
        }
        format!(
            "{} ({} samples, {})\n{table}",
            self.file.display(),
            self.samples,
            self.strategy
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Burn-in, mean and post-burn-in ESS of the selected columns of `log`.
pub fn analyse(log: &TraceLog, strategy: BurnInStrategy, columns: &[String]) -> Result<Vec<ColumnBurnin>> {
    let labels: Vec<String> = match &log.labels {
        Some(labels) => labels.clone(),
        None => {
            let width = log.rows.first().map_or(0, Vec::len);
            (0..width).map(|i| format!("column{i}")).collect()
        }
    };
    let selected: Vec<usize> = if columns.is_empty() {
        (1..labels.len()).collect()
    } else {
        columns
            .iter()
            .map(|name| {
                labels.iter().position(|label| label == name).ok_or_else(|| {
                    anyhow::anyhow!("Unknown column '{name}'. Use one of {labels:?}")
                })
            })
            .collect::<Result<_>>()?
    };

    let estimator = BurnInEstimator::new(strategy, 1);
    let samples = log.rows.len();
    Ok(selected
        .into_iter()
        .map(|index| {
            let values = log.column(index);
            let burnin = estimator.estimate(&values, samples);
            let kept = &values[burnin.index.min(samples)..];
            let mean = if kept.is_empty() {
                0.0
            } else {
                kept.iter().sum::<f64>() / kept.len() as f64
            };
            ColumnBurnin {
                column: labels[index].clone(),
                burnin: burnin.index,
                stationary: burnin.stationary,
                mean,
                ess: autocorrelation::ess(kept),
            }
        })
        .collect())
}

/// Estimate the burn-in of every selected column of a finished trace log.
pub async fn execute(args: BurninArgs, config: Config, json_mode: bool) -> Result<()> {
    let strategy = args.strategy(config.session.burn_in);
    strategy.validate()?;
    let log = TraceLog::read(&args.file)?;
    if log.rows.is_empty() {
        bail!("{} holds no samples", args.file.display());
    }
    let columns = analyse(&log, strategy, &args.columns)?;
    output(
        &BurninOutput {
            file: args.file,
            strategy: strategy.as_str().to_string(),
            samples: log.rows.len(),
            columns,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> TraceLog {
        let mut text = String::from("Sample\tposterior\tprior\n");
        for i in 0..200 {
            let posterior = if i < 40 { -100.0 + f64::from(i) } else { f64::from(i % 5) };
            text.push_str(&format!("{}\t{posterior}\t{}\n", i * 10, i % 3));
        }
        TraceLog::parse(&text)
    }

    #[test]
    fn test_analyse_all_columns() {
        let columns = analyse(&log(), BurnInStrategy::FixedFraction { percent: 10 }, &[]).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].column, "posterior");
        assert_eq!(columns[0].burnin, 20);
        assert!(columns[0].stationary);
        assert!(columns[1].ess.is_some());
    }

    #[test]
    fn test_unknown_column() {
        let result = analyse(&log(), BurnInStrategy::MovingAverage, &["joint".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_strategy_override() {
        let args = BurninArgs {
            file: PathBuf::from("trace.log"),
            strategy: Some(StrategyArg::FixedFraction),
            percent: 25,
            columns: Vec::new(),
        };
        assert_eq!(
            args.strategy(BurnInStrategy::MovingAverage),
            BurnInStrategy::FixedFraction { percent: 25 }
        );
    }
}
