//! Implementation of the `autostop check-trees` command.

use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{format_value, list_table, output, verdict_cell, CommandOutput};
use crate::domain::models::config::Config;
use crate::domain::models::criteria::{CriterionConfig, TreePsrfConfig};
use crate::domain::models::trace::DiagnosticColumns;
use crate::domain::models::tree::{PhyloTree, TaxonMap};
use crate::infrastructure::log_tail::TreeLog;
use crate::services::criteria::{EvaluationContext, TreePsrf};
use crate::services::distance_cache::DistanceCache;
use crate::services::robinson_foulds::RobinsonFoulds;

/// Arguments of `autostop check-trees`.
#[derive(Args, Debug)]
pub struct CheckTreesArgs {
    /// Tree logs of finished chains
    #[arg(required = true, num_args = 2..)]
    pub files: Vec<PathBuf>,

    /// Burn-in, in percent of the trees of each file
    #[arg(short, long, default_value = "10")]
    pub burnin: u32,

    /// Fraction of the trees included in the test; defaults to the configured value
    #[arg(long)]
    pub smoothing: Option<f64>,

    /// Acceptance tolerance around 1; defaults to the configured value
    #[arg(short = 'b', long)]
    pub tolerance: Option<f64>,
}

/// Tree PSRF of one pair of files.
#[derive(Debug, Serialize)]
pub struct PairPsrf {
    /// Index of the first file
    pub first: usize,
    /// Index of the second file
    pub second: usize,
    /// Trees per file after burn-in and smoothing
    pub trees: usize,
    /// PSRF with each file as the reference
    pub psrf: [f64; 2],
    /// Both values within tolerance
    pub passed: bool,
}

/// Result of `autostop check-trees`.
#[derive(Debug, Serialize)]
pub struct CheckTreesOutput {
    /// Compared tree logs
    pub files: Vec<PathBuf>,
    /// Burn-in applied to each file
    pub burnin_percent: u32,
    /// Accepted distance from 1
    pub tolerance: f64,
    /// Every pair of files, in order
    pub pairs: Vec<PairPsrf>,
}

impl CommandOutput for CheckTreesOutput {
    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .files
            .iter()
            .enumerate()
            .map(|(i, file)| format!("[{i}] {}", file.display()))
            .collect();
        let mut table = list_table(&["Pair", "Trees", "PSRF a|b", "PSRF b|a", "Within band"]);
        for pair in &self.pairs {
            table.add_row(vec![
                Cell::new(format!("{} - {}", pair.first, pair.second)),
                Cell::new(pair.trees),
                Cell::new(format_value(pair.psrf[0])),
                Cell::new(format_value(pair.psrf[1])),
                verdict_cell(pair.passed),
            ]);
        }
        lines.push(format!(
            "Burn-in {}%, tolerance {}",
            self.burnin_percent, self.tolerance
        ));
        lines.push(table.to_string());
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Tree PSRF settings: the configured ones with the command-line overrides.
fn psrf_config(args: &CheckTreesArgs, config: &Config) -> Result<TreePsrfConfig> {
    let mut psrf = config
        .session
        .criteria
        .iter()
        .find_map(|criterion| match criterion {
            CriterionConfig::TreePsrf(psrf) => Some(psrf.clone()),
            _ => None,
        })
        .unwrap_or_default();
    if let Some(smoothing) = args.smoothing {
        psrf.window.smoothing = smoothing;
    }
    if let Some(tolerance) = args.tolerance {
        psrf.b = tolerance;
    }
    psrf.validate(2)?;
    Ok(psrf)
}

/// PSRF of chains `first` and `second` over their common length.
pub fn compare(config: &TreePsrfConfig, first: &[PhyloTree], second: &[PhyloTree]) -> Result<PairPsrf> {
    let trees = first.len().min(second.len());
    let sequences = vec![first[..trees].to_vec(), second[..trees].to_vec()];
    let columns = DiagnosticColumns::resolve(&["posterior".to_string()], None)?;
    let mut cache = DistanceCache::new(trees.min(config.window.cache_limit));
    let mut criterion = TreePsrf::new(config.clone());
    let mut ctx = EvaluationContext {
        tables: &[],
        columns: &columns,
        trees: &sequences,
        cache: &mut cache,
        distance: &RobinsonFoulds,
        burnin: &[0, 0],
        end: trees,
    };
    let psrf = criterion.measure(&mut ctx)?;
    Ok(PairPsrf {
        first: 0,
        second: 1,
        trees,
        psrf,
        passed: psrf.iter().all(|&value| criterion.passes(value)),
    })
}

/// Compare every pair of finished tree logs with the tree PSRF.
pub async fn execute(args: CheckTreesArgs, config: Config, json_mode: bool) -> Result<()> {
    if args.burnin > 99 {
        bail!("Burn-in must be below 100%, not {}", args.burnin);
    }
    let psrf_config = psrf_config(&args, &config)?;

    let taxa = TaxonMap::new();
    let mut chains = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let log = TreeLog::read(file, &taxa)?;
        let skip = log.len() * args.burnin as usize / 100;
        if log.len() - skip < 2 {
            bail!("{} holds too few trees after burn-in", file.display());
        }
        chains.push(log.trees[skip..].to_vec());
    }

    let mut pairs = Vec::new();
    for first in 0..chains.len() {
        for second in first + 1..chains.len() {
            let pair = compare(&psrf_config, &chains[first], &chains[second])
                .with_context(|| format!("Failed to compare chains {first} and {second}"))?;
            pairs.push(PairPsrf {
                first,
                second,
                ..pair
            });
        }
    }

    output(
        &CheckTreesOutput {
            files: args.files,
            burnin_percent: args.burnin,
            tolerance: psrf_config.b,
            pairs,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(newick: &[&str], taxa: &TaxonMap) -> Vec<PhyloTree> {
        newick.iter().map(|n| PhyloTree::parse(n, taxa).unwrap()).collect()
    }

    #[test]
    fn test_same_tree_distribution_passes() {
        let taxa = TaxonMap::new();
        let pattern = ["((1,2),(3,4));", "((1,3),(2,4));", "((1,4),(2,3));"];
        let mut first = Vec::new();
        for i in 0..60 {
            first.push(pattern[i % 3]);
        }
        let first = parse(&first, &taxa);
        let second = first.clone();
        let config = TreePsrfConfig::default();
        let pair = compare(&config, &first, &second).unwrap();
        assert_eq!(pair.trees, 60);
        assert!((pair.psrf[0] - 1.0).abs() < 1e-9);
        assert!((pair.psrf[1] - 1.0).abs() < 1e-9);
        assert!(pair.passed);
    }

    #[test]
    fn test_disjoint_topologies_fail() {
        let taxa = TaxonMap::new();
        let first = parse(&["((1,2),(3,4));"; 30], &taxa);
        let second = parse(&["((1,3),(2,4));"; 30], &taxa);
        let pair = compare(&TreePsrfConfig::default(), &first, &second).unwrap();
        assert!(pair.psrf[0] > 1.5);
        assert!(!pair.passed);
    }
}
