//! Combining the per-chain logs of a finished run.
//!
//! Post-burn-in samples of every chain are concatenated in chain order and
//! re-numbered `0, Δ, 2Δ, …`, where Δ is the sampling interval of chain 0.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::models::tree::TaxonMap;
use crate::domain::ports::{ChainLayout, ChainSpec};
use crate::infrastructure::log_tail::{TraceLog, TreeLog};

/// One combined log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedFile {
    /// Where the file was written
    pub path: PathBuf,
    /// Samples kept across all chains
    pub samples: usize,
    /// Sample number step of the renumbered output
    pub interval: u64,
}

/// Combined logs written by [`merge_logs`]; `None` for a skipped stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergedLogs {
    /// Combined trace log
    pub trace: Option<MergedFile>,
    /// Combined tree log
    pub trees: Option<MergedFile>,
}

/// Write the combined trace and tree logs of `layout`'s chains into
/// `output_dir`, under the layout's file names.
///
/// A stream is skipped when any chain lacks its log. Tree burn-in follows
/// the trace burn-in by sample number when trace logs exist, and the
/// burn-in index otherwise.
pub fn merge_logs(
    layout: &ChainLayout,
    burnin: &[usize],
    output_dir: &Path,
) -> Result<MergedLogs> {
    let specs = layout.chains(burnin.len());
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let traces = if all_exist(&specs, |spec| &spec.trace_path) {
        specs
            .iter()
            .map(|spec| TraceLog::read(&spec.trace_path))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let mut merged = MergedLogs::default();
    if !traces.is_empty() {
        let path = output_dir.join(layout.trace_log());
        merged.trace = Some(write_trace(&path, &traces, burnin)?);
    }

    if all_exist(&specs, |spec| &spec.tree_path) {
        let taxa = TaxonMap::new();
        let trees = specs
            .iter()
            .map(|spec| TreeLog::read(&spec.tree_path, &taxa))
            .collect::<Result<Vec<_>>>()?;
        let tree_burnin: Vec<usize> = trees
            .iter()
            .enumerate()
            .map(|(chain, log)| match traces.get(chain).and_then(|t| t.rows.get(burnin[chain])) {
                Some(row) => log.states.iter().filter(|&&state| (state as f64) < row[0]).count(),
                None => burnin[chain].min(log.len()),
            })
            .collect();
        let path = output_dir.join(layout.tree_log());
        merged.trees = Some(write_trees(&path, &trees, &tree_burnin)?);
    }

    info!(
        trace = ?merged.trace.as_ref().map(|file| file.samples),
        trees = ?merged.trees.as_ref().map(|file| file.samples),
        output_dir = %output_dir.display(),
        "Merged chain logs"
    );
    Ok(merged)
}

fn all_exist(specs: &[ChainSpec], path: impl Fn(&ChainSpec) -> &PathBuf) -> bool {
    let present = specs.iter().filter(|spec| path(spec).exists()).count();
    if present > 0 && present < specs.len() {
        warn!(present, chains = specs.len(), "Some chain logs are missing, not merging them");
    }
    present > 0 && present == specs.len()
}

fn write_trace(path: &Path, logs: &[TraceLog], burnin: &[usize]) -> Result<MergedFile> {
    let interval = logs[0].sample_interval();
    let mut out = String::new();
    if let Some(labels) = logs.iter().find_map(|log| log.labels.as_ref()) {
        out.push_str(&labels.join("\t"));
        out.push('\n');
    }
    let mut samples = 0usize;
    for (log, &skip) in logs.iter().zip(burnin) {
        for line in log.lines.iter().skip(skip) {
            let rest: Vec<&str> = line.split_whitespace().skip(1).collect();
            let _ = writeln!(out, "{}\t{}", samples as u64 * interval, rest.join("\t"));
            samples += 1;
        }
    }
    std::fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(MergedFile {
        path: path.to_path_buf(),
        samples,
        interval,
    })
}

fn write_trees(path: &Path, logs: &[TreeLog], burnin: &[usize]) -> Result<MergedFile> {
    let interval = match logs[0].states.as_slice() {
        [first, second, ..] if second > first => second - first,
        _ => 1,
    };
    let mut out = String::new();
    for line in &logs[0].preamble {
        out.push_str(line);
        out.push('\n');
    }
    let mut samples = 0usize;
    for (log, &skip) in logs.iter().zip(burnin) {
        for suffix in log.suffixes.iter().skip(skip) {
            let _ = writeln!(out, "tree STATE_{}{suffix}", samples as u64 * interval);
            samples += 1;
        }
    }
    out.push_str("End;\n");
    std::fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(MergedFile {
        path: path.to_path_buf(),
        samples,
        interval,
    })
}
