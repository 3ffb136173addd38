//! Clade frequency difference between chains.
//!
//! Each chain counts the clades of its trees up to the watermark. The
//! statistic is the largest absolute difference in clade frequency over
//! all pairs of chains.

use std::collections::HashMap;

use tracing::debug;

use super::{ConvergenceCheck, EvaluationContext, NOT_COMPUTED};
use crate::domain::errors::{ConfigError, EvaluationResult};
use crate::domain::models::criteria::CladeDifferenceConfig;
use crate::domain::models::trace::DiagnosticColumns;
use crate::domain::models::tree::Clade;
use crate::domain::ports::Topology;

/// Clade counts of one chain.
#[derive(Debug, Clone, Default)]
struct CladeCounts {
    counts: HashMap<Clade, usize>,
    /// Trees counted so far; also the index of the next tree to count.
    trees: usize,
}

impl CladeCounts {
    fn add(&mut self, clades: Vec<Clade>) {
        for clade in clades {
            *self.counts.entry(clade).or_insert(0) += 1;
        }
        self.trees += 1;
    }

    /// Largest clade frequency difference over the clades of `self`.
    fn max_difference(&self, other: &Self) -> f64 {
        if self.trees == 0 {
            return 1.0;
        }
        let largest = self
            .counts
            .iter()
            .map(|(clade, &count)| count.abs_diff(other.counts.get(clade).copied().unwrap_or(0)))
            .max()
            .unwrap_or(0);
        largest as f64 / self.trees as f64
    }
}

/// Largest difference in clade support between any two chains.
///
/// Every tree is counted once, when the watermark first passes it.
#[derive(Debug, Clone)]
pub struct CladeDifference {
    config: CladeDifferenceConfig,
    chains: Vec<CladeCounts>,
    value: f64,
}

impl CladeDifference {
    /// Criterion with no trees counted.
    pub fn new(config: CladeDifferenceConfig) -> Self {
        Self {
            config,
            chains: Vec::new(),
            value: NOT_COMPUTED,
        }
    }

    /// Largest clade frequency difference at the last evaluation.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl ConvergenceCheck for CladeDifference {
    fn setup(&mut self, chain_count: usize, _columns: &DiagnosticColumns) -> Result<(), ConfigError> {
        if chain_count < 2 {
            return Err(ConfigError::InvalidChainCount(chain_count));
        }
        self.config.validate()?;
        self.chains = vec![CladeCounts::default(); chain_count];
        Ok(())
    }

    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        if self.chains.len() != ctx.chain_count() {
            self.chains = vec![CladeCounts::default(); ctx.chain_count()];
        }
        for (chain, counts) in self.chains.iter_mut().enumerate() {
            while counts.trees < ctx.end {
                let tree = ctx.tree(chain, counts.trees)?;
                counts.add(tree.clades());
            }
        }

        let mut largest: f64 = 0.0;
        for (a, first) in self.chains.iter().enumerate() {
            for (b, second) in self.chains.iter().enumerate() {
                if a != b {
                    largest = largest.max(first.max_difference(second));
                }
            }
        }
        self.value = largest;
        debug!(end = ctx.end, difference = largest, "Clade difference evaluated");
        Ok(largest < self.config.threshold)
    }

    fn header(&self) -> &'static str {
        "CladeDifference"
    }

    fn log_values(&self) -> Vec<(String, f64)> {
        vec![("CladeDiff".to_string(), self.value)]
    }
}
