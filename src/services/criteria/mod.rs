//! Stopping criteria evaluated by the convergence session.
//!
//! Every criterion implements [`ConvergenceCheck`]. The session stores them
//! in the closed [`ConvergenceCriterion`] enum and hands each one an
//! [`EvaluationContext`] borrowing the ingested samples for one tick.
//!
//! Failures inside an evaluation are caught at the criterion boundary:
//! they are logged, the criterion state is reset and the tick counts as not
//! converged.

/// Split clade frequency difference
pub mod clade_difference;
/// Scalar PSRF
pub mod gelman_rubin;
/// Trace ESS
pub mod trace_ess;
/// Tree pseudo ESS
pub mod tree_ess;
/// Tree PSRF
pub mod tree_psrf;

pub use clade_difference::CladeDifference;
pub use gelman_rubin::GelmanRubin;
pub use trace_ess::TraceEss;
pub use tree_ess::TreeEss;
pub use tree_psrf::TreePsrf;

use tracing::warn;

use crate::domain::errors::{ConfigError, EvaluationError, EvaluationResult};
use crate::domain::models::criteria::CriterionConfig;
use crate::domain::models::trace::{DiagnosticColumns, ScalarTable};
use crate::domain::ports::{Topology, TreeDistance};
use crate::services::distance_cache::{DistanceCache, TreeSet};

/// Marker for diagnostics that have not been computed yet.
pub const NOT_COMPUTED: f64 = -2.0;

/// Read access to one tick's data.
pub struct EvaluationContext<'a, T> {
    /// Scalar table per chain.
    pub tables: &'a [ScalarTable],
    /// Diagnostic columns of the tables.
    pub columns: &'a DiagnosticColumns,
    /// Tree sequence per chain.
    pub trees: &'a [Vec<T>],
    /// Distances shared between tree criteria.
    pub cache: &'a mut DistanceCache,
    /// Tree metric.
    pub distance: &'a dyn TreeDistance<T>,
    /// Burn-in per chain.
    pub burnin: &'a [usize],
    /// Watermark: every chain has at least this many samples.
    pub end: usize,
}

impl<T> EvaluationContext<'_, T> {
    /// Number of chains.
    pub fn chain_count(&self) -> usize {
        self.burnin.len()
    }

    /// Samples `[start, end)` of table column `column` of chain `chain`.
    pub fn window(
        &self,
        chain: usize,
        column: usize,
        start: usize,
        end: usize,
    ) -> EvaluationResult<&[f64]> {
        let values = self
            .tables
            .get(chain)
            .and_then(|table| table.column(column))
            .ok_or(EvaluationError::MissingSample {
                chain,
                column,
                index: start,
            })?;
        if end > values.len() || start > end {
            return Err(EvaluationError::MissingSample {
                chain,
                column,
                index: end.saturating_sub(1),
            });
        }
        Ok(&values[start..end])
    }

    /// Tree `index` of chain `chain`.
    pub fn tree(&self, chain: usize, index: usize) -> EvaluationResult<&T> {
        self.trees
            .get(chain)
            .and_then(|trees| trees.get(index))
            .ok_or(EvaluationError::MissingTree { chain, index })
    }

    /// Distance plus one between two trees, computed on a cache miss.
    pub fn distance_plus_one(
        &mut self,
        set_a: TreeSet,
        i: usize,
        set_b: TreeSet,
        j: usize,
    ) -> EvaluationResult<f64> {
        let cached = self.cache.get(set_a, i, set_b, j);
        if cached > 0.0 {
            return Ok(f64::from(cached));
        }
        let trees = self.trees;
        let lookup = |set: TreeSet, index: usize| {
            trees
                .get(set.chain())
                .and_then(|chain| chain.get(index))
                .ok_or(EvaluationError::MissingTree {
                    chain: set.chain(),
                    index,
                })
        };
        let a = lookup(set_a, i)?;
        let b = lookup(set_b, j)?;
        let distance = self.distance;
        let value = self
            .cache
            .get_or_compute(set_a, i, set_b, j, || distance.distance(a, b));
        Ok(f64::from(value))
    }
}

/// Capability shared by all stopping criteria.
pub trait ConvergenceCheck {
    /// Validate the criterion against the session before the first tick.
    fn setup(&mut self, chain_count: usize, columns: &DiagnosticColumns) -> Result<(), ConfigError>;

    /// Evaluate the criterion at `ctx.end`.
    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool>;

    /// Forget progress after a failed evaluation.
    fn reset(&mut self) {}

    /// Column header used in tick reports.
    fn header(&self) -> &'static str;

    /// Named diagnostics of the last evaluation.
    fn log_values(&self) -> Vec<(String, f64)>;

    /// Evaluate, treating any evaluation error as "not converged".
    fn converged<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> bool {
        match self.evaluate(ctx) {
            Ok(converged) => converged,
            Err(e) => {
                warn!(
                    criterion = self.header(),
                    end = ctx.end,
                    error = %e,
                    "Criterion evaluation failed, resetting"
                );
                self.reset();
                false
            }
        }
    }
}

/// All supported stopping criteria.
#[derive(Debug, Clone)]
pub enum ConvergenceCriterion {
    /// See [`GelmanRubin`]
    GelmanRubin(GelmanRubin),
    /// See [`TraceEss`]
    TraceEss(TraceEss),
    /// See [`TreePsrf`]
    TreePsrf(TreePsrf),
    /// See [`TreeEss`]
    TreeEss(TreeEss),
    /// See [`CladeDifference`]
    CladeDifference(CladeDifference),
}

impl ConvergenceCriterion {
    /// Fresh criterion for `config`.
    pub fn from_config(config: &CriterionConfig) -> Self {
        match config {
            CriterionConfig::GelmanRubin(c) => Self::GelmanRubin(GelmanRubin::new(c.clone())),
            CriterionConfig::TraceEss(c) => Self::TraceEss(TraceEss::new(c.clone())),
            CriterionConfig::TreePsrf(c) => Self::TreePsrf(TreePsrf::new(c.clone())),
            CriterionConfig::TreeEss(c) => Self::TreeEss(TreeEss::new(c.clone())),
            CriterionConfig::CladeDifference(c) => {
                Self::CladeDifference(CladeDifference::new(c.clone()))
            }
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            ConvergenceCriterion::GelmanRubin($inner) => $body,
            ConvergenceCriterion::TraceEss($inner) => $body,
            ConvergenceCriterion::TreePsrf($inner) => $body,
            ConvergenceCriterion::TreeEss($inner) => $body,
            ConvergenceCriterion::CladeDifference($inner) => $body,
        }
    };
}

impl ConvergenceCheck for ConvergenceCriterion {
    fn setup(&mut self, chain_count: usize, columns: &DiagnosticColumns) -> Result<(), ConfigError> {
        dispatch!(self, c => c.setup(chain_count, columns))
    }

    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        dispatch!(self, c => c.evaluate(ctx))
    }

    fn reset(&mut self) {
        dispatch!(self, c => c.reset());
    }

    fn header(&self) -> &'static str {
        dispatch!(self, c => c.header())
    }

    fn log_values(&self) -> Vec<(String, f64)> {
        dispatch!(self, c => c.log_values())
    }
}

/// Mean of a non-empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (`n - 1` denominator) around `mean`.
pub(crate) fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::models::tree::Clade;

    /// Tree stand-in whose distance is chosen by the test.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Point(pub f64);

    impl Topology for Point {
        fn clades(&self) -> Vec<Clade> {
            Vec::new()
        }
    }

    pub fn absolute(a: &Point, b: &Point) -> f64 {
        (a.0 - b.0).abs()
    }

    pub fn columns(names: &[&str]) -> DiagnosticColumns {
        let names: Vec<String> = names.iter().map(|s| (*s).to_string()).collect();
        DiagnosticColumns::resolve(&names, None).unwrap()
    }

    /// Tables with a sample number column followed by `columns[c]`.
    pub fn tables(chains: &[Vec<Vec<f64>>]) -> Vec<ScalarTable> {
        chains
            .iter()
            .map(|columns| {
                let mut table = ScalarTable::new();
                let rows = columns.first().map_or(0, Vec::len);
                for row in 0..rows {
                    let mut values = vec![row as f64];
                    values.extend(columns.iter().map(|column| column[row]));
                    table.push_row(&values).unwrap();
                }
                table
            })
            .collect()
    }
}
