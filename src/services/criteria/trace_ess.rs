//! Effective sample size over scalar trace columns.

use tracing::debug;

use super::{ConvergenceCheck, EvaluationContext, NOT_COMPUTED};
use crate::domain::errors::{ConfigError, EvaluationResult};
use crate::domain::models::criteria::TraceEssConfig;
use crate::domain::models::trace::DiagnosticColumns;
use crate::domain::ports::Topology;
use crate::services::autocorrelation::AutocorrelationAccumulator;

/// ESS of the pooled post-burn-in samples of every diagnostic column.
///
/// Each column's chains are concatenated in chain order; the criterion holds
/// when the smallest ESS reaches `target_ess` per chain.
#[derive(Debug, Clone)]
pub struct TraceEss {
    config: TraceEssConfig,
    names: Vec<String>,
    values: Vec<f64>,
}

impl TraceEss {
    /// Criterion with no evaluation yet.
    pub fn new(config: TraceEssConfig) -> Self {
        Self {
            config,
            names: Vec::new(),
            values: Vec::new(),
        }
    }

    /// ESS of every column from the last evaluation.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl ConvergenceCheck for TraceEss {
    fn setup(&mut self, chain_count: usize, columns: &DiagnosticColumns) -> Result<(), ConfigError> {
        if chain_count == 0 {
            return Err(ConfigError::InvalidChainCount(chain_count));
        }
        self.config.validate()?;
        self.names = columns.names().to_vec();
        self.values = vec![NOT_COMPUTED; self.names.len()];
        Ok(())
    }

    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        let mut min_ess = f64::INFINITY;
        for (slot, (_, column)) in ctx.columns.iter().enumerate() {
            let mut pooled = AutocorrelationAccumulator::new();
            for (chain, &burnin) in ctx.burnin.iter().enumerate() {
                let start = burnin.min(ctx.end);
                for &value in ctx.window(chain, column, start, ctx.end)? {
                    pooled.push(value);
                }
            }
            let ess = pooled.ess().unwrap_or(0.0);
            self.values[slot] = ess;
            min_ess = min_ess.min(ess);
        }
        let target = (self.config.target_ess * ctx.chain_count()) as f64;
        debug!(end = ctx.end, min_ess, target, "Trace ESS evaluated");
        Ok(min_ess >= target)
    }

    fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = NOT_COMPUTED);
    }

    fn header(&self) -> &'static str {
        "TraceEss"
    }

    fn log_values(&self) -> Vec<(String, f64)> {
        self.names.iter().cloned().zip(self.values.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{absolute, columns, tables, Point};
    use super::*;
    use crate::services::distance_cache::DistanceCache;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn noise(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn evaluate(criterion: &mut TraceEss, chains: &[Vec<Vec<f64>>], end: usize) -> bool {
        let tables = tables(chains);
        let columns = columns(&["posterior", "likelihood"]);
        let trees: Vec<Vec<Point>> = vec![Vec::new(); chains.len()];
        let mut cache = DistanceCache::new(4);
        let burnin = vec![0; chains.len()];
        let mut ctx = EvaluationContext {
            tables: &tables,
            columns: &columns,
            trees: &trees,
            cache: &mut cache,
            distance: &absolute,
            burnin: &burnin,
            end,
        };
        criterion.converged(&mut ctx)
    }

    #[test]
    fn test_independent_samples_reach_target() {
        let mut criterion = TraceEss::new(TraceEssConfig { target_ess: 100 });
        criterion
            .setup(2, &columns(&["posterior", "likelihood"]))
            .unwrap();
        let chains = vec![
            vec![noise(1, 400), noise(2, 400)],
            vec![noise(3, 400), noise(4, 400)],
        ];
        assert!(!evaluate(&mut criterion, &chains, 50));
        assert!(evaluate(&mut criterion, &chains, 400));
        assert_eq!(criterion.log_values().len(), 2);
    }

    #[test]
    fn test_slowly_mixing_trace_fails() {
        let mut criterion = TraceEss::new(TraceEssConfig { target_ess: 100 });
        criterion
            .setup(2, &columns(&["posterior", "likelihood"]))
            .unwrap();
        let ramp: Vec<f64> = (0..400).map(f64::from).collect();
        let chains = vec![
            vec![noise(1, 400), ramp.clone()],
            vec![noise(3, 400), ramp],
        ];
        assert!(!evaluate(&mut criterion, &chains, 400));
        assert!(criterion.values()[1] < 200.0);
    }
}
