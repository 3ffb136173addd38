//! Gelman-Rubin potential scale reduction factor over scalar traces.

use tracing::debug;

use super::{mean, sample_variance, ConvergenceCheck, EvaluationContext, NOT_COMPUTED};
use crate::domain::errors::{ConfigError, EvaluationError, EvaluationResult};
use crate::domain::models::criteria::{GelmanRubinConfig, PsrfForm};
use crate::domain::models::trace::DiagnosticColumns;
use crate::domain::ports::Topology;

/// Running moments of one chain's window `[lo, hi)` of one column.
#[derive(Debug, Clone, Default)]
struct RunningMoments {
    shift: f64,
    sum: f64,
    sum_sq: f64,
    lo: usize,
    hi: usize,
}

impl RunningMoments {
    fn rebuild(values: &[f64], lo: usize, hi: usize) -> Self {
        let shift = values.get(lo).copied().unwrap_or(0.0);
        let mut moments = Self {
            shift,
            lo,
            hi: lo,
            ..Self::default()
        };
        moments.extend(&values[lo..hi]);
        moments.hi = hi;
        moments
    }

    fn extend(&mut self, values: &[f64]) {
        for value in values {
            let x = value - self.shift;
            self.sum += x;
            self.sum_sq += x * x;
        }
    }

    fn retract(&mut self, values: &[f64]) {
        for value in values {
            let x = value - self.shift;
            self.sum -= x;
            self.sum_sq -= x * x;
        }
    }

    /// Move the window to `[lo, hi)`, touching only the samples that left
    /// or entered it.
    fn advance(&mut self, values: &[f64], lo: usize, hi: usize) {
        if lo < self.lo || hi < self.hi || lo > self.hi {
            *self = Self::rebuild(values, lo, hi);
            return;
        }
        self.retract(&values[self.lo..lo]);
        self.extend(&values[self.hi..hi]);
        self.lo = lo;
        self.hi = hi;
    }

    fn count(&self) -> usize {
        self.hi - self.lo
    }

    fn mean(&self) -> f64 {
        self.shift + self.sum / self.count() as f64
    }

    fn variance(&self) -> f64 {
        let n = self.count() as f64;
        ((self.sum_sq - self.sum * self.sum / n) / (n - 1.0)).max(0.0)
    }
}

/// Scalar multi-chain PSRF.
///
/// Converged when the PSRF of every diagnostic column is at most the
/// configured threshold.
#[derive(Debug, Clone)]
pub struct GelmanRubin {
    config: GelmanRubinConfig,
    names: Vec<String>,
    values: Vec<f64>,
    /// `[chain][column]`, incremental mode only.
    moments: Vec<Vec<RunningMoments>>,
}

impl GelmanRubin {
    /// Criterion with empty running sums.
    pub fn new(config: GelmanRubinConfig) -> Self {
        Self {
            config,
            names: Vec::new(),
            values: Vec::new(),
            moments: Vec::new(),
        }
    }

    /// PSRF of every column from the last evaluation.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn psrf(&self, means: &[f64], variances: &[f64], n: usize) -> f64 {
        let m = means.len() as f64;
        let n = n as f64;
        let grand = mean(means);
        let between = n / (m - 1.0) * means.iter().map(|x| (x - grand).powi(2)).sum::<f64>();
        let within = mean(variances);
        if within <= 0.0 {
            return if between <= 0.0 { 1.0 } else { f64::INFINITY };
        }
        let ratio = match self.config.form {
            PsrfForm::Classic => (n - 1.0) / n + between / within / n,
            PsrfForm::BrooksGelman => {
                ((n - 1.0) / n * within + (m + 1.0) / (m * n) * between) / within
            }
        };
        ratio.sqrt()
    }

    fn evaluate_window<T>(&mut self, ctx: &EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        let end = ctx.end;
        let n = ctx
            .burnin
            .iter()
            .map(|&burnin| end.saturating_sub(burnin))
            .min()
            .unwrap_or(0);
        if n < 2 {
            return Ok(false);
        }
        let start = end - n;
        let mut converged = true;
        for (slot, (_, column)) in ctx.columns.iter().enumerate() {
            let mut means = Vec::with_capacity(ctx.chain_count());
            let mut variances = Vec::with_capacity(ctx.chain_count());
            for chain in 0..ctx.chain_count() {
                let window = ctx.window(chain, column, start, end)?;
                let m = mean(window);
                means.push(m);
                variances.push(sample_variance(window, m));
            }
            let r = self.psrf(&means, &variances, n);
            self.values[slot] = r;
            converged &= r <= self.config.threshold;
        }
        Ok(converged)
    }

    fn evaluate_incremental<T>(&mut self, ctx: &EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        let end = ctx.end;
        let lo = end * self.config.burn_in_percent as usize / 100;
        let n = end - lo;
        if n < 2 {
            return Ok(false);
        }
        let mut converged = true;
        for (slot, (_, column)) in ctx.columns.iter().enumerate() {
            let mut means = Vec::with_capacity(ctx.chain_count());
            let mut variances = Vec::with_capacity(ctx.chain_count());
            for chain in 0..ctx.chain_count() {
                let values = ctx.window(chain, column, 0, end)?;
                let moments = &mut self.moments[chain][slot];
                moments.advance(values, lo, end);
                means.push(moments.mean());
                variances.push(moments.variance());
            }
            let r = self.psrf(&means, &variances, n);
            self.values[slot] = r;
            converged &= r <= self.config.threshold;
        }
        Ok(converged)
    }
}

impl ConvergenceCheck for GelmanRubin {
    fn setup(&mut self, chain_count: usize, columns: &DiagnosticColumns) -> Result<(), ConfigError> {
        if chain_count < 2 {
            return Err(ConfigError::InvalidChainCount(chain_count));
        }
        self.config.validate()?;
        self.names = columns.names().to_vec();
        self.values = vec![NOT_COMPUTED; self.names.len()];
        self.moments = vec![vec![RunningMoments::default(); self.names.len()]; chain_count];
        Ok(())
    }

    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        let converged = if self.config.incremental {
            self.evaluate_incremental(ctx)?
        } else {
            self.evaluate_window(ctx)?
        };
        if let Some(bad) = self.values.iter().find(|r| r.is_nan()) {
            return Err(EvaluationError::NonFinite {
                name: "psrf",
                value: *bad,
            });
        }
        debug!(end = ctx.end, psrf = ?self.values, converged, "Gelman-Rubin evaluated");
        Ok(converged)
    }

    fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = NOT_COMPUTED);
        self.moments
            .iter_mut()
            .flatten()
            .for_each(|moments| *moments = RunningMoments::default());
    }

    fn header(&self) -> &'static str {
        "GelmanRubin"
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
    use rand::{Rng, SeedableRng};

    fn run(criterion: &mut GelmanRubin, chains: &[Vec<Vec<f64>>], burnin: &[usize], end: usize) -> bool {
        let tables = tables(chains);
        let columns = columns(&["posterior"]);
        let trees: Vec<Vec<Point>> = vec![Vec::new(); chains.len()];
        let mut cache = DistanceCache::new(4);
        let mut ctx = EvaluationContext {
            tables: &tables,
            columns: &columns,
            trees: &trees,
            cache: &mut cache,
            distance: &absolute,
            burnin,
            end,
        };
        criterion.converged(&mut ctx)
    }

    fn set_up(config: GelmanRubinConfig, chains: usize) -> GelmanRubin {
        let mut criterion = GelmanRubin::new(config);
        criterion.setup(chains, &columns(&["posterior"])).unwrap();
        criterion
    }

    fn uniform(seed: u64, lo: f64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| lo + rng.gen::<f64>()).collect()
    }

    #[test]
    fn test_identical_constant_chains_converge() {
        let mut criterion = set_up(GelmanRubinConfig::default(), 2);
        let chain = vec![vec![3.5; 100]];
        assert!(run(&mut criterion, &[chain.clone(), chain], &[0, 0], 100));
        assert!((criterion.values()[0] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_chains_never_converge() {
        let mut criterion = set_up(GelmanRubinConfig::default(), 2);
        let a = vec![uniform(1, 0.0, 2000)];
        let b = vec![uniform(2, 10.0, 2000)];
        for end in (100..=2000).step_by(100) {
            assert!(!run(&mut criterion, &[a.clone(), b.clone()], &[0, 0], end));
        }
        assert!(criterion.values()[0] > 2.0);
    }

    #[test]
    fn test_disjoint_constant_chains_never_converge() {
        let mut criterion = set_up(GelmanRubinConfig::default(), 2);
        let chains = [vec![vec![1.0; 50]], vec![vec![2.0; 50]]];
        assert!(!run(&mut criterion, &chains, &[0, 0], 50));
        assert!(criterion.values()[0].is_infinite());
    }

    #[test]
    fn test_same_distribution_converges() {
        let mut criterion = set_up(GelmanRubinConfig::default(), 3);
        let chains: Vec<Vec<Vec<f64>>> = (0..3).map(|seed| vec![uniform(seed, 0.0, 3000)]).collect();
        assert!(run(&mut criterion, &chains, &[0, 0, 0], 3000));
    }

    #[test]
    fn test_window_uses_shortest_post_burnin_length() {
        // the first 50 samples of chain 1 are far off, its burn-in removes them
        let mut criterion = set_up(GelmanRubinConfig::default(), 2);
        let a = uniform(3, 0.0, 1000);
        let mut b = uniform(4, 0.0, 1000);
        b[..50].iter_mut().for_each(|x| *x += 100.0);
        let chains = [vec![a], vec![b]];
        assert!(!run(&mut criterion, &chains, &[0, 0], 1000));
        assert!(run(&mut criterion, &chains, &[0, 50], 1000));
    }

    #[test]
    fn test_too_few_samples() {
        let mut criterion = set_up(GelmanRubinConfig::default(), 2);
        let chain = vec![vec![1.0; 10]];
        assert!(!run(&mut criterion, &[chain.clone(), chain], &[9, 9], 10));
    }

    #[test]
    fn test_incremental_matches_recomputation() {
        let a = vec![uniform(5, 0.0, 2000)];
        let b = vec![uniform(6, 0.1, 2000)];
        let chains = [a, b];
        let mut incremental = set_up(
            GelmanRubinConfig {
                incremental: true,
                ..Default::default()
            },
            2,
        );
        let mut direct = set_up(GelmanRubinConfig::default(), 2);
        for end in (100..=2000).step_by(50) {
            let burnin = end / 10;
            let x = run(&mut incremental, &chains, &[0, 0], end);
            let y = run(&mut direct, &chains, &[burnin, burnin], end);
            assert_eq!(x, y, "end {end}");
            let diff = (incremental.values()[0] - direct.values()[0]).abs();
            assert!(diff < 1e-9, "end {end}: {diff}");
        }
    }

    #[test]
    fn test_brooks_gelman_form_is_larger() {
        let a = vec![uniform(7, 0.0, 500)];
        let b = vec![uniform(8, 0.3, 500)];
        let chains = [a, b];
        let mut classic = set_up(GelmanRubinConfig::default(), 2);
        let mut corrected = set_up(
            GelmanRubinConfig {
                form: PsrfForm::BrooksGelman,
                ..Default::default()
            },
            2,
        );
        run(&mut classic, &chains, &[0, 0], 500);
        run(&mut corrected, &chains, &[0, 0], 500);
        assert!(corrected.values()[0] > classic.values()[0]);
    }

    #[test]
    fn test_setup_requires_two_chains() {
        let mut criterion = GelmanRubin::new(GelmanRubinConfig::default());
        assert_eq!(
            criterion.setup(1, &columns(&["posterior"])),
            Err(ConfigError::InvalidChainCount(1))
        );
    }
}
