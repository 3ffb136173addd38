//! PSRF-like convergence test on two chains' tree sequences.
//!
//! For a tree `x` of the first chain, the statistic compares its distances
//! to the trees of the other chain with its distances to the trees of its
//! own chain. Averaged over the smoothing window the ratio is close to 1
//! once both chains sample the same tree distribution.

use tracing::{debug, info};

use super::tree_ess::{pseudo_ess, Stride};
use super::{ConvergenceCheck, EvaluationContext, NOT_COMPUTED};
use crate::domain::errors::{ConfigError, EvaluationError, EvaluationResult};
use crate::domain::models::criteria::TreePsrfConfig;
use crate::domain::models::trace::DiagnosticColumns;
use crate::domain::ports::Topology;
use crate::services::distance_cache::TreeSet;

/// Tree PSRF criterion over two chains.
///
/// With `check_ess`, the pseudo ESS is taken from the window start of the
/// first passing tick for as long as the statistic keeps passing.
#[derive(Debug, Clone)]
pub struct TreePsrf {
    config: TreePsrfConfig,
    stride: Stride,
    /// Start of the window in which the PSRF first passed, while it keeps
    /// passing.
    start0: Option<usize>,
    previous: bool,
    /// Last `psrf(0, 1)` and `psrf(1, 0)`.
    values: [f64; 2],
}

impl TreePsrf {
    /// Criterion with stride 1 and no passing window.
    pub fn new(config: TreePsrfConfig) -> Self {
        Self {
            config,
            stride: Stride::default(),
            start0: None,
            previous: false,
            values: [NOT_COMPUTED; 2],
        }
    }

    /// Current tree stride.
    pub fn delta(&self) -> usize {
        self.stride.delta()
    }

    /// Whether the PSRF currently passes, i.e. the criterion is tracking.
    pub fn start0(&self) -> Option<usize> {
        self.start0
    }

    /// Mean over the window of the between/within distance ratio of `own`.
    fn mean_psrf<T>(
        &self,
        ctx: &mut EvaluationContext<'_, T>,
        own: TreeSet,
        other: TreeSet,
        start: usize,
        end: usize,
    ) -> EvaluationResult<f64> {
        let delta = self.stride.delta();
        if start >= end {
            return Err(EvaluationError::EmptyWindow { start, end });
        }
        let own_start = self.stride.ceil(ctx.burnin[own.chain()]);
        let other_start = self.stride.ceil(ctx.burnin[other.chain()]);

        let mut total = 0.0;
        let mut count = 0usize;
        for x in (start..end).step_by(delta) {
            let mut within = 0.0;
            for i in (own_start..end).step_by(delta) {
                let d = ctx.distance_plus_one(own, x, own, i)?;
                within += d * d;
            }
            let mut between = 0.0;
            for i in (other_start..end).step_by(delta) {
                let d = ctx.distance_plus_one(own, x, other, i)?;
                between += d * d;
            }
            total += if within > 0.0 {
                (between / within).sqrt()
            } else {
                between.sqrt()
            };
            count += 1;
        }
        let psrf = total / count as f64;
        if !psrf.is_finite() {
            return Err(EvaluationError::NonFinite {
                name: "tree psrf",
                value: psrf,
            });
        }
        Ok(psrf)
    }

    /// Both PSRF directions over the smoothing window ending at the largest
    /// multiple of the stride not above `ctx.end`. Used on finished runs.
    pub fn measure<T>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<[f64; 2]> {
        self.stride.fit(ctx.end, self.config.window.cache_limit, "TreePsrf");
        let end = self.stride.floor(ctx.end);
        let start = self.stride.window_start(end, self.config.window.smoothing);
        let forward = self.mean_psrf(ctx, TreeSet::First, TreeSet::Second, start, end)?;
        let backward = self.mean_psrf(ctx, TreeSet::Second, TreeSet::First, start, end)?;
        self.values = [forward, backward];
        Ok(self.values)
    }

    /// Whether `psrf` lies within `[1 - b, 1 + b]`.
    pub fn passes(&self, psrf: f64) -> bool {
        (1.0 - self.config.b..=1.0 + self.config.b).contains(&psrf)
    }

    fn decide<T>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        let end = ctx.end;
        let delta = self.stride.delta();
        if end % delta != 0 {
            return Ok(self.previous);
        }
        self.stride.fit(end, self.config.window.cache_limit, "TreePsrf");
        if end % self.stride.delta() != 0 {
            return Ok(self.previous);
        }
        let start = self.stride.window_start(end, self.config.window.smoothing);

        self.values = [NOT_COMPUTED; 2];
        let forward = self.mean_psrf(ctx, TreeSet::First, TreeSet::Second, start, end)?;
        self.values[0] = forward;
        if !self.passes(forward) {
            self.start0 = None;
            return Ok(false);
        }
        if self.config.two_sided {
            let backward = self.mean_psrf(ctx, TreeSet::Second, TreeSet::First, start, end)?;
            self.values[1] = backward;
            if !self.passes(backward) {
                self.start0 = None;
                return Ok(false);
            }
        }
        let start0 = *self.start0.get_or_insert(start);
        if !self.config.check_ess {
            return Ok(true);
        }

        // the reference tree is left out of its own trace, so one extra
        // tree is needed to reach the target
        let target = self.config.window.target_ess;
        if end - start0 <= target {
            return Ok(false);
        }
        let sample_size = self.config.window.sample_size;
        let target = target as f64;
        let first = pseudo_ess(ctx, TreeSet::First, start0, end, self.stride, sample_size)?;
        if first < target {
            return Ok(false);
        }
        if self.config.two_sided {
            let second = pseudo_ess(ctx, TreeSet::Second, start0, end, self.stride, sample_size)?;
            if second < target {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl ConvergenceCheck for TreePsrf {
    fn setup(&mut self, chain_count: usize, _columns: &DiagnosticColumns) -> Result<(), ConfigError> {
        self.config.validate(chain_count)
    }

    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        let converged = self.decide(ctx)?;
        if converged && !self.previous {
            info!(end = ctx.end, psrf = ?self.values, "Tree PSRF passed");
        }
        debug!(
            end = ctx.end,
            delta = self.stride.delta(),
            start0 = ?self.start0,
            psrf = ?self.values,
            converged,
            "Tree PSRF evaluated"
        );
        self.previous = converged;
        Ok(converged)
    }

    fn reset(&mut self) {
        self.start0 = None;
        self.previous = false;
    }

    fn header(&self) -> &'static str {
        "TreePsrf"
    }

    fn log_values(&self) -> Vec<(String, f64)> {
        self.values
            .iter()
            .enumerate()
            .map(|(chain, &psrf)| (format!("GRT-{chain}"), psrf))
            .collect()
    }
}
