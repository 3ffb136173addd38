//! Tree pseudo-ESS criterion and the stride handling shared with the tree
//! PSRF criterion.
//!
//! Tree criteria only look at every `delta`-th tree. `delta` starts at 1
//! and doubles whenever the number of strided trees up to the watermark
//! would exceed the cache limit, which bounds the distance computations per
//! tick.

use tracing::{debug, warn};

use super::{ConvergenceCheck, EvaluationContext, NOT_COMPUTED};
use crate::domain::errors::{ConfigError, EvaluationResult};
use crate::domain::models::criteria::{TreeEssConfig, TreeWindowConfig};
use crate::domain::models::trace::DiagnosticColumns;
use crate::domain::ports::Topology;
use crate::services::autocorrelation;
use crate::services::distance_cache::TreeSet;

/// Power-of-two stride over the tree sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stride {
    delta: usize,
}

impl Default for Stride {
    fn default() -> Self {
        Self { delta: 1 }
    }
}

impl Stride {
    /// Current step between included trees.
    pub fn delta(self) -> usize {
        self.delta
    }

    /// Double the stride until `end / delta` fits in `cache_limit`.
    pub fn fit(&mut self, end: usize, cache_limit: usize, criterion: &'static str) {
        while end / self.delta > cache_limit {
            self.delta *= 2;
            warn!(criterion, delta = self.delta, end, "Doubling tree stride");
        }
    }

    /// Largest multiple of delta not above `index`.
    pub fn floor(self, index: usize) -> usize {
        index - index % self.delta
    }

    /// Smallest multiple of delta not below `index`.
    pub fn ceil(self, index: usize) -> usize {
        match index % self.delta {
            0 => index,
            rest => index + self.delta - rest,
        }
    }

    /// Start of the smoothing window ending at `end`.
    pub fn window_start(self, end: usize, smoothing: f64) -> usize {
        // 1 - 0.9 is slightly below 0.1 in binary
        let start = end as f64 * (1.0 - smoothing) + 1e-9;
        self.floor(start as usize)
    }
}

/// Pseudo-ESS of tree set `set` over `[cut_start, cut_end)`.
///
/// `sample_size` reference trees are spread over the window. For each, the
/// distances from every other strided tree to the reference form a trace;
/// the result is the mean ESS of those traces scaled by the stride.
pub fn pseudo_ess<T>(
    ctx: &mut EvaluationContext<'_, T>,
    set: TreeSet,
    cut_start: usize,
    cut_end: usize,
    stride: Stride,
    sample_size: usize,
) -> EvaluationResult<f64> {
    let cut_start = stride.floor(cut_start);
    if cut_end <= cut_start || sample_size == 0 {
        return Ok(0.0);
    }
    let span = cut_end - cut_start;
    let delta = stride.delta();
    let mut total = 0.0;
    for k in 0..sample_size {
        let reference = cut_start + stride.floor(span * k / sample_size);
        let mut trace = Vec::with_capacity(span / delta);
        for i in (cut_start..cut_end).step_by(delta) {
            if i != reference {
                trace.push(ctx.distance_plus_one(set, i, set, reference)?);
            }
        }
        total += autocorrelation::ess(&trace).unwrap_or(0.0);
    }
    Ok(total / sample_size as f64 * delta as f64)
}

/// Converged when the pseudo-ESS of every chain reaches the target.
#[derive(Debug, Clone)]
pub struct TreeEss {
    config: TreeWindowConfig,
    stride: Stride,
    values: [f64; 2],
}

impl TreeEss {
    /// Criterion with stride 1.
    pub fn new(config: TreeEssConfig) -> Self {
        Self {
            config: config.window,
            stride: Stride::default(),
            values: [NOT_COMPUTED; 2],
        }
    }

    /// Current tree stride.
    pub fn delta(&self) -> usize {
        self.stride.delta()
    }
}

impl ConvergenceCheck for TreeEss {
    fn setup(&mut self, chain_count: usize, _columns: &DiagnosticColumns) -> Result<(), ConfigError> {
        self.config.validate("TreeEss", chain_count)
    }

    fn evaluate<T: Topology>(&mut self, ctx: &mut EvaluationContext<'_, T>) -> EvaluationResult<bool> {
        self.stride.fit(ctx.end, self.config.cache_limit, "TreeEss");
        let end = self.stride.floor(ctx.end);
        let start = self.stride.window_start(end, self.config.smoothing);
        let target = self.config.target_ess as f64;

        let mut converged = true;
        for set in [TreeSet::First, TreeSet::Second] {
            let ess = pseudo_ess(ctx, set, start, end, self.stride, self.config.sample_size)?;
            self.values[set.chain()] = ess;
            converged &= ess >= target;
        }
        debug!(end, start, delta = self.stride.delta(), ess = ?self.values, "Tree ESS evaluated");
        Ok(converged)
    }

    fn reset(&mut self) {
        self.values = [NOT_COMPUTED; 2];
    }

    fn header(&self) -> &'static str {
        "TreeEss"
    }

    fn log_values(&self) -> Vec<(String, f64)> {
        self.values
            .iter()
            .enumerate()
            .map(|(chain, &ess)| (format!("TreeESS-{chain}"), ess))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{columns, Point};
    use super::*;
    use crate::services::distance_cache::DistanceCache;

    #[test]
    fn test_stride_rounding() {
        let mut stride = Stride::default();
        stride.fit(1000, 300, "test");
        assert_eq!(stride.delta(), 4);
        assert_eq!(stride.floor(13), 12);
        assert_eq!(stride.ceil(13), 16);
        assert_eq!(stride.ceil(12), 12);
        assert_eq!(stride.window_start(1000, 0.9), 100);
    }

    fn context<'a>(
        trees: &'a [Vec<Point>],
        cache: &'a mut DistanceCache,
        columns: &'a DiagnosticColumns,
        distance: &'a dyn crate::domain::ports::TreeDistance<Point>,
        end: usize,
    ) -> EvaluationContext<'a, Point> {
        EvaluationContext {
            tables: &[],
            columns,
            trees,
            cache,
            distance,
            burnin: &[0, 0],
            end,
        }
    }

    #[test]
    fn test_identical_trees_have_full_pseudo_ess() {
        let trees = vec![vec![Point(0.0); 200], vec![Point(0.0); 200]];
        let mut cache = DistanceCache::new(16);
        let columns = columns(&["posterior"]);
        let metric = |a: &Point, b: &Point| (a.0 - b.0).abs();
        let mut ctx = context(&trees, &mut cache, &columns, &metric, 200);
        let ess = pseudo_ess(&mut ctx, TreeSet::First, 0, 200, Stride::default(), 10).unwrap();
        assert!((ess - 199.0).abs() < 1e-9, "ess = {ess}");
    }

    #[test]
    fn test_tree_ess_criterion() {
        let trees = vec![vec![Point(0.0); 300], vec![Point(0.0); 300]];
        let mut cache = DistanceCache::new(16);
        let columns = columns(&["posterior"]);
        let metric = |a: &Point, b: &Point| (a.0 - b.0).abs();
        let mut criterion = TreeEss::new(TreeEssConfig::default());
        criterion.setup(2, &columns).unwrap();

        // window [10, 100) holds 90 trees
        let mut ctx = context(&trees, &mut cache, &columns, &metric, 100);
        assert!(!criterion.converged(&mut ctx));
        // window [30, 300) holds 270 trees
        let mut ctx = context(&trees, &mut cache, &columns, &metric, 300);
        assert!(criterion.converged(&mut ctx));
        assert_eq!(criterion.log_values()[1].0, "TreeESS-1");
    }

    #[test]
    fn test_missing_tree_resets() {
        let trees = vec![vec![Point(0.0); 20], vec![Point(0.0); 5]];
        let mut cache = DistanceCache::new(16);
        let columns = columns(&["posterior"]);
        let metric = |a: &Point, b: &Point| (a.0 - b.0).abs();
        let mut criterion = TreeEss::new(TreeEssConfig::default());
        let mut ctx = context(&trees, &mut cache, &columns, &metric, 20);
        assert!(!criterion.converged(&mut ctx));
        assert!((criterion.log_values()[0].1 - NOT_COMPUTED).abs() < f64::EPSILON);
    }
}
