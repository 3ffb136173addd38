//! Burn-in estimation for scalar traces.
//!
//! An estimate is either *stationary* (the strategy found a point after
//! which the trace looks settled) or a fallback reported while the chain is
//! still moving. Per chain the estimator keeps a floor of stationary
//! estimates and the last reported burn-in, so the reported burn-in never
//! moves backwards while one strategy is in use, fallbacks included.

use crate::domain::models::strategy::BurnInStrategy;
use crate::services::autocorrelation;

/// Width of the moving-average window.
pub const WINDOW_SIZE: usize = 10;

/// Smallest range overlap accepted by [`BurnInStrategy::RangeOverlap`].
pub const MIN_OVERLAP: f64 = 0.75;

/// Burn-in of one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnIn {
    /// First sample after the burn-in.
    pub index: usize,
    /// False when the strategy fell back because no stationary point exists.
    pub stationary: bool,
}

impl BurnIn {
    const fn stationary(index: usize) -> Self {
        Self {
            index,
            stationary: true,
        }
    }

    const fn fallback(index: usize) -> Self {
        Self {
            index,
            stationary: false,
        }
    }
}

/// Per-chain burn-in tracking for one strategy run.
#[derive(Debug, Clone)]
pub struct BurnInEstimator {
    strategy: BurnInStrategy,
    /// Largest stationary estimate per chain.
    floors: Vec<usize>,
    /// Last burn-in handed out per chain.
    reported: Vec<usize>,
}

impl BurnInEstimator {
    /// Estimator for `chain_count` chains with nothing reported yet.
    pub fn new(strategy: BurnInStrategy, chain_count: usize) -> Self {
        Self {
            strategy,
            floors: vec![0; chain_count],
            reported: vec![0; chain_count],
        }
    }

    /// Strategy in use.
    pub fn strategy(&self) -> BurnInStrategy {
        self.strategy
    }

    /// Switch strategy. Floors and reported burn-ins of the previous
    /// strategy are discarded.
    pub fn set_strategy(&mut self, strategy: BurnInStrategy) {
        self.strategy = strategy;
        self.floors.iter_mut().for_each(|floor| *floor = 0);
        self.reported.iter_mut().for_each(|reported| *reported = 0);
    }

    /// Burn-in of chain `chain` at `end`: the largest estimate over
    /// `columns`, never below the chain's stationary floor nor below what
    /// was reported for it earlier.
    pub fn chain_burnin(&mut self, chain: usize, columns: &[&[f64]], end: usize) -> usize {
        let estimate = match self.strategy {
            BurnInStrategy::FixedFraction { percent } => fixed_fraction(end, percent),
            _ => columns
                .iter()
                .map(|trace| self.estimate(trace, end))
                .fold(BurnIn::stationary(0), |acc, burnin| BurnIn {
                    index: acc.index.max(burnin.index),
                    stationary: acc.stationary && burnin.stationary,
                }),
        };
        let (Some(floor), Some(reported)) = (self.floors.get_mut(chain), self.reported.get_mut(chain))
        else {
            return estimate.index;
        };
        if estimate.stationary {
            *floor = (*floor).max(estimate.index);
        }
        *reported = (*reported).max((*floor).max(estimate.index));
        *reported
    }

    /// Burn-in of a single trace over `[0, end)` with the current strategy.
    pub fn estimate(&self, trace: &[f64], end: usize) -> BurnIn {
        let end = end.min(trace.len());
        let trace = &trace[..end];
        match self.strategy {
            BurnInStrategy::MovingAverage => moving_average(trace),
            BurnInStrategy::RangeOverlap { refine } => range_overlap(trace, refine),
            BurnInStrategy::FixedFraction { percent } => fixed_fraction(end, percent),
        }
    }
}

fn fixed_fraction(end: usize, percent: u32) -> BurnIn {
    BurnIn::stationary(end * percent as usize / 100)
}

/// First window of [`WINDOW_SIZE`] samples whose average lies strictly
/// within one standard deviation of the mean of the last quarter.
fn moving_average(trace: &[f64]) -> BurnIn {
    let end = trace.len();
    let lb = 3 * end / 4;
    let tail = &trace[lb..];
    if tail.len() < 2 {
        return BurnIn::fallback(lb);
    }
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    let variance = tail.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (tail.len() - 1) as f64;
    let stdev = variance.sqrt();
    // a flat tail only accepts windows sitting on its value
    let band = if stdev > 0.0 {
        stdev
    } else {
        f64::EPSILON * mean.abs().max(1.0)
    };

    for i in 0..lb.saturating_sub(WINDOW_SIZE) {
        let average = trace[i..i + WINDOW_SIZE].iter().sum::<f64>() / WINDOW_SIZE as f64;
        if (average - mean).abs() < band {
            return BurnIn::stationary(i + WINDOW_SIZE);
        }
    }
    BurnIn::fallback(lb)
}

/// First start `b` in `[0, end/2)` whose early and late halves of `[b, end)`
/// cover overlapping value ranges.
fn range_overlap(trace: &[f64], refine: bool) -> BurnIn {
    let end = trace.len();
    let extrema = SparseTable::new(trace);
    let limit = end / 2;

    let Some(candidate) = (0..limit).find(|&b| {
        let mid = b + (end - b) / 2;
        let early = extrema.range(b, mid);
        let late = extrema.range(mid, end);
        overlap(early, late).min(overlap(late, early)) >= MIN_OVERLAP
    }) else {
        return BurnIn::fallback(end.saturating_sub(1));
    };

    if !refine {
        return BurnIn::stationary(candidate);
    }
    let step = (limit - candidate) / 10;
    if step == 0 {
        return BurnIn::stationary(candidate);
    }
    let alternative = candidate + step;
    let current = autocorrelation::ess(&trace[candidate..]);
    let refined = autocorrelation::ess(&trace[alternative..]);
    match (current, refined) {
        (Some(current), Some(refined)) if refined > current => BurnIn::stationary(alternative),
        _ => BurnIn::stationary(candidate),
    }
}

/// Fraction of range `x` covered by range `y`.
fn overlap(x: (f64, f64), y: (f64, f64)) -> f64 {
    let (x_min, x_max) = x;
    let (y_min, y_max) = y;
    let width = x_max - x_min;
    if width <= 0.0 {
        return if y_min <= x_min && x_min <= y_max {
            1.0
        } else {
            0.0
        };
    }
    ((x_max.min(y_max) - x_min.max(y_min)) / width).max(0.0)
}

/// Range minimum and maximum queries in `O(1)` after `O(n log n)` setup.
struct SparseTable {
    min: Vec<Vec<f64>>,
    max: Vec<Vec<f64>>,
}

impl SparseTable {
    fn new(values: &[f64]) -> Self {
        let mut min = vec![values.to_vec()];
        let mut max = vec![values.to_vec()];
        let mut width = 1;
        while 2 * width <= values.len() {
            let level = min.len() - 1;
            let count = values.len() - 2 * width + 1;
            let next_min = (0..count)
                .map(|i| min[level][i].min(min[level][i + width]))
                .collect();
            let next_max = (0..count)
                .map(|i| max[level][i].max(max[level][i + width]))
                .collect();
            min.push(next_min);
            max.push(next_max);
            width *= 2;
        }
        Self { min, max }
    }

    /// `(min, max)` over the non-empty range `[start, end)`.
    fn range(&self, start: usize, end: usize) -> (f64, f64) {
        let len = end - start;
        let level = (usize::BITS - 1 - len.leading_zeros()) as usize;
        let other = end - (1 << level);
        (
            self.min[level][start].min(self.min[level][other]),
            self.max[level][start].max(self.max[level][other]),
        )
    }
}
