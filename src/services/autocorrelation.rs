//! Integrated autocorrelation time and effective sample size.
//!
//! The accumulator keeps running lagged cross-product sums so appending a
//! sample costs `O(max_lag)`. The autocorrelation time is summed with the
//! initial positive sequence estimator: lags are taken in adjacent pairs and
//! summation stops at the first pair whose sum is not positive.

/// Largest lag included in the autocorrelation sum.
pub const MAX_LAG: usize = 2000;

/// Fewer samples than this leave the autocorrelation time undefined.
pub const MIN_SAMPLES: usize = 10;

/// Incremental autocorrelation sums of one growing trace.
#[derive(Debug, Clone)]
pub struct AutocorrelationAccumulator {
    max_lag: usize,
    /// Samples shifted by the first observation.
    values: Vec<f64>,
    /// `lagged[k] = Σ_t x_t · x_{t+k}`
    lagged: Vec<f64>,
    sum: f64,
    shift: f64,
}

impl Default for AutocorrelationAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl AutocorrelationAccumulator {
    /// Accumulator up to [`MAX_LAG`].
    pub fn new() -> Self {
        Self::with_max_lag(MAX_LAG)
    }

    /// Accumulator summing lags up to `max_lag`, at least 1.
    pub fn with_max_lag(max_lag: usize) -> Self {
        Self {
            max_lag: max_lag.max(1),
            values: Vec::new(),
            lagged: Vec::new(),
            sum: 0.0,
            shift: 0.0,
        }
    }

    /// Samples pushed.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True before the first push.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a sample, updating every lag up to the maximum.
    pub fn push(&mut self, value: f64) {
        if self.values.is_empty() {
            self.shift = value;
        }
        let x = value - self.shift;
        self.values.push(x);
        self.sum += x;

        let n = self.values.len();
        let lags = n.min(self.max_lag);
        if self.lagged.len() < lags {
            self.lagged.resize(lags, 0.0);
        }
        for (lag, lagged) in self.lagged.iter_mut().enumerate().take(lags) {
            *lagged += self.values[n - 1 - lag] * x;
        }
    }

    /// Autocovariance at every lag below `min(len, max_lag)`.
    pub fn autocovariances(&self) -> Vec<f64> {
        let n = self.values.len();
        if n == 0 {
            return Vec::new();
        }
        let mean = self.sum / n as f64;
        let lags = n.min(self.max_lag);
        let mut gammas = Vec::with_capacity(lags);
        // head = Σ_{t < n-k} x_t, tail = Σ_{t >= k} x_t
        let mut head = self.sum;
        let mut tail = self.sum;
        for lag in 0..lags {
            if lag > 0 {
                head -= self.values[n - lag];
                tail -= self.values[lag - 1];
            }
            let pairs = (n - lag) as f64;
            let gamma = (self.lagged[lag] - mean * (head + tail) + mean * mean * pairs) / pairs;
            gammas.push(gamma);
        }
        gammas
    }

    /// Integrated autocorrelation time, `None` below [`MIN_SAMPLES`].
    ///
    /// A constant sequence has autocorrelation time 1. The result is never
    /// below 1, so the effective sample size never exceeds the sample count.
    pub fn act(&self) -> Option<f64> {
        if self.values.len() < MIN_SAMPLES {
            return None;
        }
        let gammas = self.autocovariances();
        let variance = gammas[0];
        if !variance.is_finite() {
            return None;
        }
        if variance <= 0.0 {
            return Some(1.0);
        }

        let mut integral = variance;
        for lag in (2..gammas.len()).step_by(2) {
            let pair = gammas[lag - 1] + gammas[lag];
            if pair <= 0.0 {
                break;
            }
            integral += 2.0 * pair;
        }
        Some((integral / variance).max(1.0))
    }

    /// Effective sample size, `None` below [`MIN_SAMPLES`].
    pub fn ess(&self) -> Option<f64> {
        self.act().map(|act| self.values.len() as f64 / act)
    }
}

/// Autocorrelation time of a complete trace.
pub fn act(trace: &[f64]) -> Option<f64> {
    accumulate(trace).act()
}

/// Effective sample size of a complete trace.
pub fn ess(trace: &[f64]) -> Option<f64> {
    accumulate(trace).ess()
}

fn accumulate(trace: &[f64]) -> AutocorrelationAccumulator {
    let mut accumulator = AutocorrelationAccumulator::new();
    for &value in trace {
        accumulator.push(value);
    }
    accumulator
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn normal_trace(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_short_trace_has_no_act() {
        assert_eq!(act(&[1.0, 2.0, 3.0]), None);
        assert_eq!(ess(&[0.5; 9]), None);
    }

    #[test]
    fn test_constant_trace_is_independent() {
        assert_eq!(act(&[4.2; 50]), Some(1.0));
        assert_eq!(ess(&[4.2; 50]), Some(50.0));
    }

    #[test]
    fn test_iid_samples_have_near_full_ess() {
        let trace = normal_trace(42, 5000);
        let ess = ess(&trace).unwrap();
        assert!((4000.0..=5000.0).contains(&ess), "ess = {ess}");
    }

    #[test]
    fn test_correlated_trace_has_smaller_ess() {
        // AR(1) with coefficient 0.9 has act (1 + 0.9) / (1 - 0.9) = 19
        let noise = normal_trace(7, 20_000);
        let mut x = 0.0;
        let trace: Vec<f64> = noise
            .iter()
            .map(|e| {
                x = 0.9 * x + e;
                x
            })
            .collect();
        let act = act(&trace).unwrap();
        assert!((12.0..=28.0).contains(&act), "act = {act}");
    }

    #[test]
    fn test_autocovariance_matches_direct_computation() {
        let trace = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0, 5.0, 8.0, 7.0, 9.0, 8.0, 10.0];
        let mut accumulator = AutocorrelationAccumulator::new();
        for &value in &trace {
            accumulator.push(value);
        }
        let n = trace.len();
        let mean = trace.iter().sum::<f64>() / n as f64;
        for (lag, gamma) in accumulator.autocovariances().iter().enumerate().take(4) {
            let direct = (0..n - lag)
                .map(|t| (trace[t] - mean) * (trace[t + lag] - mean))
                .sum::<f64>()
                / (n - lag) as f64;
            assert!((gamma - direct).abs() < 1e-9, "lag {lag}: {gamma} vs {direct}");
        }
    }

    #[test]
    fn test_shift_invariance() {
        let trace = normal_trace(3, 500);
        let shifted: Vec<f64> = trace.iter().map(|x| x + 1.0e6).collect();
        let a = act(&trace).unwrap();
        let b = act(&shifted).unwrap();
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }
}
