//! Common test utilities for integration tests
//!
//! Provides recorded-run fixtures and synthetic traces shared across
//! multiple integration test files.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// `n` seeded standard normal draws shifted by `mean`.
pub fn normal_trace(seed: u64, n: usize, mean: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(mean, 1.0).expect("valid normal");
    (0..n).map(|_| normal.sample(&mut rng)).collect()
}

/// Tree topologies over four taxa that well-mixed chains visit uniformly.
pub const QUARTETS: [&str; 3] = ["((1,2),(3,4));", "((1,3),(2,4));", "((1,4),(2,3));"];

/// Write a recorded chain: a trace log with posterior, likelihood and
/// prior around `mean`, and a tree log cycling through `topologies`.
pub fn write_recording(dir: &Path, chain: usize, samples: usize, mean: f64, topologies: &[&str]) {
    let posterior = normal_trace(chain as u64 * 3 + 1, samples, mean);
    let likelihood = normal_trace(chain as u64 * 3 + 2, samples, mean);
    let prior = normal_trace(chain as u64 * 3 + 3, samples, 0.0);

    let mut trace = String::from("# recorded run\nSample\tposterior\tlikelihood\tprior\n");
    let mut trees = String::from("#NEXUS\n\nBegin trees;\n");
    for i in 0..samples {
        let state = i * 1000;
        let _ = writeln!(
            trace,
            "{state}\t{:.4}\t{:.4}\t{:.4}",
            posterior[i], likelihood[i], prior[i]
        );
        let _ = writeln!(
            trees,
            "tree STATE_{state} = [&R] {}",
            topologies[(i * 7 + chain) % topologies.len()]
        );
    }
    trees.push_str("End;\n");
    std::fs::write(dir.join(format!("chain{chain}-trace.log")), trace).expect("write trace");
    std::fs::write(dir.join(format!("chain{chain}-trees.trees")), trees).expect("write trees");
}
