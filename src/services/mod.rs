//! Convergence diagnostics services.
//!
//! Leaf components (distance cache, autocorrelation, burn-in) feed the
//! stopping criteria, which the session evaluates once per watermark.

/// Autocorrelation time and ESS
pub mod autocorrelation;
/// Burn-in estimation
pub mod burn_in;
/// Stopping criteria
pub mod criteria;
/// Pairwise tree distance cache
pub mod distance_cache;
/// Robinson-Foulds tree distance
pub mod robinson_foulds;
/// Convergence session
pub mod session;

pub use burn_in::{BurnIn, BurnInEstimator};
pub use criteria::{ConvergenceCheck, ConvergenceCriterion, EvaluationContext};
pub use distance_cache::{DistanceCache, TreeSet};
pub use robinson_foulds::RobinsonFoulds;
pub use session::ConvergenceSession;
