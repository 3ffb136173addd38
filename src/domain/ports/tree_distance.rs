//! Ports over tree values: clade views and pairwise distances.

use crate::domain::models::tree::{Clade, PhyloTree};

/// Port exposing the clade structure of a tree value
///
/// Criteria that count clades (such as the clade frequency difference) only
/// need this view; everything else treats trees as opaque values.
pub trait Topology: Send + Sync {
    /// Clade signatures of every internal node, root included
    fn clades(&self) -> Vec<Clade>;
}

impl Topology for PhyloTree {
    fn clades(&self) -> Vec<Clade> {
        PhyloTree::clades(self)
    }
}

/// Port for the tree distance metric following hexagonal architecture
///
/// Implementations must be deterministic, symmetric and non-negative. The
/// session caches every value it requests, so a metric is called at most
/// once per pair of trees.
///
/// # Examples
///
/// ```
/// use autostop::domain::ports::TreeDistance;
///
/// let metric = |a: &u32, b: &u32| f64::from(a.abs_diff(*b));
/// assert_eq!(metric.distance(&3, &7), 4.0);
/// ```
pub trait TreeDistance<T>: Send + Sync {
    /// Distance between two trees
    ///
    /// # Arguments
    ///
    /// * `a` - First tree
    /// * `b` - Second tree
    ///
    /// # Returns
    ///
    /// * `f64` - Non-negative distance, zero for identical topologies
    fn distance(&self, a: &T, b: &T) -> f64;
}

impl<T, F> TreeDistance<T> for F
where
    F: Fn(&T, &T) -> f64 + Send + Sync,
{
    fn distance(&self, a: &T, b: &T) -> f64 {
        self(a, b)
    }
}
