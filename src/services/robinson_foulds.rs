//! Robinson-Foulds distance over rooted clades.

use std::collections::HashSet;

use crate::domain::models::tree::Clade;
use crate::domain::ports::{Topology, TreeDistance};

/// Robinson-Foulds distance: the number of clades found in exactly one of
/// the two trees.
///
/// Rooted clades are compared, so two trees that only differ in their root
/// position have a non-zero distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct RobinsonFoulds;

impl<T: Topology> TreeDistance<T> for RobinsonFoulds {
    fn distance(&self, a: &T, b: &T) -> f64 {
        let left: HashSet<Clade> = a.clades().into_iter().collect();
        let right: HashSet<Clade> = b.clades().into_iter().collect();
        left.symmetric_difference(&right).count() as f64
    }
}
