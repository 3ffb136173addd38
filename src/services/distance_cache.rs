//! Pairwise tree distance cache.
//!
//! Stores the distance between any two trees of two ordered tree sequences
//! ("sets"). Within a set the relation is symmetric and kept in a packed
//! lower triangle. Across sets it is asymmetric, so it is split into two
//! triangles plus a diagonal for `i == j`.
//!
//! Cells hold `distance + 1`; a zero cell means "not computed yet". The
//! triangular index `max * (max - 1) / 2 + min` does not depend on the
//! capacity, so growth only appends zeroed cells.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of trees per set added on every growth.
pub const GROWTH_STEP: usize = 1024;

/// One of the two tree sequences compared by a pairwise criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeSet {
    /// Trees of chain 0
    First,
    /// Trees of chain 1
    Second,
}

impl TreeSet {
    /// Chain index the set belongs to.
    pub const fn chain(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The opposite set.
    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Same tree, distance 0.
    Identity,
    /// Lower triangle of the first set.
    WithinFirst(usize),
    /// Lower triangle of the second set.
    WithinSecond(usize),
    /// First-set tree with the larger index.
    AcrossLower(usize),
    /// Second-set tree with the larger index.
    AcrossUpper(usize),
    /// Cross-set pair with equal indices.
    Diagonal(usize),
}

/// Growable store of pairwise tree distances for two tree sets.
#[derive(Debug, Clone)]
pub struct DistanceCache {
    capacity: usize,
    within_first: Vec<f32>,
    within_second: Vec<f32>,
    across_lower: Vec<f32>,
    across_upper: Vec<f32>,
    diagonal: Vec<f32>,
}

const fn triangle(max: usize, min: usize) -> usize {
    max * (max - 1) / 2 + min
}

const fn triangle_len(capacity: usize) -> usize {
    capacity * capacity.saturating_sub(1) / 2
}

impl DistanceCache {
    /// Cache able to hold `capacity` trees per set without growing.
    pub fn new(capacity: usize) -> Self {
        let half = triangle_len(capacity);
        Self {
            capacity,
            within_first: vec![0.0; half],
            within_second: vec![0.0; half],
            across_lower: vec![0.0; half],
            across_upper: vec![0.0; half],
            diagonal: vec![0.0; capacity],
        }
    }

    /// Trees per set storable without growing.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached distance plus one, or `0.0` when absent.
    pub fn get(&self, set_a: TreeSet, i: usize, set_b: TreeSet, j: usize) -> f32 {
        if i.max(j) >= self.capacity && !(set_a == set_b && i == j) {
            return 0.0;
        }
        match Self::slot(set_a, i, set_b, j) {
            Slot::Identity => 1.0,
            Slot::WithinFirst(k) => self.within_first[k],
            Slot::WithinSecond(k) => self.within_second[k],
            Slot::AcrossLower(k) => self.across_lower[k],
            Slot::AcrossUpper(k) => self.across_upper[k],
            Slot::Diagonal(k) => self.diagonal[k],
        }
    }

    /// Store `value`, which must already carry the `+ 1` offset.
    pub fn set(&mut self, set_a: TreeSet, i: usize, set_b: TreeSet, j: usize, value: f32) {
        let slot = Self::slot(set_a, i, set_b, j);
        if slot == Slot::Identity {
            return;
        }
        if i.max(j) >= self.capacity {
            self.grow(i.max(j) + 1);
        }
        match slot {
            Slot::Identity => {}
            Slot::WithinFirst(k) => self.within_first[k] = value,
            Slot::WithinSecond(k) => self.within_second[k] = value,
            Slot::AcrossLower(k) => self.across_lower[k] = value,
            Slot::AcrossUpper(k) => self.across_upper[k] = value,
            Slot::Diagonal(k) => self.diagonal[k] = value,
        }
    }

    /// Cached distance plus one, computing and storing it on a miss.
    pub fn get_or_compute<F>(
        &mut self,
        set_a: TreeSet,
        i: usize,
        set_b: TreeSet,
        j: usize,
        compute: F,
    ) -> f32
    where
        F: FnOnce() -> f64,
    {
        let cached = self.get(set_a, i, set_b, j);
        if cached > 0.0 {
            return cached;
        }
        let value = (compute() + 1.0) as f32;
        self.set(set_a, i, set_b, j, value);
        value
    }

    fn slot(set_a: TreeSet, i: usize, set_b: TreeSet, j: usize) -> Slot {
        if set_a == set_b {
            if i == j {
                return Slot::Identity;
            }
            let k = triangle(i.max(j), i.min(j));
            return match set_a {
                TreeSet::First => Slot::WithinFirst(k),
                TreeSet::Second => Slot::WithinSecond(k),
            };
        }
        if i == j {
            return Slot::Diagonal(i);
        }
        // (First, i, Second, j) with i > j lives in the lower triangle; the
        // mirrored lookup (Second, j, First, i) must land on the same cell.
        let (row_set, row, col) = if i > j { (set_a, i, j) } else { (set_b, j, i) };
        let k = triangle(row, col);
        match row_set {
            TreeSet::First => Slot::AcrossLower(k),
            TreeSet::Second => Slot::AcrossUpper(k),
        }
    }

    fn grow(&mut self, required: usize) {
        let mut capacity = self.capacity;
        while capacity < required {
            capacity += GROWTH_STEP;
        }
        warn!(
            from = self.capacity,
            to = capacity,
            "Growing distance cache"
        );
        let half = triangle_len(capacity);
        self.within_first.resize(half, 0.0);
        self.within_second.resize(half, 0.0);
        self.across_lower.resize(half, 0.0);
        self.across_upper.resize(half, 0.0);
        self.diagonal.resize(capacity, 0.0);
        self.capacity = capacity;
    }
}

impl Default for DistanceCache {
    fn default() -> Self {
        Self::new(GROWTH_STEP)
    }
}
