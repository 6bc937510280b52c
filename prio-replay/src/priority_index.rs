//! Sum tree for prioritized sampling.
//!
//! The tree is stored as a flat array of length `2 * n_leaves`, where `n_leaves`
//! is the smallest power of two not less than the capacity. The root is at
//! position 1 and the leaf of physical slot `i` is at `n_leaves + i`. Leaves
//! beyond the capacity are padding and always hold zero.
use crate::error::{ReplayError, Result};
use rand::Rng;
use segment_tree::{ops::MinIgnoreNaN, SegmentPoint};
use serde::{Deserialize, Serialize};

/// How importance sampling weights are normalized.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Normalize by the largest weight any live record could receive,
    /// i.e., the weight of the record with the smallest positive priority.
    All,

    /// Normalize by the largest weight within the sampled batch.
    Batch,
}

/// Sum tree of non-negative priorities over physical slots.
#[derive(Debug)]
pub struct PriorityIndex {
    /// Number of physical slots.
    capacity: usize,

    /// Number of leaves, a power of two.
    n_leaves: usize,

    /// Flat tree. `tree[0]` is unused.
    tree: Vec<f64>,

    /// Smallest positive priority over slots. Zero priorities are stored as `f64::MAX`.
    min_tree: SegmentPoint<f64, MinIgnoreNaN>,

    /// Largest priority ever set.
    max_priority_seen: f64,
}

#[inline]
fn check_priority(priority: f64) -> Result<()> {
    if priority.is_finite() && priority >= 0.0 {
        Ok(())
    } else {
        Err(ReplayError::InvalidPriority(priority))
    }
}

#[inline]
fn min_tree_value(priority: f64) -> f64 {
    if priority > 0.0 {
        priority
    } else {
        f64::MAX
    }
}

impl PriorityIndex {
    /// Creates an index with all priorities set to zero.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ReplayError::InvalidCapacity);
        }
        let n_leaves = capacity.next_power_of_two();

        Ok(Self {
            capacity,
            n_leaves,
            tree: vec![0.0; 2 * n_leaves],
            min_tree: SegmentPoint::build(vec![f64::MAX; capacity], MinIgnoreNaN),
            max_priority_seen: 1.0,
        })
    }

    /// Rebuilds an index from its leaf values in slot order.
    pub(crate) fn from_leaves(leaves: Vec<f64>, max_priority_seen: f64) -> Result<Self> {
        let mut index = Self::new(leaves.len())?;
        if let Some(&p) = leaves.iter().find(|&&p| check_priority(p).is_err()) {
            return Err(ReplayError::CorruptSnapshot(format!(
                "invalid leaf priority {}",
                p
            )));
        }
        let max_leaf = leaves.iter().cloned().fold(0.0, f64::max);
        if check_priority(max_priority_seen).is_err() || max_priority_seen < max_leaf {
            return Err(ReplayError::CorruptSnapshot(format!(
                "invalid maximum priority {}",
                max_priority_seen
            )));
        }

        let n_leaves = index.n_leaves;
        index.tree[n_leaves..n_leaves + leaves.len()].copy_from_slice(&leaves);
        for ix in (1..n_leaves).rev() {
            index.tree[ix] = index.tree[2 * ix] + index.tree[2 * ix + 1];
        }
        index.min_tree = SegmentPoint::build(
            leaves.iter().map(|&p| min_tree_value(p)).collect(),
            MinIgnoreNaN,
        );
        index.max_priority_seen = max_priority_seen;

        Ok(index)
    }

    /// Sets the priority of `slot` and updates the ancestors up to the root.
    ///
    /// Each ancestor is recomputed as the sum of its children, so the tree stays
    /// exactly consistent after any number of updates.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidPriority`] if `priority` is negative, NaN or
    /// infinite. The index is not modified in that case.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than the capacity.
    pub fn set(&mut self, slot: usize, priority: f64) -> Result<()> {
        check_priority(priority)?;
        self.write(slot, priority);
        Ok(())
    }

    /// Sets an already validated priority.
    pub(crate) fn write(&mut self, slot: usize, priority: f64) {
        assert!(
            slot < self.capacity,
            "slot {} out of range for capacity {}",
            slot,
            self.capacity
        );

        let mut ix = slot + self.n_leaves;
        self.tree[ix] = priority;
        while ix > 1 {
            ix /= 2;
            self.tree[ix] = self.tree[2 * ix] + self.tree[2 * ix + 1];
        }
        self.min_tree.modify(slot, min_tree_value(priority));
        self.max_priority_seen = self.max_priority_seen.max(priority);
    }

    /// Priority assigned to freshly added records.
    pub fn default_priority(&self) -> f64 {
        self.max_priority_seen
    }

    /// Sum of all priorities.
    pub fn total(&self) -> f64 {
        self.tree[1]
    }

    /// Priority of `slot`.
    pub fn get(&self, slot: usize) -> f64 {
        self.tree[slot + self.n_leaves]
    }

    /// Smallest positive priority, or `None` if all priorities are zero.
    pub fn min_positive(&self) -> Option<f64> {
        let p = self.min_tree.query(0, self.min_tree.len());
        if p < f64::MAX {
            Some(p)
        } else {
            None
        }
    }

    /// Leaf values in slot order.
    pub fn leaves(&self) -> &[f64] {
        &self.tree[self.n_leaves..self.n_leaves + self.capacity]
    }

    /// Number of physical slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the slot whose cumulative priority interval contains `cumulative_value`.
    ///
    /// `cumulative_value` is expected in `[0, total())`. Values outside the range
    /// resolve to the first or last slot with positive priority, so a slot with
    /// zero priority is never returned.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::EmptyIndex`] if the total priority is zero.
    pub fn sample_one(&self, cumulative_value: f64) -> Result<usize> {
        if self.total() <= 0.0 {
            return Err(ReplayError::EmptyIndex);
        }

        let mut ix = 1;
        let mut s = cumulative_value;
        while ix < self.n_leaves {
            let left = 2 * ix;
            let p_left = self.tree[left];
            let p_right = self.tree[left + 1];

            if (s < p_left && p_left > 0.0) || p_right == 0.0 {
                ix = left;
            } else {
                s -= p_left;
                ix = left + 1;
            }
        }

        Ok(ix - self.n_leaves)
    }

    /// Draws `n` slots with stratified sampling.
    ///
    /// `[0, total())` is split into `n` segments of equal width and one value is
    /// drawn uniformly from each. Returns `(slot, priority, probability)` per
    /// draw, where `probability = priority / total()`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidBatchSize`] if `n` is zero and
    /// [`ReplayError::EmptyIndex`] if the total priority is zero.
    pub fn sample_batch<G: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut G,
    ) -> Result<Vec<(usize, f64, f64)>> {
        if n == 0 {
            return Err(ReplayError::InvalidBatchSize);
        }
        let total = self.total();
        if total <= 0.0 {
            return Err(ReplayError::EmptyIndex);
        }

        let segment = total / n as f64;
        (0..n)
            .map(|i| {
                let u: f64 = rng.gen();
                let slot = self.sample_one(segment * (i as f64 + u))?;
                let p = self.get(slot);
                Ok((slot, p, p / total))
            })
            .collect()
    }
}
