//! Scatter/gather working vector.
//!
//! A dense array paired with a packed list of its structural nonzeros.
//! Contract: `array[i]` may be nonzero only if `i` appears in `index`.
//! Every FTRAN/BTRAN takes one of these as right-hand side and result.
//!
//! Saxpy sweeps may transiently list a position twice (exact
//! cancellation to zero followed by refill); `compact` deduplicates, so
//! the index list must not be iterated for results before compaction.

use crate::util::numerics::{prefer_sparse, TINY_VALUE};

/// Length-N dense array plus the packed index list of its nonzeros.
#[derive(Debug, Clone)]
pub struct WorkVector {
    /// Dense values.
    pub array: Vec<f64>,

    /// Positions of the structural nonzeros, unordered.
    pub index: Vec<usize>,

    // Generation stamps backing duplicate elimination in `compact`.
    stamp: Vec<u32>,
    generation: u32,
}

impl WorkVector {
    /// A zero vector of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            array: vec![0.0; dim],
            index: Vec::with_capacity(dim.min(64)),
            stamp: vec![0; dim],
            generation: 0,
        }
    }

    /// Dimension of the dense array.
    pub fn dim(&self) -> usize {
        self.array.len()
    }

    /// Number of listed nonzero positions.
    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Reset to zero by sweeping only the listed entries.
    pub fn clear(&mut self) {
        for &i in &self.index {
            self.array[i] = 0.0;
        }
        self.index.clear();
    }

    /// Add `value` at position `i`, appending `i` to the index list if it
    /// was structurally zero.
    #[inline]
    pub fn add(&mut self, i: usize, value: f64) {
        if self.array[i] == 0.0 {
            self.index.push(i);
        }
        self.array[i] += value;
    }

    /// Overwrite position `i`; the position must not already be listed.
    #[inline]
    pub fn set_fresh(&mut self, i: usize, value: f64) {
        debug_assert_eq!(self.array[i], 0.0);
        self.index.push(i);
        self.array[i] = value;
    }

    /// Drop entries whose magnitude fell below the tiny threshold and
    /// eliminate duplicate listings, fixing the index list in place.
    pub fn compact(&mut self) {
        if self.generation == u32::MAX {
            self.stamp.iter_mut().for_each(|s| *s = 0);
            self.generation = 0;
        }
        self.generation += 1;
        let generation = self.generation;
        let mut kept = 0;
        for pos in 0..self.index.len() {
            let i = self.index[pos];
            if self.stamp[i] == generation {
                continue;
            }
            self.stamp[i] = generation;
            if self.array[i].abs() > TINY_VALUE {
                self.index[kept] = i;
                kept += 1;
            } else {
                self.array[i] = 0.0;
            }
        }
        self.index.truncate(kept);
    }

    /// True if the packed list is worth traversing instead of the dense
    /// array.
    pub fn traverse_sparse(&self) -> bool {
        prefer_sparse(self.index.len(), self.array.len())
    }

    /// Rebuild the index list from the dense array. Used after dense
    /// sweeps that bypassed index maintenance.
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        for i in 0..self.array.len() {
            if self.array[i] != 0.0 {
                self.index.push(i);
            }
        }
    }

    /// Copy `other` into `self`, which must have the same dimension.
    pub fn copy_from(&mut self, other: &WorkVector) {
        debug_assert_eq!(self.dim(), other.dim());
        self.clear();
        for &i in &other.index {
            self.array[i] = other.array[i];
        }
        self.index.extend_from_slice(&other.index);
    }

    /// Check the index-list invariant: every nonzero is listed, and no
    /// position is listed twice.
    #[cfg(test)]
    pub fn check_invariant(&self) -> bool {
        let mut listed = vec![false; self.array.len()];
        for &i in &self.index {
            if listed[i] {
                return false;
            }
            listed[i] = true;
        }
        self.array
            .iter()
            .enumerate()
            .all(|(i, &v)| v == 0.0 || listed[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_tracks_index() {
        let mut v = WorkVector::new(5);
        v.add(2, 1.5);
        v.add(4, -1.0);
        v.add(2, 0.5);
        assert_eq!(v.count(), 2);
        assert_eq!(v.array[2], 2.0);
        assert!(v.check_invariant());
    }

    #[test]
    fn clear_zero_sweeps() {
        let mut v = WorkVector::new(4);
        v.add(0, 1.0);
        v.add(3, 2.0);
        v.clear();
        assert_eq!(v.count(), 0);
        assert!(v.array.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn compact_drops_tiny_entries() {
        let mut v = WorkVector::new(4);
        v.add(0, 1.0);
        v.add(1, 1e-16);
        v.add(2, -2.0);
        v.compact();
        assert_eq!(v.count(), 2);
        assert_eq!(v.array[1], 0.0);
        assert!(v.check_invariant());
    }

    #[test]
    fn compact_deduplicates_cancel_and_refill() {
        let mut v = WorkVector::new(4);
        // Exact cancellation leaves 1 listed at zero; the refill lists
        // it a second time.
        v.add(1, 2.0);
        v.add(1, -2.0);
        v.add(1, 0.5);
        assert_eq!(v.index, vec![1, 1]);
        v.compact();
        assert_eq!(v.index, vec![1]);
        assert_eq!(v.array[1], 0.5);
        assert!(v.check_invariant());
    }

    #[test]
    fn density_heuristic() {
        let mut v = WorkVector::new(100);
        for i in 0..5 {
            v.add(i, 1.0);
        }
        assert!(v.traverse_sparse());
        for i in 5..40 {
            v.add(i, 1.0);
        }
        assert!(!v.traverse_sparse());
    }

    #[test]
    fn rebuild_index_after_dense_writes() {
        let mut v = WorkVector::new(6);
        v.array[1] = 3.0;
        v.array[5] = -1.0;
        v.rebuild_index();
        assert_eq!(v.count(), 2);
        assert!(v.check_invariant());
    }
}
