//! Product-form basis updates.
//!
//! Each basis exchange appends one eta `(p, alpha_p, eta = alpha /
//! alpha_p)` where `alpha = B^-1 A_q` is the FTRANned entering column
//! and `p` the leaving position. FTRAN replays etas in order after the
//! factored solve; BTRAN replays them in reverse order before it.

use super::FactorError;
use crate::sparse::WorkVector;

/// Updates with pivot magnitude below this fail as singular.
const MIN_UPDATE_PIVOT: f64 = 1e-10;

/// Cumulative growth estimate above this reports instability.
const GROWTH_TRUST_BOUND: f64 = 1e12;

/// Bounded list of product-form etas applied on top of the factorization.
#[derive(Debug, Clone, Default)]
pub struct ProductFormUpdate {
    num_row: usize,

    pivot_index: Vec<usize>,
    pivot_value: Vec<f64>,

    start: Vec<usize>,
    index: Vec<usize>,
    value: Vec<f64>,

    /// Upper estimate of the solve amplification introduced by the etas.
    growth: f64,
}

impl ProductFormUpdate {
    /// Empty update list for an m-row basis.
    pub fn new(num_row: usize) -> Self {
        Self {
            num_row,
            pivot_index: Vec::new(),
            pivot_value: Vec::new(),
            start: vec![0],
            index: Vec::new(),
            value: Vec::new(),
            growth: 1.0,
        }
    }

    /// Number of etas held.
    pub fn update_count(&self) -> usize {
        self.pivot_value.len()
    }

    /// Discard all etas (called on refactorization).
    pub fn clear(&mut self) {
        self.pivot_index.clear();
        self.pivot_value.clear();
        self.start.clear();
        self.start.push(0);
        self.index.clear();
        self.value.clear();
        self.growth = 1.0;
    }

    /// Append the eta for replacing basis position `pivot_row` with the
    /// column whose FTRANned form is `col_aq`.
    ///
    /// Fails `Singular` (nothing appended) when the pivot element is too
    /// small, and `Unstable` (eta appended, refactorization required)
    /// when the growth estimate leaves the trust region.
    pub fn update(&mut self, col_aq: &WorkVector, pivot_row: usize) -> Result<(), FactorError> {
        debug_assert_eq!(col_aq.dim(), self.num_row);
        let pivot_value = col_aq.array[pivot_row];
        if pivot_value.abs() < MIN_UPDATE_PIVOT {
            return Err(FactorError::Singular {
                positions: vec![pivot_row],
                rows: vec![pivot_row],
            });
        }

        let mut eta_norm = 1.0f64 / pivot_value.abs();
        for &i in &col_aq.index {
            if i == pivot_row {
                continue;
            }
            let scaled = col_aq.array[i] / pivot_value;
            if scaled != 0.0 {
                self.index.push(i);
                self.value.push(scaled);
                eta_norm = eta_norm.max(scaled.abs());
            }
        }
        self.start.push(self.index.len());
        self.pivot_index.push(pivot_row);
        self.pivot_value.push(pivot_value);

        self.growth *= eta_norm.max(1.0);
        if self.growth > GROWTH_TRUST_BOUND {
            return Err(FactorError::Unstable);
        }
        Ok(())
    }

    /// Replay the etas forward on an FTRAN result.
    pub fn ftran(&self, rhs: &mut WorkVector) {
        for t in 0..self.update_count() {
            let p = self.pivot_index[t];
            let xp = rhs.array[p];
            if xp == 0.0 {
                continue;
            }
            rhs.array[p] = xp / self.pivot_value[t];
            for at in self.start[t]..self.start[t + 1] {
                let i = self.index[at];
                if rhs.array[i] == 0.0 {
                    rhs.index.push(i);
                }
                rhs.array[i] -= self.value[at] * xp;
            }
        }
    }

    /// Replay the etas in reverse on a BTRAN right-hand side.
    pub fn btran(&self, rhs: &mut WorkVector) {
        for t in (0..self.update_count()).rev() {
            let p = self.pivot_index[t];
            let mut v = rhs.array[p] / self.pivot_value[t];
            for at in self.start[t]..self.start[t + 1] {
                v -= self.value[at] * rhs.array[self.index[at]];
            }
            if rhs.array[p] == 0.0 && v != 0.0 {
                rhs.index.push(p);
            }
            rhs.array[p] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_eta_ftran_btran() {
        // B0 = I (2x2); replace position 0 with column alpha = [2, 4].
        // B_new = [[2, 0], [4, 1]].
        let mut update = ProductFormUpdate::new(2);
        let mut col = WorkVector::new(2);
        col.add(0, 2.0);
        col.add(1, 4.0);
        update.update(&col, 0).unwrap();

        // FTRAN r = [2, 3]: expect x = [1, -1].
        let mut rhs = WorkVector::new(2);
        rhs.add(0, 2.0);
        rhs.add(1, 3.0);
        update.ftran(&mut rhs);
        rhs.compact();
        assert!((rhs.array[0] - 1.0).abs() < 1e-12);
        assert!((rhs.array[1] + 1.0).abs() < 1e-12);

        // BTRAN c = [1, 1]: expect y = [-1.5, 1].
        let mut rhs = WorkVector::new(2);
        rhs.add(0, 1.0);
        rhs.add(1, 1.0);
        update.btran(&mut rhs);
        rhs.compact();
        assert!((rhs.array[0] + 1.5).abs() < 1e-12);
        assert!((rhs.array[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tiny_pivot_is_singular() {
        let mut update = ProductFormUpdate::new(2);
        let mut col = WorkVector::new(2);
        col.add(0, 1e-12);
        col.add(1, 1.0);
        let err = update.update(&col, 0).unwrap_err();
        assert!(matches!(err, FactorError::Singular { .. }));
        assert_eq!(update.update_count(), 0);
    }

    #[test]
    fn growth_trips_unstable() {
        let mut update = ProductFormUpdate::new(2);
        let mut col = WorkVector::new(2);
        col.add(0, 1e-9);
        col.add(1, 1e4);
        // eta entry 1e13 exceeds the trust bound at once.
        let err = update.update(&col, 0).unwrap_err();
        assert!(matches!(err, FactorError::Unstable));
    }

    #[test]
    fn clear_resets_count_and_growth() {
        let mut update = ProductFormUpdate::new(2);
        let mut col = WorkVector::new(2);
        col.add(0, 2.0);
        update.update(&col, 0).unwrap();
        assert_eq!(update.update_count(), 1);
        update.clear();
        assert_eq!(update.update_count(), 0);
    }
}
