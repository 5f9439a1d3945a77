//! Numerical linear algebra façade.
//!
//! The only path by which the simplex touches linear algebra: wraps the
//! LU factorization with the product-form update list, optional basis
//! scaling factors, frozen-basis snapshots and residual checks.

pub mod frozen;

pub use frozen::{FrozenBasis, FrozenBasisArena};

use rand::Rng;

use crate::basis::SimplexBasis;
use crate::factor::{Factor, FactorError, InvertStats, ProductFormUpdate};
use crate::sparse::{SimplexMatrix, WorkVector};

/// Default bound on live frozen snapshots.
pub const DEFAULT_FROZEN_CAPACITY: usize = 64;

/// Façade over factorization, updates, scaling and snapshots.
#[derive(Debug)]
pub struct SimplexNla {
    factor: Factor,
    update: ProductFormUpdate,
    frozen: FrozenBasisArena,

    /// Column scale factors applied to the structural matrix, if any.
    col_scale: Option<Vec<f64>>,
    /// Row scale factors applied to the structural matrix, if any.
    row_scale: Option<Vec<f64>>,

    refactor_limit: usize,

    /// Incremented per INVERT; 0 means no factorization exists yet.
    /// Snapshots record it so unfreeze knows whether their eta list
    /// still extends the live factorization.
    factor_generation: u64,
}

impl SimplexNla {
    /// Set up for an m-row basis.
    pub fn new(num_row: usize, pivot_threshold: f64, refactor_limit: usize) -> Self {
        Self {
            factor: Factor::new(num_row, pivot_threshold),
            update: ProductFormUpdate::new(num_row),
            frozen: FrozenBasisArena::new(DEFAULT_FROZEN_CAPACITY),
            col_scale: None,
            row_scale: None,
            refactor_limit,
            factor_generation: 0,
        }
    }

    /// Install the scale factors the matrix was built with, for
    /// reporting and solution unscaling.
    pub fn set_scale(&mut self, col_scale: Option<Vec<f64>>, row_scale: Option<Vec<f64>>) {
        self.col_scale = col_scale;
        self.row_scale = row_scale;
    }

    /// Column scale factors, if scaling is active.
    pub fn col_scale(&self) -> Option<&[f64]> {
        self.col_scale.as_deref()
    }

    /// Row scale factors, if scaling is active.
    pub fn row_scale(&self) -> Option<&[f64]> {
        self.row_scale.as_deref()
    }

    /// Etas applied since the last INVERT.
    pub fn update_count(&self) -> usize {
        self.update.update_count()
    }

    /// True once the eta list has reached the refactorization limit.
    pub fn needs_refactor(&self) -> bool {
        self.update.update_count() >= self.refactor_limit
    }

    /// Refactorize the basis from scratch, clearing the eta list.
    ///
    /// On success `basic_index` is permuted into pivot order.
    pub fn invert(
        &mut self,
        matrix: &SimplexMatrix,
        basic_index: &mut [usize],
        num_col: usize,
    ) -> Result<InvertStats, FactorError> {
        let stats = self.factor.invert(matrix, basic_index, num_col)?;
        self.update.clear();
        self.factor_generation += 1;
        log::trace!(
            "invert: fill {} pivot range [{:.3e}, {:.3e}]",
            stats.fill,
            stats.min_pivot,
            stats.max_pivot
        );
        Ok(stats)
    }

    /// FTRAN: solve `B x = r` in place.
    pub fn ftran(&self, rhs: &mut WorkVector) {
        self.factor.ftran(rhs);
        self.update.ftran(rhs);
        rhs.compact();
    }

    /// BTRAN: solve `B^T y = c` in place.
    pub fn btran(&self, rhs: &mut WorkVector) {
        self.update.btran(rhs);
        self.factor.btran(rhs);
        rhs.compact();
    }

    /// Append the product-form eta for replacing position `pivot_row`
    /// with the column whose FTRANned form is `col_aq`.
    pub fn update(&mut self, col_aq: &WorkVector, pivot_row: usize) -> Result<(), FactorError> {
        self.update.update(col_aq, pivot_row)
    }

    /// Snapshot the basis and current eta list and return its id.
    pub fn freeze(&mut self, basis: &SimplexBasis) -> u64 {
        self.frozen
            .freeze(basis.clone(), self.update.clone(), self.factor_generation)
    }

    /// Restore a snapshot into `basis`, discarding later snapshots.
    ///
    /// Returns `None` if the id is no longer live. `Some(true)` means
    /// the snapshot's eta list still extends the live factorization and
    /// has been reinstalled, so solves reflect the frozen basis without
    /// a fresh INVERT; `Some(false)` means the factorization has moved
    /// on and the caller must refactorize.
    pub fn unfreeze(&mut self, id: u64, basis: &mut SimplexBasis) -> Option<bool> {
        let snapshot = self.frozen.unfreeze(id)?;
        *basis = snapshot.basis;
        let factor_current =
            self.factor_generation > 0 && snapshot.factor_generation == self.factor_generation;
        if factor_current {
            self.update = snapshot.update;
        }
        Some(factor_current)
    }

    /// True if the snapshot id is still live.
    pub fn frozen_basis_valid(&self, id: u64) -> bool {
        self.frozen.is_valid(id)
    }

    /// Drop all snapshots.
    pub fn clear_frozen(&mut self) {
        self.frozen.clear();
    }

    /// Residual of the current factorization against a random probe:
    /// `max|B x - r| / (1 + max|r|)` for `x = ftran(r)`.
    pub fn residual_check<R: Rng>(
        &self,
        matrix: &SimplexMatrix,
        basic_index: &[usize],
        num_col: usize,
        rng: &mut R,
    ) -> f64 {
        let m = self.factor.num_row();
        let mut probe = WorkVector::new(m);
        for i in 0..m {
            probe.add(i, rng.gen_range(-1.0..1.0));
        }
        let r0 = probe.array.clone();

        self.ftran(&mut probe);

        // Accumulate B x column by column.
        let mut bx = WorkVector::new(m);
        for (pos, &var) in basic_index.iter().enumerate() {
            let x = probe.array[pos];
            if x == 0.0 {
                continue;
            }
            if var < num_col {
                matrix.collect_column(&mut bx, var, x);
            } else {
                bx.add(var - num_col, x);
            }
        }

        let rhs_norm = r0.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()));
        let mut err = 0.0f64;
        for i in 0..m {
            err = err.max((bx.array[i] - r0[i]).abs());
        }
        err / (1.0 + rhs_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sprs::TriMat;

    fn matrix_3x3() -> SimplexMatrix {
        let mut tri = TriMat::new((3, 3));
        tri.add_triplet(0, 0, 2.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 1, 3.0);
        tri.add_triplet(2, 1, 1.0);
        tri.add_triplet(0, 2, 1.0);
        tri.add_triplet(2, 2, 4.0);
        SimplexMatrix::from_csc(&tri.to_csc(), None, None)
    }

    #[test]
    fn residual_small_after_invert() {
        let matrix = matrix_3x3();
        let mut nla = SimplexNla::new(3, 0.1, 100);
        let mut basic_index = vec![0, 1, 2];
        nla.invert(&matrix, &mut basic_index, 3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let residual = nla.residual_check(&matrix, &basic_index, 3, &mut rng);
        assert!(residual < 1e-10, "residual {residual}");
    }

    #[test]
    fn residual_small_after_updates() {
        let matrix = matrix_3x3();
        let mut nla = SimplexNla::new(3, 0.1, 100);
        // Start from the logical basis and pivot column 0 into position 1.
        let mut basic_index = vec![3, 4, 5];
        nla.invert(&matrix, &mut basic_index, 3).unwrap();

        let mut col = WorkVector::new(3);
        matrix.collect_column(&mut col, 0, 1.0);
        nla.ftran(&mut col);
        nla.update(&col, 1).unwrap();
        basic_index[1] = 0;

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let residual = nla.residual_check(&matrix, &basic_index, 3, &mut rng);
        assert!(residual < 1e-10, "residual {residual}");
        assert_eq!(nla.update_count(), 1);
    }

    #[test]
    fn refactor_limit_reached() {
        let nla = SimplexNla::new(2, 0.1, 0);
        assert!(nla.needs_refactor());
    }

    #[test]
    fn freeze_restore_basis() {
        let mut nla = SimplexNla::new(2, 0.1, 100);
        let basis = SimplexBasis::logical(2, 2);
        let id = nla.freeze(&basis);
        let mut restored = SimplexBasis::logical(2, 2);
        restored.nonbasic_move[0] = -1;
        // No factorization exists yet, so the snapshot cannot claim a
        // live eta list.
        assert_eq!(nla.unfreeze(id, &mut restored), Some(false));
        assert_eq!(restored, basis);
    }

    #[test]
    fn unfreeze_restores_etas_while_factorization_lives() {
        let matrix = matrix_3x3();
        let mut nla = SimplexNla::new(3, 0.1, 100);
        let mut basis = SimplexBasis::logical(3, 3);
        nla.invert(&matrix, &mut basis.basic_index, 3).unwrap();

        // Freeze, then pivot column 0 into position 1.
        let frozen = nla.freeze(&basis);
        let mut col = WorkVector::new(3);
        matrix.collect_column(&mut col, 0, 1.0);
        nla.ftran(&mut col);
        nla.update(&col, 1).unwrap();
        assert_eq!(nla.update_count(), 1);

        // Restoring rolls the eta list back to the snapshot state.
        let mut restored = basis.clone();
        assert_eq!(nla.unfreeze(frozen, &mut restored), Some(true));
        assert_eq!(nla.update_count(), 0);

        // After a fresh INVERT the snapshot's eta list is stale.
        let stale = nla.freeze(&restored);
        nla.invert(&matrix, &mut restored.basic_index, 3).unwrap();
        let mut again = restored.clone();
        assert_eq!(nla.unfreeze(stale, &mut again), Some(false));
    }
}
