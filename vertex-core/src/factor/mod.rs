//! LU factorization of the basis matrix.
//!
//! INVERT builds sparse triangular factors of the current basis with a
//! Markowitz pivot search under a relative stability threshold. Both
//! factors are kept in pivot-ordered column and row form so FTRAN and
//! BTRAN are saxpy sweeps that skip zero pivots and append fill-in to
//! the working vector's index list.
//!
//! After a successful INVERT the basis order is realigned to the pivot
//! sequence, so solve results are indexed by row (= basis position)
//! directly.

pub mod update;

pub use update::ProductFormUpdate;

use thiserror::Error;

use crate::sparse::{SimplexMatrix, WorkVector};
use crate::util::numerics::TINY_VALUE;

/// Pivots with magnitude below this are never accepted.
const MIN_ABS_PIVOT: f64 = 1e-11;

/// Factorization errors.
#[derive(Error, Debug)]
pub enum FactorError {
    /// No acceptable pivot exists for the listed basis positions. The
    /// caller must pick a fallback basic set for them and re-invert.
    #[error("basis is singular: {} position(s) unpivoted", positions.len())]
    Singular {
        /// Basis positions left without a pivot.
        positions: Vec<usize>,
        /// Rows left without a pivot.
        rows: Vec<usize>,
    },

    /// Accumulated numerical growth exceeds the trust bound; the caller
    /// should refactorize and retry.
    #[error("factorization update is numerically unstable")]
    Unstable,
}

/// Statistics from one INVERT.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvertStats {
    /// Nonzeros in L (below-diagonal) plus U (above-diagonal).
    pub fill: usize,
    /// Smallest pivot magnitude accepted.
    pub min_pivot: f64,
    /// Largest pivot magnitude accepted.
    pub max_pivot: f64,
}

/// LU factors of a square basis matrix.
#[derive(Debug, Clone, Default)]
pub struct Factor {
    num_row: usize,
    pivot_threshold: f64,

    /// Pivot row of each elimination step.
    pivot_row: Vec<usize>,
    /// Pivot values by step.
    u_pivot_value: Vec<f64>,

    // L column-wise by step: multipliers (row, value).
    l_start: Vec<usize>,
    l_index: Vec<usize>,
    l_value: Vec<f64>,

    // L row-wise by row: (pivot row of owning step, value).
    lr_start: Vec<usize>,
    lr_index: Vec<usize>,
    lr_value: Vec<f64>,

    // U column-wise by step: above-pivot entries (pivot row of owning
    // step, value).
    u_start: Vec<usize>,
    u_index: Vec<usize>,
    u_value: Vec<f64>,

    // U row-wise by step: pivot-row entries in later columns
    // (pivot row of target step, value).
    ur_start: Vec<usize>,
    ur_index: Vec<usize>,
    ur_value: Vec<f64>,
}

impl Factor {
    /// Create an empty factorization for an m-row basis.
    pub fn new(num_row: usize, pivot_threshold: f64) -> Self {
        Self {
            num_row,
            pivot_threshold,
            ..Default::default()
        }
    }

    /// Basis dimension.
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Change the relative pivot threshold for subsequent INVERTs.
    pub fn set_pivot_threshold(&mut self, threshold: f64) {
        self.pivot_threshold = threshold.clamp(1e-4, 0.5);
    }

    /// Factorize the basis selected by `basic_index` against the column
    /// source: structural variables draw their column from `matrix`,
    /// logical variable `num_col + i` is the unit column of row `i`.
    ///
    /// On success `basic_index` is permuted into pivot order so that
    /// solve results are row-indexed. On singularity the unpivoted
    /// positions and rows are reported and `basic_index` is untouched.
    pub fn invert(
        &mut self,
        matrix: &SimplexMatrix,
        basic_index: &mut [usize],
        num_col: usize,
    ) -> Result<InvertStats, FactorError> {
        let m = self.num_row;
        debug_assert_eq!(basic_index.len(), m);

        // Active submatrix, column-major, exact row counts, and a lazily
        // maintained row-to-columns adjacency.
        let mut cols: Vec<Vec<(usize, f64)>> = Vec::with_capacity(m);
        let mut row_count = vec![0usize; m];
        let mut row_cols: Vec<Vec<usize>> = vec![Vec::new(); m];
        for (pos, &var) in basic_index.iter().enumerate() {
            let mut entries = Vec::new();
            if var < num_col {
                let (rows, values) = matrix.column(var);
                for (&i, &v) in rows.iter().zip(values) {
                    entries.push((i, v));
                }
            } else {
                entries.push((var - num_col, 1.0));
            }
            for &(i, _) in &entries {
                row_count[i] += 1;
                row_cols[i].push(pos);
            }
            cols.push(entries);
        }

        let mut col_active = vec![true; m];
        let mut row_active = vec![true; m];

        // Per-step records. U rows are collected with position ids and
        // translated to row slots once the pivot order is complete.
        let mut pivot_row = Vec::with_capacity(m);
        let mut pivot_pos = Vec::with_capacity(m);
        let mut u_pivot_value = Vec::with_capacity(m);
        let mut l_cols: Vec<Vec<(usize, f64)>> = Vec::with_capacity(m);
        let mut u_rows_pos: Vec<Vec<(usize, f64)>> = Vec::with_capacity(m);

        // Scatter workspace for column updates.
        let mut work = vec![0.0f64; m];
        let mut stamp = vec![usize::MAX; m];

        let mut min_pivot = f64::INFINITY;
        let mut max_pivot = 0.0f64;

        for _step in 0..m {
            // Markowitz search: lowest (rc-1)*(cc-1) merit among entries
            // passing the relative threshold, ties by larger magnitude.
            let mut best: Option<(usize, usize, f64, usize)> = None; // (p, q, value, merit)
            for q in 0..m {
                if !col_active[q] {
                    continue;
                }
                let col = &cols[q];
                let col_max = col.iter().fold(0.0f64, |acc, &(_, v)| acc.max(v.abs()));
                if col_max < MIN_ABS_PIVOT {
                    continue;
                }
                let cc = col.len();
                for &(i, v) in col {
                    if v.abs() < self.pivot_threshold * col_max || v.abs() < MIN_ABS_PIVOT {
                        continue;
                    }
                    let merit = (row_count[i] - 1) * (cc - 1);
                    let better = match best {
                        None => true,
                        Some((_, _, bv, bm)) => {
                            merit < bm || (merit == bm && v.abs() > bv.abs())
                        }
                    };
                    if better {
                        best = Some((i, q, v, merit));
                    }
                }
                if let Some((_, _, _, 0)) = best {
                    break;
                }
            }

            let (p, q, pivot_value, _) = match best {
                Some(found) => found,
                None => {
                    let positions: Vec<usize> =
                        (0..m).filter(|&j| col_active[j]).collect();
                    let rows: Vec<usize> = (0..m).filter(|&i| row_active[i]).collect();
                    return Err(FactorError::Singular { positions, rows });
                }
            };

            min_pivot = min_pivot.min(pivot_value.abs());
            max_pivot = max_pivot.max(pivot_value.abs());

            // L multipliers from the pivot column.
            let mut l_col = Vec::new();
            for &(i, v) in &cols[q] {
                if i != p {
                    l_col.push((i, v / pivot_value));
                    row_count[i] -= 1;
                }
            }

            // U row: remove the pivot row's entries from the other
            // active columns.
            let mut u_row = Vec::new();
            let adjacency = std::mem::take(&mut row_cols[p]);
            for j in adjacency {
                if j == q || !col_active[j] {
                    continue;
                }
                if let Some(at) = cols[j].iter().position(|&(i, _)| i == p) {
                    let (_, v) = cols[j].swap_remove(at);
                    u_row.push((j, v));
                }
            }

            col_active[q] = false;
            row_active[p] = false;
            cols[q].clear();

            // Rank-one update of the remaining submatrix, one affected
            // column at a time through the scatter workspace.
            for &(j, pivot_row_value) in &u_row {
                for entry in &cols[j] {
                    work[entry.0] = entry.1;
                    stamp[entry.0] = j;
                }
                for &(i, multiplier) in &l_col {
                    let delta = multiplier * pivot_row_value;
                    if stamp[i] == j {
                        work[i] -= delta;
                    } else {
                        stamp[i] = j;
                        work[i] = -delta;
                        row_count[i] += 1;
                        row_cols[i].push(j);
                        cols[j].push((i, 0.0));
                    }
                }
                let mut kept = 0;
                for at in 0..cols[j].len() {
                    let i = cols[j][at].0;
                    let v = work[i];
                    if v.abs() > TINY_VALUE {
                        cols[j][kept] = (i, v);
                        kept += 1;
                    } else {
                        row_count[i] -= 1;
                    }
                    stamp[i] = usize::MAX;
                }
                cols[j].truncate(kept);
            }

            pivot_row.push(p);
            pivot_pos.push(q);
            u_pivot_value.push(pivot_value);
            l_cols.push(l_col);
            u_rows_pos.push(u_row);
        }

        // Realign the basis order to the pivot sequence: the variable
        // factored at position q_k now owns position p_k.
        let old_basic: Vec<usize> = basic_index.to_vec();
        let mut step_of_pos = vec![0usize; m];
        for (step, &q) in pivot_pos.iter().enumerate() {
            basic_index[pivot_row[step]] = old_basic[q];
            step_of_pos[q] = step;
        }

        self.store_factors(pivot_row, u_pivot_value, l_cols, u_rows_pos, &step_of_pos);

        let fill = self.l_index.len() + self.u_index.len();
        Ok(InvertStats {
            fill,
            min_pivot,
            max_pivot,
        })
    }

    /// Flatten the per-step factor records into solve-ready arrays,
    /// translating U's position ids into row slots and building the
    /// row-wise orientations.
    fn store_factors(
        &mut self,
        pivot_row: Vec<usize>,
        u_pivot_value: Vec<f64>,
        l_cols: Vec<Vec<(usize, f64)>>,
        u_rows_pos: Vec<Vec<(usize, f64)>>,
        step_of_pos: &[usize],
    ) {
        let m = self.num_row;

        // L column-wise.
        self.l_start = Vec::with_capacity(m + 1);
        self.l_index.clear();
        self.l_value.clear();
        self.l_start.push(0);
        for col in &l_cols {
            for &(i, v) in col {
                self.l_index.push(i);
                self.l_value.push(v);
            }
            self.l_start.push(self.l_index.len());
        }

        // L row-wise: entry (i, v) of column k lands in row i with
        // target slot pivot_row[k].
        let mut counts = vec![0usize; m];
        for col in &l_cols {
            for &(i, _) in col {
                counts[i] += 1;
            }
        }
        self.lr_start = Vec::with_capacity(m + 1);
        self.lr_start.push(0);
        for i in 0..m {
            self.lr_start.push(self.lr_start[i] + counts[i]);
        }
        let total: usize = self.lr_start[m];
        self.lr_index = vec![0; total];
        self.lr_value = vec![0.0; total];
        let mut fill = self.lr_start.clone();
        for (k, col) in l_cols.iter().enumerate() {
            for &(i, v) in col {
                self.lr_index[fill[i]] = pivot_row[k];
                self.lr_value[fill[i]] = v;
                fill[i] += 1;
            }
        }

        // U row-wise by step, positions translated to row slots.
        self.ur_start = Vec::with_capacity(m + 1);
        self.ur_index.clear();
        self.ur_value.clear();
        self.ur_start.push(0);
        for row in &u_rows_pos {
            for &(pos, v) in row {
                self.ur_index.push(pivot_row[step_of_pos[pos]]);
                self.ur_value.push(v);
            }
            self.ur_start.push(self.ur_index.len());
        }

        // U column-wise by step: entry of row k at position pos belongs
        // to column step_of_pos[pos], with slot pivot_row[k].
        let mut u_counts = vec![0usize; m];
        for row in &u_rows_pos {
            for &(pos, _) in row {
                u_counts[step_of_pos[pos]] += 1;
            }
        }
        self.u_start = Vec::with_capacity(m + 1);
        self.u_start.push(0);
        for k in 0..m {
            self.u_start.push(self.u_start[k] + u_counts[k]);
        }
        let total: usize = self.u_start[m];
        self.u_index = vec![0; total];
        self.u_value = vec![0.0; total];
        let mut fill = self.u_start.clone();
        for (k, row) in u_rows_pos.iter().enumerate() {
            for &(pos, v) in row {
                let col = step_of_pos[pos];
                self.u_index[fill[col]] = pivot_row[k];
                self.u_value[fill[col]] = v;
                fill[col] += 1;
            }
        }

        self.pivot_row = pivot_row;
        self.u_pivot_value = u_pivot_value;
    }

    /// FTRAN: solve `B x = r` in place.
    pub fn ftran(&self, rhs: &mut WorkVector) {
        debug_assert_eq!(rhs.dim(), self.num_row);
        let m = self.pivot_row.len();

        // L sweep in pivot order.
        for k in 0..m {
            let p = self.pivot_row[k];
            let xp = rhs.array[p];
            if xp == 0.0 {
                continue;
            }
            for at in self.l_start[k]..self.l_start[k + 1] {
                let i = self.l_index[at];
                if rhs.array[i] == 0.0 {
                    rhs.index.push(i);
                }
                rhs.array[i] -= xp * self.l_value[at];
            }
        }

        // U sweep in reverse pivot order.
        for k in (0..m).rev() {
            let p = self.pivot_row[k];
            let xp = rhs.array[p];
            if xp == 0.0 {
                continue;
            }
            let xp = xp / self.u_pivot_value[k];
            rhs.array[p] = xp;
            for at in self.u_start[k]..self.u_start[k + 1] {
                let i = self.u_index[at];
                if rhs.array[i] == 0.0 {
                    rhs.index.push(i);
                }
                rhs.array[i] -= xp * self.u_value[at];
            }
        }

        rhs.compact();
    }

    /// BTRAN: solve `B^T y = c` in place.
    pub fn btran(&self, rhs: &mut WorkVector) {
        debug_assert_eq!(rhs.dim(), self.num_row);
        let m = self.pivot_row.len();

        // U^T sweep in pivot order.
        for k in 0..m {
            let p = self.pivot_row[k];
            let xp = rhs.array[p];
            if xp == 0.0 {
                continue;
            }
            let xp = xp / self.u_pivot_value[k];
            rhs.array[p] = xp;
            for at in self.ur_start[k]..self.ur_start[k + 1] {
                let i = self.ur_index[at];
                if rhs.array[i] == 0.0 {
                    rhs.index.push(i);
                }
                rhs.array[i] -= xp * self.ur_value[at];
            }
        }

        // L^T sweep in reverse pivot order.
        for k in (0..m).rev() {
            let p = self.pivot_row[k];
            let xp = rhs.array[p];
            if xp == 0.0 {
                continue;
            }
            for at in self.lr_start[p]..self.lr_start[p + 1] {
                let i = self.lr_index[at];
                if rhs.array[i] == 0.0 {
                    rhs.index.push(i);
                }
                rhs.array[i] -= xp * self.lr_value[at];
            }
        }

        rhs.compact();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn matrix_2x2() -> SimplexMatrix {
        // A = [[2, 1],
        //      [4, 1]]
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 2.0);
        tri.add_triplet(1, 0, 4.0);
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 1, 1.0);
        SimplexMatrix::from_csc(&tri.to_csc(), None, None)
    }

    fn dense_column(matrix: &SimplexMatrix, var: usize, num_col: usize, m: usize) -> Vec<f64> {
        let mut col = vec![0.0; m];
        if var < num_col {
            let (rows, values) = matrix.column(var);
            for (&i, &v) in rows.iter().zip(values) {
                col[i] = v;
            }
        } else {
            col[var - num_col] = 1.0;
        }
        col
    }

    fn check_solves(matrix: &SimplexMatrix, basic: &[usize], num_col: usize) {
        let m = basic.len();
        let mut factor = Factor::new(m, 0.1);
        let mut basic_index = basic.to_vec();
        factor
            .invert(matrix, &mut basic_index, num_col)
            .expect("nonsingular");

        // B columns in the realigned order.
        let cols: Vec<Vec<f64>> = basic_index
            .iter()
            .map(|&var| dense_column(matrix, var, num_col, m))
            .collect();

        // FTRAN residual against a fixed rhs.
        let mut rhs = WorkVector::new(m);
        for i in 0..m {
            rhs.add(i, (i + 1) as f64);
        }
        let r0: Vec<f64> = rhs.array.clone();
        factor.ftran(&mut rhs);
        for i in 0..m {
            let mut bx = 0.0;
            for (j, col) in cols.iter().enumerate() {
                bx += col[i] * rhs.array[j];
            }
            assert!((bx - r0[i]).abs() < 1e-9, "ftran residual at row {i}");
        }

        // BTRAN residual.
        let mut rhs = WorkVector::new(m);
        rhs.add(0, 1.0);
        if m > 1 {
            rhs.add(m - 1, -2.0);
        }
        let c0: Vec<f64> = rhs.array.clone();
        factor.btran(&mut rhs);
        for (j, col) in cols.iter().enumerate() {
            let mut bty = 0.0;
            for i in 0..m {
                bty += col[i] * rhs.array[i];
            }
            assert!((bty - c0[j]).abs() < 1e-9, "btran residual at col {j}");
        }
    }

    #[test]
    fn invert_and_solve_structural_basis() {
        let matrix = matrix_2x2();
        check_solves(&matrix, &[0, 1], 2);
    }

    #[test]
    fn invert_and_solve_mixed_basis() {
        let matrix = matrix_2x2();
        // Structural column 0 and the logical of row 0.
        check_solves(&matrix, &[0, 2], 2);
        check_solves(&matrix, &[3, 1], 2);
    }

    #[test]
    fn invert_larger_basis() {
        // 4x4 with some coupling and an identity block.
        let mut tri = TriMat::new((4, 4));
        tri.add_triplet(0, 0, 3.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 1, 2.0);
        tri.add_triplet(2, 1, -1.0);
        tri.add_triplet(2, 2, 4.0);
        tri.add_triplet(3, 2, 1.0);
        tri.add_triplet(0, 3, 1.0);
        tri.add_triplet(3, 3, 5.0);
        let matrix = SimplexMatrix::from_csc(&tri.to_csc(), None, None);
        check_solves(&matrix, &[0, 1, 2, 3], 4);
        check_solves(&matrix, &[0, 5, 2, 7], 4);
    }

    #[test]
    fn singular_basis_reports_positions() {
        // Two copies of the same column are linearly dependent.
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(1, 0, 2.0);
        tri.add_triplet(0, 1, 2.0);
        tri.add_triplet(1, 1, 4.0);
        let matrix = SimplexMatrix::from_csc(&tri.to_csc(), None, None);
        let mut factor = Factor::new(2, 0.1);
        let mut basic_index = vec![0, 1];
        let err = factor.invert(&matrix, &mut basic_index, 2).unwrap_err();
        match err {
            FactorError::Singular { positions, rows } => {
                assert_eq!(positions.len(), 1);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected singular, got {other:?}"),
        }
        // Untouched on failure.
        assert_eq!(basic_index, vec![0, 1]);
    }

    #[test]
    fn ftran_keeps_index_invariant() {
        let matrix = matrix_2x2();
        let mut factor = Factor::new(2, 0.1);
        let mut basic_index = vec![0, 1];
        factor.invert(&matrix, &mut basic_index, 2).unwrap();
        let mut rhs = WorkVector::new(2);
        rhs.add(0, 1.0);
        factor.ftran(&mut rhs);
        assert!(rhs.check_invariant());
    }
}
