//! Fixed column- and row-wise storage of the constraint matrix.
//!
//! Built once per solve from the caller's `sprs` CSC matrix. The
//! column-wise copy drives FTRAN right-hand sides and sparse dots; the
//! row-wise copy drives PRICE (spreading a BTRANned row across the
//! structural columns).

use sprs::CsMat;

use super::work_vector::WorkVector;

/// Column- and row-wise compressed storage of the m x n structural
/// matrix. Logical slack columns are implicit identity columns and are
/// handled by the callers.
#[derive(Debug, Clone)]
pub struct SimplexMatrix {
    num_col: usize,
    num_row: usize,

    col_start: Vec<usize>,
    col_index: Vec<usize>,
    col_value: Vec<f64>,

    row_start: Vec<usize>,
    row_index: Vec<usize>,
    row_value: Vec<f64>,
}

impl SimplexMatrix {
    /// Build both orientations from a CSC matrix, applying optional
    /// row/column scale factors as the entries are copied.
    pub fn from_csc(
        a: &CsMat<f64>,
        col_scale: Option<&[f64]>,
        row_scale: Option<&[f64]>,
    ) -> Self {
        assert!(a.is_csc(), "simplex matrix requires CSC input");
        let num_row = a.rows();
        let num_col = a.cols();
        let nnz = a.nnz();

        let mut col_start = Vec::with_capacity(num_col + 1);
        let mut col_index = Vec::with_capacity(nnz);
        let mut col_value = Vec::with_capacity(nnz);
        col_start.push(0);
        for j in 0..num_col {
            let col = a.outer_view(j).expect("column in range");
            for (i, &v) in col.iter() {
                let cs = col_scale.map_or(1.0, |s| s[j]);
                let rs = row_scale.map_or(1.0, |s| s[i]);
                col_index.push(i);
                col_value.push(v * cs * rs);
            }
            col_start.push(col_index.len());
        }

        // Transpose by counting sort into row-wise arrays.
        let mut row_count = vec![0usize; num_row];
        for &i in &col_index {
            row_count[i] += 1;
        }
        let mut row_start = Vec::with_capacity(num_row + 1);
        row_start.push(0);
        for i in 0..num_row {
            row_start.push(row_start[i] + row_count[i]);
        }
        let mut fill = row_start.clone();
        let mut row_index = vec![0usize; nnz];
        let mut row_value = vec![0.0; nnz];
        for j in 0..num_col {
            for k in col_start[j]..col_start[j + 1] {
                let i = col_index[k];
                row_index[fill[i]] = j;
                row_value[fill[i]] = col_value[k];
                fill[i] += 1;
            }
        }

        Self {
            num_col,
            num_row,
            col_start,
            col_index,
            col_value,
            row_start,
            row_index,
            row_value,
        }
    }

    /// Number of structural columns.
    pub fn num_col(&self) -> usize {
        self.num_col
    }

    /// Number of rows.
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Structural nonzero count.
    pub fn num_nz(&self) -> usize {
        self.col_index.len()
    }

    /// Row indices and values of column `j`.
    pub fn column(&self, j: usize) -> (&[usize], &[f64]) {
        let range = self.col_start[j]..self.col_start[j + 1];
        (&self.col_index[range.clone()], &self.col_value[range])
    }

    /// `result += multiplier * A_j` with index-list maintenance.
    pub fn collect_column(&self, result: &mut WorkVector, j: usize, multiplier: f64) {
        let (rows, values) = self.column(j);
        for (&i, &v) in rows.iter().zip(values) {
            result.add(i, multiplier * v);
        }
    }

    /// Sparse dot `A_j^T x` against a dense array.
    pub fn dot_column(&self, x: &[f64], j: usize) -> f64 {
        let (rows, values) = self.column(j);
        rows.iter().zip(values).map(|(&i, &v)| v * x[i]).sum()
    }

    /// PRICE: `result = A^T row_ep` over the structural columns.
    ///
    /// Chooses row-wise scatter for sparse `row_ep` and column-wise dots
    /// otherwise; both maintain the result's index list.
    pub fn price(&self, row_ep: &WorkVector, result: &mut WorkVector) {
        debug_assert_eq!(result.dim(), self.num_col);
        result.clear();
        if row_ep.traverse_sparse() {
            for &i in &row_ep.index {
                let multiplier = row_ep.array[i];
                if multiplier == 0.0 {
                    continue;
                }
                for k in self.row_start[i]..self.row_start[i + 1] {
                    result.add(self.row_index[k], multiplier * self.row_value[k]);
                }
            }
            result.compact();
        } else {
            for j in 0..self.num_col {
                let dot = self.dot_column(&row_ep.array, j);
                if dot != 0.0 {
                    result.set_fresh(j, dot);
                }
            }
            result.compact();
        }
    }
}

/// Geometric-mean equilibration factors for a CSC matrix.
///
/// Alternating row and column passes; each factor is the inverse square
/// root of the product of the extreme magnitudes seen in that line.
/// Returns `(col_scale, row_scale)`, all factors positive.
pub fn equilibrate(a: &CsMat<f64>, passes: usize) -> (Vec<f64>, Vec<f64>) {
    let num_row = a.rows();
    let num_col = a.cols();
    let mut col_scale = vec![1.0; num_col];
    let mut row_scale = vec![1.0; num_row];

    for _ in 0..passes {
        // Row pass over scaled magnitudes.
        let mut row_min = vec![f64::INFINITY; num_row];
        let mut row_max = vec![0.0f64; num_row];
        for j in 0..num_col {
            let col = a.outer_view(j).expect("column in range");
            for (i, &v) in col.iter() {
                let mag = (v * col_scale[j] * row_scale[i]).abs();
                if mag > 0.0 {
                    row_min[i] = row_min[i].min(mag);
                    row_max[i] = row_max[i].max(mag);
                }
            }
        }
        for i in 0..num_row {
            if row_max[i] > 0.0 {
                row_scale[i] /= (row_min[i] * row_max[i]).sqrt();
            }
        }

        // Column pass.
        for j in 0..num_col {
            let col = a.outer_view(j).expect("column in range");
            let mut col_min = f64::INFINITY;
            let mut col_max = 0.0f64;
            for (i, &v) in col.iter() {
                let mag = (v * col_scale[j] * row_scale[i]).abs();
                if mag > 0.0 {
                    col_min = col_min.min(mag);
                    col_max = col_max.max(mag);
                }
            }
            if col_max > 0.0 {
                col_scale[j] /= (col_min * col_max).sqrt();
            }
        }
    }

    (col_scale, row_scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn sample() -> CsMat<f64> {
        // [[1, 0, 2],
        //  [0, 3, 4]]
        let mut tri = TriMat::new((2, 3));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(1, 1, 3.0);
        tri.add_triplet(0, 2, 2.0);
        tri.add_triplet(1, 2, 4.0);
        tri.to_csc()
    }

    #[test]
    fn both_orientations_agree() {
        let m = SimplexMatrix::from_csc(&sample(), None, None);
        assert_eq!(m.num_nz(), 4);
        let (rows, values) = m.column(2);
        assert_eq!(rows, &[0, 1]);
        assert_eq!(values, &[2.0, 4.0]);
    }

    #[test]
    fn collect_column_accumulates() {
        let m = SimplexMatrix::from_csc(&sample(), None, None);
        let mut v = WorkVector::new(2);
        m.collect_column(&mut v, 2, 0.5);
        m.collect_column(&mut v, 0, 1.0);
        assert_eq!(v.array[0], 2.0);
        assert_eq!(v.array[1], 2.0);
        assert!(v.check_invariant());
    }

    #[test]
    fn price_matches_column_dots() {
        let m = SimplexMatrix::from_csc(&sample(), None, None);
        let mut row_ep = WorkVector::new(2);
        row_ep.add(0, 1.0);
        row_ep.add(1, -1.0);
        let mut result = WorkVector::new(3);
        m.price(&row_ep, &mut result);
        assert_eq!(result.array[0], 1.0);
        assert_eq!(result.array[1], -3.0);
        assert_eq!(result.array[2], -2.0);
        for j in 0..3 {
            assert_eq!(result.array[j], m.dot_column(&row_ep.array, j));
        }
    }

    #[test]
    fn scaling_applied_on_build() {
        let col_scale = vec![2.0, 1.0, 1.0];
        let row_scale = vec![1.0, 0.5];
        let m = SimplexMatrix::from_csc(&sample(), Some(&col_scale), Some(&row_scale));
        let (_, values) = m.column(0);
        assert_eq!(values, &[2.0]);
        let (_, values) = m.column(2);
        assert_eq!(values, &[2.0, 2.0]);
    }

    #[test]
    fn equilibrate_tames_extreme_entries() {
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1e4);
        tri.add_triplet(1, 1, 1e-4);
        let a: CsMat<f64> = tri.to_csc();
        let (col_scale, row_scale) = equilibrate(&a, 3);
        let scaled00 = 1e4 * col_scale[0] * row_scale[0];
        let scaled11 = 1e-4 * col_scale[1] * row_scale[1];
        assert!((scaled00.abs() - 1.0).abs() < 1e-6);
        assert!((scaled11.abs() - 1.0).abs() < 1e-6);
    }
}
