//! LP problem data and solver options.
//!
//! This module defines the canonical linear program representation
//! accepted by the engine and the recognized solver options.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sprs::CsMat;

use crate::error::SolveError;
use crate::util::numerics::{is_neg_infinite, is_pos_infinite};

/// Objective sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjSense {
    /// Minimize the cost vector (canonical form).
    #[default]
    Minimize,

    /// Maximize; handled by cost negation at entry and objective/dual
    /// negation at exit.
    Maximize,
}

/// Per-column integrality tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integrality {
    /// Continuous variable.
    #[default]
    Continuous,
    /// Integer-constrained variable.
    Integer,
}

/// Linear program in canonical form.
///
/// ```text
/// minimize    c^T x
/// subject to  row_lower <= A x <= row_upper
///             col_lower <=   x <= col_upper
/// ```
///
/// `A` is m x n in compressed sparse column format. Bounds may be
/// infinite in either direction. A column with `col_lower > col_upper`
/// (both finite) is a valid infeasibility witness, not an input error.
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Number of columns (decision variables).
    pub num_col: usize,

    /// Number of rows (constraints).
    pub num_row: usize,

    /// Constraint matrix, m x n, CSC.
    pub a_matrix: CsMat<f64>,

    /// Linear cost vector (length n).
    pub col_cost: Vec<f64>,

    /// Column lower bounds (length n, -inf allowed).
    pub col_lower: Vec<f64>,

    /// Column upper bounds (length n, +inf allowed).
    pub col_upper: Vec<f64>,

    /// Row activity lower bounds (length m, -inf allowed).
    pub row_lower: Vec<f64>,

    /// Row activity upper bounds (length m, +inf allowed).
    pub row_upper: Vec<f64>,

    /// Objective sense.
    pub sense: ObjSense,

    /// Optional per-column integrality tags. `None` means all continuous.
    pub integrality: Option<Vec<Integrality>>,
}

impl LpProblem {
    /// Create an LP with the given dimensions and all-zero cost, free
    /// columns and free rows. Useful as a starting point in tests.
    pub fn new(num_col: usize, num_row: usize, a_matrix: CsMat<f64>) -> Self {
        Self {
            num_col,
            num_row,
            a_matrix,
            col_cost: vec![0.0; num_col],
            col_lower: vec![f64::NEG_INFINITY; num_col],
            col_upper: vec![f64::INFINITY; num_col],
            row_lower: vec![f64::NEG_INFINITY; num_row],
            row_upper: vec![f64::INFINITY; num_row],
            sense: ObjSense::Minimize,
            integrality: None,
        }
    }

    /// Validate dimensions and entry sanity.
    ///
    /// Inconsistent finite bounds (`l > u`) are deliberately not rejected
    /// here: they witness infeasibility and are reported as such by the
    /// solve.
    pub fn validate(&self) -> Result<(), SolveError> {
        if !self.a_matrix.is_csc() {
            return Err(SolveError::InvalidInput(
                "constraint matrix must be in CSC format".to_string(),
            ));
        }
        if self.a_matrix.rows() != self.num_row || self.a_matrix.cols() != self.num_col {
            return Err(SolveError::InvalidInput(format!(
                "matrix is {}x{}, expected {}x{}",
                self.a_matrix.rows(),
                self.a_matrix.cols(),
                self.num_row,
                self.num_col
            )));
        }
        if self.col_cost.len() != self.num_col
            || self.col_lower.len() != self.num_col
            || self.col_upper.len() != self.num_col
        {
            return Err(SolveError::InvalidInput(
                "column vector length mismatch".to_string(),
            ));
        }
        if self.row_lower.len() != self.num_row || self.row_upper.len() != self.num_row {
            return Err(SolveError::InvalidInput(
                "row vector length mismatch".to_string(),
            ));
        }
        if let Some(integrality) = &self.integrality {
            if integrality.len() != self.num_col {
                return Err(SolveError::InvalidInput(
                    "integrality vector length mismatch".to_string(),
                ));
            }
        }
        for (j, &c) in self.col_cost.iter().enumerate() {
            if c.is_nan() {
                return Err(SolveError::InvalidInput(format!("cost of column {j} is NaN")));
            }
        }
        for j in 0..self.num_col {
            if self.col_lower[j].is_nan() || self.col_upper[j].is_nan() {
                return Err(SolveError::InvalidInput(format!("bound of column {j} is NaN")));
            }
        }
        for i in 0..self.num_row {
            if self.row_lower[i].is_nan() || self.row_upper[i].is_nan() {
                return Err(SolveError::InvalidInput(format!("bound of row {i} is NaN")));
            }
        }
        for &v in self.a_matrix.data() {
            if !v.is_finite() {
                return Err(SolveError::InvalidInput(
                    "matrix entries must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Find a column whose finite bounds cross, if any.
    pub fn inconsistent_col_bounds(&self) -> Option<usize> {
        (0..self.num_col).find(|&j| {
            !is_neg_infinite(self.col_lower[j])
                && !is_pos_infinite(self.col_upper[j])
                && self.col_lower[j] > self.col_upper[j]
        })
    }

    /// Find a row whose finite bounds cross, if any.
    pub fn inconsistent_row_bounds(&self) -> Option<usize> {
        (0..self.num_row).find(|&i| {
            !is_neg_infinite(self.row_lower[i])
                && !is_pos_infinite(self.row_upper[i])
                && self.row_lower[i] > self.row_upper[i]
        })
    }

    /// True if any column carries an integrality constraint.
    pub fn has_integrality(&self) -> bool {
        self.integrality
            .as_ref()
            .map(|v| v.iter().any(|&t| t == Integrality::Integer))
            .unwrap_or(false)
    }
}

/// Simplex variant. Only the dual simplex is implemented; the option
/// exists so callers can state their intent explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimplexStrategy {
    /// Revised dual simplex.
    #[default]
    Dual,
}

/// Edge weight scheme used by row selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeWeightStrategy {
    /// Exact dual steepest-edge reference weights.
    #[default]
    SteepestEdge,

    /// Devex approximation; cheaper per iteration, no extra FTRAN.
    Devex,
}

/// Solver options.
///
/// All values are advisory; [`Options::clamped`] is applied at the entry
/// point so pathological values cannot destabilize the solve.
#[derive(Debug, Clone)]
pub struct Options {
    /// Primal feasibility tolerance.
    pub primal_feasibility_tolerance: f64,

    /// Dual feasibility tolerance.
    pub dual_feasibility_tolerance: f64,

    /// Relative pivot threshold for the Markowitz factorization.
    pub pivot_threshold: f64,

    /// Product-form updates allowed before a fresh INVERT is forced.
    pub refactor_limit: usize,

    /// Simplex iteration limit (None = unlimited).
    pub iteration_limit: Option<u64>,

    /// Time limit in seconds (None = unlimited).
    pub time_limit: Option<f64>,

    /// Whether the caller intends presolve to run. The presolve chain is
    /// an external collaborator; the flag is recognized and clamped but
    /// the core itself never transforms the problem.
    pub presolve: bool,

    /// Simplex variant.
    pub simplex_strategy: SimplexStrategy,

    /// Row pricing scheme.
    pub edge_weight_strategy: EdgeWeightStrategy,

    /// Candidate count at which the ratio-test sort switches from the
    /// quadratic path to the heap path.
    pub chuzc_sort_threshold: usize,

    /// Apply equilibration scaling to the constraint matrix.
    pub scale: bool,

    /// Seed for the tie-break permutation and residual probes.
    pub random_seed: u64,

    /// Cooperative cancellation flag, polled at safe points.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            primal_feasibility_tolerance: 1e-7,
            dual_feasibility_tolerance: 1e-7,
            pivot_threshold: 0.1,
            refactor_limit: 100,
            iteration_limit: None,
            time_limit: None,
            presolve: true,
            simplex_strategy: SimplexStrategy::Dual,
            edge_weight_strategy: EdgeWeightStrategy::SteepestEdge,
            chuzc_sort_threshold: 100,
            scale: false,
            random_seed: 0,
            cancel: None,
        }
    }
}

impl Options {
    /// Return a copy with pathological values clamped into safe ranges.
    pub fn clamped(&self) -> Self {
        let mut o = self.clone();
        o.primal_feasibility_tolerance = o.primal_feasibility_tolerance.clamp(1e-12, 1e-1);
        o.dual_feasibility_tolerance = o.dual_feasibility_tolerance.clamp(1e-12, 1e-1);
        o.pivot_threshold = o.pivot_threshold.clamp(1e-4, 0.5);
        o.refactor_limit = o.refactor_limit.clamp(2, 10_000);
        o.chuzc_sort_threshold = o.chuzc_sort_threshold.max(1);
        o
    }

    /// Set the time limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the iteration limit.
    pub fn with_iteration_limit(mut self, iterations: u64) -> Self {
        self.iteration_limit = Some(iterations);
        self
    }

    /// Set the edge weight strategy.
    pub fn with_edge_weights(mut self, strategy: EdgeWeightStrategy) -> Self {
        self.edge_weight_strategy = strategy;
        self
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn small_matrix() -> CsMat<f64> {
        let mut tri = TriMat::new((1, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 1, 1.0);
        tri.to_csc()
    }

    #[test]
    fn validate_accepts_consistent_problem() {
        let lp = LpProblem::new(2, 1, small_matrix());
        assert!(lp.validate().is_ok());
    }

    #[test]
    fn validate_rejects_dimension_mismatch() {
        let mut lp = LpProblem::new(2, 1, small_matrix());
        lp.col_cost.pop();
        assert!(lp.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_cost() {
        let mut lp = LpProblem::new(2, 1, small_matrix());
        lp.col_cost[0] = f64::NAN;
        assert!(lp.validate().is_err());
    }

    #[test]
    fn crossed_bounds_are_a_witness_not_an_error() {
        let mut lp = LpProblem::new(2, 1, small_matrix());
        lp.col_lower[1] = 1.0;
        lp.col_upper[1] = 0.0;
        assert!(lp.validate().is_ok());
        assert_eq!(lp.inconsistent_col_bounds(), Some(1));
    }

    #[test]
    fn options_clamp_pathological_values() {
        let mut o = Options::default();
        o.pivot_threshold = 50.0;
        o.refactor_limit = 0;
        o.dual_feasibility_tolerance = -1.0;
        let c = o.clamped();
        assert_eq!(c.pivot_threshold, 0.5);
        assert_eq!(c.refactor_limit, 2);
        assert_eq!(c.dual_feasibility_tolerance, 1e-12);
    }
}
