//! MIP problem wrapper around the LP core.

use vertex_core::{Integrality, LpProblem, ObjSense};

use crate::error::{MipError, MipResult};

/// A mixed-integer program, normalized to minimization for the search.
#[derive(Debug, Clone)]
pub struct MipProblem {
    /// The relaxation, with costs negated if the caller maximizes.
    pub lp: LpProblem,

    /// Indices of the integer-constrained columns.
    pub integer_cols: Vec<usize>,

    /// +1 for minimization input, -1 for maximization; applied to
    /// objectives when reporting back.
    pub sense_factor: f64,
}

impl MipProblem {
    /// Validate and normalize an LP with integrality tags.
    pub fn new(problem: &LpProblem) -> MipResult<Self> {
        problem.validate().map_err(MipError::from)?;

        let integer_cols: Vec<usize> = match &problem.integrality {
            Some(tags) => tags
                .iter()
                .enumerate()
                .filter(|(_, &t)| t == Integrality::Integer)
                .map(|(j, _)| j)
                .collect(),
            None => Vec::new(),
        };

        let mut lp = problem.clone();
        let sense_factor = match lp.sense {
            ObjSense::Minimize => 1.0,
            ObjSense::Maximize => {
                lp.col_cost.iter_mut().for_each(|c| *c = -*c);
                lp.sense = ObjSense::Minimize;
                -1.0
            }
        };

        Ok(Self {
            lp,
            integer_cols,
            sense_factor,
        })
    }

    /// Number of columns in the relaxation.
    pub fn num_col(&self) -> usize {
        self.lp.num_col
    }

    /// Integer columns whose value is fractional beyond the tolerance,
    /// as `(col, value, fractional_part)`.
    pub fn fractional_vars(&self, x: &[f64], tol: f64) -> Vec<(usize, f64, f64)> {
        let mut fractional = Vec::new();
        for &j in &self.integer_cols {
            let value = x[j];
            let frac = value - value.floor();
            if frac > tol && frac < 1.0 - tol {
                fractional.push((j, value, frac));
            }
        }
        fractional
    }

    /// True if every integer column sits at an integral value.
    pub fn is_integer_feasible(&self, x: &[f64], tol: f64) -> bool {
        self.fractional_vars(x, tol).is_empty()
    }

    /// Master bounds of a column.
    pub fn col_bounds(&self, col: usize) -> (f64, f64) {
        (self.lp.col_lower[col], self.lp.col_upper[col])
    }
}
