//! Vertex: a revised dual simplex engine for linear programming.
//!
//! The crate implements the numerical core of an LP solver:
//!
//! - **Sparse kernel**: compressed column/row matrix storage and
//!   scatter/gather working vectors with a density-switched traversal.
//! - **Basis factorization**: Markowitz LU with sparse FTRAN/BTRAN and
//!   bounded product-form updates between refactorizations.
//! - **NLA façade**: scaling, frozen-basis snapshots and residual checks
//!   between the simplex and the factorization.
//! - **Dual simplex**: steepest-edge or Devex pricing, a bound-flipping
//!   ratio test with anti-cycling tolerance expansion, and a two-phase
//!   scheme sharing one pivot loop.
//!
//! File-format readers, presolve and user-facing API layers are
//! external collaborators; this crate consumes a validated
//! [`LpProblem`] and returns a [`Solution`] bundle.
//!
//! # Example
//!
//! ```ignore
//! use vertex_core::{solve, LpProblem, Options};
//!
//! // minimize x + y  s.t.  x + y >= 2,  0 <= x, y <= 10
//! let mut lp = LpProblem::new(2, 1, matrix);
//! lp.col_cost = vec![1.0, 1.0];
//! lp.col_lower = vec![0.0, 0.0];
//! lp.col_upper = vec![10.0, 10.0];
//! lp.row_lower = vec![2.0];
//!
//! let solution = solve(&lp, &Options::default())?;
//! assert_eq!(solution.status, SolveStatus::Optimal);
//! ```

#![warn(clippy::all)]

pub mod basis;
pub mod basis_file;
pub mod error;
pub mod factor;
pub mod nla;
pub mod problem;
pub mod simplex;
pub mod solution;
pub mod sparse;
pub mod util;

pub use basis_file::{read_basis, write_basis, BasisFileError};
pub use error::SolveError;
pub use problem::{EdgeWeightStrategy, Integrality, LpProblem, ObjSense, Options, SimplexStrategy};
pub use simplex::DualSimplex;
pub use solution::{Basis, Solution, SolveStatus, VarStatus};

use util::timer::SolveTimer;

/// Solve a linear program.
///
/// Always returns a status and a (possibly partial) solution bundle for
/// anything the solver could start on; only invalid input is reported as
/// an error, synchronously and before any solver state is built.
pub fn solve(problem: &LpProblem, options: &Options) -> Result<Solution, SolveError> {
    let timer = SolveTimer::start(None, None);
    let mut solver = DualSimplex::new(problem, options)?;
    let mut solution = match solver.solve() {
        Ok(_) => solver.solution(),
        Err(SolveError::InvalidInput(message)) => {
            return Err(SolveError::InvalidInput(message));
        }
        Err(SolveError::Internal(message)) => {
            log::warn!("solve failed internally: {message}");
            let mut solution = solver.solution();
            solution.status = SolveStatus::Error;
            solution
        }
    };
    solution.solve_time = timer.elapsed();
    log::info!(
        "solve: status {:?} objective {:.6e} iterations {} time {:.3}s",
        solution.status,
        solution.objective,
        solution.iteration_count,
        solution.solve_time
    );
    Ok(solution)
}
