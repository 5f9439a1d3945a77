//! Mixed-integer programming layer for the vertex LP engine.
//!
//! Branch-and-bound over dual simplex relaxations: best-bound node
//! selection, pseudocost branching with reliability blending, cutoff
//! pruning and warm starts from frozen bases. Problems without integer
//! columns route straight to the LP core.

#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod search;
pub mod settings;

pub use error::{MipError, MipResult};
pub use model::{IncumbentTracker, MipProblem, MipSolution, MipStatus};
pub use search::{BranchAndBound, BranchDecision, BranchingSelector, Pseudocost, SearchNode};
pub use settings::{MipSettings, NodeSelection};

use vertex_core::{LpProblem, SolveStatus};

/// Solve a mixed-integer program.
///
/// All-continuous problems are solved as plain LPs; the result is
/// wrapped into a [`MipSolution`] either way.
pub fn solve_mip(problem: &LpProblem, settings: &MipSettings) -> MipResult<MipSolution> {
    if !problem.has_integrality() {
        let lp_solution = vertex_core::solve(problem, &settings.lp_options)?;
        let status = match lp_solution.status {
            SolveStatus::Optimal => MipStatus::Optimal,
            SolveStatus::Infeasible => MipStatus::Infeasible,
            SolveStatus::Unbounded => MipStatus::Unbounded,
            SolveStatus::TimeLimit => MipStatus::TimeLimit,
            SolveStatus::IterationLimit | SolveStatus::Error => MipStatus::NumericalError,
        };
        return Ok(MipSolution {
            status,
            col_value: lp_solution.col_value,
            objective: lp_solution.objective,
            bound: lp_solution.objective,
            gap: 0.0,
            nodes_explored: 0,
            lp_iterations: lp_solution.iteration_count,
            solve_time: lp_solution.solve_time,
            incumbent_updates: 0,
        });
    }

    let prob = MipProblem::new(problem)?;
    let mut tree = BranchAndBound::new(prob, settings.clone())?;
    tree.solve()
}
