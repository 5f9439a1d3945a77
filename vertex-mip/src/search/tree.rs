//! Branch-and-bound tree controller.
//!
//! Best-bound exploration over LP relaxations solved by the dual
//! simplex, warm-started from frozen parent bases. Pseudocost gain,
//! inference and cutoff observations feed the branching selector,
//! including cutoffs of subtrees trimmed when the incumbent improves.

use vertex_core::util::timer::SolveTimer;
use vertex_core::{DualSimplex, SolveError, SolveStatus};

use super::node::{BoundDelta, Branch, BranchDirection};
use super::{BranchingSelector, OpenNodes, SearchNode};
use crate::error::MipResult;
use crate::model::{IncumbentTracker, MipProblem, MipSolution, MipStatus};
use crate::settings::MipSettings;

/// Branch-and-bound tree controller.
///
/// Manages the open-node set, the incumbent, the relaxation solver and
/// termination.
pub struct BranchAndBound {
    prob: MipProblem,
    settings: MipSettings,

    solver: DualSimplex,
    open: OpenNodes,
    branching: BranchingSelector,
    incumbent: IncumbentTracker,

    next_node_id: u64,
    nodes_explored: u64,
    nodes_pruned: u64,
    lp_iterations: u64,
}

enum NodeOutcome {
    /// Processed (pruned, fathomed or branched); continue the search.
    Continue,
    /// A limit or failure ends the whole search.
    Stop(MipStatus),
}

impl BranchAndBound {
    /// Set up the controller and the relaxation solver.
    pub fn new(prob: MipProblem, settings: MipSettings) -> MipResult<Self> {
        let settings = settings.clamped();
        let solver = DualSimplex::new(&prob.lp, &settings.lp_options)?;
        let num_col = prob.num_col();
        Ok(Self {
            prob,
            solver,
            open: OpenNodes::new(settings.node_selection),
            branching: BranchingSelector::new(num_col, settings.pseudocost_reliability),
            incumbent: IncumbentTracker::new(),
            next_node_id: 1, // 0 reserved for the root
            nodes_explored: 0,
            nodes_pruned: 0,
            lp_iterations: 0,
            settings,
        })
    }

    /// Run the search to completion or a limit.
    pub fn solve(&mut self) -> MipResult<MipSolution> {
        let timer = SolveTimer::start(
            self.settings.time_limit,
            self.settings.lp_options.cancel.clone(),
        );

        // Root relaxation.
        self.solver.reset_col_bounds();
        let root_status = self.solve_relaxation();
        self.nodes_explored = 1;
        match root_status {
            SolveStatus::Optimal => {}
            SolveStatus::Infeasible => return Ok(self.finalize(MipStatus::Infeasible, &timer)),
            SolveStatus::Unbounded => return Ok(self.finalize(MipStatus::Unbounded, &timer)),
            SolveStatus::TimeLimit => return Ok(self.finalize(MipStatus::TimeLimit, &timer)),
            SolveStatus::IterationLimit | SolveStatus::Error => {
                return Ok(self.finalize(MipStatus::NumericalError, &timer))
            }
        }

        let root_solution = self.solver.solution();
        let mut root = SearchNode::root();
        root.lower_bound = root_solution.objective;

        let tol = self.settings.integrality_tolerance;
        if self.prob.is_integer_feasible(&root_solution.col_value, tol) {
            // Fractional-free relaxation: no branching occurs.
            self.incumbent
                .update(&root_solution.col_value, root_solution.objective);
            return Ok(self.finalize(MipStatus::Optimal, &timer));
        }

        root.warm_basis = Some(self.solver.freeze_basis());
        if self.branch(&root, &root_solution.col_value).is_none() {
            return Ok(self.finalize(MipStatus::NumericalError, &timer));
        }

        // Main loop: best-bound node processing.
        loop {
            if timer.cancelled() || timer.limit_exceeded() {
                return Ok(self.finalize(MipStatus::TimeLimit, &timer));
            }
            if self.nodes_explored >= self.settings.max_nodes {
                return Ok(self.finalize(MipStatus::NodeLimit, &timer));
            }
            if self.incumbent.has_incumbent() && !self.open.is_empty() {
                let gap = self.incumbent.gap(self.open.best_bound());
                let abs_gap = self.incumbent.objective - self.open.best_bound();
                if gap <= self.settings.mip_rel_gap || abs_gap <= self.settings.mip_abs_gap {
                    return Ok(self.finalize(MipStatus::GapLimit, &timer));
                }
            }

            let Some(node) = self.open.take_next() else {
                let status = if self.incumbent.has_incumbent() {
                    MipStatus::Optimal
                } else {
                    MipStatus::Infeasible
                };
                return Ok(self.finalize(status, &timer));
            };

            match self.process_node(node) {
                NodeOutcome::Continue => {}
                NodeOutcome::Stop(status) => return Ok(self.finalize(status, &timer)),
            }
            self.log_progress();
        }
    }

    /// Solve one node's relaxation and act on the outcome.
    fn process_node(&mut self, node: SearchNode) -> NodeOutcome {
        // Fathom against the incumbent before paying for an LP.
        if self.incumbent.has_incumbent() && node.fathomed_by(self.incumbent.objective) {
            self.nodes_pruned += 1;
            self.record_cutoff(&node);
            return NodeOutcome::Continue;
        }

        // An empty branching domain is an immediate cutoff.
        if node.has_empty_domain() {
            self.nodes_pruned += 1;
            self.record_cutoff(&node);
            return NodeOutcome::Continue;
        }

        self.apply_node_bounds(&node);
        if let Some(id) = node.warm_basis {
            if self.solver.frozen_basis_valid(id) {
                self.solver.unfreeze_basis(id);
            }
        }

        let status = self.solve_relaxation();
        self.nodes_explored += 1;

        match status {
            SolveStatus::Infeasible => {
                self.nodes_pruned += 1;
                self.record_cutoff(&node);
                NodeOutcome::Continue
            }
            SolveStatus::Optimal => {
                let solution = self.solver.solution();
                let objective = solution.objective;
                self.record_gain(&node, objective);

                if self.incumbent.has_incumbent()
                    && objective >= self.incumbent.objective - 1e-9
                {
                    self.nodes_pruned += 1;
                    self.record_cutoff(&node);
                    return NodeOutcome::Continue;
                }

                let tol = self.settings.integrality_tolerance;
                if self.prob.is_integer_feasible(&solution.col_value, tol) {
                    if self.incumbent.update(&solution.col_value, objective) {
                        // Trim the fathomed subtrees and record the
                        // cutoffs for their branches.
                        let cut = self.open.cut_off(self.incumbent.objective);
                        self.nodes_pruned += cut.len() as u64;
                        for branch in &cut {
                            self.branching
                                .pseudocost_mut()
                                .add_cutoff_observation(branch.col, branch.is_up());
                        }
                        log::info!(
                            "new incumbent: obj={:.6e}, cut {} nodes",
                            self.prob.sense_factor * objective,
                            cut.len()
                        );
                    }
                    return NodeOutcome::Continue;
                }

                let mut solved = node;
                solved.lower_bound = objective;
                solved.warm_basis = Some(self.solver.freeze_basis());
                match self.branch(&solved, &solution.col_value) {
                    Some(()) => NodeOutcome::Continue,
                    None => NodeOutcome::Stop(MipStatus::NumericalError),
                }
            }
            SolveStatus::TimeLimit => NodeOutcome::Stop(MipStatus::TimeLimit),
            SolveStatus::Unbounded | SolveStatus::IterationLimit | SolveStatus::Error => {
                NodeOutcome::Stop(MipStatus::NumericalError)
            }
        }
    }

    /// Select a branching column and open the two children.
    fn branch(&mut self, node: &SearchNode, x: &[f64]) -> Option<()> {
        let decision = self
            .branching
            .select(x, &self.prob, self.settings.integrality_tolerance)?;
        let bounds = node.bounds_for(decision.col, self.prob.col_bounds(decision.col));

        let down_id = self.next_node_id;
        let up_id = self.next_node_id + 1;
        self.next_node_id += 2;

        for (id, direction) in [
            (down_id, BranchDirection::Down),
            (up_id, BranchDirection::Up),
        ] {
            let branch = Branch {
                col: decision.col,
                frac: decision.frac,
                direction,
            };
            let delta = BoundDelta::from_branch(decision.col, bounds, decision.value, direction);
            self.open.add(node.descend(id, branch, delta));
        }
        Some(())
    }

    /// Run the LP engine, folding internal failures into a status.
    fn solve_relaxation(&mut self) -> SolveStatus {
        let status = match self.solver.solve() {
            Ok(status) => status,
            Err(SolveError::InvalidInput(message)) | Err(SolveError::Internal(message)) => {
                log::warn!("relaxation failed: {message}");
                SolveStatus::Error
            }
        };
        self.lp_iterations += self.solver.iteration_count();
        status
    }

    fn apply_node_bounds(&mut self, node: &SearchNode) {
        self.solver.reset_col_bounds();
        for delta in &node.deltas {
            self.solver.set_col_bounds(delta.col, delta.lower, delta.upper);
        }
    }

    /// Cutoff observation for the branch that produced this node.
    fn record_cutoff(&mut self, node: &SearchNode) {
        if let Some(branch) = node.branch {
            self.branching
                .pseudocost_mut()
                .add_cutoff_observation(branch.col, branch.is_up());
        }
    }

    /// Gain and inference observations once a child relaxation solved.
    fn record_gain(&mut self, node: &SearchNode, objective: f64) {
        let Some(branch) = node.branch else {
            return;
        };
        if !node.lower_bound.is_finite() {
            return;
        }
        let objdelta = (objective - node.lower_bound).max(0.0);
        let delta = branch.delta();
        if delta.abs() > 1e-9 {
            self.branching
                .pseudocost_mut()
                .add_observation(branch.col, delta, objdelta);
        }
        // Without a propagation engine each branch contributes its own
        // bound change as one inference.
        self.branching
            .pseudocost_mut()
            .add_inference_observation(branch.col, 1, branch.is_up());
    }

    fn log_progress(&self) {
        if self.settings.log_freq == 0 || self.nodes_explored % self.settings.log_freq != 0 {
            return;
        }
        log::info!(
            "nodes {} ({} open, {} pruned) | bound {:.6e} | incumbent {:.6e} | gap {:.2}%",
            self.nodes_explored,
            self.open.len(),
            self.nodes_pruned,
            self.prob.sense_factor * self.open.best_bound(),
            self.prob.sense_factor * self.incumbent.objective,
            self.incumbent.gap(self.open.best_bound()) * 100.0,
        );
    }

    /// Assemble the solution bundle in the caller's objective sense.
    fn finalize(&self, status: MipStatus, timer: &SolveTimer) -> MipSolution {
        let sense = self.prob.sense_factor;
        let (objective, gap, bound) = if self.incumbent.has_incumbent() {
            if status == MipStatus::Optimal {
                (self.incumbent.objective, 0.0, self.incumbent.objective)
            } else {
                (
                    self.incumbent.objective,
                    self.incumbent.gap(self.open.best_bound()),
                    self.open.best_bound(),
                )
            }
        } else {
            (f64::INFINITY, f64::INFINITY, self.open.best_bound())
        };

        MipSolution {
            status,
            col_value: self.incumbent.solution.clone().unwrap_or_default(),
            objective: sense * objective,
            bound: sense * bound,
            gap,
            nodes_explored: self.nodes_explored,
            lp_iterations: self.lp_iterations,
            solve_time: timer.elapsed(),
            incumbent_updates: self.incumbent.update_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;
    use vertex_core::{Integrality, LpProblem};

    fn knapsack_like() -> MipProblem {
        // minimize -x - y  s.t.  x + 2y <= 7,  4x + y <= 11,
        // 0 <= x, y <= 10 integer.
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 1, 2.0);
        tri.add_triplet(1, 0, 4.0);
        tri.add_triplet(1, 1, 1.0);
        let mut lp = LpProblem::new(2, 2, tri.to_csc());
        lp.col_cost = vec![-1.0, -1.0];
        lp.col_lower = vec![0.0, 0.0];
        lp.col_upper = vec![10.0, 10.0];
        lp.row_lower = vec![f64::NEG_INFINITY, f64::NEG_INFINITY];
        lp.row_upper = vec![7.0, 11.0];
        lp.integrality = Some(vec![Integrality::Integer, Integrality::Integer]);
        MipProblem::new(&lp).unwrap()
    }

    #[test]
    fn solves_small_mip_to_optimality() {
        let mut tree = BranchAndBound::new(knapsack_like(), MipSettings::default()).unwrap();
        let solution = tree.solve().unwrap();
        assert!(solution.status.is_optimal(), "status {:?}", solution.status);
        assert!((solution.objective + 4.0).abs() < 1e-6);
        let x = solution.col_value[0].round();
        let y = solution.col_value[1].round();
        assert!(x + 2.0 * y <= 7.0 + 1e-6);
        assert!(4.0 * x + y <= 11.0 + 1e-6);
        assert!((x + y - 4.0).abs() < 1e-6);
    }

    #[test]
    fn node_limit_stops_the_search() {
        let settings = MipSettings::default().with_max_nodes(1);
        let mut tree = BranchAndBound::new(knapsack_like(), settings).unwrap();
        let solution = tree.solve().unwrap();
        assert!(
            solution.status == MipStatus::NodeLimit || solution.status.is_optimal(),
            "status {:?}",
            solution.status
        );
    }

    #[test]
    fn depth_first_reaches_the_same_optimum() {
        let mut settings = MipSettings::default();
        settings.node_selection = crate::settings::NodeSelection::DepthFirst;
        let mut tree = BranchAndBound::new(knapsack_like(), settings).unwrap();
        let solution = tree.solve().unwrap();
        assert!(solution.status.is_optimal(), "status {:?}", solution.status);
        assert!((solution.objective + 4.0).abs() < 1e-6);
    }
}
