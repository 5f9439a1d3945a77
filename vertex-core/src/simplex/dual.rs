//! The dual simplex iteration loop.
//!
//! Drives CHUZR, BTRAN, PRICE, CHUZC/BFRT, the FTRANs, the dual and
//! primal updates, pricing weights, the product-form basis update and
//! the EXPAND anti-cycling schedule. Phase 1 attains dual feasibility on
//! a bound-shifted subproblem; phase 2 optimizes the true cost over the
//! true bounds with the same pivot code.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::basis::{SimplexBasis, MOVE_DOWN, MOVE_NONE, MOVE_UP};
use crate::error::SolveError;
use crate::factor::FactorError;
use crate::nla::SimplexNla;
use crate::problem::{LpProblem, ObjSense, Options};
use crate::simplex::dual_row::{ChuzcContext, ChuzcOutcome, DualRow, SortPath};
use crate::simplex::pricing::EdgeWeights;
use crate::solution::{Basis, Solution, SolveStatus};
use crate::sparse::{matrix::equilibrate, SimplexMatrix, WorkVector};
use crate::util::numerics::{is_free, is_neg_infinite, is_pos_infinite};
use crate::util::timer::SolveTimer;

/// EXPAND shift is reset every this many iterations.
const EXPAND_RESET_INTERVAL: u64 = 1000;

/// Artificial bound for free variables in the phase-1 subproblem.
const PHASE1_FREE_BOUND: f64 = 1000.0;

/// Consecutive numerical retries tolerated before giving up.
const MAX_NUMERICAL_RETRY: u32 = 5;

/// Equilibration passes when scaling is requested.
const SCALE_PASSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterateOutcome {
    /// No primal infeasibility remains in the current phase.
    PhaseOptimal,
    /// CHUZC failed twice in a row even after refactorization.
    ChuzcStalled,
    /// Iteration limit hit.
    IterationLimit,
    /// Time limit or cancellation.
    TimeLimit,
    /// Unrecoverable numerical trouble.
    NumericalTrouble,
}

/// Revised dual simplex solver instance.
///
/// Holds the converted problem, the basis, the NLA façade and the
/// working-vector pool; callers may adjust column bounds between solves
/// (branch-and-bound does) and freeze/restore bases for warm starts.
#[derive(Debug)]
pub struct DualSimplex {
    num_col: usize,
    num_row: usize,
    num_tot: usize,

    matrix: SimplexMatrix,
    options: Options,
    sense: ObjSense,

    /// Original-sense, unscaled costs for objective reporting.
    unscaled_cost: Vec<f64>,

    // Scaled problem bounds over all variables (structurals then
    // logicals), as currently overridden.
    orig_lower: Vec<f64>,
    orig_upper: Vec<f64>,
    // Pristine copies for reset_col_bounds.
    base_col_lower: Vec<f64>,
    base_col_upper: Vec<f64>,

    // Working arrays for the active phase.
    work_cost: Vec<f64>,
    work_lower: Vec<f64>,
    work_upper: Vec<f64>,
    work_range: Vec<f64>,
    work_value: Vec<f64>,
    work_dual: Vec<f64>,

    base_lower: Vec<f64>,
    base_upper: Vec<f64>,
    base_value: Vec<f64>,

    basis: SimplexBasis,
    nla: SimplexNla,
    weights: EdgeWeights,
    dual_row: DualRow,
    freelist: BTreeSet<usize>,
    permutation: Vec<usize>,

    // Working-vector pool, reused across iterations.
    row_ep: WorkVector,
    row_ap: WorkVector,
    col_aq: WorkVector,
    col_bfrt: WorkVector,
    dse_tau: WorkVector,
    col_work: WorkVector,

    rng: ChaCha8Rng,
    iteration_count: u64,
    expand_shift: f64,
    expand_increment: f64,
    need_rebuild: bool,
    status: SolveStatus,
}

impl DualSimplex {
    /// Build a solver instance for the problem. Validates the input and
    /// reports `InvalidInput` synchronously before any state exists.
    pub fn new(problem: &LpProblem, options: &Options) -> Result<Self, SolveError> {
        problem.validate()?;
        let options = options.clamped();
        let num_col = problem.num_col;
        let num_row = problem.num_row;
        let num_tot = num_col + num_row;

        let (col_scale, row_scale) = if options.scale && num_row > 0 {
            let (cs, rs) = equilibrate(&problem.a_matrix, SCALE_PASSES);
            (Some(cs), Some(rs))
        } else {
            (None, None)
        };
        let matrix =
            SimplexMatrix::from_csc(&problem.a_matrix, col_scale.as_deref(), row_scale.as_deref());

        let sense_factor = match problem.sense {
            ObjSense::Minimize => 1.0,
            ObjSense::Maximize => -1.0,
        };

        // Scaled bounds over structurals and logicals. The constraint is
        // held as A x + s = 0, so the logical of row i carries bounds
        // [-upper_i, -lower_i] (scaled by the row factor).
        let mut orig_lower = vec![0.0; num_tot];
        let mut orig_upper = vec![0.0; num_tot];
        for j in 0..num_col {
            let cs = col_scale.as_ref().map_or(1.0, |s| s[j]);
            orig_lower[j] = problem.col_lower[j] / cs;
            orig_upper[j] = problem.col_upper[j] / cs;
        }
        for i in 0..num_row {
            let rs = row_scale.as_ref().map_or(1.0, |s| s[i]);
            orig_lower[num_col + i] = -problem.row_upper[i] * rs;
            orig_upper[num_col + i] = -problem.row_lower[i] * rs;
        }

        let mut work_cost = vec![0.0; num_tot];
        for j in 0..num_col {
            let cs = col_scale.as_ref().map_or(1.0, |s| s[j]);
            work_cost[j] = sense_factor * problem.col_cost[j] * cs;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(options.random_seed);
        let mut permutation: Vec<usize> = (0..num_tot).collect();
        permutation.shuffle(&mut rng);

        let mut nla = SimplexNla::new(num_row, options.pivot_threshold, options.refactor_limit);
        nla.set_scale(col_scale, row_scale);

        let expand_increment = options.dual_feasibility_tolerance * 1e-4;
        let weights = EdgeWeights::new(options.edge_weight_strategy, num_row);

        let mut solver = Self {
            num_col,
            num_row,
            num_tot,
            matrix,
            sense: problem.sense,
            unscaled_cost: problem.col_cost.clone(),
            base_col_lower: orig_lower[..num_col].to_vec(),
            base_col_upper: orig_upper[..num_col].to_vec(),
            orig_lower,
            orig_upper,
            work_cost,
            work_lower: vec![0.0; num_tot],
            work_upper: vec![0.0; num_tot],
            work_range: vec![0.0; num_tot],
            work_value: vec![0.0; num_tot],
            work_dual: vec![0.0; num_tot],
            base_lower: vec![0.0; num_row],
            base_upper: vec![0.0; num_row],
            base_value: vec![0.0; num_row],
            basis: SimplexBasis::logical(num_col, num_row),
            nla,
            weights,
            dual_row: DualRow::new(),
            freelist: BTreeSet::new(),
            permutation,
            row_ep: WorkVector::new(num_row),
            row_ap: WorkVector::new(num_col),
            col_aq: WorkVector::new(num_row),
            col_bfrt: WorkVector::new(num_row),
            dse_tau: WorkVector::new(num_row),
            col_work: WorkVector::new(num_row),
            rng,
            iteration_count: 0,
            expand_shift: 0.0,
            expand_increment,
            need_rebuild: true,
            status: SolveStatus::Error,
            options,
        };
        solver.apply_phase_bounds(false);
        solver.align_nonbasic_state();
        Ok(solver)
    }

    /// Iterations used by the most recent solve.
    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }

    /// Status of the most recent solve.
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Override the bounds of a structural column (branch-and-bound
    /// tightenings). Takes unscaled bounds.
    pub fn set_col_bounds(&mut self, col: usize, lower: f64, upper: f64) {
        debug_assert!(col < self.num_col);
        let cs = self.nla.col_scale().map_or(1.0, |s| s[col]);
        self.orig_lower[col] = lower / cs;
        self.orig_upper[col] = upper / cs;
    }

    /// Restore every column bound to the master problem's values.
    pub fn reset_col_bounds(&mut self) {
        self.orig_lower[..self.num_col].copy_from_slice(&self.base_col_lower);
        self.orig_upper[..self.num_col].copy_from_slice(&self.base_col_upper);
    }

    /// Install a starting basis described by statuses.
    pub fn set_basis(&mut self, statuses: &Basis) {
        if statuses.col_status.len() != self.num_col
            || statuses.row_status.len() != self.num_row
            || statuses.num_basic() != self.num_row
        {
            log::debug!("ignoring starting basis with wrong shape");
            return;
        }
        self.basis = SimplexBasis::from_statuses(statuses, &self.orig_lower, &self.orig_upper);
        self.need_rebuild = true;
    }

    /// Snapshot the current basis through the NLA façade.
    pub fn freeze_basis(&mut self) -> u64 {
        self.nla.freeze(&self.basis)
    }

    /// Restore a frozen basis. Returns false if the snapshot has been
    /// invalidated or aged out.
    ///
    /// When the snapshot's eta list still extends the live
    /// factorization the next solve starts without a fresh INVERT.
    pub fn unfreeze_basis(&mut self, id: u64) -> bool {
        let mut basis = self.basis.clone();
        let Some(factor_current) = self.nla.unfreeze(id, &mut basis) else {
            return false;
        };
        self.basis = basis;
        self.need_rebuild = !factor_current;
        true
    }

    /// True if a frozen basis id is still live.
    pub fn frozen_basis_valid(&self, id: u64) -> bool {
        self.nla.frozen_basis_valid(id)
    }

    /// Run the dual simplex to a conclusive or limit status.
    pub fn solve(&mut self) -> Result<SolveStatus, SolveError> {
        let timer = SolveTimer::start(self.options.time_limit, self.options.cancel.clone());
        self.iteration_count = 0;
        self.expand_shift = 0.0;

        // Crossed finite bounds witness infeasibility before any
        // factorization.
        if self.has_inconsistent_bounds() {
            self.status = SolveStatus::Infeasible;
            return Ok(self.status);
        }
        if self.num_col == 0 {
            self.status = SolveStatus::Optimal;
            return Ok(self.status);
        }
        self.apply_phase_bounds(false);
        self.align_nonbasic_state();
        if self.num_row == 0 {
            self.status = self.solve_unconstrained();
            return Ok(self.status);
        }

        if self.need_rebuild || self.nla.needs_refactor() {
            self.rebuild()?;
        } else {
            // The factorization still matches the basis (a warm start
            // from a live snapshot, or a re-solve after bound changes):
            // recompute the iterate state without an INVERT.
            self.refresh_solver_state();
        }

        if self.count_dual_infeasibilities() > 0 {
            // Phase 1: same cost, shifted bounds.
            self.apply_phase_bounds(true);
            self.align_nonbasic_state();
            self.flip_to_dual_feasible();
            self.compute_primal();

            let outcome = self.iterate(&timer)?;
            match outcome {
                IterateOutcome::PhaseOptimal => {
                    self.apply_phase_bounds(false);
                    self.align_nonbasic_state();
                    self.flip_to_dual_feasible();
                    self.compute_primal();
                    if self.count_dual_infeasibilities() > 0 {
                        self.status = self.classify_dual_infeasible();
                        return Ok(self.status);
                    }
                }
                IterateOutcome::ChuzcStalled | IterateOutcome::NumericalTrouble => {
                    self.status = SolveStatus::Error;
                    return Ok(self.status);
                }
                IterateOutcome::IterationLimit => {
                    self.status = SolveStatus::IterationLimit;
                    return Ok(self.status);
                }
                IterateOutcome::TimeLimit => {
                    self.status = SolveStatus::TimeLimit;
                    return Ok(self.status);
                }
            }
        }

        // Phase 2 on the true bounds.
        let outcome = self.iterate(&timer)?;
        self.status = match outcome {
            IterateOutcome::PhaseOptimal => SolveStatus::Optimal,
            IterateOutcome::ChuzcStalled => SolveStatus::Infeasible,
            IterateOutcome::IterationLimit => SolveStatus::IterationLimit,
            IterateOutcome::TimeLimit => SolveStatus::TimeLimit,
            IterateOutcome::NumericalTrouble => SolveStatus::Error,
        };
        Ok(self.status)
    }

    /// Extract the solution bundle for the most recent solve.
    pub fn solution(&self) -> Solution {
        let num_col = self.num_col;
        let num_row = self.num_row;
        let col_scale = self.nla.col_scale().map(<[f64]>::to_vec);
        let row_scale = self.nla.row_scale().map(<[f64]>::to_vec);

        // Scaled variable values: nonbasic from work_value, basic from
        // base_value by position.
        let mut scaled = self.work_value.clone();
        for (pos, &var) in self.basis.basic_index.iter().enumerate() {
            scaled[var] = self.base_value[pos];
        }

        let mut col_value = vec![0.0; num_col];
        for j in 0..num_col {
            let cs = col_scale.as_ref().map_or(1.0, |s| s[j]);
            col_value[j] = scaled[j] * cs;
        }

        let mut row_value = vec![0.0; num_row];
        for i in 0..num_row {
            let rs = row_scale.as_ref().map_or(1.0, |s| s[i]);
            row_value[i] = -scaled[num_col + i] / rs;
        }

        let sense_factor = match self.sense {
            ObjSense::Minimize => 1.0,
            ObjSense::Maximize => -1.0,
        };
        let mut col_dual = vec![0.0; num_col];
        for j in 0..num_col {
            let cs = col_scale.as_ref().map_or(1.0, |s| s[j]);
            col_dual[j] = sense_factor * self.work_dual[j] / cs;
        }
        let mut row_dual = vec![0.0; num_row];
        for i in 0..num_row {
            let rs = row_scale.as_ref().map_or(1.0, |s| s[i]);
            row_dual[i] = sense_factor * -self.work_dual[num_col + i] * rs;
        }

        let objective: f64 = (0..num_col)
            .map(|j| self.unscaled_cost[j] * col_value[j])
            .sum();

        Solution {
            status: self.status,
            col_value,
            col_dual,
            row_value,
            row_dual,
            objective,
            basis: self
                .basis
                .to_statuses(num_col, &self.orig_lower, &self.orig_upper),
            iteration_count: self.iteration_count,
            solve_time: 0.0,
        }
    }

    // === Setup and phase transitions ===

    fn has_inconsistent_bounds(&self) -> bool {
        (0..self.num_tot).any(|var| {
            let l = self.orig_lower[var];
            let u = self.orig_upper[var];
            !is_neg_infinite(l) && !is_pos_infinite(u) && l > u
        })
    }

    /// Install phase-1 subproblem bounds or the true bounds, refresh the
    /// ranges and the freelist.
    fn apply_phase_bounds(&mut self, phase1: bool) {
        for var in 0..self.num_tot {
            let l = self.orig_lower[var];
            let u = self.orig_upper[var];
            let (wl, wu) = if phase1 {
                if is_free(l, u) {
                    (-PHASE1_FREE_BOUND, PHASE1_FREE_BOUND)
                } else if is_neg_infinite(l) {
                    (-1.0, 0.0)
                } else if is_pos_infinite(u) {
                    (0.0, 1.0)
                } else {
                    (0.0, 0.0)
                }
            } else {
                (l, u)
            };
            self.work_lower[var] = wl;
            self.work_upper[var] = wu;
            self.work_range[var] = wu - wl;
        }
        for pos in 0..self.num_row {
            let var = self.basis.basic_index[pos];
            self.base_lower[pos] = self.work_lower[var];
            self.base_upper[pos] = self.work_upper[var];
        }
        self.rebuild_freelist();
    }

    /// Repair nonbasic moves against the active bounds and place every
    /// nonbasic variable on its bound.
    fn align_nonbasic_state(&mut self) {
        for var in 0..self.num_tot {
            if self.basis.nonbasic_flag[var] != 1 {
                self.basis.nonbasic_move[var] = MOVE_NONE;
                continue;
            }
            let l = self.work_lower[var];
            let u = self.work_upper[var];
            let mut mv = self.basis.nonbasic_move[var];
            match mv {
                MOVE_UP if is_neg_infinite(l) => {
                    mv = if is_pos_infinite(u) { MOVE_NONE } else { MOVE_DOWN };
                }
                MOVE_DOWN if is_pos_infinite(u) => {
                    mv = if is_neg_infinite(l) { MOVE_NONE } else { MOVE_UP };
                }
                MOVE_NONE if !is_free(l, u) => {
                    mv = SimplexBasis::move_for_bounds(l, u);
                }
                _ => {}
            }
            self.basis.nonbasic_move[var] = mv;
            self.work_value[var] = match mv {
                MOVE_UP => l,
                MOVE_DOWN => u,
                _ => {
                    if l == u {
                        l
                    } else {
                        0.0
                    }
                }
            };
        }
    }

    fn rebuild_freelist(&mut self) {
        self.freelist.clear();
        for var in 0..self.num_tot {
            if self.basis.nonbasic_flag[var] == 1
                && is_free(self.work_lower[var], self.work_upper[var])
            {
                self.freelist.insert(var);
            }
        }
    }

    // === Rebuild (INVERT and recompute) ===

    /// Refactorize, patching singular bases with logicals, then
    /// recompute duals and primals and repair flippable dual
    /// infeasibilities.
    fn rebuild(&mut self) -> Result<(), SolveError> {
        let mut attempts = 0;
        loop {
            match self
                .nla
                .invert(&self.matrix, &mut self.basis.basic_index, self.num_col)
            {
                Ok(_) => break,
                Err(FactorError::Singular { positions, rows }) => {
                    attempts += 1;
                    if attempts > 3 {
                        return Err(SolveError::Internal(
                            "basis repair failed repeatedly".to_string(),
                        ));
                    }
                    log::debug!("singular basis: patching {} positions", positions.len());
                    self.patch_singular_basis(&positions, &rows);
                }
                Err(FactorError::Unstable) => {
                    return Err(SolveError::Internal(
                        "factorization unstable at rebuild".to_string(),
                    ));
                }
            }
        }
        self.need_rebuild = false;
        self.refresh_solver_state();

        if log::log_enabled!(log::Level::Debug) {
            let residual = self.nla.residual_check(
                &self.matrix,
                &self.basis.basic_index,
                self.num_col,
                &mut self.rng,
            );
            log::debug!(
                "rebuild: iteration {} residual {:.3e}",
                self.iteration_count,
                residual
            );
        }
        Ok(())
    }

    /// Recompute the per-iteration state for the current factorization:
    /// basic bounds, duals, flippable repairs and primal values.
    fn refresh_solver_state(&mut self) {
        for pos in 0..self.num_row {
            let var = self.basis.basic_index[pos];
            self.base_lower[pos] = self.work_lower[var];
            self.base_upper[pos] = self.work_upper[var];
        }
        self.compute_dual();
        self.flip_to_dual_feasible();
        self.compute_primal();
    }

    /// Replace unpivotable basic variables with nonbasic logicals.
    fn patch_singular_basis(&mut self, positions: &[usize], rows: &[usize]) {
        let mut used = BTreeSet::new();
        for (&pos, &row) in positions.iter().zip(rows) {
            let old = self.basis.basic_index[pos];
            let preferred = self.num_col + row;
            let replacement = if self.basis.nonbasic_flag[preferred] == 1
                && !used.contains(&preferred)
            {
                Some(preferred)
            } else {
                (self.num_col..self.num_tot)
                    .chain(0..self.num_col)
                    .find(|&v| self.basis.nonbasic_flag[v] == 1 && !used.contains(&v))
            };
            let Some(replacement) = replacement else {
                continue;
            };
            used.insert(replacement);

            self.basis.basic_index[pos] = replacement;
            self.basis.nonbasic_flag[replacement] = 0;
            self.basis.nonbasic_move[replacement] = MOVE_NONE;
            self.freelist.remove(&replacement);

            self.basis.nonbasic_flag[old] = 1;
            let mv = SimplexBasis::move_for_bounds(self.work_lower[old], self.work_upper[old]);
            self.basis.nonbasic_move[old] = mv;
            self.work_value[old] = match mv {
                MOVE_UP => self.work_lower[old],
                MOVE_DOWN => self.work_upper[old],
                _ => {
                    if self.work_lower[old] == self.work_upper[old] {
                        self.work_lower[old]
                    } else {
                        0.0
                    }
                }
            };
            if is_free(self.work_lower[old], self.work_upper[old]) {
                self.freelist.insert(old);
            }
        }
    }

    /// Duals from scratch: `y = B^-T c_B`, then `d = c - A^T y`.
    fn compute_dual(&mut self) {
        self.row_ep.clear();
        for pos in 0..self.num_row {
            let c = self.work_cost[self.basis.basic_index[pos]];
            if c != 0.0 {
                self.row_ep.set_fresh(pos, c);
            }
        }
        self.nla.btran(&mut self.row_ep);
        for j in 0..self.num_col {
            self.work_dual[j] =
                self.work_cost[j] - self.matrix.dot_column(&self.row_ep.array, j);
        }
        for i in 0..self.num_row {
            self.work_dual[self.num_col + i] =
                self.work_cost[self.num_col + i] - self.row_ep.array[i];
        }
        self.row_ep.clear();
    }

    /// Primal basic values from scratch: `x_B = -B^-1 N x_N`.
    fn compute_primal(&mut self) {
        self.col_work.clear();
        for var in 0..self.num_tot {
            if self.basis.nonbasic_flag[var] != 1 {
                continue;
            }
            let value = self.work_value[var];
            if value == 0.0 {
                continue;
            }
            if var < self.num_col {
                self.matrix.collect_column(&mut self.col_work, var, value);
            } else {
                self.col_work.add(var - self.num_col, value);
            }
        }
        self.col_work.compact();
        self.nla.ftran(&mut self.col_work);
        for pos in 0..self.num_row {
            self.base_value[pos] = -self.col_work.array[pos];
        }
        self.col_work.clear();
    }

    /// Flip nonbasic variables whose dual is infeasible at their current
    /// bound but feasible at the (finite) opposite one.
    fn flip_to_dual_feasible(&mut self) {
        let td = self.options.dual_feasibility_tolerance;
        for var in 0..self.num_tot {
            if self.basis.nonbasic_flag[var] != 1 {
                continue;
            }
            let l = self.work_lower[var];
            let u = self.work_upper[var];
            if l == u || is_neg_infinite(l) || is_pos_infinite(u) {
                continue;
            }
            let mv = self.basis.nonbasic_move[var];
            if (self.work_dual[var] * mv as f64) < -td {
                if mv == MOVE_UP {
                    self.basis.nonbasic_move[var] = MOVE_DOWN;
                    self.work_value[var] = u;
                } else {
                    self.basis.nonbasic_move[var] = MOVE_UP;
                    self.work_value[var] = l;
                }
            }
        }
    }

    /// Dual infeasibilities that no bound flip can remove.
    fn count_dual_infeasibilities(&self) -> usize {
        let td = self.options.dual_feasibility_tolerance;
        let mut count = 0;
        for var in 0..self.num_tot {
            if self.basis.nonbasic_flag[var] != 1 {
                continue;
            }
            let l = self.work_lower[var];
            let u = self.work_upper[var];
            if l == u {
                continue;
            }
            let d = self.work_dual[var];
            let mv = self.basis.nonbasic_move[var];
            let infeasible = if mv == MOVE_NONE {
                d.abs() > td
            } else {
                d * (mv as f64) < -td
            };
            if infeasible {
                count += 1;
            }
        }
        count
    }

    /// Dual infeasibility at phase-1 optimum means the dual is
    /// infeasible: the LP is unbounded if the current iterate is primal
    /// feasible, infeasible otherwise.
    fn classify_dual_infeasible(&self) -> SolveStatus {
        let tp = self.options.primal_feasibility_tolerance;
        for pos in 0..self.num_row {
            let v = self.base_value[pos];
            if v < self.base_lower[pos] - tp || v > self.base_upper[pos] + tp {
                return SolveStatus::Infeasible;
            }
        }
        SolveStatus::Unbounded
    }

    // === The iteration loop ===

    fn iterate(&mut self, timer: &SolveTimer) -> Result<IterateOutcome, SolveError> {
        let mut chuzc_failures = 0u32;
        let mut numerical_retries = 0u32;

        loop {
            if self.need_rebuild || self.nla.needs_refactor() {
                self.rebuild()?;
                if timer.cancelled() || timer.limit_exceeded() {
                    return Ok(IterateOutcome::TimeLimit);
                }
            }

            // CHUZR: most violating row by weighted infeasibility.
            let Some((row_out, delta)) = self.choose_row() else {
                return Ok(IterateOutcome::PhaseOptimal);
            };
            let move_out: i32 = if delta < 0.0 { -1 } else { 1 };

            // Pivotal row: BTRAN a unit vector, then PRICE.
            self.row_ep.clear();
            self.row_ep.set_fresh(row_out, 1.0);
            self.nla.btran(&mut self.row_ep);
            self.matrix.price(&self.row_ep, &mut self.row_ap);

            self.create_free_moves(move_out);

            self.dual_row.clear();
            self.dual_row.pack_row(&self.row_ap, 0);
            self.dual_row.pack_row(&self.row_ep, self.num_col);

            let ctx = ChuzcContext {
                nonbasic_move: &self.basis.nonbasic_move,
                work_dual: &self.work_dual,
                work_range: &self.work_range,
                permutation: &self.permutation,
                move_out,
                delta,
                dual_tolerance: self.options.dual_feasibility_tolerance + self.expand_shift,
                possible_tolerance: self.possible_tolerance(),
                sort_threshold: self.options.chuzc_sort_threshold,
                sort_path: SortPath::Auto,
            };
            let outcome = self.dual_row.choose(&ctx);
            self.delete_free_moves();

            let selection = match outcome {
                ChuzcOutcome::Select(selection) => selection,
                ChuzcOutcome::Fail => {
                    chuzc_failures += 1;
                    log::debug!(
                        "chuzc failure {} at iteration {}",
                        chuzc_failures,
                        self.iteration_count
                    );
                    if chuzc_failures >= 2 {
                        return Ok(IterateOutcome::ChuzcStalled);
                    }
                    // EXPAND reset, refactorize and retry.
                    self.expand_shift = 0.0;
                    self.need_rebuild = true;
                    continue;
                }
            };
            chuzc_failures = 0;

            // FTRAN the entering column.
            let var_in = selection.variable;
            self.col_aq.clear();
            if var_in < self.num_col {
                self.matrix.collect_column(&mut self.col_aq, var_in, 1.0);
            } else {
                self.col_aq.set_fresh(var_in - self.num_col, 1.0);
            }
            self.nla.ftran(&mut self.col_aq);
            let alpha_col = self.col_aq.array[row_out];

            // Row and column views of the pivot must agree.
            let alpha_err = (alpha_col - selection.alpha_row).abs();
            if !alpha_col.is_finite()
                || alpha_col.abs() < 1e-10
                || alpha_err > 1e-7 * (1.0 + alpha_col.abs())
            {
                numerical_retries += 1;
                if numerical_retries > MAX_NUMERICAL_RETRY {
                    return Ok(IterateOutcome::NumericalTrouble);
                }
                log::debug!(
                    "pivot mismatch {:.3e} vs {:.3e}; refactorizing",
                    alpha_col,
                    selection.alpha_row
                );
                self.need_rebuild = true;
                continue;
            }
            numerical_retries = 0;

            // Extra FTRAN for the steepest-edge recurrence.
            let tau = if self.weights.needs_tau() {
                self.dse_tau.copy_from(&self.row_ep);
                self.nla.ftran(&mut self.dse_tau);
                true
            } else {
                false
            };

            // Bound flips ahead of the basis change.
            if !selection.flips.is_empty() {
                self.col_bfrt.clear();
                for &(col, dx) in &selection.flips {
                    self.flip_bound(col);
                    if col < self.num_col {
                        self.matrix.collect_column(&mut self.col_bfrt, col, dx);
                    } else {
                        self.col_bfrt.add(col - self.num_col, dx);
                    }
                }
                self.col_bfrt.compact();
                if self.col_bfrt.count() > 0 {
                    self.nla.ftran(&mut self.col_bfrt);
                    for &i in &self.col_bfrt.index {
                        self.base_value[i] -= self.col_bfrt.array[i];
                    }
                }
            }

            // Dual update across the packed row.
            let theta_dual = selection.theta_dual;
            if theta_dual != 0.0 {
                for (var, value) in self.dual_row.packed() {
                    self.work_dual[var] -= theta_dual * value;
                }
            }
            let var_out = self.basis.basic_index[row_out];
            self.work_dual[var_in] = 0.0;
            self.work_dual[var_out] = -theta_dual;

            // Primal step along the edge. Flips may already have moved
            // the leaving row, so the step is measured from its current
            // value, not the CHUZR delta.
            let out_bound = if move_out < 0 {
                self.base_lower[row_out]
            } else {
                self.base_upper[row_out]
            };
            let theta_primal = (self.base_value[row_out] - out_bound) / alpha_col;
            for &i in &self.col_aq.index {
                self.base_value[i] -= theta_primal * self.col_aq.array[i];
            }

            // Pricing weights before the basis is rewritten.
            let tau_ref = if tau { Some(&self.dse_tau) } else { None };
            self.weights.update(row_out, &self.col_aq, tau_ref, alpha_col);

            // Leaving variable settles on the violated bound.
            self.basis.nonbasic_flag[var_out] = 1;
            let (mv_out, value_out) = if self.work_lower[var_out] == self.work_upper[var_out] {
                (MOVE_NONE, self.work_lower[var_out])
            } else if move_out < 0 {
                (MOVE_UP, self.work_lower[var_out])
            } else {
                (MOVE_DOWN, self.work_upper[var_out])
            };
            self.basis.nonbasic_move[var_out] = mv_out;
            self.work_value[var_out] = value_out;
            if is_free(self.work_lower[var_out], self.work_upper[var_out]) {
                self.freelist.insert(var_out);
            }

            // Entering variable joins the basis.
            let value_in = self.work_value[var_in] + theta_primal;
            self.basis.nonbasic_flag[var_in] = 0;
            self.basis.nonbasic_move[var_in] = MOVE_NONE;
            self.basis.basic_index[row_out] = var_in;
            self.base_lower[row_out] = self.work_lower[var_in];
            self.base_upper[row_out] = self.work_upper[var_in];
            self.base_value[row_out] = value_in;
            self.freelist.remove(&var_in);

            // Product-form update; on trouble fall back to a fresh
            // INVERT of the already-updated basis.
            if let Err(err) = self.nla.update(&self.col_aq, row_out) {
                log::debug!("update rejected ({err}); scheduling refactorization");
                self.need_rebuild = true;
            }

            self.iteration_count += 1;
            self.expand_shift += self.expand_increment;
            if self.iteration_count % EXPAND_RESET_INTERVAL == 0 {
                self.expand_shift = 0.0;
            }

            if let Some(limit) = self.options.iteration_limit {
                if self.iteration_count >= limit {
                    return Ok(IterateOutcome::IterationLimit);
                }
            }
            if timer.cancelled() || timer.limit_exceeded() {
                return Ok(IterateOutcome::TimeLimit);
            }
        }
    }

    /// CHUZR: row with the largest squared infeasibility over its edge
    /// weight. Returns the row and the signed infeasibility.
    fn choose_row(&self) -> Option<(usize, f64)> {
        let tp = self.options.primal_feasibility_tolerance;
        let mut best: Option<(usize, f64, f64)> = None;
        for pos in 0..self.num_row {
            let v = self.base_value[pos];
            let infeasibility = if v < self.base_lower[pos] - tp {
                v - self.base_lower[pos]
            } else if v > self.base_upper[pos] + tp {
                v - self.base_upper[pos]
            } else {
                continue;
            };
            let merit = infeasibility * infeasibility / self.weights.weight(pos);
            match best {
                Some((_, _, best_merit)) if merit <= best_merit => {}
                _ => best = Some((pos, infeasibility, merit)),
            }
        }
        best.map(|(pos, infeasibility, _)| (pos, infeasibility))
    }

    /// Staged magnitude tolerance for CHUZC, loosened as product-form
    /// updates accumulate.
    fn possible_tolerance(&self) -> f64 {
        match self.nla.update_count() {
            0..=9 => 1e-9,
            10..=19 => 3e-8,
            _ => 1e-6,
        }
    }

    /// Give eligible free variables a concrete move for this CHUZC.
    fn create_free_moves(&mut self, move_out: i32) {
        if self.freelist.is_empty() {
            return;
        }
        let ta = self.possible_tolerance();
        for &var in &self.freelist {
            let alpha = if var < self.num_col {
                self.row_ap.array[var]
            } else {
                self.row_ep.array[var - self.num_col]
            };
            if alpha.abs() > ta {
                self.basis.nonbasic_move[var] = if alpha * move_out as f64 > 0.0 {
                    MOVE_UP
                } else {
                    MOVE_DOWN
                };
            }
        }
    }

    /// Reset freelist moves after CHUZC.
    fn delete_free_moves(&mut self) {
        for &var in &self.freelist {
            if self.basis.nonbasic_flag[var] == 1 {
                self.basis.nonbasic_move[var] = MOVE_NONE;
            }
        }
    }

    /// Swap a nonbasic variable to its opposite bound.
    fn flip_bound(&mut self, var: usize) {
        if self.basis.nonbasic_move[var] == MOVE_UP {
            self.basis.nonbasic_move[var] = MOVE_DOWN;
            self.work_value[var] = self.work_upper[var];
        } else {
            self.basis.nonbasic_move[var] = MOVE_UP;
            self.work_value[var] = self.work_lower[var];
        }
    }

    /// Bound minimizer for row-free problems; no factorization happens.
    fn solve_unconstrained(&mut self) -> SolveStatus {
        let td = self.options.dual_feasibility_tolerance;
        for j in 0..self.num_col {
            let c = self.work_cost[j];
            let l = self.work_lower[j];
            let u = self.work_upper[j];
            let (mv, value) = if c > td {
                if is_neg_infinite(l) {
                    return SolveStatus::Unbounded;
                }
                (MOVE_UP, l)
            } else if c < -td {
                if is_pos_infinite(u) {
                    return SolveStatus::Unbounded;
                }
                (MOVE_DOWN, u)
            } else if !is_neg_infinite(l) {
                (MOVE_UP, l)
            } else if !is_pos_infinite(u) {
                (MOVE_DOWN, u)
            } else {
                (MOVE_NONE, 0.0)
            };
            self.basis.nonbasic_move[j] = mv;
            self.work_value[j] = value;
            self.work_dual[j] = c;
        }
        SolveStatus::Optimal
    }
}
