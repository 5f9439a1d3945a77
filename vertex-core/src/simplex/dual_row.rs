//! Entering-variable selection (CHUZC) with the bound-flipping ratio
//! test.
//!
//! Given the packed pivotal row, selection runs in four phases:
//! a magnitude filter over the candidates, a large-step pass that groups
//! candidates by growing ratio thresholds until the accumulated
//! bound-flip change covers the primal infeasibility, a sort of the
//! grouped candidates (quadratic in place for small counts, heap-based
//! otherwise), and a walk over the groups from the largest ratios down
//! that picks the candidate of largest magnitude. Candidates in groups
//! below the chosen one become bound flips.

use crate::basis::MOVE_NONE;
use crate::sparse::WorkVector;

/// Grouping passes stop once the ratio threshold reaches this.
const MAX_SELECT_THETA: f64 = 1e18;

/// Seed for the accumulated bound-flip change.
const INITIAL_TOTAL_CHANGE: f64 = 1e-12;

/// Seed for the next-threshold scan.
const INITIAL_REMAIN_THETA: f64 = 1e100;

/// Which sorting path to use in phase C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPath {
    /// Pick by candidate count against the configured threshold.
    #[default]
    Auto,
    /// Force the quadratic in-place path.
    Quadratic,
    /// Force the heap path.
    Heap,
}

/// Read-only state the ratio test needs from the engine.
pub struct ChuzcContext<'a> {
    /// Nonbasic move of every variable.
    pub nonbasic_move: &'a [i8],
    /// Current reduced costs.
    pub work_dual: &'a [f64],
    /// Bound ranges (upper minus lower).
    pub work_range: &'a [f64],
    /// Stable tie-break permutation over all variables.
    pub permutation: &'a [usize],
    /// Direction the leaving variable moves: -1 below lower, +1 above
    /// upper.
    pub move_out: i32,
    /// Signed primal infeasibility to resolve.
    pub delta: f64,
    /// Dual feasibility tolerance including the anti-cycling shift.
    pub dual_tolerance: f64,
    /// Magnitude tolerance for admitting a candidate.
    pub possible_tolerance: f64,
    /// Candidate count at which Auto switches to the heap path.
    pub sort_threshold: usize,
    /// Sorting path override.
    pub sort_path: SortPath,
}

/// Chosen entering variable plus the accompanying bound flips.
#[derive(Debug, Clone)]
pub struct ChuzcSelection {
    /// Entering variable.
    pub variable: usize,
    /// Raw pivotal-row entry of the entering variable.
    pub alpha_row: f64,
    /// Raw dual step length.
    pub theta_dual: f64,
    /// Variables flipping to their opposite bound, with the primal
    /// change of each flip.
    pub flips: Vec<(usize, f64)>,
}

/// Outcome of one CHUZC call.
#[derive(Debug, Clone)]
pub enum ChuzcOutcome {
    /// Entering variable found.
    Select(ChuzcSelection),
    /// No candidate, or the grouping failed to make progress, or the
    /// flip set would create new dual infeasibility.
    Fail,
}

/// Workspace for the ratio test, reused across iterations.
#[derive(Debug, Default)]
pub struct DualRow {
    pack_index: Vec<usize>,
    pack_value: Vec<f64>,

    work_data: Vec<(usize, f64)>,
    work_group: Vec<usize>,

    sorted_data: Vec<(usize, f64)>,
    sorted_group: Vec<usize>,

    work_theta: f64,
}

impl DualRow {
    /// Empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the packed row.
    pub fn clear(&mut self) {
        self.pack_index.clear();
        self.pack_value.clear();
    }

    /// Pack the nonzeros of a pivotal-row slice, offsetting variable
    /// ids by `offset` (used to map row positions onto logicals).
    pub fn pack_row(&mut self, row: &WorkVector, offset: usize) {
        for &i in &row.index {
            let value = row.array[i];
            if value != 0.0 {
                self.pack_index.push(i + offset);
                self.pack_value.push(value);
            }
        }
    }

    /// Packed entries as (variable, raw value) pairs.
    pub fn packed(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.pack_index
            .iter()
            .copied()
            .zip(self.pack_value.iter().copied())
    }

    /// Run the full selection.
    pub fn choose(&mut self, ctx: &ChuzcContext) -> ChuzcOutcome {
        if !self.choose_possible(ctx) {
            return ChuzcOutcome::Fail;
        }
        self.reduce_by_large_step(ctx);

        let use_heap = match ctx.sort_path {
            SortPath::Quadratic => false,
            SortPath::Heap => true,
            SortPath::Auto => self.work_data.len() >= ctx.sort_threshold,
        };

        let grouped = if use_heap {
            self.group_by_heap(ctx)
        } else {
            self.group_by_quad(ctx)
        };
        if !grouped {
            return ChuzcOutcome::Fail;
        }

        let (data, groups) = if use_heap {
            (&self.sorted_data[..], &self.sorted_group[..])
        } else {
            (&self.work_data[..], &self.work_group[..])
        };

        let (break_index, break_group) = match choose_large_alpha(data, groups, ctx.permutation)
        {
            Some(found) => found,
            None => return ChuzcOutcome::Fail,
        };

        let (variable, adjusted) = data[break_index];
        let move_in = ctx.nonbasic_move[variable] as f64;
        let alpha_row = adjusted * ctx.move_out as f64 * move_in;
        let dual = ctx.work_dual[variable];
        let theta_dual = if dual * move_in > 0.0 {
            dual / alpha_row
        } else {
            0.0
        };

        // Everything in the groups below the break becomes a bound flip.
        let mut flips = Vec::new();
        if theta_dual != 0.0 {
            for &(col, adj) in &data[..groups[break_group]] {
                let col_move = ctx.nonbasic_move[col] as f64;
                let range = ctx.work_range[col];
                debug_assert!(range.is_finite(), "flip candidate with infinite range");
                if !range.is_finite() {
                    continue;
                }
                // Verify the flip leaves the column dual feasible at its
                // opposite bound.
                let raw = adj * ctx.move_out as f64 * col_move;
                let new_dual = ctx.work_dual[col] - theta_dual * raw;
                if col_move * new_dual > ctx.dual_tolerance {
                    return ChuzcOutcome::Fail;
                }
                flips.push((col, col_move * range));
            }
        }

        ChuzcOutcome::Select(ChuzcSelection {
            variable,
            alpha_row,
            theta_dual,
            flips,
        })
    }

    /// Phase A: admit candidates whose adjusted magnitude clears the
    /// staged tolerance, tracking the smallest relaxed ratio.
    fn choose_possible(&mut self, ctx: &ChuzcContext) -> bool {
        let move_out = ctx.move_out as f64;
        self.work_theta = f64::INFINITY;
        self.work_data.clear();
        for (var, value) in self
            .pack_index
            .iter()
            .copied()
            .zip(self.pack_value.iter().copied())
        {
            let var_move = ctx.nonbasic_move[var];
            if var_move == MOVE_NONE {
                continue;
            }
            let alpha = value * move_out * var_move as f64;
            if alpha > ctx.possible_tolerance {
                self.work_data.push((var, alpha));
                let relax = ctx.work_dual[var] * var_move as f64 + ctx.dual_tolerance;
                if self.work_theta * alpha > relax {
                    self.work_theta = relax / alpha;
                }
            }
        }
        !self.work_data.is_empty()
    }

    /// Phase B first pass: shrink the candidate set by expanding the
    /// ratio threshold in decades until the possible bound-flip change
    /// covers the infeasibility.
    fn reduce_by_large_step(&mut self, ctx: &ChuzcContext) {
        let full_count = self.work_data.len();
        let total_delta = ctx.delta.abs();
        let mut kept = 0;
        let mut total_change = 0.0;
        let mut select_theta = 10.0 * self.work_theta + 1e-7;
        loop {
            for i in kept..full_count {
                let (var, alpha) = self.work_data[i];
                let tight = ctx.nonbasic_move[var] as f64 * ctx.work_dual[var];
                if alpha * select_theta >= tight {
                    self.work_data.swap(kept, i);
                    kept += 1;
                    total_change += ctx.work_range[var] * alpha;
                }
            }
            select_theta *= 10.0;
            if total_change >= total_delta || kept == full_count {
                break;
            }
        }
        self.work_data.truncate(kept);
    }

    /// Phase B/C quadratic path: grow the threshold group by group,
    /// swapping accepted candidates to the front in place.
    fn group_by_quad(&mut self, ctx: &ChuzcContext) -> bool {
        let full_count = self.work_data.len();
        let total_delta = ctx.delta.abs();
        let mut accepted = 0;
        let mut total_change = INITIAL_TOTAL_CHANGE;
        let mut select_theta = self.work_theta;
        self.work_group.clear();
        self.work_group.push(0);

        let mut prev_accepted = accepted;
        let mut prev_select_theta = select_theta;
        let mut prev_remain_theta = INITIAL_REMAIN_THETA;

        while select_theta < MAX_SELECT_THETA {
            let mut remain_theta = INITIAL_REMAIN_THETA;
            for i in accepted..full_count {
                let (var, value) = self.work_data[i];
                let dual = ctx.nonbasic_move[var] as f64 * ctx.work_dual[var];
                if dual <= select_theta * value {
                    self.work_data.swap(accepted, i);
                    accepted += 1;
                    total_change += value * ctx.work_range[var];
                } else if dual + ctx.dual_tolerance < remain_theta * value {
                    remain_theta = (dual + ctx.dual_tolerance) / value;
                }
            }
            self.work_group.push(accepted);
            select_theta = remain_theta;

            // No progress across a full pass means the thresholds are
            // stuck; give up rather than loop forever.
            if accepted == prev_accepted
                && prev_select_theta == select_theta
                && prev_remain_theta == remain_theta
            {
                return false;
            }
            prev_accepted = accepted;
            prev_select_theta = select_theta;
            prev_remain_theta = remain_theta;

            if total_change >= total_delta || accepted == full_count {
                break;
            }
        }
        self.work_group.len() > 1
    }

    /// Phase B/C heap path: sort all candidates by ratio, then cut the
    /// sorted run into the same groups.
    fn group_by_heap(&mut self, ctx: &ChuzcContext) -> bool {
        let total_delta = ctx.delta.abs();
        let mut select_theta = self.work_theta;

        let mut heap: Vec<(f64, usize)> = Vec::with_capacity(self.work_data.len());
        for (i, &(var, value)) in self.work_data.iter().enumerate() {
            let dual = ctx.nonbasic_move[var] as f64 * ctx.work_dual[var];
            let ratio = dual / value;
            if ratio < MAX_SELECT_THETA {
                heap.push((ratio, i));
            }
        }
        if heap.is_empty() {
            return false;
        }
        heap_sort_by_ratio(&mut heap);

        self.sorted_data.clear();
        self.sorted_group.clear();
        self.sorted_group.push(0);
        let mut total_change = INITIAL_TOTAL_CHANGE;
        let mut group_start = 0;
        for &(_, i) in &heap {
            let (var, value) = self.work_data[i];
            let dual = ctx.nonbasic_move[var] as f64 * ctx.work_dual[var];
            if dual > select_theta * value {
                // Breakpoint starts the next group.
                self.sorted_group.push(self.sorted_data.len());
                group_start = self.sorted_data.len();
                select_theta = (dual + ctx.dual_tolerance) / value;
                if total_change >= total_delta {
                    break;
                }
            }
            self.sorted_data.push((var, value));
            total_change += value * ctx.work_range[var];
        }
        if self.sorted_data.len() > group_start {
            self.sorted_group.push(self.sorted_data.len());
        }
        self.sorted_group.len() > 1
    }
}

/// Phase D: walk the groups from the largest ratios down and pick the
/// candidate of maximum magnitude, stopping at the first group whose
/// best magnitude clears 10% of the overall maximum (capped at one).
/// Ties break by the stable permutation.
fn choose_large_alpha(
    data: &[(usize, f64)],
    groups: &[usize],
    permutation: &[usize],
) -> Option<(usize, usize)> {
    let count = *groups.last()?;
    let mut final_compare = 0.0f64;
    for &(_, value) in &data[..count] {
        final_compare = final_compare.max(value);
    }
    let final_compare = (0.1 * final_compare).min(1.0);

    let group_count = groups.len() - 1;
    for group in (0..group_count).rev() {
        let mut best_value = 0.0f64;
        let mut best_index = None;
        for i in groups[group]..groups[group + 1] {
            let (var, value) = data[i];
            match best_index {
                None => {
                    best_value = value;
                    best_index = Some(i);
                }
                Some(at) => {
                    if value > best_value {
                        best_value = value;
                        best_index = Some(i);
                    } else if value == best_value && permutation[var] < permutation[data[at].0]
                    {
                        best_index = Some(i);
                    }
                }
            }
        }
        if let Some(at) = best_index {
            if best_value > final_compare {
                return Some((at, group));
            }
        }
    }
    None
}

/// In-place max-heap sort ascending by ratio.
fn heap_sort_by_ratio(entries: &mut [(f64, usize)]) {
    let n = entries.len();
    for start in (0..n / 2).rev() {
        sift_down(entries, start, n);
    }
    for end in (1..n).rev() {
        entries.swap(0, end);
        sift_down(entries, 0, end);
    }
}

fn sift_down(entries: &mut [(f64, usize)], mut root: usize, end: usize) {
    loop {
        let mut child = 2 * root + 1;
        if child >= end {
            return;
        }
        if child + 1 < end && entries[child].0 < entries[child + 1].0 {
            child += 1;
        }
        if entries[root].0 >= entries[child].0 {
            return;
        }
        entries.swap(root, child);
        root = child;
    }
}
