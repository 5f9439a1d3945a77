//! Pseudocost statistics for branching.
//!
//! Per column and direction, the running mean of objective change per
//! unit of fractionality resolved, updated with Welford's recurrence,
//! together with inference and cutoff counters and their global totals.

/// Online pseudocost, inference and cutoff statistics.
#[derive(Debug, Clone)]
pub struct Pseudocost {
    pseudocost_up: Vec<f64>,
    pseudocost_down: Vec<f64>,
    nsamples_up: Vec<u32>,
    nsamples_down: Vec<u32>,

    inferences_up: Vec<f64>,
    inferences_down: Vec<f64>,
    ninferences_up: Vec<u32>,
    ninferences_down: Vec<u32>,

    ncutoffs_up: Vec<u32>,
    ncutoffs_down: Vec<u32>,

    cost_total: f64,
    inferences_total: f64,
    nsamples_total: u64,
    ninferences_total: u64,
    ncutoffs_total: u64,

    min_reliable: u32,
}

impl Pseudocost {
    /// Zeroed statistics for `num_col` columns.
    pub fn new(num_col: usize, min_reliable: u32) -> Self {
        Self {
            pseudocost_up: vec![0.0; num_col],
            pseudocost_down: vec![0.0; num_col],
            nsamples_up: vec![0; num_col],
            nsamples_down: vec![0; num_col],
            inferences_up: vec![0.0; num_col],
            inferences_down: vec![0.0; num_col],
            ninferences_up: vec![0; num_col],
            ninferences_down: vec![0; num_col],
            ncutoffs_up: vec![0; num_col],
            ncutoffs_down: vec![0; num_col],
            cost_total: 0.0,
            inferences_total: 0.0,
            nsamples_total: 0,
            ninferences_total: 0,
            ncutoffs_total: 0,
            min_reliable: min_reliable.max(1),
        }
    }

    /// Samples observed for a column, both directions.
    pub fn num_observations(&self, col: usize) -> u32 {
        self.nsamples_up[col] + self.nsamples_down[col]
    }

    /// Record an objective gain: `delta` is the (signed) change in the
    /// branched variable, `objdelta` the nonnegative objective increase.
    pub fn add_observation(&mut self, col: usize, delta: f64, objdelta: f64) {
        debug_assert!(delta != 0.0);
        debug_assert!(objdelta >= 0.0);
        let unit_gain = if delta > 0.0 {
            objdelta / delta
        } else {
            -objdelta / delta
        };
        if delta > 0.0 {
            self.nsamples_up[col] += 1;
            let d = unit_gain - self.pseudocost_up[col];
            self.pseudocost_up[col] += d / self.nsamples_up[col] as f64;
        } else {
            self.nsamples_down[col] += 1;
            let d = unit_gain - self.pseudocost_down[col];
            self.pseudocost_down[col] += d / self.nsamples_down[col] as f64;
        }
        self.nsamples_total += 1;
        let d = unit_gain - self.cost_total;
        self.cost_total += d / self.nsamples_total as f64;
    }

    /// Record a cutoff (child pruned by bound or infeasible).
    pub fn add_cutoff_observation(&mut self, col: usize, up_branch: bool) {
        self.ncutoffs_total += 1;
        if up_branch {
            self.ncutoffs_up[col] += 1;
        } else {
            self.ncutoffs_down[col] += 1;
        }
    }

    /// Record the number of inferences a branch produced.
    pub fn add_inference_observation(&mut self, col: usize, ninferences: u32, up_branch: bool) {
        self.ninferences_total += 1;
        let d = ninferences as f64 - self.inferences_total;
        self.inferences_total += d / self.ninferences_total as f64;
        if up_branch {
            self.ninferences_up[col] += 1;
            let d = ninferences as f64 - self.inferences_up[col];
            self.inferences_up[col] += d / self.ninferences_up[col] as f64;
        } else {
            self.ninferences_down[col] += 1;
            let d = ninferences as f64 - self.inferences_down[col];
            self.inferences_down[col] += d / self.ninferences_down[col] as f64;
        }
    }

    /// A column is reliable once both directions carry enough samples.
    pub fn is_reliable(&self, col: usize) -> bool {
        self.nsamples_up[col].min(self.nsamples_down[col]) >= self.min_reliable
    }

    /// Global mean unit gain.
    pub fn avg_pseudocost(&self) -> f64 {
        self.cost_total
    }

    /// Estimated up-gain for a column at fractional part `frac`,
    /// blending unreliable column means toward the global mean.
    pub fn pseudocost_up(&self, col: usize, frac: f64, offset: f64) -> f64 {
        let up = 1.0 - frac;
        let n = self.nsamples_up[col];
        let cost = if n < self.min_reliable {
            let weight = if n == 0 {
                0.0
            } else {
                0.75 + 0.25 * n as f64 / self.min_reliable as f64
            };
            weight * self.pseudocost_up[col] + (1.0 - weight) * self.cost_total
        } else {
            self.pseudocost_up[col]
        };
        up * (offset + cost)
    }

    /// Estimated down-gain for a column at fractional part `frac`.
    pub fn pseudocost_down(&self, col: usize, frac: f64, offset: f64) -> f64 {
        let down = frac;
        let n = self.nsamples_down[col];
        let cost = if n < self.min_reliable {
            let weight = if n == 0 {
                0.0
            } else {
                0.75 + 0.25 * n as f64 / self.min_reliable as f64
            };
            weight * self.pseudocost_down[col] + (1.0 - weight) * self.cost_total
        } else {
            self.pseudocost_down[col]
        };
        down * (offset + cost)
    }

    /// Branching score combining cost, inference and cutoff signals.
    pub fn score(&self, col: usize, frac: f64, offset: f64) -> f64 {
        let up_cost = self.pseudocost_up(col, frac, offset);
        let down_cost = self.pseudocost_down(col, frac, offset);
        let cost_score = (up_cost * down_cost).sqrt() / self.cost_total.max(1e-6);

        let inference_score = (self.inferences_up[col] * self.inferences_down[col]).sqrt()
            / self.inferences_total.max(1e-6);

        let cutoff_rate_up = self.ncutoffs_up[col] as f64
            / (self.ncutoffs_up[col] + self.nsamples_up[col]).max(1) as f64;
        let cutoff_rate_down = self.ncutoffs_down[col] as f64
            / (self.ncutoffs_down[col] + self.nsamples_down[col]).max(1) as f64;
        let avg_cutoff_rate = self.ncutoffs_total as f64
            / (self.nsamples_total + self.ncutoffs_total).max(1) as f64;
        let cutoff_score = (cutoff_rate_up * cutoff_rate_down).sqrt() / avg_cutoff_rate.max(1e-6);

        let map_score = |score: f64| 1.0 - 1.0 / (1.0 + score);

        map_score(cost_score) + 1e-4 * (map_score(cutoff_score) + map_score(inference_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_mean_matches_arithmetic_mean() {
        let mut pc = Pseudocost::new(1, 8);
        let gains = [2.0, 4.0, 9.0, 1.0, 6.5];
        for &g in &gains {
            // delta = +1 so the unit gain equals the observation.
            pc.add_observation(0, 1.0, g);
        }
        let mean: f64 = gains.iter().sum::<f64>() / gains.len() as f64;
        assert!((pc.pseudocost_up[0] - mean).abs() < 1e-12);
        assert!((pc.avg_pseudocost() - mean).abs() < 1e-12);
    }

    #[test]
    fn unit_gain_scales_by_delta() {
        let mut pc = Pseudocost::new(1, 8);
        // Up move of 0.5 gaining 1.0 means 2.0 per unit.
        pc.add_observation(0, 0.5, 1.0);
        assert!((pc.pseudocost_up[0] - 2.0).abs() < 1e-12);
        // Down move of -0.25 gaining 1.0 means 4.0 per unit.
        pc.add_observation(0, -0.25, 1.0);
        assert!((pc.pseudocost_down[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn reliability_needs_both_directions() {
        let mut pc = Pseudocost::new(1, 2);
        pc.add_observation(0, 1.0, 1.0);
        pc.add_observation(0, 1.0, 1.0);
        assert!(!pc.is_reliable(0));
        pc.add_observation(0, -1.0, 1.0);
        pc.add_observation(0, -1.0, 1.0);
        assert!(pc.is_reliable(0));
    }

    #[test]
    fn zero_sample_columns_use_global_mean() {
        let mut pc = Pseudocost::new(2, 8);
        pc.add_observation(0, 1.0, 4.0);
        // Column 1 has no samples: estimate comes from the global mean.
        let estimate = pc.pseudocost_up(1, 0.5, 0.0);
        assert!((estimate - 0.5 * 4.0).abs() < 1e-12);
    }

    #[test]
    fn blending_weight_grows_with_samples() {
        let mut pc = Pseudocost::new(2, 4);
        // Global mean dominated by a large gain on column 1.
        for _ in 0..10 {
            pc.add_observation(1, 1.0, 10.0);
        }
        // One small sample on column 0: blended estimate sits between
        // the column mean and the global mean.
        pc.add_observation(0, 1.0, 1.0);
        let estimate = pc.pseudocost_up(0, 0.0, 0.0);
        assert!(estimate > 1.0 && estimate < 10.0);
    }

    #[test]
    fn score_prefers_observed_gains() {
        let mut pc = Pseudocost::new(2, 1);
        pc.add_observation(0, 1.0, 10.0);
        pc.add_observation(0, -1.0, 10.0);
        pc.add_observation(1, 1.0, 0.1);
        pc.add_observation(1, -1.0, 0.1);
        assert!(pc.score(0, 0.5, 1e-6) > pc.score(1, 0.5, 1e-6));
    }

    #[test]
    fn cutoff_counts_are_monotone() {
        let mut pc = Pseudocost::new(1, 8);
        pc.add_cutoff_observation(0, true);
        pc.add_cutoff_observation(0, false);
        assert_eq!(pc.ncutoffs_up[0], 1);
        assert_eq!(pc.ncutoffs_down[0], 1);
        assert_eq!(pc.ncutoffs_total, 2);
    }
}
