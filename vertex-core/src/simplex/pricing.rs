//! Row pricing weights.
//!
//! Dual steepest-edge keeps exact reference weights via the standard
//! recurrence and needs one extra FTRAN per iteration; Devex
//! approximates with max-ratio updates and a framework reset when the
//! weights drift too far.

use crate::problem::EdgeWeightStrategy;
use crate::sparse::WorkVector;

/// Weights never fall below this.
const MIN_WEIGHT: f64 = 1e-4;

/// Devex framework is restarted above this weight.
const DEVEX_RESET_WEIGHT: f64 = 1e7;

/// Per-row pricing weights for CHUZR.
#[derive(Debug, Clone)]
pub struct EdgeWeights {
    strategy: EdgeWeightStrategy,
    weights: Vec<f64>,
}

impl EdgeWeights {
    /// Unit weights for an m-row basis.
    pub fn new(strategy: EdgeWeightStrategy, num_row: usize) -> Self {
        Self {
            strategy,
            weights: vec![1.0; num_row],
        }
    }

    /// Reset all weights to one (cold start or Devex framework reset).
    pub fn reset(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 1.0);
    }

    /// Weight of a row.
    #[inline]
    pub fn weight(&self, row: usize) -> f64 {
        self.weights[row]
    }

    /// True if the update step needs `tau = B^-1 row_ep`.
    pub fn needs_tau(&self) -> bool {
        self.strategy == EdgeWeightStrategy::SteepestEdge
    }

    /// Apply the pivot `(row_out, alpha = B^-1 A_q)` to the weights.
    ///
    /// For steepest-edge, `tau` must hold `B^-1 row_ep`; Devex ignores
    /// it.
    pub fn update(
        &mut self,
        row_out: usize,
        col_aq: &WorkVector,
        tau: Option<&WorkVector>,
        alpha_pivot: f64,
    ) {
        let w_out = self.weights[row_out];
        match self.strategy {
            EdgeWeightStrategy::SteepestEdge => {
                let tau = tau.expect("steepest edge requires tau");
                for &i in &col_aq.index {
                    if i == row_out {
                        continue;
                    }
                    let ratio = col_aq.array[i] / alpha_pivot;
                    let updated =
                        self.weights[i] - 2.0 * ratio * tau.array[i] + ratio * ratio * w_out;
                    self.weights[i] = updated.max(MIN_WEIGHT);
                }
                self.weights[row_out] = (w_out / (alpha_pivot * alpha_pivot)).max(MIN_WEIGHT);
            }
            EdgeWeightStrategy::Devex => {
                let reference = w_out.max(1.0);
                let mut max_weight = 0.0f64;
                for &i in &col_aq.index {
                    if i == row_out {
                        continue;
                    }
                    let ratio = col_aq.array[i] / alpha_pivot;
                    let candidate = ratio * ratio * reference;
                    if candidate > self.weights[i] {
                        self.weights[i] = candidate;
                    }
                    max_weight = max_weight.max(self.weights[i]);
                }
                self.weights[row_out] =
                    (reference / (alpha_pivot * alpha_pivot)).max(1.0);
                max_weight = max_weight.max(self.weights[row_out]);
                if max_weight > DEVEX_RESET_WEIGHT {
                    self.reset();
                }
            }
        }
    }
}
