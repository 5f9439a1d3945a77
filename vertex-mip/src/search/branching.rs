//! Branching variable selection.

use super::pseudocost::Pseudocost;
use crate::model::MipProblem;

/// Offset added to pseudocost estimates so zero-history columns still
/// differentiate by fractionality.
const SCORE_OFFSET: f64 = 1e-6;

/// The column chosen to branch on.
#[derive(Debug, Clone, Copy)]
pub struct BranchDecision {
    /// Column to branch on.
    pub col: usize,

    /// Current (fractional) value.
    pub value: f64,

    /// Fractional part of the value.
    pub frac: f64,

    /// Score of this decision.
    pub score: f64,
}

/// Pseudocost-driven branching variable selector.
pub struct BranchingSelector {
    pseudocost: Pseudocost,
}

impl BranchingSelector {
    /// Selector with fresh statistics.
    pub fn new(num_col: usize, reliability: u32) -> Self {
        Self {
            pseudocost: Pseudocost::new(num_col, reliability),
        }
    }

    /// Statistics, for recording observations.
    pub fn pseudocost_mut(&mut self) -> &mut Pseudocost {
        &mut self.pseudocost
    }

    /// Read-only statistics.
    pub fn pseudocost(&self) -> &Pseudocost {
        &self.pseudocost
    }

    /// Select the fractional integer column of maximum score.
    ///
    /// Returns `None` when `x` is integer feasible.
    pub fn select(&self, x: &[f64], prob: &MipProblem, tol: f64) -> Option<BranchDecision> {
        let fractional = prob.fractional_vars(x, tol);
        if fractional.is_empty() {
            return None;
        }

        fractional
            .iter()
            .map(|&(col, value, frac)| BranchDecision {
                col,
                value,
                frac,
                score: self.pseudocost.score(col, frac, SCORE_OFFSET),
            })
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}
