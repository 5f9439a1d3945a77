//! Solution bundle and solve status types.

/// Final status of an LP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal solution found.
    Optimal,

    /// The problem is infeasible.
    Infeasible,

    /// The problem is unbounded.
    Unbounded,

    /// Iteration limit reached; the bundle holds the last iterate.
    IterationLimit,

    /// Time limit reached or cancellation requested; the bundle holds
    /// the last iterate.
    TimeLimit,

    /// Unrecoverable numerical failure.
    Error,
}

impl SolveStatus {
    /// True when the solve ended before reaching a conclusion, so the
    /// attached values are a partial iterate rather than a certificate.
    pub fn is_partial(&self) -> bool {
        matches!(self, SolveStatus::IterationLimit | SolveStatus::TimeLimit)
    }
}

/// Basis status of a single variable or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStatus {
    /// In the basis.
    Basic,

    /// Nonbasic at its lower bound.
    Lower,

    /// Nonbasic at its upper bound.
    Upper,

    /// Nonbasic free variable, held at zero.
    Zero,

    /// Nonbasic with no preferred bound (fixed or otherwise pinned).
    Nonbasic,
}

impl VarStatus {
    /// Encoding used by the textual basis file.
    pub fn to_code(self) -> u8 {
        match self {
            VarStatus::Basic => 0,
            VarStatus::Lower => 1,
            VarStatus::Upper => 2,
            VarStatus::Zero => 3,
            VarStatus::Nonbasic => 4,
        }
    }

    /// Decode a basis-file status integer.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(VarStatus::Basic),
            1 => Some(VarStatus::Lower),
            2 => Some(VarStatus::Upper),
            3 => Some(VarStatus::Zero),
            4 => Some(VarStatus::Nonbasic),
            _ => None,
        }
    }
}

/// A basis described by per-column and per-row statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basis {
    /// Status of each structural column.
    pub col_status: Vec<VarStatus>,

    /// Status of each row's logical variable.
    pub row_status: Vec<VarStatus>,
}

impl Basis {
    /// An all-logical basis: every column nonbasic at lower, every row
    /// logical basic.
    pub fn logical(num_col: usize, num_row: usize) -> Self {
        Self {
            col_status: vec![VarStatus::Lower; num_col],
            row_status: vec![VarStatus::Basic; num_row],
        }
    }

    /// Number of basic entries across columns and rows.
    pub fn num_basic(&self) -> usize {
        self.col_status
            .iter()
            .chain(self.row_status.iter())
            .filter(|&&s| s == VarStatus::Basic)
            .count()
    }
}

/// Solution bundle returned by every solve.
///
/// Always populated: on limit or error statuses the values are the last
/// iterate and [`SolveStatus::is_partial`] flags them as such.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Solve status.
    pub status: SolveStatus,

    /// Primal values of the structural columns.
    pub col_value: Vec<f64>,

    /// Reduced costs of the structural columns.
    pub col_dual: Vec<f64>,

    /// Row activities `A x`.
    pub row_value: Vec<f64>,

    /// Row dual values.
    pub row_dual: Vec<f64>,

    /// Objective value in the caller's sense.
    pub objective: f64,

    /// Final basis.
    pub basis: Basis,

    /// Simplex iterations used.
    pub iteration_count: u64,

    /// Wall-clock seconds used.
    pub solve_time: f64,
}

impl Solution {
    /// An empty bundle for the given dimensions and status.
    pub fn empty(num_col: usize, num_row: usize, status: SolveStatus) -> Self {
        Self {
            status,
            col_value: vec![0.0; num_col],
            col_dual: vec![0.0; num_col],
            row_value: vec![0.0; num_row],
            row_dual: vec![0.0; num_row],
            objective: 0.0,
            basis: Basis::logical(num_col, num_row),
            iteration_count: 0,
            solve_time: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            VarStatus::Basic,
            VarStatus::Lower,
            VarStatus::Upper,
            VarStatus::Zero,
            VarStatus::Nonbasic,
        ] {
            assert_eq!(VarStatus::from_code(status.to_code()), Some(status));
        }
        assert_eq!(VarStatus::from_code(5), None);
    }

    #[test]
    fn logical_basis_counts() {
        let basis = Basis::logical(3, 2);
        assert_eq!(basis.num_basic(), 2);
    }

    #[test]
    fn partial_statuses() {
        assert!(SolveStatus::TimeLimit.is_partial());
        assert!(SolveStatus::IterationLimit.is_partial());
        assert!(!SolveStatus::Optimal.is_partial());
    }
}
