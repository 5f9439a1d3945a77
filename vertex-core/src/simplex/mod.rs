//! Revised dual simplex engine.

pub mod dual;
pub mod dual_row;
pub mod pricing;

pub use dual::DualSimplex;
pub use dual_row::{ChuzcContext, ChuzcOutcome, ChuzcSelection, DualRow, SortPath};
pub use pricing::EdgeWeights;
