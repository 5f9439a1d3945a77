//! Sparse kernel: working vectors and the simplex constraint matrix.

pub mod matrix;
pub mod work_vector;

pub use matrix::SimplexMatrix;
pub use work_vector::WorkVector;
