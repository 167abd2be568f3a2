//! Linear algebra type system for cross mapping
//!
//! Dynamic nalgebra aliases shared by the interpolator and the session.
//! Dimensions are only known once trackers are bound, so everything here is
//! dynamically sized.

use nalgebra::{DMatrix, RowDVector};

// ===== Pose Types =====
pub type Pose = Vec<f64>;

// ===== Regression Types =====
pub type KernelMatrix = DMatrix<f64>; // N×N Gram matrix
pub type TargetMatrix = DMatrix<f64>; // N×D_out stacked targets
pub type WeightMatrix = DMatrix<f64>; // N×D_out fitted weights
pub type KernelRow = RowDVector<f64>; // 1×N query kernel values

// ===== Solver Defaults =====
pub const DEFAULT_SIGMA: f64 = 1.0;
pub const DEFAULT_RCOND_TOLERANCE: f64 = 1e-10;

/// Stack equal-length rows into a dense matrix (row i = rows[i]).
pub fn stack_rows(rows: &[Pose], cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols, |i, j| rows[i][j])
}

/// Euclidean distance between two equal-length poses.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Squared Euclidean distance between two equal-length poses.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (y - x).powi(2)).sum()
}
