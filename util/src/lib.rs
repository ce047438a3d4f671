//! Test helpers shared by the crates of the workspace.

use nalgebra::DMatrix;

/// Largest entrywise difference, relative to the largest magnitude in either matrix.
///
/// Returns zero for two empty (or all-zero) matrices.
pub fn max_relative_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "Matrices must have the same shape");
    let scale = a.amax().max(b.amax());
    if scale == 0.0 {
        return 0.0;
    }
    (a - b).amax() / scale
}

/// Checks whether `m` equals its transpose exactly.
pub fn is_exactly_symmetric(m: &DMatrix<f64>) -> bool {
    m.nrows() == m.ncols() && (0..m.nrows()).all(|i| (0..i).all(|j| m[(i, j)] == m[(j, i)]))
}
