//! Small dense least squares helpers.
//!
//! Both solver stages repeatedly solve tiny linear problems of the form:
//!
//! ```text
//! minimize ‖A x - b‖²
//! ```
//!
//! where `A` has one row per observation (plus damping rows for Levenberg–Marquardt)
//! and two columns. The Hanes–Woolf self-start uses the same helper for its
//! straight-line regression.
//!
//! Implementation choices:
//! - We use SVD so that tall (non-square) systems are handled directly.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Singular values are cut off *relative* to the largest one. Migration data is
//!   recorded in millimetres or micrometres, so absolute cut-offs would behave
//!   differently depending on the unit.

use nalgebra::{DMatrix, DVector};

/// Relative singular-value threshold below which a matrix is treated as rank-deficient.
pub const RANK_RCOND: f64 = 1e-10;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }

    // Try progressively looser tolerances if strict solve fails.
    for &rel in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, rel * s_max) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Whether `x` has full column rank under a relative singular-value threshold.
pub fn has_full_column_rank(x: &DMatrix<f64>, rcond: f64) -> bool {
    if x.nrows() < x.ncols() {
        return false;
    }
    let singular = x.singular_values();
    let s_max = singular.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return false;
    }
    singular.iter().all(|&s| s > rcond * s_max)
}

/// Inverse of `XᵀX` for a full-rank design, used for parameter standard errors.
pub fn normal_inverse(x: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let xtx = x.transpose() * x;
    let inv = xtx.try_inverse()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn least_squares_is_unit_invariant() {
        // Same line, measurements scaled down to micro-units.
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2e-6, 5e-6, 8e-6]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2e-6).abs() < 1e-16);
        assert!((beta[1] - 3e-6).abs() < 1e-16);
    }

    #[test]
    fn rank_check_detects_collinear_columns() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert!(!has_full_column_rank(&x, RANK_RCOND));

        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        assert!(has_full_column_rank(&x, RANK_RCOND));
    }

    #[test]
    fn rank_check_rejects_wide_matrices() {
        let x = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        assert!(!has_full_column_rank(&x, RANK_RCOND));
    }

    #[test]
    fn normal_inverse_of_identity_design() {
        let x = DMatrix::<f64>::identity(2, 2);
        let inv = normal_inverse(&x).unwrap();
        assert!((inv[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(inv[(0, 1)].abs() < 1e-12);
    }
}
