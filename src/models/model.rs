//! Saturation (Michaelis–Menten) model evaluation.
//!
//! ```text
//! y(t) = MTPMemax * t / (K + t)
//! ```
//!
//! The solvers rely on two primitive operations:
//! - predict `y(t)` given the parameters (for residuals/plots)
//! - fill a Jacobian row `(∂y/∂MTPMemax, ∂y/∂K)` for a given time
//!
//! The curve has a pole at `t = -K`. Nothing here guards against it: callers get a
//! non-finite value and treat the parameter set as infeasible.

use crate::domain::FitResult;

/// Predict `y(t)` for plateau `mtpm_emax` and half-time `k`.
pub fn predict(t: f64, mtpm_emax: f64, k: f64) -> f64 {
    mtpm_emax * t / (k + t)
}

/// Fill the Jacobian row of `y(t)` with respect to `(MTPMemax, K)`.
pub fn fill_jacobian_row(t: f64, mtpm_emax: f64, k: f64, out: &mut [f64; 2]) {
    let denom = k + t;
    out[0] = t / denom;
    out[1] = -mtpm_emax * t / (denom * denom);
}

/// Sample the fitted curve on `[0, t_max]` at `n` evenly spaced times.
///
/// Returns `None` for unfit results or a degenerate range.
pub fn sample_prediction(fit: &FitResult, t_max: f64, n: usize) -> Option<Vec<(f64, f64)>> {
    let (mtpm_emax, k) = fit.coefficients()?;
    if !(t_max.is_finite() && t_max > 0.0) {
        return None;
    }
    let n = n.max(2);
    let out = (0..n)
        .map(|i| {
            let t = t_max * i as f64 / (n as f64 - 1.0);
            (t, predict(t, mtpm_emax, k))
        })
        .collect();
    Some(out)
}
