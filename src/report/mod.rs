//! Reporting utilities: residuals and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{FitResult, Series};
use crate::models::predict;

/// Observed vs fitted value at one follow-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub time: f64,
    pub observed: f64,
    pub fitted: f64,
    pub residual: f64,
}

/// Fitted values and residuals for each observation, or `None` for an unfit curve.
pub fn compute_residuals(series: &Series, fit: &FitResult) -> Option<Vec<Residual>> {
    let (mtpm_emax, k) = fit.coefficients()?;
    let out = series
        .observations()
        .iter()
        .map(|o| {
            let fitted = predict(o.time, mtpm_emax, k);
            Residual {
                time: o.time,
                observed: o.measurement,
                fitted,
                residual: o.measurement - fitted,
            }
        })
        .collect();
    Some(out)
}
