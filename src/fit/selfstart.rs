//! Self-starting values for the bounded stage.
//!
//! The saturation curve linearizes under the Hanes–Woolf transform:
//!
//! ```text
//! t / y = K / MTPMemax + t / MTPMemax
//! ```
//!
//! so a straight-line regression of `t/y` on `t` over the follow-up visits gives
//! `MTPMemax0 = 1 / slope` and `K0 = intercept · MTPMemax0`. The baseline visit
//! (and any zero measurement) is left out of the regression.
//!
//! A noisy early visit can flip the sign of that slope even when the data clearly
//! saturates. [`self_start`] then falls back to a log-spaced grid over `K`; for a
//! fixed `K` the model is linear in `MTPMemax`, which has a closed-form solution.

use nalgebra::{DMatrix, DVector};

use crate::domain::Series;
use crate::math::{RANK_RCOND, has_full_column_rank, solve_least_squares};

/// Grid points per `K` search.
const GRID_STEPS: usize = 61;
/// `K` grid spans `[GRID_LOW, GRID_HIGH] · max(t)`.
const GRID_LOW: f64 = 1e-3;
const GRID_HIGH: f64 = 1e3;

/// Starting values for the bounded stage: Hanes–Woolf, else the `K` grid.
///
/// `None` only when no positive plateau fits the data for any grid `K`.
pub fn self_start(series: &Series) -> Option<(f64, f64)> {
    hanes_woolf_start(series).or_else(|| grid_start(series))
}

/// Starting values `(MTPMemax0, K0)` from the Hanes–Woolf regression.
///
/// `K0` may come out negative; the bounded stage projects it into its box.
/// Returns `None` when fewer than two usable visits exist or the slope is not positive.
pub fn hanes_woolf_start(series: &Series) -> Option<(f64, f64)> {
    let usable: Vec<(f64, f64)> = series
        .observations()
        .iter()
        .filter(|o| o.time > 0.0 && o.measurement > 0.0)
        .map(|o| (o.time, o.measurement))
        .collect();
    if usable.len() < 2 {
        return None;
    }

    let n = usable.len();
    let mut x = DMatrix::<f64>::zeros(n, 2);
    let mut rhs = DVector::<f64>::zeros(n);
    for (i, &(t, y)) in usable.iter().enumerate() {
        x[(i, 0)] = 1.0;
        x[(i, 1)] = t;
        rhs[i] = t / y;
    }
    if !has_full_column_rank(&x, RANK_RCOND) {
        return None;
    }

    let beta = solve_least_squares(&x, &rhs)?;
    let (intercept, slope) = (beta[0], beta[1]);
    if !(slope.is_finite() && slope > 0.0) {
        return None;
    }

    let mtpm_emax = 1.0 / slope;
    let k = intercept * mtpm_emax;
    if mtpm_emax.is_finite() && k.is_finite() {
        Some((mtpm_emax, k))
    } else {
        None
    }
}

/// Best `(MTPMemax0, K0)` over a log-spaced `K` grid.
///
/// For each `K`, `g_i = t_i / (K + t_i)` and `MTPMemax = Σ g·y / Σ g²`. Candidates with
/// a non-positive plateau are skipped; the lowest SSE wins (first one on ties).
pub fn grid_start(series: &Series) -> Option<(f64, f64)> {
    let t_max = series.max_time();
    if !(t_max.is_finite() && t_max > 0.0) {
        return None;
    }

    let ln_low = (GRID_LOW * t_max).ln();
    let ln_step = (GRID_HIGH / GRID_LOW).ln() / (GRID_STEPS as f64 - 1.0);

    let mut best: Option<(f64, f64, f64)> = None;
    for i in 0..GRID_STEPS {
        let k = (ln_low + ln_step * i as f64).exp();
        let (mut gy, mut gg) = (0.0, 0.0);
        for o in series.observations() {
            let g = o.time / (k + o.time);
            gy += g * o.measurement;
            gg += g * g;
        }
        if gg <= 0.0 {
            continue;
        }
        let mtpm_emax = gy / gg;
        if !(mtpm_emax.is_finite() && mtpm_emax > 0.0) {
            continue;
        }

        let sse: f64 = series
            .observations()
            .iter()
            .map(|o| {
                let r = o.measurement - mtpm_emax * o.time / (k + o.time);
                r * r
            })
            .sum();
        if best.is_none_or(|(_, _, best_sse)| sse < best_sse) {
            best = Some((mtpm_emax, k, sse));
        }
    }

    best.map(|(mtpm_emax, k, _)| (mtpm_emax, k))
}
