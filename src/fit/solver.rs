//! Iterative nonlinear least squares for the saturation curve.
//!
//! Two solvers live here:
//!
//! - [`levenberg_marquardt`]: bounded (projected) LM with Marquardt scaling. Both
//!   parameters are kept above small positive floors.
//! - [`gauss_newton`]: unconstrained Gauss–Newton with step halving and a
//!   relative-offset convergence test. `K` is free to go negative.
//!
//! Both return `Result<Converged, StageFailure>`; every numerical problem (pole hits,
//! singular gradients, stalls, iteration limits) becomes a `StageFailure`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{Parameter, Series, StageFailure};
use crate::math::{RANK_RCOND, has_full_column_rank, solve_least_squares};
use crate::models::{fill_jacobian_row, predict};

/// Initial Levenberg–Marquardt damping (dimensionless, Marquardt-scaled).
const LM_LAMBDA_INIT: f64 = 1e-3;
const LM_LAMBDA_MIN: f64 = 1e-12;
/// Damping above this means no step reduces the residual any more.
const LM_LAMBDA_MAX: f64 = 1e16;
/// Relative slack when deciding that a parameter sits on its floor.
const BOUND_SLACK: f64 = 1e-6;

/// Solver limits and tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Iteration limit of the bounded stage.
    pub max_iterations: usize,
    /// Iteration limit of the unconstrained stage.
    pub gauss_newton_max_iterations: usize,
    /// Relative parameter change that counts as converged (bounded stage).
    pub param_tol: f64,
    /// Relative SSE decrease that counts as converged (bounded stage).
    pub sse_tol: f64,
    /// Relative-offset threshold (unconstrained stage).
    pub offset_tol: f64,
    /// Smallest step factor tried before the unconstrained stage gives up.
    pub min_step_factor: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gauss_newton_max_iterations: 50,
            param_tol: 1e-8,
            sse_tol: 1e-12,
            offset_tol: 1e-5,
            min_step_factor: 1.0 / 1024.0,
        }
    }
}

/// Column order of the Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOrder {
    /// `(MTPMemax, K)`
    PlateauFirst,
    /// `(K, MTPMemax)`
    HalfTimeFirst,
}

/// A converged solver run, always reported as `(MTPMemax, K)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Converged {
    pub mtpm_emax: f64,
    pub k: f64,
    pub sse: f64,
    pub iterations: usize,
    pub start_mtpm_emax: f64,
    pub start_k: f64,
}

/// Observation arrays extracted once per series.
#[derive(Debug, Clone)]
pub struct Problem {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl Problem {
    pub fn from_series(series: &Series) -> Self {
        Self {
            times: series.times().collect(),
            values: series.measurements().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Sum of squared residuals; `+∞` if any prediction is non-finite.
    pub fn sse(&self, mtpm_emax: f64, k: f64) -> f64 {
        let mut sse = 0.0;
        for (&t, &y) in self.times.iter().zip(&self.values) {
            let r = y - predict(t, mtpm_emax, k);
            sse += r * r;
        }
        if sse.is_finite() { sse } else { f64::INFINITY }
    }

    pub fn residuals(&self, mtpm_emax: f64, k: f64) -> DVector<f64> {
        DVector::from_iterator(
            self.len(),
            self.times
                .iter()
                .zip(&self.values)
                .map(|(&t, &y)| y - predict(t, mtpm_emax, k)),
        )
    }

    pub fn jacobian(&self, mtpm_emax: f64, k: f64, order: ParamOrder) -> DMatrix<f64> {
        let mut jac = DMatrix::<f64>::zeros(self.len(), 2);
        let mut row = [0.0; 2];
        for (i, &t) in self.times.iter().enumerate() {
            fill_jacobian_row(t, mtpm_emax, k, &mut row);
            let (a, b) = match order {
                ParamOrder::PlateauFirst => (row[0], row[1]),
                ParamOrder::HalfTimeFirst => (row[1], row[0]),
            };
            jac[(i, 0)] = a;
            jac[(i, 1)] = b;
        }
        jac
    }
}

/// Lower bounds `(MTPMemax, K)` used by the bounded stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Floors {
    pub mtpm_emax: f64,
    pub k: f64,
}

impl Floors {
    /// Tiny positive floors scaled to the data so bounds are unit-independent.
    pub fn for_series(series: &Series) -> Self {
        let y_scale = series.max_abs_measurement().max(f64::MIN_POSITIVE);
        let t_scale = series.max_time().max(f64::MIN_POSITIVE);
        Self {
            mtpm_emax: 1e-8 * y_scale,
            k: 1e-8 * t_scale,
        }
    }
}

/// Projected Levenberg–Marquardt over `MTPMemax ≥ floor, K ≥ floor`.
///
/// A solution sitting on a floor is reported as `BoundActive`: the bounded optimum
/// is then not an interior solution and the half-time is not identified.
pub fn levenberg_marquardt(
    problem: &Problem,
    start: (f64, f64),
    floors: Floors,
    opts: &SolverOptions,
) -> Result<Converged, StageFailure> {
    let start_m = start.0.max(floors.mtpm_emax);
    let start_k = start.1.max(floors.k);
    let (mut m, mut k) = (start_m, start_k);

    let mut sse = problem.sse(m, k);
    if !sse.is_finite() {
        return Err(StageFailure::NonFiniteResidual);
    }

    let n = problem.len();
    let mut lambda = LM_LAMBDA_INIT;

    for iteration in 1..=opts.max_iterations {
        let jac = problem.jacobian(m, k, ParamOrder::PlateauFirst);
        if !has_full_column_rank(&jac, RANK_RCOND) {
            return Err(StageFailure::SingularGradient { iteration });
        }
        let resid = problem.residuals(m, k);
        let diag = [
            jac.column(0).norm_squared(),
            jac.column(1).norm_squared(),
        ];

        // Inner loop: raise damping until a step does not increase the SSE.
        loop {
            let mut aug = DMatrix::<f64>::zeros(n + 2, 2);
            aug.rows_mut(0, n).copy_from(&jac);
            aug[(n, 0)] = (lambda * diag[0]).sqrt();
            aug[(n + 1, 1)] = (lambda * diag[1]).sqrt();
            let mut rhs = DVector::<f64>::zeros(n + 2);
            rhs.rows_mut(0, n).copy_from(&resid);

            if let Some(step) = solve_least_squares(&aug, &rhs) {
                let m_new = (m + step[0]).max(floors.mtpm_emax);
                let k_new = (k + step[1]).max(floors.k);
                let sse_new = problem.sse(m_new, k_new);

                if sse_new.is_finite() && sse_new <= sse {
                    let small_step = (m_new - m).abs() <= opts.param_tol * (m.abs() + opts.param_tol)
                        && (k_new - k).abs() <= opts.param_tol * (k.abs() + opts.param_tol);
                    let small_gain = sse - sse_new <= opts.sse_tol * sse;

                    m = m_new;
                    k = k_new;
                    sse = sse_new;
                    lambda = (lambda / 10.0).max(LM_LAMBDA_MIN);

                    if small_step || small_gain {
                        if m <= floors.mtpm_emax * (1.0 + BOUND_SLACK) {
                            return Err(StageFailure::BoundActive {
                                parameter: Parameter::MtpmEmax,
                            });
                        }
                        if k <= floors.k * (1.0 + BOUND_SLACK) {
                            return Err(StageFailure::BoundActive {
                                parameter: Parameter::K,
                            });
                        }
                        return Ok(Converged {
                            mtpm_emax: m,
                            k,
                            sse,
                            iterations: iteration,
                            start_mtpm_emax: start_m,
                            start_k,
                        });
                    }
                    break;
                }
            }

            lambda *= 10.0;
            if lambda > LM_LAMBDA_MAX {
                return Err(StageFailure::Stalled { iteration });
            }
        }
    }

    Err(StageFailure::IterationLimit {
        limit: opts.max_iterations,
    })
}

/// Unconstrained Gauss–Newton with parameters ordered `(K, MTPMemax)`.
///
/// Convergence uses the relative offset `‖P r‖ / ‖(I − P) r‖`, where `P` projects
/// onto the Jacobian's column space. Zero-residual data has no defined offset and
/// therefore never converges.
pub fn gauss_newton(
    problem: &Problem,
    start: (f64, f64),
    opts: &SolverOptions,
) -> Result<Converged, StageFailure> {
    let (start_k, start_m) = start;
    let mut params = DVector::from_row_slice(&[start_k, start_m]);

    let mut sse = problem.sse(params[1], params[0]);
    if !sse.is_finite() {
        return Err(StageFailure::NonFiniteResidual);
    }

    for iteration in 1..=opts.gauss_newton_max_iterations {
        let (k, m) = (params[0], params[1]);
        let jac = problem.jacobian(m, k, ParamOrder::HalfTimeFirst);
        if !has_full_column_rank(&jac, RANK_RCOND) {
            return Err(StageFailure::SingularGradient { iteration });
        }
        let resid = problem.residuals(m, k);
        let increment = solve_least_squares(&jac, &resid)
            .ok_or(StageFailure::SingularGradient { iteration })?;

        let projected = &jac * &increment;
        let orthogonal = (&resid - &projected).norm();
        let offset = if orthogonal > 0.0 {
            projected.norm() / orthogonal
        } else {
            f64::INFINITY
        };
        if offset < opts.offset_tol {
            return Ok(Converged {
                mtpm_emax: m,
                k,
                sse,
                iterations: iteration - 1,
                start_mtpm_emax: start_m,
                start_k,
            });
        }

        let mut factor = 1.0;
        loop {
            let trial = &params + &increment * factor;
            let sse_trial = problem.sse(trial[1], trial[0]);
            // Non-finite SSE (pole crossed) compares false and halves the step.
            if sse_trial < sse {
                params = trial;
                sse = sse_trial;
                break;
            }
            factor /= 2.0;
            if factor < opts.min_step_factor {
                return Err(StageFailure::StepFactorTooSmall {
                    iteration,
                    min_factor: opts.min_step_factor,
                });
            }
        }
    }

    Err(StageFailure::IterationLimit {
        limit: opts.gauss_newton_max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(times: &[f64], values: &[f64]) -> (Series, Problem) {
        let series = Series::from_columns(times, values).unwrap();
        let problem = Problem::from_series(&series);
        (series, problem)
    }

    #[test]
    fn sse_is_infinite_at_the_pole() {
        let (_, p) = problem(&[0.0, 1.0, 2.0], &[0.0, 0.5, 0.6]);
        assert!(p.sse(1.0, -1.0).is_infinite());
        assert!(p.sse(1.0, 1.0).is_finite());
    }

    #[test]
    fn jacobian_order_swaps_columns() {
        let (_, p) = problem(&[0.0, 1.0, 2.0], &[0.0, 0.5, 0.6]);
        let a = p.jacobian(0.7, 1.1, ParamOrder::PlateauFirst);
        let b = p.jacobian(0.7, 1.1, ParamOrder::HalfTimeFirst);
        assert_eq!(a.column(0), b.column(1));
        assert_eq!(a.column(1), b.column(0));
    }

    #[test]
    fn lm_converges_on_noisy_saturation_data() {
        let (series, p) = problem(
            &[0.0, 1.5, 3.0, 6.0, 12.0, 24.0],
            &[0.0, 0.37, 0.39, 0.44, 0.48, 0.49],
        );
        let fit = levenberg_marquardt(
            &p,
            (0.5, 0.75),
            Floors::for_series(&series),
            &SolverOptions::default(),
        )
        .unwrap();
        assert!((fit.mtpm_emax - 0.4945).abs() < 1e-3);
        assert!((fit.k - 0.597).abs() < 1e-2);
    }

    #[test]
    fn lm_reports_bound_when_optimum_has_negative_half_time() {
        let (series, p) = problem(&[0.0, 1.0, 2.0, 4.0, 8.0], &[0.0, 2.02, 1.31, 1.16, 1.05]);
        let err = levenberg_marquardt(
            &p,
            (0.98, -0.53),
            Floors::for_series(&series),
            &SolverOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StageFailure::BoundActive {
                parameter: Parameter::K
            }
        );
    }

    #[test]
    fn lm_respects_iteration_limit() {
        let (series, p) = problem(
            &[0.0, 1.5, 3.0, 6.0, 12.0, 24.0],
            &[0.0, 0.37, 0.39, 0.44, 0.48, 0.49],
        );
        let opts = SolverOptions {
            max_iterations: 1,
            ..SolverOptions::default()
        };
        let err = levenberg_marquardt(&p, (5.0, 50.0), Floors::for_series(&series), &opts)
            .unwrap_err();
        assert_eq!(err, StageFailure::IterationLimit { limit: 1 });
    }

    #[test]
    fn gauss_newton_reaches_negative_half_time() {
        let (_, p) = problem(&[0.0, 1.0, 2.0, 4.0, 8.0], &[0.0, 2.02, 1.31, 1.16, 1.05]);
        let fit = gauss_newton(&p, (4.0, 2.02), &SolverOptions::default()).unwrap();
        assert!((fit.k + 0.509).abs() < 1e-2);
        assert!((fit.mtpm_emax - 0.9905).abs() < 1e-2);
        assert_eq!((fit.start_k, fit.start_mtpm_emax), (4.0, 2.02));
    }

    #[test]
    fn gauss_newton_fails_on_zero_residual_plateau() {
        let (_, p) = problem(&[0.0, 1.0, 2.0, 4.0, 8.0], &[0.0, 0.5, 0.5, 0.5, 0.5]);
        let err = gauss_newton(&p, (4.0, 0.5), &SolverOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            StageFailure::StepFactorTooSmall { .. } | StageFailure::IterationLimit { .. }
        ));
    }

    #[test]
    fn gauss_newton_flags_singular_gradient() {
        // One distinct follow-up time: the two Jacobian columns are proportional.
        let (_, p) = problem(&[0.0, 5.0, 5.0], &[0.0, 1.0, 1.0]);
        let err = gauss_newton(&p, (2.5, 1.0), &SolverOptions::default()).unwrap_err();
        assert_eq!(err, StageFailure::SingularGradient { iteration: 1 });
    }
}
