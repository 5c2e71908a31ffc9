//! Single-series curve fitting with a staged fallback.
//!
//! Given a validated [`Series`] we try, in order:
//!
//! 1. **Primary**: bounded Levenberg–Marquardt (`MTPMemax, K > 0`) from
//!    self-starting values (Hanes–Woolf, else a `K` grid).
//! 2. **Fallback**: unconstrained Gauss–Newton from `K0 = max(t)/2`,
//!    `MTPMemax0 = max(y)`, with parameters ordered `(K, MTPMemax)`. A converged
//!    solution with a negative plateau, or with its pole `t = -K` inside
//!    `(0, max t]`, is rejected.
//! 3. **Unfit**: both stages failed; coefficients are absent.
//!
//! Numerical failures never escape: each failed stage is recorded on the result.

use tracing::debug;

use crate::domain::{
    FailedAttempt, FitDiagnostics, FitMethod, FitResult, Observation, Series, SeriesError, StageFailure,
};
use crate::fit::selfstart::self_start;
use crate::fit::solver::{
    Converged, Floors, ParamOrder, Problem, SolverOptions, gauss_newton, levenberg_marquardt,
};
use crate::math::normal_inverse;

/// Fit the saturation curve to one series.
///
/// Always returns a result; the method tag says which stage (if any) converged.
pub fn fit_series(series: &Series, opts: &SolverOptions) -> FitResult {
    let problem = Problem::from_series(series);
    let n = series.len();
    let mut failures = Vec::with_capacity(2);

    match primary_stage(series, &problem, opts) {
        Ok(solution) => {
            return finish(FitMethod::PrimarySolver, &solution, &problem, failures);
        }
        Err(failure) => {
            debug!(%failure, n, "primary solver failed");
            failures.push(FailedAttempt {
                method: FitMethod::PrimarySolver,
                failure,
            });
        }
    }

    match fallback_stage(series, &problem, opts) {
        Ok(solution) => {
            return finish(FitMethod::FallbackSolver, &solution, &problem, failures);
        }
        Err(failure) => {
            debug!(%failure, n, "fallback solver failed");
            failures.push(FailedAttempt {
                method: FitMethod::FallbackSolver,
                failure,
            });
        }
    }

    FitResult::unfit(n, failures)
}

/// Validate raw observations and fit them (the single-group entry point).
pub fn fit_observations(
    observations: Vec<Observation>,
    opts: &SolverOptions,
) -> Result<FitResult, SeriesError> {
    let series = Series::new(observations)?;
    Ok(fit_series(&series, opts))
}

fn primary_stage(
    series: &Series,
    problem: &Problem,
    opts: &SolverOptions,
) -> Result<Converged, StageFailure> {
    let start = self_start(series).ok_or(StageFailure::SelfStart)?;
    levenberg_marquardt(problem, start, Floors::for_series(series), opts)
}

fn fallback_stage(
    series: &Series,
    problem: &Problem,
    opts: &SolverOptions,
) -> Result<Converged, StageFailure> {
    let k0 = series.max_time() / 2.0;
    let m0 = series.max_measurement();
    let solution = gauss_newton(problem, (k0, m0), opts)?;

    if solution.mtpm_emax < 0.0 {
        return Err(StageFailure::NegativePlateau {
            mtpm_emax: solution.mtpm_emax,
        });
    }
    let pole = -solution.k;
    if pole > 0.0 && pole <= series.max_time() {
        return Err(StageFailure::PoleInRange { pole });
    }
    Ok(solution)
}

fn finish(
    method: FitMethod,
    solution: &Converged,
    problem: &Problem,
    failures: Vec<FailedAttempt>,
) -> FitResult {
    let diagnostics = diagnostics(solution, problem);
    FitResult::fitted(
        method,
        solution.mtpm_emax,
        solution.k,
        problem.len(),
        diagnostics,
        failures,
    )
}

/// Residual standard error and asymptotic standard errors `sqrt(diag(s² (JᵀJ)⁻¹))`.
fn diagnostics(solution: &Converged, problem: &Problem) -> FitDiagnostics {
    let dof = problem.len().saturating_sub(2);
    let rse = (dof > 0).then(|| (solution.sse / dof as f64).sqrt());

    let (se_mtpm_emax, se_k) = match rse {
        Some(s) => {
            let jac = problem.jacobian(solution.mtpm_emax, solution.k, ParamOrder::PlateauFirst);
            match normal_inverse(&jac) {
                Some(inv) => (
                    finite((s * s * inv[(0, 0)]).sqrt()),
                    finite((s * s * inv[(1, 1)]).sqrt()),
                ),
                None => (None, None),
            }
        }
        None => (None, None),
    };

    FitDiagnostics {
        sse: solution.sse,
        rse,
        iterations: solution.iterations,
        se_mtpm_emax,
        se_k,
        start_mtpm_emax: solution.start_mtpm_emax,
        start_k: solution.start_k,
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
