//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single follow-up visit: time since baseline and the group-mean migration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: f64,
    pub measurement: f64,
}

impl Observation {
    pub fn new(time: f64, measurement: f64) -> Self {
        Self { time, measurement }
    }

    /// The mandatory baseline point `(0, 0)`.
    pub fn origin() -> Self {
        Self::new(0.0, 0.0)
    }

    fn is_origin(&self) -> bool {
        self.time == 0.0 && self.measurement == 0.0
    }
}

/// One row of a batch table after column mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<G> {
    pub group: G,
    pub time: f64,
    pub measurement: f64,
}

impl<G> Row<G> {
    pub fn new(group: G, time: f64, measurement: f64) -> Self {
        Self {
            group,
            time,
            measurement,
        }
    }

    pub fn observation(&self) -> Observation {
        Observation::new(self.time, self.measurement)
    }
}

/// Reasons a set of observations cannot form a fit-able series.
///
/// These describe malformed input, never a hard-to-fit curve.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("series is empty")]
    Empty,
    #[error("got {times} time values but {measurements} measurements")]
    LengthMismatch { times: usize, measurements: usize },
    #[error("non-finite value in observation {index}")]
    NonFinite { index: usize },
    #[error("negative time {time} in observation {index}")]
    NegativeTime { index: usize, time: f64 },
    #[error("missing origin observation (time = 0, measurement = 0)")]
    MissingOrigin,
    #[error("baseline measurement at time 0 is {measurement}, expected 0")]
    NonZeroBaseline { measurement: f64 },
    #[error("need at least 2 distinct time points, found {distinct}")]
    TooFewTimePoints { distinct: usize },
    #[error("time {time} appears with conflicting measurements {first} and {second}")]
    ConflictingDuplicate { time: f64, first: f64, second: f64 },
}

/// A validated set of observations for one group.
///
/// Observations are stored in canonical order (time, then measurement) so that
/// nothing downstream depends on the order rows arrived in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    observations: Vec<Observation>,
}

impl Series {
    pub fn new(observations: Vec<Observation>) -> Result<Self, SeriesError> {
        if observations.is_empty() {
            return Err(SeriesError::Empty);
        }

        let mut observations = observations;
        for (index, obs) in observations.iter_mut().enumerate() {
            if !(obs.time.is_finite() && obs.measurement.is_finite()) {
                return Err(SeriesError::NonFinite { index });
            }
            if obs.time < 0.0 {
                return Err(SeriesError::NegativeTime {
                    index,
                    time: obs.time,
                });
            }
            // Fold -0.0 into 0.0 so the canonical sort is stable.
            obs.time += 0.0;
            obs.measurement += 0.0;
        }

        observations.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.measurement.total_cmp(&b.measurement))
        });

        for pair in observations.windows(2) {
            if pair[0].time == pair[1].time && pair[0].measurement != pair[1].measurement {
                return Err(SeriesError::ConflictingDuplicate {
                    time: pair[0].time,
                    first: pair[0].measurement,
                    second: pair[1].measurement,
                });
            }
        }

        if !observations.iter().any(Observation::is_origin) {
            return Err(match observations.iter().find(|o| o.time == 0.0) {
                Some(baseline) => SeriesError::NonZeroBaseline {
                    measurement: baseline.measurement,
                },
                None => SeriesError::MissingOrigin,
            });
        }

        let distinct = 1 + observations
            .windows(2)
            .filter(|pair| pair[0].time != pair[1].time)
            .count();
        if distinct < 2 {
            return Err(SeriesError::TooFewTimePoints { distinct });
        }

        Ok(Self { observations })
    }

    /// Build a series from parallel time/measurement columns.
    pub fn from_columns(times: &[f64], measurements: &[f64]) -> Result<Self, SeriesError> {
        if times.len() != measurements.len() {
            return Err(SeriesError::LengthMismatch {
                times: times.len(),
                measurements: measurements.len(),
            });
        }
        Self::new(
            times
                .iter()
                .zip(measurements)
                .map(|(&t, &y)| Observation::new(t, y))
                .collect(),
        )
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Always false for a constructed series; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn n_followups(&self) -> usize {
        self.len() - 1
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations.iter().map(|o| o.time)
    }

    pub fn measurements(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations.iter().map(|o| o.measurement)
    }

    pub fn max_time(&self) -> f64 {
        self.times().fold(0.0, f64::max)
    }

    pub fn max_measurement(&self) -> f64 {
        self.measurements().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn max_abs_measurement(&self) -> f64 {
        self.measurements().map(f64::abs).fold(0.0, f64::max)
    }
}

/// Which stage of the fitter produced the coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Bounded, self-starting Levenberg–Marquardt.
    #[serde(rename = "primary")]
    PrimarySolver,
    /// Unconstrained Gauss–Newton from explicit starting values.
    #[serde(rename = "fallback")]
    FallbackSolver,
    Unfit,
}

impl FitMethod {
    pub fn label(self) -> &'static str {
        match self {
            FitMethod::PrimarySolver => "primary",
            FitMethod::FallbackSolver => "fallback",
            FitMethod::Unfit => "unfit",
        }
    }
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Model parameter names (used in diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parameter {
    #[serde(rename = "MTPMemax")]
    MtpmEmax,
    K,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::MtpmEmax => f.write_str("MTPMemax"),
            Parameter::K => f.write_str("K"),
        }
    }
}

/// Why a solver stage gave up.
///
/// Recorded on the result for diagnostics; never raised to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StageFailure {
    #[error("self-start heuristic found no usable starting values")]
    SelfStart,
    #[error("non-finite residuals at the starting values")]
    NonFiniteResidual,
    #[error("singular gradient at iteration {iteration}")]
    SingularGradient { iteration: usize },
    #[error("damping grew without reducing the residual (iteration {iteration})")]
    Stalled { iteration: usize },
    #[error("step factor reduced below {min_factor} (iteration {iteration})")]
    StepFactorTooSmall { iteration: usize, min_factor: f64 },
    #[error("iteration limit of {limit} reached")]
    IterationLimit { limit: usize },
    #[error("{parameter} converged onto its lower bound")]
    BoundActive { parameter: Parameter },
    #[error("converged to a negative plateau ({mtpm_emax})")]
    NegativePlateau { mtpm_emax: f64 },
    #[error("curve has a pole at t = {pole} inside the observed range")]
    PoleInRange { pole: f64 },
}

/// A stage that was attempted and failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub method: FitMethod,
    pub failure: StageFailure,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.failure)
    }
}

/// Numerical diagnostics of a converged stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub sse: f64,
    /// Residual standard error `sqrt(SSE / (n - 2))`; absent with zero residual df.
    pub rse: Option<f64>,
    pub iterations: usize,
    pub se_mtpm_emax: Option<f64>,
    pub se_k: Option<f64>,
    pub start_mtpm_emax: f64,
    pub start_k: f64,
}

/// Fit output for a single series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Plateau: the value the curve approaches as time grows without bound.
    #[serde(rename = "MTPMemax")]
    pub mtpm_emax: Option<f64>,
    /// Half-time: the time at which the curve reaches half the plateau.
    #[serde(rename = "K")]
    pub k: Option<f64>,
    pub method: FitMethod,
    pub n_datapoints: usize,
    pub n_followups: usize,
    pub diagnostics: Option<FitDiagnostics>,
    /// Failed stages, in attempt order.
    pub failures: Vec<FailedAttempt>,
}

impl FitResult {
    pub fn fitted(
        method: FitMethod,
        mtpm_emax: f64,
        k: f64,
        n_datapoints: usize,
        diagnostics: FitDiagnostics,
        failures: Vec<FailedAttempt>,
    ) -> Self {
        Self {
            mtpm_emax: Some(mtpm_emax),
            k: Some(k),
            method,
            n_datapoints,
            n_followups: n_datapoints.saturating_sub(1),
            diagnostics: Some(diagnostics),
            failures,
        }
    }

    pub fn unfit(n_datapoints: usize, failures: Vec<FailedAttempt>) -> Self {
        Self {
            mtpm_emax: None,
            k: None,
            method: FitMethod::Unfit,
            n_datapoints,
            n_followups: n_datapoints.saturating_sub(1),
            diagnostics: None,
            failures,
        }
    }

    /// `(MTPMemax, K)` when a stage converged.
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        Some((self.mtpm_emax?, self.k?))
    }

    pub fn is_fit(&self) -> bool {
        self.method != FitMethod::Unfit
    }
}

/// Per-group outcome of a batch run.
///
/// An invalid series is kept separate from an `Unfit` curve: the former is bad input,
/// the latter a legitimate result.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFit<G> {
    pub group: G,
    pub n_rows: usize,
    pub outcome: Result<FitResult, SeriesError>,
}

impl<G> GroupFit<G> {
    pub fn status_label(&self) -> &'static str {
        match &self.outcome {
            Ok(fit) => fit.method.label(),
            Err(_) => "invalid",
        }
    }

    pub fn fit(&self) -> Option<&FitResult> {
        self.outcome.as_ref().ok()
    }
}

/// Which CSV columns hold the group key, follow-up time and measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    /// `None` treats the whole table as a single group.
    pub group: Option<String>,
    pub time: String,
    pub measurement: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            group: Some("group".to_string()),
            time: "time".to_string(),
            measurement: "mtpm".to_string(),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus environment and defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub csv_path: PathBuf,
    pub columns: ColumnMap,
    pub solver: crate::fit::SolverOptions,

    /// Print observed vs fitted values per group.
    pub residuals: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_curves: Option<PathBuf>,
    /// Number of points in each exported prediction grid.
    pub curve_points: usize,
}

/// A saved curves file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub curves: Vec<CurveEntry>,
}

/// One fitted group inside a `CurveFile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveEntry {
    pub group: String,
    pub fit: FitResult,
    pub observations: Vec<Observation>,
    pub grid: CurveGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveGrid {
    pub time: Vec<f64>,
    pub measurement: Vec<f64>,
}
