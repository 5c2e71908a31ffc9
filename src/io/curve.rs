//! Read/write curve JSON files.
//!
//! Curve JSON is the "portable" representation of a batch run:
//! - per group: coefficients, diagnostics and the observations that were fit
//! - a precomputed prediction grid for quick plotting
//! - run metadata (source table, generation time)
//!
//! The schema is defined by `domain::CurveFile`. Unfit and invalid groups are
//! left out; the results CSV covers those.

use std::fs::File;
use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::domain::{CurveEntry, CurveFile, CurveGrid, GroupFit, Observation};
use crate::error::AppError;
use crate::models::sample_prediction;

/// Assemble a curve file from batch output.
///
/// `observations` must hold each group's observations in the same order as `fits`.
pub fn build_curve_file(
    source: &str,
    fits: &[GroupFit<String>],
    observations: &[Vec<Observation>],
    points: usize,
) -> CurveFile {
    let curves = fits
        .iter()
        .zip(observations)
        .filter_map(|(group_fit, obs)| {
            let fit = group_fit.fit()?;
            let t_max = obs.iter().map(|o| o.time).fold(0.0, f64::max);
            let samples = sample_prediction(fit, t_max, points)?;
            let (time, measurement) = samples.into_iter().unzip();
            Some(CurveEntry {
                group: group_fit.group.clone(),
                fit: fit.clone(),
                observations: obs.clone(),
                grid: CurveGrid { time, measurement },
            })
        })
        .collect();

    CurveFile {
        tool: "mtpm".to_string(),
        generated_at: Utc::now(),
        source: source.to_string(),
        curves,
    }
}

/// Write a curve JSON file.
pub fn write_curves_json(path: &Path, curves: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(4, format!("Failed to create curve JSON '{}': {e}", path.display()))
    })?;

    serde_json::to_writer_pretty(file, curves)
        .map_err(|e| AppError::new(4, format!("Failed to write curve JSON: {e}")))?;

    info!(path = %path.display(), curves = curves.curves.len(), "wrote curve JSON");
    Ok(())
}

/// Read a curve JSON file.
pub fn read_curves_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curves: CurveFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    Ok(curves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::domain::{FitMethod, Row};
    use crate::fit::{SolverOptions, partition_rows, run_batch};

    fn batch() -> (Vec<GroupFit<String>>, Vec<Vec<Observation>>) {
        let mut rows = Vec::new();
        for (t, y) in [(0.0, 0.0), (0.5, 0.2525), (1.0, 0.4), (2.0, 0.495), (5.0, 0.7), (10.0, 0.8)] {
            rows.push(Row::new("fit".to_string(), t, y));
        }
        for (t, y) in [(0.0, 0.0), (1.0, 0.5), (2.0, 0.5), (4.0, 0.5), (8.0, 0.5)] {
            rows.push(Row::new("flat".to_string(), t, y));
        }
        let fits = run_batch(&rows, &SolverOptions::default()).unwrap();
        let observations = partition_rows(&rows).into_iter().map(|(_, o)| o).collect();
        (fits, observations)
    }

    #[test]
    fn unfit_groups_are_left_out() {
        let (fits, observations) = batch();
        let file = build_curve_file("study", &fits, &observations, 11);
        assert_eq!(file.curves.len(), 1);

        let entry = &file.curves[0];
        assert_eq!(entry.group, "fit");
        assert_eq!(entry.fit.method, FitMethod::PrimarySolver);
        assert_eq!(entry.grid.time.len(), 11);
        assert_eq!(entry.grid.time[0], 0.0);
        assert_eq!(entry.grid.time[10], 10.0);
        assert_eq!(entry.grid.measurement[0], 0.0);
    }

    #[test]
    fn curve_json_round_trip() {
        let (fits, observations) = batch();
        let file = build_curve_file("study", &fits, &observations, 21);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curves.json");
        write_curves_json(&path, &file).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"MTPMemax\""));
        assert!(text.contains("\"method\": \"primary\""));

        let back = read_curves_json(&path).unwrap();
        assert_eq!(back.source, "study");
        assert_eq!(back.curves.len(), 1);
        let (m0, k0) = file.curves[0].fit.coefficients().unwrap();
        let (m1, k1) = back.curves[0].fit.coefficients().unwrap();
        assert_relative_eq!(m0, m1, max_relative = 1e-12);
        assert_relative_eq!(k0, k1, max_relative = 1e-12);
        assert_eq!(back.curves[0].fit.method, FitMethod::PrimarySolver);
        assert_eq!(back.curves[0].grid.measurement.len(), 21);
    }

    #[test]
    fn invalid_json_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(read_curves_json(&path).unwrap_err().exit_code(), 2);
    }
}
