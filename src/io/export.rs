//! Export per-group results and row tables to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.
//! Missing values (unfit or invalid groups) are written as empty cells.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::domain::{ColumnMap, GroupFit, Row};
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ResultRecord<'a> {
    group: &'a str,
    method: &'static str,
    mtpm_emax: Option<f64>,
    k: Option<f64>,
    n_datapoints: Option<usize>,
    n_followups: Option<usize>,
    sse: Option<f64>,
    rse: Option<f64>,
    se_mtpm_emax: Option<f64>,
    se_k: Option<f64>,
    iterations: Option<usize>,
    detail: String,
}

impl<'a> ResultRecord<'a> {
    fn from_group(fit: &'a GroupFit<String>) -> Self {
        match &fit.outcome {
            Ok(result) => {
                let diag = result.diagnostics.as_ref();
                let detail = result
                    .failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                Self {
                    group: &fit.group,
                    method: result.method.label(),
                    mtpm_emax: result.mtpm_emax,
                    k: result.k,
                    n_datapoints: Some(result.n_datapoints),
                    n_followups: Some(result.n_followups),
                    sse: diag.map(|d| d.sse),
                    rse: diag.and_then(|d| d.rse),
                    se_mtpm_emax: diag.and_then(|d| d.se_mtpm_emax),
                    se_k: diag.and_then(|d| d.se_k),
                    iterations: diag.map(|d| d.iterations),
                    detail,
                }
            }
            Err(err) => Self {
                group: &fit.group,
                method: fit.status_label(),
                mtpm_emax: None,
                k: None,
                n_datapoints: None,
                n_followups: None,
                sse: None,
                rse: None,
                se_mtpm_emax: None,
                se_k: None,
                iterations: None,
                detail: err.to_string(),
            },
        }
    }
}

/// Write per-group results to a CSV file.
pub fn write_results_csv(path: &Path, fits: &[GroupFit<String>]) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(4, format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    write_results(file, fits)?;
    info!(path = %path.display(), groups = fits.len(), "wrote results CSV");
    Ok(())
}

/// Write per-group results as CSV to any writer.
pub fn write_results<W: Write>(writer: W, fits: &[GroupFit<String>]) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for fit in fits {
        wtr.serialize(ResultRecord::from_group(fit))
            .map_err(|e| AppError::new(4, format!("Failed to write export CSV row: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write raw `(group, time, measurement)` rows using the configured column names.
pub fn write_table_csv(
    path: &Path,
    rows: &[Row<String>],
    columns: &ColumnMap,
) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(4, format!("Failed to create table CSV '{}': {e}", path.display()))
    })?;
    write_table(file, rows, columns)?;
    info!(path = %path.display(), rows = rows.len(), "wrote table CSV");
    Ok(())
}

pub fn write_table<W: Write>(
    writer: W,
    rows: &[Row<String>],
    columns: &ColumnMap,
) -> Result<(), AppError> {
    let write_err = |e: csv::Error| AppError::new(4, format!("Failed to write table CSV: {e}"));
    let mut wtr = csv::Writer::from_writer(writer);

    match &columns.group {
        Some(group) => wtr.write_record([group.as_str(), columns.time.as_str(), columns.measurement.as_str()]),
        None => wtr.write_record([columns.time.as_str(), columns.measurement.as_str()]),
    }
    .map_err(write_err)?;

    for row in rows {
        let time = row.time.to_string();
        let value = row.measurement.to_string();
        match &columns.group {
            Some(_) => wtr.write_record([row.group.as_str(), time.as_str(), value.as_str()]),
            None => wtr.write_record([time.as_str(), value.as_str()]),
        }
        .map_err(write_err)?;
    }

    wtr.flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush table CSV: {e}")))?;
    Ok(())
}
