//! CSV ingest and normalization.
//!
//! This module turns a follow-up table into `Row<String>`s that are safe to fit.
//!
//! Design goals:
//! - **Configurable schema**: the group/time/measurement columns come from a
//!   `ColumnMap`; header matching is case-insensitive
//! - **Strict rows**: any unparsable row fails the whole load (exit code 2), and
//!   every bad line is reported, not just the first
//! - **Separation of concerns**: no fitting logic here

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::info;

use crate::domain::{ColumnMap, Row};
use crate::error::AppError;

/// How many row errors are spelled out in the error message.
const MAX_REPORTED_ROW_ERRORS: usize = 10;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: mapped rows plus bookkeeping.
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub rows: Vec<Row<String>>,
    /// Label of the input (file stem), also the group name in single-group mode.
    pub source: String,
    pub rows_read: usize,
}

/// Load a CSV table from disk.
pub fn load_table(path: &Path, columns: &ColumnMap) -> Result<IngestedTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "series".to_string());

    let table = read_table(file, columns, &source)?;
    info!(
        path = %path.display(),
        rows = table.rows_read,
        "loaded follow-up table"
    );
    Ok(table)
}

/// Read a CSV table from any reader.
///
/// Without a group column every row belongs to a single group named `source`.
pub fn read_table<R: Read>(
    reader: R,
    columns: &ColumnMap,
    source: &str,
) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let group_idx = columns
        .group
        .as_deref()
        .map(|name| require_column(&header_map, name))
        .transpose()?;
    let time_idx = require_column(&header_map, &columns.time)?;
    let value_idx = require_column(&header_map, &columns.measurement)?;

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1 and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let parsed = parse_row(&record, group_idx, time_idx, value_idx, columns, source);
        match parsed {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        return Err(AppError::new(2, format_row_errors(&row_errors)));
    }

    Ok(IngestedTable {
        rows,
        source: source.to_string(),
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, the first column can never be matched.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn require_column(header_map: &HashMap<String, usize>, name: &str) -> Result<usize, AppError> {
    header_map
        .get(&normalize_header_name(name))
        .copied()
        .ok_or_else(|| AppError::new(2, format!("Missing required column: `{name}`")))
}

fn parse_row(
    record: &StringRecord,
    group_idx: Option<usize>,
    time_idx: usize,
    value_idx: usize,
    columns: &ColumnMap,
    source: &str,
) -> Result<Row<String>, String> {
    let group = match (group_idx, columns.group.as_deref()) {
        (Some(idx), Some(name)) => get_required(record, idx, name)?.to_string(),
        _ => source.to_string(),
    };
    let time = parse_f64(get_required(record, time_idx, &columns.time)?, &columns.time)?;
    let measurement = parse_f64(
        get_required(record, value_idx, &columns.measurement)?,
        &columns.measurement,
    )?;
    Ok(Row::new(group, time, measurement))
}

fn get_required<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{s}' in `{name}`"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value '{s}' in `{name}`"))
    }
}

fn format_row_errors(errors: &[RowError]) -> String {
    let mut out = format!("{} unreadable row(s) in input table:", errors.len());
    for e in errors.iter().take(MAX_REPORTED_ROW_ERRORS) {
        out.push_str(&format!("\n  line {}: {}", e.line, e.message));
    }
    if errors.len() > MAX_REPORTED_ROW_ERRORS {
        out.push_str(&format!(
            "\n  ... and {} more",
            errors.len() - MAX_REPORTED_ROW_ERRORS
        ));
    }
    out
}
