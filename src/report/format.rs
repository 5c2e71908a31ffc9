//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized (the tests below pin the layout)

use crate::domain::GroupFit;
use crate::fit::BatchSummary;
use crate::report::Residual;

/// Format the run header (input + outcome counts).
pub fn format_run_summary(source: &str, rows_read: usize, summary: &BatchSummary) -> String {
    let mut out = String::new();

    out.push_str("=== mtpm - Migration Curve Fit ===\n");
    out.push_str(&format!("Source: {source}\n"));
    out.push_str(&format!("Rows: {rows_read} | groups: {}\n", summary.groups));
    out.push_str(&format!(
        "Fits: primary={} fallback={} unfit={} invalid={}\n",
        summary.primary, summary.fallback, summary.unfit, summary.invalid
    ));
    out.push('\n');

    out
}

/// Format the per-group table followed by the "could not be fit" line.
pub fn format_batch_report(fits: &[GroupFit<String>]) -> String {
    let mut out = String::new();

    out.push_str(
        format!(
            "{:<16} {:<8} {:>10} {:>10} {:>4} {:>10} {:<30}\n",
            "group", "method", "MTPMemax", "K", "n", "SSE", "note"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<16} {:-<8} {:-<10} {:-<10} {:-<4} {:-<10} {:-<30}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for fit in fits {
        let (m, k, n, sse, note) = match &fit.outcome {
            Ok(result) => {
                let note = result
                    .failures
                    .last()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                (
                    fmt_opt(result.mtpm_emax, 4),
                    fmt_opt(result.k, 4),
                    result.n_datapoints.to_string(),
                    fmt_opt(result.diagnostics.as_ref().map(|d| d.sse), 6),
                    note,
                )
            }
            Err(err) => (
                "-".to_string(),
                "-".to_string(),
                fit.n_rows.to_string(),
                "-".to_string(),
                err.to_string(),
            ),
        };
        out.push_str(
            format!(
                "{:<16} {:<8} {:>10} {:>10} {:>4} {:>10} {:<30}\n",
                truncate(&fit.group, 16),
                fit.status_label(),
                m,
                k,
                n,
                sse,
                truncate(&note, 30),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    let summary = BatchSummary::from_fits(fits);
    out.push('\n');
    out.push_str(&format!(
        "{} of {} groups could not be fit",
        summary.not_fit(),
        summary.groups
    ));
    if summary.invalid > 0 {
        out.push_str(&format!(" ({} invalid input)", summary.invalid));
    }
    out.push('\n');

    out
}

/// Format a residual table for a single group.
pub fn format_residuals(group: &str, residuals: &[Residual]) -> String {
    let mut out = String::new();

    out.push_str(&format!("Residuals ({group}):\n"));
    out.push_str(format!("{:>10} {:>12} {:>12} {:>12}\n", "time", "observed", "fitted", "residual").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<12} {:-<12} {:-<12}\n", "", "", "", "").trim_end());
    out.push('\n');

    for r in residuals {
        out.push_str(&format!(
            "{:>10.3} {:>12.4} {:>12.4} {:>12.4}\n",
            r.time, r.observed, r.fitted, r.residual
        ));
    }

    out
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) => format!("{x:.decimals$}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitResult, Series, SeriesError};
    use crate::fit::{SolverOptions, fit_series};
    use crate::report::compute_residuals;

    fn example_fit() -> FitResult {
        let series = Series::from_columns(
            &[0.0, 1.5, 3.0, 6.0, 12.0, 24.0],
            &[0.0, 0.37, 0.39, 0.44, 0.48, 0.49],
        )
        .unwrap();
        fit_series(&series, &SolverOptions::default())
    }

    #[test]
    fn batch_report_counts_unfit_and_invalid_groups() {
        let fits = vec![
            GroupFit {
                group: "implant-a".to_string(),
                n_rows: 6,
                outcome: Ok(example_fit()),
            },
            GroupFit {
                group: "implant-b".to_string(),
                n_rows: 5,
                outcome: Ok(FitResult::unfit(5, Vec::new())),
            },
            GroupFit {
                group: "implant-c".to_string(),
                n_rows: 2,
                outcome: Err(SeriesError::MissingOrigin),
            },
        ];

        let report = format_batch_report(&fits);
        let lines: Vec<&str> = report.lines().collect();

        assert!(lines[0].starts_with("group"));
        assert!(lines[1].starts_with("----"));
        assert!(lines[2].starts_with("implant-a        primary"));
        assert!(lines[3].starts_with("implant-b        unfit"));
        assert!(lines[4].starts_with("implant-c        invalid"));
        assert_eq!(
            lines.last().copied(),
            Some("2 of 3 groups could not be fit (1 invalid input)")
        );
        assert!(lines.iter().all(|l| l == &l.trim_end()));
    }

    #[test]
    fn all_fit_reports_zero() {
        let fits = vec![GroupFit {
            group: "only".to_string(),
            n_rows: 6,
            outcome: Ok(example_fit()),
        }];
        let report = format_batch_report(&fits);
        assert!(report.ends_with("0 of 1 groups could not be fit\n"));
    }

    #[test]
    fn residual_table_has_a_row_per_observation() {
        let series = Series::from_columns(&[0.0, 2.0, 10.0], &[0.0, 0.31, 0.52]).unwrap();
        let fit = fit_series(&series, &SolverOptions::default());
        let residuals = compute_residuals(&series, &fit).unwrap();
        assert_eq!(residuals.len(), 3);
        assert!(residuals.iter().all(|r| r.residual.abs() < 1e-6));

        let table = format_residuals("knee", &residuals);
        assert_eq!(table.lines().count(), 3 + 3);
        assert!(table.starts_with("Residuals (knee):\n"));
    }

    #[test]
    fn truncate_marks_long_names() {
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
