//! Command-line parsing for the migration curve fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code. Column names and solver limits can also be set
//! through environment variables (or a `.env` file).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "mtpm",
    version,
    about = "Saturation-curve fitter for implant migration follow-up data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one curve per group from a CSV table, print a report, optionally plot/export.
    Fit(FitArgs),
    /// Plot curves from a previously exported curve JSON.
    Plot(PlotArgs),
    /// Write a synthetic multi-group study as CSV.
    Sample(SampleArgs),
}

/// Column mapping shared by `fit` and `sample`.
#[derive(Debug, Args, Clone)]
pub struct ColumnArgs {
    /// Group key column.
    #[arg(long, env = "MTPM_GROUP_COL", default_value = "group")]
    pub group_col: String,

    /// Treat the whole table as a single series (ignore the group column).
    #[arg(long)]
    pub single: bool,

    /// Follow-up time column.
    #[arg(long, env = "MTPM_TIME_COL", default_value = "time")]
    pub time_col: String,

    /// Migration measurement column.
    #[arg(long, env = "MTPM_VALUE_COL", default_value = "mtpm")]
    pub value_col: String,
}

/// Options for fitting a table.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Input CSV (one row per follow-up visit).
    #[arg(value_name = "CSV")]
    pub input: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// Iteration limit of the bounded (primary) solver.
    #[arg(long, env = "MTPM_MAX_ITER", default_value_t = 200)]
    pub max_iter: usize,

    /// Iteration limit of the unconstrained (fallback) solver.
    #[arg(long, default_value_t = 50)]
    pub fallback_max_iter: usize,

    /// Print observed vs fitted values per group.
    #[arg(long)]
    pub residuals: bool,

    /// Render an ASCII plot per fitted group.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 18)]
    pub height: usize,

    /// Export per-group results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export fitted curves (coefficients + prediction grid) to JSON.
    #[arg(long = "export-curves")]
    pub export_curves: Option<PathBuf>,

    /// Points in each exported prediction grid.
    #[arg(long, default_value_t = 101)]
    pub curve_points: usize,
}

/// Options for plotting a saved curve file.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Curve JSON file produced by `mtpm fit --export-curves`.
    #[arg(long, value_name = "JSON")]
    pub curves: PathBuf,

    /// Only plot this group.
    #[arg(long)]
    pub group: Option<String>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 18)]
    pub height: usize,
}

/// Options for generating a synthetic study.
#[derive(Debug, Parser)]
pub struct SampleArgs {
    /// Output CSV path.
    #[arg(long, short = 'o', value_name = "CSV")]
    pub out: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// Number of groups.
    #[arg(long, default_value_t = 4)]
    pub groups: usize,

    /// Follow-up schedule (comma separated, must include 0).
    #[arg(long, value_delimiter = ',', default_values_t = vec![0.0, 1.5, 3.0, 6.0, 12.0, 24.0])]
    pub visits: Vec<f64>,

    /// Standard deviation of the measurement noise.
    #[arg(long, default_value_t = 0.01)]
    pub noise_sd: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_args_parse_with_defaults() {
        let cli = Cli::try_parse_from(["mtpm", "fit", "data.csv", "--plot"]).unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.input, PathBuf::from("data.csv"));
        assert!(args.plot);
        assert!(!args.columns.single);
        assert_eq!(args.curve_points, 101);
    }

    #[test]
    fn sample_visits_are_comma_separated() {
        let cli = Cli::try_parse_from(["mtpm", "sample", "-o", "s.csv", "--visits", "0,1,2,4"]).unwrap();
        let Command::Sample(args) = cli.command else {
            panic!("expected sample");
        };
        assert_eq!(args.visits, vec![0.0, 1.0, 2.0, 4.0]);
    }
}
