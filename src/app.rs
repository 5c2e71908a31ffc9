//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - runs the batch fit pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::info;

use crate::cli::{ColumnArgs, Command, FitArgs, PlotArgs, SampleArgs};
use crate::data::{StudyConfig, generate_study};
use crate::domain::{ColumnMap, FitConfig, Series};
use crate::error::AppError;
use crate::fit::SolverOptions;

pub mod pipeline;

/// Entry point for the `mtpm` binary.
pub fn run() -> Result<(), AppError> {
    // Column names and solver limits may come from a local `.env`.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Plot(args) => handle_plot(args),
        Command::Sample(args) => handle_sample(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.table.source, run.table.rows_read, &run.summary)
    );
    print!("{}", crate::report::format_batch_report(&run.fits));

    if config.residuals || config.plot {
        for (group_fit, observations) in run.fits.iter().zip(&run.observations) {
            let Some(fit) = group_fit.fit() else {
                continue;
            };
            let series = Series::new(observations.clone())?;
            if config.residuals {
                if let Some(residuals) = crate::report::compute_residuals(&series, fit) {
                    println!();
                    print!("{}", crate::report::format_residuals(&group_fit.group, &residuals));
                }
            }
            if config.plot && fit.is_fit() {
                println!();
                println!("{} [{}]", group_fit.group, fit.method);
                print!(
                    "{}",
                    crate::plot::render_ascii_plot(&series, fit, config.plot_width, config.plot_height)
                );
            }
        }
    }

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::export::write_results_csv(path, &run.fits)?;
    }
    if let Some(path) = &config.export_curves {
        let curves = crate::io::curve::build_curve_file(
            &run.table.source,
            &run.fits,
            &run.observations,
            config.curve_points,
        );
        crate::io::curve::write_curves_json(path, &curves)?;
    }

    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let file = crate::io::curve::read_curves_json(&args.curves)?;

    let entries: Vec<_> = file
        .curves
        .iter()
        .filter(|c| args.group.as_deref().is_none_or(|g| g == c.group))
        .collect();
    if entries.is_empty() {
        return Err(match &args.group {
            Some(g) => AppError::new(2, format!("No curve for group '{g}' in {}", args.curves.display())),
            None => AppError::new(2, format!("No curves in {}", args.curves.display())),
        });
    }

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print!(
            "{}",
            crate::plot::render_curve_entry(entry, args.width, args.height)
        );
    }
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let config = StudyConfig {
        groups: args.groups,
        visits: args.visits.clone(),
        noise_sd: args.noise_sd,
        seed: args.seed,
        ..StudyConfig::default()
    };
    let study = generate_study(&config)?;
    let rows = study.rows();
    crate::io::export::write_table_csv(&args.out, &rows, &column_map(&args.columns))?;

    for g in &study.groups {
        info!(group = %g.name, mtpm_emax = g.mtpm_emax, k = g.k, "planted curve");
    }
    println!(
        "Wrote {} rows ({} groups) to {}",
        rows.len(),
        study.groups.len(),
        args.out.display()
    );
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    if args.max_iter == 0 || args.fallback_max_iter == 0 {
        return Err(AppError::new(2, "Iteration limits must be > 0."));
    }
    if args.curve_points < 2 {
        return Err(AppError::new(2, "--curve-points must be >= 2."));
    }

    Ok(FitConfig {
        csv_path: args.input.clone(),
        columns: column_map(&args.columns),
        solver: SolverOptions {
            max_iterations: args.max_iter,
            gauss_newton_max_iterations: args.fallback_max_iter,
            ..SolverOptions::default()
        },
        residuals: args.residuals,
        plot: args.plot,
        plot_width: args.width,
        plot_height: args.height,
        export_results: args.export.clone(),
        export_curves: args.export_curves.clone(),
        curve_points: args.curve_points,
    })
}

fn column_map(args: &ColumnArgs) -> ColumnMap {
    ColumnMap {
        group: (!args.single).then(|| args.group_col.clone()),
        time: args.time_col.clone(),
        measurement: args.value_col.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn fit_args(argv: &[&str]) -> FitArgs {
        let mut full = vec!["mtpm", "fit"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Fit(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn single_flag_drops_the_group_column() {
        let config = fit_config_from_args(&fit_args(&["in.csv", "--single", "--max-iter", "80"])).unwrap();
        assert_eq!(config.columns.group, None);
        assert_eq!(config.solver.max_iterations, 80);
        assert_eq!(config.solver.gauss_newton_max_iterations, 50);
    }

    #[test]
    fn zero_iterations_are_rejected() {
        let err = fit_config_from_args(&fit_args(&["in.csv", "--max-iter", "0"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
