//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! CSV ingest -> per-group batch fit -> summary
//!
//! The command handlers can then focus on presentation (reports, plots, exports).

use tracing::debug;

use crate::domain::{FitConfig, GroupFit, Observation};
use crate::error::AppError;
use crate::fit::{BatchError, BatchSummary, fit_groups, partition_rows};
use crate::io::ingest::{IngestedTable, load_table};

/// All computed outputs of a single `mtpm fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: IngestedTable,
    pub fits: Vec<GroupFit<String>>,
    /// Raw observations per group, aligned with `fits`.
    pub observations: Vec<Vec<Observation>>,
    pub summary: BatchSummary,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let table = load_table(&config.csv_path, &config.columns)?;
    debug!(solver = ?config.solver, "solver options");

    if table.rows.is_empty() {
        return Err(BatchError::EmptyTable.into());
    }

    // Partition once; the raw observations are kept for residuals, plots and curves.
    let groups = partition_rows(&table.rows);
    let observations = groups.iter().map(|(_, obs)| obs.clone()).collect();
    let fits = fit_groups(groups, &config.solver);
    let summary = BatchSummary::from_fits(&fits);

    Ok(RunOutput {
        table,
        fits,
        observations,
        summary,
    })
}
