//! Batch fitting: split a table by group, fit each group, recombine.
//!
//! Groups are independent, so the per-group work runs as a parallel map (rayon).
//! Output order is the first-appearance order of group keys in the input, and every
//! group yields exactly one `GroupFit`, whether it was fit, unfit or invalid.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{FitMethod, GroupFit, Observation, Row, Series};
use crate::fit::fitter::fit_series;
use crate::fit::solver::SolverOptions;

/// Structurally invalid batch input (nothing per-group to isolate).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("input table has no rows")]
    EmptyTable,
}

/// Outcome counts over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub groups: usize,
    pub primary: usize,
    pub fallback: usize,
    pub unfit: usize,
    pub invalid: usize,
}

impl BatchSummary {
    pub fn from_fits<G>(fits: &[GroupFit<G>]) -> Self {
        let mut summary = BatchSummary {
            groups: fits.len(),
            ..BatchSummary::default()
        };
        for fit in fits {
            match &fit.outcome {
                Ok(result) => match result.method {
                    FitMethod::PrimarySolver => summary.primary += 1,
                    FitMethod::FallbackSolver => summary.fallback += 1,
                    FitMethod::Unfit => summary.unfit += 1,
                },
                Err(_) => summary.invalid += 1,
            }
        }
        summary
    }

    /// Groups without coefficients (unfit or invalid).
    pub fn not_fit(&self) -> usize {
        self.unfit + self.invalid
    }
}

/// Partition rows by group, preserving first-appearance order and all rows.
pub fn partition_rows<G>(rows: &[Row<G>]) -> Vec<(G, Vec<Observation>)>
where
    G: Clone + Eq + Hash,
{
    let mut index: HashMap<&G, usize> = HashMap::new();
    let mut groups: Vec<(G, Vec<Observation>)> = Vec::new();

    for row in rows {
        let slot = *index.entry(&row.group).or_insert_with(|| {
            groups.push((row.group.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row.observation());
    }

    groups
}

/// Fit every group in `rows` independently.
///
/// Only an empty table is a hard error. Invalid series and unfit curves are
/// reported per group and never stop the other groups.
pub fn run_batch<G>(rows: &[Row<G>], opts: &SolverOptions) -> Result<Vec<GroupFit<G>>, BatchError>
where
    G: Clone + Eq + Hash + Send + Sync + Debug,
{
    if rows.is_empty() {
        return Err(BatchError::EmptyTable);
    }

    Ok(fit_groups(partition_rows(rows), opts))
}

/// Fit already-partitioned groups, keeping their order.
pub fn fit_groups<G>(groups: Vec<(G, Vec<Observation>)>, opts: &SolverOptions) -> Vec<GroupFit<G>>
where
    G: Send + Debug,
{
    let fits: Vec<GroupFit<G>> = groups
        .into_par_iter()
        .map(|(group, observations)| {
            let n_rows = observations.len();
            let outcome = Series::new(observations).map(|series| fit_series(&series, opts));
            GroupFit {
                group,
                n_rows,
                outcome,
            }
        })
        .collect();

    for fit in &fits {
        match &fit.outcome {
            Err(err) => warn!(group = ?fit.group, %err, "invalid series"),
            Ok(result) if !result.is_fit() => {
                warn!(group = ?fit.group, n = result.n_datapoints, "curve could not be fit")
            }
            Ok(_) => {}
        }
    }

    let summary = BatchSummary::from_fits(&fits);
    info!(
        groups = summary.groups,
        primary = summary.primary,
        fallback = summary.fallback,
        unfit = summary.unfit,
        invalid = summary.invalid,
        "batch complete"
    );

    fits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeriesError;

    fn push_group<G: Clone>(rows: &mut Vec<Row<G>>, group: G, times: &[f64], values: &[f64]) {
        for (&t, &y) in times.iter().zip(values) {
            rows.push(Row::new(group.clone(), t, y));
        }
    }

    #[test]
    fn empty_table_is_a_hard_error() {
        let rows: Vec<Row<String>> = Vec::new();
        let err = run_batch(&rows, &SolverOptions::default()).unwrap_err();
        assert_eq!(err, BatchError::EmptyTable);
    }

    #[test]
    fn partition_preserves_first_appearance_and_rows() {
        let rows = vec![
            Row::new("b", 0.0, 0.0),
            Row::new("a", 0.0, 0.0),
            Row::new("b", 1.0, 0.2),
            Row::new("c", 0.0, 0.0),
            Row::new("a", 2.0, 0.3),
        ];
        let groups = partition_rows(&rows);
        let keys: Vec<&str> = groups.iter().map(|(g, _)| *g).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[2].1.len(), 1);
    }

    #[test]
    fn one_unfittable_group_does_not_affect_the_others() {
        let mut rows = Vec::new();
        push_group(
            &mut rows,
            1,
            &[0.0, 1.5, 3.0, 6.0, 12.0, 24.0],
            &[0.0, 0.37, 0.39, 0.44, 0.48, 0.49],
        );
        push_group(&mut rows, 2, &[0.0, 1.0, 2.0, 4.0, 8.0], &[0.0, 0.5, 0.5, 0.5, 0.5]);
        push_group(
            &mut rows,
            3,
            &[0.0, 0.5, 1.0, 2.0, 5.0, 10.0],
            &[0.0, 0.2525, 0.4, 0.495, 0.7, 0.8],
        );
        push_group(
            &mut rows,
            4,
            &[0.0, 3.0, 6.0, 12.0, 24.0],
            &[0.0, 0.21, 0.33, 0.41, 0.46],
        );

        let fits = run_batch(&rows, &SolverOptions::default()).unwrap();
        assert_eq!(fits.len(), 4);
        assert_eq!(fits.iter().map(|f| f.group).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        for idx in [0, 2, 3] {
            let fit = fits[idx].fit().unwrap();
            assert!(fit.is_fit(), "group {} should fit", fits[idx].group);
        }
        let unfit = fits[1].fit().unwrap();
        assert_eq!(unfit.method, FitMethod::Unfit);
        assert_eq!(unfit.coefficients(), None);

        let summary = BatchSummary::from_fits(&fits);
        assert_eq!(summary.groups, 4);
        assert_eq!(summary.unfit, 1);
        assert_eq!(summary.not_fit(), 1);
    }

    #[test]
    fn fitting_partitioned_groups_matches_run_batch() {
        let mut rows = Vec::new();
        push_group(&mut rows, "a", &[0.0, 1.0, 2.0, 4.0], &[0.0, 0.3, 0.45, 0.55]);
        push_group(&mut rows, "b", &[0.0, 1.0, 2.0, 4.0, 8.0], &[0.0, 0.5, 0.5, 0.5, 0.5]);
        push_group(&mut rows, "a", &[8.0], &[0.62]);

        let groups = partition_rows(&rows);
        let fits = fit_groups(groups.clone(), &SolverOptions::default());
        assert_eq!(fits, run_batch(&rows, &SolverOptions::default()).unwrap());
        for (fit, (group, observations)) in fits.iter().zip(&groups) {
            assert_eq!(&fit.group, group);
            assert_eq!(fit.n_rows, observations.len());
        }
    }

    #[test]
    fn invalid_group_is_reported_distinctly() {
        let mut rows = Vec::new();
        push_group(&mut rows, "ok".to_string(), &[0.0, 1.0, 2.0, 4.0], &[0.0, 0.3, 0.45, 0.55]);
        push_group(&mut rows, "no-origin".to_string(), &[1.0, 2.0, 4.0], &[0.3, 0.45, 0.55]);

        let fits = run_batch(&rows, &SolverOptions::default()).unwrap();
        assert_eq!(fits.len(), 2);
        assert_eq!(fits[1].outcome, Err(SeriesError::MissingOrigin));
        assert_eq!(fits[1].status_label(), "invalid");
        assert_eq!(fits[1].n_rows, 3);

        let summary = BatchSummary::from_fits(&fits);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.unfit, 0);
    }

    #[test]
    fn conflicting_duplicate_time_rejects_only_that_group() {
        let mut rows = Vec::new();
        push_group(&mut rows, 'x', &[0.0, 1.0, 1.0, 3.0], &[0.0, 0.2, 0.25, 0.4]);
        push_group(&mut rows, 'y', &[0.0, 1.0, 2.0, 4.0], &[0.0, 0.3, 0.45, 0.55]);

        let fits = run_batch(&rows, &SolverOptions::default()).unwrap();
        assert!(matches!(
            fits[0].outcome,
            Err(SeriesError::ConflictingDuplicate { .. })
        ));
        assert!(fits[1].outcome.is_ok());
    }
}
