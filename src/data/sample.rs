//! Synthetic migration-study generation.
//!
//! Each group gets a planted plateau and half-time drawn uniformly from the
//! configured ranges; follow-up measurements are the saturation curve plus
//! Gaussian noise. Generation is fully determined by the seed.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Observation, Row};
use crate::error::AppError;
use crate::models::predict;

/// Settings for a synthetic study.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    pub groups: usize,
    /// Follow-up schedule; must include the baseline visit `0`.
    pub visits: Vec<f64>,
    pub mtpm_emax_range: (f64, f64),
    pub k_range: (f64, f64),
    /// Standard deviation of the additive measurement noise.
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            groups: 4,
            visits: vec![0.0, 1.5, 3.0, 6.0, 12.0, 24.0],
            mtpm_emax_range: (0.3, 1.5),
            k_range: (0.5, 6.0),
            noise_sd: 0.01,
            seed: 42,
        }
    }
}

/// One generated group with its planted parameters.
#[derive(Debug, Clone)]
pub struct SyntheticGroup {
    pub name: String,
    pub mtpm_emax: f64,
    pub k: f64,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone)]
pub struct Study {
    pub groups: Vec<SyntheticGroup>,
}

impl Study {
    /// Flatten into batch rows keyed by group name.
    pub fn rows(&self) -> Vec<Row<String>> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.observations
                    .iter()
                    .map(move |o| Row::new(g.name.clone(), o.time, o.measurement))
            })
            .collect()
    }
}

pub fn generate_study(config: &StudyConfig) -> Result<Study, AppError> {
    if config.groups == 0 {
        return Err(AppError::new(2, "Group count must be > 0."));
    }
    if !config.visits.iter().any(|&t| t == 0.0) {
        return Err(AppError::new(2, "Visit schedule must include the baseline visit 0."));
    }
    if config.visits.iter().any(|t| !t.is_finite() || *t < 0.0) {
        return Err(AppError::new(2, "Visit times must be finite and >= 0."));
    }
    validate_range("plateau", config.mtpm_emax_range)?;
    validate_range("half-time", config.k_range)?;
    let normal = Normal::new(0.0, config.noise_sd)
        .map_err(|e| AppError::new(2, format!("Noise distribution error: {e}")))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut visits = config.visits.clone();
    visits.sort_by(f64::total_cmp);
    visits.dedup();

    let groups = (0..config.groups)
        .map(|i| {
            let mtpm_emax = draw(&mut rng, config.mtpm_emax_range);
            let k = draw(&mut rng, config.k_range);
            let observations = visits
                .iter()
                .map(|&t| {
                    if t == 0.0 {
                        return Observation::origin();
                    }
                    // Migration distance is non-negative.
                    let y = (predict(t, mtpm_emax, k) + normal.sample(&mut rng)).max(0.0);
                    Observation::new(t, y)
                })
                .collect();
            SyntheticGroup {
                name: format!("G{:02}", i + 1),
                mtpm_emax,
                k,
                observations,
            }
        })
        .collect();

    Ok(Study { groups })
}

fn validate_range(label: &str, (lo, hi): (f64, f64)) -> Result<(), AppError> {
    if lo.is_finite() && hi.is_finite() && lo > 0.0 && hi >= lo {
        Ok(())
    } else {
        Err(AppError::new(
            2,
            format!("Invalid {label} range: [{lo}, {hi}] (must be finite, > 0 and ordered)."),
        ))
    }
}

fn draw(rng: &mut StdRng, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitMethod;
    use crate::fit::{SolverOptions, run_batch};

    #[test]
    fn same_seed_same_study() {
        let config = StudyConfig::default();
        let a = generate_study(&config).unwrap();
        let b = generate_study(&config).unwrap();
        assert_eq!(a.rows(), b.rows());
        assert_eq!(a.rows().len(), 4 * 6);
    }

    #[test]
    fn every_group_starts_at_origin() {
        let study = generate_study(&StudyConfig::default()).unwrap();
        for g in &study.groups {
            assert_eq!(g.observations[0], Observation::origin());
        }
    }

    #[test]
    fn noise_free_study_recovers_planted_parameters() {
        let config = StudyConfig {
            groups: 6,
            noise_sd: 0.0,
            ..StudyConfig::default()
        };
        let study = generate_study(&config).unwrap();
        let fits = run_batch(&study.rows(), &SolverOptions::default()).unwrap();

        for (planted, fit) in study.groups.iter().zip(&fits) {
            assert_eq!(planted.name, fit.group);
            let result = fit.fit().unwrap();
            assert_eq!(result.method, FitMethod::PrimarySolver);
            let (m, k) = result.coefficients().unwrap();
            assert!((m - planted.mtpm_emax).abs() < 1e-4 * planted.mtpm_emax);
            assert!((k - planted.k).abs() < 1e-3 * planted.k);
        }
    }

    #[test]
    fn rejects_schedule_without_baseline() {
        let config = StudyConfig {
            visits: vec![1.0, 2.0],
            ..StudyConfig::default()
        };
        assert_eq!(generate_study(&config).unwrap_err().exit_code(), 2);
    }
}
