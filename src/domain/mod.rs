//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input observations and validated series (`Observation`, `Series`, `Row`)
//! - fit outputs (`FitResult`, `FitMethod`, `GroupFit`, diagnostics)
//! - run configuration and saved curve files (`FitConfig`, `CurveFile`)

pub mod types;

pub use types::*;
