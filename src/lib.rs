//! `mtpm-curves` library crate.
//!
//! Fits the saturation curve `MTPM(t) = MTPMemax * t / (K + t)` to implant
//! migration follow-up data, one curve per group.
//!
//! The binary (`mtpm`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitter (`fit::fit_series`) and batch runner (`fit::run_batch`) are reusable
//!   on in-memory data

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
