//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - compute self-starting values (Hanes–Woolf, else a grid over `K`)
//! - run the bounded and unconstrained solvers with a staged fallback
//! - fit every group of a batch table independently (parallel)

pub mod batch;
pub mod fitter;
pub mod selfstart;
pub mod solver;

pub use batch::*;
pub use fitter::*;
pub use selfstart::*;
pub use solver::*;
