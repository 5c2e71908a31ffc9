//! Saturation model implementation.
//!
//! The model is implemented as small, pure functions so that the solver code can
//! stay focused on iteration logic.

pub mod model;

pub use model::*;
