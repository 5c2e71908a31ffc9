//! Application-level error type.
//!
//! Library code reports structured errors (`SeriesError`, `BatchError`); the binary
//! flattens everything into an `AppError` carrying a process exit code:
//!
//! - `2`: unreadable input (I/O, CSV schema, unparsable rows, bad flags)
//! - `3`: structurally invalid table or series
//! - `4`: output/rendering failures

use crate::domain::SeriesError;
use crate::fit::BatchError;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<SeriesError> for AppError {
    fn from(err: SeriesError) -> Self {
        AppError::new(3, format!("Invalid series: {err}"))
    }
}

impl From<BatchError> for AppError {
    fn from(err: BatchError) -> Self {
        AppError::new(3, err.to_string())
    }
}
