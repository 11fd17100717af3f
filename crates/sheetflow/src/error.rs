//! Error types for sheetflow

use sheetflow_formula::{FormulaError, RegistryError};
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Spreadsheet`](crate::Spreadsheet) commands
#[derive(Debug, Error)]
pub enum Error {
    /// Workbook edit rejected by the store
    #[error(transparent)]
    Core(#[from] sheetflow_core::Error),

    /// Formula that cannot be normalized or rewritten
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// Function registration failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Malformed interchange document
    #[cfg(feature = "json")]
    #[error("Invalid workbook JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File read or write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
