//! Formula error types

use sheetflow_core::ErrorKind;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur while tokenizing, parsing or rewriting formulas
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reference that cannot be resolved or moved
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Function registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FormulaError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        FormulaError::Parse(msg.into())
    }

    /// Error kind surfaced when this error ends up in a cell
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormulaError::Parse(_) | FormulaError::Registry(_) => ErrorKind::BadExpression,
            FormulaError::InvalidReference(_) => ErrorKind::InvalidReference,
        }
    }
}

/// Errors raised when registering or removing functions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Name contains characters outside `[A-Za-z0-9_.]`
    #[error("Invalid function name '{0}': only letters, digits, '_' and '.' are allowed")]
    InvalidName(String),

    /// Name already taken and no override requested
    #[error("Function '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No function with this name
    #[error("Unknown function: {0}")]
    NotFound(String),
}
