//! Evaluation error kinds

use std::fmt;

/// Categories of evaluation failure
///
/// Hosts see these as short text tags (`#REF`, `#CYCLE`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// #REF - reference outside the grid or to a deleted row/column/sheet
    InvalidReference,
    /// #CYCLE - cell transitively depends on itself
    CircularDependency,
    /// #BAD_EXPR - parse failure, wrong arguments or unknown function
    BadExpression,
    /// #DIV/0! - zero denominator or degenerate sample
    DivisionByZero,
    /// #N/A - value not available
    NotAvailable,
    /// #ERROR - any other evaluation failure
    GenericEvaluationError,
}

impl ErrorKind {
    /// All kinds, longest tag first
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::BadExpression,
        ErrorKind::DivisionByZero,
        ErrorKind::CircularDependency,
        ErrorKind::GenericEvaluationError,
        ErrorKind::NotAvailable,
        ErrorKind::InvalidReference,
    ];

    /// Get the display tag for this error
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidReference => "#REF",
            ErrorKind::CircularDependency => "#CYCLE",
            ErrorKind::BadExpression => "#BAD_EXPR",
            ErrorKind::DivisionByZero => "#DIV/0!",
            ErrorKind::NotAvailable => "#N/A",
            ErrorKind::GenericEvaluationError => "#ERROR",
        }
    }

    /// Parse an error tag
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "#REF" | "#REF!" => Some(ErrorKind::InvalidReference),
            "#CYCLE" => Some(ErrorKind::CircularDependency),
            "#BAD_EXPR" => Some(ErrorKind::BadExpression),
            "#DIV/0!" => Some(ErrorKind::DivisionByZero),
            "#N/A" => Some(ErrorKind::NotAvailable),
            "#ERROR" => Some(ErrorKind::GenericEvaluationError),
            _ => None,
        }
    }

    /// Default message shown alongside the tag
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidReference => "Invalid reference",
            ErrorKind::CircularDependency => "Circular reference",
            ErrorKind::BadExpression => "Invalid expression",
            ErrorKind::DivisionByZero => "Division by zero",
            ErrorKind::NotAvailable => "Value not available",
            ErrorKind::GenericEvaluationError => "Evaluation error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::from_str("#div/0!"), Some(ErrorKind::DivisionByZero));
        assert_eq!(ErrorKind::from_str("#VALUE!"), None);
    }
}
