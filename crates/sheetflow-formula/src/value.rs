//! Values flowing through evaluation

use crate::references::RangeReference;
use sheetflow_core::ErrorKind;
use std::fmt;

/// An error value with its message
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CellError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error with the kind's default message
    pub fn of(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.message)
    }
}

/// Why a computation did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// An error value raised by a function or an argument read
    Raised(CellError),
    /// The cell is part of a circular dependency; cannot be caught
    Cycle,
}

impl EvalError {
    pub fn raise(kind: ErrorKind, message: impl Into<String>) -> Self {
        EvalError::Raised(CellError::new(kind, message))
    }

    pub fn bad_expression(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::BadExpression, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::GenericEvaluationError, message)
    }

    pub fn div_zero() -> Self {
        Self::raise(ErrorKind::DivisionByZero, ErrorKind::DivisionByZero.default_message())
    }

    pub fn not_available(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::NotAvailable, message)
    }
}

impl From<CellError> for EvalError {
    fn from(err: CellError) -> Self {
        EvalError::Raised(err)
    }
}

/// Result type for evaluation
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// A scalar value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    #[default]
    Empty,
    Error(CellError),
}

impl Value {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Value::Error(CellError::new(kind, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_error(&self) -> Option<&CellError> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Raise the value if it is an error
    pub fn raise_error(&self) -> EvalResult<&Value> {
        match self {
            Value::Error(err) => Err(EvalError::Raised(err.clone())),
            other => Ok(other),
        }
    }

    /// Numeric reading used by arithmetic
    ///
    /// Text must read as a number; anything else is `#ERROR`.
    pub fn to_number(&self) -> EvalResult<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Empty => Ok(0.0),
            Value::Text(s) => parse_number(s).ok_or_else(|| {
                EvalError::generic(format!(
                    "The value \"{}\" cannot be interpreted as a number",
                    s
                ))
            }),
            Value::Error(err) => Err(EvalError::Raised(err.clone())),
        }
    }

    pub fn to_text(&self) -> EvalResult<String> {
        match self {
            Value::Number(n) => Ok(format_number(*n)),
            Value::Text(s) => Ok(s.clone()),
            Value::Boolean(true) => Ok("TRUE".to_string()),
            Value::Boolean(false) => Ok("FALSE".to_string()),
            Value::Empty => Ok(String::new()),
            Value::Error(err) => Err(EvalError::Raised(err.clone())),
        }
    }

    pub fn to_bool(&self) -> EvalResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Empty => Ok(false),
            Value::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
            Value::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
            Value::Text(s) => Err(EvalError::generic(format!(
                "The value \"{}\" cannot be interpreted as a boolean",
                s
            ))),
            Value::Error(err) => Err(EvalError::Raised(err.clone())),
        }
    }
}

/// Parse text as a number, for arithmetic on text operands
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(percent) = s.strip_suffix('%') {
        return percent.trim_end().parse::<f64>().ok().map(|n| n / 100.0);
    }
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => None,
    }
}

/// Shortest text for a number, without trailing zeros
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let text = format!("{}", n);
        if text.len() > 17 {
            // Hide binary noise like 0.30000000000000004
            let rounded = format!("{:.15}", n);
            rounded.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            text
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Error(err) => f.write_str(err.kind.as_str()),
            other => match other.to_text() {
                Ok(text) => f.write_str(&text),
                Err(_) => Ok(()),
            },
        }
    }
}

/// A value with its display format
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormattedValue {
    pub value: Value,
    pub format: Option<String>,
}

impl FormattedValue {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            format: None,
        }
    }

    pub fn with_format(value: Value, format: Option<String>) -> Self {
        Self { value, format }
    }

    pub fn empty() -> Self {
        Self::new(Value::Empty)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(Value::error(kind, message))
    }
}

impl From<Value> for FormattedValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// A 2D block of values, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<FormattedValue>,
    /// Where the values were read from, for references
    pub origin: Option<RangeReference>,
}

impl Matrix {
    /// Build from row-major data; `data.len()` must be `rows * cols`
    pub fn new(rows: usize, cols: usize, data: Vec<FormattedValue>) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self {
            rows,
            cols,
            data,
            origin: None,
        }
    }

    pub fn from_rows(rows: Vec<Vec<FormattedValue>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let height = rows.len();
        let data: Vec<FormattedValue> = rows
            .into_iter()
            .flat_map(|mut row| {
                row.resize(cols, FormattedValue::empty());
                row
            })
            .collect();
        Self::new(height, cols, data)
    }

    pub fn scalar(value: FormattedValue) -> Self {
        Self::new(1, 1, vec![value])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_single(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&FormattedValue> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Values in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &FormattedValue> {
        self.data.iter()
    }

    pub fn row(&self, row: usize) -> &[FormattedValue] {
        let start = (row * self.cols).min(self.data.len());
        let end = (start + self.cols).min(self.data.len());
        &self.data[start..end]
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &FormattedValue> {
        self.data.iter().skip(col).step_by(self.cols.max(1))
    }

    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for col in 0..self.cols {
            for row in 0..self.rows {
                data.push(self.data[row * self.cols + col].clone());
            }
        }
        Self::new(self.cols, self.rows, data)
    }

    pub fn into_values(self) -> Vec<FormattedValue> {
        self.data
    }

    /// First format found, in row-major order
    pub fn first_format(&self) -> Option<&str> {
        self.data.iter().find_map(|v| v.format.as_deref())
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Scalar(FormattedValue),
    Matrix(Matrix),
}

impl Evaluated {
    pub fn number(n: f64) -> Self {
        Evaluated::Scalar(Value::Number(n).into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Evaluated::Scalar(Value::Text(s.into()).into())
    }

    pub fn boolean(b: bool) -> Self {
        Evaluated::Scalar(Value::Boolean(b).into())
    }

    pub fn value(value: Value) -> Self {
        Evaluated::Scalar(value.into())
    }

    pub fn with_format(value: Value, format: impl Into<String>) -> Self {
        Evaluated::Scalar(FormattedValue::with_format(value, Some(format.into())))
    }

    /// Multi-cell matrices only
    pub fn as_multi(&self) -> Option<&Matrix> {
        match self {
            Evaluated::Matrix(m) if !m.is_single() => Some(m),
            _ => None,
        }
    }

    /// The single value, or the top-left element of a matrix
    pub fn first(&self) -> FormattedValue {
        match self {
            Evaluated::Scalar(v) => v.clone(),
            Evaluated::Matrix(m) => m.get(0, 0).cloned().unwrap_or_default(),
        }
    }

    /// Value at a broadcast position; outside the extent is empty
    pub fn element(&self, row: usize, col: usize) -> FormattedValue {
        match self {
            Evaluated::Scalar(v) => v.clone(),
            Evaluated::Matrix(m) if m.is_single() => m.get(0, 0).cloned().unwrap_or_default(),
            Evaluated::Matrix(m) => m.get(row, col).cloned().unwrap_or_default(),
        }
    }

    /// Format carried by this result
    pub fn format(&self) -> Option<&str> {
        match self {
            Evaluated::Scalar(v) => v.format.as_deref(),
            Evaluated::Matrix(m) => m.first_format(),
        }
    }
}

/// What the host sees for a cell
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluatedCell {
    Number(f64, Option<String>),
    Text(String, Option<String>),
    Boolean(bool, Option<String>),
    Empty,
    Error(ErrorKind, String),
}

impl EvaluatedCell {
    pub fn is_error(&self) -> bool {
        matches!(self, EvaluatedCell::Error(..))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            EvaluatedCell::Error(kind, _) => Some(*kind),
            _ => None,
        }
    }

    pub fn format(&self) -> Option<&str> {
        match self {
            EvaluatedCell::Number(_, f) | EvaluatedCell::Text(_, f) | EvaluatedCell::Boolean(_, f) => {
                f.as_deref()
            }
            _ => None,
        }
    }
}

impl From<FormattedValue> for EvaluatedCell {
    fn from(v: FormattedValue) -> Self {
        match v.value {
            Value::Number(n) => EvaluatedCell::Number(n, v.format),
            Value::Text(s) => EvaluatedCell::Text(s, v.format),
            Value::Boolean(b) => EvaluatedCell::Boolean(b, v.format),
            Value::Empty => EvaluatedCell::Empty,
            Value::Error(err) => EvaluatedCell::Error(err.kind, err.message),
        }
    }
}

impl fmt::Display for EvaluatedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatedCell::Number(n, _) => f.write_str(&format_number(*n)),
            EvaluatedCell::Text(s, _) => f.write_str(s),
            EvaluatedCell::Boolean(b, _) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            EvaluatedCell::Empty => Ok(()),
            EvaluatedCell::Error(kind, _) => f.write_str(kind.as_str()),
        }
    }
}
