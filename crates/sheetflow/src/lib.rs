//! # sheetflow
//!
//! A spreadsheet formula engine.
//!
//! Formulas are normalized into canonical text shared by every cell with the
//! same shape, references are tracked in a dependency graph, and cells are
//! evaluated on demand with cycle detection, format propagation and matrix
//! broadcasting.
//!
//! ## Features
//!
//! - Normalized, cached formulas and reference translation
//! - Dependency tracking across rows/columns insertion and deletion
//! - Typed values and errors (`#REF`, `#CYCLE`, `#DIV/0!`, ...)
//! - Built-in function library, extensible per spreadsheet
//! - Spilling array results
//! - JSON interchange format (`json` feature, on by default)
//!
//! ## Example
//!
//! ```rust
//! use sheetflow::prelude::*;
//!
//! let mut sheet = Spreadsheet::new();
//! let id = sheet.first_sheet();
//! sheet.set_content(id, "A1", "3").unwrap();
//! sheet.set_content(id, "A2", "4").unwrap();
//! sheet.set_content(id, "A3", "=SQRT(A1^2 + A2^2)").unwrap();
//!
//! assert_eq!(sheet.evaluated_cell(id, "A3").unwrap(), EvaluatedCell::Number(5.0, None));
//! ```

pub mod error;
pub mod prelude;
pub mod spreadsheet;

pub use error::{Error, Result};
pub use spreadsheet::Spreadsheet;

// Re-export core types
pub use sheetflow_core::{
    column_to_letters, letters_to_column, Axis, Cell, CellPosition, CellStore, ErrorKind,
    SheetId, StructuralChange, Workbook, Worksheet, Zone, MAX_COLS, MAX_ROWS, MAX_SHEET_NAME_LEN,
};
pub use sheetflow_core::{CellData, SheetData, WorkbookData};

// Re-export formula types
pub use sheetflow_formula::{
    denormalize, normalize, ArgSpec, ArgType, Args, CalculationStats, Engine, EngineConfig,
    EvalError, EvalResult, Evaluated, EvaluatedCell, FormatRule, FormattedValue, FormulaError,
    FunctionContext, FunctionDef, FunctionRegistry, GridLimits, Locale, Matrix, RegistryError,
    Value, Vectorize,
};
