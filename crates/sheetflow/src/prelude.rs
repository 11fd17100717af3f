//! Prelude module - common imports for sheetflow users
//!
//! ```rust
//! use sheetflow::prelude::*;
//! ```

pub use crate::{
    // Main types
    Spreadsheet,
    Workbook,
    Worksheet,
    CellPosition,
    SheetId,
    Zone,

    // Engine types
    Engine,
    EngineConfig,
    Locale,
    CalculationStats,
    EvaluatedCell,

    // Custom functions
    ArgSpec,
    ArgType,
    Args,
    Evaluated,
    EvalError,
    FormatRule,
    FunctionContext,
    FunctionDef,
    Vectorize,

    // Error types
    Error,
    ErrorKind,
    Result,
};
