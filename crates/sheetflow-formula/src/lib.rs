//! # sheetflow-formula
//!
//! Formula engine for sheetflow.
//!
//! This crate provides:
//! - Tokenizing and parsing formulas (text → AST)
//! - Normalization into canonical text with placeholder dependencies
//! - Reference resolution, translation and structural rewriting
//! - Dependency tracking and cycle-aware, memoized evaluation
//! - A per-engine registry of built-in and custom functions
//!
//! ## Example
//!
//! ```rust
//! use sheetflow_formula::{normalize, Locale};
//!
//! let n = normalize("=SUM(A1:A10) * 2", &Locale::default()).unwrap();
//! assert_eq!(n.text, "=SUM(|0|)*|N0|");
//! ```

pub mod ast;
pub mod config;
pub mod dependency;
pub mod engine;
pub mod error;
mod evaluator;
pub mod functions;
pub mod inference;
pub mod normalizer;
pub mod parser;
pub mod references;
pub mod tokenizer;
pub mod value;

pub use ast::{BinaryOperator, Expr, UnaryOperator};
pub use config::{EngineConfig, GridLimits, Locale};
pub use dependency::{CellKey, DependencyGraph, Node};
pub use engine::{CalculationStats, Engine, Rewrite};
pub use error::{FormulaError, FormulaResult, RegistryError};
pub use functions::{
    ArgSpec, ArgType, Args, FormatRule, FunctionContext, FunctionDef, FunctionRegistry, Vectorize,
};
pub use normalizer::{denormalize, denormalize_with, normalize, CompiledFormula, Dependencies, NormalizedFormula};
pub use parser::parse_formula;
pub use references::{InvalidReference, RangeReference};
pub use value::{
    CellError, EvalError, EvalResult, Evaluated, EvaluatedCell, FormattedValue, Matrix, Value,
};
