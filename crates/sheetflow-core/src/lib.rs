//! # sheetflow-core
//!
//! Core data structures for the sheetflow formula engine.
//!
//! This crate provides:
//! - [`CellPosition`] and [`Zone`] - Cell addressing and rectangular blocks
//! - [`ErrorKind`] - The fixed set of evaluation errors and their tags
//! - [`CellStore`] - The read-only view the engine evaluates against
//! - [`Workbook`], [`Worksheet`] - An in-memory store implementing it
//! - [`StructuralChange`] - Column/row insertion and deletion
//!
//! ## Example
//!
//! ```rust
//! use sheetflow_core::{CellPosition, CellStore, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let id = workbook.first_sheet().unwrap();
//! let sheet = workbook.worksheet_mut(id).unwrap();
//! sheet.set_content("A1", "=B1*2").unwrap();
//! sheet.set_content("B1", "21").unwrap();
//!
//! assert_eq!(workbook.cell_content(id, CellPosition::new(0, 0)), Some("=B1*2"));
//! ```

pub mod cell;
pub mod error;
#[cfg(feature = "serde")]
pub mod interchange;
pub mod store;
pub mod structure;
pub mod workbook;
pub mod worksheet;

pub use cell::{
    column_to_letters, is_formula, letters_to_column, Cell, CellPosition, ErrorKind, Zone,
};
pub use error::{Error, Result};
pub use store::{CellStore, SheetId};
pub use structure::{Axis, StructuralChange};
pub use workbook::Workbook;
pub use worksheet::Worksheet;

#[cfg(feature = "serde")]
pub use interchange::{CellData, SheetData, WorkbookData};

/// Maximum number of rows in a sheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a sheet
pub const MAX_COLS: u32 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
