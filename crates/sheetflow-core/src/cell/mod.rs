//! Cell-related types
//!
//! This module contains:
//! - [`Cell`] - raw user content plus style and format
//! - [`CellPosition`] - a cell's location (e.g., "A1")
//! - [`Zone`] - a rectangular block of cells (e.g., "A1:B10")
//! - [`ErrorKind`] - evaluation failure categories

mod address;
mod value;

pub use address::{column_to_letters, letters_to_column, CellPosition, Zone};
pub use value::ErrorKind;

/// Content of one cell as typed by the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    /// Raw content; a formula when it starts with `=`
    pub content: String,
    /// Optional style id
    pub style_id: Option<u32>,
    /// Optional number format (e.g. "0.00%")
    pub format: Option<String>,
}

impl Cell {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn is_formula(&self) -> bool {
        is_formula(&self.content)
    }

    /// No content, style or format
    pub fn is_blank(&self) -> bool {
        self.content.is_empty() && self.style_id.is_none() && self.format.is_none()
    }
}

/// Whether raw content is a formula
pub fn is_formula(content: &str) -> bool {
    content.starts_with('=')
}
