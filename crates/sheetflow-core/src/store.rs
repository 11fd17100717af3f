//! Read-only view of sheet and cell data
//!
//! The formula engine only ever reads through [`CellStore`]; edits go to the
//! store and are then announced to the engine.

use crate::cell::{is_formula, CellPosition};
use std::fmt;

/// Stable identifier of a sheet, never reused within a workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SheetId(pub u32);

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of raw cell content for evaluation
pub trait CellStore {
    /// Raw content of a cell, `None` for empty cells
    fn cell_content(&self, sheet: SheetId, pos: CellPosition) -> Option<&str>;

    /// Explicit number format of a cell
    fn cell_format(&self, sheet: SheetId, pos: CellPosition) -> Option<&str>;

    /// `(cols, rows)` of a sheet, `None` if the sheet does not exist
    fn sheet_dimensions(&self, sheet: SheetId) -> Option<(u32, u32)>;

    /// Look up a sheet by name (case-insensitive)
    fn sheet_id_by_name(&self, name: &str) -> Option<SheetId>;

    /// Name of a sheet
    fn sheet_name(&self, sheet: SheetId) -> Option<&str>;

    /// All sheets, in display order
    fn sheet_ids(&self) -> Vec<SheetId>;

    /// Positions of all non-empty cells on a sheet
    fn cell_positions(&self, sheet: SheetId) -> Vec<CellPosition>;

    fn column_exists(&self, sheet: SheetId, col: u32) -> bool {
        self.sheet_dimensions(sheet)
            .map_or(false, |(cols, _)| col < cols)
    }

    fn row_exists(&self, sheet: SheetId, row: u32) -> bool {
        self.sheet_dimensions(sheet)
            .map_or(false, |(_, rows)| row < rows)
    }

    /// Every cell holding a formula, sheet by sheet
    fn formula_cells(&self) -> Vec<(SheetId, CellPosition)> {
        self.sheet_ids()
            .into_iter()
            .flat_map(|sheet| {
                self.cell_positions(sheet)
                    .into_iter()
                    .filter(move |pos| self.cell_content(sheet, *pos).map_or(false, is_formula))
                    .map(move |pos| (sheet, pos))
            })
            .collect()
    }
}
