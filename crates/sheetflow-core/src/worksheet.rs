//! Worksheet type

use crate::cell::{Cell, CellPosition, Zone};
use crate::error::Result;
use crate::store::SheetId;
use crate::structure::{Axis, StructuralChange};
use std::collections::BTreeMap;

/// Default number of columns of a new sheet
pub const DEFAULT_COLS: u32 = 26;

/// Default number of rows of a new sheet
pub const DEFAULT_ROWS: u32 = 100;

/// A worksheet (single sheet in a workbook)
#[derive(Debug, Clone)]
pub struct Worksheet {
    id: SheetId,
    name: String,
    cols: u32,
    rows: u32,
    /// Cells keyed row-major
    cells: BTreeMap<CellPosition, Cell>,
}

impl Worksheet {
    /// Create an empty worksheet with default dimensions
    pub fn new<S: Into<String>>(id: SheetId, name: S) -> Self {
        Self {
            id,
            name: name.into(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            cells: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> SheetId {
        self.id
    }

    /// Get the worksheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    /// `(cols, rows)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn set_dimensions(&mut self, cols: u32, rows: u32) {
        self.cols = cols;
        self.rows = rows;
    }

    /// Get a cell by A1 address
    pub fn cell(&self, address: &str) -> Result<Option<&Cell>> {
        let pos = CellPosition::parse(address)?;
        Ok(self.cell_at(pos))
    }

    pub fn cell_at(&self, pos: CellPosition) -> Option<&Cell> {
        self.cells.get(&pos)
    }

    /// Raw content at a position, empty string for empty cells
    pub fn content_at(&self, pos: CellPosition) -> &str {
        self.cells.get(&pos).map_or("", |c| c.content.as_str())
    }

    /// Set the raw content of a cell by A1 address
    pub fn set_content(&mut self, address: &str, content: &str) -> Result<CellPosition> {
        let pos = CellPosition::parse(address)?;
        self.set_content_at(pos, content);
        Ok(pos)
    }

    /// Set the raw content of a cell, keeping its style and format
    pub fn set_content_at(&mut self, pos: CellPosition, content: &str) {
        let cell = self.cells.entry(pos).or_default();
        cell.content = content.to_string();
        if cell.is_blank() {
            self.cells.remove(&pos);
        } else {
            self.grow_to(pos);
        }
    }

    /// Set the number format of a cell
    pub fn set_format_at(&mut self, pos: CellPosition, format: Option<&str>) {
        let cell = self.cells.entry(pos).or_default();
        cell.format = format.map(str::to_string);
        if cell.is_blank() {
            self.cells.remove(&pos);
        }
    }

    /// Replace a cell entirely
    pub fn set_cell_at(&mut self, pos: CellPosition, cell: Cell) {
        if cell.is_blank() {
            self.cells.remove(&pos);
        } else {
            self.grow_to(pos);
            self.cells.insert(pos, cell);
        }
    }

    /// Iterate over non-empty cells, row by row
    pub fn cells(&self) -> impl Iterator<Item = (CellPosition, &Cell)> {
        self.cells.iter().map(|(pos, cell)| (*pos, cell))
    }

    /// Bounding zone of all non-empty cells
    pub fn used_zone(&self) -> Option<Zone> {
        let mut iter = self.cells.keys();
        let first = *iter.next()?;
        Some(iter.fold(Zone::single(first), |zone, pos| Zone {
            left: zone.left.min(pos.col),
            right: zone.right.max(pos.col),
            top: zone.top.min(pos.row),
            bottom: zone.bottom.max(pos.row),
        }))
    }

    fn grow_to(&mut self, pos: CellPosition) {
        self.cols = self.cols.max(pos.col + 1);
        self.rows = self.rows.max(pos.row + 1);
    }

    /// Move cells for an inserted or deleted block of columns/rows
    ///
    /// Cells in deleted lines are dropped. Contents are moved verbatim;
    /// rewriting formulas is the engine's job.
    pub fn apply_structural_change(&mut self, change: &StructuralChange) {
        if change.sheet() != self.id {
            return;
        }

        let id = self.id;
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter_map(|(pos, cell)| change.map_position(id, pos).map(|new_pos| (new_pos, cell)))
            .collect();

        let (count, grow) = match *change {
            StructuralChange::InsertColumns { count, .. }
            | StructuralChange::InsertRows { count, .. } => (count, true),
            StructuralChange::DeleteColumns { count, .. }
            | StructuralChange::DeleteRows { count, .. } => (count, false),
        };
        let size = match change.axis() {
            Axis::Column => &mut self.cols,
            Axis::Row => &mut self.rows,
        };
        *size = if grow {
            size.saturating_add(count)
        } else {
            size.saturating_sub(count).max(1)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(s: &str) -> CellPosition {
        CellPosition::parse(s).unwrap()
    }

    #[test]
    fn test_set_and_clear() {
        let mut sheet = Worksheet::new(SheetId(1), "Sheet1");
        sheet.set_content("B2", "42").unwrap();
        assert_eq!(sheet.content_at(pos("B2")), "42");
        assert_eq!(sheet.content_at(pos("A1")), "");

        sheet.set_content("B2", "").unwrap();
        assert!(sheet.cell_at(pos("B2")).is_none());
    }

    #[test]
    fn test_cell_keeps_format_when_content_cleared() {
        let mut sheet = Worksheet::new(SheetId(1), "Sheet1");
        sheet.set_format_at(pos("A1"), Some("0.00%"));
        sheet.set_content_at(pos("A1"), "0.5");
        sheet.set_content_at(pos("A1"), "");
        assert_eq!(
            sheet.cell_at(pos("A1")).and_then(|c| c.format.as_deref()),
            Some("0.00%")
        );
    }

    #[test]
    fn test_grows_dimensions() {
        let mut sheet = Worksheet::new(SheetId(1), "Sheet1");
        sheet.set_content("AD200", "x").unwrap();
        assert_eq!(sheet.dimensions(), (30, 200));
        assert_eq!(sheet.used_zone(), Some(Zone::single(pos("AD200"))));
    }

    #[test]
    fn test_delete_columns_moves_cells() {
        let mut sheet = Worksheet::new(SheetId(1), "Sheet1");
        sheet.set_content("A1", "a").unwrap();
        sheet.set_content("B1", "b").unwrap();
        sheet.set_content("D1", "d").unwrap();

        sheet.apply_structural_change(&StructuralChange::DeleteColumns {
            sheet: SheetId(1),
            start: 1,
            count: 2,
        });

        assert_eq!(sheet.content_at(pos("A1")), "a");
        assert_eq!(sheet.content_at(pos("B1")), "d");
        assert!(sheet.cell_at(pos("D1")).is_none());
        assert_eq!(sheet.dimensions(), (24, 100));
    }

    #[test]
    fn test_insert_rows_moves_cells() {
        let mut sheet = Worksheet::new(SheetId(1), "Sheet1");
        sheet.set_content("A1", "top").unwrap();
        sheet.set_content("A2", "moved").unwrap();

        sheet.apply_structural_change(&StructuralChange::InsertRows {
            sheet: SheetId(1),
            before: 1,
            count: 2,
        });

        assert_eq!(sheet.content_at(pos("A1")), "top");
        assert_eq!(sheet.content_at(pos("A4")), "moved");
        assert_eq!(sheet.dimensions(), (26, 102));
    }
}
