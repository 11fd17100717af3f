//! Workbook type - the in-memory cell store

use crate::cell::CellPosition;
use crate::error::{Error, Result};
use crate::store::{CellStore, SheetId};
use crate::structure::StructuralChange;
use crate::worksheet::Worksheet;
use crate::MAX_SHEET_NAME_LEN;

/// A workbook (ordered collection of worksheets)
#[derive(Debug, Clone)]
pub struct Workbook {
    worksheets: Vec<Worksheet>,
    next_id: u32,
}

impl Workbook {
    /// Create a new workbook with one worksheet named "Sheet1"
    pub fn new() -> Self {
        Self {
            worksheets: vec![Worksheet::new(SheetId(1), "Sheet1")],
            next_id: 2,
        }
    }

    /// Create a workbook with no worksheets
    pub fn empty() -> Self {
        Self {
            worksheets: Vec::new(),
            next_id: 1,
        }
    }

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.worksheets.len()
    }

    /// Get a worksheet by id
    pub fn worksheet(&self, id: SheetId) -> Option<&Worksheet> {
        self.worksheets.iter().find(|ws| ws.id() == id)
    }

    /// Get a mutable worksheet by id
    pub fn worksheet_mut(&mut self, id: SheetId) -> Option<&mut Worksheet> {
        self.worksheets.iter_mut().find(|ws| ws.id() == id)
    }

    /// Get a worksheet by name (case-insensitive)
    pub fn worksheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.worksheets
            .iter()
            .find(|ws| ws.name().eq_ignore_ascii_case(name))
    }

    /// Id of the first worksheet
    pub fn first_sheet(&self) -> Option<SheetId> {
        self.worksheets.first().map(Worksheet::id)
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.worksheets.iter()
    }

    /// Add a new worksheet with a generated name
    pub fn add_worksheet(&mut self) -> Result<SheetId> {
        let name = self.generate_sheet_name();
        self.add_worksheet_with_name(&name)
    }

    /// Add a new worksheet with specified name
    pub fn add_worksheet_with_name(&mut self, name: &str) -> Result<SheetId> {
        self.validate_sheet_name(name, None)?;

        let id = SheetId(self.next_id);
        self.next_id += 1;
        self.worksheets.push(Worksheet::new(id, name));
        Ok(id)
    }

    /// Remove a worksheet
    pub fn remove_worksheet(&mut self, id: SheetId) -> Result<Worksheet> {
        let index = self.index_of(id)?;
        if self.worksheets.len() == 1 {
            return Err(Error::LastSheet);
        }
        Ok(self.worksheets.remove(index))
    }

    /// Rename a worksheet
    pub fn rename_worksheet(&mut self, id: SheetId, new_name: &str) -> Result<()> {
        let index = self.index_of(id)?;
        self.validate_sheet_name(new_name, Some(index))?;
        self.worksheets[index].set_name(new_name);
        Ok(())
    }

    /// Apply a column/row insertion or deletion to the affected sheet
    pub fn apply_structural_change(&mut self, change: &StructuralChange) -> Result<()> {
        let sheet = change.sheet();
        self.worksheet_mut(sheet)
            .ok_or(Error::SheetIdNotFound(sheet.0))?
            .apply_structural_change(change);
        Ok(())
    }

    fn index_of(&self, id: SheetId) -> Result<usize> {
        self.worksheets
            .iter()
            .position(|ws| ws.id() == id)
            .ok_or(Error::SheetIdNotFound(id.0))
    }

    /// Validate a sheet name, optionally excluding a sheet from duplicate check
    fn validate_sheet_name(&self, name: &str, exclude_index: Option<usize>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name too long (max {} characters)",
                MAX_SHEET_NAME_LEN
            )));
        }

        const INVALID_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']', '!'];
        for c in INVALID_CHARS {
            if name.contains(*c) {
                return Err(Error::InvalidSheetName(format!(
                    "Sheet name cannot contain '{}'",
                    c
                )));
            }
        }
        if name.starts_with('\'') || name.ends_with('\'') {
            return Err(Error::InvalidSheetName(
                "Sheet name cannot start or end with an apostrophe".into(),
            ));
        }

        for (i, ws) in self.worksheets.iter().enumerate() {
            if Some(i) != exclude_index && ws.name().eq_ignore_ascii_case(name) {
                return Err(Error::DuplicateSheetName(name.into()));
            }
        }

        Ok(())
    }

    fn generate_sheet_name(&self) -> String {
        let mut n = self.worksheets.len() + 1;
        loop {
            let name = format!("Sheet{}", n);
            if self.validate_sheet_name(&name, None).is_ok() {
                return name;
            }
            n += 1;
        }
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl CellStore for Workbook {
    fn cell_content(&self, sheet: SheetId, pos: CellPosition) -> Option<&str> {
        self.worksheet(sheet)?
            .cell_at(pos)
            .map(|c| c.content.as_str())
            .filter(|c| !c.is_empty())
    }

    fn cell_format(&self, sheet: SheetId, pos: CellPosition) -> Option<&str> {
        self.worksheet(sheet)?.cell_at(pos)?.format.as_deref()
    }

    fn sheet_dimensions(&self, sheet: SheetId) -> Option<(u32, u32)> {
        self.worksheet(sheet).map(Worksheet::dimensions)
    }

    fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
        self.worksheet_by_name(name).map(Worksheet::id)
    }

    fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.worksheet(sheet).map(Worksheet::name)
    }

    fn sheet_ids(&self) -> Vec<SheetId> {
        self.worksheets.iter().map(Worksheet::id).collect()
    }

    fn cell_positions(&self, sheet: SheetId) -> Vec<CellPosition> {
        self.worksheet(sheet)
            .map(|ws| {
                ws.cells()
                    .filter(|(_, c)| !c.content.is_empty())
                    .map(|(pos, _)| pos)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_workbook() {
        let wb = Workbook::new();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.sheet_name(SheetId(1)), Some("Sheet1"));
        assert_eq!(wb.sheet_id_by_name("sheet1"), Some(SheetId(1)));
    }

    #[test]
    fn test_sheet_ids_are_not_reused() {
        let mut wb = Workbook::new();
        let second = wb.add_worksheet().unwrap();
        assert_eq!(wb.sheet_name(second), Some("Sheet2"));
        wb.remove_worksheet(second).unwrap();
        let third = wb.add_worksheet().unwrap();
        assert_ne!(second, third);
    }

    #[test]
    fn test_sheet_name_validation() {
        let mut wb = Workbook::new();
        assert!(matches!(
            wb.add_worksheet_with_name("SHEET1"),
            Err(Error::DuplicateSheetName(_))
        ));
        assert!(wb.add_worksheet_with_name("").is_err());
        assert!(wb.add_worksheet_with_name("a/b").is_err());
        assert!(wb.add_worksheet_with_name("Q1 Sales").is_ok());
    }

    #[test]
    fn test_rename_and_remove() {
        let mut wb = Workbook::new();
        let id = wb.add_worksheet_with_name("Data").unwrap();
        wb.rename_worksheet(id, "Inputs").unwrap();
        assert_eq!(wb.sheet_id_by_name("Inputs"), Some(id));
        assert_eq!(wb.sheet_id_by_name("Data"), None);

        wb.remove_worksheet(id).unwrap();
        assert!(matches!(
            wb.remove_worksheet(SheetId(1)),
            Err(Error::LastSheet)
        ));
    }

    #[test]
    fn test_cell_store_view() {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(SheetId(1)).unwrap();
        sheet.set_content("A1", "=B1").unwrap();
        sheet.set_content("B1", "3").unwrap();

        let a1 = CellPosition::new(0, 0);
        assert_eq!(wb.cell_content(SheetId(1), a1), Some("=B1"));
        assert_eq!(wb.cell_content(SheetId(1), CellPosition::new(5, 5)), None);
        assert_eq!(wb.cell_positions(SheetId(1)).len(), 2);
        assert!(wb.column_exists(SheetId(1), 25));
        assert!(!wb.column_exists(SheetId(1), 26));
        assert_eq!(wb.formula_cells(), vec![(SheetId(1), a1)]);
    }
}
