//! Spreadsheet command layer
//!
//! A [`Spreadsheet`] owns a [`Workbook`] and the [`Engine`] evaluating it,
//! and keeps them in step: every edit goes to the workbook first and is then
//! announced to the engine, and formula texts the engine rewrites go back
//! into the workbook.
//!
//! # Example
//!
//! ```rust
//! use sheetflow::prelude::*;
//!
//! let mut sheet = Spreadsheet::new();
//! let id = sheet.first_sheet();
//! sheet.set_content(id, "A1", "10").unwrap();
//! sheet.set_content(id, "A2", "=A1*2").unwrap();
//! assert_eq!(sheet.evaluated_cell(id, "A2").unwrap(), EvaluatedCell::Number(20.0, None));
//!
//! sheet.insert_rows(id, 0, 1).unwrap();
//! assert_eq!(sheet.cell_text(id, "A3").unwrap().as_deref(), Some("=A2*2"));
//! ```

use crate::error::{Error, Result};
use log::debug;
use sheetflow_core::{CellPosition, CellStore, SheetId, StructuralChange, Workbook};
use sheetflow_formula::{
    CalculationStats, Engine, EngineConfig, EvaluatedCell, FunctionDef, Rewrite,
};

/// A workbook together with its formula engine
#[derive(Debug)]
pub struct Spreadsheet {
    workbook: Workbook,
    engine: Engine,
}

impl Default for Spreadsheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Spreadsheet {
    /// An empty single-sheet spreadsheet
    pub fn new() -> Self {
        Self::from_workbook(Workbook::new(), EngineConfig::default())
    }

    /// An empty single-sheet spreadsheet with engine options
    pub fn with_config(config: EngineConfig) -> Self {
        Self::from_workbook(Workbook::new(), config)
    }

    /// Evaluate an existing workbook
    pub fn from_workbook(workbook: Workbook, config: EngineConfig) -> Self {
        let mut engine = Engine::with_config(config);
        engine.load(&workbook);
        Self { workbook, engine }
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Give the workbook back, dropping the engine
    pub fn into_workbook(self) -> Workbook {
        self.workbook
    }

    /// Id of the first sheet
    pub fn first_sheet(&self) -> SheetId {
        // A workbook built through this type always keeps one sheet
        self.workbook.first_sheet().unwrap_or(SheetId(1))
    }

    /// Look up a sheet by name (case-insensitive)
    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.workbook.sheet_id_by_name(name)
    }

    fn check_sheet(&self, sheet: SheetId) -> Result<()> {
        match self.workbook.worksheet(sheet) {
            Some(_) => Ok(()),
            None => Err(sheetflow_core::Error::SheetIdNotFound(sheet.0).into()),
        }
    }

    // === Cell edits ===

    /// Set the raw content of a cell by A1 address; empty content clears it
    pub fn set_content(&mut self, sheet: SheetId, address: &str, content: &str) -> Result<()> {
        let pos = CellPosition::parse(address)?;
        self.set_content_at(sheet, pos, content)
    }

    pub fn set_content_at(&mut self, sheet: SheetId, pos: CellPosition, content: &str) -> Result<()> {
        self.workbook
            .worksheet_mut(sheet)
            .ok_or(sheetflow_core::Error::SheetIdNotFound(sheet.0))?
            .set_content_at(pos, content);
        self.engine.update_cell(&self.workbook, sheet, pos);
        Ok(())
    }

    /// Set the number format of a cell
    pub fn set_format(&mut self, sheet: SheetId, address: &str, format: Option<&str>) -> Result<()> {
        let pos = CellPosition::parse(address)?;
        self.workbook
            .worksheet_mut(sheet)
            .ok_or(sheetflow_core::Error::SheetIdNotFound(sheet.0))?
            .set_format_at(pos, format);
        self.engine.update_cell(&self.workbook, sheet, pos);
        Ok(())
    }

    /// Raw content as stored
    pub fn content(&self, sheet: SheetId, address: &str) -> Result<Option<&str>> {
        let pos = CellPosition::parse(address)?;
        Ok(self.workbook.cell_content(sheet, pos))
    }

    // === Reading ===

    /// Evaluated value of a cell by A1 address
    pub fn evaluated_cell(&self, sheet: SheetId, address: &str) -> Result<EvaluatedCell> {
        let pos = CellPosition::parse(address)?;
        Ok(self.evaluated_at(sheet, pos))
    }

    pub fn evaluated_at(&self, sheet: SheetId, pos: CellPosition) -> EvaluatedCell {
        self.engine.evaluate(&self.workbook, sheet, pos)
    }

    /// Text of a cell as the user would edit it
    pub fn cell_text(&self, sheet: SheetId, address: &str) -> Result<Option<String>> {
        let pos = CellPosition::parse(address)?;
        Ok(self.engine.cell_text(&self.workbook, sheet, pos))
    }

    /// Evaluate every formula cell
    pub fn evaluate_all(&self) -> CalculationStats {
        self.engine.evaluate_all(&self.workbook)
    }

    /// Drop every result and evaluate every formula cell again
    pub fn recalculate(&self) -> CalculationStats {
        self.engine.recalculate(&self.workbook)
    }

    /// Let volatile formulas (RAND, NOW) produce new values
    pub fn refresh_volatile(&self) {
        self.engine.invalidate_volatile();
    }

    // === Formula translation ===

    /// Move the relative references of a formula written on `sheet`
    pub fn translate_formula(&self, sheet: SheetId, d_col: i64, d_row: i64, formula: &str) -> Result<String> {
        Ok(self
            .engine
            .translate_formula(&self.workbook, sheet, d_col, d_row, formula)?)
    }

    /// Copy a cell's content, moving its relative references
    pub fn copy_cell(&mut self, sheet: SheetId, from: &str, to: &str) -> Result<()> {
        let from = CellPosition::parse(from)?;
        let to = CellPosition::parse(to)?;
        let content = self
            .engine
            .translate_cell(&self.workbook, sheet, from, to)?
            .unwrap_or_default();
        self.set_content_at(sheet, to, &content)
    }

    // === Structural edits ===

    pub fn insert_columns(&mut self, sheet: SheetId, before: u32, count: u32) -> Result<()> {
        self.apply(StructuralChange::InsertColumns { sheet, before, count })
    }

    pub fn delete_columns(&mut self, sheet: SheetId, start: u32, count: u32) -> Result<()> {
        self.apply(StructuralChange::DeleteColumns { sheet, start, count })
    }

    pub fn insert_rows(&mut self, sheet: SheetId, before: u32, count: u32) -> Result<()> {
        self.apply(StructuralChange::InsertRows { sheet, before, count })
    }

    pub fn delete_rows(&mut self, sheet: SheetId, start: u32, count: u32) -> Result<()> {
        self.apply(StructuralChange::DeleteRows { sheet, start, count })
    }

    fn apply(&mut self, change: StructuralChange) -> Result<()> {
        self.check_sheet(change.sheet())?;
        let rewrites = self.engine.apply_structural_change(&self.workbook, &change);
        self.workbook.apply_structural_change(&change)?;
        self.write_back(rewrites)
    }

    /// Store formula texts rewritten by the engine
    fn write_back(&mut self, rewrites: Vec<Rewrite>) -> Result<()> {
        debug!("writing back {} rewritten formulas", rewrites.len());
        for (sheet, pos, text) in rewrites {
            self.workbook
                .worksheet_mut(sheet)
                .ok_or(sheetflow_core::Error::SheetIdNotFound(sheet.0))?
                .set_content_at(pos, &text);
        }
        Ok(())
    }

    // === Sheets ===

    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId> {
        let id = self.workbook.add_worksheet_with_name(name)?;
        self.engine.refresh_references(&self.workbook);
        Ok(id)
    }

    /// Remove a sheet; references to it read `#REF` but keep their text
    pub fn remove_sheet(&mut self, sheet: SheetId) -> Result<()> {
        self.workbook.remove_worksheet(sheet)?;
        self.engine.remove_sheet(&self.workbook, sheet);
        Ok(())
    }

    /// Rename a sheet; formulas naming it are rewritten
    pub fn rename_sheet(&mut self, sheet: SheetId, name: &str) -> Result<()> {
        self.workbook.rename_worksheet(sheet, name)?;
        let rewrites = self.engine.rename_sheet(&self.workbook);
        self.write_back(rewrites)
    }

    // === Functions ===

    /// Register a custom function on this spreadsheet's engine
    pub fn register_function(&mut self, def: FunctionDef, overwrite: bool) -> Result<()> {
        Ok(self.engine.register_function(def, overwrite)?)
    }

    pub fn remove_function(&mut self, name: &str) -> Result<()> {
        self.engine.remove_function(name)?;
        Ok(())
    }

    /// Value readable by functions through their context
    pub fn set_custom_value(&mut self, key: &str, value: &str) {
        self.engine.set_custom_value(key, value);
    }
}

#[cfg(feature = "json")]
mod json {
    use super::*;
    use sheetflow_core::WorkbookData;
    use std::path::Path;

    impl Spreadsheet {
        /// Read the JSON interchange format
        pub fn from_json(json: &str, config: EngineConfig) -> Result<Self> {
            let data: WorkbookData = serde_json::from_str(json)?;
            Ok(Self::from_workbook(Workbook::from_data(&data)?, config))
        }

        /// Write the JSON interchange format
        pub fn to_json(&self) -> Result<String> {
            Ok(serde_json::to_string_pretty(&self.workbook.to_data())?)
        }

        /// Open a JSON workbook file
        pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
            let json = std::fs::read_to_string(path.as_ref())?;
            Self::from_json(&json, config)
        }

        /// Save to a JSON workbook file
        pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
            std::fs::write(path.as_ref(), self.to_json()?)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::ErrorKind;

    #[test]
    fn test_edits_reach_the_engine() {
        let mut s = Spreadsheet::new();
        let id = s.first_sheet();
        s.set_content(id, "A1", "2").unwrap();
        s.set_content(id, "B1", "=A1^2").unwrap();
        assert_eq!(s.evaluated_cell(id, "B1").unwrap(), EvaluatedCell::Number(4.0, None));
        s.set_content(id, "A1", "").unwrap();
        assert_eq!(s.evaluated_cell(id, "B1").unwrap(), EvaluatedCell::Number(0.0, None));
    }

    #[test]
    fn test_format_edit_reaches_the_engine() {
        let mut s = Spreadsheet::new();
        let id = s.first_sheet();
        s.set_content(id, "A1", "0.5").unwrap();
        s.set_content(id, "B1", "=A1").unwrap();
        s.set_format(id, "A1", Some("0%")).unwrap();
        assert_eq!(s.evaluated_cell(id, "B1").unwrap().format(), Some("0%"));
    }

    #[test]
    fn test_copy_cell() {
        let mut s = Spreadsheet::new();
        let id = s.first_sheet();
        s.set_content(id, "A1", "1").unwrap();
        s.set_content(id, "A2", "2").unwrap();
        s.set_content(id, "B1", "=A1*10").unwrap();
        s.copy_cell(id, "B1", "B2").unwrap();
        assert_eq!(s.content(id, "B2").unwrap(), Some("=A2*10"));
        assert_eq!(s.evaluated_cell(id, "B2").unwrap(), EvaluatedCell::Number(20.0, None));
    }

    #[test]
    fn test_unknown_sheet() {
        let mut s = Spreadsheet::new();
        assert!(matches!(
            s.set_content(SheetId(99), "A1", "1"),
            Err(Error::Core(sheetflow_core::Error::SheetIdNotFound(99)))
        ));
        assert!(s.delete_rows(SheetId(99), 0, 1).is_err());
    }

    #[test]
    fn test_last_sheet_cannot_be_removed() {
        let mut s = Spreadsheet::new();
        let id = s.first_sheet();
        assert!(s.remove_sheet(id).is_err());
        assert_eq!(s.evaluated_cell(id, "A1").unwrap().error_kind(), None::<ErrorKind>);
    }
}
