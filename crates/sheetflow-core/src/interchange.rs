//! Interchange representation of a workbook
//!
//! Formula cells are stored with their human-readable content, e.g.
//! `{ "content": "=A1+B2" }`. Nothing derived from evaluation is persisted.

use crate::cell::{Cell, CellPosition};
use crate::error::Result;
use crate::workbook::Workbook;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized workbook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookData {
    pub sheets: Vec<SheetData>,
}

/// Serialized worksheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    /// Cells keyed by A1 address
    #[serde(default)]
    pub cells: BTreeMap<String, CellData>,
}

/// Serialized cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Workbook {
    /// Export to the interchange representation
    pub fn to_data(&self) -> WorkbookData {
        WorkbookData {
            sheets: self
                .worksheets()
                .map(|ws| {
                    let (cols, rows) = ws.dimensions();
                    SheetData {
                        name: ws.name().to_string(),
                        cols: Some(cols),
                        rows: Some(rows),
                        cells: ws
                            .cells()
                            .map(|(pos, cell)| {
                                (
                                    pos.to_a1_string(),
                                    CellData {
                                        content: cell.content.clone(),
                                        style: cell.style_id,
                                        format: cell.format.clone(),
                                    },
                                )
                            })
                            .collect(),
                    }
                })
                .collect(),
        }
    }

    /// Build a workbook from the interchange representation
    ///
    /// An empty sheet list yields a default single-sheet workbook.
    pub fn from_data(data: &WorkbookData) -> Result<Self> {
        if data.sheets.is_empty() {
            return Ok(Workbook::new());
        }

        let mut workbook = Workbook::empty();
        for sheet_data in &data.sheets {
            let id = workbook.add_worksheet_with_name(&sheet_data.name)?;
            let Some(sheet) = workbook.worksheet_mut(id) else {
                continue;
            };
            let (cols, rows) = sheet.dimensions();
            sheet.set_dimensions(
                sheet_data.cols.unwrap_or(cols),
                sheet_data.rows.unwrap_or(rows),
            );
            for (address, cell) in &sheet_data.cells {
                let pos = CellPosition::parse(address)?;
                sheet.set_cell_at(
                    pos,
                    Cell {
                        content: cell.content.clone(),
                        style_id: cell.style,
                        format: cell.format.clone(),
                    },
                );
            }
        }
        Ok(workbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CellStore, SheetId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip() {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(SheetId(1)).unwrap();
        sheet.set_content("A1", "=A2+B2").unwrap();
        sheet.set_content("A2", "2").unwrap();
        sheet.set_format_at(CellPosition::new(0, 1), Some("0.00%"));

        let data = wb.to_data();
        assert_eq!(data.sheets[0].cells["A1"].content, "=A2+B2");

        let restored = Workbook::from_data(&data).unwrap();
        assert_eq!(restored.to_data(), data);
        assert_eq!(
            restored.cell_format(SheetId(1), CellPosition::new(0, 1)),
            Some("0.00%")
        );
    }

    #[test]
    fn test_rejects_bad_address() {
        let mut data = WorkbookData::default();
        let mut sheet = SheetData {
            name: "Sheet1".into(),
            ..Default::default()
        };
        sheet.cells.insert("1A".into(), CellData::default());
        data.sheets.push(sheet);
        assert!(Workbook::from_data(&data).is_err());
    }
}
