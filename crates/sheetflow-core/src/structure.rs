//! Row and column insertion/deletion
//!
//! A [`StructuralChange`] knows how every index along its axis moves, so the
//! store, the reference rewriter and the dependency graph all shift cells the
//! same way.

use crate::cell::{CellPosition, Zone};
use crate::store::SheetId;
use crate::{MAX_COLS, MAX_ROWS};

/// Direction a structural change operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Column,
    Row,
}

/// Insertion or deletion of whole columns/rows on one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralChange {
    /// Insert `count` columns before column `before`
    InsertColumns { sheet: SheetId, before: u32, count: u32 },
    /// Delete `count` columns starting at column `start`
    DeleteColumns { sheet: SheetId, start: u32, count: u32 },
    /// Insert `count` rows before row `before`
    InsertRows { sheet: SheetId, before: u32, count: u32 },
    /// Delete `count` rows starting at row `start`
    DeleteRows { sheet: SheetId, start: u32, count: u32 },
}

impl StructuralChange {
    pub fn sheet(&self) -> SheetId {
        match *self {
            StructuralChange::InsertColumns { sheet, .. }
            | StructuralChange::DeleteColumns { sheet, .. }
            | StructuralChange::InsertRows { sheet, .. }
            | StructuralChange::DeleteRows { sheet, .. } => sheet,
        }
    }

    pub fn axis(&self) -> Axis {
        match self {
            StructuralChange::InsertColumns { .. } | StructuralChange::DeleteColumns { .. } => {
                Axis::Column
            }
            StructuralChange::InsertRows { .. } | StructuralChange::DeleteRows { .. } => Axis::Row,
        }
    }

    fn limit(&self) -> u32 {
        match self.axis() {
            Axis::Column => MAX_COLS,
            Axis::Row => MAX_ROWS,
        }
    }

    /// New index of a line, `None` when it is deleted or pushed off the grid
    pub fn map_index(&self, idx: u32) -> Option<u32> {
        match *self {
            StructuralChange::InsertColumns { before, count, .. }
            | StructuralChange::InsertRows { before, count, .. } => {
                if idx < before {
                    Some(idx)
                } else {
                    let moved = idx as u64 + count as u64;
                    (moved < self.limit() as u64).then_some(moved as u32)
                }
            }
            StructuralChange::DeleteColumns { start, count, .. }
            | StructuralChange::DeleteRows { start, count, .. } => {
                if idx < start {
                    Some(idx)
                } else if (idx as u64) < start as u64 + count as u64 {
                    None
                } else {
                    Some(idx - count)
                }
            }
        }
    }

    /// New bounds of an inclusive span of lines
    ///
    /// Deleting lines inside a span narrows it; `None` only when every line
    /// of the span is deleted. Inserting inside a span widens it.
    pub fn map_span(&self, lo: u32, hi: u32) -> Option<(u32, u32)> {
        match *self {
            StructuralChange::InsertColumns { .. } | StructuralChange::InsertRows { .. } => {
                let new_lo = self.map_index(lo)?;
                let new_hi = self.map_index(hi).unwrap_or(self.limit() - 1);
                Some((new_lo, new_hi))
            }
            StructuralChange::DeleteColumns { start, count, .. }
            | StructuralChange::DeleteRows { start, count, .. } => {
                let end = start as u64 + count as u64;
                if lo >= start && (hi as u64) < end {
                    return None;
                }
                let new_lo = match self.map_index(lo) {
                    Some(idx) => idx,
                    None => start,
                };
                let new_hi = match self.map_index(hi) {
                    Some(idx) => idx,
                    None => start - 1,
                };
                Some((new_lo, new_hi))
            }
        }
    }

    /// New position of a cell; cells on other sheets never move
    pub fn map_position(&self, sheet: SheetId, pos: CellPosition) -> Option<CellPosition> {
        if sheet != self.sheet() {
            return Some(pos);
        }
        match self.axis() {
            Axis::Column => self.map_index(pos.col).map(|col| CellPosition::new(col, pos.row)),
            Axis::Row => self.map_index(pos.row).map(|row| CellPosition::new(pos.col, row)),
        }
    }

    /// New bounds of a zone, `None` when nothing of it survives
    pub fn map_zone(&self, sheet: SheetId, zone: Zone) -> Option<Zone> {
        if sheet != self.sheet() {
            return Some(zone);
        }
        match self.axis() {
            Axis::Column => {
                let (left, right) = self.map_span(zone.left, zone.right)?;
                Some(Zone { left, right, ..zone })
            }
            Axis::Row => {
                let (top, bottom) = self.map_span(zone.top, zone.bottom)?;
                Some(Zone { top, bottom, ..zone })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHEET: SheetId = SheetId(1);

    fn zone(s: &str) -> Zone {
        s.parse().unwrap()
    }

    #[test]
    fn test_delete_columns_shifts_and_drops() {
        let change = StructuralChange::DeleteColumns {
            sheet: SHEET,
            start: 1,
            count: 2,
        };
        assert_eq!(change.map_index(0), Some(0));
        assert_eq!(change.map_index(1), None);
        assert_eq!(change.map_index(2), None);
        assert_eq!(change.map_index(3), Some(1));
    }

    #[test]
    fn test_delete_narrows_span() {
        let change = StructuralChange::DeleteColumns {
            sheet: SHEET,
            start: 1,
            count: 2,
        };
        assert_eq!(change.map_zone(SHEET, zone("A1:E1")), Some(zone("A1:C1")));
        assert_eq!(change.map_zone(SHEET, zone("B1:D1")), Some(zone("B1")));
        assert_eq!(change.map_zone(SHEET, zone("A1:B1")), Some(zone("A1")));
        assert_eq!(change.map_zone(SHEET, zone("B1:C5")), None);
        assert_eq!(
            change.map_zone(SheetId(2), zone("B1:C5")),
            Some(zone("B1:C5"))
        );
    }

    #[test]
    fn test_insert_rows_widens_straddling_span() {
        let change = StructuralChange::InsertRows {
            sheet: SHEET,
            before: 2,
            count: 3,
        };
        assert_eq!(change.map_zone(SHEET, zone("A1:A5")), Some(zone("A1:A8")));
        assert_eq!(change.map_zone(SHEET, zone("A3:A4")), Some(zone("A6:A7")));
        assert_eq!(change.map_zone(SHEET, zone("A1:A2")), Some(zone("A1:A2")));
        assert_eq!(
            change.map_position(SHEET, CellPosition::new(0, 2)),
            Some(CellPosition::new(0, 5))
        );
    }

    #[test]
    fn test_insert_pushes_off_grid() {
        let change = StructuralChange::InsertColumns {
            sheet: SHEET,
            before: 0,
            count: 1,
        };
        assert_eq!(change.map_index(MAX_COLS - 1), None);
    }
}
