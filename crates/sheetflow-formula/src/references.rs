//! Reference resolution and rewriting
//!
//! A reference in text form (`B2`, `$A$1:C$3`, `'My sheet'!A1`) becomes a
//! [`RangeReference`] pinned to a sheet id. Relative parts move when a
//! formula is translated; every kind of rewrite goes back to text through
//! [`RangeReference::to_text`].

use crate::config::GridLimits;
use crate::tokenizer::{is_cell_reference, INVALID_REFERENCE};
use sheetflow_core::{
    column_to_letters, letters_to_column, CellPosition, CellStore, SheetId, StructuralChange,
    Zone,
};
use thiserror::Error;

/// A reference that does not point anywhere
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid reference: {0}")]
pub struct InvalidReference(pub String);

/// A zone on a sheet with per-edge fixed (`$`) markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeReference {
    pub sheet_id: SheetId,
    pub zone: Zone,
    pub fixed_left: bool,
    pub fixed_right: bool,
    pub fixed_top: bool,
    pub fixed_bottom: bool,
    /// The reference was written with a sheet qualifier
    pub fixed_sheet: bool,
}

/// One corner of a reference as written
#[derive(Clone, Copy)]
struct Corner {
    col: u32,
    row: u32,
    fixed_col: bool,
    fixed_row: bool,
}

fn parse_corner(text: &str, limits: GridLimits) -> Option<Corner> {
    if !is_cell_reference(text) {
        return None;
    }
    let fixed_col = text.starts_with('$');
    let rest = text.trim_start_matches('$');
    let split = rest.find(|c: char| !c.is_ascii_alphabetic())?;
    let (letters, digits) = rest.split_at(split);
    let fixed_row = digits.starts_with('$');
    let row: u64 = digits.trim_start_matches('$').parse().ok()?;
    let col = letters_to_column(letters).ok()?;
    if row == 0 || row > limits.max_rows as u64 || col >= limits.max_cols {
        return None;
    }
    Some(Corner {
        col,
        row: row as u32 - 1,
        fixed_col,
        fixed_row,
    })
}

/// Split `Sheet!A1` into the unquoted sheet name and the cell part
pub fn split_sheet_qualifier(text: &str) -> (Option<String>, &str) {
    if let Some(quoted) = text.strip_prefix('\'') {
        let bytes = quoted.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                let name = quoted[..i].replace("''", "'");
                let rest = quoted[i + 1..].strip_prefix('!').unwrap_or(&quoted[i + 1..]);
                return (Some(name), rest);
            }
            i += 1;
        }
        return (None, text);
    }
    match text.rfind('!') {
        Some(bang) => (Some(text[..bang].to_string()), &text[bang + 1..]),
        None => (None, text),
    }
}

/// Whether a sheet name has to be quoted inside a reference
pub fn sheet_name_needs_quotes(name: &str) -> bool {
    name.is_empty()
        || name.starts_with(|c: char| c.is_ascii_digit())
        || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        || is_cell_reference(name)
        || name.eq_ignore_ascii_case("TRUE")
        || name.eq_ignore_ascii_case("FALSE")
}

/// Sheet qualifier as written in a reference, including the `!`
pub fn sheet_prefix(name: &str) -> String {
    if sheet_name_needs_quotes(name) {
        format!("'{}'!", name.replace('\'', "''"))
    } else {
        format!("{}!", name)
    }
}

impl RangeReference {
    /// Unqualified single-cell reference without `$` markers
    pub fn cell(sheet_id: SheetId, pos: CellPosition) -> Self {
        Self {
            sheet_id,
            zone: Zone::single(pos),
            fixed_left: false,
            fixed_right: false,
            fixed_top: false,
            fixed_bottom: false,
            fixed_sheet: false,
        }
    }

    /// Resolve reference text written in a formula on `origin`
    pub fn resolve(
        text: &str,
        origin: SheetId,
        store: &dyn CellStore,
        limits: GridLimits,
    ) -> Result<Self, InvalidReference> {
        let invalid = || InvalidReference(text.to_string());
        if text.eq_ignore_ascii_case(INVALID_REFERENCE) {
            return Err(invalid());
        }

        let (sheet_name, cells) = split_sheet_qualifier(text);
        let sheet_id = match &sheet_name {
            Some(name) => store.sheet_id_by_name(name).ok_or_else(invalid)?,
            None => {
                store.sheet_name(origin).ok_or_else(invalid)?;
                origin
            }
        };

        let (first, second) = match cells.split_once(':') {
            Some((a, b)) => (a, Some(b)),
            None => (cells, None),
        };
        let start = parse_corner(first, limits).ok_or_else(invalid)?;
        let end = match second {
            Some(second) => parse_corner(second, limits).ok_or_else(invalid)?,
            None => start,
        };

        let (left, fixed_left, right, fixed_right) = if start.col <= end.col {
            (start.col, start.fixed_col, end.col, end.fixed_col)
        } else {
            (end.col, end.fixed_col, start.col, start.fixed_col)
        };
        let (top, fixed_top, bottom, fixed_bottom) = if start.row <= end.row {
            (start.row, start.fixed_row, end.row, end.fixed_row)
        } else {
            (end.row, end.fixed_row, start.row, start.fixed_row)
        };

        Ok(Self {
            sheet_id,
            zone: Zone {
                left,
                right,
                top,
                bottom,
            },
            fixed_left,
            fixed_right,
            fixed_top,
            fixed_bottom,
            fixed_sheet: sheet_name.is_some(),
        })
    }

    pub fn is_single_cell(&self) -> bool {
        self.zone.is_single_cell()
    }

    /// Move the relative parts by `(d_col, d_row)`
    ///
    /// Leaving the grid yields [`InvalidReference`], never a clamped zone.
    pub fn translate(
        &self,
        d_col: i64,
        d_row: i64,
        limits: GridLimits,
    ) -> Result<Self, InvalidReference> {
        let shift = |value: u32, fixed: bool, delta: i64, max: u32| -> Option<u32> {
            if fixed {
                return Some(value);
            }
            let moved = value as i64 + delta;
            (moved >= 0 && moved < max as i64).then_some(moved as u32)
        };
        let out_of_grid = || InvalidReference(INVALID_REFERENCE.to_string());

        let left = shift(self.zone.left, self.fixed_left, d_col, limits.max_cols).ok_or_else(out_of_grid)?;
        let right = shift(self.zone.right, self.fixed_right, d_col, limits.max_cols).ok_or_else(out_of_grid)?;
        let top = shift(self.zone.top, self.fixed_top, d_row, limits.max_rows).ok_or_else(out_of_grid)?;
        let bottom = shift(self.zone.bottom, self.fixed_bottom, d_row, limits.max_rows).ok_or_else(out_of_grid)?;

        let mut moved = *self;
        // A mixed range like `$A1:B1` can cross over itself
        if left <= right {
            moved.zone.left = left;
            moved.zone.right = right;
        } else {
            moved.zone.left = right;
            moved.zone.right = left;
            std::mem::swap(&mut moved.fixed_left, &mut moved.fixed_right);
        }
        if top <= bottom {
            moved.zone.top = top;
            moved.zone.bottom = bottom;
        } else {
            moved.zone.top = bottom;
            moved.zone.bottom = top;
            std::mem::swap(&mut moved.fixed_top, &mut moved.fixed_bottom);
        }
        Ok(moved)
    }

    /// Follow a column/row insertion or deletion
    ///
    /// Fixed markers do not matter here: the cells themselves move.
    pub fn adjust(&self, change: &StructuralChange) -> Result<Self, InvalidReference> {
        let zone = change
            .map_zone(self.sheet_id, self.zone)
            .ok_or_else(|| InvalidReference(INVALID_REFERENCE.to_string()))?;
        Ok(Self { zone, ..*self })
    }

    /// Text form as written in a formula on `origin`
    ///
    /// A reference to a sheet that no longer exists renders as `#REF`.
    pub fn to_text(&self, origin: SheetId, store: &dyn CellStore) -> String {
        let mut text = String::new();
        if self.fixed_sheet || self.sheet_id != origin {
            match store.sheet_name(self.sheet_id) {
                Some(name) => text.push_str(&sheet_prefix(name)),
                None => return INVALID_REFERENCE.to_string(),
            }
        }

        let corner = |text: &mut String, col: u32, fixed_col: bool, row: u32, fixed_row: bool| {
            if fixed_col {
                text.push('$');
            }
            text.push_str(&column_to_letters(col));
            if fixed_row {
                text.push('$');
            }
            text.push_str(&(row + 1).to_string());
        };

        let zone = self.zone;
        corner(&mut text, zone.left, self.fixed_left, zone.top, self.fixed_top);
        if !zone.is_single_cell()
            || self.fixed_left != self.fixed_right
            || self.fixed_top != self.fixed_bottom
        {
            text.push(':');
            corner(&mut text, zone.right, self.fixed_right, zone.bottom, self.fixed_bottom);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::Workbook;

    fn setup() -> (Workbook, SheetId, SheetId) {
        let mut workbook = Workbook::new();
        let first = workbook.first_sheet().unwrap();
        let second = workbook.add_worksheet_with_name("My sheet").unwrap();
        (workbook, first, second)
    }

    fn resolve(text: &str, origin: SheetId, wb: &Workbook) -> Result<RangeReference, InvalidReference> {
        RangeReference::resolve(text, origin, wb, GridLimits::default())
    }

    #[test]
    fn test_resolve_fixed_parts() {
        let (wb, s1, _) = setup();
        let r = resolve("$B3:C$4", s1, &wb).unwrap();
        assert_eq!(r.zone, "B3:C4".parse::<Zone>().unwrap());
        assert!(r.fixed_left && !r.fixed_top);
        assert!(!r.fixed_right && r.fixed_bottom);
        assert!(!r.fixed_sheet);
        assert_eq!(r.to_text(s1, &wb), "$B3:C$4");
    }

    #[test]
    fn test_resolve_reversed_corners() {
        let (wb, s1, _) = setup();
        let r = resolve("C4:A1", s1, &wb).unwrap();
        assert_eq!(r.to_text(s1, &wb), "A1:C4");
    }

    #[test]
    fn test_resolve_sheet_qualified() {
        let (wb, s1, s2) = setup();
        let r = resolve("'My sheet'!a1", s1, &wb).unwrap();
        assert_eq!(r.sheet_id, s2);
        assert!(r.fixed_sheet);
        assert_eq!(r.to_text(s1, &wb), "'My sheet'!A1");

        let r = resolve("sheet1!B2", s2, &wb).unwrap();
        assert_eq!(r.sheet_id, s1);
        assert_eq!(r.to_text(s2, &wb), "Sheet1!B2");
    }

    #[test]
    fn test_resolve_invalid() {
        let (wb, s1, _) = setup();
        assert!(resolve("#REF", s1, &wb).is_err());
        assert!(resolve("Nope!A1", s1, &wb).is_err());
        assert!(resolve("A1048577", s1, &wb).is_err());
        assert!(resolve("XFE1", s1, &wb).is_err());
    }

    #[test]
    fn test_translate() {
        let (wb, s1, _) = setup();
        let limits = GridLimits::default();

        let r = resolve("A1", s1, &wb).unwrap();
        assert_eq!(r.translate(1, 1, limits).unwrap().to_text(s1, &wb), "B2");

        let r = resolve("B2", s1, &wb).unwrap();
        assert!(r.translate(-4, 0, limits).is_err());

        let r = resolve("$A1:B$2", s1, &wb).unwrap();
        assert_eq!(r.translate(2, 3, limits).unwrap().to_text(s1, &wb), "$A$2:D4");
    }

    #[test]
    fn test_translate_beyond_grid() {
        let (wb, s1, _) = setup();
        let small = GridLimits {
            max_cols: 4,
            max_rows: 4,
        };
        let r = resolve("C3", s1, &wb).unwrap();
        assert!(r.translate(1, 0, small).is_ok());
        assert!(r.translate(2, 0, small).is_err());
        assert!(r.translate(0, 2, small).is_err());
    }

    #[test]
    fn test_adjust() {
        let (wb, s1, s2) = setup();
        let delete_b_c = StructuralChange::DeleteColumns {
            sheet: s1,
            start: 1,
            count: 2,
        };
        let r = resolve("C1", s1, &wb).unwrap();
        assert!(r.adjust(&delete_b_c).is_err());
        let r = resolve("D1", s1, &wb).unwrap();
        assert_eq!(r.adjust(&delete_b_c).unwrap().to_text(s1, &wb), "B1");
        let r = resolve("A1:D1", s1, &wb).unwrap();
        assert_eq!(r.adjust(&delete_b_c).unwrap().to_text(s1, &wb), "A1:B1");

        // Other sheets are untouched
        let r = resolve("'My sheet'!D1", s1, &wb).unwrap();
        assert_eq!(r.adjust(&delete_b_c).unwrap().sheet_id, s2);
        assert_eq!(r.adjust(&delete_b_c).unwrap().zone, r.zone);
    }

    #[test]
    fn test_sheet_quoting() {
        assert!(!sheet_name_needs_quotes("Sheet1"));
        assert!(sheet_name_needs_quotes("My sheet"));
        assert!(sheet_name_needs_quotes("A1"));
        assert!(sheet_name_needs_quotes("2024"));
        assert_eq!(sheet_prefix("Bob's"), "'Bob''s'!");
        assert_eq!(
            split_sheet_qualifier("'Bob''s'!A1"),
            (Some("Bob's".to_string()), "A1")
        );
    }
}
