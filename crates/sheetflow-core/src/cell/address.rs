//! Cell positions and rectangular zones

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A position on a sheet (e.g. "A1", "C7")
///
/// Both indices are 0-based. Rows are displayed 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellPosition {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., XFD=16383)
    pub col: u32,
}

impl CellPosition {
    /// Create a new position
    pub const fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    /// Parse a position from A1-style notation
    ///
    /// `$` markers are accepted and ignored.
    ///
    /// # Examples
    /// ```
    /// use sheetflow_core::CellPosition;
    ///
    /// let pos = CellPosition::parse("B3").unwrap();
    /// assert_eq!(pos.col, 1);
    /// assert_eq!(pos.row, 2);
    ///
    /// let pos = CellPosition::parse("$aa$10").unwrap();
    /// assert_eq!(pos.col, 26);
    /// assert_eq!(pos.row, 9);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }

        let bytes = s.as_bytes();
        let mut pos = 0;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(Error::InvalidAddress(format!(
                "no column letters in '{}'",
                s
            )));
        }
        let col = letters_to_column(&s[col_start..pos])?;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }

        let row_str = &s[pos..];
        if row_str.is_empty() || !row_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidAddress(format!("invalid row number in '{}'", s)));
        }
        let row: u64 = row_str
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid row number in '{}'", s)))?;

        if row == 0 {
            return Err(Error::InvalidAddress(format!(
                "row number must be >= 1 in '{}'",
                s
            )));
        }
        let row = row - 1;
        if row >= MAX_ROWS as u64 {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }

        Ok(Self {
            row: row as u32,
            col,
        })
    }

    /// Format as A1-style string
    pub fn to_a1_string(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row + 1)
    }

    /// Move by the given deltas, `None` if the result leaves the grid
    pub fn offset(&self, d_col: i64, d_row: i64) -> Option<Self> {
        let col = self.col as i64 + d_col;
        let row = self.row as i64 + d_row;
        if col < 0 || row < 0 || col >= MAX_COLS as i64 || row >= MAX_ROWS as i64 {
            return None;
        }
        Some(Self::new(col as u32, row as u32))
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
pub fn column_to_letters(col: u32) -> String {
    let mut result = String::new();
    let mut n = col as u64 + 1;

    while n > 0 {
        n -= 1;
        let c = ((n % 26) as u8 + b'A') as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}

/// Convert column letters to index (A = 0, Z = 25, AA = 26, etc.)
pub fn letters_to_column(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(Error::InvalidAddress("empty column letters".into()));
    }

    let mut col: u64 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(Error::InvalidAddress(format!(
                "invalid column letter '{}'",
                c
            )));
        }
        col = col * 26 + (c.to_ascii_uppercase() as u64 - 'A' as u64 + 1);
        if col > MAX_COLS as u64 {
            return Err(Error::ColumnOutOfBounds(col - 1, MAX_COLS - 1));
        }
    }

    Ok((col - 1) as u32)
}

/// A rectangular block of cells, bounds inclusive
///
/// Always normalized so that `left <= right` and `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Zone {
    /// Create a zone from two opposite corners, in any order
    pub fn new(a: CellPosition, b: CellPosition) -> Self {
        Self {
            left: a.col.min(b.col),
            right: a.col.max(b.col),
            top: a.row.min(b.row),
            bottom: a.row.max(b.row),
        }
    }

    /// Zone covering a single cell
    pub fn single(pos: CellPosition) -> Self {
        Self::new(pos, pos)
    }

    /// Zone anchored at `origin` spanning `cols` x `rows` cells
    pub fn with_size(origin: CellPosition, cols: u32, rows: u32) -> Self {
        Self {
            left: origin.col,
            right: origin.col + cols.max(1) - 1,
            top: origin.row,
            bottom: origin.row + rows.max(1) - 1,
        }
    }

    pub fn top_left(&self) -> CellPosition {
        CellPosition::new(self.left, self.top)
    }

    pub fn bottom_right(&self) -> CellPosition {
        CellPosition::new(self.right, self.bottom)
    }

    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }

    pub fn is_single_cell(&self) -> bool {
        self.left == self.right && self.top == self.bottom
    }

    pub fn contains(&self, pos: CellPosition) -> bool {
        pos.col >= self.left && pos.col <= self.right && pos.row >= self.top && pos.row <= self.bottom
    }

    pub fn intersects(&self, other: &Zone) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Iterate over all positions, row by row
    pub fn positions(&self) -> impl Iterator<Item = CellPosition> {
        let (left, right) = (self.left, self.right);
        (self.top..=self.bottom)
            .flat_map(move |row| (left..=right).map(move |col| CellPosition::new(col, row)))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.top_left())
        } else {
            write!(f, "{}:{}", self.top_left(), self.bottom_right())
        }
    }
}

impl FromStr for Zone {
    type Err = Error;

    /// Parse "A1" or "A1:B2"
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((start, end)) => Ok(Zone::new(
                CellPosition::parse(start).map_err(|_| Error::InvalidRange(s.to_string()))?,
                CellPosition::parse(end).map_err(|_| Error::InvalidRange(s.to_string()))?,
            )),
            None => Ok(Zone::single(CellPosition::parse(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_to_letters(0), "A");
        assert_eq!(column_to_letters(25), "Z");
        assert_eq!(column_to_letters(26), "AA");
        assert_eq!(column_to_letters(701), "ZZ");
        assert_eq!(column_to_letters(16383), "XFD");

        assert_eq!(letters_to_column("A").unwrap(), 0);
        assert_eq!(letters_to_column("z").unwrap(), 25);
        assert_eq!(letters_to_column("AA").unwrap(), 26);
        assert_eq!(letters_to_column("XFD").unwrap(), 16383);
        assert!(letters_to_column("XFE").is_err());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(CellPosition::parse("A1").unwrap(), CellPosition::new(0, 0));
        assert_eq!(CellPosition::parse("$C$5").unwrap(), CellPosition::new(2, 4));
        assert!(CellPosition::parse("A0").is_err());
        assert!(CellPosition::parse("1A").is_err());
        assert!(CellPosition::parse("A").is_err());
        assert!(CellPosition::parse("A1048577").is_err());
    }

    #[test]
    fn test_offset() {
        let b2 = CellPosition::new(1, 1);
        assert_eq!(b2.offset(1, 1), Some(CellPosition::new(2, 2)));
        assert_eq!(b2.offset(-2, 0), None);
        assert_eq!(b2.offset(0, -1), Some(CellPosition::new(1, 0)));
    }

    #[test]
    fn test_zone() {
        let zone: Zone = "C3:A1".parse().unwrap();
        assert_eq!(zone.left, 0);
        assert_eq!(zone.right, 2);
        assert_eq!(zone.width(), 3);
        assert_eq!(zone.height(), 3);
        assert!(zone.contains(CellPosition::new(1, 1)));
        assert!(!zone.contains(CellPosition::new(3, 1)));
        assert_eq!(zone.to_string(), "A1:C3");

        let cells: Vec<String> = "A1:B2"
            .parse::<Zone>()
            .unwrap()
            .positions()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(cells, vec!["A1", "B1", "A2", "B2"]);
    }
}
