//! Engine configuration

use sheetflow_core::{MAX_COLS, MAX_ROWS};

/// Separators used when reading and displaying formulas and raw content
///
/// Canonical formula text always uses `.` and `,` whatever the locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// Decimal separator in numbers
    pub decimal_separator: char,
    /// Thousands separator accepted in raw cell content
    pub thousands_separator: char,
    /// Separator between function arguments
    pub argument_separator: char,
}

impl Locale {
    /// `1,234.5` and `SUM(A1,B1)`
    pub fn en_us() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: ',',
            argument_separator: ',',
        }
    }

    /// `1.234,5` and `SUM(A1;B1)`
    pub fn de_de() -> Self {
        Self {
            decimal_separator: ',',
            thousands_separator: '.',
            argument_separator: ';',
        }
    }

    /// `1 234,5` and `SUM(A1;B1)`
    pub fn fr_fr() -> Self {
        Self {
            decimal_separator: ',',
            thousands_separator: ' ',
            argument_separator: ';',
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::en_us()
    }
}

/// Addressable grid size; references translated beyond it become `#REF`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLimits {
    pub max_cols: u32,
    pub max_rows: u32,
}

impl Default for GridLimits {
    fn default() -> Self {
        Self {
            max_cols: MAX_COLS,
            max_rows: MAX_ROWS,
        }
    }
}

/// Options for a formula engine
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub locale: Locale,
    pub limits: GridLimits,
}
