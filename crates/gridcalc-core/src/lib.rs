//! # gridcalc-core
//!
//! Core cell storage types for the gridcalc formula engine.
//!
//! This crate provides the storage side the evaluator talks to:
//! - [`ErrorValue`] - The closed set of spreadsheet error values
//! - [`CellValue`] - Stored cell payloads (numbers, text, booleans, errors, dates, formulas)
//! - [`CellAddress`] and [`CellRange`] - Cell addressing and ranges
//! - [`Workbook`], [`Worksheet`] - Sparse in-memory sheets, defined names and data tables
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{Workbook, CellValue};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! // Using string addresses
//! sheet.set_cell_value("A1", "Hello").unwrap();
//! sheet.set_cell_value("B1", 42.0).unwrap();
//!
//! // Or using row/column indices (0-based)
//! sheet.set_cell_value_at(1, 1, CellValue::Number(3.14));
//! assert_eq!(sheet.get_value_at(1, 1), CellValue::Number(3.14));
//! ```

pub mod cell;
pub mod data_table;
pub mod error;
pub mod named_range;
pub mod row;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{CellAddress, CellRange, CellValue, ErrorValue, SharedString};
pub use data_table::DataTable;
pub use error::{Error, Result};
pub use named_range::{NameScope, NamedRange, NamedRangeCollection};
pub use workbook::{Workbook, WorkbookSettings};
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet (Excel 2007+ limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel 2007+ limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum number of rows in a legacy BIFF8 (.xls) worksheet
pub const BIFF8_MAX_ROWS: u32 = 65_536;

/// Maximum number of columns in a legacy BIFF8 (.xls) worksheet
pub const BIFF8_MAX_COLS: u16 = 256;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Row and column bounds of a sheet.
///
/// Formulas read from legacy files wrap relative references at the BIFF8 bounds,
/// everything else uses the modern bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetLimits {
    pub max_rows: u32,
    pub max_cols: u32,
}

impl SheetLimits {
    pub const MODERN: SheetLimits = SheetLimits {
        max_rows: MAX_ROWS,
        max_cols: MAX_COLS as u32,
    };

    pub const BIFF8: SheetLimits = SheetLimits {
        max_rows: BIFF8_MAX_ROWS,
        max_cols: BIFF8_MAX_COLS as u32,
    };

    /// Limits for a formula, selected by whether it came from a BIFF8 file
    pub fn for_format(from_biff8: bool) -> Self {
        if from_biff8 {
            Self::BIFF8
        } else {
            Self::MODERN
        }
    }
}

impl Default for SheetLimits {
    fn default() -> Self {
        Self::MODERN
    }
}
