//! # gridcalc
//!
//! A spreadsheet formula engine.
//!
//! gridcalc parses spreadsheet formulas into postfix token lists and evaluates
//! them against sparse in-memory workbooks, with the semantics users know from
//! desktop spreadsheets: implicit intersection, array formulas, error propagation,
//! defined names, 3D and external references, and what-if data tables.
//!
//! ## Features
//!
//! - Formula parsing and postfix evaluation
//! - Built-in functions: math, statistics, distributions, lookup, text, dates,
//!   financial, database and information functions
//! - Whole-workbook recalculation with circular reference detection
//! - User-defined functions supplied as closures
//!
//! ## Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! // Create a new workbook
//! let mut workbook = Workbook::new();
//!
//! // Get the first worksheet
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! // Set cell values
//! sheet.set_cell_value("A1", "Hello").unwrap();
//! sheet.set_cell_value("B1", 42.0).unwrap();
//!
//! // Set a formula
//! sheet.set_cell_formula("D1", "=B1*2").unwrap();
//!
//! // Calculate it
//! workbook.calculate().unwrap();
//! ```

pub mod calculation;
pub mod prelude;

// Re-export calculation types
pub use calculation::{
    CalcError, CalcResult, CalculationOptions, CalculationStats, WorkbookCalculationExt,
};

// Re-export core types
pub use gridcalc_core::{
    CellAddress,
    CellRange,
    // Cell types
    CellValue,
    DataTable,
    // Error types
    Error,
    ErrorValue,
    NameScope,
    NamedRange,
    Result,
    SheetLimits,
    // Main types
    Workbook,
    WorkbookSettings,
    Worksheet,

    // Constants
    MAX_COLS,
    MAX_ROWS,
    MAX_SHEET_NAME_LEN,
};

// Re-export formula types
pub use gridcalc_formula::{
    parse_formula, Array2D, BookSession, EvalContext, FormulaError, FormulaResult, ParseHost,
    TokenList, UnsupportedKind, UserFunction, Value,
};
