//! # gridcalc-formula
//!
//! Formula engine for gridcalc.
//!
//! This crate provides:
//! - Formula parsing (text → postfix [`TokenList`])
//! - A stack evaluator driven by pluggable aggregation strategies
//! - Reference algebra (ranges, unions, intersections, 3D and external references)
//! - Built-in spreadsheet functions
//! - [`BookSession`], which calculates a stored [`gridcalc_core::Workbook`]
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::Workbook;
//! use gridcalc_formula::{BookSession, Value};
//!
//! let mut book = Workbook::new();
//! let sheet = book.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 2.0).unwrap();
//! sheet.set_cell_formula("A2", "=A1*21").unwrap();
//!
//! let session = BookSession::new(&book);
//! assert_eq!(session.cell_value(1, 2, 1), Value::Number(42.0));
//! ```

pub mod address;
pub mod aggregate;
pub mod book;
pub mod coerce;
pub mod context;
pub mod error;
mod evaluator;
pub mod functions;
pub mod parser;
pub mod session;
pub mod token;
pub mod token_list;
pub mod value;

pub use address::{Address, AddressList, AddressRange};
pub use book::{ExternSheet, NamedRangeData, UnsupportedKind, WhatIfTable, Workbook};
pub use context::{CalcStack, CalcState, EvalContext, WorkbookInfo};
pub use error::{FormulaError, FormulaResult};
pub use parser::{parse_formula, ParseHost};
pub use session::{BookSession, UserFunction};
pub use token::Token;
pub use token_list::TokenList;
pub use value::{Array2D, Value};

/// Helpers shared by the unit tests
#[cfg(test)]
pub(crate) mod testing {
    use crate::session::BookSession;
    use crate::value::Value;
    use gridcalc_core::{CellAddress, CellValue};

    pub type TestBook = gridcalc_core::Workbook;

    /// Formulas are evaluated in a cell the test sheets leave empty
    const HOST: (usize, u32, u32) = (1, 1000, 26);

    pub fn eval(formula: &str) -> Value {
        eval_in(&TestBook::new(), formula)
    }

    pub fn eval_in(book: &TestBook, formula: &str) -> Value {
        BookSession::new(book)
            .evaluate_formula(formula, HOST.0, HOST.1, HOST.2)
            .unwrap_or_else(|e| panic!("{}: {}", formula, e))
    }

    /// Evaluate as an array formula, returning the rows of the result
    pub fn eval_array(formula: &str) -> Vec<Vec<Value>> {
        let book = TestBook::new();
        let array = BookSession::new(&book)
            .evaluate_array_formula(formula, HOST.0, HOST.1, HOST.2)
            .unwrap_or_else(|e| panic!("{}: {}", formula, e));
        (0..array.rows())
            .map(|r| array.row_slice(r).to_vec())
            .collect()
    }

    /// Calculated value of a cell of the first sheet
    pub fn value_at(book: &TestBook, a1: &str) -> Value {
        let addr = CellAddress::parse(a1).expect("address");
        BookSession::new(book).cell_value(1, addr.row + 1, u32::from(addr.col) + 1)
    }

    pub fn sheet_with(cells: &[(&str, f64)]) -> TestBook {
        let cells: Vec<(&str, CellValue)> =
            cells.iter().map(|(a, n)| (*a, CellValue::Number(*n))).collect();
        sheet_from(&cells)
    }

    pub fn sheet_from(cells: &[(&str, CellValue)]) -> TestBook {
        let mut book = TestBook::new();
        let sheet = book.worksheet_mut(0).expect("sheet");
        for (a1, value) in cells {
            sheet.set_cell_value(a1, value.clone()).expect("cell");
        }
        book
    }

    pub fn assert_approx(value: Value, expected: f64) {
        assert_near(value, expected, 1e-9);
    }

    pub fn assert_near(value: Value, expected: f64, tolerance: f64) {
        match value {
            Value::Number(n) => {
                let scale = expected.abs().max(1.0);
                assert!(
                    (n - expected).abs() <= tolerance * scale,
                    "expected {}, got {}",
                    expected,
                    n
                );
            }
            other => panic!("expected {}, got {:?}", expected, other),
        }
    }
}
