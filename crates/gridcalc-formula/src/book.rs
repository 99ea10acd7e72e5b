//! The capabilities the evaluator needs from a workbook
//!
//! The evaluator never touches storage directly. Everything it reads (cell values,
//! row and column extents, names, external workbooks, data tables) goes through
//! [`Workbook`], with 1-based sheet, row and column numbers.

use crate::address::{Address, AddressRange};
use crate::context::{CalcStack, CalcState, EvalContext};
use crate::token_list::TokenList;
use crate::value::Value;
use gridcalc_core::ErrorValue;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Sheets named by an entry of the extern-sheet table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternSheet {
    /// Workbook holding the sheets, `None` for the workbook itself
    pub book: Option<Arc<str>>,
    /// First sheet (1-based), `None` if the sheet has been deleted
    pub first: Option<usize>,
    pub last: Option<usize>,
}

impl ExternSheet {
    /// Both sheet bounds, or `#REF!` if they do not exist
    pub fn sheets(&self) -> Result<(usize, usize), ErrorValue> {
        match (self.first, self.last) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(ErrorValue::Ref),
        }
    }
}

/// What a defined name resolves to
#[derive(Debug, Clone)]
pub enum NamedRangeData {
    /// A formula to evaluate in place of the name
    Tokens(Rc<TokenList>),
    /// A name defined in another workbook
    External { book: Arc<str>, name: String },
    /// The name cannot be used
    Error(ErrorValue),
}

/// A what-if table covering a formula cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatIfTable {
    /// The whole table, header row and column included
    pub table: AddressRange,
    /// Input cell substituted by the header-row values
    pub row_input: Option<Address>,
    /// Input cell substituted by the header-column values
    pub col_input: Option<Address>,
}

/// Situations reported through [`Workbook::add_unsupported`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsupportedKind {
    ExternalReference,
    ExternalName,
    UserDefinedFunction,
    CircularReference,
}

impl fmt::Display for UnsupportedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnsupportedKind::ExternalReference => "external reference",
            UnsupportedKind::ExternalName => "external name",
            UnsupportedKind::UserDefinedFunction => "user-defined function",
            UnsupportedKind::CircularReference => "circular reference",
        };
        f.write_str(s)
    }
}

/// Workbook capabilities consumed by the evaluator
pub trait Workbook {
    /// Current value of a cell, recalculating it first if it holds a formula
    fn cell_value_and_recalc(
        &self,
        sheet: usize,
        row: u32,
        col: u32,
        state: &CalcState,
        stack: &CalcStack,
    ) -> Value;

    /// Number of rows in use (the last used row number)
    fn row_count(&self, sheet: usize) -> u32;

    fn row_hidden(&self, sheet: usize, row: u32) -> bool;

    /// Number of populated cells in a row
    fn col_count_in_row(&self, sheet: usize, row: u32) -> usize;

    /// Index of the first populated cell at or after `col` in a row
    fn col_to_index(&self, sheet: usize, row: u32, col: u32) -> usize;

    /// Column of the populated cell at `index` in a row
    fn col_from_index(&self, sheet: usize, row: u32, index: usize) -> Option<u32>;

    fn sheets_from_extern_sheet(&self, index: usize) -> Option<ExternSheet>;

    /// Another workbook referenced by `[Name]Sheet!A1`
    fn supporting_file(&self, name: &str) -> Option<&dyn Workbook>;

    /// 1-based sheet number by name
    fn sheet_index(&self, name: &str) -> Option<usize>;

    fn sheet_count(&self) -> usize;

    fn named_range_data(&self, index: usize) -> NamedRangeData;

    /// Name lookup, sheet-scoped names first
    fn find_named_range(&self, name: &str, sheet: usize) -> Option<usize>;

    fn evaluate_user_defined_function(&self, name: &str, cx: EvalContext<'_>, args: &[Value])
        -> Value;

    fn is_defined_function(&self, name: &str) -> bool;

    fn options_dates_1904(&self) -> bool;

    /// Record something that could not be calculated. Never fatal.
    fn add_unsupported(&self, kind: UnsupportedKind, name: &str);

    /// Data table whose result cells include the given cell
    fn what_if_table(&self, sheet: usize, row: u32, col: u32) -> Option<WhatIfTable>;
}
