//! Evaluation context
//!
//! [`WorkbookInfo`] says where a formula is being evaluated and is copied freely.
//! [`CalcState`] holds the flags some functions switch for their arguments; it is
//! cloned, changed, and handed down instead of being mutated in place.
//! [`CalcStack`] is the host's call frame, passed through untouched.

use crate::address::{Address, AddressRange};
use crate::book::Workbook;
use crate::error::{FormulaError, FormulaResult};
use crate::value::Value;
use gridcalc_core::{ErrorValue, SheetLimits};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum number of nested defined names
pub const MAX_NAME_DEPTH: usize = 256;

/// Iteration cap of Newton's method inverses
pub const NEWTON_MAX_ITER: usize = 100;

/// Iteration cap of the secant search used by RATE and IRR
pub const SECANT_MAX_ITER: usize = 150;

/// Step size at which the secant search stops
pub const SECANT_TOLERANCE: f64 = 1e-10;

/// Convergence tolerance of the distribution inverses
pub const INVERSE_TOLERANCE: f64 = 1e-13;

/// Per-formula options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    pub max_name_depth: usize,
    /// Evaluating an array (CSE) formula
    pub is_array_formula: bool,
    /// Bounds used to wrap relative references
    pub limits: SheetLimits,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_name_depth: MAX_NAME_DEPTH,
            is_array_formula: false,
            limits: SheetLimits::MODERN,
        }
    }
}

/// Where a formula is being evaluated
#[derive(Clone, Copy)]
pub struct WorkbookInfo<'a> {
    pub book: &'a dyn Workbook,
    /// Name of `book` when it is an external workbook
    pub book_name: Option<&'a str>,
    /// Host cell (1-based)
    pub sheet: usize,
    pub row: u32,
    pub col: u32,
    pub dates_1904: bool,
    /// Nesting of SUMPRODUCT-style array evaluation
    pub sumproduct_depth: u32,
    pub options: EvalOptions,
}

impl<'a> WorkbookInfo<'a> {
    pub fn new(book: &'a dyn Workbook, sheet: usize, row: u32, col: u32) -> Self {
        Self {
            book,
            book_name: None,
            sheet,
            row,
            col,
            dates_1904: book.options_dates_1904(),
            sumproduct_depth: 0,
            options: EvalOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }
}

/// Cell values substituted while a what-if table is recalculated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhatIfSubstitution {
    cells: Vec<(usize, u32, u32, Value)>,
}

impl WhatIfSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitute a cell, replacing any earlier substitution of it
    pub fn set(&mut self, sheet: usize, row: u32, col: u32, value: Value) {
        self.cells.retain(|(s, r, c, _)| (*s, *r, *c) != (sheet, row, col));
        self.cells.push((sheet, row, col, value));
    }

    pub fn get(&self, sheet: usize, row: u32, col: u32) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(s, r, c, _)| (*s, *r, *c) == (sheet, row, col))
            .map(|(_, _, _, v)| v)
    }

    /// Substituted columns of a row inside `cols`, ascending
    pub fn cols_in_row(&self, sheet: usize, row: u32, cols: (u32, u32)) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .cells
            .iter()
            .filter(|(s, r, c, _)| *s == sheet && *r == row && (cols.0..=cols.1).contains(c))
            .map(|(_, _, c, _)| *c)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Rows holding substitutions inside `rows`
    pub fn rows_in(&self, sheet: usize, rows: (u32, u32)) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .cells
            .iter()
            .filter(|(s, r, _, _)| *s == sheet && (rows.0..=rows.1).contains(r))
            .map(|(_, r, _, _)| *r)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Identity of a defined name being evaluated
pub type NameKey = (Option<Arc<str>>, usize);

/// Flags that change how arguments are evaluated
#[derive(Debug, Clone, Default)]
pub struct CalcState {
    /// Skip hidden rows (SUBTOTAL 101-111, AGGREGATE options)
    pub ignore_hidden: bool,
    /// Skip error cells instead of propagating them
    pub ignore_errors: bool,
    /// Inside SUBTOTAL/AGGREGATE: nested subtotal cells read as blank
    pub in_subtotal: bool,
    /// Cooperative cancellation, shared by every clone
    pub aborted: Arc<AtomicBool>,
    pub what_if: Option<Arc<WhatIfSubstitution>>,
    /// Names currently being evaluated, outermost first
    pub names_in_progress: Vec<NameKey>,
}

impl CalcState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request cancellation of every evaluation sharing this flag
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// State for recalculating another cell: the argument flags reset, the
    /// cancellation flag and what-if substitution carry over
    pub fn for_cell(&self) -> CalcState {
        CalcState {
            aborted: Arc::clone(&self.aborted),
            what_if: self.what_if.clone(),
            ..CalcState::default()
        }
    }
}

/// Host call frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalcStack {
    /// Number of cell recalculations currently nested
    pub depth: u32,
    /// Formula cell that asked for this one: (sheet, row, col)
    pub parent: Option<(usize, u32, u32)>,
}

impl CalcStack {
    pub fn push(&self, sheet: usize, row: u32, col: u32) -> CalcStack {
        CalcStack {
            depth: self.depth + 1,
            parent: Some((sheet, row, col)),
        }
    }
}

/// Everything a token needs to evaluate
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub info: WorkbookInfo<'a>,
    pub state: &'a CalcState,
    pub stack: &'a CalcStack,
}

impl<'a> EvalContext<'a> {
    pub fn new(info: WorkbookInfo<'a>, state: &'a CalcState, stack: &'a CalcStack) -> Self {
        Self { info, state, stack }
    }

    /// Same position, different flags
    pub fn with_state<'b>(&self, state: &'b CalcState) -> EvalContext<'b>
    where
        'a: 'b,
    {
        EvalContext {
            info: self.info,
            state,
            stack: self.stack,
        }
    }

    pub fn book(&self) -> &'a dyn Workbook {
        self.info.book
    }

    pub fn dates_1904(&self) -> bool {
        self.info.dates_1904
    }

    pub fn is_array_formula(&self) -> bool {
        self.info.options.is_array_formula
    }

    /// The formula's own cell
    pub fn host(&self) -> Address {
        Address::new(self.info.sheet, self.info.row, self.info.col).in_book(self.book_arc())
    }

    fn book_arc(&self) -> Option<Arc<str>> {
        self.info.book_name.map(Arc::from)
    }

    /// Fail with [`FormulaError::Aborted`] once cancellation was requested
    pub fn check_aborted(&self) -> FormulaResult<()> {
        if self.state.is_aborted() {
            log::debug!("calculation aborted at {}", self.host());
            Err(FormulaError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Context for reading an area: the area's workbook, or `#REF!` when it is an
    /// external workbook that is not available
    pub fn for_range<'b>(&'b self, range: &'b AddressRange) -> FormulaResult<EvalContext<'b>> {
        match range.first.book.as_deref() {
            None => Ok(*self),
            Some(name) if self.info.book_name == Some(name) => Ok(*self),
            Some(name) => match self.info.book.supporting_file(name) {
                Some(book) => Ok(EvalContext {
                    info: WorkbookInfo {
                        book,
                        book_name: Some(name),
                        dates_1904: book.options_dates_1904(),
                        ..self.info
                    },
                    state: self.state,
                    stack: self.stack,
                }),
                None => {
                    self.info
                        .book
                        .add_unsupported(crate::book::UnsupportedKind::ExternalReference, name);
                    Err(ErrorValue::Ref.into())
                }
            },
        }
    }

    /// Value of a cell of this context's workbook, honoring what-if substitutions
    pub fn read_cell(&self, sheet: usize, row: u32, col: u32) -> Value {
        if self.info.book_name.is_none() {
            if let Some(v) = self.state.what_if.as_ref().and_then(|w| w.get(sheet, row, col)) {
                return v.clone();
            }
        }
        self.info
            .book
            .cell_value_and_recalc(sheet, row, col, self.state, self.stack)
    }

    /// Value of a single-cell address
    pub fn read_address(&self, addr: &Address) -> FormulaResult<Value> {
        let range = AddressRange::cell(addr.clone());
        let cx = self.for_range(&range)?;
        Ok(cx.read_cell(addr.sheet, addr.row, addr.col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_what_if_substitution() {
        let mut w = WhatIfSubstitution::new();
        w.set(1, 2, 3, Value::Number(1.0));
        w.set(1, 2, 3, Value::Number(2.0));
        w.set(1, 2, 1, Value::Number(5.0));
        assert_eq!(w.get(1, 2, 3), Some(&Value::Number(2.0)));
        assert_eq!(w.get(2, 2, 3), None);
        assert_eq!(w.cols_in_row(1, 2, (1, 10)), vec![1, 3]);
        assert_eq!(w.rows_in(1, (3, 10)), Vec::<u32>::new());
    }

    #[test]
    fn test_for_cell_keeps_abort_flag() {
        let mut state = CalcState::new();
        state.ignore_hidden = true;
        let inner = state.for_cell();
        assert!(!inner.ignore_hidden);
        state.abort();
        assert!(inner.is_aborted());
    }

    #[test]
    fn test_stack_push() {
        let s = CalcStack::default().push(1, 2, 3);
        assert_eq!(s.depth, 1);
        assert_eq!(s.parent, Some((1, 2, 3)));
    }
}
