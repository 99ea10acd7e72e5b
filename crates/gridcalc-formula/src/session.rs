//! Calculating a stored workbook
//!
//! [`BookSession`] puts the [`Workbook`] capabilities on top of a
//! [`gridcalc_core::Workbook`]. Formula text is parsed the first time a cell is read,
//! results are kept until [`BookSession::clear_cache`], and a cell that is read while
//! it is still being calculated counts as circular.

use crate::address::{Address, AddressRange};
use crate::book::{ExternSheet, NamedRangeData, UnsupportedKind, WhatIfTable, Workbook};
use crate::coerce::normalize_cell_value;
use crate::context::{CalcStack, CalcState, EvalContext, EvalOptions, WorkbookInfo};
use crate::error::FormulaResult;
use crate::parser::{parse_formula, ParseHost};
use crate::token_list::TokenList;
use crate::value::{Array2D, Value};
use ahash::{AHashMap, AHashSet};
use gridcalc_core::{CellValue, ErrorValue, SheetLimits, Worksheet};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// A function supplied by the embedding application, called with evaluated arguments
pub type UserFunction = Box<dyn Fn(&EvalContext<'_>, &[Value]) -> Value>;

/// 1-based (sheet, row, col)
pub type CellKey = (usize, u32, u32);

/// What a slot of the name table stands for
#[derive(Debug, Clone, PartialEq, Eq)]
enum NameSlot {
    /// Index into the workbook's named ranges
    Local(usize),
    External { book: Arc<str>, name: String },
}

/// Evaluation session over one stored workbook
pub struct BookSession<'a> {
    book: &'a gridcalc_core::Workbook,
    /// File name when this session is a supporting workbook of another one
    name: Option<Arc<str>>,
    supporting: Vec<(String, BookSession<'a>)>,
    functions: AHashMap<String, UserFunction>,
    root: CalcState,
    formulas: RefCell<AHashMap<CellKey, Rc<TokenList>>>,
    values: RefCell<AHashMap<CellKey, Value>>,
    in_progress: RefCell<AHashSet<CellKey>>,
    circular: RefCell<AHashSet<CellKey>>,
    externs: RefCell<Vec<ExternSheet>>,
    names: RefCell<Vec<NameSlot>>,
    name_formulas: RefCell<AHashMap<usize, Rc<TokenList>>>,
    unsupported: RefCell<Vec<(UnsupportedKind, String)>>,
}

impl<'a> BookSession<'a> {
    pub fn new(book: &'a gridcalc_core::Workbook) -> Self {
        Self::named(book, None)
    }

    fn named(book: &'a gridcalc_core::Workbook, name: Option<Arc<str>>) -> Self {
        let supporting = book
            .supporting_workbooks()
            .map(|(n, wb)| (n.to_string(), BookSession::named(wb, Some(Arc::from(n)))))
            .collect();
        Self {
            book,
            name,
            supporting,
            functions: AHashMap::new(),
            root: CalcState::new(),
            formulas: RefCell::new(AHashMap::new()),
            values: RefCell::new(AHashMap::new()),
            in_progress: RefCell::new(AHashSet::new()),
            circular: RefCell::new(AHashSet::new()),
            externs: RefCell::new(Vec::new()),
            names: RefCell::new(Vec::new()),
            name_formulas: RefCell::new(AHashMap::new()),
            unsupported: RefCell::new(Vec::new()),
        }
    }

    /// Make a user-defined function callable from formulas (names are case-insensitive)
    pub fn register_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&EvalContext<'_>, &[Value]) -> Value + 'static,
    {
        self.functions.insert(name.to_ascii_uppercase(), Box::new(f));
    }

    pub fn workbook(&self) -> &'a gridcalc_core::Workbook {
        self.book
    }

    /// The cancellation flag shared by every calculation of this session
    pub fn state(&self) -> &CalcState {
        &self.root
    }

    /// Current value of a cell (1-based), calculating it if needed
    pub fn cell_value(&self, sheet: usize, row: u32, col: u32) -> Value {
        let state = self.root.for_cell();
        self.cell_value_and_recalc(sheet, row, col, &state, &CalcStack::default())
    }

    /// Evaluate formula text as if it were entered in the given cell (1-based)
    pub fn evaluate_formula(
        &self,
        formula: &str,
        sheet: usize,
        row: u32,
        col: u32,
    ) -> FormulaResult<Value> {
        let list = self.parse_at(formula, sheet, row, col)?;
        let value = self.run(&list, sheet, row, col, false, &self.root, &CalcStack::default());
        Ok(cell_result(value, false, (0, 0)))
    }

    /// Evaluate formula text as an array formula and return the whole result
    pub fn evaluate_array_formula(
        &self,
        formula: &str,
        sheet: usize,
        row: u32,
        col: u32,
    ) -> FormulaResult<Array2D> {
        let list = self.parse_at(formula, sheet, row, col)?;
        let value = self.run(&list, sheet, row, col, true, &self.root, &CalcStack::default());
        Ok(match value {
            Value::Array(a) => a.map(|v| cell_result(v.clone(), false, (0, 0))),
            v => Array2D::scalar(cell_result(v, false, (0, 0))),
        })
    }

    /// Cells found reading themselves, sorted
    pub fn circular_cells(&self) -> Vec<CellKey> {
        let mut cells: Vec<CellKey> = self.circular.borrow().iter().copied().collect();
        cells.sort_unstable();
        cells
    }

    /// Everything reported through [`Workbook::add_unsupported`], in order
    pub fn unsupported(&self) -> Vec<(UnsupportedKind, String)> {
        self.unsupported.borrow().clone()
    }

    /// Forget calculated values so the next read recalculates
    pub fn clear_cache(&self) {
        self.values.borrow_mut().clear();
        self.circular.borrow_mut().clear();
        for (_, session) in &self.supporting {
            session.clear_cache();
        }
    }

    fn worksheet(&self, sheet: usize) -> Option<&'a Worksheet> {
        self.book.worksheet(sheet.checked_sub(1)?)
    }

    fn limits(&self) -> SheetLimits {
        self.book.limits()
    }

    fn parse_at(&self, formula: &str, sheet: usize, row: u32, col: u32) -> FormulaResult<TokenList> {
        let site = FormulaSite {
            session: self,
            sheet,
            row,
            col,
        };
        parse_formula(formula, &site)
    }

    /// Parsed formula of a cell, parsed once
    fn formula(&self, key: CellKey, text: &str) -> FormulaResult<Rc<TokenList>> {
        if let Some(list) = self.formulas.borrow().get(&key) {
            return Ok(Rc::clone(list));
        }
        let list = Rc::new(self.parse_at(text, key.0, key.1, key.2)?);
        self.formulas.borrow_mut().insert(key, Rc::clone(&list));
        Ok(list)
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        list: &TokenList,
        sheet: usize,
        row: u32,
        col: u32,
        is_array_formula: bool,
        state: &CalcState,
        stack: &CalcStack,
    ) -> Value {
        let info = WorkbookInfo {
            book_name: self.name.as_deref(),
            ..WorkbookInfo::new(self, sheet, row, col)
        }
        .with_options(EvalOptions {
            is_array_formula,
            limits: self.limits(),
            ..EvalOptions::default()
        });
        list.evaluate_all(&EvalContext::new(info, state, stack))
    }

    fn formula_cell_value(
        &self,
        (sheet, row, col): CellKey,
        sheet_data: &Worksheet,
        raw: &CellValue,
        text: &str,
        state: &CalcState,
        stack: &CalcStack,
    ) -> Value {
        // cells of an array formula share one calculation, anchored at its first cell
        let is_array = matches!(raw, CellValue::Formula { array: true, .. });
        let (anchor, offset) = match sheet_data.array_range_at(row - 1, (col - 1) as u16) {
            Some(range) if is_array => (
                (sheet, range.start.row + 1, u32::from(range.start.col) + 1),
                (
                    (row - 1 - range.start.row) as usize,
                    (col - 1 - u32::from(range.start.col)) as usize,
                ),
            ),
            _ => ((sheet, row, col), (0, 0)),
        };

        // parsed relative to the anchor so every cell of the range shares one token list
        let list = match self.formula(anchor, text) {
            Ok(list) => list,
            Err(e) => {
                let at = Address::new(anchor.0, anchor.1, anchor.2);
                log::warn!("cannot parse formula {:?} in {}: {}", text, at, e);
                return Value::Error(e.to_error_value());
            }
        };
        if state.in_subtotal && list.calls_any(&["SUBTOTAL", "AGGREGATE"]) {
            return Value::Empty;
        }

        let cacheable = state.what_if.is_none();
        if cacheable {
            if let Some(v) = self.values.borrow().get(&anchor) {
                return cell_result(v.clone(), is_array, offset);
            }
        }
        if !self.in_progress.borrow_mut().insert(anchor) {
            let at = Address::new(anchor.0, anchor.1, anchor.2).in_book(self.name.clone());
            log::debug!("circular reference at {}", at);
            self.circular.borrow_mut().insert(anchor);
            self.add_unsupported(UnsupportedKind::CircularReference, &at.to_string());
            return Value::Number(0.0);
        }

        log::trace!("calculating {}", Address::new(anchor.0, anchor.1, anchor.2));
        let inner = state.for_cell();
        let frame = stack.push(anchor.0, anchor.1, anchor.2);
        let value = self.run(&list, anchor.0, anchor.1, anchor.2, is_array, &inner, &frame);
        self.in_progress.borrow_mut().remove(&anchor);

        if cacheable {
            self.values.borrow_mut().insert(anchor, value.clone());
        }
        cell_result(value, is_array, offset)
    }

    fn extern_index(&self, entry: ExternSheet) -> usize {
        let mut externs = self.externs.borrow_mut();
        match externs.iter().position(|e| *e == entry) {
            Some(i) => i,
            None => {
                externs.push(entry);
                externs.len() - 1
            }
        }
    }

    fn name_slot(&self, slot: NameSlot) -> usize {
        let mut names = self.names.borrow_mut();
        match names.iter().position(|s| *s == slot) {
            Some(i) => i,
            None => {
                names.push(slot);
                names.len() - 1
            }
        }
    }

    fn local_name_formula(&self, slot: usize, index: usize) -> NamedRangeData {
        if let Some(list) = self.name_formulas.borrow().get(&slot) {
            return NamedRangeData::Tokens(Rc::clone(list));
        }
        let Some(range) = self.book.named_ranges().by_index(index) else {
            return NamedRangeData::Error(ErrorValue::Name);
        };
        let sheet = match range.scope {
            gridcalc_core::NameScope::Sheet(s) => s + 1,
            gridcalc_core::NameScope::Workbook => 1,
        };
        match self.parse_at(range.expression(), sheet, 1, 1) {
            Ok(list) => {
                let list = Rc::new(list);
                self.name_formulas.borrow_mut().insert(slot, Rc::clone(&list));
                NamedRangeData::Tokens(list)
            }
            Err(e) => {
                log::warn!("cannot parse defined name {}: {}", range.name, e);
                NamedRangeData::Error(ErrorValue::Name)
            }
        }
    }
}

/// The value a formula cell shows: blanks read as zero, an array formula cell holds
/// its own element and any other formula the top-left one
fn cell_result(value: Value, is_array: bool, (r, c): (usize, usize)) -> Value {
    match value {
        Value::Array(a) if is_array => cell_result(a.broadcast_get(r, c), false, (0, 0)),
        Value::Array(a) => cell_result(a.first().clone(), false, (0, 0)),
        Value::Empty | Value::Missing => Value::Number(0.0),
        Value::Number(n) if !n.is_finite() => Value::Error(ErrorValue::Num),
        Value::Accumulator(_) | Value::Reference(_) => Value::Error(ErrorValue::Value),
        v => v,
    }
}

impl Workbook for BookSession<'_> {
    fn cell_value_and_recalc(
        &self,
        sheet: usize,
        row: u32,
        col: u32,
        state: &CalcState,
        stack: &CalcStack,
    ) -> Value {
        let Some(ws) = self.worksheet(sheet) else {
            return Value::Error(ErrorValue::Ref);
        };
        if row == 0 || col == 0 || col > u32::from(u16::MAX) {
            return Value::Empty;
        }
        let Some(raw) = ws.cell_at(row - 1, (col - 1) as u16) else {
            return Value::Empty;
        };
        match raw.formula_text() {
            Some(text) => self.formula_cell_value((sheet, row, col), ws, raw, text, state, stack),
            None => normalize_cell_value(raw, self.options_dates_1904()),
        }
    }

    fn row_count(&self, sheet: usize) -> u32 {
        self.worksheet(sheet).map_or(0, Worksheet::row_count)
    }

    fn row_hidden(&self, sheet: usize, row: u32) -> bool {
        match (self.worksheet(sheet), row.checked_sub(1)) {
            (Some(ws), Some(r)) => ws.is_row_hidden(r),
            _ => false,
        }
    }

    fn col_count_in_row(&self, sheet: usize, row: u32) -> usize {
        self.worksheet(sheet)
            .and_then(|ws| ws.row(row.checked_sub(1)?))
            .map_or(0, |r| r.cell_count())
    }

    fn col_to_index(&self, sheet: usize, row: u32, col: u32) -> usize {
        let col0 = u16::try_from(col.saturating_sub(1)).unwrap_or(u16::MAX);
        self.worksheet(sheet)
            .and_then(|ws| ws.row(row.checked_sub(1)?))
            .map_or(0, |r| r.col_to_index(col0))
    }

    fn col_from_index(&self, sheet: usize, row: u32, index: usize) -> Option<u32> {
        let r = self.worksheet(sheet)?.row(row.checked_sub(1)?)?;
        r.col_from_index(index).map(|c| u32::from(c) + 1)
    }

    fn sheets_from_extern_sheet(&self, index: usize) -> Option<ExternSheet> {
        self.externs.borrow().get(index).cloned()
    }

    fn supporting_file(&self, name: &str) -> Option<&dyn Workbook> {
        self.supporting
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| s as &dyn Workbook)
    }

    fn sheet_index(&self, name: &str) -> Option<usize> {
        self.book.sheet_index(name).map(|i| i + 1)
    }

    fn sheet_count(&self) -> usize {
        self.book.sheet_count()
    }

    fn named_range_data(&self, index: usize) -> NamedRangeData {
        let slot = self.names.borrow().get(index).cloned();
        match slot {
            Some(NameSlot::Local(i)) => self.local_name_formula(index, i),
            Some(NameSlot::External { book, name }) => NamedRangeData::External { book, name },
            None => NamedRangeData::Error(ErrorValue::Name),
        }
    }

    fn find_named_range(&self, name: &str, sheet: usize) -> Option<usize> {
        let current = sheet.checked_sub(1).unwrap_or(usize::MAX);
        let index = self.book.named_ranges().find(name, current)?;
        Some(self.name_slot(NameSlot::Local(index)))
    }

    fn evaluate_user_defined_function(
        &self,
        name: &str,
        cx: EvalContext<'_>,
        args: &[Value],
    ) -> Value {
        match self.functions.get(&name.to_ascii_uppercase()) {
            Some(f) => f(&cx, args),
            None => Value::Error(ErrorValue::Name),
        }
    }

    fn is_defined_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_uppercase())
    }

    fn options_dates_1904(&self) -> bool {
        self.book.settings().date_1904
    }

    fn add_unsupported(&self, kind: UnsupportedKind, name: &str) {
        let mut seen = self.unsupported.borrow_mut();
        if !seen.iter().any(|(k, n)| *k == kind && n == name) {
            log::warn!("{} not supported: {}", kind, name);
            seen.push((kind, name.to_string()));
        }
    }

    fn what_if_table(&self, sheet: usize, row: u32, col: u32) -> Option<WhatIfTable> {
        let ws = self.worksheet(sheet)?;
        let col0 = u16::try_from(col.checked_sub(1)?).ok()?;
        let table = ws.data_table_at(row.checked_sub(1)?, col0)?;
        let at = |r: u32, c: u16| Address::new(sheet, r + 1, u32::from(c) + 1);
        Some(WhatIfTable {
            table: AddressRange::new(
                at(table.range.start.row, table.range.start.col),
                at(table.range.end.row, table.range.end.col),
            ),
            row_input: table.row_input.map(|a| at(a.row, a.col)),
            col_input: table.col_input.map(|a| at(a.row, a.col)),
        })
    }
}

/// Parse host for a formula in one cell of a session's workbook
struct FormulaSite<'s, 'a> {
    session: &'s BookSession<'a>,
    sheet: usize,
    row: u32,
    col: u32,
}

impl ParseHost for FormulaSite<'_, '_> {
    fn position(&self) -> (u32, u32) {
        (self.row, self.col)
    }

    fn limits(&self) -> SheetLimits {
        self.session.limits()
    }

    fn extern_sheet(&self, book: Option<&str>, first: &str, last: &str) -> Option<usize> {
        let entry = match book {
            Some(name) if self.session.name.as_deref() != Some(name) => {
                match self.session.supporting_file(name) {
                    Some(other) => {
                        let (a, b) = (other.sheet_index(first)?, other.sheet_index(last)?);
                        ExternSheet {
                            book: Some(Arc::from(name)),
                            first: Some(a.min(b)),
                            last: Some(a.max(b)),
                        }
                    }
                    // unavailable workbooks are reported when the reference is used
                    None => ExternSheet {
                        book: Some(Arc::from(name)),
                        first: Some(1),
                        last: Some(1),
                    },
                }
            }
            _ => {
                let a = self.session.sheet_index(first)?;
                let b = self.session.sheet_index(last)?;
                ExternSheet {
                    book: self.session.name.clone(),
                    first: Some(a.min(b)),
                    last: Some(a.max(b)),
                }
            }
        };
        Some(self.session.extern_index(entry))
    }

    fn name_index(&self, book: Option<&str>, name: &str) -> Option<usize> {
        match book {
            Some(b) if self.session.name.as_deref() != Some(b) => {
                Some(self.session.name_slot(NameSlot::External {
                    book: Arc::from(b),
                    name: name.to_string(),
                }))
            }
            _ => self.session.find_named_range(name, self.sheet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_approx, sheet_from, sheet_with, value_at, TestBook};
    use gridcalc_core::CellValue;

    #[test]
    fn test_formula_chain() {
        let b = sheet_from(&[
            ("A1", CellValue::Number(2.0)),
            ("A2", CellValue::formula("=A1*3")),
            ("A3", CellValue::formula("=A2+A1")),
        ]);
        assert_approx(value_at(&b, "A3"), 8.0);
        assert_approx(value_at(&b, "A2"), 6.0);
    }

    #[test]
    fn test_1904_date_system() {
        let mut b = TestBook::new();
        b.settings_mut().date_1904 = true;
        let session = BookSession::new(&b);
        assert_eq!(
            session.evaluate_formula("=DATE(1904,1,2)", 1, 1, 2).expect("parse"),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_blank_and_missing_cells() {
        let b = sheet_from(&[("A1", CellValue::formula("=B7"))]);
        assert_eq!(value_at(&b, "A1"), Value::Number(0.0));
        assert_eq!(value_at(&b, "C3"), Value::Empty);
        let session = BookSession::new(&b);
        assert_eq!(session.cell_value(2, 1, 1), Value::Error(ErrorValue::Ref));
    }

    #[test]
    fn test_circular_cells_read_zero() {
        let b = sheet_from(&[
            ("A1", CellValue::formula("=A2+1")),
            ("A2", CellValue::formula("=A1+1")),
        ]);
        let session = BookSession::new(&b);
        assert_eq!(session.cell_value(1, 1, 1), Value::Number(2.0));
        assert_eq!(session.circular_cells(), vec![(1, 1, 1)]);
        assert_eq!(
            session.unsupported(),
            vec![(UnsupportedKind::CircularReference, "1!A1".to_string())]
        );
    }

    #[test]
    fn test_array_formula_cells() {
        let mut b = sheet_with(&[("A1", 1.0), ("A2", 2.0), ("A3", 3.0)]);
        b.worksheet_mut(0)
            .expect("sheet")
            .set_array_formula("B1:B3", "=A1:A3*10")
            .expect("array formula");
        assert_approx(value_at(&b, "B1"), 10.0);
        assert_approx(value_at(&b, "B2"), 20.0);
        assert_approx(value_at(&b, "B3"), 30.0);

        // reading a middle cell first must not anchor the formula there
        let session = BookSession::new(&b);
        assert_approx(session.cell_value(1, 2, 2), 20.0);
        assert_approx(session.cell_value(1, 1, 2), 10.0);
        assert_approx(session.cell_value(1, 3, 2), 30.0);
    }

    #[test]
    fn test_defined_names_and_sheets() {
        let mut b = sheet_with(&[("A1", 5.0)]);
        b.add_worksheet_with_name("Rates").expect("sheet");
        b.worksheet_mut(1)
            .expect("sheet")
            .set_cell_value("B2", 0.25)
            .expect("value");
        b.define_name("Rate", "=Rates!$B$2").expect("name");
        b.worksheet_mut(0)
            .expect("sheet")
            .set_cell_formula("C1", "=A1*Rate")
            .expect("formula");
        assert_approx(value_at(&b, "C1"), 1.25);
        let session = BookSession::new(&b);
        assert_eq!(
            session.evaluate_formula("=Missing+1", 1, 1, 4).expect("parse"),
            Value::Error(ErrorValue::Name)
        );
        assert_approx(
            session.evaluate_formula("=SUM(Sheet1:Rates!A1:B2)", 1, 5, 5).expect("parse"),
            5.25,
        );
    }

    #[test]
    fn test_supporting_workbook() {
        let mut other = gridcalc_core::Workbook::new();
        other
            .worksheet_mut(0)
            .expect("sheet")
            .set_cell_value("A1", 7.0)
            .expect("value");
        other.define_name("Prime", "=Sheet1!$A$1").expect("name");
        let mut b = TestBook::new();
        b.add_supporting_workbook("Rates.xlsx", other);
        let session = BookSession::new(&b);
        assert_approx(
            session.evaluate_formula("=[Rates.xlsx]Sheet1!A1*2", 1, 1, 1).expect("parse"),
            14.0,
        );
        assert_approx(
            session.evaluate_formula("=[Rates.xlsx]!Prime+1", 1, 1, 1).expect("parse"),
            8.0,
        );
        assert_eq!(
            session.evaluate_formula("=[Gone.xlsx]Sheet1!A1", 1, 1, 1).expect("parse"),
            Value::Error(ErrorValue::Ref)
        );
        assert_eq!(
            session.unsupported(),
            vec![(UnsupportedKind::ExternalReference, "Gone.xlsx".to_string())]
        );
    }

    #[test]
    fn test_user_defined_functions() {
        let b = sheet_with(&[("A1", 4.0)]);
        let mut session = BookSession::new(&b);
        assert_eq!(
            session.evaluate_formula("=Twice(A1)", 1, 2, 2).expect("parse"),
            Value::Error(ErrorValue::Name)
        );
        session.register_function("twice", |_, args| match args.first() {
            Some(Value::Number(n)) => Value::Number(n * 2.0),
            _ => Value::Error(ErrorValue::Value),
        });
        assert_approx(session.evaluate_formula("=Twice(3)+1", 1, 2, 2).expect("parse"), 7.0);
    }

    #[test]
    fn test_unparsable_formula_cell() {
        let b = sheet_from(&[("A1", CellValue::formula("=1+"))]);
        assert!(value_at(&b, "A1").is_error());
    }
}
