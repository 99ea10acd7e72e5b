//! Aggregate strategies
//!
//! A token that evaluates to a range does not read the range itself: it hands the
//! range to the [`Aggregate`] its caller chose. SUM passes a summing reducer, a
//! plain operand gets [`Err2`] (implicit intersection), an array formula gets
//! [`ArrayAgg`]. Reducers return partial results that can be combined with
//! [`Aggregate::agg_values`] without reading any cell again.

mod array;
mod collect;
mod logical;
mod numeric;

pub use array::{range_to_array, ArrayAgg, ARRAY};
pub use collect::{Collect, COLLECT, COLLECT_A};
pub use logical::{Logical, AND, OR};
pub use numeric::{Reduce, ReduceOp};

use crate::address::{AddressList, AddressRange};
use crate::context::EvalContext;
use crate::error::FormulaResult;
use crate::token_list::TokenList;
use crate::value::{Array2D, Value};
use gridcalc_core::ErrorValue;
use std::ops::ControlFlow;

/// How a range (or array) operand is reduced to a value
pub trait Aggregate {
    /// Reduce a possibly multi-sheet range
    fn agg(&self, cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value>;

    /// Combine two partial results
    fn agg_values(&self, cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value>;

    /// Reduce an in-memory array the way a range is reduced
    fn agg_array(&self, cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value>;

    /// Whether operators keep this aggregate for their operands
    fn propagate_on_equality(&self) -> bool {
        false
    }
}

/// An aggregate with a final step, used by the range-reducing functions
pub trait Reducer: Aggregate {
    /// Partial result of no input
    fn identity(&self) -> Value;

    /// Final result of a fully combined partial
    fn finish(&self, partial: Value) -> Value;

    fn as_aggregate(&self) -> &dyn Aggregate;
}

/// One visited cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellVisit {
    pub sheet: usize,
    pub row: u32,
    pub col: u32,
    pub value: Value,
}

/// Visit the populated cells of a range: sheets, then rows up to the last used row,
/// then the populated columns of each row in ascending order. Hidden rows are
/// skipped when the state asks for it, and what-if substituted cells are included
/// even when they are blank.
pub fn visit_range<F>(cx: &EvalContext<'_>, range: &AddressRange, mut f: F) -> FormulaResult<()>
where
    F: FnMut(CellVisit) -> FormulaResult<ControlFlow<()>>,
{
    let range = range.ordered();
    let cx = cx.for_range(&range)?;
    let book = cx.book();
    let what_if = if cx.info.book_name.is_none() {
        cx.state.what_if.as_deref()
    } else {
        None
    };
    let (c1, c2) = (range.first.col, range.last.col);

    for sheet in range.first.sheet..=range.last.sheet {
        if sheet == 0 || sheet > book.sheet_count() {
            return Err(ErrorValue::Ref.into());
        }
        let last_row = range.last.row.min(book.row_count(sheet));
        let extra_rows = what_if
            .map(|w| w.rows_in(sheet, (last_row.saturating_add(1).max(range.first.row), range.last.row)))
            .unwrap_or_default();

        for row in (range.first.row..=last_row).chain(extra_rows) {
            if cx.state.ignore_hidden && book.row_hidden(sheet, row) {
                continue;
            }
            let mut cols = Vec::new();
            let count = book.col_count_in_row(sheet, row);
            let mut index = book.col_to_index(sheet, row, c1);
            while index < count {
                match book.col_from_index(sheet, row, index) {
                    Some(col) if col <= c2 => cols.push(col),
                    _ => break,
                }
                index += 1;
            }
            if let Some(w) = what_if {
                cols.extend(w.cols_in_row(sheet, row, (c1, c2)));
                cols.sort_unstable();
                cols.dedup();
            }
            for col in cols {
                cx.check_aborted()?;
                let value = cx.read_cell(sheet, row, col);
                if f(CellVisit {
                    sheet,
                    row,
                    col,
                    value,
                })?
                .is_break()
                {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Reduce every area of a reference list and combine the partials
pub fn agg_list(
    agg: &dyn Aggregate,
    cx: &EvalContext<'_>,
    list: &AddressList,
) -> FormulaResult<Value> {
    let mut areas = list.areas().iter();
    let first = match areas.next() {
        Some(area) => agg.agg(cx, area)?,
        None => return Ok(Value::Error(ErrorValue::Ref)),
    };
    areas.try_fold(first, |acc, area| {
        let v = agg.agg(cx, area)?;
        agg.agg_values(cx, acc, v)
    })
}

/// Pop `argc` arguments, reduce each with `reducer` and combine them left to right
pub fn reduce_args(
    list: &TokenList,
    cx: &EvalContext<'_>,
    argc: usize,
    reducer: &dyn Reducer,
) -> FormulaResult<Value> {
    Ok(reducer.finish(reduce_partial(list, cx, argc, reducer)?))
}

/// Like [`reduce_args`] but returns the combined partial without finishing it
pub fn reduce_partial(
    list: &TokenList,
    cx: &EvalContext<'_>,
    argc: usize,
    reducer: &dyn Reducer,
) -> FormulaResult<Value> {
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(list.evaluate_token(cx, reducer.as_aggregate()));
    }
    let mut acc = reducer.identity();
    for v in args.into_iter().rev() {
        acc = reducer.agg_values(cx, acc, v)?;
    }
    Ok(acc)
}

/// The scalar default: a single cell yields its value, a one-row or one-column range
/// yields the cell in the formula's own column or row, anything else is `#VALUE!`
#[derive(Debug, Clone, Copy, Default)]
pub struct Err2;

pub static ERR2: Err2 = Err2;

impl Aggregate for Err2 {
    fn agg(&self, cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value> {
        if cx.is_array_formula() {
            return ARRAY.agg(cx, range);
        }
        let r = range.ordered();
        if r.first.sheet != r.last.sheet {
            return Ok(Value::Error(ErrorValue::Value));
        }
        let (row, col) = if r.first.row == r.last.row && r.first.col == r.last.col {
            (r.first.row, r.first.col)
        } else if r.first.col == r.last.col && (r.first.row..=r.last.row).contains(&cx.info.row) {
            (cx.info.row, r.first.col)
        } else if r.first.row == r.last.row && (r.first.col..=r.last.col).contains(&cx.info.col) {
            (r.first.row, cx.info.col)
        } else {
            return Ok(Value::Error(ErrorValue::Value));
        };
        let rcx = cx.for_range(&r)?;
        if r.first.sheet == 0 || r.first.sheet > rcx.book().sheet_count() {
            return Ok(Value::Error(ErrorValue::Ref));
        }
        Ok(rcx.read_cell(r.first.sheet, row, col))
    }

    fn agg_values(&self, cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value> {
        if cx.is_array_formula() {
            return ARRAY.agg_values(cx, a, b);
        }
        Ok(Value::Error(ErrorValue::Value))
    }

    fn agg_array(&self, _cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value> {
        Ok(Value::Array(array.clone()))
    }
}

/// Arguments of user-defined functions: ranges stay references
#[derive(Debug, Clone, Copy, Default)]
pub struct UdfAgg;

pub static UDF: UdfAgg = UdfAgg;

impl Aggregate for UdfAgg {
    fn agg(&self, _cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value> {
        Ok(Value::Reference(AddressList::single(range.clone())))
    }

    fn agg_values(&self, _cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value> {
        match (a, b) {
            (Value::Reference(mut a), Value::Reference(b)) => {
                a.extend(b);
                Ok(Value::Reference(a))
            }
            (Value::Error(e), _) | (_, Value::Error(e)) => Ok(Value::Error(e)),
            _ => Ok(Value::Error(ErrorValue::Value)),
        }
    }

    fn agg_array(&self, _cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value> {
        Ok(Value::Array(array.clone()))
    }
}
