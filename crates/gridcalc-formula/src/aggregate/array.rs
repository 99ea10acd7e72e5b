//! Matrix-building aggregate

use super::{visit_range, Aggregate};
use crate::address::AddressRange;
use crate::coerce::as_array;
use crate::context::EvalContext;
use crate::error::FormulaResult;
use crate::value::{Array2D, Value};
use gridcalc_core::ErrorValue;
use std::ops::ControlFlow;

/// Largest array a range is allowed to become
pub const MAX_ARRAY_CELLS: u64 = 4_000_000;

/// Snapshot of a range as an array. Whole-column references stop at the last used
/// row so that `A:A` does not become a million-row array.
pub fn range_to_array(cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Array2D> {
    let r = range.ordered();
    if r.is_3d() {
        return Err(ErrorValue::Value.into());
    }
    let rcx = cx.for_range(&r)?;
    let book = rcx.book();
    if r.first.sheet == 0 || r.first.sheet > book.sheet_count() {
        return Err(ErrorValue::Ref.into());
    }
    let mut last_row = r.last.row;
    if r.first.row == 1 && r.last.row >= cx.info.options.limits.max_rows {
        last_row = book.row_count(r.first.sheet).max(1);
    }
    let rows = u64::from(last_row - r.first.row + 1);
    let cols = u64::from(r.last.col - r.first.col + 1);
    if rows * cols > MAX_ARRAY_CELLS {
        return Err(ErrorValue::Num.into());
    }
    let mut array = Array2D::filled(rows as usize, cols as usize, Value::Empty);
    let mut clipped = r.clone();
    clipped.last.row = last_row;
    visit_range(cx, &clipped, |cell| {
        array.set(
            (cell.row - r.first.row) as usize,
            (cell.col - r.first.col) as usize,
            cell.value,
        );
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(array)
}

/// Builds arrays out of ranges, for array formulas and array arguments
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayAgg;

pub static ARRAY: ArrayAgg = ArrayAgg;

impl Aggregate for ArrayAgg {
    fn agg(&self, cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value> {
        Ok(Value::Array(range_to_array(cx, range)?))
    }

    /// Joins two one-dimensional arrays along their long axis: two columns stack,
    /// two rows sit side by side
    fn agg_values(&self, _cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value> {
        if let Value::Error(e) = a {
            return Ok(Value::Error(e));
        }
        if let Value::Error(e) = b {
            return Ok(Value::Error(e));
        }
        let (a, b) = (as_array(a), as_array(b));
        let joined = if a.rows() == 1 && b.rows() == 1 {
            let mut data = a.into_values();
            data.extend(b.into_values());
            Array2D::row(data)
        } else if a.cols() == 1 && b.cols() == 1 {
            let mut data = a.into_values();
            data.extend(b.into_values());
            Array2D::column(data)
        } else {
            None
        };
        Ok(joined.map_or(Value::Error(ErrorValue::Value), Value::Array))
    }

    fn agg_array(&self, _cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value> {
        Ok(Value::Array(array.clone()))
    }

    fn propagate_on_equality(&self) -> bool {
        true
    }
}
