//! Conditional aggregation: SUMIF, COUNTIF, AVERAGEIF and the *IFS family

use super::args::RangeArg;
use super::criteria::ValueCriteria;
use super::{FnCall, FunctionRegistry};
use crate::address::{Address, AddressRange};
use crate::aggregate::visit_range;
use crate::context::EvalContext;
use crate::error::{Calc, FormulaResult};
use crate::value::{Array2D, Value};
use gridcalc_core::ErrorValue;
use std::ops::ControlFlow;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("SUMIF", 2, Some(3), fn_sumif);
    r.add("COUNTIF", 2, Some(2), fn_countif);
    r.add("AVERAGEIF", 2, Some(3), fn_averageif);
    r.add("SUMIFS", 3, None, fn_sumifs);
    r.add("COUNTIFS", 2, None, fn_countifs);
    r.add("AVERAGEIFS", 3, None, fn_averageifs);
}

/// A rectangular argument: a single area of cells, or an array value
pub(crate) enum Grid {
    Area(AddressRange),
    Array(Array2D),
}

impl Grid {
    pub(crate) fn from_arg(arg: RangeArg) -> Calc<Grid> {
        match arg {
            RangeArg::Ref(list) => Ok(Grid::Area(list.single_area()?.ordered())),
            RangeArg::Value(Value::Error(e)) => Err(e),
            RangeArg::Value(Value::Array(a)) => Ok(Grid::Array(a)),
            RangeArg::Value(v) => Ok(Grid::Array(Array2D::scalar(v))),
        }
    }

    pub(crate) fn dims(&self) -> (u32, u32) {
        match self {
            Grid::Area(r) => (r.row_count(), r.col_count()),
            Grid::Array(a) => (a.rows() as u32, a.cols() as u32),
        }
    }

    /// The same-sized block whose top-left corner is this grid's
    fn resized(self, dims: (u32, u32)) -> Grid {
        match self {
            Grid::Area(r) => {
                let last = Address {
                    row: r.first.row.saturating_add(dims.0 - 1),
                    col: r.first.col.saturating_add(dims.1 - 1),
                    ..r.first.clone()
                };
                Grid::Area(AddressRange::new(r.first, last))
            }
            array => array,
        }
    }

    /// The value at zero-based offset (r, c)
    pub(crate) fn get(&self, cx: &EvalContext<'_>, r: u32, c: u32) -> FormulaResult<Value> {
        match self {
            Grid::Area(range) => {
                let rcx = cx.for_range(range)?;
                Ok(rcx.read_cell(range.first.sheet, range.first.row + r, range.first.col + c))
            }
            Grid::Array(a) => Ok(a
                .get(r as usize, c as usize)
                .cloned()
                .unwrap_or(Value::Empty)),
        }
    }

    /// Visit offsets whose value could satisfy `keep`. Blank cells of an area are
    /// only visited when `blanks` is set; otherwise the populated cells suffice.
    pub(crate) fn scan(
        &self,
        cx: &EvalContext<'_>,
        blanks: bool,
        mut f: impl FnMut(u32, u32, &Value) -> FormulaResult<()>,
    ) -> FormulaResult<()> {
        match self {
            Grid::Array(a) => {
                for r in 0..a.rows() {
                    for (c, v) in a.row_slice(r).iter().enumerate() {
                        f(r as u32, c as u32, v)?;
                    }
                }
                Ok(())
            }
            Grid::Area(range) if blanks => {
                let rcx = cx.for_range(range)?;
                let book = rcx.book();
                let last_row = range.last.row.min(book.row_count(range.first.sheet).max(range.first.row));
                for row in range.first.row..=last_row {
                    for col in range.first.col..=range.last.col {
                        cx.check_aborted()?;
                        let v = rcx.read_cell(range.first.sheet, row, col);
                        f(row - range.first.row, col - range.first.col, &v)?;
                    }
                }
                // rows past the last used one are blank
                let blank_rows = range.last.row - last_row;
                if blank_rows > 0 {
                    for row in 0..blank_rows {
                        for col in 0..range.col_count() {
                            f(last_row - range.first.row + 1 + row, col, &Value::Empty)?;
                        }
                    }
                }
                Ok(())
            }
            Grid::Area(range) => visit_range(cx, range, |cell| {
                f(cell.row - range.first.row, cell.col - range.first.col, &cell.value)?;
                Ok(ControlFlow::Continue(()))
            }),
        }
    }
}

/// What the matching cells are reduced to
#[derive(Debug, Clone, Copy, PartialEq)]
enum Conditional {
    Sum,
    Count,
    Average,
}

/// Scan the first criteria grid, test every other criterion at the same offset and
/// fold the matching cells of `values`
fn conditional(
    cx: &EvalContext<'_>,
    criteria: &[(Grid, ValueCriteria)],
    values: Option<&Grid>,
    kind: Conditional,
) -> FormulaResult<Value> {
    let Some(((first, first_criteria), rest)) = criteria.split_first() else {
        return Ok(Value::Error(ErrorValue::Value));
    };
    let ignore_errors = cx.state.ignore_errors;
    let (mut sum, mut count) = (0.0, 0.0);
    let mut error = None;
    first.scan(cx, first_criteria.matches_blank(), |r, c, v| {
        if error.is_some() || !first_criteria.matches(v) {
            return Ok(());
        }
        for (grid, criterion) in rest {
            if !criterion.matches(&grid.get(cx, r, c)?) {
                return Ok(());
            }
        }
        match kind {
            Conditional::Count => count += 1.0,
            _ => {
                let value = match values {
                    Some(grid) => grid.get(cx, r, c)?,
                    None => v.clone(),
                };
                match value {
                    Value::Number(n) => {
                        sum += n;
                        count += 1.0;
                    }
                    Value::Error(e) if !ignore_errors => error = Some(e),
                    _ => {}
                }
            }
        }
        Ok(())
    })?;
    if let Some(e) = error {
        return Ok(Value::Error(e));
    }
    Ok(match kind {
        Conditional::Sum => Value::Number(sum),
        Conditional::Count => Value::Number(count),
        Conditional::Average if count == 0.0 => Value::Error(ErrorValue::Div0),
        Conditional::Average => Value::Number(sum / count),
    })
}

/// Evaluate once per criterion element when the criterion is an array
fn per_criterion(
    criterion: &Value,
    mut f: impl FnMut(&Value) -> FormulaResult<Value>,
) -> FormulaResult<Value> {
    match criterion {
        Value::Array(a) => {
            let mut out = Vec::with_capacity(a.len());
            for v in a.iter() {
                out.push(f(v)?);
            }
            Ok(Array2D::from_vec(a.rows(), a.cols(), out)
                .map_or(Value::Error(ErrorValue::Value), Value::Array))
        }
        scalar => f(scalar),
    }
}

/// SUMIF / AVERAGEIF shape: (range, criteria, [values_range])
fn single_criterion(call: &FnCall<'_>, kind: Conditional) -> FormulaResult<Value> {
    let mut args = call.range_args(&[0, 2]).into_iter();
    let range = args.next().map(Grid::from_arg).transpose()?;
    let criterion = args.next().map(|a| a.value()).unwrap_or(Value::Missing);
    let values = args.next().map(Grid::from_arg).transpose()?;
    let Some(range) = range else {
        return Ok(Value::Error(ErrorValue::Value));
    };
    let values = values.map(|v| v.resized(range.dims()));
    let dates_1904 = call.dates_1904();
    let mut criteria = vec![(range, ValueCriteria::new(&Value::Missing, dates_1904))];
    per_criterion(&criterion, |c| {
        criteria[0].1 = ValueCriteria::new(c, dates_1904);
        conditional(&call.cx, &criteria, values.as_ref(), kind)
    })
}

/// SUMIF(range, criteria, [sum_range]) - The sum range takes the shape of `range`
/// from its own top-left cell
pub fn fn_sumif(call: &FnCall<'_>) -> FormulaResult<Value> {
    single_criterion(call, Conditional::Sum)
}

/// AVERAGEIF(range, criteria, [average_range])
pub fn fn_averageif(call: &FnCall<'_>) -> FormulaResult<Value> {
    single_criterion(call, Conditional::Average)
}

/// COUNTIF(range, criteria)
pub fn fn_countif(call: &FnCall<'_>) -> FormulaResult<Value> {
    single_criterion(call, Conditional::Count)
}

/// (criteria_range, criteria) pairs; every range must have the shape `dims`
fn criteria_pairs(
    args: Vec<RangeArg>,
    dims: Option<(u32, u32)>,
    dates_1904: bool,
) -> FormulaResult<Calc<Vec<(Grid, ValueCriteria)>>> {
    if args.len() % 2 != 0 {
        return Ok(Err(ErrorValue::Value));
    }
    let mut pairs = Vec::with_capacity(args.len() / 2);
    let mut dims = dims;
    let mut it = args.into_iter();
    while let (Some(range), Some(criterion)) = (it.next(), it.next()) {
        let grid = match Grid::from_arg(range) {
            Ok(g) => g,
            Err(e) => return Ok(Err(e)),
        };
        if *dims.get_or_insert(grid.dims()) != grid.dims() {
            return Ok(Err(ErrorValue::Value));
        }
        let criterion = match criterion.value() {
            Value::Array(a) => a.first().clone(),
            v => v,
        };
        pairs.push((grid, ValueCriteria::new(&criterion, dates_1904)));
    }
    Ok(Ok(pairs))
}

fn multiple_criteria(call: &FnCall<'_>, kind: Conditional) -> FormulaResult<Value> {
    let has_values = kind != Conditional::Count;
    let ranges: Vec<usize> = (0..call.argc)
        .filter(|i| if has_values { *i == 0 || i % 2 == 1 } else { i % 2 == 0 })
        .collect();
    let mut args = call.range_args(&ranges);
    let values = if has_values {
        match Grid::from_arg(args.remove(0)) {
            Ok(g) => Some(g),
            Err(e) => return Ok(Value::Error(e)),
        }
    } else {
        None
    };
    let dims = values.as_ref().map(Grid::dims);
    match criteria_pairs(args, dims, call.dates_1904())? {
        Ok(pairs) => conditional(&call.cx, &pairs, values.as_ref(), kind),
        Err(e) => Ok(Value::Error(e)),
    }
}

/// SUMIFS(sum_range, criteria_range1, criteria1, ...)
pub fn fn_sumifs(call: &FnCall<'_>) -> FormulaResult<Value> {
    multiple_criteria(call, Conditional::Sum)
}

/// COUNTIFS(criteria_range1, criteria1, ...)
pub fn fn_countifs(call: &FnCall<'_>) -> FormulaResult<Value> {
    multiple_criteria(call, Conditional::Count)
}

/// AVERAGEIFS(average_range, criteria_range1, criteria1, ...)
pub fn fn_averageifs(call: &FnCall<'_>) -> FormulaResult<Value> {
    multiple_criteria(call, Conditional::Average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval_in, sheet_from};
    use gridcalc_core::CellValue;

    fn book() -> crate::testing::TestBook {
        sheet_from(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::Number(2.0)),
            ("A3", CellValue::Number(3.0)),
            ("A4", CellValue::Number(4.0)),
            ("B1", CellValue::string("apple")),
            ("B2", CellValue::string("banana")),
            ("B3", CellValue::string("apricot")),
            ("B4", CellValue::string("cherry")),
            ("C1", CellValue::Number(10.0)),
            ("C2", CellValue::Number(20.0)),
            ("C3", CellValue::Number(30.0)),
            ("C4", CellValue::Number(40.0)),
        ])
    }

    #[test]
    fn test_sumif() {
        let book = book();
        assert_eq!(eval_in(&book, "=SUMIF(A1:A4,\">2\")"), Value::Number(7.0));
        assert_eq!(eval_in(&book, "=SUMIF(B1:B4,\"a*\",C1:C4)"), Value::Number(40.0));
        // the sum range extends from its top-left cell
        assert_eq!(eval_in(&book, "=SUMIF(B1:B4,\"a*\",C1)"), Value::Number(40.0));
        assert_eq!(eval_in(&book, "=SUMIF(A1:A4,3,C1:C4)"), Value::Number(30.0));
        assert_eq!(eval_in(&book, "=SUMIF(A1:A4,\"<>2\")"), Value::Number(8.0));
    }

    #[test]
    fn test_countif() {
        let book = book();
        assert_eq!(eval_in(&book, "=COUNTIF(A1:A4,\">=2\")"), Value::Number(3.0));
        assert_eq!(eval_in(&book, "=COUNTIF(B1:B4,\"?pple\")"), Value::Number(1.0));
        assert_eq!(eval_in(&book, "=COUNTIF(A1:A6,\"\")"), Value::Number(2.0));
        assert_eq!(eval_in(&book, "=COUNTIF(A1:A6,\"<>\")"), Value::Number(4.0));
        assert_eq!(
            eval_in(&book, "=SUM(COUNTIF(A1:A4,{\">1\",\">3\"}))"),
            Value::Number(4.0)
        );
    }

    #[test]
    fn test_averageif() {
        let book = book();
        assert_eq!(eval_in(&book, "=AVERAGEIF(A1:A4,\">2\",C1:C4)"), Value::Number(35.0));
        assert_eq!(
            eval_in(&book, "=AVERAGEIF(A1:A4,\">9\")"),
            Value::Error(ErrorValue::Div0)
        );
    }

    #[test]
    fn test_ifs_family() {
        let book = book();
        assert_eq!(
            eval_in(&book, "=SUMIFS(C1:C4,A1:A4,\">1\",B1:B4,\"a*\")"),
            Value::Number(30.0)
        );
        assert_eq!(
            eval_in(&book, "=COUNTIFS(A1:A4,\">1\",C1:C4,\"<40\")"),
            Value::Number(2.0)
        );
        assert_eq!(
            eval_in(&book, "=AVERAGEIFS(C1:C4,A1:A4,\"<=2\")"),
            Value::Number(15.0)
        );
        assert_eq!(
            eval_in(&book, "=SUMIFS(C1:C4,A1:A3,\">1\")"),
            Value::Error(ErrorValue::Value)
        );
    }
}
