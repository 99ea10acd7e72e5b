//! Information functions

use super::{FnCall, FunctionRegistry, RangeArg};
use crate::address::AddressList;
use crate::aggregate::ERR2;
use crate::coerce::to_number;
use crate::error::FormulaResult;
use crate::value::{broadcast, Array2D, Value};
use gridcalc_core::ErrorValue;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("AREAS", 1, Some(1), fn_areas);
    r.add("ROW", 0, Some(1), fn_row);
    r.add("COLUMN", 0, Some(1), fn_column);
    r.add("ROWS", 1, Some(1), fn_rows);
    r.add("COLUMNS", 1, Some(1), fn_columns);
    r.add("ERROR.TYPE", 1, Some(1), fn_error_type);
    r.add("ISBLANK", 1, Some(1), fn_isblank);
    r.add("ISERR", 1, Some(1), fn_iserr);
    r.add("ISERROR", 1, Some(1), fn_iserror);
    r.add("ISEVEN", 1, Some(1), fn_iseven);
    r.add("ISODD", 1, Some(1), fn_isodd);
    r.add("ISLOGICAL", 1, Some(1), fn_islogical);
    r.add("ISNA", 1, Some(1), fn_isna);
    r.add("ISNONTEXT", 1, Some(1), fn_isnontext);
    r.add("ISNUMBER", 1, Some(1), fn_isnumber);
    r.add("ISTEXT", 1, Some(1), fn_istext);
    r.add("ISREF", 1, Some(1), fn_isref);
    r.add("N", 1, Some(1), fn_n);
    r.add("NA", 0, Some(0), fn_na);
    r.add("TYPE", 1, Some(1), fn_type);
}

fn single_ref(call: &FnCall<'_>) -> FormulaResult<AddressList> {
    Ok(call.list.evaluate_ref_token(&call.cx)?)
}

/// Apply a predicate to the argument, element-wise for arrays
fn is_kind(call: &FnCall<'_>, f: fn(&Value) -> bool) -> FormulaResult<Value> {
    let args = call.values();
    Ok(broadcast(&args, |e| Value::Boolean(f(&e[0]))))
}

/// AREAS(reference)
pub fn fn_areas(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(Value::Number(single_ref(call)?.len() as f64))
}

/// Rows or columns covered by the first area, as a number or (in array
/// formulas) a vector
fn position(call: &FnCall<'_>, rows: bool) -> FormulaResult<Value> {
    if call.argc == 0 {
        let host = call.cx.host();
        return Ok(Value::Number(if rows { host.row } else { host.col } as f64));
    }
    let list = single_ref(call)?;
    let area = list.areas().first().ok_or(ErrorValue::Ref)?.ordered();
    let (first, last) = if rows {
        (area.first.row, area.last.row)
    } else {
        (area.first.col, area.last.col)
    };
    if first == last || !call.cx.is_array_formula() {
        return Ok(Value::Number(first as f64));
    }
    let values: Vec<Value> = (first..=last).map(|n| Value::Number(n as f64)).collect();
    let array = if rows {
        Array2D::column(values)
    } else {
        Array2D::row(values)
    };
    Ok(array.map_or(Value::Error(ErrorValue::Value), Value::Array))
}

/// ROW([reference])
pub fn fn_row(call: &FnCall<'_>) -> FormulaResult<Value> {
    position(call, true)
}

/// COLUMN([reference])
pub fn fn_column(call: &FnCall<'_>) -> FormulaResult<Value> {
    position(call, false)
}

fn extent(call: &FnCall<'_>, rows: bool) -> FormulaResult<Value> {
    let arg = call.range_args(&[0]).remove(0);
    let n = match arg {
        RangeArg::Ref(list) => {
            let area = list.single_area()?;
            if rows {
                area.row_count() as usize
            } else {
                area.col_count() as usize
            }
        }
        RangeArg::Value(Value::Error(e)) => return Ok(Value::Error(e)),
        RangeArg::Value(Value::Array(a)) => {
            if rows {
                a.rows()
            } else {
                a.cols()
            }
        }
        RangeArg::Value(_) => 1,
    };
    Ok(Value::Number(n as f64))
}

/// ROWS(array)
pub fn fn_rows(call: &FnCall<'_>) -> FormulaResult<Value> {
    extent(call, true)
}

/// COLUMNS(array)
pub fn fn_columns(call: &FnCall<'_>) -> FormulaResult<Value> {
    extent(call, false)
}

/// ERROR.TYPE(error_val)
pub fn fn_error_type(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.values();
    Ok(broadcast(&args, |e| match &e[0] {
        Value::Error(err) => Value::Number(err.type_number() as f64),
        _ => Value::Error(ErrorValue::Na),
    }))
}

/// ISBLANK(value)
pub fn fn_isblank(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| matches!(v, Value::Empty))
}

/// ISERR(value) - any error except #N/A
pub fn fn_iserr(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| matches!(v, Value::Error(e) if *e != ErrorValue::Na))
}

/// ISERROR(value)
pub fn fn_iserror(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, Value::is_error)
}

/// ISNA(value)
pub fn fn_isna(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| matches!(v, Value::Error(ErrorValue::Na)))
}

/// ISLOGICAL(value)
pub fn fn_islogical(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| matches!(v, Value::Boolean(_)))
}

/// ISNUMBER(value)
pub fn fn_isnumber(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| matches!(v, Value::Number(_)))
}

/// ISTEXT(value)
pub fn fn_istext(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| matches!(v, Value::Text(_)))
}

/// ISNONTEXT(value)
pub fn fn_isnontext(call: &FnCall<'_>) -> FormulaResult<Value> {
    is_kind(call, |v| !matches!(v, Value::Text(_)))
}

fn parity(call: &FnCall<'_>, even: bool) -> FormulaResult<Value> {
    let args = call.values();
    let d = call.dates_1904();
    Ok(broadcast(&args, |e| {
        if matches!(e[0], Value::Boolean(_)) {
            return Value::Error(ErrorValue::Value);
        }
        match to_number(&e[0], d) {
            Ok(x) => Value::Boolean((x.trunc() % 2.0 == 0.0) == even),
            Err(err) => Value::Error(err),
        }
    }))
}

/// ISEVEN(number)
pub fn fn_iseven(call: &FnCall<'_>) -> FormulaResult<Value> {
    parity(call, true)
}

/// ISODD(number)
pub fn fn_isodd(call: &FnCall<'_>) -> FormulaResult<Value> {
    parity(call, false)
}

/// ISREF(value)
pub fn fn_isref(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(Value::Boolean(call.list.evaluate_ref_token(&call.cx).is_ok()))
}

/// N(value) - numbers pass, TRUE is 1, everything else is 0
pub fn fn_n(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(match call.list.evaluate_token(&call.cx, &ERR2) {
        Value::Array(a) => n_of(a.first()),
        v => n_of(&v),
    })
}

fn n_of(v: &Value) -> Value {
    match v {
        Value::Number(n) => Value::Number(*n),
        Value::Boolean(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
        Value::Error(e) => Value::Error(*e),
        _ => Value::Number(0.0),
    }
}

/// NA()
pub fn fn_na(_call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(Value::Error(ErrorValue::Na))
}

/// TYPE(value)
pub fn fn_type(call: &FnCall<'_>) -> FormulaResult<Value> {
    let code = match call.range_args(&[0]).remove(0) {
        RangeArg::Ref(list) => match list.single_area() {
            Ok(area) if area.is_single_cell() => call
                .cx
                .read_address(&area.first)?
                .type_code(),
            Ok(_) => 64.0,
            Err(_) => 16.0,
        },
        RangeArg::Value(v) => v.type_code(),
    };
    Ok(Value::Number(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval, eval_in, sheet_from};
    use gridcalc_core::CellValue;

    #[test]
    fn test_row_column() {
        assert_eq!(eval("=ROW(C5)"), Value::Number(5.0));
        assert_eq!(eval("=COLUMN(C5:E9)"), Value::Number(3.0));
        assert_eq!(eval("=ROWS(C5:E9)"), Value::Number(5.0));
        assert_eq!(eval("=COLUMNS(C5:E9)"), Value::Number(3.0));
        assert_eq!(eval("=ROWS({1,2;3,4;5,6})"), Value::Number(3.0));
        assert_eq!(eval("=COLUMNS(7)"), Value::Number(1.0));
        assert_eq!(eval("=AREAS((A1:B2,C3,D4))"), Value::Number(3.0));
        assert_eq!(eval("=SUM(ROW(A1:A3))"), Value::Number(1.0));
    }

    #[test]
    fn test_predicates() {
        let book = sheet_from(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::string("x")),
            ("A3", CellValue::Error(ErrorValue::Na)),
        ]);
        assert_eq!(eval_in(&book, "=ISNUMBER(A1)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=ISTEXT(A2)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=ISNONTEXT(A4)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=ISBLANK(A4)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=ISNA(A3)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=ISERR(A3)"), Value::Boolean(false));
        assert_eq!(eval_in(&book, "=ISERROR(A3)"), Value::Boolean(true));
        assert_eq!(eval("=ISERR(1/0)"), Value::Boolean(true));
        assert_eq!(eval("=ISLOGICAL(1=1)"), Value::Boolean(true));
        assert_eq!(eval("=ISREF(A1)"), Value::Boolean(true));
        assert_eq!(eval("=ISREF(1)"), Value::Boolean(false));
        assert_eq!(eval("=ISEVEN(-2.5)"), Value::Boolean(true));
        assert_eq!(eval("=ISODD(3)"), Value::Boolean(true));
        assert_eq!(eval("=ISEVEN(\"a\")"), Value::Error(ErrorValue::Value));
    }

    #[test]
    fn test_error_type_and_n() {
        assert_eq!(eval("=ERROR.TYPE(1/0)"), Value::Number(2.0));
        assert_eq!(eval("=ERROR.TYPE(NA())"), Value::Number(7.0));
        assert_eq!(eval("=ERROR.TYPE(1)"), Value::Error(ErrorValue::Na));
        assert_eq!(eval("=N(TRUE)"), Value::Number(1.0));
        assert_eq!(eval("=N(\"7\")"), Value::Number(0.0));
        assert_eq!(eval("=N(NA())"), Value::Error(ErrorValue::Na));
    }

    #[test]
    fn test_type() {
        assert_eq!(eval("=TYPE(1)"), Value::Number(1.0));
        assert_eq!(eval("=TYPE(\"a\")"), Value::Number(2.0));
        assert_eq!(eval("=TYPE(TRUE)"), Value::Number(4.0));
        assert_eq!(eval("=TYPE(1/0)"), Value::Number(16.0));
        assert_eq!(eval("=TYPE({1,2})"), Value::Number(64.0));
        assert_eq!(eval("=TYPE(A1:B2)"), Value::Number(64.0));
    }
}
