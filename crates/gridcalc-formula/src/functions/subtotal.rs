//! SUBTOTAL and AGGREGATE
//!
//! Both pick an aggregate function by number and apply it to the remaining
//! arguments under changed evaluation flags: hidden rows skipped, error cells
//! skipped, and cells that are themselves subtotals read as blank.

use super::args::{doubles, number};
use super::statistical::{
    fn_average, fn_count, fn_counta, fn_max, fn_median, fn_min, fn_mode, fn_stdev, fn_stdevp,
    fn_var, fn_varp, kth_largest, kth_smallest, percentile_exc, percentile_inc, quartile_exc,
    quartile_inc,
};
use super::math::{fn_product, fn_sum};
use super::{FnCall, FunctionImpl, FunctionRegistry};
use crate::aggregate::{reduce_args, COLLECT, ERR2};
use crate::context::CalcState;
use crate::error::{Calc, FormulaResult};
use crate::value::Value;
use gridcalc_core::ErrorValue;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("SUBTOTAL", 2, None, fn_subtotal);
    r.add("AGGREGATE", 3, None, fn_aggregate);
}

/// Functions 1 to 11, shared by both dispatchers
const BASIC: [FunctionImpl; 11] = [
    fn_average, fn_count, fn_counta, fn_max, fn_min, fn_product, fn_stdev, fn_stdevp, fn_sum,
    fn_var, fn_varp,
];

/// AGGREGATE 14 to 19 take an array and a second number
const ORDERED: [fn(&[f64], f64) -> Calc<f64>; 6] = [
    kth_largest,
    kth_smallest,
    percentile_inc,
    quartile_inc,
    percentile_exc,
    quartile_exc,
];

/// Evaluate the first `n` arguments, which sit deepest in the postfix list, and put
/// the cursor back on the last argument. Returns the values in written order and
/// the position after the whole argument list.
fn leading_args(call: &FnCall<'_>, n: usize) -> FormulaResult<(Vec<Value>, usize)> {
    let start = call.list.save_position();
    for _ in n..call.argc {
        call.list.flush()?;
    }
    let mut values: Vec<Value> = (0..n)
        .map(|_| call.list.evaluate_token(&call.cx, &ERR2))
        .collect();
    values.reverse();
    let end = call.list.save_position();
    call.list.restore_position(start);
    Ok((values, end))
}

fn selector(v: &Value, dates_1904: bool) -> Calc<u32> {
    let n = number(v, dates_1904)?.trunc();
    if n < 1.0 || n > f64::from(u32::MAX) {
        return Err(ErrorValue::Value);
    }
    Ok(n as u32)
}

/// Run `f` over the trailing `argc` arguments with the given flags
fn dispatch(
    call: &FnCall<'_>,
    argc: usize,
    state: &CalcState,
    f: impl FnOnce(&FnCall<'_>) -> FormulaResult<Value>,
) -> FormulaResult<Value> {
    let inner = FnCall {
        list: call.list,
        cx: call.cx.with_state(state),
        argc,
        agg: call.agg,
        def: call.def,
    };
    f(&inner)
}

/// SUBTOTAL(function_num, ref1, ...) - 1-11 count hidden rows, 101-111 skip them
pub fn fn_subtotal(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (lead, end) = leading_args(call, 1)?;
    let d = call.dates_1904();
    let result = match selector(&lead[0], d) {
        Ok(n) if (1..=11).contains(&(n % 100)) && n / 100 <= 1 => {
            let mut state = call.cx.state.clone();
            state.ignore_hidden = n > 100;
            state.in_subtotal = true;
            let f = BASIC[(n % 100) as usize - 1];
            dispatch(call, call.argc - 1, &state, f)
        }
        Ok(_) => Ok(Value::Error(ErrorValue::Value)),
        Err(e) => Ok(Value::Error(e)),
    };
    call.list.restore_position(end);
    result
}

/// AGGREGATE(function_num, options, ref1, ...) or
/// AGGREGATE(function_num, options, array, k)
///
/// Options: 0-3 skip nested subtotals, odd options skip hidden rows, and options
/// 2, 3, 6 and 7 skip error values.
pub fn fn_aggregate(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (lead, end) = leading_args(call, 2)?;
    let d = call.dates_1904();
    let options = match &lead[1] {
        Value::Missing => Ok(0),
        v => number(v, d).map(|x| x.trunc()).and_then(|x| {
            if (0.0..=7.0).contains(&x) {
                Ok(x as u32)
            } else {
                Err(ErrorValue::Value)
            }
        }),
    };
    let result = match (selector(&lead[0], d), options) {
        (Ok(n), Ok(options)) if (1..=19).contains(&n) => {
            let mut state = call.cx.state.clone();
            state.in_subtotal = options <= 3;
            state.ignore_hidden = options % 2 == 1;
            state.ignore_errors = matches!(options, 2 | 3 | 6 | 7);
            let argc = call.argc - 2;
            match n {
                1..=11 => dispatch(call, argc, &state, BASIC[n as usize - 1]),
                12 => dispatch(call, argc, &state, fn_median),
                13 => dispatch(call, argc, &state, fn_mode),
                _ if argc != 2 => Ok(Value::Error(ErrorValue::Value)),
                _ => {
                    let f = ORDERED[n as usize - 14];
                    dispatch(call, argc, &state, |inner| {
                        let k = inner.list.evaluate_token(&inner.cx, &ERR2);
                        let xs = doubles(reduce_args(inner.list, &inner.cx, 1, &COLLECT)?)?;
                        Ok(number(&k, d).and_then(|k| f(&xs, k)).into())
                    })
                }
            }
        }
        (Ok(_), Ok(_)) => Ok(Value::Error(ErrorValue::Value)),
        (Err(e), _) | (_, Err(e)) => Ok(Value::Error(e)),
    };
    call.list.restore_position(end);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_approx, eval, eval_in, sheet_from, TestBook};
    use gridcalc_core::CellValue;

    /// A1:A5 = 1..5 with row 3 hidden, A6 subtotals A1:A5, B1:B4 with an error in B2
    fn book() -> TestBook {
        let n = CellValue::Number;
        let mut book = sheet_from(&[
            ("A1", n(1.0)),
            ("A2", n(2.0)),
            ("A3", n(3.0)),
            ("A4", n(4.0)),
            ("A5", n(5.0)),
            ("A6", CellValue::formula("=SUBTOTAL(9,A1:A5)")),
            ("B1", n(10.0)),
            ("B2", CellValue::formula("=1/0")),
            ("B3", n(30.0)),
            ("B4", n(20.0)),
        ]);
        book.worksheet_mut(0).expect("sheet").set_row_hidden(2, true);
        book
    }

    #[test]
    fn test_subtotal_hidden_rows() {
        let b = book();
        assert_approx(eval_in(&b, "=SUBTOTAL(9,A1:A5)"), 15.0);
        assert_approx(eval_in(&b, "=SUBTOTAL(109,A1:A5)"), 12.0);
        assert_approx(eval_in(&b, "=SUBTOTAL(102,A1:A5)"), 4.0);
        assert_approx(eval_in(&b, "=SUBTOTAL(1,A1:A5)"), 3.0);
        assert_approx(eval_in(&b, "=SUBTOTAL(4,A1:A5,B1)"), 10.0);
    }

    #[test]
    fn test_subtotal_skips_nested_subtotals() {
        let b = book();
        assert_approx(eval_in(&b, "=SUBTOTAL(9,A1:A6)"), 15.0);
        assert_approx(eval_in(&b, "=SUM(A1:A6)"), 30.0);
        assert_approx(eval_in(&b, "=SUBTOTAL(3,A1:A6)"), 5.0);
    }

    #[test]
    fn test_subtotal_bad_selector() {
        assert_eq!(eval("=SUBTOTAL(12,1,2)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=SUBTOTAL(0,1)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=SUBTOTAL(1/0,1)"), Value::Error(ErrorValue::Div0));
        assert_approx(eval("=SUBTOTAL(9,1,2,3)"), 6.0);
    }

    #[test]
    fn test_aggregate_errors_and_hidden() {
        let b = book();
        assert_eq!(eval_in(&b, "=AGGREGATE(9,4,B1:B4)"), Value::Error(ErrorValue::Div0));
        assert_approx(eval_in(&b, "=AGGREGATE(9,6,B1:B4)"), 60.0);
        assert_approx(eval_in(&b, "=AGGREGATE(4,6,B1:B4)"), 30.0);
        assert_approx(eval_in(&b, "=AGGREGATE(9,5,A1:A5)"), 12.0);
        assert_approx(eval_in(&b, "=AGGREGATE(9,0,A1:A6)"), 15.0);
        assert_approx(eval_in(&b, "=AGGREGATE(9,4,A1:A6)"), 30.0);
        assert_approx(eval_in(&b, "=AGGREGATE(12,6,B1:B4)"), 20.0);
    }

    #[test]
    fn test_aggregate_ordered_functions() {
        let b = book();
        assert_approx(eval_in(&b, "=AGGREGATE(14,6,B1:B4,1)"), 30.0);
        assert_approx(eval_in(&b, "=AGGREGATE(15,6,B1:B4,2)"), 20.0);
        assert_approx(eval_in(&b, "=AGGREGATE(16,6,B1:B4,0.5)"), 20.0);
        assert_approx(eval_in(&b, "=AGGREGATE(17,7,A1:A5,2)"), 3.0);
        assert_eq!(
            eval_in(&b, "=AGGREGATE(14,6,B1:B4)"),
            Value::Error(ErrorValue::Value)
        );
        assert_eq!(
            eval_in(&b, "=AGGREGATE(14,6,B1:B4,9)"),
            Value::Error(ErrorValue::Num)
        );
        assert_eq!(eval("=AGGREGATE(9,8,1)"), Value::Error(ErrorValue::Value));
    }
}
