//! Logical functions
//!
//! IF, CHOOSE and IFERROR evaluate only the branch they return. They record where
//! each branch starts by flushing it, evaluate the selector, then move the cursor
//! back to the chosen branch.

use super::{FnCall, FunctionRegistry};
use crate::address::AddressList;
use crate::aggregate::{AND, ARRAY, ERR2, OR};
use crate::coerce::{as_array, to_boolean, to_number};
use crate::error::{Calc, FormulaResult};
use crate::value::{broadcast, Value};
use gridcalc_core::ErrorValue;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add_reference("IF", 2, Some(3), fn_if, ref_if, false);
    r.add_reference("CHOOSE", 2, None, fn_choose, ref_choose, false);
    r.add("IFERROR", 2, Some(2), fn_iferror);
    r.add("IFNA", 2, Some(2), fn_ifna);
    r.add("AND", 1, None, fn_and);
    r.add("OR", 1, None, fn_or);
    r.add("XOR", 1, None, fn_xor);
    r.add("NOT", 1, Some(1), fn_not);
    r.add("TRUE", 0, Some(0), fn_true);
    r.add("FALSE", 0, Some(0), fn_false);
}

/// Start positions of the arguments after the first, in written order. The cursor
/// is left on the first argument.
fn branch_positions(call: &FnCall<'_>) -> FormulaResult<Vec<usize>> {
    let mut positions = Vec::with_capacity(call.argc.saturating_sub(1));
    for _ in 1..call.argc {
        positions.push(call.list.save_position());
        call.list.flush()?;
    }
    positions.reverse();
    Ok(positions)
}

/// Evaluate the argument that ends at `position`
fn branch_value(call: &FnCall<'_>, position: usize, agg: &dyn crate::aggregate::Aggregate) -> Value {
    call.list.restore_position(position);
    match call.list.evaluate_token(&call.cx, agg) {
        Value::Missing => Value::Number(0.0),
        v => v,
    }
}

/// IF(logical_test, value_if_true, [value_if_false])
pub fn fn_if(call: &FnCall<'_>) -> FormulaResult<Value> {
    let branches = branch_positions(call)?;
    let condition = call.list.evaluate_token(&call.cx, &ERR2);
    match condition {
        Value::Array(cond) => {
            // each branch once, then select element-wise
            let on_true = branch_value(call, branches[0], &ARRAY);
            let on_false = match branches.get(1) {
                Some(p) => branch_value(call, *p, &ARRAY),
                None => Value::Boolean(false),
            };
            Ok(broadcast(&[Value::Array(cond), on_true, on_false], |e| {
                match to_boolean(&e[0]) {
                    Ok(true) => e[1].clone(),
                    Ok(false) => e[2].clone(),
                    Err(err) => Value::Error(err),
                }
            }))
        }
        scalar => match to_boolean(&scalar) {
            Ok(true) => Ok(branch_value(call, branches[0], call.agg)),
            Ok(false) => Ok(match branches.get(1) {
                Some(p) => branch_value(call, *p, call.agg),
                None => Value::Boolean(false),
            }),
            Err(e) => Ok(Value::Error(e)),
        },
    }
}

/// IF evaluated as a reference: `SUM(IF(x, A1:A3, B1:B3))`
pub fn ref_if(call: &FnCall<'_>) -> FormulaResult<AddressList> {
    let branches = branch_positions(call)?;
    let condition = call.list.evaluate_token(&call.cx, &ERR2);
    let chosen = match to_boolean(&condition)? {
        true => branches[0],
        false => *branches.get(1).ok_or(ErrorValue::Value)?,
    };
    call.list.restore_position(chosen);
    Ok(call.list.evaluate_ref_token(&call.cx)?)
}

fn choice(index: &Value, count: usize, dates_1904: bool) -> Calc<usize> {
    let i = to_number(index, dates_1904)?.trunc();
    if i < 1.0 || i > count as f64 {
        Err(ErrorValue::Value)
    } else {
        Ok(i as usize - 1)
    }
}

/// CHOOSE(index_num, value1, [value2], ...)
pub fn fn_choose(call: &FnCall<'_>) -> FormulaResult<Value> {
    let branches = branch_positions(call)?;
    let d = call.dates_1904();
    match call.list.evaluate_token(&call.cx, &ERR2) {
        Value::Array(index) => {
            let values: Vec<Value> = branches
                .iter()
                .map(|p| branch_value(call, *p, &ARRAY))
                .collect();
            let mut args = vec![Value::Array(index)];
            args.extend(values);
            Ok(broadcast(&args, |e| match choice(&e[0], e.len() - 1, d) {
                Ok(i) => e[i + 1].clone(),
                Err(err) => Value::Error(err),
            }))
        }
        scalar => match choice(&scalar, branches.len(), d) {
            Ok(i) => Ok(branch_value(call, branches[i], call.agg)),
            Err(e) => Ok(Value::Error(e)),
        },
    }
}

/// CHOOSE evaluated as a reference
pub fn ref_choose(call: &FnCall<'_>) -> FormulaResult<AddressList> {
    let branches = branch_positions(call)?;
    let index = call.list.evaluate_token(&call.cx, &ERR2);
    let i = choice(&index, branches.len(), call.dates_1904())?;
    call.list.restore_position(branches[i]);
    Ok(call.list.evaluate_ref_token(&call.cx)?)
}

fn if_error_with(call: &FnCall<'_>, catches: fn(ErrorValue) -> bool) -> FormulaResult<Value> {
    let branches = branch_positions(call)?;
    match call.list.evaluate_token(&call.cx, &ERR2) {
        Value::Error(e) if catches(e) => Ok(branch_value(call, branches[0], &ERR2)),
        Value::Array(a) if a.iter().any(|v| matches!(v, Value::Error(e) if catches(*e))) => {
            let fallback = as_array(branch_value(call, branches[0], &ARRAY));
            Ok(broadcast(
                &[Value::Array(a), Value::Array(fallback)],
                |e| match &e[0] {
                    Value::Error(err) if catches(*err) => e[1].clone(),
                    v => v.clone(),
                },
            ))
        }
        Value::Missing => Ok(Value::Number(0.0)),
        v => Ok(v),
    }
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror(call: &FnCall<'_>) -> FormulaResult<Value> {
    if_error_with(call, |_| true)
}

/// IFNA(value, value_if_na)
pub fn fn_ifna(call: &FnCall<'_>) -> FormulaResult<Value> {
    if_error_with(call, |e| e == ErrorValue::Na)
}

/// AND(logical1, [logical2], ...) - Text and blanks in ranges are skipped
pub fn fn_and(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&AND)
}

/// OR(logical1, [logical2], ...)
pub fn fn_or(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&OR)
}

/// XOR(logical1, [logical2], ...) - TRUE when an odd number of values are TRUE
pub fn fn_xor(call: &FnCall<'_>) -> FormulaResult<Value> {
    let mut seen = false;
    let mut odd = false;
    for arg in call.arrays() {
        let literal = !arg.is_array();
        for v in as_array(arg).iter() {
            let b = match v {
                Value::Boolean(b) => *b,
                Value::Number(n) => *n != 0.0,
                Value::Error(e) => return Ok(Value::Error(*e)),
                Value::Text(_) | Value::Missing if literal => to_boolean(v)?,
                _ => continue,
            };
            seen = true;
            odd ^= b;
        }
    }
    Ok(if seen {
        Value::Boolean(odd)
    } else {
        Value::Error(ErrorValue::Value)
    })
}

/// NOT(logical)
pub fn fn_not(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.values();
    Ok(broadcast(&args, |e| match to_boolean(&e[0]) {
        Ok(b) => Value::Boolean(!b),
        Err(err) => Value::Error(err),
    }))
}

/// TRUE()
pub fn fn_true(_call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(Value::Boolean(true))
}

/// FALSE()
pub fn fn_false(_call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(Value::Boolean(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval, eval_array, eval_in, sheet_with};

    #[test]
    fn test_if_short_circuits() {
        assert_eq!(eval("=IF(TRUE,1,1/0)"), Value::Number(1.0));
        assert_eq!(eval("=IF(FALSE,1/0,2)"), Value::Number(2.0));
        assert_eq!(eval("=IF(FALSE,1)"), Value::Boolean(false));
        assert_eq!(eval("=IF(1/0,1,2)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=IF(\"x\",1,2)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=1+IF(2>1,10,20)*2"), Value::Number(21.0));
        assert_eq!(eval("=IF(TRUE,,3)"), Value::Number(0.0));
    }

    #[test]
    fn test_if_array_condition() {
        assert_eq!(
            eval_array("=IF({TRUE,FALSE},{1,2},{3,4})"),
            vec![vec![Value::Number(1.0), Value::Number(4.0)]]
        );
        assert_eq!(eval("=SUM(IF({1,0,1}>0,{5,6,7},0))"), Value::Number(12.0));
    }

    #[test]
    fn test_if_as_reference() {
        let book = sheet_with(&[("A1", 1.0), ("A2", 2.0), ("B1", 10.0), ("B2", 20.0)]);
        assert_eq!(eval_in(&book, "=SUM(IF(TRUE,A1:A2,B1:B2))"), Value::Number(3.0));
        assert_eq!(eval_in(&book, "=SUM(IF(FALSE,A1:A2,B1:B2))"), Value::Number(30.0));
        assert_eq!(eval_in(&book, "=SUM(CHOOSE(2,A1:A2,B1:B2))"), Value::Number(30.0));
        assert_eq!(eval_in(&book, "=ROWS(IF(TRUE,A1:A2,B1))"), Value::Number(2.0));
    }

    #[test]
    fn test_choose() {
        assert_eq!(eval("=CHOOSE(2,\"a\",\"b\",\"c\")"), Value::text("b"));
        assert_eq!(eval("=CHOOSE(1,5,1/0)"), Value::Number(5.0));
        assert_eq!(eval("=CHOOSE(4,1,2,3)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=CHOOSE(2.9,1,2,3)"), Value::Number(2.0));
        assert_eq!(
            eval_array("=CHOOSE({1,3},\"a\",\"b\",\"c\")"),
            vec![vec![Value::text("a"), Value::text("c")]]
        );
    }

    #[test]
    fn test_iferror() {
        assert_eq!(eval("=IFERROR(1/0,5)"), Value::Number(5.0));
        assert_eq!(eval("=IFERROR(3,1/0)"), Value::Number(3.0));
        assert_eq!(eval("=IFNA(NA(),1)"), Value::Number(1.0));
        assert_eq!(eval("=IFNA(1/0,1)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=SUM(IFERROR({1,2}/{1,0},0))"), Value::Number(1.0));
    }

    #[test]
    fn test_and_or() {
        let book = sheet_with(&[("A1", 1.0), ("A2", 0.0)]);
        assert_eq!(eval("=AND(TRUE,1)"), Value::Boolean(true));
        assert_eq!(eval("=AND(TRUE,0)"), Value::Boolean(false));
        assert_eq!(eval("=OR(FALSE,0,1)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=AND(A1:A2)"), Value::Boolean(false));
        assert_eq!(eval_in(&book, "=OR(A1:A2)"), Value::Boolean(true));
        assert_eq!(eval_in(&book, "=AND(B1:B2)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=AND(\"x\")"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=OR(1/0,TRUE)"), Value::Error(ErrorValue::Div0));
    }

    #[test]
    fn test_xor_not() {
        assert_eq!(eval("=XOR(TRUE,TRUE)"), Value::Boolean(false));
        assert_eq!(eval("=XOR(TRUE,FALSE,{1,1,1})"), Value::Boolean(false));
        assert_eq!(eval("=NOT(0)"), Value::Boolean(true));
        assert_eq!(eval("=NOT(\"a\")"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=TRUE()"), Value::Boolean(true));
    }
}
