//! Per-token evaluation
//!
//! [`evaluate`] computes a token's value, reducing any range it produces with the
//! caller's aggregate. [`evaluate_ref`] computes the reference a token stands for,
//! so that reference operators and functions such as OFFSET can compose
//! references before any cell is read.

use crate::address::{expand_ranges, intersect_ranges, Address, AddressList, AddressRange};
use crate::aggregate::{agg_list, Aggregate, ERR2, UDF};
use crate::book::{NamedRangeData, UnsupportedKind};
use crate::coerce::{compare_values, to_number, to_text};
use crate::context::{EvalContext, WorkbookInfo};
use crate::error::{Calc, FormulaError, FormulaResult};
use crate::functions::{registry, FnCall};
use crate::token::{BinaryOp, CellRef, Token, UnaryOp};
use crate::token_list::TokenList;
use crate::value::{broadcast, Value};
use gridcalc_core::ErrorValue;
use std::cmp::Ordering;
use std::sync::Arc;

/// Evaluate a popped token as a value
pub(crate) fn evaluate(
    list: &TokenList,
    token: &Token,
    cx: &EvalContext<'_>,
    agg: &dyn Aggregate,
) -> FormulaResult<Value> {
    match token {
        Token::Number(n) => Ok(Value::Number(*n)),
        Token::Text(s) => Ok(Value::Text(s.clone())),
        Token::Boolean(b) => Ok(Value::Boolean(*b)),
        Token::Error(e) => Ok(Value::Error(*e)),
        Token::Missing => Ok(Value::Missing),
        Token::Array(a) => Ok(Value::Array(a.clone())),

        Token::Unary(op) => {
            let v = list.evaluate_token(cx, operand_agg(agg));
            let dates_1904 = cx.dates_1904();
            Ok(broadcast(&[v], |a| unary(*op, &a[0], dates_1904)))
        }
        Token::Binary(BinaryOp::Union) => {
            let b = list.evaluate_token(cx, agg);
            let a = list.evaluate_token(cx, agg);
            agg.agg_values(cx, a, b)
        }
        Token::Binary(op @ (BinaryOp::Intersect | BinaryOp::Range)) => {
            let refs = reference_op(list, *op, cx)?;
            agg_list(agg, cx, &refs)
        }
        Token::Binary(op) => {
            let inner = operand_agg(agg);
            let b = list.evaluate_token(cx, inner);
            let a = list.evaluate_token(cx, inner);
            let dates_1904 = cx.dates_1904();
            Ok(broadcast(&[a, b], |v| binary(*op, &v[0], &v[1], dates_1904)))
        }
        Token::Paren => Ok(list.evaluate_token(cx, agg)),

        Token::Ref(_) | Token::Area(..) | Token::Ref3d { .. } | Token::Area3d { .. } => {
            let range = resolve_reference(token, cx)?;
            agg.agg(cx, &range)
        }
        Token::RefErr | Token::AreaErr => Ok(Value::Error(ErrorValue::Ref)),

        Token::Name(index) => evaluate_name(cx, *index, agg),

        Token::Func { id, argc } => {
            let call = function_call(list, cx, agg, *id, *argc)?;
            (call.def.implementation)(&call)
        }
        Token::Udf { name, argc } => {
            let mut args = Vec::with_capacity(*argc);
            for _ in 0..*argc {
                args.push(list.evaluate_token(cx, &UDF));
            }
            args.reverse();
            let book = cx.book();
            if !book.is_defined_function(name.as_str()) {
                book.add_unsupported(UnsupportedKind::UserDefinedFunction, name.as_str());
                return Ok(Value::Error(ErrorValue::Name));
            }
            Ok(book.evaluate_user_defined_function(name.as_str(), *cx, &args))
        }

        Token::AttrIf(_) | Token::AttrGoto(_) | Token::AttrChoose(_) => {
            Ok(list.evaluate_token(cx, agg))
        }
        Token::Table => crate::functions::what_if::evaluate_table(cx),
    }
}

/// Evaluate a popped token as a reference
pub(crate) fn evaluate_ref(
    list: &TokenList,
    token: &Token,
    cx: &EvalContext<'_>,
) -> FormulaResult<AddressList> {
    match token {
        Token::Ref(_) | Token::Area(..) | Token::Ref3d { .. } | Token::Area3d { .. } => {
            Ok(AddressList::single(resolve_reference(token, cx)?))
        }
        Token::RefErr | Token::AreaErr => Err(ErrorValue::Ref.into()),
        Token::Binary(op) if op.is_reference_op() => reference_op(list, *op, cx),
        Token::Paren => Ok(list.evaluate_ref_token(cx)?),
        Token::Name(index) => evaluate_name_ref(cx, *index),
        Token::Func { id, argc } => {
            let call = function_call(list, cx, &ERR2, *id, *argc)?;
            match call.def.reference {
                Some(reference) => reference(&call),
                None => Err(ErrorValue::Value.into()),
            }
        }
        Token::Error(e) => Err((*e).into()),
        _ => Err(ErrorValue::Value.into()),
    }
}

/// Operands of operators keep array aggregation, everything else is scalar
fn operand_agg(agg: &dyn Aggregate) -> &dyn Aggregate {
    if agg.propagate_on_equality() {
        agg
    } else {
        &ERR2
    }
}

fn function_call<'a>(
    list: &'a TokenList,
    cx: &'a EvalContext<'a>,
    agg: &'a dyn Aggregate,
    id: usize,
    argc: usize,
) -> FormulaResult<FnCall<'a>> {
    let def = registry()
        .by_id(id)
        .ok_or_else(|| FormulaError::UnknownFunction(format!("#{}", id)))?;
    if argc < def.min_args || def.max_args.map_or(false, |max| argc > max) {
        return Err(FormulaError::ArgumentCount {
            function: def.name.to_string(),
            expected: match def.max_args {
                Some(max) if max == def.min_args => max.to_string(),
                Some(max) => format!("{}..{}", def.min_args, max),
                None => format!("{}+", def.min_args),
            },
            actual: argc,
        });
    }
    Ok(FnCall {
        list,
        cx: *cx,
        argc,
        agg,
        def,
    })
}

/// Resolve a cell or area token against the context's host cell
pub(crate) fn resolve_reference(token: &Token, cx: &EvalContext<'_>) -> FormulaResult<AddressRange> {
    let info = &cx.info;
    let plane = |sheet_first: usize, sheet_last: usize, book: Option<Arc<str>>, a: &CellRef, b: &CellRef| {
        let (r1, c1) = a.resolve(info);
        let (r2, c2) = b.resolve(info);
        AddressRange::new(
            Address::new(sheet_first, r1, c1).in_book(book.clone()),
            Address::new(sheet_last, r2, c2).in_book(book),
        )
    };
    let own_book = info.book_name.map(Arc::from);
    match token {
        Token::Ref(cell) => Ok(plane(info.sheet, info.sheet, own_book, cell, cell)),
        Token::Area(a, b) => Ok(plane(info.sheet, info.sheet, own_book, a, b)),
        Token::Ref3d { extern_index, cell } => {
            let (book, first, last) = extern_sheets(info, *extern_index)?;
            Ok(plane(first, last, book, cell, cell))
        }
        Token::Area3d {
            extern_index,
            first,
            last,
        } => {
            let (book, s1, s2) = extern_sheets(info, *extern_index)?;
            Ok(plane(s1, s2, book, first, last))
        }
        _ => Err(ErrorValue::Value.into()),
    }
}

fn extern_sheets(
    info: &WorkbookInfo<'_>,
    index: usize,
) -> FormulaResult<(Option<Arc<str>>, usize, usize)> {
    let entry = info
        .book
        .sheets_from_extern_sheet(index)
        .ok_or(ErrorValue::Ref)?;
    let (first, last) = entry.sheets()?;
    let book = entry.book.or_else(|| info.book_name.map(Arc::from));
    Ok((book, first, last))
}

/// `:`, `,` and space applied to the next two operands
fn reference_op(list: &TokenList, op: BinaryOp, cx: &EvalContext<'_>) -> FormulaResult<AddressList> {
    let b = list.evaluate_ref_token(cx)?;
    let a = list.evaluate_ref_token(cx)?;
    match op {
        BinaryOp::Union => {
            let mut out = a;
            out.extend(b);
            Ok(out)
        }
        BinaryOp::Intersect => {
            let out: AddressList = a
                .areas()
                .iter()
                .flat_map(|x| b.areas().iter().filter_map(move |y| intersect_ranges(x, y).ok()))
                .collect();
            if out.is_empty() {
                Err(ErrorValue::Null.into())
            } else {
                Ok(out)
            }
        }
        _ => {
            let mut areas = a.areas().iter().chain(b.areas().iter());
            let first = areas.next().ok_or(ErrorValue::Ref)?.clone();
            let bounds = areas.try_fold(first, |acc, r| expand_ranges(&acc, r))?;
            Ok(AddressList::single(bounds))
        }
    }
}

fn name_key(cx: &EvalContext<'_>, index: usize) -> (Option<Arc<str>>, usize) {
    (cx.info.book_name.map(Arc::from), index)
}

fn enter_name(cx: &EvalContext<'_>, index: usize) -> FormulaResult<crate::context::CalcState> {
    let key = name_key(cx, index);
    let state = cx.state;
    if state.names_in_progress.contains(&key)
        || state.names_in_progress.len() >= cx.info.options.max_name_depth
    {
        log::debug!(
            "circular name reference: name #{} at depth {}",
            index,
            state.names_in_progress.len()
        );
        return Err(FormulaError::CircularName(format!("#{}", index)));
    }
    let mut inner = state.clone();
    inner.names_in_progress.push(key);
    Ok(inner)
}

/// Context of the workbook that defines an external name, and the name's index there
fn external_name<'a>(
    cx: &EvalContext<'a>,
    book: &'a str,
    name: &str,
) -> FormulaResult<(EvalContext<'a>, usize)> {
    let Some(other) = cx.book().supporting_file(book) else {
        cx.book().add_unsupported(UnsupportedKind::ExternalName, name);
        return Err(ErrorValue::Ref.into());
    };
    let index = other.find_named_range(name, 0).ok_or(ErrorValue::Name)?;
    let info = WorkbookInfo {
        book: other,
        book_name: Some(book),
        dates_1904: other.options_dates_1904(),
        ..cx.info
    };
    Ok((EvalContext::new(info, cx.state, cx.stack), index))
}

fn evaluate_name(cx: &EvalContext<'_>, index: usize, agg: &dyn Aggregate) -> FormulaResult<Value> {
    match cx.book().named_range_data(index) {
        NamedRangeData::Tokens(tokens) => {
            let state = enter_name(cx, index)?;
            let inner = cx.with_state(&state);
            Ok(tokens.evaluate_all_with(&inner, agg))
        }
        NamedRangeData::External { book, name } => {
            let (ext, index) = external_name(cx, &book, &name)?;
            evaluate_name(&ext, index, agg)
        }
        NamedRangeData::Error(e) => Ok(Value::Error(e)),
    }
}

fn evaluate_name_ref(cx: &EvalContext<'_>, index: usize) -> FormulaResult<AddressList> {
    match cx.book().named_range_data(index) {
        NamedRangeData::Tokens(tokens) => {
            let state = enter_name(cx, index)?;
            let inner = cx.with_state(&state);
            Ok(tokens.evaluate_all_ref(&inner)?)
        }
        NamedRangeData::External { book, name } => {
            let (ext, index) = external_name(cx, &book, &name)?;
            evaluate_name_ref(&ext, index)
        }
        NamedRangeData::Error(e) => Err(e.into()),
    }
}

/// A unary operator on a scalar
pub(crate) fn unary(op: UnaryOp, v: &Value, dates_1904: bool) -> Value {
    if let Value::Error(e) = v {
        return Value::Error(*e);
    }
    match op {
        UnaryOp::Plus => match v {
            Value::Missing | Value::Empty => Value::Number(0.0),
            other => other.clone(),
        },
        UnaryOp::Neg => to_number(v, dates_1904).map(|x| -x).into(),
        UnaryOp::Percent => to_number(v, dates_1904).map(|x| x / 100.0).into(),
    }
}

/// A binary operator on two scalars. The left operand's error wins.
pub(crate) fn binary(op: BinaryOp, a: &Value, b: &Value, dates_1904: bool) -> Value {
    if let Value::Error(e) = a {
        return Value::Error(*e);
    }
    if let Value::Error(e) = b {
        return Value::Error(*e);
    }
    if op == BinaryOp::Concat {
        let mut s = to_text(a);
        s.push_str(&to_text(b));
        return Value::text(s);
    }
    if op.is_comparison() {
        let ord = compare_values(a, b);
        let result = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Ne => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        };
        return Value::Boolean(result);
    }
    arithmetic(op, a, b, dates_1904).into()
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value, dates_1904: bool) -> Calc<f64> {
    let x = to_number(a, dates_1904)?;
    let y = to_number(b, dates_1904)?;
    let r = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(ErrorValue::Div0);
            }
            x / y
        }
        BinaryOp::Pow => power(x, y)?,
        _ => return Err(ErrorValue::Value),
    };
    if r.is_finite() {
        Ok(r)
    } else {
        Err(ErrorValue::Num)
    }
}

/// `x^y` with the spreadsheet's domain rules
pub(crate) fn power(x: f64, y: f64) -> Calc<f64> {
    if x == 0.0 {
        if y == 0.0 {
            return Err(ErrorValue::Num);
        }
        if y < 0.0 {
            return Err(ErrorValue::Div0);
        }
    }
    if x < 0.0 && y.fract() != 0.0 {
        return Err(ErrorValue::Num);
    }
    let r = x.powf(y);
    if r.is_finite() {
        Ok(r)
    } else {
        Err(ErrorValue::Num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_scalars() {
        let n = |x: f64| Value::Number(x);
        assert_eq!(binary(BinaryOp::Add, &n(1.0), &Value::text("2"), false), n(3.0));
        assert_eq!(
            binary(BinaryOp::Div, &n(1.0), &n(0.0), false),
            Value::Error(ErrorValue::Div0)
        );
        assert_eq!(
            binary(BinaryOp::Add, &Value::Error(ErrorValue::Na), &Value::Error(ErrorValue::Div0), false),
            Value::Error(ErrorValue::Na)
        );
        assert_eq!(
            binary(BinaryOp::Concat, &n(1.5), &Value::Boolean(true), false),
            Value::text("1.5TRUE")
        );
        assert_eq!(
            binary(BinaryOp::Eq, &Value::text("abc"), &Value::text("ABC"), false),
            Value::Boolean(true)
        );
        assert_eq!(
            binary(BinaryOp::Lt, &n(100.0), &Value::text("a"), false),
            Value::Boolean(true)
        );
        assert_eq!(
            binary(BinaryOp::Add, &n(1.0), &Value::text("x"), false),
            Value::Error(ErrorValue::Value)
        );
    }

    #[test]
    fn test_power_domain() {
        assert_eq!(power(2.0, 10.0), Ok(1024.0));
        assert_eq!(power(0.0, 0.0), Err(ErrorValue::Num));
        assert_eq!(power(0.0, -1.0), Err(ErrorValue::Div0));
        assert_eq!(power(-4.0, 0.5), Err(ErrorValue::Num));
        assert_eq!(power(-2.0, 3.0), Ok(-8.0));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, &Value::Boolean(true), false), Value::Number(-1.0));
        assert_eq!(unary(UnaryOp::Percent, &Value::Number(50.0), false), Value::Number(0.5));
        assert_eq!(unary(UnaryOp::Plus, &Value::text("a"), false), Value::text("a"));
    }
}
