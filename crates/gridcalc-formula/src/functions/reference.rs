//! Reference-building functions: OFFSET and INDIRECT
//!
//! Both compute a reference first. Used as a value, the reference is reduced with
//! the caller's aggregate like any range token.

use super::args::{boolean_or, number_or, text};
use super::{FnCall, FunctionRegistry, RangeArg};
use crate::address::{Address, AddressList, AddressRange};
use crate::aggregate::agg_list;
use crate::book::UnsupportedKind;
use crate::context::EvalContext;
use crate::error::{Calc, FormulaResult};
use crate::token::Token;
use crate::token_list::TokenList;
use crate::value::Value;
use gridcalc_core::{CellAddress, ErrorValue, SheetLimits};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add_reference("OFFSET", 3, Some(5), fn_offset, ref_offset, true);
    r.add_reference("INDIRECT", 1, Some(2), fn_indirect, ref_indirect, true);
}

/// OFFSET(reference, rows, cols, [height], [width])
pub fn fn_offset(call: &FnCall<'_>) -> FormulaResult<Value> {
    match offset(call) {
        Ok(list) => agg_list(call.agg, &call.cx, &list),
        Err(e) => Ok(Value::Error(e)),
    }
}

pub fn ref_offset(call: &FnCall<'_>) -> FormulaResult<AddressList> {
    Ok(offset(call)?)
}

fn offset(call: &FnCall<'_>) -> Calc<AddressList> {
    let args = call.range_args(&[0]);
    let d = call.dates_1904();
    let base = match &args[0] {
        RangeArg::Ref(list) => list.single_area()?.ordered(),
        RangeArg::Value(Value::Error(e)) => return Err(*e),
        RangeArg::Value(_) => return Err(ErrorValue::Value),
    };
    let arg = |i: usize, default: f64| -> Calc<f64> {
        match args.get(i) {
            Some(a) => Ok(number_or(&a.value(), default, d)?.trunc()),
            None => Ok(default),
        }
    };
    let rows = arg(1, 0.0)? as i64;
    let cols = arg(2, 0.0)? as i64;
    let height = arg(3, base.row_count() as f64)? as i64;
    let width = arg(4, base.col_count() as f64)? as i64;
    if height == 0 || width == 0 {
        return Err(ErrorValue::Ref);
    }

    let limits = call.cx.info.options.limits;
    let top = base.first.row as i64 + rows;
    let left = base.first.col as i64 + cols;
    // a negative height or width extends up or left from the moved corner
    let (r1, r2) = span(top, height);
    let (c1, c2) = span(left, width);
    if r1 < 1 || c1 < 1 || r2 > limits.max_rows as i64 || c2 > limits.max_cols as i64 {
        return Err(ErrorValue::Ref);
    }
    let corner = |row: i64, col: i64| Address {
        row: row as u32,
        col: col as u32,
        ..base.first.clone()
    };
    Ok(AddressList::single(AddressRange::new(corner(r1, c1), corner(r2, c2))))
}

fn span(start: i64, len: i64) -> (i64, i64) {
    if len > 0 {
        (start, start + len - 1)
    } else {
        (start + len + 1, start)
    }
}

/// INDIRECT(ref_text, [a1])
pub fn fn_indirect(call: &FnCall<'_>) -> FormulaResult<Value> {
    match indirect(call) {
        Ok(list) => agg_list(call.agg, &call.cx, &list),
        Err(e) => Ok(Value::Error(e)),
    }
}

pub fn ref_indirect(call: &FnCall<'_>) -> FormulaResult<AddressList> {
    Ok(indirect(call)?)
}

fn indirect(call: &FnCall<'_>) -> Calc<AddressList> {
    let args = call.values();
    let reference = text(&args[0])?;
    let a1 = boolean_or(args.get(1), true)?;
    resolve_text(&call.cx, reference.trim(), a1)
}

static QUALIFIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:'((?:[^']|'')+)'|((?:\[[^\]]+\])?[^!':\[\]]+))!(.+)$").expect("sheet pattern")
});

static BOOK_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\](.+)$").expect("book pattern"));

static A1_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?[A-Za-z]{1,3}\$?\d+$").expect("A1 pattern"));

static A1_COLUMNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?([A-Za-z]{1,3}):\$?([A-Za-z]{1,3})$").expect("column pattern"));

static A1_ROWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?(\d+):\$?(\d+)$").expect("row pattern"));

static R1C1_CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[Rr](\[-?\d+\]|\d+)?[Cc](\[-?\d+\]|\d+)?$").expect("R1C1 pattern")
});

/// Workbook and sheet a reference text points into
struct Target {
    book: Option<Arc<str>>,
    sheet: usize,
}

/// Resolve an INDIRECT text: `A1`, `A1:B2`, `A:B`, `1:3`, R1C1 forms, each optionally
/// qualified by `Sheet!`, `'My Sheet'!` or `[Book]Sheet!`, or a defined name
pub(crate) fn resolve_text(cx: &EvalContext<'_>, reference: &str, a1: bool) -> Calc<AddressList> {
    if reference.is_empty() {
        return Err(ErrorValue::Ref);
    }
    let (target, body) = match QUALIFIED.captures(reference) {
        Some(caps) => {
            let sheet_text = match (caps.get(1), caps.get(2)) {
                (Some(quoted), _) => quoted.as_str().replace("''", "'"),
                (_, Some(plain)) => plain.as_str().to_string(),
                _ => return Err(ErrorValue::Ref),
            };
            let body = caps.get(3).map_or("", |m| m.as_str());
            (qualified_target(cx, &sheet_text)?, body)
        }
        None => (
            Target {
                book: cx.info.book_name.map(Arc::from),
                sheet: cx.info.sheet,
            },
            reference,
        ),
    };

    let limits = cx.info.options.limits;
    let host = (cx.info.row, cx.info.col);
    let parts: Vec<&str> = body.split(':').collect();
    let corners = match parts.as_slice() {
        [one] => cell(one, a1, host, limits).map(|c| (c, c)),
        [a, b] => match (cell(a, a1, host, limits), cell(b, a1, host, limits)) {
            (Some(x), Some(y)) => Some((x, y)),
            _ if a1 => whole_lines(body, limits),
            _ => None,
        },
        _ => None,
    };
    match corners {
        Some(((r1, c1), (r2, c2))) => {
            let at = |row: u32, col: u32| Address::new(target.sheet, row, col).in_book(target.book.clone());
            Ok(AddressList::single(AddressRange::new(at(r1, c1), at(r2, c2))))
        }
        None if parts.len() == 1 => defined_name(cx, target.sheet, body),
        None => Err(ErrorValue::Ref),
    }
}

fn qualified_target(cx: &EvalContext<'_>, sheet_text: &str) -> Calc<Target> {
    let (book_name, sheet_name) = match BOOK_PREFIX.captures(sheet_text) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map_or("", |m| m.as_str()).to_string(),
        ),
        None => (None, sheet_text.to_string()),
    };
    match book_name {
        Some(name) if cx.info.book_name != Some(name.as_str()) => {
            let Some(book) = cx.book().supporting_file(&name) else {
                cx.book().add_unsupported(UnsupportedKind::ExternalReference, &name);
                return Err(ErrorValue::Ref);
            };
            let sheet = book.sheet_index(&sheet_name).ok_or(ErrorValue::Ref)?;
            Ok(Target {
                book: Some(Arc::from(name.as_str())),
                sheet,
            })
        }
        _ => {
            let sheet = cx.book().sheet_index(&sheet_name).ok_or(ErrorValue::Ref)?;
            Ok(Target {
                book: cx.info.book_name.map(Arc::from),
                sheet,
            })
        }
    }
}

/// One cell as 1-based (row, col)
fn cell(text: &str, a1: bool, host: (u32, u32), limits: SheetLimits) -> Option<(u32, u32)> {
    if a1 {
        if !A1_CELL.is_match(text) {
            return None;
        }
        let addr = CellAddress::parse_with_limits(text, limits).ok()?;
        return Some((addr.row + 1, addr.col as u32 + 1));
    }
    let caps = R1C1_CELL.captures(text)?;
    let row = r1c1_part(caps.get(1).map(|m| m.as_str()), host.0, limits.max_rows)?;
    let col = r1c1_part(caps.get(2).map(|m| m.as_str()), host.1, limits.max_cols)?;
    Some((row, col))
}

/// `5` is absolute, `[-2]` relative to the host, nothing is the host's own row or column
fn r1c1_part(part: Option<&str>, host: u32, max: u32) -> Option<u32> {
    let n = match part {
        None => host as i64,
        Some(p) => match p.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            Some(offset) => host as i64 + offset.parse::<i64>().ok()?,
            None => p.parse::<i64>().ok()?,
        },
    };
    (1..=max as i64).contains(&n).then_some(n as u32)
}

/// Whole columns `A:C` or whole rows `2:5`
fn whole_lines(text: &str, limits: SheetLimits) -> Option<((u32, u32), (u32, u32))> {
    if let Some(caps) = A1_COLUMNS.captures(text) {
        let col = |i: usize| {
            CellAddress::letters_to_column(caps.get(i)?.as_str())
                .ok()
                .map(|c| c as u32 + 1)
                .filter(|c| *c <= limits.max_cols)
        };
        let (a, b) = (col(1)?, col(2)?);
        return Some(((1, a.min(b)), (limits.max_rows, a.max(b))));
    }
    let caps = A1_ROWS.captures(text)?;
    let row = |i: usize| {
        caps.get(i)?
            .as_str()
            .parse::<u32>()
            .ok()
            .filter(|r| (1..=limits.max_rows).contains(r))
    };
    let (a, b) = (row(1)?, row(2)?);
    Some(((a.min(b), 1), (a.max(b), limits.max_cols)))
}

/// A name of the formula's own workbook, evaluated through a one-token formula so the
/// circular-name guard applies
fn defined_name(cx: &EvalContext<'_>, sheet: usize, name: &str) -> Calc<AddressList> {
    let index = cx
        .book()
        .find_named_range(name, sheet)
        .ok_or(ErrorValue::Ref)?;
    TokenList::new(vec![Token::Name(index)]).evaluate_all_ref(cx)
}
