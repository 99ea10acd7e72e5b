//! Database functions: DSUM, DCOUNT, DAVERAGE and friends
//!
//! `database` and `criteria` are ranges whose first row holds column labels. Every
//! criteria row below the labels is one alternative (rows are OR-ed, the cells of a
//! row AND-ed). A label that names no database column makes its cells computed
//! criteria: the cell's formula is evaluated once per record, with the first record's
//! cells substituted by the record being tested.

use super::conditional::Grid;
use super::criteria::ValueCriteria;
use super::{FnCall, FunctionRegistry};
use crate::coerce::{text_to_number, to_boolean, to_text};
use crate::context::{EvalContext, WhatIfSubstitution};
use crate::error::{Calc, FormulaResult};
use crate::value::Value;
use gridcalc_core::ErrorValue;
use std::sync::Arc;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("DAVERAGE", 3, Some(3), fn_daverage);
    r.add("DCOUNT", 2, Some(3), fn_dcount);
    r.add("DCOUNTA", 2, Some(3), fn_dcounta);
    r.add("DGET", 3, Some(3), fn_dget);
    r.add("DMAX", 3, Some(3), fn_dmax);
    r.add("DMIN", 3, Some(3), fn_dmin);
    r.add("DPRODUCT", 3, Some(3), fn_dproduct);
    r.add("DSTDEV", 3, Some(3), fn_dstdev);
    r.add("DSTDEVP", 3, Some(3), fn_dstdevp);
    r.add("DSUM", 3, Some(3), fn_dsum);
    r.add("DVAR", 3, Some(3), fn_dvar);
    r.add("DVARP", 3, Some(3), fn_dvarp);
}

/// A condition on one column of a record
enum Test {
    Value(ValueCriteria),
    /// A computed criterion in the criteria cell at (sheet, row, col)
    Formula(usize, u32, u32),
    /// A computed criterion whose result does not depend on the record
    Fixed(bool),
}

struct Condition {
    column: u32,
    test: Test,
}

/// Column labels of the first grid row, lowercased
fn labels(cx: &EvalContext<'_>, grid: &Grid) -> FormulaResult<Vec<String>> {
    let (_, cols) = grid.dims();
    (0..cols)
        .map(|c| Ok(to_text(&grid.get(cx, 0, c)?).trim().to_lowercase()))
        .collect()
}

/// Text criteria in a criteria range match labels that start with them
fn prefix_criterion(v: &Value, dates_1904: bool) -> ValueCriteria {
    match v {
        Value::Text(s)
            if !s.is_empty()
                && !s.as_str().starts_with(['<', '>', '='])
                && !s.as_str().ends_with('*')
                && text_to_number(s.as_str(), dates_1904).is_none() =>
        {
            ValueCriteria::new(&Value::text(format!("{}*", s.as_str())), dates_1904)
        }
        other => ValueCriteria::new(other, dates_1904),
    }
}

/// Alternatives of the criteria range; an empty list accepts every record
fn read_criteria(
    cx: &EvalContext<'_>,
    criteria: &Grid,
    db_labels: &[String],
) -> FormulaResult<Calc<Vec<Vec<Condition>>>> {
    let (rows, cols) = criteria.dims();
    let headers = labels(cx, criteria)?;
    let mut alternatives = Vec::new();
    for r in 1..rows {
        let mut row = Vec::new();
        for c in 0..cols {
            let v = criteria.get(cx, r, c)?;
            if v.is_blank() {
                continue;
            }
            let column = db_labels.iter().position(|l| !l.is_empty() && *l == headers[c as usize]);
            match (column, criteria) {
                (Some(column), _) => row.push(Condition {
                    column: column as u32,
                    test: Test::Value(prefix_criterion(&v, cx.dates_1904())),
                }),
                (None, Grid::Area(range)) => row.push(Condition {
                    column: 0,
                    test: Test::Formula(range.first.sheet, range.first.row + r, range.first.col + c),
                }),
                (None, _) => row.push(Condition {
                    column: 0,
                    test: Test::Fixed(to_boolean(&v).unwrap_or(false)),
                }),
            }
        }
        alternatives.push(row);
    }
    Ok(Ok(alternatives))
}

/// Whether `record` (1-based data row of `db`) satisfies one condition
fn test_condition(
    cx: &EvalContext<'_>,
    db: &Grid,
    record: u32,
    condition: &Condition,
) -> FormulaResult<bool> {
    match &condition.test {
        Test::Fixed(b) => Ok(*b),
        Test::Value(criterion) => Ok(criterion.matches(&db.get(cx, record, condition.column)?)),
        Test::Formula(sheet, row, col) => {
            let value = match db {
                Grid::Area(range) if record > 1 => {
                    let mut what_if = cx.state.what_if.as_deref().cloned().unwrap_or_default();
                    substitute_record(cx, db, range.first.sheet, range.first.row, record, &mut what_if)?;
                    let mut state = cx.state.clone();
                    state.what_if = Some(Arc::new(what_if));
                    cx.with_state(&state).read_cell(*sheet, *row, *col)
                }
                _ => cx.read_cell(*sheet, *row, *col),
            };
            Ok(matches!(value, Value::Boolean(true))
                || matches!(value, Value::Number(n) if n != 0.0))
        }
    }
}

/// Substitute the cells of the first record by those of `record`
fn substitute_record(
    cx: &EvalContext<'_>,
    db: &Grid,
    sheet: usize,
    header_row: u32,
    record: u32,
    what_if: &mut WhatIfSubstitution,
) -> FormulaResult<()> {
    let Grid::Area(range) = db else {
        return Ok(());
    };
    for c in 0..db.dims().1 {
        what_if.set(sheet, header_row + 1, range.first.col + c, db.get(cx, record, c)?);
    }
    Ok(())
}

fn record_matches(
    cx: &EvalContext<'_>,
    db: &Grid,
    record: u32,
    alternatives: &[Vec<Condition>],
) -> FormulaResult<bool> {
    if alternatives.is_empty() {
        return Ok(true);
    }
    for conditions in alternatives {
        let mut all = true;
        for condition in conditions {
            if !test_condition(cx, db, record, condition)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Field argument as a zero-based column; `None` when omitted
fn field_column(field: &Value, db_labels: &[String]) -> Calc<Option<u32>> {
    match field {
        Value::Missing => Ok(None),
        Value::Error(e) => Err(*e),
        Value::Number(n) => {
            let n = n.trunc();
            if n < 1.0 || n > db_labels.len() as f64 {
                Err(ErrorValue::Value)
            } else {
                Ok(Some(n as u32 - 1))
            }
        }
        Value::Text(s) => {
            let label = s.as_str().trim().to_lowercase();
            db_labels
                .iter()
                .position(|l| *l == label)
                .map(|i| Some(i as u32))
                .ok_or(ErrorValue::Value)
        }
        Value::Array(a) => field_column(a.first(), db_labels),
        _ => Err(ErrorValue::Value),
    }
}

/// Field values of the matching records, or the matching record count when the
/// field is omitted
struct Selection {
    values: Vec<Value>,
    records: usize,
    /// No field was given, so only whole records were counted
    no_field: bool,
}

fn select(call: &FnCall<'_>) -> FormulaResult<Calc<Selection>> {
    let mut args = call.range_args(&[0, 2]).into_iter();
    let db = args.next().map(Grid::from_arg);
    let field = args.next().map(|a| a.value()).unwrap_or(Value::Missing);
    let criteria = args.next().map_or(Err(ErrorValue::Value), Grid::from_arg);
    let (db, criteria) = match (db, criteria) {
        (Some(Ok(db)), Ok(criteria)) => (db, criteria),
        (Some(Err(e)), _) | (_, Err(e)) => return Ok(Err(e)),
        (None, _) => return Ok(Err(ErrorValue::Value)),
    };
    let cx = &call.cx;
    let db_labels = labels(cx, &db)?;
    let column = match field_column(&field, &db_labels) {
        Ok(c) => c,
        Err(e) => return Ok(Err(e)),
    };
    let alternatives = match read_criteria(cx, &criteria, &db_labels)? {
        Ok(a) => a,
        Err(e) => return Ok(Err(e)),
    };
    let mut selection = Selection {
        values: Vec::new(),
        records: 0,
        no_field: column.is_none(),
    };
    for record in 1..db.dims().0 {
        cx.check_aborted()?;
        if record_matches(cx, &db, record, &alternatives)? {
            selection.records += 1;
            if let Some(c) = column {
                selection.values.push(db.get(cx, record, c)?);
            }
        }
    }
    Ok(Ok(selection))
}

fn numbers(values: &[Value]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => Some(*n),
            _ => None,
        })
        .collect()
}

fn with_numbers(call: &FnCall<'_>, f: impl FnOnce(Vec<f64>) -> Calc<f64>) -> FormulaResult<Value> {
    Ok(select(call)?.and_then(|s| f(numbers(&s.values))).into())
}

fn variance(xs: &[f64], sample: bool) -> Calc<f64> {
    let n = xs.len() as f64;
    let denominator = if sample { n - 1.0 } else { n };
    if denominator <= 0.0 {
        return Err(ErrorValue::Div0);
    }
    let mean = xs.iter().sum::<f64>() / n;
    Ok(xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / denominator)
}

/// DSUM(database, field, criteria)
pub fn fn_dsum(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| Ok(xs.iter().sum()))
}

/// DAVERAGE(database, field, criteria)
pub fn fn_daverage(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| {
        if xs.is_empty() {
            Err(ErrorValue::Div0)
        } else {
            Ok(xs.iter().sum::<f64>() / xs.len() as f64)
        }
    })
}

/// DPRODUCT(database, field, criteria)
pub fn fn_dproduct(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| Ok(xs.iter().product()))
}

/// DMAX(database, field, criteria) - 0 when nothing matches
pub fn fn_dmax(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| Ok(xs.into_iter().reduce(f64::max).unwrap_or(0.0)))
}

/// DMIN(database, field, criteria) - 0 when nothing matches
pub fn fn_dmin(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| Ok(xs.into_iter().reduce(f64::min).unwrap_or(0.0)))
}

/// DVAR(database, field, criteria)
pub fn fn_dvar(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| variance(&xs, true))
}

/// DVARP(database, field, criteria)
pub fn fn_dvarp(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| variance(&xs, false))
}

/// DSTDEV(database, field, criteria)
pub fn fn_dstdev(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| variance(&xs, true).map(f64::sqrt))
}

/// DSTDEVP(database, field, criteria)
pub fn fn_dstdevp(call: &FnCall<'_>) -> FormulaResult<Value> {
    with_numbers(call, |xs| variance(&xs, false).map(f64::sqrt))
}

/// DCOUNT(database, [field], criteria) - Numbers in the field, or matching records
pub fn fn_dcount(call: &FnCall<'_>) -> FormulaResult<Value> {
    let omitted = call.argc == 2;
    Ok(select_counting(call, omitted)?
        .map(|s| {
            if s.no_field {
                s.records as f64
            } else {
                numbers(&s.values).len() as f64
            }
        })
        .into())
}

/// DCOUNTA(database, [field], criteria) - Non-blank values in the field
pub fn fn_dcounta(call: &FnCall<'_>) -> FormulaResult<Value> {
    let omitted = call.argc == 2;
    Ok(select_counting(call, omitted)?
        .map(|s| {
            if s.no_field {
                s.records as f64
            } else {
                s.values.iter().filter(|v| !v.is_blank()).count() as f64
            }
        })
        .into())
}

/// DCOUNT/DCOUNTA accept `(database, criteria)`; reading the second argument as the
/// criteria keeps [`select`] to one shape
fn select_counting(call: &FnCall<'_>, omitted: bool) -> FormulaResult<Calc<Selection>> {
    if !omitted {
        return select(call);
    }
    let mut args = call.range_args(&[0, 1]).into_iter();
    let (Some(db), Some(criteria)) = (args.next(), args.next()) else {
        return Ok(Err(ErrorValue::Value));
    };
    let (db, criteria) = match (Grid::from_arg(db), Grid::from_arg(criteria)) {
        (Ok(db), Ok(criteria)) => (db, criteria),
        (Err(e), _) | (_, Err(e)) => return Ok(Err(e)),
    };
    let cx = &call.cx;
    let db_labels = labels(cx, &db)?;
    let alternatives = match read_criteria(cx, &criteria, &db_labels)? {
        Ok(a) => a,
        Err(e) => return Ok(Err(e)),
    };
    let mut records = 0;
    for record in 1..db.dims().0 {
        cx.check_aborted()?;
        if record_matches(cx, &db, record, &alternatives)? {
            records += 1;
        }
    }
    Ok(Ok(Selection {
        values: Vec::new(),
        records,
        no_field: true,
    }))
}

/// DGET(database, field, criteria) - The single matching value
pub fn fn_dget(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(match select(call)? {
        Err(e) => Value::Error(e),
        Ok(s) => match s.values.len() {
            0 => Value::Error(ErrorValue::Value),
            1 => s.values.into_iter().next().unwrap_or(Value::Error(ErrorValue::Value)),
            _ => Value::Error(ErrorValue::Num),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_approx, eval_in, sheet_from, TestBook};
    use gridcalc_core::CellValue;

    /// A1:D7 orchard data, criteria blocks from F1
    fn orchard() -> TestBook {
        let t = |s: &str| CellValue::string(s);
        let n = CellValue::Number;
        sheet_from(&[
            ("A1", t("Tree")),
            ("B1", t("Height")),
            ("C1", t("Age")),
            ("D1", t("Profit")),
            ("A2", t("Apple")),
            ("B2", n(18.0)),
            ("C2", n(20.0)),
            ("D2", n(105.0)),
            ("A3", t("Pear")),
            ("B3", n(12.0)),
            ("C3", n(12.0)),
            ("D3", n(96.0)),
            ("A4", t("Cherry")),
            ("B4", n(13.0)),
            ("C4", n(14.0)),
            ("D4", n(105.0)),
            ("A5", t("Apple")),
            ("B5", n(14.0)),
            ("C5", n(15.0)),
            ("D5", n(75.0)),
            ("A6", t("Pear")),
            ("B6", n(9.0)),
            ("C6", n(8.0)),
            ("D6", n(76.8)),
            ("A7", t("Apple")),
            ("B7", n(8.0)),
            ("C7", n(9.0)),
            ("D7", n(45.0)),
            // Tree = Apple AND Height > 10, OR Tree = Pear
            ("F1", t("Tree")),
            ("G1", t("Height")),
            ("F2", t("=Apple")),
            ("G2", t(">10")),
            ("F3", t("=Pear")),
            // Height > 10 only
            ("I1", t("Height")),
            ("I2", t(">10")),
            // Prefix match on Tree
            ("K1", t("Tree")),
            ("K2", t("Ch")),
        ])
    }

    #[test]
    fn test_alternatives() {
        let book = orchard();
        assert_approx(eval_in(&book, "=DSUM(A1:D7,\"Profit\",F1:G3)"), 352.8);
        assert_eq!(eval_in(&book, "=DCOUNT(A1:D7,\"Age\",F1:G3)"), Value::Number(4.0));
        assert_eq!(eval_in(&book, "=DMAX(A1:D7,4,F1:G3)"), Value::Number(105.0));
        assert_eq!(eval_in(&book, "=DMIN(A1:D7,\"profit\",F1:G3)"), Value::Number(75.0));
        assert_approx(eval_in(&book, "=DAVERAGE(A1:D7,\"Profit\",F1:G3)"), 88.2);
    }

    #[test]
    fn test_single_condition() {
        let book = orchard();
        assert_eq!(eval_in(&book, "=DSUM(A1:D7,\"Profit\",I1:I2)"), Value::Number(381.0));
        assert_eq!(eval_in(&book, "=DSUM(A1:D7,\" PROFIT \",I1:I2)"), Value::Number(381.0));
        assert_eq!(eval_in(&book, "=DPRODUCT(A1:D7,\"Age\",I1:I2)"), Value::Number(50400.0));
        assert_eq!(eval_in(&book, "=DCOUNTA(A1:D7,\"Tree\",I1:I2)"), Value::Number(4.0));
        assert_eq!(eval_in(&book, "=DCOUNT(A1:D7,I1:I2)"), Value::Number(4.0));
        assert_eq!(eval_in(&book, "=DCOUNT(A1:D7,,I1:I2)"), Value::Number(4.0));
        assert_eq!(eval_in(&book, "=DCOUNTA(A1:D7,,I1:I2)"), Value::Number(4.0));
        assert_approx(eval_in(&book, "=DVARP(A1:D7,\"Height\",I1:I2)"), 5.1875);
        assert_approx(eval_in(&book, "=DSTDEV(A1:D7,\"Height\",I1:I2)"), (20.75f64 / 3.0).sqrt());
    }

    #[test]
    fn test_dget() {
        let book = orchard();
        assert_eq!(eval_in(&book, "=DGET(A1:D7,\"Age\",K1:K2)"), Value::Number(14.0));
        assert_eq!(eval_in(&book, "=DGET(A1:D7,\"Age\",F1:G3)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval_in(&book, "=DGET(A1:D7,\"Age\",F1:F1)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_bad_field() {
        let book = orchard();
        assert_eq!(eval_in(&book, "=DSUM(A1:D7,\"Weight\",I1:I2)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval_in(&book, "=DSUM(A1:D7,5,I1:I2)"), Value::Error(ErrorValue::Value));
    }

    #[test]
    fn test_computed_criterion() {
        let mut book = orchard();
        book.worksheet_mut(0)
            .expect("sheet")
            .set_cell_value("M1", CellValue::string("Rich"))
            .expect("cell");
        book.worksheet_mut(0)
            .expect("sheet")
            .set_cell_formula("M2", "=D2>B2*6")
            .expect("cell");
        // profit above six times the height: both pears and the cherry
        assert_eq!(eval_in(&book, "=DCOUNT(A1:D7,\"Profit\",M1:M2)"), Value::Number(3.0));
    }
}
