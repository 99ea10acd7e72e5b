//! Lookup functions: VLOOKUP, HLOOKUP, MATCH, LOOKUP, INDEX and ADDRESS
//!
//! Sorted lookups use a binary search that tolerates mixed content. When the value
//! at the midpoint cannot be ordered against the lookup value (a blank, or text
//! against a number) the upper half is searched first and then the lower half.

use super::args::{boolean_or, number, number_or, text};
use super::conditional::Grid;
use super::criteria::wildcard_regex;
use super::{FnCall, FunctionRegistry, RangeArg};
use crate::address::{Address, AddressList, AddressRange};
use crate::aggregate::{agg_list, visit_range};
use crate::coerce::{compare_text, lookup_compare, unwrap_singleton};
use crate::context::EvalContext;
use crate::error::{Calc, FormulaResult};
use crate::value::{Array2D, Value};
use gridcalc_core::{CellAddress, ErrorValue};
use regex::Regex;
use std::cmp::Ordering;
use std::ops::ControlFlow;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("VLOOKUP", 3, Some(4), fn_vlookup);
    r.add("HLOOKUP", 3, Some(4), fn_hlookup);
    r.add("MATCH", 2, Some(3), fn_match);
    r.add("LOOKUP", 2, Some(3), fn_lookup);
    r.add_reference("INDEX", 2, Some(4), fn_index, ref_index, false);
    r.add("ADDRESS", 2, Some(5), fn_address);
}

/// What an exact lookup compares cells against
struct Needle {
    value: Value,
    pattern: Option<Regex>,
}

impl Needle {
    fn new(value: Value, wildcards: bool) -> Self {
        let value = match value {
            Value::Empty | Value::Missing => Value::Number(0.0),
            v => v,
        };
        let pattern = match &value {
            Value::Text(s) if wildcards => wildcard_regex(s.as_str()),
            _ => None,
        };
        Self { value, pattern }
    }

    fn matches(&self, v: &Value) -> bool {
        match (&self.value, v) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => match &self.pattern {
                Some(re) => re.is_match(b.as_str()),
                None => compare_text(a.as_str(), b.as_str()) == Ordering::Equal,
            },
            _ => false,
        }
    }
}

/// One row or column of a grid
struct Vector<'g> {
    grid: &'g Grid,
    /// Zero-based index of the row or column
    fixed: u32,
    /// Walks down a column when set, along a row otherwise
    down: bool,
}

impl<'g> Vector<'g> {
    fn column(grid: &'g Grid, col: u32) -> Self {
        Self {
            grid,
            fixed: col,
            down: true,
        }
    }

    fn row(grid: &'g Grid, row: u32) -> Self {
        Self {
            grid,
            fixed: row,
            down: false,
        }
    }

    /// Number of positions worth searching: a column stops at the sheet's last used row
    fn len(&self, cx: &EvalContext<'_>) -> FormulaResult<u32> {
        let (rows, cols) = self.grid.dims();
        if !self.down {
            return Ok(cols);
        }
        Ok(match self.grid {
            Grid::Area(range) => {
                let rcx = cx.for_range(range)?;
                let used = rcx.book().row_count(range.first.sheet);
                rows.min(used.saturating_sub(range.first.row - 1))
            }
            Grid::Array(_) => rows,
        })
    }

    fn get(&self, cx: &EvalContext<'_>, i: u32) -> FormulaResult<Value> {
        if self.down {
            self.grid.get(cx, i, self.fixed)
        } else {
            self.grid.get(cx, self.fixed, i)
        }
    }

    /// First position holding the needle
    fn find_exact(&self, cx: &EvalContext<'_>, needle: &Needle) -> FormulaResult<Option<u32>> {
        match self.grid {
            Grid::Area(range) => {
                let line = if self.down {
                    let col = range.first.col + self.fixed;
                    AddressRange::new(
                        Address { col, ..range.first.clone() },
                        Address { col, ..range.last.clone() },
                    )
                } else {
                    let row = range.first.row + self.fixed;
                    AddressRange::new(
                        Address { row, ..range.first.clone() },
                        Address { row, ..range.last.clone() },
                    )
                };
                let mut found = None;
                visit_range(cx, &line, |cell| {
                    if needle.matches(&cell.value) {
                        found = Some(if self.down {
                            cell.row - range.first.row
                        } else {
                            cell.col - range.first.col
                        });
                        return Ok(ControlFlow::Break(()));
                    }
                    Ok(ControlFlow::Continue(()))
                })?;
                Ok(found)
            }
            Grid::Array(_) => {
                for i in 0..self.len(cx)? {
                    if needle.matches(&self.get(cx, i)?) {
                        return Ok(Some(i));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Last position whose value is at most the target (at least, when descending)
    fn find_sorted(
        &self,
        cx: &EvalContext<'_>,
        target: &Value,
        descending: bool,
    ) -> FormulaResult<Option<u32>> {
        let target = match target {
            Value::Empty | Value::Missing => Value::Number(0.0),
            v => v.clone(),
        };
        let len = self.len(cx)?;
        self.search(cx, &target, descending, 0, len)
    }

    fn search(
        &self,
        cx: &EvalContext<'_>,
        target: &Value,
        descending: bool,
        lo: u32,
        hi: u32,
    ) -> FormulaResult<Option<u32>> {
        if lo >= hi {
            return Ok(None);
        }
        let mid = lo + (hi - lo) / 2;
        let v = self.get(cx, mid)?;
        match lookup_compare(&v, target) {
            Some(ord) => {
                let fits = if descending {
                    ord != Ordering::Less
                } else {
                    ord != Ordering::Greater
                };
                if fits {
                    Ok(self.search(cx, target, descending, mid + 1, hi)?.or(Some(mid)))
                } else {
                    self.search(cx, target, descending, lo, mid)
                }
            }
            None => match self.search(cx, target, descending, mid + 1, hi)? {
                Some(i) => Ok(Some(i)),
                None => self.search(cx, target, descending, lo, mid),
            },
        }
    }
}

/// A lookup result read from a cell: blanks read as 0
fn cell_result(v: Value) -> Value {
    match v {
        Value::Empty => Value::Number(0.0),
        v => v,
    }
}

/// The lookup value: a scalar, errors propagate
fn lookup_value(v: Value) -> Calc<Value> {
    match unwrap_singleton(v) {
        Value::Error(e) => Err(e),
        Value::Array(a) => match a.first() {
            Value::Error(e) => Err(*e),
            first => Ok(first.clone()),
        },
        v => Ok(v),
    }
}

fn table_lookup(call: &FnCall<'_>, vertical: bool) -> FormulaResult<Value> {
    let mut args = call.range_args(&[1]).into_iter();
    let (Some(needle), Some(table), Some(index)) = (args.next(), args.next(), args.next()) else {
        return Ok(Value::Error(ErrorValue::Value));
    };
    let approximate = args.next().map(|a| a.value());
    let d = call.dates_1904();

    let needle = lookup_value(needle.value())?;
    let grid = Grid::from_arg(table)?;
    let index = number(&index.value(), d)?.trunc();
    let approximate = boolean_or(approximate.as_ref(), true)?;

    let (rows, cols) = grid.dims();
    let extent = if vertical { cols } else { rows };
    if index < 1.0 {
        return Ok(Value::Error(ErrorValue::Value));
    }
    if index > extent as f64 {
        return Ok(Value::Error(ErrorValue::Ref));
    }
    let index = index as u32 - 1;

    let keys = if vertical {
        Vector::column(&grid, 0)
    } else {
        Vector::row(&grid, 0)
    };
    let found = if approximate {
        keys.find_sorted(&call.cx, &needle, false)?
    } else {
        keys.find_exact(&call.cx, &Needle::new(needle, true))?
    };
    let Some(i) = found else {
        return Ok(Value::Error(ErrorValue::Na));
    };
    let v = if vertical {
        grid.get(&call.cx, i, index)?
    } else {
        grid.get(&call.cx, index, i)?
    };
    Ok(cell_result(v))
}

/// VLOOKUP(lookup_value, table_array, col_index_num, [range_lookup])
pub fn fn_vlookup(call: &FnCall<'_>) -> FormulaResult<Value> {
    table_lookup(call, true)
}

/// HLOOKUP(lookup_value, table_array, row_index_num, [range_lookup])
pub fn fn_hlookup(call: &FnCall<'_>) -> FormulaResult<Value> {
    table_lookup(call, false)
}

/// The vector of a one-row or one-column grid
fn vector_of(grid: &Grid) -> Option<Vector<'_>> {
    match grid.dims() {
        (1, _) => Some(Vector::row(grid, 0)),
        (_, 1) => Some(Vector::column(grid, 0)),
        _ => None,
    }
}

/// MATCH(lookup_value, lookup_array, [match_type])
pub fn fn_match(call: &FnCall<'_>) -> FormulaResult<Value> {
    let mut args = call.range_args(&[1]).into_iter();
    let (Some(needle), Some(haystack)) = (args.next(), args.next()) else {
        return Ok(Value::Error(ErrorValue::Value));
    };
    let match_type = match args.next() {
        Some(a) => number_or(&a.value(), 1.0, call.dates_1904())?,
        None => 1.0,
    };
    let needle = lookup_value(needle.value())?;
    let grid = Grid::from_arg(haystack)?;
    let Some(vector) = vector_of(&grid) else {
        return Ok(Value::Error(ErrorValue::Na));
    };
    let found = if match_type == 0.0 {
        vector.find_exact(&call.cx, &Needle::new(needle, true))?
    } else {
        vector.find_sorted(&call.cx, &needle, match_type < 0.0)?
    };
    Ok(match found {
        Some(i) => Value::Number(i as f64 + 1.0),
        None => Value::Error(ErrorValue::Na),
    })
}

/// LOOKUP(lookup_value, lookup_vector, [result_vector]) or LOOKUP(lookup_value, array)
pub fn fn_lookup(call: &FnCall<'_>) -> FormulaResult<Value> {
    let mut args = call.range_args(&[1, 2]).into_iter();
    let (Some(needle), Some(first)) = (args.next(), args.next()) else {
        return Ok(Value::Error(ErrorValue::Value));
    };
    let needle = lookup_value(needle.value())?;
    let grid = Grid::from_arg(first)?;
    let (rows, cols) = grid.dims();

    if let Some(result) = args.next() {
        let result = Grid::from_arg(result)?;
        let keys = vector_of(&grid).ok_or(ErrorValue::Na)?;
        let values = vector_of(&result).ok_or(ErrorValue::Na)?;
        return Ok(match keys.find_sorted(&call.cx, &needle, false)? {
            Some(i) if i < result_extent(&result) => cell_result(values.get(&call.cx, i)?),
            Some(_) => Value::Error(ErrorValue::Ref),
            None => Value::Error(ErrorValue::Na),
        });
    }

    // array form: search the first row of a wide array, the first column otherwise
    let (keys, last) = if rows >= cols {
        (Vector::column(&grid, 0), cols - 1)
    } else {
        (Vector::row(&grid, 0), rows - 1)
    };
    let Some(i) = keys.find_sorted(&call.cx, &needle, false)? else {
        return Ok(Value::Error(ErrorValue::Na));
    };
    let v = if rows >= cols {
        grid.get(&call.cx, i, last)?
    } else {
        grid.get(&call.cx, last, i)?
    };
    Ok(cell_result(v))
}

fn result_extent(grid: &Grid) -> u32 {
    let (rows, cols) = grid.dims();
    rows.max(cols)
}

/// Row, column and area numbers of an INDEX call; 0 selects the whole row or column
struct IndexArgs {
    row: u32,
    col: u32,
    area: usize,
}

fn index_args(args: &[RangeArg], d: bool) -> Calc<IndexArgs> {
    let n = |i: usize, default: f64| -> Calc<f64> {
        match args.get(i) {
            Some(a) => {
                let x = number_or(&a.value(), default, d)?.trunc();
                if x < 0.0 {
                    Err(ErrorValue::Value)
                } else {
                    Ok(x)
                }
            }
            None => Ok(default),
        }
    };
    Ok(IndexArgs {
        row: n(1, 0.0)? as u32,
        col: n(2, 0.0)? as u32,
        area: n(3, 1.0)? as usize,
    })
}

/// Zero-based bounds `(first, last)` of the selection along one axis
fn select(n: u32, extent: u32) -> Calc<(u32, u32)> {
    match n {
        0 => Ok((0, extent - 1)),
        n if n <= extent => Ok((n - 1, n - 1)),
        _ => Err(ErrorValue::Ref),
    }
}

/// The block INDEX selects from a reference
fn index_reference(call: &FnCall<'_>, args: &[RangeArg], list: &AddressList) -> Calc<AddressList> {
    let ix = index_args(args, call.dates_1904())?;
    if ix.area < 1 {
        return Err(ErrorValue::Value);
    }
    let area = list.areas().get(ix.area - 1).ok_or(ErrorValue::Ref)?.ordered();
    let (rows, cols) = (area.row_count(), area.col_count());
    // a single row or column takes one index as the position along it
    let (row, col) = if args.len() == 2 && rows == 1 {
        (1, ix.row)
    } else {
        (ix.row, ix.col)
    };
    let (r1, r2) = select(row, rows)?;
    let (c1, c2) = select(col, cols)?;
    let corner = |r: u32, c: u32| Address {
        row: area.first.row + r,
        col: area.first.col + c,
        ..area.first.clone()
    };
    Ok(AddressList::single(AddressRange::new(corner(r1, c1), corner(r2, c2))))
}

fn index_array(args: &[RangeArg], array: Array2D, d: bool) -> Calc<Value> {
    let ix = index_args(args, d)?;
    if ix.area != 1 {
        return Err(ErrorValue::Ref);
    }
    let (rows, cols) = (array.rows() as u32, array.cols() as u32);
    let (row, col) = if args.len() == 2 && rows == 1 {
        (1, ix.row)
    } else if args.len() == 2 && cols == 1 {
        (ix.row, 1)
    } else {
        (ix.row, ix.col)
    };
    let (r1, r2) = select(row, rows)?;
    let (c1, c2) = select(col, cols)?;
    let mut out = Vec::with_capacity(((r2 - r1 + 1) * (c2 - c1 + 1)) as usize);
    for r in r1..=r2 {
        for c in c1..=c2 {
            out.push(array.get(r as usize, c as usize).cloned().unwrap_or(Value::Empty));
        }
    }
    let shaped = Array2D::from_vec((r2 - r1 + 1) as usize, (c2 - c1 + 1) as usize, out)
        .ok_or(ErrorValue::Value)?;
    Ok(unwrap_singleton(Value::Array(shaped)))
}

/// INDEX(array, row_num, [column_num], [area_num])
pub fn fn_index(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.range_args(&[0]);
    let d = call.dates_1904();
    match &args[0] {
        RangeArg::Ref(list) => match index_reference(call, &args, list) {
            Ok(selected) => Ok(cell_result(agg_list(call.agg, &call.cx, &selected)?)),
            Err(e) => Ok(Value::Error(e)),
        },
        RangeArg::Value(Value::Error(e)) => Ok(Value::Error(*e)),
        RangeArg::Value(v) => {
            let array = crate::coerce::as_array(v.clone());
            Ok(index_array(&args, array, d).unwrap_or_else(Value::Error))
        }
    }
}

/// INDEX evaluated as a reference: `SUM(INDEX(A1:C3,0,2))`
pub fn ref_index(call: &FnCall<'_>) -> FormulaResult<AddressList> {
    let args = call.range_args(&[0]);
    match &args[0] {
        RangeArg::Ref(list) => Ok(index_reference(call, &args, list)?),
        RangeArg::Value(Value::Error(e)) => Err((*e).into()),
        RangeArg::Value(_) => Err(ErrorValue::Value.into()),
    }
}

/// ADDRESS(row_num, column_num, [abs_num], [a1], [sheet_text])
pub fn fn_address(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.values();
    let d = call.dates_1904();
    let row = number(&args[0], d)?.trunc();
    let col = number(&args[1], d)?.trunc();
    let abs = match args.get(2) {
        Some(v) => number_or(v, 1.0, d)?.trunc(),
        None => 1.0,
    };
    let a1 = boolean_or(args.get(3), true)?;
    let sheet = match args.get(4) {
        Some(Value::Missing) | None => None,
        Some(v) => Some(text(v)?),
    };

    let limits = call.cx.info.options.limits;
    if !(1.0..=4.0).contains(&abs)
        || row < 1.0
        || col < 1.0
        || row > limits.max_rows as f64
        || col > limits.max_cols as f64
    {
        return Ok(Value::Error(ErrorValue::Value));
    }
    let (row, col, abs) = (row as u32, col as u32, abs as u8);
    let (row_abs, col_abs) = (abs == 1 || abs == 2, abs == 1 || abs == 3);

    let mut out = String::new();
    if let Some(sheet) = sheet {
        out.push_str(&quote_sheet(&sheet));
        out.push('!');
    }
    if a1 {
        if col_abs {
            out.push('$');
        }
        out.push_str(&CellAddress::column_to_letters((col - 1) as u16));
        if row_abs {
            out.push('$');
        }
        out.push_str(&row.to_string());
    } else {
        let part = |tag: char, n: u32, absolute: bool| {
            if absolute {
                format!("{}{}", tag, n)
            } else {
                format!("{}[{}]", tag, n)
            }
        };
        out.push_str(&part('R', row, row_abs));
        out.push_str(&part('C', col, col_abs));
    }
    Ok(Value::text(out))
}

/// Quote a sheet name when it holds anything but letters, digits and underscores
pub(crate) fn quote_sheet(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval, eval_array, eval_in, sheet_from, TestBook};
    use gridcalc_core::CellValue;
    use pretty_assertions::assert_eq;

    fn table() -> TestBook {
        sheet_from(&[
            ("A1", CellValue::Number(1.0)),
            ("B1", CellValue::string("a")),
            ("A2", CellValue::Number(2.0)),
            ("B2", CellValue::string("b")),
            ("A3", CellValue::Number(3.0)),
            ("B3", CellValue::string("c")),
        ])
    }

    #[test]
    fn test_vlookup() {
        let book = table();
        assert_eq!(eval_in(&book, "=VLOOKUP(2,A1:B3,2,TRUE)"), Value::text("b"));
        assert_eq!(eval_in(&book, "=VLOOKUP(2.5,A1:B3,2,TRUE)"), Value::text("b"));
        assert_eq!(eval_in(&book, "=VLOOKUP(4,A1:B3,2,FALSE)"), Value::Error(ErrorValue::Na));
        assert_eq!(eval_in(&book, "=VLOOKUP(0.5,A1:B3,2)"), Value::Error(ErrorValue::Na));
        assert_eq!(eval_in(&book, "=VLOOKUP(3,A1:B3,3)"), Value::Error(ErrorValue::Ref));
        assert_eq!(eval_in(&book, "=VLOOKUP(3,A1:B3,0)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval_in(&book, "=VLOOKUP(99,A:B,2)"), Value::text("c"));
    }

    #[test]
    fn test_vlookup_wildcards_and_arrays() {
        let book = sheet_from(&[
            ("A1", CellValue::string("apple")),
            ("B1", CellValue::Number(1.0)),
            ("A2", CellValue::string("banana")),
            ("B2", CellValue::Number(2.0)),
        ]);
        assert_eq!(eval_in(&book, "=VLOOKUP(\"BAN*\",A1:B2,2,FALSE)"), Value::Number(2.0));
        assert_eq!(eval_in(&book, "=VLOOKUP(\"apple\",A1:B2,2,FALSE)"), Value::Number(1.0));
        assert_eq!(eval("=VLOOKUP(2,{1,\"x\";2,\"y\"},2,FALSE)"), Value::text("y"));
        assert_eq!(eval("=HLOOKUP(\"b\",{\"a\",\"b\";10,20},2,FALSE)"), Value::Number(20.0));
    }

    #[test]
    fn test_sorted_search_skips_unorderable_midpoints() {
        // the midpoint holds text; the numbers around it are still found
        let book = sheet_from(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::Number(2.0)),
            ("A3", CellValue::string("x")),
            ("A4", CellValue::Number(4.0)),
            ("A5", CellValue::Number(5.0)),
        ]);
        assert_eq!(eval_in(&book, "=MATCH(4.5,A1:A5)"), Value::Number(4.0));
        assert_eq!(eval_in(&book, "=MATCH(2,A1:A5)"), Value::Number(2.0));
        assert_eq!(eval_in(&book, "=MATCH(0,A1:A5)"), Value::Error(ErrorValue::Na));
    }

    #[test]
    fn test_match() {
        assert_eq!(eval("=MATCH(\"b\",{\"a\",\"b\",\"c\"},0)"), Value::Number(2.0));
        assert_eq!(eval("=MATCH(\"B?\",{\"a\",\"bx\",\"c\"},0)"), Value::Number(2.0));
        assert_eq!(eval("=MATCH(25,{10,20,30})"), Value::Number(2.0));
        assert_eq!(eval("=MATCH(25,{30,20,10},-1)"), Value::Number(1.0));
        assert_eq!(eval("=MATCH(5,{30,20,10},-1)"), Value::Number(3.0));
        assert_eq!(eval("=MATCH(1,{1,2;3,4},0)"), Value::Error(ErrorValue::Na));
        assert_eq!(eval("=MATCH(1/0,{1,2},0)"), Value::Error(ErrorValue::Div0));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(eval("=LOOKUP(2.5,{1,2,3},{\"a\",\"b\",\"c\"})"), Value::text("b"));
        assert_eq!(eval("=LOOKUP(2,{1,\"a\";2,\"b\";3,\"c\"})"), Value::text("b"));
        assert_eq!(eval("=LOOKUP(\"b\",{\"a\",\"b\",\"c\";1,2,3})"), Value::Number(2.0));
        assert_eq!(eval("=LOOKUP(0,{1,2,3})"), Value::Error(ErrorValue::Na));
    }

    #[test]
    fn test_index() {
        let book = sheet_from(&[
            ("A1", CellValue::Number(1.0)),
            ("B1", CellValue::Number(2.0)),
            ("A2", CellValue::Number(3.0)),
            ("B2", CellValue::Number(4.0)),
            ("D1", CellValue::Number(10.0)),
        ]);
        assert_eq!(eval_in(&book, "=INDEX(A1:B2,2,1)"), Value::Number(3.0));
        assert_eq!(eval_in(&book, "=SUM(INDEX(A1:B2,0,2))"), Value::Number(6.0));
        assert_eq!(eval_in(&book, "=SUM(INDEX(A1:B2,1,0))"), Value::Number(3.0));
        assert_eq!(eval_in(&book, "=INDEX(A1:B2,3,1)"), Value::Error(ErrorValue::Ref));
        assert_eq!(eval_in(&book, "=INDEX((A1:B2,D1),1,1,2)"), Value::Number(10.0));
        assert_eq!(eval_in(&book, "=SUM(A1:INDEX(A1:B2,2,2))"), Value::Number(10.0));
        assert_eq!(eval_in(&book, "=INDEX(A1:B1,2)"), Value::Number(2.0));
        assert_eq!(eval("=INDEX({1,2;3,4},2,2)"), Value::Number(4.0));
        assert_eq!(eval("=INDEX({5,6,7},3)"), Value::Number(7.0));
        assert_eq!(
            eval_array("=INDEX({1,2;3,4},0,1)"),
            vec![vec![Value::Number(1.0)], vec![Value::Number(3.0)]]
        );
    }

    #[test]
    fn test_address() {
        assert_eq!(eval("=ADDRESS(2,3)"), Value::text("$C$2"));
        assert_eq!(eval("=ADDRESS(2,3,2)"), Value::text("C$2"));
        assert_eq!(eval("=ADDRESS(2,3,3)"), Value::text("$C2"));
        assert_eq!(eval("=ADDRESS(2,3,4)"), Value::text("C2"));
        assert_eq!(eval("=ADDRESS(2,3,1,FALSE)"), Value::text("R2C3"));
        assert_eq!(eval("=ADDRESS(2,3,4,FALSE)"), Value::text("R[2]C[3]"));
        assert_eq!(eval("=ADDRESS(1,1,1,TRUE,\"My Sheet\")"), Value::text("'My Sheet'!$A$1"));
        assert_eq!(eval("=ADDRESS(1,28,4,TRUE,\"Data\")"), Value::text("Data!AB1"));
        assert_eq!(eval("=ADDRESS(0,1)"), Value::Error(ErrorValue::Value));
    }
}
