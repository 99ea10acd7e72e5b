//! What-if data tables
//!
//! A `{=TABLE(row_input, col_input)}` cell is the table's formula recalculated with
//! the input cells replaced by the header values of the cell's row and column.
//! With both inputs the formula sits in the table's corner; a one-input table keeps
//! one formula per column (column input) or per row (row input) along its edge.

use crate::context::EvalContext;
use crate::error::FormulaResult;
use crate::value::Value;
use gridcalc_core::ErrorValue;
use std::sync::Arc;

/// Value of the data-table cell the context points at
pub(crate) fn evaluate_table(cx: &EvalContext<'_>) -> FormulaResult<Value> {
    let info = &cx.info;
    let Some(table) = cx.book().what_if_table(info.sheet, info.row, info.col) else {
        return Ok(Value::Error(ErrorValue::Ref));
    };
    let corner = &table.table.first;
    let (sheet, row, col) = (info.sheet, info.row, info.col);
    if row == corner.row || col == corner.col {
        return Ok(Value::Error(ErrorValue::Ref));
    }

    let mut substitution = cx.state.what_if.as_deref().cloned().unwrap_or_default();
    if let Some(input) = &table.row_input {
        let trial = cx.read_cell(sheet, corner.row, col);
        substitution.set(input.sheet, input.row, input.col, trial);
    }
    if let Some(input) = &table.col_input {
        let trial = cx.read_cell(sheet, row, corner.col);
        substitution.set(input.sheet, input.row, input.col, trial);
    }
    let formula = match (&table.row_input, &table.col_input) {
        (Some(_), Some(_)) => (corner.row, corner.col),
        (None, Some(_)) => (corner.row, col),
        (Some(_), None) => (row, corner.col),
        (None, None) => return Ok(Value::Error(ErrorValue::Ref)),
    };
    log::debug!(
        "what-if table {} at {}: recalculating R{}C{} with {:?}",
        table.table,
        cx.host(),
        formula.0,
        formula.1,
        substitution
    );

    let mut state = cx.state.clone();
    state.what_if = Some(Arc::new(substitution));
    let inner = cx.with_state(&state);
    Ok(match inner.read_cell(sheet, formula.0, formula.1) {
        Value::Array(a) => a.first().clone(),
        Value::Empty => Value::Number(0.0),
        v => v,
    })
}

#[cfg(test)]
mod tests {
    use crate::testing::{assert_approx, sheet_from, value_at, TestBook};
    use crate::value::Value;
    use gridcalc_core::{CellAddress, CellRange, CellValue, DataTable, ErrorValue};

    fn cell(a1: &str) -> CellAddress {
        CellAddress::parse(a1).expect("address")
    }

    /// E1 is the input. A1:B4 varies it down a column, H1:J3 varies it with F1.
    fn book() -> TestBook {
        let n = CellValue::Number;
        let mut book = sheet_from(&[
            ("E1", n(1.0)),
            ("F1", n(1.0)),
            ("G1", CellValue::formula("=E1*10")),
            ("B1", CellValue::formula("=G1+1")),
            ("A2", n(1.0)),
            ("A3", n(2.0)),
            ("A4", n(3.0)),
            ("H1", CellValue::formula("=E1+F1*100")),
            ("I1", n(1.0)),
            ("J1", n(2.0)),
            ("H2", n(3.0)),
            ("H3", n(4.0)),
        ]);
        let sheet = book.worksheet_mut(0).expect("sheet");
        let one_way = DataTable::new(CellRange::parse("A1:B4").expect("range"), None, Some(cell("E1")))
            .expect("table");
        sheet.add_data_table(one_way).expect("add");
        let two_way = DataTable::new(
            CellRange::parse("H1:J3").expect("range"),
            Some(cell("E1")),
            Some(cell("F1")),
        )
        .expect("table");
        sheet.add_data_table(two_way).expect("add");
        book
    }

    #[test]
    fn test_one_input_table() {
        let b = book();
        assert_approx(value_at(&b, "B2"), 11.0);
        assert_approx(value_at(&b, "B3"), 21.0);
        assert_approx(value_at(&b, "B4"), 31.0);
        // the input cell itself is untouched
        assert_approx(value_at(&b, "B1"), 11.0);
    }

    #[test]
    fn test_two_input_table() {
        let b = book();
        assert_approx(value_at(&b, "I2"), 301.0);
        assert_approx(value_at(&b, "J2"), 302.0);
        assert_approx(value_at(&b, "J3"), 402.0);
        assert_approx(value_at(&b, "H1"), 101.0);
    }

    #[test]
    fn test_table_outside_a_data_table() {
        let b = sheet_from(&[("A1", CellValue::array_formula("=TABLE(,E1)"))]);
        assert_eq!(value_at(&b, "A1"), Value::Error(ErrorValue::Ref));
    }
}
