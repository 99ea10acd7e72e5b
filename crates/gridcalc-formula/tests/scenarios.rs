//! Whole-workbook scenarios: names, wrapping references, external books

use gridcalc_core::{CellValue, ErrorValue, Workbook};
use gridcalc_formula::{BookSession, UnsupportedKind, Value};
use pretty_assertions::assert_eq;

fn eval(wb: &Workbook, formula: &str, row: u32, col: u32) -> Value {
    BookSession::new(wb)
        .evaluate_formula(formula, 1, row, col)
        .unwrap()
}

#[test]
fn test_nested_names() {
    let mut wb = Workbook::new();
    for i in 1..50 {
        wb.define_name(&format!("Step{}", i), &format!("=Step{}+1", i + 1))
            .unwrap();
    }
    wb.define_name("Step50", "=1").unwrap();
    assert_eq!(eval(&wb, "=Step1", 1, 1), Value::Number(50.0));
}

#[test]
fn test_circular_names() {
    let mut wb = Workbook::new();
    wb.define_name("Ping", "=Pong*2").unwrap();
    wb.define_name("Pong", "=Ping+1").unwrap();
    assert_eq!(eval(&wb, "=Ping", 1, 1), Value::Error(ErrorValue::Name));
    // a name used twice side by side is not circular
    wb.define_name("Two", "=2").unwrap();
    assert_eq!(eval(&wb, "=Two*Two+SUM(Two,Two)", 1, 1), Value::Number(8.0));
}

#[test]
fn test_relative_name_wraps() {
    let mut wb = Workbook::new();
    {
        let sheet = wb.worksheet_mut(0).unwrap();
        sheet.set_cell_value("B4", 41.0).unwrap();
        sheet.set_cell_value("C1", 7.0).unwrap();
    }
    // defined at A1 as "the cell above", so it wraps to the last row there
    wb.define_name("Above", "=A1048576").unwrap();
    assert_eq!(eval(&wb, "=Above+1", 5, 2), Value::Number(42.0));
    assert_eq!(eval(&wb, "=Above", 2, 3), Value::Number(7.0));
}

#[test]
fn test_indirect_names_and_text() {
    let mut wb = Workbook::new();
    {
        let sheet = wb.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 3.0).unwrap();
        sheet.set_cell_value("A2", 4.0).unwrap();
        sheet.set_cell_value("B1", "A2").unwrap();
    }
    wb.define_name("Pair", "=Sheet1!$A$1:$A$2").unwrap();
    assert_eq!(eval(&wb, "=SUM(INDIRECT(\"Pair\"))", 9, 9), Value::Number(7.0));
    assert_eq!(eval(&wb, "=INDIRECT(B1)*10", 9, 9), Value::Number(40.0));
    assert_eq!(eval(&wb, "=INDIRECT(\"R1C1\",FALSE)", 9, 9), Value::Number(3.0));
    assert_eq!(
        eval(&wb, "=INDIRECT(\"NotAName\")", 9, 9),
        Value::Error(ErrorValue::Ref)
    );
}

#[test]
fn test_sheet_scoped_names() {
    let mut wb = Workbook::new();
    wb.add_worksheet_with_name("Other").unwrap();
    wb.define_name("Size", "=10").unwrap();
    wb.define_name_for_sheet("Size", "=20", 1).unwrap();
    wb.worksheet_mut(1)
        .unwrap()
        .set_cell_formula("A1", "=Size")
        .unwrap();

    let session = BookSession::new(&wb);
    assert_eq!(session.evaluate_formula("=Size", 1, 1, 1).unwrap(), Value::Number(10.0));
    assert_eq!(session.cell_value(2, 1, 1), Value::Number(20.0));
}

#[test]
fn test_external_books() {
    let mut rates = Workbook::new();
    {
        let sheet = rates.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 0.5).unwrap();
        sheet.set_cell_formula("A2", "=A1*4").unwrap();
    }
    let mut wb = Workbook::new();
    wb.add_supporting_workbook("rates.xlsx", rates);
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", 100.0).unwrap();
    sheet
        .set_cell_value("B1", CellValue::formula("=A1*[rates.xlsx]Sheet1!A2"))
        .unwrap();
    sheet
        .set_cell_value("B2", CellValue::formula("=[missing.xlsx]Sheet1!A1+1"))
        .unwrap();

    let session = BookSession::new(&wb);
    assert_eq!(session.cell_value(1, 1, 2), Value::Number(200.0));
    assert_eq!(session.cell_value(1, 2, 2), Value::Error(ErrorValue::Ref));
    assert_eq!(
        session.unsupported(),
        vec![(UnsupportedKind::ExternalReference, "missing.xlsx".to_string())]
    );
}

#[test]
fn test_array_formula_spill_area() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    for (i, n) in [2.0, 3.0, 5.0].iter().enumerate() {
        sheet.set_cell_value_at(i as u32, 0, CellValue::Number(*n));
    }
    sheet.set_array_formula("C1:D4", "=A1:A3*{1,10}").unwrap();

    let session = BookSession::new(&wb);
    assert_eq!(session.cell_value(1, 1, 3), Value::Number(2.0));
    assert_eq!(session.cell_value(1, 3, 4), Value::Number(50.0));
    // past the end of the result
    assert_eq!(session.cell_value(1, 4, 3), Value::Error(ErrorValue::Na));
}
