//! Tests for formula evaluation against workbooks

use gridcalc::prelude::*;
use gridcalc::{parse_formula, DataTable, UnsupportedKind};
use pretty_assertions::assert_eq;

fn eval(wb: &Workbook, formula: &str) -> Value {
    wb.evaluate_formula(0, "Z100", formula).unwrap()
}

/// Test basic formula evaluation without cell references
#[test]
fn test_evaluate_simple_formulas() {
    let wb = Workbook::new();

    // Arithmetic
    assert_eq!(eval(&wb, "=1+2*3"), Value::Number(7.0));

    // String concatenation
    assert_eq!(eval(&wb, "=\"Hello \"&\"World\""), Value::text("Hello World"));

    // Comparison
    assert_eq!(eval(&wb, "=5>3"), Value::Boolean(true));
}

/// Test formula evaluation with cell and range references
#[test]
fn test_evaluate_with_references() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();

    sheet.set_cell_value("A1", 10.0).unwrap();
    sheet.set_cell_value("A2", 20.0).unwrap();
    sheet.set_cell_value("A3", 30.0).unwrap();
    sheet.set_cell_value("B1", 5.0).unwrap();

    assert_eq!(eval(&wb, "=A1+B1"), Value::Number(15.0));
    assert_eq!(eval(&wb, "=SUM(A1:A3)"), Value::Number(60.0));
    assert_eq!(eval(&wb, "=AVERAGE(A1:A3)"), Value::Number(20.0));
    assert_eq!(eval(&wb, "=MAX(A1:A3)-MIN(A1:A3)"), Value::Number(20.0));

    // Empty cells are 0 in arithmetic and skipped by SUM
    assert_eq!(eval(&wb, "=A1+A9"), Value::Number(10.0));
    assert_eq!(eval(&wb, "=COUNT(A1:A9)"), Value::Number(3.0));
}

/// Test error propagation in formulas
#[test]
fn test_error_propagation() {
    let wb = Workbook::new();
    assert_eq!(eval(&wb, "=1/0"), Value::Error(ErrorValue::Div0));
    assert_eq!(eval(&wb, "=1/0+5"), Value::Error(ErrorValue::Div0));
    assert_eq!(eval(&wb, "=IFERROR(1/0,7)"), Value::Number(7.0));
    assert_eq!(eval(&wb, "=NoSuchName"), Value::Error(ErrorValue::Name));
}

/// Test recalculating a workbook through sheets and defined names
#[test]
fn test_calculate_across_sheets() {
    let mut wb = Workbook::new();
    wb.add_worksheet_with_name("Inputs").unwrap();
    wb.add_worksheet_with_name("Extra").unwrap();
    {
        let inputs = wb.worksheet_mut(1).unwrap();
        inputs.set_cell_value("A1", 100.0).unwrap();
        inputs.set_cell_value("A2", 0.2).unwrap();
    }
    wb.worksheet_mut(2).unwrap().set_cell_value("A1", 1.0).unwrap();
    wb.define_name("Rate", "=Inputs!$A$2").unwrap();
    {
        let main = wb.worksheet_mut(0).unwrap();
        main.set_cell_value("A1", 1.0).unwrap();
        main.set_cell_formula("B1", "=Inputs!A1*Rate").unwrap();
        main.set_cell_formula("B2", "=SUM(Sheet1:Extra!A1)").unwrap();
        main.set_cell_formula("B3", "=B1+B2").unwrap();
    }

    let stats = wb.calculate().unwrap();
    assert_eq!(stats.formula_count, 3);
    assert_eq!(stats.errors, 0);

    let main = wb.worksheet(0).unwrap();
    assert_eq!(main.get_value("B1").unwrap().as_number(), Some(20.0));
    assert_eq!(main.get_value("B2").unwrap().as_number(), Some(102.0));
    assert_eq!(main.get_value("B3").unwrap().as_number(), Some(122.0));
}

/// Test a one-input what-if table recalculated with the workbook
#[test]
fn test_calculate_data_table() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("D1", 5.0).unwrap();
    sheet.set_cell_formula("B1", "=D1*D1").unwrap();
    for (a1, n) in [("A2", 1.0), ("A3", 2.0), ("A4", 3.0)] {
        sheet.set_cell_value(a1, n).unwrap();
    }
    let table = DataTable::new(
        CellRange::parse("A1:B4").unwrap(),
        None,
        Some(CellAddress::parse("D1").unwrap()),
    )
    .unwrap();
    sheet.add_data_table(table).unwrap();

    wb.calculate().unwrap();
    let sheet = wb.worksheet(0).unwrap();
    assert_eq!(sheet.get_value("B1").unwrap().as_number(), Some(25.0));
    assert_eq!(sheet.get_value("B2").unwrap().as_number(), Some(1.0));
    assert_eq!(sheet.get_value("B3").unwrap().as_number(), Some(4.0));
    assert_eq!(sheet.get_value("B4").unwrap().as_number(), Some(9.0));
}

/// Test user-defined functions through a session
#[test]
fn test_session_functions() {
    let mut wb = Workbook::new();
    wb.worksheet_mut(0)
        .unwrap()
        .set_cell_formula("A1", "=Discount(200)+1")
        .unwrap();

    let session = BookSession::new(&wb);
    assert_eq!(session.cell_value(1, 1, 1), Value::Error(ErrorValue::Name));
    assert_eq!(
        session.unsupported(),
        vec![(UnsupportedKind::UserDefinedFunction, "Discount".to_string())]
    );

    let mut session = BookSession::new(&wb);
    session.register_function("DISCOUNT", |_, args| match args {
        [Value::Number(n)] => Value::Number(n * 0.9),
        _ => Value::Error(ErrorValue::Value),
    });
    assert_eq!(session.cell_value(1, 1, 1), Value::Number(181.0));
}

/// Test parsing on its own
#[test]
fn test_parse_formula() {
    let at = CellAddress::parse("B2").unwrap();
    assert_eq!(parse_formula("=SUM(A1:A3)*2", &at).unwrap().len(), 4);
    assert!(parse_formula("=SUM(A1", &at).is_err());
    assert!(parse_formula("=ABS()", &at).is_err());
}
