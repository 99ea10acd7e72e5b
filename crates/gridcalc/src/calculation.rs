//! Workbook calculation
//!
//! Recalculates every formula cell of a workbook and stores the results as the cells'
//! cached values. Cells are calculated on demand, so a formula reading another
//! formula cell pulls that one in first; a cell that ends up reading itself is
//! circular and takes the value 0.
//!
//! # Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_value("A2", 20.0).unwrap();
//! sheet.set_cell_formula("A3", "=A1+A2").unwrap();
//!
//! let stats = workbook.calculate().unwrap();
//! assert_eq!(stats.cells_calculated, 1);
//! assert_eq!(workbook.worksheet(0).unwrap().get_value("A3").unwrap().as_number(), Some(30.0));
//! ```

use crate::{BookSession, CellValue, FormulaError, UnsupportedKind, Value, Workbook};
use gridcalc_formula::coerce::value_to_cell;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

/// Errors from a calculation run
#[derive(Error, Debug)]
pub enum CalcError {
    #[error(transparent)]
    Core(#[from] gridcalc_core::Error),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// The cancellation flag was raised before every cell was calculated
    #[error("Calculation aborted after {0} cells")]
    Aborted(usize),
}

pub type CalcResult<T> = std::result::Result<T, CalcError>;

/// Options for workbook calculation
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Recalculate cells that already hold a cached result
    pub force_full_calculation: bool,
    /// Shared flag another thread may raise to stop the run
    pub abort: Option<Arc<AtomicBool>>,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            force_full_calculation: true,
            abort: None,
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default)]
pub struct CalculationStats {
    /// Total number of formula cells
    pub formula_count: usize,
    /// Number of cells calculated
    pub cells_calculated: usize,
    /// Number of cells found reading themselves
    pub circular_references: usize,
    /// Number of cells whose result is an error value
    pub errors: usize,
    /// References, names and functions that could not be calculated
    pub unsupported: Vec<(UnsupportedKind, String)>,
}

/// Extension trait for Workbook to add calculation methods
pub trait WorkbookCalculationExt {
    /// Calculate all formulas in the workbook with default options
    fn calculate(&mut self) -> CalcResult<CalculationStats>;

    /// Calculate all formulas with custom options
    fn calculate_with_options(&mut self, options: &CalculationOptions)
        -> CalcResult<CalculationStats>;

    /// Evaluate formula text as if it were entered in a cell (0-based sheet, A1 address)
    fn evaluate_formula(&self, sheet: usize, cell: &str, formula: &str) -> CalcResult<Value>;
}

impl WorkbookCalculationExt for Workbook {
    fn calculate(&mut self) -> CalcResult<CalculationStats> {
        self.calculate_with_options(&CalculationOptions::default())
    }

    fn calculate_with_options(
        &mut self,
        options: &CalculationOptions,
    ) -> CalcResult<CalculationStats> {
        let mut stats = CalculationStats::default();
        let results = {
            let session = BookSession::new(self);
            let results = calculate_cells(&session, options, &mut stats)?;
            stats.circular_references = session.circular_cells().len();
            stats.unsupported = session.unsupported();
            results
        };

        for (sheet, row, col, value) in results {
            if let Some(ws) = self.worksheet_mut(sheet) {
                ws.set_formula_result(row, col, value)?;
            }
        }
        log::debug!(
            "calculated {} of {} formula cells ({} errors, {} circular)",
            stats.cells_calculated,
            stats.formula_count,
            stats.errors,
            stats.circular_references
        );
        Ok(stats)
    }

    fn evaluate_formula(&self, sheet: usize, cell: &str, formula: &str) -> CalcResult<Value> {
        let addr = crate::CellAddress::parse(cell)?;
        let session = BookSession::new(self);
        Ok(session.evaluate_formula(formula, sheet + 1, addr.row + 1, u32::from(addr.col) + 1)?)
    }
}

/// Results as (0-based sheet, row, col, value), in row-major order per sheet
fn calculate_cells(
    session: &BookSession<'_>,
    options: &CalculationOptions,
    stats: &mut CalculationStats,
) -> CalcResult<Vec<(usize, u32, u16, CellValue)>> {
    let aborted = || {
        options
            .abort
            .as_ref()
            .is_some_and(|flag| flag.load(std::sync::atomic::Ordering::Relaxed))
    };
    let mut results = Vec::new();
    for (index, sheet) in session.workbook().worksheets().enumerate() {
        for (row, col, raw) in sheet.iter_cells() {
            let CellValue::Formula { cached_value, .. } = raw else {
                continue;
            };
            stats.formula_count += 1;
            if cached_value.is_some() && !options.force_full_calculation {
                continue;
            }
            if aborted() {
                session.state().abort();
                return Err(CalcError::Aborted(stats.cells_calculated));
            }
            let value = session.cell_value(index + 1, row + 1, u32::from(col) + 1);
            if value.is_error() {
                stats.errors += 1;
            }
            stats.cells_calculated += 1;
            results.push((index, row, col, value_to_cell(&value)));
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorValue;

    fn book() -> Workbook {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(0).expect("sheet");
        sheet.set_cell_value("A1", 10.0).expect("value");
        sheet.set_cell_value("A2", 20.0).expect("value");
        sheet.set_cell_formula("A3", "=A1+A2").expect("formula");
        sheet.set_cell_formula("A4", "=A3*2").expect("formula");
        sheet.set_cell_formula("A5", "=A4/0").expect("formula");
        wb
    }

    fn cached(wb: &Workbook, a1: &str) -> Option<CellValue> {
        match wb.worksheet(0).and_then(|s| s.get_value(a1).ok()) {
            Some(CellValue::Formula { cached_value, .. }) => cached_value.map(|v| *v),
            _ => None,
        }
    }

    #[test]
    fn test_calculate_writes_results() {
        let mut wb = book();
        let stats = wb.calculate().expect("calculate");
        assert_eq!(stats.formula_count, 3);
        assert_eq!(stats.cells_calculated, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(cached(&wb, "A3"), Some(CellValue::Number(30.0)));
        assert_eq!(cached(&wb, "A4"), Some(CellValue::Number(60.0)));
        assert_eq!(cached(&wb, "A5"), Some(CellValue::Error(ErrorValue::Div0)));
    }

    #[test]
    fn test_skip_cached_cells() {
        let mut wb = book();
        wb.calculate().expect("calculate");
        wb.worksheet_mut(0)
            .expect("sheet")
            .set_cell_formula("B1", "=A4+1")
            .expect("formula");
        let options = CalculationOptions {
            force_full_calculation: false,
            ..Default::default()
        };
        let stats = wb.calculate_with_options(&options).expect("calculate");
        assert_eq!(stats.formula_count, 4);
        assert_eq!(stats.cells_calculated, 1);
        assert_eq!(cached(&wb, "B1"), Some(CellValue::Number(61.0)));
    }

    #[test]
    fn test_circular_cells() {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(0).expect("sheet");
        sheet.set_cell_formula("A1", "=B1+1").expect("formula");
        sheet.set_cell_formula("B1", "=A1+1").expect("formula");
        let stats = wb.calculate().expect("calculate");
        assert_eq!(stats.circular_references, 1);
        assert_eq!(
            stats.unsupported.first().map(|(k, _)| *k),
            Some(UnsupportedKind::CircularReference)
        );
        assert_eq!(cached(&wb, "A1"), Some(CellValue::Number(2.0)));
        assert_eq!(cached(&wb, "B1"), Some(CellValue::Number(1.0)));
    }

    #[test]
    fn test_abort() {
        let mut wb = book();
        let flag = Arc::new(AtomicBool::new(true));
        let options = CalculationOptions {
            abort: Some(flag),
            ..Default::default()
        };
        assert!(matches!(
            wb.calculate_with_options(&options),
            Err(CalcError::Aborted(0))
        ));
        assert_eq!(cached(&wb, "A3"), None);
    }

    #[test]
    fn test_evaluate_formula() {
        let wb = book();
        assert_eq!(
            wb.evaluate_formula(0, "C1", "=SUM(A1:A2)*2").expect("evaluate"),
            Value::Number(60.0)
        );
        assert!(wb.evaluate_formula(0, "C1", "=SUM(").is_err());
    }
}
