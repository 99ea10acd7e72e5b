//! Worksheet type

use std::collections::BTreeMap;

use crate::cell::{CellAddress, CellRange, CellValue};
use crate::data_table::DataTable;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::SheetLimits;

/// A worksheet (single sheet in a workbook)
///
/// Cells are stored sparsely: rows that hold nothing are not allocated, and each row
/// keeps only its populated columns.
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    /// Sheet name
    name: String,
    /// Populated rows keyed by 0-based index
    rows: BTreeMap<u32, Row>,
    /// Ranges entered as a single array formula
    array_ranges: Vec<CellRange>,
    /// What-if data tables on this sheet
    data_tables: Vec<DataTable>,
}

impl Worksheet {
    /// Create a new worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sheet name
    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    // === Cell Access ===

    /// Get a cell value by address string (e.g., "A1")
    pub fn get_value(&self, address: &str) -> Result<CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.get_value_at(addr.row, addr.col))
    }

    /// Get cell value by indices
    pub fn get_value_at(&self, row: u32, col: u16) -> CellValue {
        self.cell_at(row, col).cloned().unwrap_or_default()
    }

    /// Borrow the stored payload of a cell
    pub fn cell_at(&self, row: u32, col: u16) -> Option<&CellValue> {
        self.rows.get(&row).and_then(|r| r.get(col))
    }

    /// Set a cell value by address string
    pub fn set_cell_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_cell_value_at(addr.row, addr.col, value);
        Ok(())
    }

    /// Set a cell value by indices. Setting `Empty` clears the cell.
    pub fn set_cell_value_at<V: Into<CellValue>>(&mut self, row: u32, col: u16, value: V) {
        let value = value.into();
        if value.is_empty() {
            self.clear_cell_at(row, col);
        } else {
            self.rows.entry(row).or_default().set(col, value);
        }
    }

    /// Set a formula by address string. A leading `=` is optional.
    pub fn set_cell_formula(&mut self, address: &str, formula: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_cell_value_at(addr.row, addr.col, CellValue::formula(normalize_formula(formula)));
        Ok(())
    }

    /// Enter one formula as an array formula over a whole range
    pub fn set_array_formula(&mut self, range: &str, formula: &str) -> Result<()> {
        let range = CellRange::parse(range)?;
        if self.array_ranges.iter().any(|r| r.intersect(&range).is_some()) {
            return Err(Error::InvalidRange(format!(
                "{} overlaps an existing array formula",
                range
            )));
        }
        let text = normalize_formula(formula);
        for addr in range.cells() {
            self.set_cell_value_at(addr.row, addr.col, CellValue::array_formula(text.clone()));
        }
        self.array_ranges.push(range);
        Ok(())
    }

    /// The array-formula range a cell belongs to, if any
    pub fn array_range_at(&self, row: u32, col: u16) -> Option<&CellRange> {
        let addr = CellAddress::new(row, col);
        self.array_ranges.iter().find(|r| r.contains(&addr))
    }

    /// Clear a cell
    pub fn clear_cell_at(&mut self, row: u32, col: u16) {
        if let Some(r) = self.rows.get_mut(&row) {
            r.remove(col);
            if r.is_unused() {
                self.rows.remove(&row);
            }
        }
    }

    // === Rows ===

    /// Borrow a row, if anything is stored in it
    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    /// One past the last populated (or formatted) row
    pub fn row_count(&self) -> u32 {
        self.rows.keys().next_back().map_or(0, |r| r + 1)
    }

    /// Check if a row is hidden
    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.rows.get(&row).map_or(false, |r| r.hidden)
    }

    /// Hide or show a row
    pub fn set_row_hidden(&mut self, row: u32, hidden: bool) {
        if hidden {
            self.rows.entry(row).or_default().hidden = true;
        } else if let Some(r) = self.rows.get_mut(&row) {
            r.hidden = false;
            if r.is_unused() {
                self.rows.remove(&row);
            }
        }
    }

    /// Bounding range of all populated cells
    pub fn used_range(&self) -> Option<CellRange> {
        let first = *self.rows.iter().find(|(_, r)| !r.is_empty())?.0;
        let last = *self.rows.iter().rev().find(|(_, r)| !r.is_empty())?.0;
        let (min_col, max_col) = self
            .rows
            .values()
            .filter_map(|r| Some((r.col_from_index(0)?, r.last_col()?)))
            .fold((u16::MAX, 0), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
        Some(CellRange::from_indices(first, min_col, last, max_col))
    }

    // === Data tables ===

    /// Register a what-if data table.
    ///
    /// The interior cells receive a `TABLE()` array formula naming the input cells.
    pub fn add_data_table(&mut self, table: DataTable) -> Result<()> {
        if self
            .data_tables
            .iter()
            .any(|t| t.range.intersect(&table.range).is_some())
        {
            return Err(Error::InvalidDataTable(format!(
                "{} overlaps an existing data table",
                table.range
            )));
        }
        let arg = |a: Option<CellAddress>| a.map(|a| a.to_a1_string()).unwrap_or_default();
        let text = format!("=TABLE({},{})", arg(table.row_input), arg(table.col_input));
        for addr in table.range.cells() {
            if table.is_result_cell(addr.row, addr.col) {
                self.set_cell_value_at(addr.row, addr.col, CellValue::array_formula(text.clone()));
            }
        }
        self.data_tables.push(table);
        Ok(())
    }

    /// The data table whose interior contains a cell
    pub fn data_table_at(&self, row: u32, col: u16) -> Option<&DataTable> {
        self.data_tables.iter().find(|t| t.is_result_cell(row, col))
    }

    // === Iteration and formula support ===

    /// Number of populated cells
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(Row::cell_count).sum()
    }

    /// Check if the worksheet is empty
    pub fn is_empty(&self) -> bool {
        self.rows.values().all(Row::is_empty)
    }

    /// Iterate over all populated cells in row-major order
    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u16, &CellValue)> {
        self.rows
            .iter()
            .flat_map(|(r, row)| row.iter().map(move |(c, v)| (*r, c, v)))
    }

    /// Iterate over all formula cells: (row, col, formula_text)
    pub fn formula_cells(&self) -> impl Iterator<Item = (u32, u16, &str)> {
        self.iter_cells()
            .filter_map(|(r, c, v)| v.formula_text().map(|t| (r, c, t)))
    }

    /// Get the formula text at a cell position (if it's a formula)
    pub fn get_formula_at(&self, row: u32, col: u16) -> Option<&str> {
        self.cell_at(row, col).and_then(CellValue::formula_text)
    }

    /// Set the cached result value of a formula cell
    pub fn set_formula_result(&mut self, row: u32, col: u16, value: CellValue) -> Result<()> {
        match self.rows.get_mut(&row).and_then(|r| r.get_mut(col)) {
            Some(CellValue::Formula { cached_value, .. }) => {
                *cached_value = Some(Box::new(value));
                Ok(())
            }
            _ => Err(Error::InvalidAddress(format!(
                "{} is not a formula cell",
                CellAddress::new(row, col)
            ))),
        }
    }

    /// Check that a position fits the given sheet limits
    pub fn validate_position(row: u32, col: u16, limits: SheetLimits) -> Result<()> {
        if row >= limits.max_rows {
            return Err(Error::RowOutOfBounds(row, limits.max_rows - 1));
        }
        if col as u32 >= limits.max_cols {
            return Err(Error::ColumnOutOfBounds(col as u32, limits.max_cols - 1));
        }
        Ok(())
    }
}

fn normalize_formula(formula: &str) -> String {
    let trimmed = formula.trim();
    if trimmed.starts_with('=') {
        trimmed.to_string()
    } else {
        format!("={}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_and_get_values() {
        let mut ws = Worksheet::new("Data");
        ws.set_cell_value("B3", 7.0).unwrap();
        ws.set_cell_value("A1", "x").unwrap();

        assert_eq!(ws.get_value("B3").unwrap(), CellValue::Number(7.0));
        assert_eq!(ws.get_value_at(2, 1), CellValue::Number(7.0));
        assert_eq!(ws.get_value("Z9").unwrap(), CellValue::Empty);
        assert_eq!(ws.row_count(), 3);
        assert_eq!(ws.cell_count(), 2);

        ws.set_cell_value("B3", CellValue::Empty).unwrap();
        assert_eq!(ws.row_count(), 1);
    }

    #[test]
    fn test_hidden_rows_survive_without_cells() {
        let mut ws = Worksheet::new("S");
        ws.set_row_hidden(4, true);
        assert!(ws.is_row_hidden(4));
        assert_eq!(ws.row_count(), 5);
        assert!(ws.is_empty());

        ws.set_row_hidden(4, false);
        assert_eq!(ws.row_count(), 0);
    }

    #[test]
    fn test_formula_cells_and_results() {
        let mut ws = Worksheet::new("S");
        ws.set_cell_formula("A1", "1+1").unwrap();
        ws.set_cell_value("A2", 3.0).unwrap();

        let formulas: Vec<_> = ws.formula_cells().collect();
        assert_eq!(formulas, vec![(0, 0, "=1+1")]);

        ws.set_formula_result(0, 0, CellValue::Number(2.0)).unwrap();
        assert_eq!(ws.get_value_at(0, 0).as_number(), Some(2.0));
        assert!(ws.set_formula_result(1, 0, CellValue::Number(0.0)).is_err());
    }

    #[test]
    fn test_array_formula_ranges() {
        let mut ws = Worksheet::new("S");
        ws.set_array_formula("B1:B3", "=A1:A3*2").unwrap();
        assert!(ws.get_value_at(2, 1).is_formula());
        assert_eq!(ws.array_range_at(1, 1), Some(&CellRange::parse("B1:B3").unwrap()));
        assert!(ws.set_array_formula("B2:C2", "=1").is_err());
    }

    #[test]
    fn test_data_table_writes_table_formulas() {
        let mut ws = Worksheet::new("S");
        let table = DataTable::new(
            CellRange::parse("D1:E3").unwrap(),
            None,
            Some(CellAddress::parse("A1").unwrap()),
        )
        .unwrap();
        ws.add_data_table(table).unwrap();

        assert_eq!(ws.get_formula_at(1, 4), Some("=TABLE(,A1)"));
        assert_eq!(ws.get_formula_at(0, 4), None);
        assert!(ws.data_table_at(2, 4).is_some());
        assert!(ws.data_table_at(2, 3).is_none());
    }

    #[test]
    fn test_used_range() {
        let mut ws = Worksheet::new("S");
        assert_eq!(ws.used_range(), None);
        ws.set_cell_value("C2", 1.0).unwrap();
        ws.set_cell_value("A5", 1.0).unwrap();
        assert_eq!(ws.used_range(), Some(CellRange::parse("A2:C5").unwrap()));
    }
}
