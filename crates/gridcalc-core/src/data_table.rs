//! What-if data tables
//!
//! A data table is a block whose top row and left column hold trial values and whose
//! corner cell holds (or points at) the formula being studied. Each interior cell is the
//! corner formula recalculated with the input cell(s) replaced by that row's and
//! column's trial values.

use crate::cell::{CellAddress, CellRange};
use crate::error::{Error, Result};

/// A what-if data table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    /// Whole table, including the header row and column
    pub range: CellRange,
    /// Input cell replaced by the values of the top row
    pub row_input: Option<CellAddress>,
    /// Input cell replaced by the values of the left column
    pub col_input: Option<CellAddress>,
}

impl DataTable {
    /// Create a data table. At least one input cell is required.
    pub fn new(
        range: CellRange,
        row_input: Option<CellAddress>,
        col_input: Option<CellAddress>,
    ) -> Result<Self> {
        if row_input.is_none() && col_input.is_none() {
            return Err(Error::InvalidDataTable(format!(
                "{} has no input cell",
                range
            )));
        }
        if range.row_count() < 2 || range.col_count() < 2 {
            return Err(Error::InvalidDataTable(format!(
                "{} needs a header row and column",
                range
            )));
        }
        Ok(Self {
            range,
            row_input,
            col_input,
        })
    }

    /// Check whether a cell is one of the computed interior cells
    pub fn is_result_cell(&self, row: u32, col: u16) -> bool {
        row > self.range.start.row
            && row <= self.range.end.row
            && col > self.range.start.col
            && col <= self.range.end.col
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_table_validation() {
        let range = CellRange::parse("A1:C4").unwrap();
        assert!(DataTable::new(range, None, None).is_err());
        assert!(DataTable::new(CellRange::parse("A1:A4").unwrap(), None, Some(CellAddress::new(9, 9))).is_err());

        let table = DataTable::new(range, None, Some(CellAddress::new(9, 0))).unwrap();
        assert!(table.is_result_cell(1, 1));
        assert!(table.is_result_cell(3, 2));
        assert!(!table.is_result_cell(0, 1));
        assert!(!table.is_result_cell(1, 0));
    }
}
