//! Sparse rows
//!
//! A row keeps only its populated cells, sorted by column. Formula evaluation walks
//! rows through a dense "slot" index so that a range scan touches only stored cells.

use crate::cell::CellValue;

/// A worksheet row with sparse cell storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Row is hidden
    pub hidden: bool,
    /// Custom height (None = default)
    pub height: Option<f64>,
    cells: Vec<(u16, CellValue)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self, col: u16) -> std::result::Result<usize, usize> {
        self.cells.binary_search_by_key(&col, |(c, _)| *c)
    }

    /// Get the value stored in a column
    pub fn get(&self, col: u16) -> Option<&CellValue> {
        self.search(col).ok().map(|i| &self.cells[i].1)
    }

    /// Get a mutable reference to the value stored in a column
    pub fn get_mut(&mut self, col: u16) -> Option<&mut CellValue> {
        match self.search(col) {
            Ok(i) => Some(&mut self.cells[i].1),
            Err(_) => None,
        }
    }

    /// Store a value. Storing `Empty` removes the cell.
    pub fn set(&mut self, col: u16, value: CellValue) {
        match (self.search(col), value.is_empty()) {
            (Ok(i), true) => {
                self.cells.remove(i);
            }
            (Ok(i), false) => self.cells[i].1 = value,
            (Err(_), true) => {}
            (Err(i), false) => self.cells.insert(i, (col, value)),
        }
    }

    /// Remove a cell, returning its value
    pub fn remove(&mut self, col: u16) -> Option<CellValue> {
        self.search(col).ok().map(|i| self.cells.remove(i).1)
    }

    /// Number of populated cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Check if the row has no populated cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Slot of the first populated cell at or after `col`.
    ///
    /// Returns `cell_count()` when there is none.
    pub fn col_to_index(&self, col: u16) -> usize {
        match self.search(col) {
            Ok(i) | Err(i) => i,
        }
    }

    /// Column stored in a slot
    pub fn col_from_index(&self, index: usize) -> Option<u16> {
        self.cells.get(index).map(|(c, _)| *c)
    }

    /// Iterate over populated cells in column order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &CellValue)> {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    /// Iterate mutably over populated cells in column order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u16, &mut CellValue)> {
        self.cells.iter_mut().map(|(c, v)| (*c, v))
    }

    /// Last populated column
    pub fn last_col(&self) -> Option<u16> {
        self.cells.last().map(|(c, _)| *c)
    }

    /// Check if this row carries anything worth storing
    pub fn is_unused(&self) -> bool {
        self.cells.is_empty() && !self.hidden && self.height.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_set_and_remove() {
        let mut row = Row::new();
        row.set(5, CellValue::Number(5.0));
        row.set(1, CellValue::Number(1.0));
        row.set(3, CellValue::Number(3.0));
        assert_eq!(row.iter().map(|(c, _)| c).collect::<Vec<_>>(), vec![1, 3, 5]);

        row.set(3, CellValue::Empty);
        assert_eq!(row.cell_count(), 2);
        assert_eq!(row.get(3), None);
        assert_eq!(row.remove(5), Some(CellValue::Number(5.0)));
        assert_eq!(row.last_col(), Some(1));
    }

    #[test]
    fn test_slot_lookup() {
        let mut row = Row::new();
        row.set(2, CellValue::Boolean(true));
        row.set(7, CellValue::Boolean(false));

        assert_eq!(row.col_to_index(0), 0);
        assert_eq!(row.col_to_index(2), 0);
        assert_eq!(row.col_to_index(3), 1);
        assert_eq!(row.col_to_index(8), 2);
        assert_eq!(row.col_from_index(1), Some(7));
        assert_eq!(row.col_from_index(2), None);
    }
}
