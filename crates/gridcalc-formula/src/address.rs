//! Addresses as the evaluator sees them
//!
//! Everything here is 1-based: sheet 1 is the first sheet, row 1 / column 1 is A1.
//! A cell in another workbook carries that workbook's file name.

use gridcalc_core::{CellAddress, ErrorValue};
use std::fmt;
use std::sync::Arc;

/// One cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// External workbook name; `None` for the workbook being calculated
    pub book: Option<Arc<str>>,
    pub sheet: usize,
    pub row: u32,
    pub col: u32,
}

impl Address {
    pub fn new(sheet: usize, row: u32, col: u32) -> Self {
        Self {
            book: None,
            sheet,
            row,
            col,
        }
    }

    pub fn in_book(mut self, book: Option<Arc<str>>) -> Self {
        self.book = book;
        self
    }

    /// Move by a row/column delta, `None` if the result falls before row or column 1
    pub fn offset(&self, rows: i64, cols: i64) -> Option<Address> {
        let row = self.row as i64 + rows;
        let col = self.col as i64 + cols;
        (row >= 1 && col >= 1 && row <= u32::MAX as i64 && col <= u32::MAX as i64).then(|| {
            Address {
                book: self.book.clone(),
                sheet: self.sheet,
                row: row as u32,
                col: col as u32,
            }
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(book) = &self.book {
            write!(f, "[{}]", book)?;
        }
        write!(
            f,
            "{}!{}{}",
            self.sheet,
            CellAddress::column_to_letters(self.col.saturating_sub(1).min(u16::MAX as u32) as u16),
            self.row
        )
    }
}

/// A rectangular block of cells given by two corners, possibly spanning several sheets.
///
/// The corners are kept as written; [`AddressRange::ordered`] normalizes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressRange {
    pub first: Address,
    pub last: Address,
}

impl AddressRange {
    pub fn new(first: Address, last: Address) -> Self {
        Self { first, last }
    }

    pub fn cell(addr: Address) -> Self {
        Self {
            first: addr.clone(),
            last: addr,
        }
    }

    /// Swap each coordinate pair so that `first` is the top-left of the first sheet
    pub fn ordered(&self) -> AddressRange {
        let (s1, s2) = min_max(self.first.sheet, self.last.sheet);
        let (r1, r2) = min_max(self.first.row, self.last.row);
        let (c1, c2) = min_max(self.first.col, self.last.col);
        let book = self.first.book.clone();
        AddressRange {
            first: Address {
                book: book.clone(),
                sheet: s1,
                row: r1,
                col: c1,
            },
            last: Address {
                book,
                sheet: s2,
                row: r2,
                col: c2,
            },
        }
    }

    /// Spans more than one sheet, or its corners sit in different workbooks
    pub fn is_3d(&self) -> bool {
        self.first.sheet != self.last.sheet || self.first.book != self.last.book
    }

    pub fn is_single_cell(&self) -> bool {
        !self.is_3d() && self.first.row == self.last.row && self.first.col == self.last.col
    }

    /// Number of rows of the ordered range
    pub fn row_count(&self) -> u32 {
        self.first.row.abs_diff(self.last.row) + 1
    }

    /// Number of columns of the ordered range
    pub fn col_count(&self) -> u32 {
        self.first.col.abs_diff(self.last.col) + 1
    }

    /// Check whether an (ordered) range holds a cell of the given sheet
    pub fn contains(&self, sheet: usize, row: u32, col: u32) -> bool {
        let r = self.ordered();
        (r.first.sheet..=r.last.sheet).contains(&sheet)
            && (r.first.row..=r.last.row).contains(&row)
            && (r.first.col..=r.last.col).contains(&col)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}:{}", self.first, self.last)
        }
    }
}

fn min_max<T: Ord>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// An ordered list of areas, as produced by `(A1:B2,D1)`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressList(Vec<AddressRange>);

impl AddressList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(range: AddressRange) -> Self {
        Self(vec![range])
    }

    pub fn push(&mut self, range: AddressRange) {
        self.0.push(range);
    }

    /// Append the areas of another list
    pub fn extend(&mut self, other: AddressList) {
        self.0.extend(other.0);
    }

    pub fn areas(&self) -> &[AddressRange] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The only area, or `#VALUE!` for multi-area and 3-D references
    pub fn single_area(&self) -> Result<&AddressRange, ErrorValue> {
        match self.0.as_slice() {
            [only] if !only.is_3d() => Ok(only),
            _ => Err(ErrorValue::Value),
        }
    }

    /// True if any area spans several sheets, or the areas come from different workbooks
    pub fn has_3d_ref(&self) -> bool {
        self.0.iter().any(AddressRange::is_3d)
            || self.0.windows(2).any(|w| w[0].first.book != w[1].first.book)
    }
}

impl FromIterator<AddressRange> for AddressList {
    fn from_iter<I: IntoIterator<Item = AddressRange>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for AddressList {
    type Item = AddressRange;
    type IntoIter = std::vec::IntoIter<AddressRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

fn same_plane(a: &AddressRange, b: &AddressRange) -> bool {
    !a.is_3d() && !b.is_3d() && a.first.sheet == b.first.sheet && a.first.book == b.first.book
}

/// Overlap of two single-sheet areas, `#NULL!` when they are disjoint or on different sheets
pub fn intersect_ranges(a: &AddressRange, b: &AddressRange) -> Result<AddressRange, ErrorValue> {
    if !same_plane(a, b) {
        return Err(ErrorValue::Null);
    }
    let (a, b) = (a.ordered(), b.ordered());
    let top = a.first.row.max(b.first.row);
    let left = a.first.col.max(b.first.col);
    let bottom = a.last.row.min(b.last.row);
    let right = a.last.col.min(b.last.col);
    if top > bottom || left > right {
        return Err(ErrorValue::Null);
    }
    let base = &a.first;
    Ok(AddressRange::new(
        Address::new(base.sheet, top, left).in_book(base.book.clone()),
        Address::new(base.sheet, bottom, right).in_book(base.book.clone()),
    ))
}

/// Smallest area holding both areas (the `:` operator)
pub fn expand_ranges(a: &AddressRange, b: &AddressRange) -> Result<AddressRange, ErrorValue> {
    if !same_plane(a, b) {
        return Err(ErrorValue::Value);
    }
    let (a, b) = (a.ordered(), b.ordered());
    let base = &a.first;
    Ok(AddressRange::new(
        Address::new(
            base.sheet,
            a.first.row.min(b.first.row),
            a.first.col.min(b.first.col),
        )
        .in_book(base.book.clone()),
        Address::new(
            base.sheet,
            a.last.row.max(b.last.row),
            a.last.col.max(b.last.col),
        )
        .in_book(base.book.clone()),
    ))
}
