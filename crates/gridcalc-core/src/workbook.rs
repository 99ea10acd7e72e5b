//! Workbook type - the main document structure

use crate::error::{Error, Result};
use crate::named_range::{NameScope, NamedRange, NamedRangeCollection};
use crate::worksheet::Worksheet;
use crate::{SheetLimits, MAX_SHEET_NAME_LEN};

/// A workbook (spreadsheet document)
///
/// A workbook contains one or more worksheets, defined names, global settings and
/// the external workbooks its formulas may reference as `[Book]Sheet!A1`.
#[derive(Debug, Clone)]
pub struct Workbook {
    /// Worksheets in the workbook
    worksheets: Vec<Worksheet>,
    /// Workbook settings
    settings: WorkbookSettings,
    /// Named ranges (defined names)
    named_ranges: NamedRangeCollection,
    /// Supporting workbooks keyed by file name
    supporting: Vec<(String, Workbook)>,
}

impl Workbook {
    /// Create a new empty workbook with one worksheet
    pub fn new() -> Self {
        let mut wb = Self::empty();
        wb.worksheets.push(Worksheet::new("Sheet1"));
        wb
    }

    /// Create an empty workbook with no worksheets
    pub fn empty() -> Self {
        Self {
            worksheets: Vec::new(),
            settings: WorkbookSettings::default(),
            named_ranges: NamedRangeCollection::new(),
            supporting: Vec::new(),
        }
    }

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.worksheets.len()
    }

    /// Get a worksheet by index
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.worksheets.get(index)
    }

    /// Get a mutable worksheet by index
    pub fn worksheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.worksheets.get_mut(index)
    }

    /// Get the index of a worksheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.worksheets
            .iter()
            .position(|ws| ws.name().eq_ignore_ascii_case(name))
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.worksheets.iter()
    }

    /// Add a new worksheet with default name
    pub fn add_worksheet(&mut self) -> Result<usize> {
        let name = self.generate_sheet_name();
        self.add_worksheet_with_name(&name)
    }

    /// Add a new worksheet with specified name
    pub fn add_worksheet_with_name(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name)?;
        self.worksheets.push(Worksheet::new(name));
        Ok(self.worksheets.len() - 1)
    }

    /// Get workbook settings
    pub fn settings(&self) -> &WorkbookSettings {
        &self.settings
    }

    /// Get mutable workbook settings
    pub fn settings_mut(&mut self) -> &mut WorkbookSettings {
        &mut self.settings
    }

    /// Sheet bounds formulas in this workbook are evaluated against
    pub fn limits(&self) -> SheetLimits {
        SheetLimits::for_format(self.settings.biff8_limits)
    }

    // ==================== Named Ranges ====================

    /// Define a new workbook-scoped name, returning its index
    ///
    /// # Example
    /// ```
    /// use gridcalc_core::Workbook;
    ///
    /// let mut wb = Workbook::new();
    /// wb.define_name("TaxRate", "Sheet1!$B$1").unwrap();
    /// assert!(wb.named_ranges().get("taxrate", 0).is_some());
    /// ```
    pub fn define_name(&mut self, name: &str, refers_to: &str) -> Result<usize> {
        self.named_ranges
            .define(NamedRange::new(name, refers_to, NameScope::Workbook))
    }

    /// Define a sheet-scoped name, returning its index
    pub fn define_name_for_sheet(
        &mut self,
        name: &str,
        refers_to: &str,
        sheet_index: usize,
    ) -> Result<usize> {
        if sheet_index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(sheet_index, self.worksheets.len()));
        }
        self.named_ranges
            .define(NamedRange::new(name, refers_to, NameScope::Sheet(sheet_index)))
    }

    /// Get the named range collection (read-only)
    pub fn named_ranges(&self) -> &NamedRangeCollection {
        &self.named_ranges
    }

    // ==================== Supporting workbooks ====================

    /// Attach an external workbook that formulas can reference as `[name]Sheet!A1`
    pub fn add_supporting_workbook<S: Into<String>>(&mut self, name: S, workbook: Workbook) {
        let name = name.into();
        match self
            .supporting
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = workbook,
            None => self.supporting.push((name, workbook)),
        }
    }

    /// Look up a supporting workbook by file name (case-insensitive)
    pub fn supporting_workbook(&self, name: &str) -> Option<&Workbook> {
        self.supporting
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, wb)| wb)
    }

    /// Iterate over supporting workbooks with their file names
    pub fn supporting_workbooks(&self) -> impl Iterator<Item = (&str, &Workbook)> {
        self.supporting.iter().map(|(n, wb)| (n.as_str(), wb))
    }

    fn validate_sheet_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name too long (max {} characters)",
                MAX_SHEET_NAME_LEN
            )));
        }
        if let Some(c) = name.chars().find(|c| ":\\/?*[]".contains(*c)) {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name cannot contain '{}'",
                c
            )));
        }
        if self.sheet_index(name).is_some() {
            return Err(Error::DuplicateSheetName(name.into()));
        }
        Ok(())
    }

    fn generate_sheet_name(&self) -> String {
        (self.worksheets.len() + 1..)
            .map(|n| format!("Sheet{}", n))
            .find(|name| self.sheet_index(name).is_none())
            .unwrap_or_default()
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

/// Workbook-level settings
#[derive(Debug, Clone, Default)]
pub struct WorkbookSettings {
    /// Date system: false = 1900 (Windows), true = 1904 (Mac)
    pub date_1904: bool,
    /// Evaluate against the legacy 65 536 x 256 sheet bounds
    pub biff8_limits: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_workbook() {
        let wb = Workbook::new();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.worksheet(0).unwrap().name(), "Sheet1");
        assert_eq!(wb.limits(), SheetLimits::MODERN);
    }

    #[test]
    fn test_legacy_limits() {
        let mut wb = Workbook::new();
        wb.settings_mut().biff8_limits = true;
        assert_eq!(wb.limits(), SheetLimits::for_format(true));
        assert!(!wb.settings().date_1904);
    }

    #[test]
    fn test_add_worksheets() {
        let mut wb = Workbook::new();
        assert_eq!(wb.add_worksheet().unwrap(), 1);
        assert_eq!(wb.worksheet(1).unwrap().name(), "Sheet2");
        assert_eq!(wb.add_worksheet_with_name("Data").unwrap(), 2);
        assert_eq!(wb.sheet_index("DATA"), Some(2));
    }

    #[test]
    fn test_invalid_sheet_names() {
        let mut wb = Workbook::new();
        assert!(wb.add_worksheet_with_name("sheet1").is_err());
        assert!(wb.add_worksheet_with_name("").is_err());
        assert!(wb.add_worksheet_with_name("Sheet/1").is_err());
        assert!(wb.add_worksheet_with_name("Sheet[1]").is_err());
        assert!(wb.add_worksheet_with_name(&"A".repeat(MAX_SHEET_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_sheet_scoped_names_need_a_sheet() {
        let mut wb = Workbook::new();
        assert!(wb.define_name_for_sheet("Local", "1", 3).is_err());
        let idx = wb.define_name_for_sheet("Local", "1", 0).unwrap();
        assert_eq!(wb.named_ranges().by_index(idx).unwrap().name, "Local");
    }

    #[test]
    fn test_supporting_workbooks() {
        let mut wb = Workbook::new();
        let mut other = Workbook::new();
        other.add_worksheet_with_name("Rates").unwrap();
        wb.add_supporting_workbook("Prices.xlsx", other);

        let found = wb.supporting_workbook("prices.XLSX").unwrap();
        assert_eq!(found.sheet_index("rates"), Some(1));
        assert!(wb.supporting_workbook("missing.xlsx").is_none());
    }
}
