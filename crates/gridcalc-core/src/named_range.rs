//! Defined names
//!
//! Names are case-insensitive and either workbook-wide or local to one sheet. Each
//! definition gets a stable index when it is defined; compiled formulas refer to names
//! by that index, so removing a name leaves a hole rather than renumbering the rest.
//!
//! ```text
//! TaxRate   -> Sheet1!$B$1
//! Sales     -> Sheet1!$A$2:$A$100
//! Margin    -> =Sales*0.2
//! ```

use ahash::AHashMap;

use crate::error::{Error, Result};

/// Scope of a named range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScope {
    /// Available throughout the workbook (global)
    Workbook,
    /// Scoped to a specific sheet (0-based index)
    Sheet(usize),
}

/// A named range definition
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRange {
    /// The name as written by the user
    pub name: String,
    /// Scope of this name
    pub scope: NameScope,
    /// Formula text the name stands for, with or without a leading `=`
    pub refers_to: String,
    /// Whether this name is hidden from the UI
    pub hidden: bool,
}

impl NamedRange {
    /// Create a new named range
    pub fn new(name: impl Into<String>, refers_to: impl Into<String>, scope: NameScope) -> Self {
        Self {
            name: name.into(),
            scope,
            refers_to: refers_to.into(),
            hidden: false,
        }
    }

    /// Create a workbook-scoped named range
    pub fn workbook_scope(name: impl Into<String>, refers_to: impl Into<String>) -> Self {
        Self::new(name, refers_to, NameScope::Workbook)
    }

    /// Create a sheet-scoped named range
    pub fn sheet_scope(
        name: impl Into<String>,
        refers_to: impl Into<String>,
        sheet_index: usize,
    ) -> Self {
        Self::new(name, refers_to, NameScope::Sheet(sheet_index))
    }

    /// The definition without a leading `=`
    pub fn expression(&self) -> &str {
        self.refers_to.strip_prefix('=').unwrap_or(&self.refers_to)
    }
}

/// Check that a string is usable as a defined name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '\\');
    first_ok
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !looks_like_cell_reference(name)
        && !name.eq_ignore_ascii_case("TRUE")
        && !name.eq_ignore_ascii_case("FALSE")
}

fn looks_like_cell_reference(name: &str) -> bool {
    let letters = name.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let rest = &name[letters..];
    (1..=3).contains(&letters) && !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Collection of defined names with stable indices
#[derive(Debug, Default, Clone)]
pub struct NamedRangeCollection {
    entries: Vec<Option<NamedRange>>,
    lookup: AHashMap<(String, NameScope), usize>,
}

impl NamedRangeCollection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, scope: NameScope) -> (String, NameScope) {
        (name.to_lowercase(), scope)
    }

    /// Define a new name, returning its index.
    ///
    /// Fails if the name is not valid or already exists in this scope.
    pub fn define(&mut self, range: NamedRange) -> Result<usize> {
        if !is_valid_name(&range.name) {
            return Err(Error::InvalidName(range.name));
        }
        let key = Self::key(&range.name, range.scope);
        if self.lookup.contains_key(&key) {
            return Err(Error::InvalidName(format!(
                "'{}' already exists in this scope",
                range.name
            )));
        }
        let index = self.entries.len();
        self.entries.push(Some(range));
        self.lookup.insert(key, index);
        Ok(index)
    }

    /// Define a name or replace its definition, keeping the index of an existing name
    pub fn define_or_update(&mut self, range: NamedRange) -> Result<usize> {
        let key = Self::key(&range.name, range.scope);
        match self.lookup.get(&key) {
            Some(&index) => {
                self.entries[index] = Some(range);
                Ok(index)
            }
            None => self.define(range),
        }
    }

    /// Resolve a name as seen from a sheet: a sheet-local name wins over a global one
    pub fn find(&self, name: &str, current_sheet: usize) -> Option<usize> {
        self.lookup
            .get(&Self::key(name, NameScope::Sheet(current_sheet)))
            .or_else(|| self.lookup.get(&Self::key(name, NameScope::Workbook)))
            .copied()
    }

    /// Get a named range by name and current sheet context
    pub fn get(&self, name: &str, current_sheet: usize) -> Option<&NamedRange> {
        self.find(name, current_sheet).and_then(|i| self.by_index(i))
    }

    /// Get a definition by its index
    pub fn by_index(&self, index: usize) -> Option<&NamedRange> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Remove a named range. Its index is not reused.
    pub fn remove(&mut self, name: &str, scope: NameScope) -> Option<NamedRange> {
        let index = self.lookup.remove(&Self::key(name, scope))?;
        self.entries.get_mut(index).and_then(Option::take)
    }

    /// Iterate over live definitions with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &NamedRange)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|r| (i, r)))
    }

    /// Number of live definitions
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_strips_equals() {
        let nr = NamedRange::workbook_scope("Total", "=SUM(A1:A10)");
        assert_eq!(nr.expression(), "SUM(A1:A10)");
        assert_eq!(NamedRange::workbook_scope("Rate", "0.05").expression(), "0.05");
    }

    #[test]
    fn test_collection_scope_lookup() {
        let mut coll = NamedRangeCollection::new();
        let global = coll.define(NamedRange::workbook_scope("Rate", "0.05")).unwrap();
        let local = coll.define(NamedRange::sheet_scope("Rate", "0.08", 0)).unwrap();

        assert_eq!(coll.find("rate", 0), Some(local));
        assert_eq!(coll.find("RATE", 1), Some(global));
        assert_eq!(coll.get("Rate", 1).unwrap().refers_to, "0.05");
        assert!(coll.define(NamedRange::workbook_scope("RATE", "0.10")).is_err());
    }

    #[test]
    fn test_indices_are_stable() {
        let mut coll = NamedRangeCollection::new();
        let a = coll.define(NamedRange::workbook_scope("Alpha", "1")).unwrap();
        let b = coll.define(NamedRange::workbook_scope("Beta", "2")).unwrap();
        assert!(coll.remove("alpha", NameScope::Workbook).is_some());
        assert_eq!(coll.by_index(a), None);
        assert_eq!(coll.by_index(b).unwrap().name, "Beta");
        assert_eq!(coll.define_or_update(NamedRange::workbook_scope("beta", "3")).unwrap(), b);
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("TaxRate"));
        assert!(is_valid_name("_tmp.1"));
        assert!(!is_valid_name("A1"));
        assert!(!is_valid_name("XFD100"));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("true"));
        assert!(is_valid_name("ABCD1"));
    }
}
