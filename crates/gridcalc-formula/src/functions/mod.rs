//! Built-in functions
//!
//! Every function is a plain `fn(&FnCall) -> FormulaResult<Value>`. A call pops its
//! own arguments from the token list, choosing the aggregate each argument is
//! reduced with; this is how SUM reads a range as a sum while IF skips the branch it
//! does not take. Reference-returning functions (OFFSET, INDEX, INDIRECT, IF,
//! CHOOSE) also provide a `reference` implementation.

mod args;
pub mod conditional;
pub mod criteria;
pub mod database;
pub mod date;
pub mod distributions;
pub mod financial;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod reference;
pub mod statistical;
pub mod subtotal;
pub mod text;
pub mod what_if;

pub use args::{FnCall, RangeArg};

use crate::address::AddressList;
use crate::error::FormulaResult;
use crate::value::Value;
use ahash::AHashMap;
use std::sync::OnceLock;

/// Function implementation signature
pub type FunctionImpl = for<'a> fn(&FnCall<'a>) -> FormulaResult<Value>;

/// Implementation of a function evaluated as a reference
pub type ReferenceImpl = for<'a> fn(&FnCall<'a>) -> FormulaResult<AddressList>;

/// Function definition
pub struct FunctionDef {
    /// Index in the registry, stored in function tokens
    pub id: usize,
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Implementation when the call must yield a reference
    pub reference: Option<ReferenceImpl>,
    /// Is volatile (recalculates every time)
    pub volatile: bool,
}

impl std::fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("volatile", &self.volatile)
            .finish()
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: Vec<FunctionDef>,
    by_name: AHashMap<&'static str, usize>,
}

static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// The registry of built-in functions
pub fn registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: Vec::new(),
            by_name: AHashMap::new(),
        };

        math::register(&mut registry);
        statistical::register(&mut registry);
        distributions::register(&mut registry);
        conditional::register(&mut registry);
        logical::register(&mut registry);
        info::register(&mut registry);
        lookup::register(&mut registry);
        reference::register(&mut registry);
        text::register(&mut registry);
        date::register(&mut registry);
        financial::register(&mut registry);
        database::register(&mut registry);
        subtotal::register(&mut registry);

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.id_of(name).map(|id| &self.functions[id])
    }

    /// Registry id of a function name
    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name.to_uppercase().as_str()).copied()
    }

    pub fn by_id(&self, id: usize) -> Option<&FunctionDef> {
        self.functions.get(id)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Register a function; a later registration of the same name wins
    pub fn register(&mut self, mut def: FunctionDef) -> usize {
        if let Some(&id) = self.by_name.get(def.name) {
            def.id = id;
            self.functions[id] = def;
            return id;
        }
        let id = self.functions.len();
        def.id = id;
        self.by_name.insert(def.name, id);
        self.functions.push(def);
        id
    }

    pub(crate) fn add(
        &mut self,
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) {
        self.register(FunctionDef {
            id: 0,
            name,
            min_args,
            max_args,
            implementation,
            reference: None,
            volatile: false,
        });
    }

    pub(crate) fn add_volatile(
        &mut self,
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) {
        self.register(FunctionDef {
            id: 0,
            name,
            min_args,
            max_args,
            implementation,
            reference: None,
            volatile: true,
        });
    }

    pub(crate) fn add_reference(
        &mut self,
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
        reference: ReferenceImpl,
        volatile: bool,
    ) {
        self.register(FunctionDef {
            id: 0,
            name,
            min_args,
            max_args,
            implementation,
            reference: Some(reference),
            volatile,
        });
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let r = registry();
        let sum = r.get("sum").unwrap();
        assert_eq!(sum.name, "SUM");
        assert_eq!(r.by_id(sum.id).unwrap().name, "SUM");
        assert!(r.get("NO.SUCH.FUNCTION").is_none());
    }

    #[test]
    fn test_volatile_functions() {
        let r = registry();
        for name in ["RAND", "NOW", "TODAY", "OFFSET", "INDIRECT"] {
            assert!(r.get(name).unwrap().volatile, "{} should be volatile", name);
        }
        assert!(!r.get("SUM").unwrap().volatile);
    }

    #[test]
    fn test_reference_functions() {
        let r = registry();
        for name in ["OFFSET", "INDEX", "INDIRECT", "IF", "CHOOSE"] {
            assert!(r.get(name).unwrap().reference.is_some(), "{}", name);
        }
    }
}
