//! Prelude module - common imports for gridcalc users
//!
//! ```rust
//! use gridcalc::prelude::*;
//! ```

pub use crate::{
    // Session types
    BookSession,
    // Calculation types
    CalculationOptions,
    CalculationStats,
    CellAddress,
    CellRange,
    // Cell types
    CellValue,
    ErrorValue,

    // Error types
    Error,
    Result,

    Value,
    // Main types
    Workbook,
    // Extension traits
    WorkbookCalculationExt,
    Worksheet,
};
