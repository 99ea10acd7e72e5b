//! Formula error types

use gridcalc_core::ErrorValue;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Result of a numeric primitive: either a value or the spreadsheet error it produces
pub type Calc<T> = std::result::Result<T, ErrorValue>;

/// Errors that can occur during formula parsing or evaluation
///
/// Only [`TokenList::evaluate_token`](crate::TokenList::evaluate_token) turns these into
/// values; inside a token they short-circuit with `?`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// A spreadsheet error value produced by a calculation
    #[error("{0}")]
    Cell(ErrorValue),

    /// The token list does not hold enough operands for a token
    #[error("Malformed token list: {0}")]
    Malformed(String),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// A defined name refers back to itself
    #[error("Circular reference through name {0}")]
    CircularName(String),

    /// The calculation was cancelled
    #[error("Calculation aborted")]
    Aborted,

    /// A numeric result does not fit the representable range
    #[error("Numeric overflow")]
    Overflow,

    /// Text could not be read as a number
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FormulaError {
    /// The error value a failed evaluation step yields
    pub fn to_error_value(&self) -> ErrorValue {
        match self {
            FormulaError::Cell(e) => *e,
            FormulaError::Overflow => ErrorValue::Num,
            FormulaError::InvalidNumber(_) | FormulaError::ArgumentCount { .. } => {
                ErrorValue::Value
            }
            FormulaError::UnknownFunction(_)
            | FormulaError::CircularName(_)
            | FormulaError::Parse(_) => ErrorValue::Name,
            FormulaError::Malformed(_) | FormulaError::Aborted => ErrorValue::Na,
        }
    }
}

impl From<ErrorValue> for FormulaError {
    fn from(e: ErrorValue) -> Self {
        FormulaError::Cell(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_value_mapping() {
        assert_eq!(FormulaError::Cell(ErrorValue::Div0).to_error_value(), ErrorValue::Div0);
        assert_eq!(FormulaError::Overflow.to_error_value(), ErrorValue::Num);
        assert_eq!(
            FormulaError::InvalidNumber("x".into()).to_error_value(),
            ErrorValue::Value
        );
        assert_eq!(
            FormulaError::CircularName("Loop".into()).to_error_value(),
            ErrorValue::Name
        );
        assert_eq!(FormulaError::Aborted.to_error_value(), ErrorValue::Na);
        assert_eq!(
            FormulaError::Malformed("underflow".into()).to_error_value(),
            ErrorValue::Na
        );
    }
}
