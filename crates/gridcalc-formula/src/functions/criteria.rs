//! Criteria matching for SUMIF, COUNTIF, AVERAGEIF, the *IFS family and the
//! database functions
//!
//! A criterion can be:
//! - a number, boolean or error: equality with a value of the same kind
//! - text: case-insensitive equality, with `*` and `?` wildcards (`~` escapes them)
//! - text starting with a comparison operator: `">5"`, `">=10"`, `"<>0"`, `"<b"`, `"="`
//! - empty text: matches blank cells

use crate::coerce::{compare_text, text_to_boolean, text_to_number};
use crate::value::Value;
use gridcalc_core::ErrorValue;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Operand {
    Number(f64),
    Boolean(bool),
    Error(ErrorValue),
    /// Lowercased text, and the compiled pattern when it had wildcards
    Text(String, Option<Regex>),
    Blank,
}

/// One compiled criterion
#[derive(Debug, Clone)]
pub struct ValueCriteria {
    op: CompareOp,
    operand: Operand,
}

impl ValueCriteria {
    /// Compile a criterion value
    pub fn new(criteria: &Value, dates_1904: bool) -> Self {
        let operand = match criteria {
            Value::Number(n) => Operand::Number(*n),
            Value::Boolean(b) => Operand::Boolean(*b),
            Value::Error(e) => Operand::Error(*e),
            Value::Text(s) => return Self::parse(s.as_str(), dates_1904),
            Value::Array(a) => return Self::new(a.first(), dates_1904),
            Value::Empty | Value::Missing => Operand::Number(0.0),
            Value::Accumulator(_) | Value::Reference(_) => Operand::Error(ErrorValue::Value),
        };
        Self {
            op: CompareOp::Eq,
            operand,
        }
    }

    fn parse(text: &str, dates_1904: bool) -> Self {
        let (op, rest) = if let Some(rest) = text.strip_prefix(">=") {
            (CompareOp::Ge, rest)
        } else if let Some(rest) = text.strip_prefix("<=") {
            (CompareOp::Le, rest)
        } else if let Some(rest) = text.strip_prefix("<>") {
            (CompareOp::Ne, rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (CompareOp::Gt, rest)
        } else if let Some(rest) = text.strip_prefix('<') {
            (CompareOp::Lt, rest)
        } else if let Some(rest) = text.strip_prefix('=') {
            (CompareOp::Eq, rest)
        } else {
            (CompareOp::Eq, text)
        };

        let operand = if rest.is_empty() {
            Operand::Blank
        } else if let Some(n) = text_to_number(rest.trim(), dates_1904) {
            Operand::Number(n)
        } else if let Some(b) = text_to_boolean(rest) {
            Operand::Boolean(b)
        } else if let Some(e) = ErrorValue::parse(rest.trim()) {
            Operand::Error(e)
        } else {
            let lower = rest.to_lowercase();
            let pattern = if matches!(op, CompareOp::Eq | CompareOp::Ne) {
                wildcard_regex(&lower)
            } else {
                None
            };
            Operand::Text(lower, pattern)
        };
        Self { op, operand }
    }

    /// Whether a cell value satisfies the criterion
    pub fn matches(&self, value: &Value) -> bool {
        match self.op {
            CompareOp::Eq => self.equals(value),
            CompareOp::Ne => !self.equals(value),
            op => match self.ordering(value) {
                Some(ord) => match op {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
                None => false,
            },
        }
    }

    /// Whether a blank cell satisfies the criterion (blank cells need a full scan)
    pub fn matches_blank(&self) -> bool {
        self.matches(&Value::Empty)
    }

    fn equals(&self, value: &Value) -> bool {
        match (&self.operand, value) {
            (Operand::Blank, Value::Empty | Value::Missing) => true,
            (Operand::Blank, Value::Text(s)) => s.is_empty(),
            (Operand::Number(n), Value::Number(v)) => (n - v).abs() < 1e-12 * n.abs().max(1.0),
            (Operand::Boolean(b), Value::Boolean(v)) => b == v,
            (Operand::Error(e), Value::Error(v)) => e == v,
            (Operand::Text(t, pattern), Value::Text(s)) => match pattern {
                Some(re) => re.is_match(s.as_str()),
                None => compare_text(t, s.as_str()) == Ordering::Equal,
            },
            _ => false,
        }
    }

    fn ordering(&self, value: &Value) -> Option<Ordering> {
        match (&self.operand, value) {
            (Operand::Number(n), Value::Number(v)) => v.partial_cmp(n),
            (Operand::Text(t, _), Value::Text(s)) => Some(compare_text(s.as_str(), t)),
            (Operand::Boolean(b), Value::Boolean(v)) => Some(v.cmp(b)),
            _ => None,
        }
    }
}

/// Compile a wildcard pattern; `None` when it has no wildcards
pub(crate) fn wildcard_regex(pattern: &str) -> Option<Regex> {
    if !pattern.contains(['*', '?']) {
        return None;
    }
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '~' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
                None => re.push('~'),
            },
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(v: Value) -> ValueCriteria {
        ValueCriteria::new(&v, false)
    }

    #[test]
    fn test_number_criteria() {
        let matcher = criteria(Value::Number(5.0));
        assert!(matcher.matches(&Value::Number(5.0)));
        assert!(!matcher.matches(&Value::Number(4.0)));
        assert!(!matcher.matches(&Value::text("5")));
        assert!(!matcher.matches_blank());
    }

    #[test]
    fn test_comparison_criteria() {
        let matcher = criteria(Value::text(">5"));
        assert!(matcher.matches(&Value::Number(6.0)));
        assert!(!matcher.matches(&Value::Number(5.0)));
        assert!(!matcher.matches(&Value::text("7")));

        let matcher = criteria(Value::text("<=5"));
        assert!(matcher.matches(&Value::Number(5.0)));
        assert!(!matcher.matches(&Value::Number(6.0)));

        let matcher = criteria(Value::text("<>5"));
        assert!(matcher.matches(&Value::Number(6.0)));
        assert!(!matcher.matches(&Value::Number(5.0)));
        assert!(matcher.matches(&Value::text("x")));
        assert!(matcher.matches_blank());

        let matcher = criteria(Value::text(">b"));
        assert!(matcher.matches(&Value::text("Cat")));
        assert!(!matcher.matches(&Value::text("apple")));
        assert!(!matcher.matches(&Value::Number(100.0)));
    }

    #[test]
    fn test_text_and_wildcards() {
        let matcher = criteria(Value::text("apple"));
        assert!(matcher.matches(&Value::text("APPLE")));
        assert!(!matcher.matches(&Value::text("apples")));

        let matcher = criteria(Value::text("a*e"));
        assert!(matcher.matches(&Value::text("Apple")));
        assert!(matcher.matches(&Value::text("ae")));
        assert!(!matcher.matches(&Value::text("apples")));

        let matcher = criteria(Value::text("?at"));
        assert!(matcher.matches(&Value::text("cat")));
        assert!(!matcher.matches(&Value::text("at")));

        let matcher = criteria(Value::text("what~?"));
        assert!(matcher.matches(&Value::text("what?")));
        assert!(!matcher.matches(&Value::text("whats")));

        let matcher = criteria(Value::text("<>a*"));
        assert!(!matcher.matches(&Value::text("abc")));
        assert!(matcher.matches(&Value::text("xyz")));
    }

    #[test]
    fn test_blank_boolean_and_error_criteria() {
        let matcher = criteria(Value::text(""));
        assert!(matcher.matches_blank());
        assert!(matcher.matches(&Value::text("")));
        assert!(!matcher.matches(&Value::Number(0.0)));

        let matcher = criteria(Value::text("<>"));
        assert!(!matcher.matches_blank());
        assert!(matcher.matches(&Value::Number(0.0)));

        let matcher = criteria(Value::text("TRUE"));
        assert!(matcher.matches(&Value::Boolean(true)));
        assert!(!matcher.matches(&Value::Number(1.0)));

        let matcher = criteria(Value::text("#N/A"));
        assert!(matcher.matches(&Value::Error(ErrorValue::Na)));
        assert!(!matcher.matches(&Value::Error(ErrorValue::Div0)));
    }

    #[test]
    fn test_number_text_criteria() {
        let matcher = criteria(Value::text("=1,000"));
        assert!(matcher.matches(&Value::Number(1000.0)));
        let matcher = criteria(Value::text(">=50%"));
        assert!(matcher.matches(&Value::Number(0.5)));
        assert!(!matcher.matches(&Value::Number(0.49)));
    }
}
