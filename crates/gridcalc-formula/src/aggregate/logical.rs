//! AND / OR reducers

use super::{visit_range, Aggregate, Reducer};
use crate::address::AddressRange;
use crate::coerce::text_to_boolean;
use crate::context::EvalContext;
use crate::error::FormulaResult;
use crate::value::{Array2D, Value};
use gridcalc_core::ErrorValue;
use std::ops::ControlFlow;

/// Logical AND (`is_and`) or OR over booleans and numbers.
///
/// The partial is `Empty` until a boolean-coercible value is seen. AND stops at the
/// first FALSE, OR at the first TRUE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logical {
    pub is_and: bool,
}

pub static AND: Logical = Logical { is_and: true };
pub static OR: Logical = Logical { is_and: false };

impl Logical {
    /// The value that decides the result on its own
    fn decisive(&self) -> bool {
        !self.is_and
    }

    fn combine(&self, acc: Value, b: bool) -> Value {
        match acc {
            Value::Boolean(a) if self.is_and => Value::Boolean(a && b),
            Value::Boolean(a) => Value::Boolean(a || b),
            _ => Value::Boolean(b),
        }
    }

    fn is_decided(&self, acc: &Value) -> bool {
        *acc == Value::Boolean(self.decisive())
    }

    fn cell_term(v: &Value, ignore_errors: bool) -> Result<Option<bool>, ErrorValue> {
        match v {
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Number(n) => Ok(Some(*n != 0.0)),
            Value::Error(_) if ignore_errors => Ok(None),
            Value::Error(e) => Err(*e),
            _ => Ok(None),
        }
    }

    fn literal(&self, v: Value) -> Value {
        match v {
            Value::Boolean(b) => Value::Boolean(b),
            Value::Number(n) => Value::Boolean(n != 0.0),
            Value::Missing => Value::Boolean(false),
            Value::Text(s) => match text_to_boolean(s.as_str()) {
                Some(b) => Value::Boolean(b),
                None => Value::Error(ErrorValue::Value),
            },
            Value::Error(e) => Value::Error(e),
            _ => Value::Empty,
        }
    }
}

impl Aggregate for Logical {
    fn agg(&self, cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value> {
        let ignore_errors = cx.state.ignore_errors;
        let mut acc = Value::Empty;
        visit_range(cx, range, |cell| {
            if let Some(b) = Self::cell_term(&cell.value, ignore_errors)? {
                acc = self.combine(std::mem::replace(&mut acc, Value::Empty), b);
                if self.is_decided(&acc) {
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(acc)
    }

    fn agg_values(&self, cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value> {
        if self.is_decided(&a) {
            return Ok(a);
        }
        if a.is_error() {
            return Ok(a);
        }
        let b = match b {
            Value::Array(arr) => self.agg_array(cx, &arr)?,
            other => self.literal(other),
        };
        Ok(match (a, b) {
            (_, Value::Error(e)) => Value::Error(e),
            (a, Value::Empty) => a,
            (a, Value::Boolean(x)) => self.combine(a, x),
            (_, _) => Value::Error(ErrorValue::Value),
        })
    }

    fn agg_array(&self, cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value> {
        let mut acc = Value::Empty;
        for v in array.iter() {
            if let Some(b) = Self::cell_term(v, cx.state.ignore_errors)? {
                acc = self.combine(acc, b);
                if self.is_decided(&acc) {
                    break;
                }
            }
        }
        Ok(acc)
    }
}

impl Reducer for Logical {
    fn identity(&self) -> Value {
        Value::Empty
    }

    fn finish(&self, partial: Value) -> Value {
        match partial {
            Value::Empty => Value::Error(ErrorValue::Value),
            v => v,
        }
    }

    fn as_aggregate(&self) -> &dyn Aggregate {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(AND.literal(Value::text("true")), Value::Boolean(true));
        assert_eq!(AND.literal(Value::text("x")), Value::Error(ErrorValue::Value));
        assert_eq!(OR.literal(Value::Number(0.0)), Value::Boolean(false));
    }

    #[test]
    fn test_short_circuit() {
        assert!(AND.is_decided(&Value::Boolean(false)));
        assert!(OR.is_decided(&Value::Boolean(true)));
        assert_eq!(AND.finish(Value::Empty), Value::Error(ErrorValue::Value));
    }
}
