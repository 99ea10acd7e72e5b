//! Collecting reducer for order statistics

use super::{visit_range, Aggregate, Reducer};
use crate::address::AddressRange;
use crate::coerce::to_number;
use crate::context::EvalContext;
use crate::error::FormulaResult;
use crate::value::{Accumulator, Array2D, Value};
use gridcalc_core::ErrorValue;
use std::ops::ControlFlow;

/// Gathers every number into an [`Accumulator::Doubles`] list, in argument order.
/// MEDIAN, MODE, PERCENTILE, QUARTILE, LARGE, SMALL, RANK, FREQUENCY and the
/// variance family read their samples through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collect {
    pub count_anything: bool,
}

pub static COLLECT: Collect = Collect {
    count_anything: false,
};
pub static COLLECT_A: Collect = Collect {
    count_anything: true,
};

impl Collect {
    fn cell_term(&self, v: &Value, ignore_errors: bool) -> Result<Option<f64>, ErrorValue> {
        match v {
            Value::Number(n) => Ok(Some(*n)),
            Value::Error(_) if ignore_errors => Ok(None),
            Value::Error(e) => Err(*e),
            Value::Boolean(b) if self.count_anything => Ok(Some(if *b { 1.0 } else { 0.0 })),
            Value::Text(_) if self.count_anything => Ok(Some(0.0)),
            _ => Ok(None),
        }
    }

    fn into_doubles(&self, cx: &EvalContext<'_>, v: Value) -> FormulaResult<Vec<f64>> {
        match v {
            Value::Accumulator(Accumulator::Doubles(d)) => Ok(d),
            Value::Array(a) => match self.agg_array(cx, &a)? {
                Value::Accumulator(Accumulator::Doubles(d)) => Ok(d),
                _ => Ok(Vec::new()),
            },
            Value::Empty => Ok(Vec::new()),
            Value::Error(e) => Err(e.into()),
            Value::Accumulator(_) | Value::Reference(_) => Err(ErrorValue::Value.into()),
            other => Ok(vec![to_number(&other, cx.dates_1904())?]),
        }
    }
}

fn doubles(d: Vec<f64>) -> Value {
    Value::Accumulator(Accumulator::Doubles(d))
}

impl Aggregate for Collect {
    fn agg(&self, cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value> {
        let ignore_errors = cx.state.ignore_errors;
        let mut out = Vec::new();
        visit_range(cx, range, |cell| {
            if let Some(x) = self.cell_term(&cell.value, ignore_errors)? {
                out.push(x);
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(doubles(out))
    }

    fn agg_values(&self, cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value> {
        let mut a = self.into_doubles(cx, a)?;
        a.extend(self.into_doubles(cx, b)?);
        Ok(doubles(a))
    }

    fn agg_array(&self, cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value> {
        let mut out = Vec::with_capacity(array.len());
        for v in array.iter() {
            if let Some(x) = self.cell_term(v, cx.state.ignore_errors)? {
                out.push(x);
            }
        }
        Ok(doubles(out))
    }
}

impl Reducer for Collect {
    fn identity(&self) -> Value {
        doubles(Vec::new())
    }

    fn finish(&self, partial: Value) -> Value {
        partial
    }

    fn as_aggregate(&self) -> &dyn Aggregate {
        self
    }
}
