//! Numeric reducers

use super::{visit_range, Aggregate, Reducer};
use crate::address::AddressRange;
use crate::coerce::to_number;
use crate::context::EvalContext;
use crate::error::{Calc, FormulaResult};
use crate::value::{Accumulator, Array2D, Value};
use gridcalc_core::ErrorValue;
use std::ops::ControlFlow;

/// The fold a [`Reduce`] performs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReduceOp {
    Sum,
    Average,
    Min,
    Max,
    Count,
    CountA,
    CountBlank,
    Product,
    /// Sum of squares; a range reduces to the root so that literal squaring restores it
    SumSq,
    /// Mean of logarithms
    GeoMean,
    /// Sum of reciprocals
    HarMean,
    /// `Σ(x-mean)^power`, or `Σ|x-mean|` when `absolute`
    Deviation { mean: f64, power: i32, absolute: bool },
}

/// A numeric reducer.
///
/// With `count_anything` (the "A" variants) booleans in ranges count as 0/1 and
/// text counts as 0; otherwise only numbers in ranges take part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduce {
    pub op: ReduceOp,
    pub count_anything: bool,
}

impl Reduce {
    pub const SUM: Reduce = Reduce::new(ReduceOp::Sum);
    pub const AVERAGE: Reduce = Reduce::new(ReduceOp::Average);
    pub const AVERAGE_A: Reduce = Reduce::new(ReduceOp::Average).anything();
    pub const MIN: Reduce = Reduce::new(ReduceOp::Min);
    pub const MIN_A: Reduce = Reduce::new(ReduceOp::Min).anything();
    pub const MAX: Reduce = Reduce::new(ReduceOp::Max);
    pub const MAX_A: Reduce = Reduce::new(ReduceOp::Max).anything();
    pub const COUNT: Reduce = Reduce::new(ReduceOp::Count);
    pub const COUNT_A: Reduce = Reduce::new(ReduceOp::CountA);
    pub const COUNT_BLANK: Reduce = Reduce::new(ReduceOp::CountBlank);
    pub const PRODUCT: Reduce = Reduce::new(ReduceOp::Product);
    pub const SUM_SQ: Reduce = Reduce::new(ReduceOp::SumSq);
    pub const GEO_MEAN: Reduce = Reduce::new(ReduceOp::GeoMean);
    pub const HAR_MEAN: Reduce = Reduce::new(ReduceOp::HarMean);

    pub const fn new(op: ReduceOp) -> Self {
        Self {
            op,
            count_anything: false,
        }
    }

    pub const fn anything(mut self) -> Self {
        self.count_anything = true;
        self
    }

    /// Squared (or higher power) deviations from a known mean
    pub fn deviation(mean: f64, power: i32, count_anything: bool) -> Self {
        Self {
            op: ReduceOp::Deviation {
                mean,
                power,
                absolute: false,
            },
            count_anything,
        }
    }

    /// Absolute deviations from a known mean
    pub fn abs_deviation(mean: f64, count_anything: bool) -> Self {
        Self {
            op: ReduceOp::Deviation {
                mean,
                power: 1,
                absolute: true,
            },
            count_anything,
        }
    }

    /// Whether a value already is a partial of this reducer
    fn is_partial(&self, v: &Value) -> bool {
        match (self.op, v) {
            (ReduceOp::Sum | ReduceOp::Min | ReduceOp::Max | ReduceOp::Product, Value::Number(_)) => {
                true
            }
            (
                ReduceOp::Average | ReduceOp::GeoMean | ReduceOp::HarMean,
                Value::Accumulator(Accumulator::Average { .. }),
            ) => true,
            (
                ReduceOp::Count | ReduceOp::CountA | ReduceOp::CountBlank,
                Value::Accumulator(Accumulator::Count(_)),
            ) => true,
            (ReduceOp::SumSq, Value::Accumulator(Accumulator::SquareSum(_))) => true,
            (ReduceOp::Deviation { .. }, Value::Accumulator(Accumulator::Total(_))) => true,
            _ => false,
        }
    }

    /// Fold one number into a partial
    fn push(&self, acc: Value, x: f64) -> Calc<Value> {
        let v = match (self.op, acc) {
            (ReduceOp::Sum, Value::Number(s)) => Value::Number(s + x),
            (ReduceOp::Average, Value::Accumulator(Accumulator::Average { sum, count })) => {
                average(sum + x, count + 1.0)
            }
            (ReduceOp::GeoMean, Value::Accumulator(Accumulator::Average { sum, count })) => {
                if x <= 0.0 {
                    return Err(ErrorValue::Num);
                }
                average(sum + x.ln(), count + 1.0)
            }
            (ReduceOp::HarMean, Value::Accumulator(Accumulator::Average { sum, count })) => {
                if x <= 0.0 {
                    return Err(ErrorValue::Num);
                }
                average(sum + 1.0 / x, count + 1.0)
            }
            (ReduceOp::Min, Value::Number(m)) => Value::Number(m.min(x)),
            (ReduceOp::Max, Value::Number(m)) => Value::Number(m.max(x)),
            (ReduceOp::Min | ReduceOp::Max | ReduceOp::Product, Value::Empty) => Value::Number(x),
            (ReduceOp::Product, Value::Number(p)) => Value::Number(p * x),
            (
                ReduceOp::Count | ReduceOp::CountA | ReduceOp::CountBlank,
                Value::Accumulator(Accumulator::Count(n)),
            ) => Value::Accumulator(Accumulator::Count(n + 1.0)),
            (ReduceOp::SumSq, Value::Accumulator(Accumulator::SquareSum(s))) => {
                Value::Accumulator(Accumulator::SquareSum(s + x * x))
            }
            (
                ReduceOp::Deviation {
                    mean,
                    power,
                    absolute,
                },
                Value::Accumulator(Accumulator::Total(t)),
            ) => {
                let d = x - mean;
                let term = if absolute { d.abs() } else { d.powi(power) };
                Value::Accumulator(Accumulator::Total(t + term))
            }
            (_, other) => other,
        };
        match &v {
            Value::Number(n) if !n.is_finite() => Err(ErrorValue::Num),
            _ => Ok(v),
        }
    }

    /// Combine two partials of this reducer
    fn merge(&self, a: Value, b: Value) -> Value {
        match (self.op, a, b) {
            (_, Value::Error(e), _) | (_, _, Value::Error(e)) => Value::Error(e),
            (ReduceOp::Sum, Value::Number(x), Value::Number(y)) => Value::Number(x + y),
            (ReduceOp::Product, Value::Number(x), Value::Number(y)) => Value::Number(x * y),
            (ReduceOp::Min, Value::Number(x), Value::Number(y)) => Value::Number(x.min(y)),
            (ReduceOp::Max, Value::Number(x), Value::Number(y)) => Value::Number(x.max(y)),
            (_, Value::Empty, other) | (_, other, Value::Empty) => other,
            (
                _,
                Value::Accumulator(Accumulator::Average { sum: s1, count: c1 }),
                Value::Accumulator(Accumulator::Average { sum: s2, count: c2 }),
            ) => average(s1 + s2, c1 + c2),
            (
                _,
                Value::Accumulator(Accumulator::Count(x)),
                Value::Accumulator(Accumulator::Count(y)),
            ) => Value::Accumulator(Accumulator::Count(x + y)),
            (
                _,
                Value::Accumulator(Accumulator::SquareSum(x)),
                Value::Accumulator(Accumulator::SquareSum(y)),
            ) => Value::Accumulator(Accumulator::SquareSum(x + y)),
            (
                _,
                Value::Accumulator(Accumulator::Total(x)),
                Value::Accumulator(Accumulator::Total(y)),
            ) => Value::Accumulator(Accumulator::Total(x + y)),
            (_, _, _) => Value::Error(ErrorValue::Value),
        }
    }

    /// What a cell of a range (or an element of an array) contributes:
    /// `Ok(None)` to skip it, `Err` to propagate its error
    fn cell_term(&self, v: &Value, ignore_errors: bool) -> Calc<Option<f64>> {
        match self.op {
            ReduceOp::Count => return Ok(matches!(v, Value::Number(_)).then_some(1.0)),
            ReduceOp::CountA => return Ok((!v.is_blank()).then_some(1.0)),
            ReduceOp::CountBlank => {
                let blank = match v {
                    Value::Empty | Value::Missing => true,
                    Value::Text(s) => s.is_empty(),
                    _ => false,
                };
                return Ok(blank.then_some(1.0));
            }
            _ => {}
        }
        match v {
            Value::Number(n) => Ok(Some(*n)),
            Value::Error(_) if ignore_errors => Ok(None),
            Value::Error(e) => Err(*e),
            Value::Boolean(b) if self.count_anything => Ok(Some(if *b { 1.0 } else { 0.0 })),
            Value::Text(_) if self.count_anything => Ok(Some(0.0)),
            _ => Ok(None),
        }
    }

    /// Turn an argument that did not come from a range into a partial
    fn literal(&self, cx: &EvalContext<'_>, v: Value) -> FormulaResult<Value> {
        let identity = self.identity();
        match (self.op, v) {
            (ReduceOp::Count, Value::Error(_)) => Ok(identity),
            (ReduceOp::CountA, Value::Empty) => Ok(identity),
            (ReduceOp::CountA, _) => Ok(self.push(identity, 1.0)?),
            (ReduceOp::CountBlank, v) => {
                let term = self.cell_term(&v, true)?;
                Ok(match term {
                    Some(x) => self.push(identity, x)?,
                    None => identity,
                })
            }
            (_, Value::Error(e)) => Ok(Value::Error(e)),
            (_, Value::Empty) => Ok(identity),
            (ReduceOp::Count, v) => Ok(match to_number(&v, cx.dates_1904()) {
                Ok(_) => self.push(identity, 1.0)?,
                Err(_) => identity,
            }),
            (_, v) => {
                let x = to_number(&v, cx.dates_1904())?;
                Ok(self.push(identity, x)?)
            }
        }
    }

    /// Bring any value to this reducer's partial form
    fn to_partial(&self, cx: &EvalContext<'_>, v: Value) -> FormulaResult<Value> {
        if self.is_partial(&v) {
            return Ok(v);
        }
        match v {
            Value::Array(a) => self.agg_array(cx, &a),
            Value::Accumulator(_) | Value::Reference(_) => Ok(Value::Error(ErrorValue::Value)),
            other => self.literal(cx, other),
        }
    }
}

fn average(sum: f64, count: f64) -> Value {
    Value::Accumulator(Accumulator::Average { sum, count })
}

impl Aggregate for Reduce {
    fn agg(&self, cx: &EvalContext<'_>, range: &AddressRange) -> FormulaResult<Value> {
        let ignore_errors = cx.state.ignore_errors;
        if self.op == ReduceOp::CountBlank {
            // only stored cells are visited, so count what is filled
            let r = range.ordered();
            let sheets = (r.last.sheet - r.first.sheet + 1) as f64;
            let total = sheets * r.row_count() as f64 * r.col_count() as f64;
            let mut filled = 0.0;
            visit_range(cx, range, |cell| {
                if self.cell_term(&cell.value, true)?.is_none() {
                    filled += 1.0;
                }
                Ok(ControlFlow::Continue(()))
            })?;
            return Ok(Value::Accumulator(Accumulator::Count(total - filled)));
        }
        let mut acc = self.identity();
        visit_range(cx, range, |cell| {
            if let Some(x) = self.cell_term(&cell.value, ignore_errors)? {
                acc = self.push(std::mem::replace(&mut acc, Value::Empty), x)?;
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(acc)
    }

    fn agg_values(&self, cx: &EvalContext<'_>, a: Value, b: Value) -> FormulaResult<Value> {
        let a = self.to_partial(cx, a)?;
        let b = self.to_partial(cx, b)?;
        Ok(self.merge(a, b))
    }

    fn agg_array(&self, cx: &EvalContext<'_>, array: &Array2D) -> FormulaResult<Value> {
        let ignore_errors = cx.state.ignore_errors;
        let mut acc = self.identity();
        for v in array.iter() {
            if let Some(x) = self.cell_term(v, ignore_errors)? {
                acc = self.push(acc, x)?;
            }
        }
        Ok(acc)
    }
}

impl Reducer for Reduce {
    fn identity(&self) -> Value {
        match self.op {
            ReduceOp::Sum => Value::Number(0.0),
            ReduceOp::Average | ReduceOp::GeoMean | ReduceOp::HarMean => average(0.0, 0.0),
            ReduceOp::Min | ReduceOp::Max | ReduceOp::Product => Value::Empty,
            ReduceOp::Count | ReduceOp::CountA | ReduceOp::CountBlank => {
                Value::Accumulator(Accumulator::Count(0.0))
            }
            ReduceOp::SumSq => Value::Accumulator(Accumulator::SquareSum(0.0)),
            ReduceOp::Deviation { .. } => Value::Accumulator(Accumulator::Total(0.0)),
        }
    }

    fn finish(&self, partial: Value) -> Value {
        let v = match (self.op, partial) {
            (_, Value::Error(e)) => Value::Error(e),
            (ReduceOp::Average, Value::Accumulator(Accumulator::Average { sum, count })) => {
                if count == 0.0 {
                    Value::Error(ErrorValue::Div0)
                } else {
                    Value::Number(sum / count)
                }
            }
            (ReduceOp::GeoMean, Value::Accumulator(Accumulator::Average { sum, count })) => {
                if count == 0.0 {
                    Value::Error(ErrorValue::Num)
                } else {
                    Value::Number((sum / count).exp())
                }
            }
            (ReduceOp::HarMean, Value::Accumulator(Accumulator::Average { sum, count })) => {
                if count == 0.0 {
                    Value::Error(ErrorValue::Num)
                } else {
                    Value::Number(count / sum)
                }
            }
            (_, Value::Accumulator(Accumulator::Count(n))) => Value::Number(n),
            (_, Value::Accumulator(Accumulator::SquareSum(s))) => Value::Number(s),
            (_, Value::Accumulator(Accumulator::Total(t))) => Value::Number(t),
            (_, Value::Empty) => Value::Number(0.0),
            (_, v) => v,
        };
        match v {
            Value::Number(n) if !n.is_finite() => Value::Error(ErrorValue::Num),
            v => v,
        }
    }

    fn as_aggregate(&self) -> &dyn Aggregate {
        self
    }
}
