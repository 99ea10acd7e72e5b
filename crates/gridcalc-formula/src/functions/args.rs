//! Argument handling shared by the function library

use super::FunctionDef;
use crate::address::AddressList;
use crate::aggregate::{
    reduce_args, reduce_partial, Aggregate, Reducer, ARRAY, COLLECT, COLLECT_A, ERR2,
};
use crate::coerce::{as_array, to_boolean, to_number, to_text, unwrap_singleton};
use crate::context::EvalContext;
use crate::error::{Calc, FormulaResult};
use crate::token_list::TokenList;
use crate::value::{broadcast, Accumulator, Array2D, Value};
use gridcalc_core::ErrorValue;

/// A function call being evaluated
pub struct FnCall<'a> {
    pub list: &'a TokenList,
    pub cx: EvalContext<'a>,
    /// Number of arguments the call was written with
    pub argc: usize,
    /// Aggregate the caller asked for
    pub agg: &'a dyn Aggregate,
    pub def: &'static FunctionDef,
}

impl<'a> FnCall<'a> {
    pub fn dates_1904(&self) -> bool {
        self.cx.dates_1904()
    }

    /// Pop every argument with the scalar aggregate, in written order
    pub fn values(&self) -> Vec<Value> {
        self.values_with(&ERR2)
    }

    /// Pop every argument with the given aggregate, in written order
    pub fn values_with(&self, agg: &dyn Aggregate) -> Vec<Value> {
        let mut out: Vec<Value> = (0..self.argc)
            .map(|_| self.list.evaluate_token(&self.cx, agg))
            .collect();
        out.reverse();
        out
    }

    /// Pop every argument as an array (ranges become snapshots, scalars 1x1 arrays)
    pub fn arrays(&self) -> Vec<Value> {
        self.values_with(&ARRAY)
    }

    /// Pop every argument in written order; those listed in `array_args` are read
    /// as arrays, the rest as scalars
    pub fn mixed(&self, array_args: &[usize]) -> Vec<Value> {
        let mut out: Vec<Value> = (0..self.argc)
            .rev()
            .map(|i| {
                let agg: &dyn Aggregate = if array_args.contains(&i) { &ARRAY } else { &ERR2 };
                self.list.evaluate_token(&self.cx, agg)
            })
            .collect();
        out.reverse();
        out
    }

    /// Pop every argument in written order; those listed in `range_args` are taken
    /// as references when they are one, and as arrays otherwise
    pub fn range_args(&self, range_args: &[usize]) -> Vec<RangeArg> {
        let mut out: Vec<RangeArg> = (0..self.argc)
            .rev()
            .map(|i| {
                if !range_args.contains(&i) {
                    return RangeArg::Value(self.list.evaluate_token(&self.cx, &ERR2));
                }
                let start = self.list.save_position();
                match self.list.evaluate_ref_token(&self.cx) {
                    Ok(list) => RangeArg::Ref(list),
                    Err(ErrorValue::Value) => {
                        self.list.restore_position(start);
                        RangeArg::Value(self.list.evaluate_token(&self.cx, &ARRAY))
                    }
                    Err(e) => RangeArg::Value(Value::Error(e)),
                }
            })
            .collect();
        out.reverse();
        out
    }

    /// Pop every argument as a reference
    pub fn refs(&self) -> Vec<Calc<AddressList>> {
        let mut out: Vec<_> = (0..self.argc)
            .map(|_| self.list.evaluate_ref_token(&self.cx))
            .collect();
        out.reverse();
        out
    }

    /// Reduce all arguments with a reducer and finish
    pub fn reduce(&self, reducer: &dyn Reducer) -> FormulaResult<Value> {
        reduce_args(self.list, &self.cx, self.argc, reducer)
    }

    /// The combined partial of all arguments, leaving the cursor where it was
    pub fn partial(&self, reducer: &dyn Reducer) -> FormulaResult<Value> {
        let start = self.list.save_position();
        let v = reduce_partial(self.list, &self.cx, self.argc, reducer);
        self.list.restore_position(start);
        v
    }

    /// Every number of the arguments, in order. With `count_anything`, booleans
    /// and text in ranges count as 0/1 and 0.
    pub fn collect(&self, count_anything: bool) -> FormulaResult<Vec<f64>> {
        let reducer = if count_anything { &COLLECT_A } else { &COLLECT };
        doubles(self.reduce(reducer)?)
    }

    /// Apply a numeric function element-wise. Arguments missing from the call (or
    /// written as empty) take their default; `None` defaults read as 0.
    pub fn numeric(
        &self,
        defaults: &[Option<f64>],
        f: impl Fn(&[f64]) -> Calc<f64>,
    ) -> FormulaResult<Value> {
        let mut args = self.values();
        let width = defaults.len().max(args.len());
        args.resize(width, Value::Missing);
        let dates_1904 = self.dates_1904();
        let mut nums = vec![0.0; width];
        Ok(broadcast(&args, |elems| {
            for (i, e) in elems.iter().enumerate() {
                nums[i] = match e {
                    Value::Missing => defaults.get(i).copied().flatten().unwrap_or(0.0),
                    other => match to_number(other, dates_1904) {
                        Ok(x) => x,
                        Err(err) => return Value::Error(err),
                    },
                };
            }
            f(&nums).into()
        }))
    }
}

/// An argument that may be a reference
#[derive(Debug, Clone)]
pub enum RangeArg {
    Ref(AddressList),
    Value(Value),
}

impl RangeArg {
    /// The value of a non-reference argument; references read as `#VALUE!`
    pub fn value(&self) -> Value {
        match self {
            RangeArg::Value(v) => v.clone(),
            RangeArg::Ref(_) => Value::Error(ErrorValue::Value),
        }
    }
}

/// Samples gathered by a collecting reducer
pub(crate) fn doubles(v: Value) -> FormulaResult<Vec<f64>> {
    match v {
        Value::Accumulator(Accumulator::Doubles(d)) => Ok(d),
        Value::Error(e) => Err(e.into()),
        _ => Err(ErrorValue::Value.into()),
    }
}

/// A scalar argument as a number; a missing argument reads as `default`
pub(crate) fn number_or(v: &Value, default: f64, dates_1904: bool) -> Calc<f64> {
    match v {
        Value::Missing => Ok(default),
        other => to_number(&unwrap_singleton(other.clone()), dates_1904),
    }
}

pub(crate) fn number(v: &Value, dates_1904: bool) -> Calc<f64> {
    number_or(v, 0.0, dates_1904)
}

/// An optional argument at `index`
pub(crate) fn opt_number(args: &[Value], index: usize, default: f64, dates_1904: bool) -> Calc<f64> {
    match args.get(index) {
        None => Ok(default),
        Some(v) => number_or(v, default, dates_1904),
    }
}

pub(crate) fn boolean_or(v: Option<&Value>, default: bool) -> Calc<bool> {
    match v {
        None | Some(Value::Missing) => Ok(default),
        Some(other) => to_boolean(&unwrap_singleton(other.clone())),
    }
}

/// A scalar argument as text; errors propagate
pub(crate) fn text(v: &Value) -> Calc<String> {
    match unwrap_singleton(v.clone()) {
        Value::Error(e) => Err(e),
        Value::Array(a) => match a.first() {
            Value::Error(e) => Err(*e),
            other => Ok(to_text(other)),
        },
        other => Ok(to_text(&other)),
    }
}

/// An argument as an array, failing on errors
pub(crate) fn array(v: Value) -> Calc<Array2D> {
    match v {
        Value::Error(e) => Err(e),
        other => Ok(as_array(other)),
    }
}

/// Numbers of an array, skipping non-numeric elements and propagating errors
pub(crate) fn array_numbers(a: &Array2D) -> Calc<Vec<f64>> {
    let mut out = Vec::with_capacity(a.len());
    for v in a.iter() {
        match v {
            Value::Number(n) => out.push(*n),
            Value::Error(e) => return Err(*e),
            _ => {}
        }
    }
    Ok(out)
}

/// Numbers of two same-shaped arrays taken in pairs where both are numbers
pub(crate) fn paired_numbers(a: &Array2D, b: &Array2D) -> Calc<(Vec<f64>, Vec<f64>)> {
    if a.len() != b.len() {
        return Err(ErrorValue::Na);
    }
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (x, y) in a.iter().zip(b.iter()) {
        if let Value::Error(e) = x {
            return Err(*e);
        }
        if let Value::Error(e) = y {
            return Err(*e);
        }
        if let (Value::Number(x), Value::Number(y)) = (x, y) {
            xs.push(*x);
            ys.push(*y);
        }
    }
    Ok((xs, ys))
}

/// Check that a number is a finite result
pub(crate) fn finite(x: f64) -> Calc<f64> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(ErrorValue::Num)
    }
}
