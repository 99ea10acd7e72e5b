//! Values produced while evaluating a token list

use crate::address::AddressList;
use gridcalc_core::{ErrorValue, SharedString};
use std::fmt;

/// The dynamically-typed result of an evaluation step
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(SharedString),
    Boolean(bool),
    Error(ErrorValue),
    /// An omitted optional argument, e.g. the second argument of `ROUND(1.5,)`
    Missing,
    /// A blank cell
    Empty,
    /// A rectangular grid of values (row-major)
    Array(Array2D),
    /// A partial result of a range reduction, combined further before it is finished
    Accumulator(Accumulator),
    /// A reference handed unevaluated to a user-defined function
    Reference(AddressList),
}

impl Value {
    /// Create a text value
    pub fn text<S: AsRef<str>>(s: S) -> Self {
        Value::Text(SharedString::new(s))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Get the error if this is one
    pub fn as_error(&self) -> Option<ErrorValue> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Blank cells and omitted arguments
    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Empty | Value::Missing)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Turn an error value into `Err`, so callers can use `?`
    pub fn check(self) -> Result<Value, ErrorValue> {
        match self {
            Value::Error(e) => Err(e),
            v => Ok(v),
        }
    }

    /// Name used by TYPE(): 1 number, 2 text, 4 logical, 16 error, 64 array
    pub fn type_code(&self) -> f64 {
        match self {
            Value::Number(_) | Value::Empty | Value::Missing => 1.0,
            Value::Text(_) => 2.0,
            Value::Boolean(_) => 4.0,
            Value::Error(_) => 16.0,
            Value::Array(_) | Value::Reference(_) => 64.0,
            Value::Accumulator(_) => 1.0,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

impl From<Array2D> for Value {
    fn from(a: Array2D) -> Self {
        Value::Array(a)
    }
}

impl From<Result<f64, ErrorValue>> for Value {
    fn from(r: Result<f64, ErrorValue>) -> Self {
        match r {
            Ok(n) => Value::Number(n),
            Err(e) => Value::Error(e),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", crate::coerce::number_to_text(*n)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Error(e) => write!(f, "{}", e),
            Value::Missing | Value::Empty => Ok(()),
            Value::Array(a) => write!(f, "{{{}x{}}}", a.rows(), a.cols()),
            Value::Accumulator(_) => write!(f, "#N/A"),
            Value::Reference(list) => write!(f, "{}", list),
        }
    }
}

/// Partial results of range reductions.
///
/// A reducer returns one of these from a range so that several ranges (or a range and
/// literal arguments) can be combined without scanning cells again.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Running sum and count
    Average { sum: f64, count: f64 },
    /// Number of matching cells
    Count(f64),
    /// Raw sum of squares
    SquareSum(f64),
    /// Running total of per-cell terms, e.g. squared deviations from a mean
    Total(f64),
    /// Every number seen, in traversal order (sorted when finished)
    Doubles(Vec<f64>),
}

/// A rectangular, row-major grid of values
#[derive(Debug, Clone, PartialEq)]
pub struct Array2D {
    rows: usize,
    cols: usize,
    data: Vec<Value>,
}

impl Array2D {
    /// A grid filled with one value
    pub fn filled(rows: usize, cols: usize, value: Value) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a grid from row-major data; `data.len()` must be `rows * cols`
    pub fn from_vec(rows: usize, cols: usize, data: Vec<Value>) -> Option<Self> {
        (rows > 0 && cols > 0 && data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// Build a grid from rows of equal length
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Option<Self> {
        let cols = rows.first()?.len();
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let n = rows.len();
        Self::from_vec(n, cols, rows.into_iter().flatten().collect())
    }

    /// A single column
    pub fn column(values: Vec<Value>) -> Option<Self> {
        let n = values.len();
        Self::from_vec(n, 1, values)
    }

    /// A single row
    pub fn row(values: Vec<Value>) -> Option<Self> {
        let n = values.len();
        Self::from_vec(1, n, values)
    }

    pub fn scalar(value: Value) -> Self {
        Self {
            rows: 1,
            cols: 1,
            data: vec![value],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        (row < self.rows && col < self.cols).then(|| &self.data[row * self.cols + col])
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    /// Element lookup with broadcasting: a dimension of length 1 repeats, any other
    /// out-of-range position is `#N/A`
    pub fn broadcast_get(&self, row: usize, col: usize) -> Value {
        let r = if self.rows == 1 { 0 } else { row };
        let c = if self.cols == 1 { 0 } else { col };
        self.get(r, c)
            .cloned()
            .unwrap_or(Value::Error(ErrorValue::Na))
    }

    /// Iterate in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.data.iter()
    }

    /// Consume into row-major values
    pub fn into_values(self) -> Vec<Value> {
        self.data
    }

    /// One row as a slice
    pub fn row_slice(&self, row: usize) -> &[Value] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// The top-left element
    pub fn first(&self) -> &Value {
        &self.data[0]
    }

    /// Apply a function to every element
    pub fn map(&self, mut f: impl FnMut(&Value) -> Value) -> Array2D {
        Array2D {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(&mut f).collect(),
        }
    }

    pub fn transpose(&self) -> Array2D {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                data.push(self.data[r * self.cols + c].clone());
            }
        }
        Array2D {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Result shape when broadcasting several operands together
    pub fn broadcast_shape<'a>(arrays: impl IntoIterator<Item = &'a Array2D>) -> (usize, usize) {
        arrays
            .into_iter()
            .fold((1, 1), |(r, c), a| (r.max(a.rows), c.max(a.cols)))
    }
}

/// Apply `f` element-wise over the operands. Scalars repeat; arrays combine with
/// broadcasting, and positions outside a shorter array are `#N/A`.
pub fn broadcast(args: &[Value], mut f: impl FnMut(&[Value]) -> Value) -> Value {
    if !args.iter().any(Value::is_array) {
        return f(args);
    }
    let arrays: Vec<Array2D> = args
        .iter()
        .map(|v| match v {
            Value::Array(a) => a.clone(),
            other => Array2D::scalar(other.clone()),
        })
        .collect();
    let (rows, cols) = Array2D::broadcast_shape(arrays.iter());
    let mut data = Vec::with_capacity(rows * cols);
    let mut element = Vec::with_capacity(arrays.len());
    for r in 0..rows {
        for c in 0..cols {
            element.clear();
            element.extend(arrays.iter().map(|a| a.broadcast_get(r, c)));
            data.push(f(&element));
        }
    }
    Array2D::from_vec(rows, cols, data).map_or(Value::Error(ErrorValue::Value), Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_requires_rectangle() {
        assert!(Array2D::from_rows(vec![vec![1.0.into()], vec![]]).is_none());
        let a = Array2D::from_rows(vec![
            vec![1.0.into(), 2.0.into()],
            vec![3.0.into(), 4.0.into()],
        ])
        .unwrap();
        assert_eq!(a.get(1, 0), Some(&Value::Number(3.0)));
        assert_eq!(a.transpose().get(0, 1), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_broadcast_scalars_and_arrays() {
        let v = broadcast(&[Value::Number(2.0), Value::Number(3.0)], |a| a[1].clone());
        assert_eq!(v, Value::Number(3.0));

        let row = Value::Array(Array2D::row(vec![1.0.into(), 2.0.into(), 3.0.into()]).unwrap());
        let pair = Value::Array(Array2D::row(vec![10.0.into(), 20.0.into()]).unwrap());
        let out = broadcast(&[row, pair], |a| a[1].clone());
        let Value::Array(out) = out else { panic!("expected array") };
        assert_eq!(out.get(0, 1), Some(&Value::Number(20.0)));
        assert_eq!(out.get(0, 2), Some(&Value::Error(ErrorValue::Na)));
    }

    #[test]
    fn test_broadcast_get() {
        let row = Array2D::row(vec![1.0.into(), 2.0.into()]).unwrap();
        assert_eq!(row.broadcast_get(5, 1), Value::Number(2.0));
        assert_eq!(row.broadcast_get(0, 2), Value::Error(ErrorValue::Na));

        let col = Array2D::column(vec![1.0.into(), 2.0.into(), 3.0.into()]).unwrap();
        assert_eq!(Array2D::broadcast_shape([&row, &col]), (3, 2));
    }
}
