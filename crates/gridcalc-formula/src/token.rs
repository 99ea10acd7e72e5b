//! Tokens of a postfix formula

use crate::context::WorkbookInfo;
use crate::value::Array2D;
use gridcalc_core::{ErrorValue, SharedString};
use std::fmt;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `x%`
    Percent,
}

/// Binary operators, including the reference operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Space: the overlap of two references
    Intersect,
    /// Comma inside parentheses: a multi-area reference
    Union,
    /// Colon: the bounding box of two references
    Range,
}

impl BinaryOp {
    pub fn is_reference_op(self) -> bool {
        matches!(self, BinaryOp::Intersect | BinaryOp::Union | BinaryOp::Range)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Intersect => " ",
            BinaryOp::Union => ",",
            BinaryOp::Range => ":",
        };
        f.write_str(s)
    }
}

/// One coordinate of a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefCoord {
    /// Fixed 1-based row or column (`$A$1`)
    Absolute(u32),
    /// Offset from the formula's own cell (`A1` typed into `B2` is -1, -1)
    Relative(i32),
}

impl RefCoord {
    /// Resolve against the host coordinate. Relative offsets wrap around the sheet,
    /// so one row above row 1 is the last row.
    pub fn resolve(self, base: u32, max: u32) -> u32 {
        match self {
            RefCoord::Absolute(v) => v,
            RefCoord::Relative(d) => {
                let m = i64::from(max.max(1));
                let zero_based = (i64::from(base) - 1 + i64::from(d)).rem_euclid(m);
                (zero_based + 1) as u32
            }
        }
    }

    pub fn is_relative(self) -> bool {
        matches!(self, RefCoord::Relative(_))
    }
}

/// A cell reference as written in a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: RefCoord,
    pub col: RefCoord,
}

impl CellRef {
    pub fn new(row: RefCoord, col: RefCoord) -> Self {
        Self { row, col }
    }

    pub fn absolute(row: u32, col: u32) -> Self {
        Self::new(RefCoord::Absolute(row), RefCoord::Absolute(col))
    }

    /// A reference to `(row, col)` written relative to the host cell `(host_row, host_col)`
    pub fn relative_to(row: u32, col: u32, host_row: u32, host_col: u32) -> Self {
        Self::new(
            RefCoord::Relative(row as i32 - host_row as i32),
            RefCoord::Relative(col as i32 - host_col as i32),
        )
    }

    /// 1-based (row, col) of the reference seen from the context's host cell
    pub fn resolve(&self, info: &WorkbookInfo<'_>) -> (u32, u32) {
        let limits = info.options.limits;
        (
            self.row.resolve(info.row, limits.max_rows),
            self.col.resolve(info.col, limits.max_cols),
        )
    }
}

/// A token of a postfix formula
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Text(SharedString),
    Boolean(bool),
    Error(ErrorValue),
    /// An omitted argument
    Missing,
    /// An array constant such as `{1,2;3,4}`
    Array(Array2D),

    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Parentheses around the operand
    Paren,

    /// A cell of the formula's sheet
    Ref(CellRef),
    /// A block of the formula's sheet
    Area(CellRef, CellRef),
    /// A cell on the sheets of an extern-sheet entry
    Ref3d { extern_index: usize, cell: CellRef },
    /// A block on the sheets of an extern-sheet entry
    Area3d {
        extern_index: usize,
        first: CellRef,
        last: CellRef,
    },
    /// A reference to deleted cells
    RefErr,
    AreaErr,

    /// A defined name, by index
    Name(usize),

    /// A built-in function call, by registry id
    Func { id: usize, argc: usize },
    /// A call to a function the host provides
    Udf { name: SharedString, argc: usize },

    /// Jump to the false branch of an IF (absolute token index)
    AttrIf(usize),
    /// Jump past the rest of an IF/CHOOSE (absolute token index)
    AttrGoto(usize),
    /// Jump table of a CHOOSE (absolute token index of each choice)
    AttrChoose(Vec<usize>),

    /// `{=TABLE(row_input, col_input)}` data-table cell
    Table,
}

impl Token {
    /// Number of operands the token pops
    pub fn arity(&self) -> usize {
        match self {
            Token::Unary(_) | Token::Paren => 1,
            Token::Binary(_) => 2,
            Token::Func { argc, .. } | Token::Udf { argc, .. } => *argc,
            _ => 0,
        }
    }

    /// Jump attributes are skipped by evaluation
    pub fn is_attr(&self) -> bool {
        matches!(self, Token::AttrIf(_) | Token::AttrGoto(_) | Token::AttrChoose(_))
    }

    /// Tokens that produce a reference when evaluated as one
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Token::Ref(_)
                | Token::Area(..)
                | Token::Ref3d { .. }
                | Token::Area3d { .. }
                | Token::RefErr
                | Token::AreaErr
        )
    }

    /// Shift stored jump targets after the token at `removed` was deleted
    pub(crate) fn repair_jumps(&mut self, removed: usize) {
        let fix = |t: &mut usize| {
            if *t > removed {
                *t -= 1;
            }
        };
        match self {
            Token::AttrIf(t) | Token::AttrGoto(t) => fix(t),
            Token::AttrChoose(targets) => targets.iter_mut().for_each(fix),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_wrap() {
        // one row above row 1 wraps to the last row
        assert_eq!(RefCoord::Relative(-1).resolve(1, 1_048_576), 1_048_576);
        assert_eq!(RefCoord::Relative(-1).resolve(1, 65_536), 65_536);
        assert_eq!(RefCoord::Relative(2).resolve(65_535, 65_536), 1);
        assert_eq!(RefCoord::Relative(-3).resolve(5, 100), 2);
        assert_eq!(RefCoord::Absolute(7).resolve(5, 100), 7);
    }

    #[test]
    fn test_repair_jumps() {
        let mut t = Token::AttrChoose(vec![2, 5, 9]);
        t.repair_jumps(4);
        assert_eq!(t, Token::AttrChoose(vec![2, 4, 8]));
        let mut g = Token::AttrGoto(3);
        g.repair_jumps(3);
        assert_eq!(g, Token::AttrGoto(3));
    }

    #[test]
    fn test_arity() {
        assert_eq!(Token::Binary(BinaryOp::Add).arity(), 2);
        assert_eq!(Token::Func { id: 0, argc: 3 }.arity(), 3);
        assert_eq!(Token::Number(1.0).arity(), 0);
        assert!(Token::AttrIf(1).is_attr());
    }
}
