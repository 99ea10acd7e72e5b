//! Formula parser
//!
//! A recursive descent parser for A1-style formula text with the spreadsheet's
//! operator precedence. Instead of building a tree it writes the postfix token list
//! the evaluator runs, resolving references against the formula's own cell and
//! sheet and workbook names through a [`ParseHost`].

use crate::error::{FormulaError, FormulaResult};
use crate::functions::registry;
use crate::token::{BinaryOp, CellRef, RefCoord, Token, UnaryOp};
use crate::token_list::TokenList;
use crate::value::{Array2D, Value};
use gridcalc_core::{CellAddress, ErrorValue, SharedString, SheetLimits};
use once_cell::sync::Lazy;
use regex::Regex;

/// What the parser needs to know about the place a formula lives in
pub trait ParseHost {
    /// 1-based row and column of the formula's cell
    fn position(&self) -> (u32, u32);

    /// Sheet bounds used to validate and wrap references
    fn limits(&self) -> SheetLimits {
        SheetLimits::MODERN
    }

    /// Extern-sheet index for the sheets `first..=last` of `book` (`None` is this
    /// workbook). `None` if the sheets do not exist.
    fn extern_sheet(&self, book: Option<&str>, first: &str, last: &str) -> Option<usize> {
        let _ = (book, first, last);
        None
    }

    /// Index of a defined name visible from the formula, or of a name in another
    /// workbook when `book` is given
    fn name_index(&self, book: Option<&str>, name: &str) -> Option<usize> {
        let _ = (book, name);
        None
    }
}

/// A formula parsed at a bare cell address, with no sheets or names around it
impl ParseHost for CellAddress {
    fn position(&self) -> (u32, u32) {
        (self.row + 1, u32::from(self.col) + 1)
    }
}

/// Parse formula text into a postfix token list
///
/// # Example
/// ```rust
/// use gridcalc_core::CellAddress;
/// use gridcalc_formula::parse_formula;
///
/// let tokens = parse_formula("=SUM(A1:A10)*2", &CellAddress::new(0, 1)).unwrap();
/// assert_eq!(tokens.len(), 4);
/// ```
pub fn parse_formula(formula: &str, host: &dyn ParseHost) -> FormulaResult<TokenList> {
    let formula = formula.trim();
    let body = formula.strip_prefix('=').unwrap_or(formula);
    if body.trim().is_empty() {
        return Err(FormulaError::Parse("empty formula".into()));
    }

    let lexemes = Lexer::new(body, host).run()?;
    let mut parser = FormulaParser {
        lexemes,
        pos: 0,
        out: Vec::new(),
        host,
    };
    parser.parse_expression()?;
    if let Some(rest) = parser.peek() {
        return Err(FormulaError::Parse(format!(
            "unexpected {:?} after expression",
            rest
        )));
    }
    let from_biff8 = host.limits() == SheetLimits::BIFF8;
    Ok(TokenList::new(parser.out).with_biff8(from_biff8))
}

// ==================== Lexer ====================

/// Sheets in front of `!`
#[derive(Debug, Clone, PartialEq)]
struct SheetPrefix {
    book: Option<String>,
    /// `None` for `[Book]!Name`
    first: Option<String>,
    last: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorValue),
    Cell(CellRef),
    /// `A1:B2`, `A:C`, `1:3`
    Area(CellRef, CellRef),
    Prefix(SheetPrefix),
    Identifier(String),

    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
}

static CELL_OR_AREA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\$?)([A-Za-z]{1,3})(\$?)(\d+)(?::(\$?)([A-Za-z]{1,3})(\$?)(\d+))?")
        .expect("cell pattern")
});

static COLUMNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\$?)([A-Za-z]{1,3}):(\$?)([A-Za-z]{1,3})").expect("column range pattern")
});

static ROWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\$?)(\d+):(\$?)(\d+)").expect("row range pattern"));

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("number pattern"));

static QUOTED_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^'((?:[^']|'')+)'!").expect("quoted sheet pattern"));

static PLAIN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[([^\]]+)\])?([A-Za-z0-9_.]+)?(?::([A-Za-z0-9_.]+))?!")
        .expect("sheet pattern")
});

static BOOK_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\](.*)$").expect("book pattern"));

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_\\][A-Za-z0-9_.\\?]*").expect("identifier pattern"));

static ERROR_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:NULL!|DIV/0!|VALUE!|REF!|NAME\?|NUM!|N/A)").expect("error pattern")
});

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '\\' | '?' | '(' | '!')
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    /// 1-based host row and column
    host: (u32, u32),
    limits: SheetLimits,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, host: &dyn ParseHost) -> Self {
        Self {
            input,
            pos: 0,
            host: host.position(),
            limits: host.limits(),
        }
    }

    /// Every lexeme, each with whether whitespace came before it
    fn run(mut self) -> FormulaResult<Vec<(Lexeme, bool)>> {
        let mut out = Vec::new();
        loop {
            let spaced = self.skip_whitespace();
            if self.pos >= self.input.len() {
                return Ok(out);
            }
            let lexeme = self.scan()?;
            out.push((lexeme, spaced));
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
        self.pos > start
    }

    fn next_char_after(&self, len: usize) -> Option<char> {
        self.rest()[len..].chars().next()
    }

    fn scan(&mut self) -> FormulaResult<Lexeme> {
        let rest = self.rest();
        let c = rest.chars().next().unwrap_or(' ');

        let single = match c {
            '+' => Some(Lexeme::Plus),
            '-' => Some(Lexeme::Minus),
            '*' => Some(Lexeme::Star),
            '/' => Some(Lexeme::Slash),
            '^' => Some(Lexeme::Caret),
            '%' => Some(Lexeme::Percent),
            '&' => Some(Lexeme::Ampersand),
            '=' => Some(Lexeme::Equal),
            ':' => Some(Lexeme::Colon),
            ',' => Some(Lexeme::Comma),
            ';' => Some(Lexeme::Semicolon),
            '(' => Some(Lexeme::LeftParen),
            ')' => Some(Lexeme::RightParen),
            '{' => Some(Lexeme::LeftBrace),
            '}' => Some(Lexeme::RightBrace),
            _ => None,
        };
        if let Some(lexeme) = single {
            self.pos += 1;
            return Ok(lexeme);
        }

        match c {
            '<' => {
                let (lexeme, len) = if rest.starts_with("<=") {
                    (Lexeme::LessEqual, 2)
                } else if rest.starts_with("<>") {
                    (Lexeme::NotEqual, 2)
                } else {
                    (Lexeme::LessThan, 1)
                };
                self.pos += len;
                return Ok(lexeme);
            }
            '>' => {
                let (lexeme, len) = if rest.starts_with(">=") {
                    (Lexeme::GreaterEqual, 2)
                } else {
                    (Lexeme::GreaterThan, 1)
                };
                self.pos += len;
                return Ok(lexeme);
            }
            '"' => return self.scan_string(),
            '#' => {
                let m = ERROR_LITERAL
                    .find(rest)
                    .ok_or_else(|| FormulaError::Parse(format!("unknown error literal in '{}'", rest)))?;
                self.pos += m.end();
                let e = ErrorValue::parse(m.as_str())
                    .ok_or_else(|| FormulaError::Parse(m.as_str().to_string()))?;
                return Ok(Lexeme::Error(e));
            }
            '\'' => return self.scan_quoted_prefix(),
            _ => {}
        }

        if let Some(lexeme) = self.scan_reference() {
            return Ok(lexeme);
        }
        if let Some(m) = NUMBER.find(rest) {
            let value: f64 = m
                .as_str()
                .parse()
                .map_err(|_| FormulaError::InvalidNumber(m.as_str().to_string()))?;
            self.pos += m.end();
            return Ok(Lexeme::Number(value));
        }
        if let Some(caps) = PLAIN_PREFIX.captures(rest) {
            let book = caps.get(1).map(|m| m.as_str().to_string());
            let first = caps.get(2).map(|m| m.as_str().to_string());
            if book.is_some() || first.is_some() {
                let last = caps.get(3).map(|m| m.as_str().to_string());
                self.pos += caps.get(0).map_or(0, |m| m.end());
                return Ok(Lexeme::Prefix(SheetPrefix { book, first, last }));
            }
        }
        if let Some(m) = IDENTIFIER.find(rest) {
            self.pos += m.end();
            let text = m.as_str();
            let followed_by_call = self.rest().starts_with('(');
            return Ok(match text.to_ascii_uppercase().as_str() {
                "TRUE" if !followed_by_call => Lexeme::Boolean(true),
                "FALSE" if !followed_by_call => Lexeme::Boolean(false),
                _ => Lexeme::Identifier(text.to_string()),
            });
        }
        Err(FormulaError::Parse(format!("unexpected character '{}'", c)))
    }

    fn scan_string(&mut self) -> FormulaResult<Lexeme> {
        let mut s = String::new();
        let mut chars = self.rest().char_indices().skip(1).peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    s.push('"');
                    chars.next();
                    continue;
                }
                self.pos += i + 1;
                return Ok(Lexeme::Text(s));
            }
            s.push(c);
        }
        Err(FormulaError::Parse("unterminated string".into()))
    }

    fn scan_quoted_prefix(&mut self) -> FormulaResult<Lexeme> {
        let caps = QUOTED_PREFIX
            .captures(self.rest())
            .ok_or_else(|| FormulaError::Parse("quoted sheet name without '!'".into()))?;
        let inner = caps.get(1).map_or("", |m| m.as_str()).replace("''", "'");
        self.pos += caps.get(0).map_or(0, |m| m.end());

        let (book, sheets) = match BOOK_PREFIX.captures(&inner) {
            Some(b) => (
                b.get(1).map(|m| m.as_str().to_string()),
                b.get(2).map_or(String::new(), |m| m.as_str().to_string()),
            ),
            None => (None, inner.clone()),
        };
        let (first, last) = match sheets.split_once(':') {
            Some((a, b)) => (Some(a.to_string()), Some(b.to_string())),
            None if sheets.is_empty() => (None, None),
            None => (Some(sheets), None),
        };
        Ok(Lexeme::Prefix(SheetPrefix { book, first, last }))
    }

    fn coord(&self, absolute: bool, value: u32, host: u32) -> RefCoord {
        if absolute {
            RefCoord::Absolute(value)
        } else {
            RefCoord::Relative(value as i32 - host as i32)
        }
    }

    fn cell(&self, col_abs: &str, letters: &str, row_abs: &str, digits: &str) -> Option<CellRef> {
        let col = u32::from(CellAddress::letters_to_column(letters).ok()?) + 1;
        let row: u32 = digits.parse().ok()?;
        if row == 0 || row > self.limits.max_rows || col > self.limits.max_cols {
            return None;
        }
        Some(CellRef::new(
            self.coord(!row_abs.is_empty(), row, self.host.0),
            self.coord(!col_abs.is_empty(), col, self.host.1),
        ))
    }

    /// `A1`, `A1:B2`, `A:C` or `1:3` at the cursor
    fn scan_reference(&mut self) -> Option<Lexeme> {
        let rest = self.rest();
        if let Some(caps) = CELL_OR_AREA.captures(rest) {
            let g = |i: usize| caps.get(i).map_or("", |m| m.as_str());
            let whole = caps.get(0).map_or(0, |m| m.end());
            let first_end = caps.get(4).map_or(0, |m| m.end());
            let first = self.cell(g(1), g(2), g(3), g(4));
            let second = if caps.get(8).is_some() {
                self.cell(g(5), g(6), g(7), g(8))
            } else {
                None
            };
            match (first, second) {
                (Some(a), Some(b)) if !self.next_char_after(whole).map_or(false, is_name_char) => {
                    self.pos += whole;
                    return Some(Lexeme::Area(a, b));
                }
                (Some(a), _) if !self.next_char_after(first_end).map_or(false, is_name_char) => {
                    self.pos += first_end;
                    return Some(Lexeme::Cell(a));
                }
                _ => {}
            }
        }
        if let Some(caps) = COLUMNS.captures(rest) {
            let end = caps.get(0).map_or(0, |m| m.end());
            if !self.next_char_after(end).map_or(false, |c| is_name_char(c) || c.is_ascii_digit()) {
                let g = |i: usize| caps.get(i).map_or("", |m| m.as_str());
                let col = |letters: &str| {
                    CellAddress::letters_to_column(letters)
                        .ok()
                        .map(|c| u32::from(c) + 1)
                        .filter(|c| *c <= self.limits.max_cols)
                };
                if let (Some(c1), Some(c2)) = (col(g(2)), col(g(4))) {
                    self.pos += end;
                    let max = self.limits.max_rows;
                    return Some(Lexeme::Area(
                        CellRef::new(RefCoord::Absolute(1), self.coord(!g(1).is_empty(), c1, self.host.1)),
                        CellRef::new(RefCoord::Absolute(max), self.coord(!g(3).is_empty(), c2, self.host.1)),
                    ));
                }
            }
        }
        if let Some(caps) = ROWS.captures(rest) {
            let end = caps.get(0).map_or(0, |m| m.end());
            if !self.next_char_after(end).map_or(false, |c| is_name_char(c) || c == '.') {
                let g = |i: usize| caps.get(i).map_or("", |m| m.as_str());
                let row = |digits: &str| {
                    digits
                        .parse::<u32>()
                        .ok()
                        .filter(|r| *r >= 1 && *r <= self.limits.max_rows)
                };
                if let (Some(r1), Some(r2)) = (row(g(2)), row(g(4))) {
                    self.pos += end;
                    let max = self.limits.max_cols;
                    return Some(Lexeme::Area(
                        CellRef::new(self.coord(!g(1).is_empty(), r1, self.host.0), RefCoord::Absolute(1)),
                        CellRef::new(self.coord(!g(3).is_empty(), r2, self.host.0), RefCoord::Absolute(max)),
                    ));
                }
            }
        }
        None
    }
}

// ==================== Parser ====================

/// Jump attributes written around the arguments of IF and CHOOSE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Jumps {
    None,
    If,
    Choose,
}

struct FormulaParser<'a> {
    lexemes: Vec<(Lexeme, bool)>,
    pos: usize,
    out: Vec<Token>,
    host: &'a dyn ParseHost,
}

impl<'a> FormulaParser<'a> {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos).map(|(l, _)| l)
    }

    fn peek_spaced(&self) -> bool {
        self.lexemes.get(self.pos).map_or(false, |(_, s)| *s)
    }

    fn next(&mut self) -> Option<Lexeme> {
        let l = self.lexemes.get(self.pos).map(|(l, _)| l.clone());
        self.pos += 1;
        l
    }

    fn eat(&mut self, expected: &Lexeme) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Lexeme) -> FormulaResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "expected {:?}, got {:?}",
                expected,
                self.peek()
            )))
        }
    }

    fn emit(&mut self, token: Token) {
        self.out.push(token);
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> FormulaResult<()>,
        op_of: fn(&Lexeme) -> Option<BinaryOp>,
    ) -> FormulaResult<()> {
        next(self)?;
        while let Some(op) = self.peek().and_then(op_of) {
            self.pos += 1;
            next(self)?;
            self.emit(Token::Binary(op));
        }
        Ok(())
    }

    // Precedence, lowest first: comparison, &, + -, * /, ^, %, unary - +,
    // intersection (space), range (:)

    fn parse_expression(&mut self) -> FormulaResult<()> {
        self.binary_level(Self::parse_concatenation, |l| match l {
            Lexeme::Equal => Some(BinaryOp::Eq),
            Lexeme::NotEqual => Some(BinaryOp::Ne),
            Lexeme::LessThan => Some(BinaryOp::Lt),
            Lexeme::LessEqual => Some(BinaryOp::Le),
            Lexeme::GreaterThan => Some(BinaryOp::Gt),
            Lexeme::GreaterEqual => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_concatenation(&mut self) -> FormulaResult<()> {
        self.binary_level(Self::parse_additive, |l| {
            matches!(l, Lexeme::Ampersand).then_some(BinaryOp::Concat)
        })
    }

    fn parse_additive(&mut self) -> FormulaResult<()> {
        self.binary_level(Self::parse_multiplicative, |l| match l {
            Lexeme::Plus => Some(BinaryOp::Add),
            Lexeme::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<()> {
        self.binary_level(Self::parse_exponent, |l| match l {
            Lexeme::Star => Some(BinaryOp::Mul),
            Lexeme::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    /// `^` is left associative: `2^3^2` is 64
    fn parse_exponent(&mut self) -> FormulaResult<()> {
        self.binary_level(Self::parse_percent, |l| {
            matches!(l, Lexeme::Caret).then_some(BinaryOp::Pow)
        })
    }

    fn parse_percent(&mut self) -> FormulaResult<()> {
        self.parse_unary()?;
        while self.eat(&Lexeme::Percent) {
            self.emit(Token::Unary(UnaryOp::Percent));
        }
        Ok(())
    }

    /// Negation binds tighter than `^`: `-2^2` is 4
    fn parse_unary(&mut self) -> FormulaResult<()> {
        if self.eat(&Lexeme::Minus) {
            self.parse_unary()?;
            self.emit(Token::Unary(UnaryOp::Neg));
            return Ok(());
        }
        if self.eat(&Lexeme::Plus) {
            self.parse_unary()?;
            self.emit(Token::Unary(UnaryOp::Plus));
            return Ok(());
        }
        self.parse_intersection()
    }

    fn starts_reference(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Lexeme::Cell(_)
                    | Lexeme::Area(..)
                    | Lexeme::Prefix(_)
                    | Lexeme::Identifier(_)
                    | Lexeme::LeftParen
            )
        )
    }

    fn parse_intersection(&mut self) -> FormulaResult<()> {
        self.parse_range()?;
        while self.peek_spaced() && self.starts_reference() {
            self.parse_range()?;
            self.emit(Token::Binary(BinaryOp::Intersect));
        }
        Ok(())
    }

    fn parse_range(&mut self) -> FormulaResult<()> {
        self.parse_primary()?;
        while self.eat(&Lexeme::Colon) {
            self.parse_primary()?;
            self.emit(Token::Binary(BinaryOp::Range));
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> FormulaResult<()> {
        let lexeme = self
            .next()
            .ok_or_else(|| FormulaError::Parse("unexpected end of formula".into()))?;
        match lexeme {
            Lexeme::Number(n) => self.emit(Token::Number(n)),
            Lexeme::Text(s) => self.emit(Token::Text(SharedString::new(s))),
            Lexeme::Boolean(b) => self.emit(Token::Boolean(b)),
            Lexeme::Error(e) => self.emit(Token::Error(e)),
            Lexeme::Cell(cell) => self.emit(Token::Ref(cell)),
            Lexeme::Area(a, b) => self.emit(Token::Area(a, b)),
            Lexeme::Prefix(prefix) => self.parse_qualified(prefix)?,
            Lexeme::LeftParen => {
                self.parse_expression()?;
                while self.eat(&Lexeme::Comma) {
                    self.parse_expression()?;
                    self.emit(Token::Binary(BinaryOp::Union));
                }
                self.expect(&Lexeme::RightParen)?;
                self.emit(Token::Paren);
            }
            Lexeme::LeftBrace => self.parse_array()?,
            Lexeme::Identifier(name) => {
                if self.peek() == Some(&Lexeme::LeftParen) {
                    self.parse_call(&name)?;
                } else {
                    let token = match self.host.name_index(None, &name) {
                        Some(index) => Token::Name(index),
                        None => Token::Error(ErrorValue::Name),
                    };
                    self.emit(token);
                }
            }
            other => {
                return Err(FormulaError::Parse(format!("unexpected {:?}", other)));
            }
        }
        Ok(())
    }

    /// Whatever follows `Sheet!`, `Sheet1:Sheet3!` or `[Book]Sheet!`
    fn parse_qualified(&mut self, prefix: SheetPrefix) -> FormulaResult<()> {
        let book = prefix.book.as_deref();
        let sheets = prefix
            .first
            .as_deref()
            .map(|first| (first, prefix.last.as_deref().unwrap_or(first)));
        let index = sheets.and_then(|(first, last)| self.host.extern_sheet(book, first, last));

        let token = match (self.next(), index) {
            (Some(Lexeme::Cell(cell)), Some(extern_index)) => Token::Ref3d { extern_index, cell },
            (Some(Lexeme::Area(first, last)), Some(extern_index)) => Token::Area3d {
                extern_index,
                first,
                last,
            },
            (Some(Lexeme::Cell(_)), None) => Token::RefErr,
            (Some(Lexeme::Area(..)), None) => Token::AreaErr,
            (Some(Lexeme::Error(ErrorValue::Ref)), _) => Token::RefErr,
            (Some(Lexeme::Identifier(name)), _) => {
                // sheet-qualified names resolve like plain ones; book-qualified ones
                // go to the other workbook
                match self.host.name_index(book, &name) {
                    Some(i) => Token::Name(i),
                    None => Token::Error(ErrorValue::Name),
                }
            }
            (other, _) => {
                return Err(FormulaError::Parse(format!(
                    "expected a reference after '!', got {:?}",
                    other
                )))
            }
        };
        self.emit(token);
        Ok(())
    }

    fn parse_array(&mut self) -> FormulaResult<()> {
        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut row: Vec<Value> = Vec::new();
        loop {
            row.push(self.array_element()?);
            match self.next() {
                Some(Lexeme::Comma) => {}
                Some(Lexeme::Semicolon) => rows.push(std::mem::take(&mut row)),
                Some(Lexeme::RightBrace) => break,
                other => {
                    return Err(FormulaError::Parse(format!(
                        "expected ',' ';' or '}}' in array, got {:?}",
                        other
                    )))
                }
            }
        }
        rows.push(row);
        let array = Array2D::from_rows(rows)
            .ok_or_else(|| FormulaError::Parse("array rows differ in length".into()))?;
        self.emit(Token::Array(array));
        Ok(())
    }

    fn array_element(&mut self) -> FormulaResult<Value> {
        let negate = if self.eat(&Lexeme::Minus) {
            true
        } else {
            self.eat(&Lexeme::Plus);
            false
        };
        match (self.next(), negate) {
            (Some(Lexeme::Number(n)), true) => Ok(Value::Number(-n)),
            (Some(Lexeme::Number(n)), false) => Ok(Value::Number(n)),
            (Some(Lexeme::Text(s)), false) => Ok(Value::text(s)),
            (Some(Lexeme::Boolean(b)), false) => Ok(Value::Boolean(b)),
            (Some(Lexeme::Error(e)), false) => Ok(Value::Error(e)),
            (other, _) => Err(FormulaError::Parse(format!(
                "array constants hold literals only, got {:?}",
                other
            ))),
        }
    }

    fn parse_call(&mut self, name: &str) -> FormulaResult<()> {
        let upper = name.to_ascii_uppercase();
        let upper = upper.strip_prefix("_XLFN.").unwrap_or(&upper).to_string();
        let jumps = match upper.as_str() {
            "IF" => Jumps::If,
            "CHOOSE" => Jumps::Choose,
            _ => Jumps::None,
        };
        let first_token = self.out.len();

        self.expect(&Lexeme::LeftParen)?;
        let mut argc = 0;
        let mut gotos: Vec<usize> = Vec::new();
        let mut jump_table: Option<usize> = None;
        let mut choices: Vec<usize> = Vec::new();
        let mut if_attr: Option<usize> = None;
        if !self.eat(&Lexeme::RightParen) {
            loop {
                if argc > 0 && jumps == Jumps::Choose {
                    choices.push(self.out.len());
                }
                if matches!(self.peek(), Some(Lexeme::Comma | Lexeme::RightParen)) {
                    self.emit(Token::Missing);
                } else {
                    self.parse_expression()?;
                }
                argc += 1;

                match (jumps, argc) {
                    (Jumps::If, 1) => {
                        if_attr = Some(self.out.len());
                        self.emit(Token::AttrIf(0));
                    }
                    (Jumps::Choose, 1) => {
                        jump_table = Some(self.out.len());
                        self.emit(Token::AttrChoose(Vec::new()));
                    }
                    (Jumps::None, _) => {}
                    _ => {
                        gotos.push(self.out.len());
                        self.emit(Token::AttrGoto(0));
                    }
                }

                match self.next() {
                    Some(Lexeme::Comma) => continue,
                    Some(Lexeme::RightParen) => break,
                    other => {
                        return Err(FormulaError::Parse(format!(
                            "expected ',' or ')' in the arguments of {}, got {:?}",
                            upper, other
                        )))
                    }
                }
            }
        }

        if upper == "TABLE" {
            // the input cells are known to the host's data table
            self.out.truncate(first_token);
            self.emit(Token::Table);
            return Ok(());
        }

        let end = self.out.len();
        for &g in &gotos {
            self.out[g] = Token::AttrGoto(end);
        }
        if let Some(i) = if_attr {
            let target = gotos.first().map_or(end, |g| g + 1);
            self.out[i] = Token::AttrIf(target);
        }
        if let Some(i) = jump_table {
            self.out[i] = Token::AttrChoose(choices);
        }

        match registry().get(&upper) {
            Some(def) => {
                if argc < def.min_args || def.max_args.map_or(false, |max| argc > max) {
                    return Err(FormulaError::ArgumentCount {
                        function: def.name.to_string(),
                        expected: match def.max_args {
                            Some(max) if max == def.min_args => max.to_string(),
                            Some(max) => format!("{}..{}", def.min_args, max),
                            None => format!("{}+", def.min_args),
                        },
                        actual: argc,
                    });
                }
                self.emit(Token::Func { id: def.id, argc });
            }
            None => self.emit(Token::Udf {
                name: SharedString::new(name),
                argc,
            }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(a1: &str) -> CellAddress {
        CellAddress::parse(a1).unwrap()
    }

    fn tokens(formula: &str) -> Vec<Token> {
        parse_formula(formula, &at("C3")).unwrap().tokens().to_vec()
    }

    fn func(name: &str, argc: usize) -> Token {
        Token::Func {
            id: registry().get(name).unwrap().id,
            argc,
        }
    }

    struct Host;

    impl ParseHost for Host {
        fn position(&self) -> (u32, u32) {
            (1, 1)
        }

        fn extern_sheet(&self, book: Option<&str>, first: &str, last: &str) -> Option<usize> {
            match (book, first, last) {
                (None, "Sheet2", "Sheet2") => Some(0),
                (None, "Sheet1", "Sheet3") => Some(1),
                (Some("Rates.xlsx"), "Sheet 1", "Sheet 1") => Some(2),
                _ => None,
            }
        }

        fn name_index(&self, book: Option<&str>, name: &str) -> Option<usize> {
            match (book, name.to_ascii_lowercase().as_str()) {
                (None, "taxrate") => Some(4),
                (Some("Rates.xlsx"), "prime") => Some(5),
                _ => None,
            }
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            tokens("=1+2*3"),
            vec![
                Token::Number(1.0),
                Token::Number(2.0),
                Token::Number(3.0),
                Token::Binary(BinaryOp::Mul),
                Token::Binary(BinaryOp::Add),
            ]
        );
        assert_eq!(
            tokens("=-2^2"),
            vec![
                Token::Number(2.0),
                Token::Unary(UnaryOp::Neg),
                Token::Number(2.0),
                Token::Binary(BinaryOp::Pow),
            ]
        );
        assert_eq!(
            tokens("=2^3^2")[3..].to_vec(),
            vec![Token::Number(2.0), Token::Binary(BinaryOp::Pow)]
        );
        assert_eq!(
            tokens("=50%&\"x\"=\"0.5x\""),
            vec![
                Token::Number(50.0),
                Token::Unary(UnaryOp::Percent),
                Token::Text(SharedString::new("x")),
                Token::Binary(BinaryOp::Concat),
                Token::Text(SharedString::new("0.5x")),
                Token::Binary(BinaryOp::Eq),
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(tokens("=\"say \"\"hi\"\"\""), vec![Token::Text(SharedString::new("say \"hi\""))]);
        assert_eq!(tokens("=.5e1"), vec![Token::Number(5.0)]);
        assert_eq!(tokens("=true"), vec![Token::Boolean(true)]);
        assert_eq!(tokens("=#DIV/0!"), vec![Token::Error(ErrorValue::Div0)]);
        assert_eq!(tokens("=#N/A"), vec![Token::Error(ErrorValue::Na)]);
    }

    #[test]
    fn test_references_are_relative_to_the_host() {
        // host C3
        assert_eq!(
            tokens("=A1"),
            vec![Token::Ref(CellRef::new(RefCoord::Relative(-2), RefCoord::Relative(-2)))]
        );
        assert_eq!(tokens("=$B$7"), vec![Token::Ref(CellRef::absolute(7, 2))]);
        assert_eq!(
            tokens("=B$1:$D4"),
            vec![Token::Area(
                CellRef::new(RefCoord::Absolute(1), RefCoord::Relative(-1)),
                CellRef::new(RefCoord::Relative(1), RefCoord::Absolute(4)),
            )]
        );
    }

    #[test]
    fn test_whole_columns_and_rows() {
        assert_eq!(
            tokens("=$A:$B"),
            vec![Token::Area(
                CellRef::absolute(1, 1),
                CellRef::absolute(1_048_576, 2)
            )]
        );
        assert_eq!(
            tokens("=$2:$3"),
            vec![Token::Area(CellRef::absolute(2, 1), CellRef::absolute(3, 16_384))]
        );
    }

    #[test]
    fn test_function_names_are_not_cells() {
        assert_eq!(tokens("=LOG10(100)"), vec![Token::Number(100.0), func("LOG10", 1)]);
        assert_eq!(tokens("=_xlfn.STDEV.S(1,2)")[2], func("STDEV.S", 2));
        assert_eq!(
            tokens("=MyMacro(1)"),
            vec![
                Token::Number(1.0),
                Token::Udf {
                    name: SharedString::new("MyMacro"),
                    argc: 1
                }
            ]
        );
    }

    #[test]
    fn test_missing_arguments() {
        assert_eq!(
            tokens("=SUM(1,,2)"),
            vec![Token::Number(1.0), Token::Missing, Token::Number(2.0), func("SUM", 3)]
        );
        assert_eq!(tokens("=PI()"), vec![func("PI", 0)]);
        assert!(matches!(
            parse_formula("=ABS(1,2)", &at("A1")),
            Err(FormulaError::ArgumentCount { actual: 2, .. })
        ));
    }

    #[test]
    fn test_if_jump_attributes() {
        assert_eq!(
            tokens("=IF(TRUE,1,2)"),
            vec![
                Token::Boolean(true),
                Token::AttrIf(4),
                Token::Number(1.0),
                Token::AttrGoto(6),
                Token::Number(2.0),
                Token::AttrGoto(6),
                func("IF", 3),
            ]
        );
        assert_eq!(
            tokens("=CHOOSE(2,\"a\",\"b\")"),
            vec![
                Token::Number(2.0),
                Token::AttrChoose(vec![2, 4]),
                Token::Text(SharedString::new("a")),
                Token::AttrGoto(6),
                Token::Text(SharedString::new("b")),
                Token::AttrGoto(6),
                func("CHOOSE", 3),
            ]
        );
    }

    #[test]
    fn test_reference_operators() {
        let area = |r1, c1, r2, c2| {
            Token::Area(
                CellRef::new(RefCoord::Relative(r1), RefCoord::Relative(c1)),
                CellRef::new(RefCoord::Relative(r2), RefCoord::Relative(c2)),
            )
        };
        let t = tokens("=SUM((A1:B2,C3),A1:B2 B2:C3)");
        assert_eq!(t[1], Token::Ref(CellRef::new(RefCoord::Relative(0), RefCoord::Relative(0))));
        assert_eq!(t[2], Token::Binary(BinaryOp::Union));
        assert_eq!(t[3], Token::Paren);
        assert_eq!(t[4], area(-2, -2, -1, -1));
        assert_eq!(t[5], area(-1, -1, 0, 0));
        assert_eq!(t[6], Token::Binary(BinaryOp::Intersect));
        assert_eq!(t[7], func("SUM", 2));
        assert_eq!(
            tokens("=A1:INDEX(B1:B3,2)")[4],
            Token::Binary(BinaryOp::Range)
        );
        // a space before an operator is not an intersection
        assert_eq!(tokens("=A1 - 1")[2], Token::Binary(BinaryOp::Sub));
    }

    #[test]
    fn test_array_constants() {
        let t = tokens("={1,-2;\"a\",TRUE}");
        let expected = Array2D::from_rows(vec![
            vec![Value::Number(1.0), Value::Number(-2.0)],
            vec![Value::text("a"), Value::Boolean(true)],
        ])
        .unwrap();
        assert_eq!(t, vec![Token::Array(expected)]);
        assert!(parse_formula("={1,2;3}", &at("A1")).is_err());
        assert!(parse_formula("={A1}", &at("A1")).is_err());
    }

    #[test]
    fn test_sheet_qualified_references() {
        let parse = |f: &str| parse_formula(f, &Host).unwrap().tokens().to_vec();
        assert_eq!(
            parse("=Sheet2!$A$1"),
            vec![Token::Ref3d {
                extern_index: 0,
                cell: CellRef::absolute(1, 1)
            }]
        );
        assert!(matches!(parse("=SUM(Sheet1:Sheet3!B2:C3)")[0], Token::Area3d { extern_index: 1, .. }));
        assert!(matches!(parse("='[Rates.xlsx]Sheet 1'!A1")[0], Token::Ref3d { extern_index: 2, .. }));
        assert_eq!(parse("=Nowhere!A1"), vec![Token::RefErr]);
        assert_eq!(parse("=TaxRate*2")[0], Token::Name(4));
        assert_eq!(parse("=[Rates.xlsx]!Prime"), vec![Token::Name(5)]);
        assert_eq!(parse("=Unknown"), vec![Token::Error(ErrorValue::Name)]);
    }

    #[test]
    fn test_table_token() {
        assert_eq!(tokens("=TABLE(,E1)"), vec![Token::Table]);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["=", "=1+", "=(1", "=SUM(1", "=\"open", "=1 2 3)", "=#BAD!"] {
            assert!(parse_formula(bad, &at("A1")).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_biff8_limits() {
        struct Legacy;
        impl ParseHost for Legacy {
            fn position(&self) -> (u32, u32) {
                (1, 1)
            }
            fn limits(&self) -> SheetLimits {
                SheetLimits::BIFF8
            }
        }
        let list = parse_formula("=A:A", &Legacy).unwrap();
        assert!(list.from_biff8());
        assert_eq!(
            list.tokens(),
            &[Token::Area(
                CellRef::new(RefCoord::Absolute(1), RefCoord::Relative(0)),
                CellRef::new(RefCoord::Absolute(65_536), RefCoord::Relative(0)),
            )]
        );
        // beyond IV is a name, not a cell
        assert_eq!(parse_formula("=IW1", &Legacy).unwrap().tokens(), &[Token::Error(ErrorValue::Name)]);
    }
}
