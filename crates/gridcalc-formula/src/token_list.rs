//! Postfix token lists and the evaluation cursor
//!
//! A [`TokenList`] is evaluated from its last token backwards: the last token
//! pops its operands, each of which pops its own, and so on. The cursor lives in a
//! [`Cell`] so that a list can be evaluated through a shared reference and
//! re-evaluated any number of times.

use crate::address::AddressList;
use crate::aggregate::{Aggregate, ERR2};
use crate::context::EvalContext;
use crate::error::{Calc, FormulaError, FormulaResult};
use crate::evaluator;
use crate::token::Token;
use crate::value::Value;
use gridcalc_core::{ErrorValue, SheetLimits};
use std::cell::Cell;

/// A formula in postfix order
#[derive(Debug)]
pub struct TokenList {
    tokens: Vec<Token>,
    /// Index of the first token of the subtree ending at each token
    starts: Vec<usize>,
    /// Number of tokens not yet popped
    position: Cell<usize>,
    from_biff8: bool,
}

impl TokenList {
    pub fn new(tokens: Vec<Token>) -> Self {
        let starts = subtree_starts(&tokens);
        let len = tokens.len();
        Self {
            tokens,
            starts,
            position: Cell::new(len),
            from_biff8: false,
        }
    }

    /// Mark the formula as read from a legacy file, which wraps relative references
    /// at the smaller sheet bounds
    pub fn with_biff8(mut self, from_biff8: bool) -> Self {
        self.from_biff8 = from_biff8;
        self
    }

    pub fn from_biff8(&self) -> bool {
        self.from_biff8
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn save_position(&self) -> usize {
        self.position.get()
    }

    pub fn restore_position(&self, position: usize) {
        self.position.set(position.min(self.tokens.len()));
    }

    /// Step back to the previous non-attribute token
    pub fn light_pop(&self) -> FormulaResult<(usize, &Token)> {
        loop {
            let p = self.position.get();
            if p == 0 {
                return Err(FormulaError::Malformed("operand stack underflow".into()));
            }
            self.position.set(p - 1);
            let token = &self.tokens[p - 1];
            if !token.is_attr() {
                return Ok((p - 1, token));
            }
        }
    }

    /// Take the token at the cursor and move forwards
    pub fn forward_pop(&self) -> FormulaResult<(usize, &Token)> {
        let p = self.position.get();
        let token = self
            .tokens
            .get(p)
            .ok_or_else(|| FormulaError::Malformed("read past the end of the formula".into()))?;
        self.position.set(p + 1);
        Ok((p, token))
    }

    /// The token the next pop returns, without moving
    pub fn peek(&self) -> Option<&Token> {
        self.tokens[..self.position.get()]
            .iter()
            .rev()
            .find(|t| !t.is_attr())
    }

    /// Pop and evaluate the next operand.
    ///
    /// Never fails: engine errors become error values here. Whatever the token
    /// does, the cursor ends up before the operand's whole subtree.
    pub fn evaluate_token(&self, cx: &EvalContext<'_>, agg: &dyn Aggregate) -> Value {
        let (index, token) = match self.light_pop() {
            Ok(popped) => popped,
            Err(e) => return Value::Error(e.to_error_value()),
        };
        let result = evaluator::evaluate(self, token, cx, agg);
        self.position.set(self.starts[index]);
        match result {
            Ok(v) => v,
            Err(e) => {
                if !matches!(e, FormulaError::Cell(_)) {
                    log::trace!("token {:?} at {} failed: {}", token, cx.host(), e);
                }
                Value::Error(e.to_error_value())
            }
        }
    }

    /// Pop and evaluate the next operand as a reference
    pub fn evaluate_ref_token(&self, cx: &EvalContext<'_>) -> Calc<AddressList> {
        let (index, token) = self.light_pop().map_err(|e| e.to_error_value())?;
        let result = evaluator::evaluate_ref(self, token, cx);
        self.position.set(self.starts[index]);
        result.map_err(|e| e.to_error_value())
    }

    /// Skip the next operand without evaluating it
    pub fn flush(&self) -> FormulaResult<()> {
        let (index, _) = self.light_pop()?;
        self.position.set(self.starts[index]);
        Ok(())
    }

    /// Delete a token, shifting the jump targets that pointed past it
    pub fn remove_token(&mut self, index: usize) {
        if index >= self.tokens.len() {
            return;
        }
        self.tokens.remove(index);
        for token in &mut self.tokens {
            token.repair_jumps(index);
        }
        self.starts = subtree_starts(&self.tokens);
        self.position.set(self.tokens.len());
    }

    /// Evaluate the formula as a value
    pub fn evaluate_all(&self, cx: &EvalContext<'_>) -> Value {
        self.evaluate_all_with(cx, &ERR2)
    }

    /// Evaluate the formula, reducing a top-level reference with `agg`
    pub fn evaluate_all_with(&self, cx: &EvalContext<'_>, agg: &dyn Aggregate) -> Value {
        if self.tokens.is_empty() {
            return Value::Empty;
        }
        let mut cx = *cx;
        cx.info.options.limits = SheetLimits::for_format(self.from_biff8);
        log::trace!("evaluating {} tokens at {}", self.tokens.len(), cx.host());

        let saved = self.position.get();
        self.position.set(self.tokens.len());
        let value = self.evaluate_token(&cx, agg);
        let leftover = self.position.get();
        self.position.set(saved);
        if leftover != 0 {
            log::trace!("{} tokens left on the stack", leftover);
            return Value::Error(ErrorValue::Na);
        }
        value
    }

    /// Evaluate the formula as a reference
    pub fn evaluate_all_ref(&self, cx: &EvalContext<'_>) -> Calc<AddressList> {
        if self.tokens.is_empty() {
            return Err(ErrorValue::Value);
        }
        let mut cx = *cx;
        cx.info.options.limits = SheetLimits::for_format(self.from_biff8);

        let saved = self.position.get();
        self.position.set(self.tokens.len());
        let result = self.evaluate_ref_token(&cx);
        self.position.set(saved);
        result
    }

    /// Structural equality of the tokens
    pub fn same_tokens(&self, other: &TokenList) -> bool {
        self.from_biff8 == other.from_biff8 && self.tokens == other.tokens
    }

    /// Whether the formula calls any of the named built-in functions
    pub fn calls_any(&self, names: &[&str]) -> bool {
        let registry = crate::functions::registry();
        let saved = self.position.get();
        self.position.set(0);
        let mut found = false;
        while let Ok((_, token)) = self.forward_pop() {
            if let Token::Func { id, .. } = token {
                if registry
                    .by_id(*id)
                    .map_or(false, |def| names.contains(&def.name))
                {
                    found = true;
                    break;
                }
            }
        }
        self.position.set(saved);
        found
    }
}

impl Clone for TokenList {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            starts: self.starts.clone(),
            position: Cell::new(self.tokens.len()),
            from_biff8: self.from_biff8,
        }
    }
}

impl PartialEq for TokenList {
    fn eq(&self, other: &Self) -> bool {
        self.same_tokens(other)
    }
}

fn subtree_starts(tokens: &[Token]) -> Vec<usize> {
    let mut starts = vec![0; tokens.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_attr() {
            starts[i] = i;
            continue;
        }
        let mut start = i;
        for _ in 0..token.arity() {
            start = start.min(stack.pop().unwrap_or(0));
        }
        starts[i] = start;
        stack.push(start);
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::BinaryOp;

    fn list() -> TokenList {
        // 1 + 2 * 3 => 1 2 3 * +
        TokenList::new(vec![
            Token::Number(1.0),
            Token::Number(2.0),
            Token::Number(3.0),
            Token::Binary(BinaryOp::Mul),
            Token::Binary(BinaryOp::Add),
        ])
    }

    #[test]
    fn test_subtree_starts() {
        let l = list();
        assert_eq!(l.starts, vec![0, 1, 2, 1, 0]);
    }

    #[test]
    fn test_flush_skips_subtree() {
        let l = list();
        assert!(matches!(l.light_pop(), Ok((4, Token::Binary(BinaryOp::Add)))));
        l.flush().unwrap();
        assert_eq!(l.save_position(), 1);
        assert!(matches!(l.light_pop(), Ok((0, Token::Number(_)))));
        assert!(l.light_pop().is_err());
    }

    #[test]
    fn test_light_pop_skips_attributes() {
        let l = TokenList::new(vec![Token::Number(1.0), Token::AttrGoto(2)]);
        assert!(matches!(l.light_pop(), Ok((0, Token::Number(_)))));
    }

    #[test]
    fn test_forward_pop() {
        let l = list();
        l.restore_position(3);
        assert!(matches!(l.forward_pop(), Ok((3, Token::Binary(BinaryOp::Mul)))));
        assert!(l.forward_pop().is_ok());
        assert!(l.forward_pop().is_err());
    }

    #[test]
    fn test_remove_token_repairs_jumps() {
        let mut l = TokenList::new(vec![
            Token::Boolean(true),
            Token::AttrIf(4),
            Token::Paren,
            Token::Number(1.0),
            Token::AttrGoto(6),
            Token::Number(2.0),
            Token::AttrGoto(6),
        ]);
        l.remove_token(2);
        assert_eq!(l.tokens()[1], Token::AttrIf(3));
        assert_eq!(l.tokens()[3], Token::AttrGoto(5));
        assert_eq!(l.len(), 6);
    }

    #[test]
    fn test_clone_resets_cursor() {
        let l = list();
        l.restore_position(2);
        let c = l.clone();
        assert_eq!(c.save_position(), 5);
        assert!(l.same_tokens(&c));
    }
}
