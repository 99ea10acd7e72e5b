//! Text functions
//!
//! Positions and lengths count characters, not bytes. Every function broadcasts
//! over array arguments.

use super::math::round_with;
use super::{FnCall, FunctionRegistry};
use crate::coerce::{text_to_number, to_number, to_text};
use crate::error::{Calc, FormulaResult};
use crate::value::{broadcast, Value};
use gridcalc_core::ErrorValue;
use regex::RegexBuilder;
use rust_decimal::RoundingStrategy;

/// Longest text a cell can hold
const MAX_TEXT_LEN: usize = 32_767;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("CHAR", 1, Some(1), fn_char);
    r.add("CLEAN", 1, Some(1), fn_clean);
    r.add("CODE", 1, Some(1), fn_code);
    r.add("CONCATENATE", 1, None, fn_concatenate);
    r.add("DOLLAR", 1, Some(2), fn_dollar);
    r.add("EXACT", 2, Some(2), fn_exact);
    r.add("FIND", 2, Some(3), fn_find);
    r.add("FIXED", 1, Some(3), fn_fixed);
    r.add("LEFT", 1, Some(2), fn_left);
    r.add("LEN", 1, Some(1), fn_len);
    r.add("LOWER", 1, Some(1), fn_lower);
    r.add("MID", 3, Some(3), fn_mid);
    r.add("PROPER", 1, Some(1), fn_proper);
    r.add("REPLACE", 4, Some(4), fn_replace);
    r.add("REPT", 2, Some(2), fn_rept);
    r.add("RIGHT", 1, Some(2), fn_right);
    r.add("SEARCH", 2, Some(3), fn_search);
    r.add("SUBSTITUTE", 3, Some(4), fn_substitute);
    r.add("T", 1, Some(1), fn_t);
    r.add("TRIM", 1, Some(1), fn_trim);
    r.add("UPPER", 1, Some(1), fn_upper);
    r.add("VALUE", 1, Some(1), fn_value);
}

/// Arguments of one broadcast element
struct Elems<'e> {
    values: &'e [Value],
    dates_1904: bool,
}

impl Elems<'_> {
    fn text(&self, i: usize) -> Calc<String> {
        match self.values.get(i) {
            Some(Value::Error(e)) => Err(*e),
            Some(v) => Ok(to_text(v)),
            None => Ok(String::new()),
        }
    }

    /// A count or position, truncated; missing arguments take `default`
    fn int(&self, i: usize, default: i64) -> Calc<i64> {
        match self.values.get(i) {
            None | Some(Value::Missing) => Ok(default),
            Some(v) => Ok(to_number(v, self.dates_1904)?.trunc() as i64),
        }
    }

    fn number(&self, i: usize, default: f64) -> Calc<f64> {
        match self.values.get(i) {
            None | Some(Value::Missing) => Ok(default),
            Some(v) => to_number(v, self.dates_1904),
        }
    }

    fn boolean(&self, i: usize, default: bool) -> Calc<bool> {
        match self.values.get(i) {
            None | Some(Value::Missing) => Ok(default),
            Some(v) => crate::coerce::to_boolean(v),
        }
    }
}

/// Evaluate the arguments and apply `f` element-wise
fn elementwise(call: &FnCall<'_>, f: impl Fn(&Elems<'_>) -> Calc<Value>) -> FormulaResult<Value> {
    let args = call.values();
    let dates_1904 = call.dates_1904();
    Ok(broadcast(&args, |values| {
        f(&Elems { values, dates_1904 }).unwrap_or_else(Value::Error)
    }))
}

fn checked(s: String) -> Calc<Value> {
    if s.chars().count() > MAX_TEXT_LEN {
        Err(ErrorValue::Value)
    } else {
        Ok(Value::text(s))
    }
}

/// CHAR(number) - Latin-1 character 1-255
pub fn fn_char(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let n = e.number(0, 0.0)?.trunc();
        if !(1.0..=255.0).contains(&n) {
            return Err(ErrorValue::Value);
        }
        Ok(Value::text(char::from(n as u8).to_string()))
    })
}

/// CLEAN(text) - Remove non-printable characters
pub fn fn_clean(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        Ok(Value::text(
            e.text(0)?.chars().filter(|c| (*c as u32) >= 32).collect::<String>(),
        ))
    })
}

/// CODE(text)
pub fn fn_code(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        e.text(0)?
            .chars()
            .next()
            .map(|c| Value::Number(c as u32 as f64))
            .ok_or(ErrorValue::Value)
    })
}

/// CONCATENATE(text1, [text2], ...)
pub fn fn_concatenate(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let mut out = String::new();
        for i in 0..e.values.len() {
            out.push_str(&e.text(i)?);
        }
        checked(out)
    })
}

/// Round and format with a fixed number of decimals. Negative decimals round to the
/// left of the point.
fn fixed_text(x: f64, decimals: f64, commas: bool) -> Calc<String> {
    let decimals = decimals.trunc();
    if decimals > 127.0 {
        return Err(ErrorValue::Value);
    }
    let rounded = round_with(x, decimals, RoundingStrategy::MidpointAwayFromZero)?;
    let shown = decimals.max(0.0) as usize;
    let digits = format!("{:.*}", shown, rounded.abs());
    let (int_part, frac) = match digits.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (digits, None),
    };
    let mut out = String::new();
    if rounded < 0.0 {
        out.push('-');
    }
    out.push_str(&if commas { group_thousands(&int_part) } else { int_part });
    if let Some(frac) = frac {
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// DOLLAR(number, [decimals]) - Negative amounts in parentheses
pub fn fn_dollar(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let x = e.number(0, 0.0)?;
        let body = fixed_text(x.abs(), e.number(1, 2.0)?, true)?;
        Ok(Value::text(if x < 0.0 && body.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
            format!("(${})", body)
        } else {
            format!("${}", body)
        }))
    })
}

/// FIXED(number, [decimals], [no_commas])
pub fn fn_fixed(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let x = e.number(0, 0.0)?;
        let no_commas = e.boolean(2, false)?;
        Ok(Value::text(fixed_text(x, e.number(1, 2.0)?, !no_commas)?))
    })
}

/// EXACT(text1, text2) - Case-sensitive
pub fn fn_exact(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| Ok(Value::Boolean(e.text(0)? == e.text(1)?)))
}

/// Character index of a byte offset
fn char_index(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

/// Byte offset of a zero-based character index, `None` past the end
fn byte_offset(s: &str, chars: usize) -> Option<usize> {
    if chars == 0 {
        return Some(0);
    }
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(chars)
}

/// 1-based start argument of FIND/SEARCH as a byte offset into `within`
fn start_offset(within: &str, start: i64) -> Calc<usize> {
    if start < 1 {
        return Err(ErrorValue::Value);
    }
    byte_offset(within, (start - 1) as usize).ok_or(ErrorValue::Value)
}

/// FIND(find_text, within_text, [start_num]) - Case-sensitive, no wildcards
pub fn fn_find(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let (needle, within) = (e.text(0)?, e.text(1)?);
        let from = start_offset(&within, e.int(2, 1)?)?;
        within[from..]
            .find(&needle)
            .map(|i| Value::Number(char_index(&within, from + i) as f64 + 1.0))
            .ok_or(ErrorValue::Value)
    })
}

/// SEARCH(find_text, within_text, [start_num]) - Case-insensitive, `*` and `?`
/// wildcards, `~` escapes
pub fn fn_search(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let (needle, within) = (e.text(0)?, e.text(1)?);
        let from = start_offset(&within, e.int(2, 1)?)?;
        let mut pattern = String::new();
        let mut chars = needle.chars();
        while let Some(c) = chars.next() {
            match c {
                '~' => match chars.next() {
                    Some(escaped) => pattern.push_str(&regex::escape(&escaped.to_string())),
                    None => pattern.push('~'),
                },
                '*' => pattern.push_str(".*?"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|_| ErrorValue::Value)?;
        re.find(&within[from..])
            .map(|m| Value::Number(char_index(&within, from + m.start()) as f64 + 1.0))
            .ok_or(ErrorValue::Value)
    })
}

/// LEFT(text, [num_chars])
pub fn fn_left(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let n = e.int(1, 1)?;
        if n < 0 {
            return Err(ErrorValue::Value);
        }
        Ok(Value::text(e.text(0)?.chars().take(n as usize).collect::<String>()))
    })
}

/// RIGHT(text, [num_chars])
pub fn fn_right(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let n = e.int(1, 1)?;
        if n < 0 {
            return Err(ErrorValue::Value);
        }
        let s = e.text(0)?;
        let skip = s.chars().count().saturating_sub(n as usize);
        Ok(Value::text(s.chars().skip(skip).collect::<String>()))
    })
}

/// MID(text, start_num, num_chars)
pub fn fn_mid(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let (start, n) = (e.int(1, 1)?, e.int(2, 0)?);
        if start < 1 || n < 0 {
            return Err(ErrorValue::Value);
        }
        let s = e.text(0)?;
        Ok(Value::text(
            s.chars().skip(start as usize - 1).take(n as usize).collect::<String>(),
        ))
    })
}

/// LEN(text)
pub fn fn_len(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| Ok(Value::Number(e.text(0)?.chars().count() as f64)))
}

/// LOWER(text)
pub fn fn_lower(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| Ok(Value::text(e.text(0)?.to_lowercase())))
}

/// UPPER(text)
pub fn fn_upper(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| Ok(Value::text(e.text(0)?.to_uppercase())))
}

/// PROPER(text) - Capitalize every letter that follows a non-letter
pub fn fn_proper(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let mut out = String::new();
        let mut after_letter = false;
        for c in e.text(0)?.chars() {
            if after_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            after_letter = c.is_alphabetic();
        }
        Ok(Value::text(out))
    })
}

/// REPLACE(old_text, start_num, num_chars, new_text)
pub fn fn_replace(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let (start, n) = (e.int(1, 1)?, e.int(2, 0)?);
        if start < 1 || n < 0 {
            return Err(ErrorValue::Value);
        }
        let old: Vec<char> = e.text(0)?.chars().collect();
        let from = (start as usize - 1).min(old.len());
        let to = from.saturating_add(n as usize).min(old.len());
        let mut out: String = old[..from].iter().collect();
        out.push_str(&e.text(3)?);
        out.extend(&old[to..]);
        checked(out)
    })
}

/// REPT(text, number_times)
pub fn fn_rept(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let n = e.int(1, 0)?;
        if n < 0 {
            return Err(ErrorValue::Value);
        }
        let s = e.text(0)?;
        if s.chars().count().saturating_mul(n as usize) > MAX_TEXT_LEN {
            return Err(ErrorValue::Value);
        }
        Ok(Value::text(s.repeat(n as usize)))
    })
}

/// SUBSTITUTE(text, old_text, new_text, [instance_num])
pub fn fn_substitute(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let (s, old, new) = (e.text(0)?, e.text(1)?, e.text(2)?);
        if old.is_empty() {
            return Ok(Value::text(s));
        }
        let instance = match e.values.get(3) {
            None | Some(Value::Missing) => None,
            Some(_) => {
                let n = e.int(3, 1)?;
                if n < 1 {
                    return Err(ErrorValue::Value);
                }
                Some(n as usize)
            }
        };
        let out = match instance {
            None => s.replace(&old, &new),
            Some(n) => match s.match_indices(&old).nth(n - 1) {
                Some((at, _)) => format!("{}{}{}", &s[..at], new, &s[at + old.len()..]),
                None => s,
            },
        };
        checked(out)
    })
}

/// T(value) - Text passes, anything else is empty text
pub fn fn_t(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| match &e.values[0] {
        Value::Text(s) => Ok(Value::Text(s.clone())),
        Value::Error(err) => Err(*err),
        _ => Ok(Value::text("")),
    })
}

/// TRIM(text) - Strip leading and trailing spaces and collapse inner runs
pub fn fn_trim(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| {
        let s = e.text(0)?;
        Ok(Value::text(s.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ")))
    })
}

/// VALUE(text)
pub fn fn_value(call: &FnCall<'_>) -> FormulaResult<Value> {
    elementwise(call, |e| match &e.values[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Empty | Value::Missing => Ok(Value::Number(0.0)),
        Value::Text(s) => text_to_number(s.as_str(), e.dates_1904)
            .map(Value::Number)
            .ok_or(ErrorValue::Value),
        Value::Error(err) => Err(*err),
        _ => Err(ErrorValue::Value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval, eval_array};

    fn t(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn test_slicing() {
        assert_eq!(eval("=LEFT(\"héllo\",2)"), t("hé"));
        assert_eq!(eval("=LEFT(\"abc\")"), t("a"));
        assert_eq!(eval("=RIGHT(\"abc\",5)"), t("abc"));
        assert_eq!(eval("=MID(\"abcdef\",3,2)"), t("cd"));
        assert_eq!(eval("=MID(\"abc\",5,2)"), t(""));
        assert_eq!(eval("=MID(\"abc\",0,2)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=LEFT(\"abc\",-1)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=LEN(\"naïve\")"), Value::Number(5.0));
        assert_eq!(eval("=LEN(12.5)"), Value::Number(4.0));
    }

    #[test]
    fn test_find_and_search() {
        assert_eq!(eval("=FIND(\"b\",\"abcb\")"), Value::Number(2.0));
        assert_eq!(eval("=FIND(\"b\",\"abcb\",3)"), Value::Number(4.0));
        assert_eq!(eval("=FIND(\"B\",\"abc\")"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=FIND(\"\",\"abc\",2)"), Value::Number(2.0));
        assert_eq!(eval("=SEARCH(\"B\",\"abc\")"), Value::Number(2.0));
        assert_eq!(eval("=SEARCH(\"c?e\",\"abcdef\")"), Value::Number(3.0));
        assert_eq!(eval("=SEARCH(\"b*d\",\"abcdef\")"), Value::Number(2.0));
        assert_eq!(eval("=SEARCH(\"~*\",\"a*b\")"), Value::Number(2.0));
        assert_eq!(eval("=SEARCH(\"x\",\"abc\")"), Value::Error(ErrorValue::Value));
    }

    #[test]
    fn test_case_and_cleaning() {
        assert_eq!(eval("=UPPER(\"abc\")"), t("ABC"));
        assert_eq!(eval("=LOWER(\"ABC\")"), t("abc"));
        assert_eq!(eval("=PROPER(\"hello wORLD o'neil\")"), t("Hello World O'Neil"));
        assert_eq!(eval("=TRIM(\"  a   b  \")"), t("a b"));
        assert_eq!(eval("=CLEAN(\"a\"&CHAR(7)&\"b\")"), t("ab"));
        assert_eq!(eval("=EXACT(\"a\",\"A\")"), Value::Boolean(false));
        assert_eq!(eval("=CODE(\"A\")"), Value::Number(65.0));
        assert_eq!(eval("=CHAR(65)"), t("A"));
        assert_eq!(eval("=CHAR(0)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=CODE(\"\")"), Value::Error(ErrorValue::Value));
    }

    #[test]
    fn test_building_text() {
        assert_eq!(eval("=CONCATENATE(\"a\",1,TRUE)"), t("a1TRUE"));
        assert_eq!(eval("=CONCATENATE(\"a\",1/0)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=REPT(\"ab\",3)"), t("ababab"));
        assert_eq!(eval("=REPT(\"ab\",-1)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=REPLACE(\"abcdef\",2,3,\"X\")"), t("aXef"));
        assert_eq!(eval("=SUBSTITUTE(\"a-b-c\",\"-\",\"+\")"), t("a+b+c"));
        assert_eq!(eval("=SUBSTITUTE(\"a-b-c\",\"-\",\"+\",2)"), t("a-b+c"));
        assert_eq!(eval("=SUBSTITUTE(\"abc\",\"\",\"x\")"), t("abc"));
        assert_eq!(eval("=T(\"x\")"), t("x"));
        assert_eq!(eval("=T(1)"), t(""));
        assert_eq!(
            eval_array("=UPPER({\"a\",\"b\"})"),
            vec![vec![t("A"), t("B")]]
        );
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(eval("=FIXED(1234.567)"), t("1,234.57"));
        assert_eq!(eval("=FIXED(1234.567,1,TRUE)"), t("1234.6"));
        assert_eq!(eval("=FIXED(-1234.567,-2)"), t("-1,200"));
        assert_eq!(eval("=FIXED(0.5,0)"), t("1"));
        assert_eq!(eval("=DOLLAR(1234.567)"), t("$1,234.57"));
        assert_eq!(eval("=DOLLAR(-2.5,0)"), t("($3)"));
        assert_eq!(eval("=DOLLAR(1234567,-3)"), t("$1,235,000"));
    }

    #[test]
    fn test_value() {
        assert_eq!(eval("=VALUE(\"1,234.5\")"), Value::Number(1234.5));
        assert_eq!(eval("=VALUE(\"50%\")"), Value::Number(0.5));
        assert_eq!(eval("=VALUE(\"abc\")"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=VALUE(\"2000-01-01\")"), Value::Number(36526.0));
        assert_eq!(eval("=VALUE(TRUE)"), Value::Error(ErrorValue::Value));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1234567"), "1,234,567");
        assert_eq!(group_thousands("123"), "123");
        assert_eq!(group_thousands("1000"), "1,000");
    }
}
