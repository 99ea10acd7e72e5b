//! Conversions between value kinds
//!
//! All conversions take the date system explicitly; there is no global 1904 flag.

use crate::error::Calc;
use crate::value::{Array2D, Value};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use gridcalc_core::{CellValue, ErrorValue};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

/// Largest serial date (9999-12-31 in the 1900 system)
pub const MAX_SERIAL_1900: f64 = 2_958_465.0;

static NUMBER_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-])?\s*\$?\s*((?:\d{1,3}(?:,\d{3})+|\d*)(?:\.\d*)?(?:[eE][+-]?\d+)?)\s*(%)?\s*$")
        .expect("number pattern")
});

/// Convert a value to a number
pub fn to_number(value: &Value, dates_1904: bool) -> Calc<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Empty | Value::Missing => Ok(0.0),
        Value::Text(s) => text_to_number(s.as_str(), dates_1904).ok_or(ErrorValue::Value),
        Value::Error(e) => Err(*e),
        Value::Array(a) => to_number(a.first(), dates_1904),
        Value::Accumulator(_) | Value::Reference(_) => Err(ErrorValue::Value),
    }
}

/// Read text as a number literal, then as a date/time literal
pub fn text_to_number(text: &str, dates_1904: bool) -> Option<f64> {
    parse_number_text(text).or_else(|| parse_date_text(text, dates_1904))
}

/// Parse a numeric literal such as `1,234.5`, `-$12`, `1e3` or `50%`
pub fn parse_number_text(text: &str) -> Option<f64> {
    let caps = NUMBER_TEXT.captures(text)?;
    let body = caps.get(2)?.as_str().replace(',', "");
    if body.is_empty() || body == "." || body.starts_with(['e', 'E']) || body.starts_with(".e") {
        return None;
    }
    let mut n: f64 = body.parse().ok()?;
    if caps.get(1).map_or(false, |m| m.as_str() == "-") {
        n = -n;
    }
    if caps.get(3).is_some() {
        n /= 100.0;
    }
    n.is_finite().then_some(n)
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%d-%b-%Y", "%d %b %Y", "%b %d, %Y",
    "%B %d, %Y", "%d %B %Y", "%d-%B-%Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Parse a date and/or time literal into a serial number
pub fn parse_date_text(text: &str, dates_1904: bool) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(t) = parse_time_text(text) {
        return Some(t);
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return date_to_serial(d, dates_1904);
        }
    }
    // date followed by a time
    for (i, _) in text.match_indices(' ') {
        let (date_part, time_part) = (&text[..i], text[i + 1..].trim());
        if let (Some(d), Some(t)) = (
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(date_part, f).ok()),
            parse_time_text(time_part),
        ) {
            return date_to_serial(d, dates_1904).map(|s| s + t);
        }
    }
    None
}

/// Parse a time of day into a day fraction
pub fn parse_time_text(text: &str) -> Option<f64> {
    let upper = text.trim().to_uppercase();
    TIME_FORMATS.iter().find_map(|f| {
        NaiveTime::parse_from_str(&upper, f)
            .ok()
            .map(|t| time_to_fraction(&t))
    })
}

fn time_to_fraction(t: &NaiveTime) -> f64 {
    (t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9) / 86_400.0
}

/// Convert a value to a boolean
pub fn to_boolean(value: &Value) -> Calc<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Empty | Value::Missing => Ok(false),
        Value::Text(s) => text_to_boolean(s.as_str()).ok_or(ErrorValue::Value),
        Value::Error(e) => Err(*e),
        Value::Array(a) => to_boolean(a.first()),
        Value::Accumulator(_) | Value::Reference(_) => Err(ErrorValue::Value),
    }
}

/// Recognize the TRUE/FALSE literals
pub fn text_to_boolean(text: &str) -> Option<bool> {
    let t = text.trim();
    if t.eq_ignore_ascii_case("TRUE") {
        Some(true)
    } else if t.eq_ignore_ascii_case("FALSE") {
        Some(false)
    } else {
        None
    }
}

/// Convert a value to text. Never fails.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.as_str().to_string(),
        Value::Array(a) => to_text(a.first()),
        other => other.to_string(),
    }
}

/// Format a number the way a General-formatted cell shows it (15 significant digits)
pub fn number_to_text(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if !n.is_finite() {
        return ErrorValue::Num.as_str().to_string();
    }
    let sci = format!("{:.14e}", n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if (-10..15).contains(&exp) {
        let decimals = (14 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, n);
        trim_fraction(&fixed).to_string()
    } else {
        let m = trim_fraction(mantissa);
        format!("{}E{}{:02}", m, if exp < 0 { '-' } else { '+' }, exp.abs())
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Turn a stored cell payload into an evaluation value
pub fn normalize_cell_value(raw: &CellValue, dates_1904: bool) -> Value {
    match raw {
        CellValue::Empty => Value::Empty,
        CellValue::Number(n) => Value::Number(*n),
        CellValue::Boolean(b) => Value::Boolean(*b),
        CellValue::String(s) => Value::Text(s.clone()),
        CellValue::Error(e) => Value::Error(*e),
        CellValue::DateTime(dt) => {
            datetime_to_serial(dt, dates_1904).map_or(Value::Error(ErrorValue::Num), Value::Number)
        }
        CellValue::Formula {
            cached_value: Some(v),
            ..
        } => normalize_cell_value(v, dates_1904),
        CellValue::Formula { .. } => Value::Empty,
    }
}

/// Convert an evaluation result back into a storage payload
pub fn value_to_cell(value: &Value) -> CellValue {
    match value {
        Value::Number(n) if n.is_finite() => CellValue::Number(*n),
        Value::Number(_) => CellValue::Error(ErrorValue::Num),
        Value::Text(s) => CellValue::String(s.clone()),
        Value::Boolean(b) => CellValue::Boolean(*b),
        Value::Error(e) => CellValue::Error(*e),
        Value::Empty | Value::Missing => CellValue::Number(0.0),
        Value::Array(a) => value_to_cell(a.first()),
        Value::Accumulator(_) | Value::Reference(_) => CellValue::Error(ErrorValue::Value),
    }
}

/// A 1x1 array becomes its only element; anything else passes through
pub fn unwrap_singleton(value: Value) -> Value {
    match value {
        Value::Array(a) if a.rows() == 1 && a.cols() == 1 => a.into_values().remove(0),
        v => v,
    }
}

/// Wrap a scalar so that array code can treat every operand alike
pub fn as_array(value: Value) -> Array2D {
    match value {
        Value::Array(a) => a,
        v => Array2D::scalar(v),
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::Text(_) => 1,
        Value::Boolean(_) => 2,
        _ => 3,
    }
}

/// Order two values the way comparison operators do: numbers < text < booleans,
/// text compared case-insensitively, a blank acting as 0, "" or FALSE.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let blank_for = |other: &Value| match other {
        Value::Text(_) => Value::text(""),
        Value::Boolean(_) => Value::Boolean(false),
        _ => Value::Number(0.0),
    };
    let a2;
    let b2;
    let (a, b) = match (a.is_blank(), b.is_blank()) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            a2 = blank_for(b);
            (&a2, b)
        }
        (false, true) => {
            b2 = blank_for(a);
            (a, &b2)
        }
        _ => (a, b),
    };
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => compare_text(x.as_str(), y.as_str()),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Ordering used by lookups: values of different kinds are not comparable
pub fn lookup_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::Text(x), Value::Text(y)) => Some(compare_text(x.as_str(), y.as_str())),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Case-insensitive text ordering
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

// ==================== Serial dates ====================

fn epoch(dates_1904: bool) -> Option<NaiveDate> {
    if dates_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 31)
    }
}

/// Serial number of a calendar date.
///
/// The 1900 system keeps the fictitious 1900-02-29 (serial 60), so every date from
/// 1900-03-01 on is one day later than a plain day count.
pub fn date_to_serial(date: NaiveDate, dates_1904: bool) -> Option<f64> {
    let days = (date - epoch(dates_1904)?).num_days();
    let serial = if !dates_1904 && days >= 60 { days + 1 } else { days };
    (serial >= 0).then_some(serial as f64)
}

/// Serial number of a date and time
pub fn datetime_to_serial(dt: &NaiveDateTime, dates_1904: bool) -> Option<f64> {
    date_to_serial(dt.date(), dates_1904).map(|d| d + time_to_fraction(&dt.time()))
}

/// Calendar date of a serial number as (year, month, day).
///
/// Serial 0 in the 1900 system is the non-existent 1900-01-00, and 60 is 1900-02-29.
pub fn serial_to_ymd(serial: f64, dates_1904: bool) -> Calc<(i32, u32, u32)> {
    let max = if dates_1904 {
        MAX_SERIAL_1900 - 1462.0
    } else {
        MAX_SERIAL_1900
    };
    if !(0.0..max + 1.0).contains(&serial) {
        return Err(ErrorValue::Num);
    }
    let days = serial.floor() as i64;
    if !dates_1904 {
        match days {
            0 => return Ok((1900, 1, 0)),
            60 => return Ok((1900, 2, 29)),
            _ => {}
        }
    }
    let adjusted = if !dates_1904 && days > 60 { days - 1 } else { days };
    let date = epoch(dates_1904)
        .and_then(|e| e.checked_add_signed(chrono::Duration::days(adjusted)))
        .ok_or(ErrorValue::Num)?;
    Ok((date.year(), date.month(), date.day()))
}

/// Calendar date of a serial, snapping 1900-01-00 and 1900-02-29 to real dates
pub fn serial_to_date(serial: f64, dates_1904: bool) -> Calc<NaiveDate> {
    let (y, m, d) = serial_to_ymd(serial, dates_1904)?;
    match (y, m, d) {
        (1900, 1, 0) => NaiveDate::from_ymd_opt(1899, 12, 31),
        (1900, 2, 29) => NaiveDate::from_ymd_opt(1900, 2, 28),
        _ => NaiveDate::from_ymd_opt(y, m, d),
    }
    .ok_or(ErrorValue::Num)
}

/// DATE(year, month, day) arithmetic: months and days may overflow into neighbours
pub fn ymd_to_serial(year: i64, month: i64, day: i64, dates_1904: bool) -> Calc<f64> {
    let year = if (0..1900).contains(&year) { year + 1900 } else { year };
    if !(0..10000).contains(&year) {
        return Err(ErrorValue::Num);
    }
    let months = year * 12 + (month - 1);
    let (y, m) = (months.div_euclid(12), months.rem_euclid(12) + 1);
    let first = NaiveDate::from_ymd_opt(y as i32, m as u32, 1).ok_or(ErrorValue::Num)?;
    let first_serial = date_to_serial(first, dates_1904).ok_or(ErrorValue::Num)?;
    let serial = first_serial + (day - 1) as f64;
    let max = if dates_1904 {
        MAX_SERIAL_1900 - 1462.0
    } else {
        MAX_SERIAL_1900
    };
    if serial < 0.0 || serial > max {
        return Err(ErrorValue::Num);
    }
    Ok(serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_number() {
        assert_eq!(parse_number_text("42"), Some(42.0));
        assert_eq!(parse_number_text(" -1,234.5 "), Some(-1234.5));
        assert_eq!(parse_number_text("50%"), Some(0.5));
        assert_eq!(parse_number_text("$12"), Some(12.0));
        assert_eq!(parse_number_text("1e3"), Some(1000.0));
        assert_eq!(parse_number_text(".5"), Some(0.5));
        assert_eq!(parse_number_text("abc"), None);
        assert_eq!(parse_number_text(""), None);
        assert_eq!(parse_number_text("1,23"), None);
    }

    #[test]
    fn test_to_number_kinds() {
        assert_eq!(to_number(&Value::Boolean(true), false), Ok(1.0));
        assert_eq!(to_number(&Value::Empty, false), Ok(0.0));
        assert_eq!(to_number(&Value::text("x"), false), Err(ErrorValue::Value));
        assert_eq!(
            to_number(&Value::Error(ErrorValue::Ref), false),
            Err(ErrorValue::Ref)
        );
        assert_eq!(to_number(&Value::text("2024-01-15"), false), Ok(45306.0));
        assert_eq!(to_number(&Value::text("12:00"), false), Ok(0.5));
    }

    #[test]
    fn test_to_boolean() {
        assert_eq!(to_boolean(&Value::Number(-2.0)), Ok(true));
        assert_eq!(to_boolean(&Value::text("false")), Ok(false));
        assert_eq!(to_boolean(&Value::text("yes")), Err(ErrorValue::Value));
    }

    #[test]
    fn test_number_to_text() {
        assert_eq!(number_to_text(3.0), "3");
        assert_eq!(number_to_text(0.1 + 0.2), "0.3");
        assert_eq!(number_to_text(-2.5), "-2.5");
        assert_eq!(number_to_text(1e20), "1E+20");
        assert_eq!(number_to_text(1.5e-12), "1.5E-12");
        assert_eq!(number_to_text(123456789012.0), "123456789012");
    }

    #[test]
    fn test_serials_1900() {
        assert_eq!(ymd_to_serial(1900, 1, 1, false), Ok(1.0));
        assert_eq!(ymd_to_serial(1900, 2, 29, false), Ok(60.0));
        assert_eq!(ymd_to_serial(1900, 3, 1, false), Ok(61.0));
        assert_eq!(ymd_to_serial(2024, 1, 15, false), Ok(45306.0));
        assert_eq!(ymd_to_serial(2023, 14, 1, false), ymd_to_serial(2024, 2, 1, false));
        assert_eq!(ymd_to_serial(10000, 1, 1, false), Err(ErrorValue::Num));
        assert_eq!(serial_to_ymd(60.0, false), Ok((1900, 2, 29)));
        assert_eq!(serial_to_ymd(61.0, false), Ok((1900, 3, 1)));
        assert_eq!(serial_to_ymd(45306.0, false), Ok((2024, 1, 15)));
    }

    #[test]
    fn test_serials_1904() {
        assert_eq!(ymd_to_serial(1904, 1, 1, true), Ok(0.0));
        assert_eq!(ymd_to_serial(2024, 1, 15, true), Ok(43844.0));
        assert_eq!(serial_to_ymd(43844.0, true), Ok((2024, 1, 15)));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&Value::Number(5.0), &Value::text("a")), Ordering::Less);
        assert_eq!(compare_values(&Value::text("B"), &Value::text("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::text("abc"), &Value::text("ABC")), Ordering::Equal);
        assert_eq!(compare_values(&Value::Boolean(false), &Value::text("z")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Empty, &Value::Number(0.0)), Ordering::Equal);
        assert_eq!(compare_values(&Value::Empty, &Value::text("")), Ordering::Equal);
        assert_eq!(lookup_compare(&Value::Number(1.0), &Value::text("1")), None);
    }

    #[test]
    fn test_unwrap_singleton() {
        let one = Value::Array(Array2D::scalar(Value::Number(7.0)));
        assert_eq!(unwrap_singleton(one), Value::Number(7.0));
        let two = Value::Array(Array2D::row(vec![1.0.into(), 2.0.into()]).unwrap());
        assert!(unwrap_singleton(two).is_array());
    }
}
