//! Date and time functions
//!
//! Dates are serial numbers in the workbook's date system. The 1900 system keeps the
//! fictitious 1900-02-29 as serial 60, so weekday arithmetic before March 1900 matches
//! the host application rather than the calendar.

use super::args::{array, array_numbers, number, opt_number};
use super::{FnCall, FunctionRegistry};
use crate::coerce::{
    date_to_serial, datetime_to_serial, parse_date_text, parse_time_text, serial_to_date,
    serial_to_ymd, ymd_to_serial, MAX_SERIAL_1900,
};
use crate::error::{Calc, FormulaResult};
use crate::value::{broadcast, Value};
use chrono::{Datelike, Local, NaiveDate};
use gridcalc_core::ErrorValue;

/// Offset between the 1904 and 1900 serials of the same day
const EPOCH_1904_OFFSET: f64 = 1462.0;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("DATE", 3, Some(3), fn_date);
    r.add("DATEVALUE", 1, Some(1), fn_datevalue);
    r.add("DAY", 1, Some(1), fn_day);
    r.add("MONTH", 1, Some(1), fn_month);
    r.add("YEAR", 1, Some(1), fn_year);
    r.add("DAYS360", 2, Some(3), fn_days360);
    r.add("EDATE", 2, Some(2), fn_edate);
    r.add("EOMONTH", 2, Some(2), fn_eomonth);
    r.add("HOUR", 1, Some(1), fn_hour);
    r.add("MINUTE", 1, Some(1), fn_minute);
    r.add("SECOND", 1, Some(1), fn_second);
    r.add("TIME", 3, Some(3), fn_time);
    r.add("TIMEVALUE", 1, Some(1), fn_timevalue);
    r.add("WEEKDAY", 1, Some(2), fn_weekday);
    r.add("WEEKNUM", 1, Some(2), fn_weeknum);
    r.add("NETWORKDAYS", 2, Some(3), fn_networkdays);
    r.add("WORKDAY", 2, Some(3), fn_workday);
    r.add("YEARFRAC", 2, Some(3), fn_yearfrac);
    r.add_volatile("NOW", 0, Some(0), fn_now);
    r.add_volatile("TODAY", 0, Some(0), fn_today);
}

/// DATE(year, month, day)
pub fn fn_date(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, None, None], |a| {
        ymd_to_serial(a[0].trunc() as i64, a[1].trunc() as i64, a[2].trunc() as i64, d)
    })
}

/// Apply a text parser element-wise; non-text arguments are `#VALUE!`
fn parse_each(call: &FnCall<'_>, parse: impl Fn(&str) -> Option<f64>) -> FormulaResult<Value> {
    let args = call.values();
    Ok(broadcast(&args, |v| match &v[0] {
        Value::Text(s) => parse(s.as_str()).map_or(Value::Error(ErrorValue::Value), Value::Number),
        Value::Error(e) => Value::Error(*e),
        _ => Value::Error(ErrorValue::Value),
    }))
}

/// DATEVALUE(date_text) - The date part only
pub fn fn_datevalue(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    parse_each(call, |s| parse_date_text(s, d).map(f64::floor))
}

/// TIMEVALUE(time_text) - The time part only
pub fn fn_timevalue(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    parse_each(call, |s| {
        parse_time_text(s).or_else(|| parse_date_text(s, d).map(|x| x - x.floor()))
    })
}

fn date_part(call: &FnCall<'_>, part: fn((i32, u32, u32)) -> f64) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None], |a| serial_to_ymd(a[0], d).map(part))
}

/// DAY(serial_number)
pub fn fn_day(call: &FnCall<'_>) -> FormulaResult<Value> {
    date_part(call, |(_, _, day)| day as f64)
}

/// MONTH(serial_number)
pub fn fn_month(call: &FnCall<'_>) -> FormulaResult<Value> {
    date_part(call, |(_, month, _)| month as f64)
}

/// YEAR(serial_number)
pub fn fn_year(call: &FnCall<'_>) -> FormulaResult<Value> {
    date_part(call, |(year, _, _)| year as f64)
}

/// Seconds since midnight of a serial, rounded to the nearest second
fn seconds_of_day(serial: f64) -> Calc<i64> {
    if serial < 0.0 {
        return Err(ErrorValue::Num);
    }
    Ok(((serial - serial.floor()) * 86_400.0).round() as i64 % 86_400)
}

/// HOUR(serial_number)
pub fn fn_hour(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok((seconds_of_day(a[0])? / 3600) as f64))
}

/// MINUTE(serial_number)
pub fn fn_minute(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok((seconds_of_day(a[0])? / 60 % 60) as f64))
}

/// SECOND(serial_number)
pub fn fn_second(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok((seconds_of_day(a[0])? % 60) as f64))
}

/// TIME(hour, minute, second) - Wraps at midnight
pub fn fn_time(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (h, m, s) = (a[0].trunc(), a[1].trunc(), a[2].trunc());
        if h > 32_767.0 || m > 32_767.0 || s > 32_767.0 {
            return Err(ErrorValue::Num);
        }
        let total = h * 3600.0 + m * 60.0 + s;
        if total < 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(total.rem_euclid(86_400.0) / 86_400.0)
    })
}

/// Day of week of a serial, 0 = Sunday
fn weekday_index(serial: f64, dates_1904: bool) -> Calc<i64> {
    if serial < 0.0 {
        return Err(ErrorValue::Num);
    }
    let days = serial.floor() + if dates_1904 { EPOCH_1904_OFFSET } else { 0.0 };
    Ok((days as i64 + 6) % 7)
}

/// WEEKDAY(serial_number, [return_type])
pub fn fn_weekday(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, Some(1.0)], |a| {
        let sunday_based = weekday_index(a[0], d)?;
        let monday_based = (sunday_based + 6) % 7;
        match a[1].trunc() as i64 {
            1 => Ok((sunday_based + 1) as f64),
            2 => Ok((monday_based + 1) as f64),
            3 => Ok(monday_based as f64),
            _ => Err(ErrorValue::Num),
        }
    })
}

/// WEEKNUM(serial_number, [return_type]) - The week holding January 1st is week 1
pub fn fn_weeknum(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, Some(1.0)], |a| {
        let week_start = match a[1].trunc() as i64 {
            1 => 0,
            2 => 1,
            _ => return Err(ErrorValue::Num),
        };
        let (year, _, _) = serial_to_ymd(a[0], d)?;
        let jan1 = ymd_to_serial(year as i64, 1, 1, d)?;
        let offset = (weekday_index(jan1, d)? - week_start).rem_euclid(7);
        Ok(((a[0].floor() - jan1) as i64 + offset).div_euclid(7) as f64 + 1.0)
    })
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

/// Year and month `months` after the month of `date`
fn shift_month(date: NaiveDate, months: f64) -> Calc<(i32, u32)> {
    let total = date.year() as i64 * 12 + date.month0() as i64 + months.trunc() as i64;
    if !(0..=9999 * 12 + 11).contains(&total) {
        return Err(ErrorValue::Num);
    }
    Ok((total.div_euclid(12) as i32, total.rem_euclid(12) as u32 + 1))
}

fn serial_of(year: i32, month: u32, day: u32, dates_1904: bool) -> Calc<f64> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date_to_serial(date, dates_1904))
        .ok_or(ErrorValue::Num)
}

/// EDATE(start_date, months) - Same day of a later month, clamped to its end
pub fn fn_edate(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, None], |a| {
        let start = serial_to_date(a[0], d)?;
        let (y, m) = shift_month(start, a[1])?;
        serial_of(y, m, start.day().min(days_in_month(y, m)), d)
    })
}

/// EOMONTH(start_date, months) - Last day of a later month
pub fn fn_eomonth(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, None], |a| {
        let (y, m) = shift_month(serial_to_date(a[0], d)?, a[1])?;
        serial_of(y, m, days_in_month(y, m), d)
    })
}

/// Day count between two dates on a 360-day year
fn days360(start: NaiveDate, end: NaiveDate, european: bool) -> f64 {
    let (y1, m1, mut d1) = (start.year(), start.month(), start.day());
    let (mut y2, mut m2, mut d2) = (end.year(), end.month(), end.day());
    if european {
        d1 = d1.min(30);
        d2 = d2.min(30);
    } else {
        if d1 == days_in_month(y1, m1) {
            d1 = 30;
        }
        if d2 == 31 {
            if d1 < 30 {
                d2 = 1;
                if m2 == 12 {
                    y2 += 1;
                    m2 = 1;
                } else {
                    m2 += 1;
                }
            } else {
                d2 = 30;
            }
        }
    }
    (y2 - y1) as f64 * 360.0 + (m2 as f64 - m1 as f64) * 30.0 + (d2 as f64 - d1 as f64)
}

/// DAYS360(start_date, end_date, [method]) - US (NASD) unless `method` is TRUE
pub fn fn_days360(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, None, Some(0.0)], |a| {
        Ok(days360(serial_to_date(a[0], d)?, serial_to_date(a[1], d)?, a[2] != 0.0))
    })
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_year(year: i32) -> f64 {
    if is_leap(year) {
        366.0
    } else {
        365.0
    }
}

/// Actual/actual year fraction
fn actual_actual(start: NaiveDate, end: NaiveDate) -> f64 {
    let days = (end - start).num_days() as f64;
    let within_a_year = start.year() == end.year()
        || (end.year() == start.year() + 1
            && (start.month(), start.day()) >= (end.month(), end.day()));
    if within_a_year {
        let spans_leap_day = if start.year() == end.year() {
            is_leap(start.year())
        } else {
            let feb29 = |y: i32| NaiveDate::from_ymd_opt(y, 2, 29);
            [start.year(), end.year()]
                .iter()
                .filter_map(|y| feb29(*y))
                .any(|leap| leap >= start && leap <= end)
        };
        days / if spans_leap_day { 366.0 } else { 365.0 }
    } else {
        let years = (start.year()..=end.year()).map(days_in_year).sum::<f64>();
        days / (years / (end.year() - start.year() + 1) as f64)
    }
}

/// YEARFRAC(start_date, end_date, [basis])
pub fn fn_yearfrac(call: &FnCall<'_>) -> FormulaResult<Value> {
    let d = call.dates_1904();
    call.numeric(&[None, None, Some(0.0)], |a| {
        let (mut start, mut end) = (serial_to_date(a[0], d)?, serial_to_date(a[1], d)?);
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        let days = (end - start).num_days() as f64;
        match a[2].trunc() as i64 {
            0 => Ok(days360(start, end, false) / 360.0),
            1 => Ok(actual_actual(start, end)),
            2 => Ok(days / 360.0),
            3 => Ok(days / 365.0),
            4 => Ok(days360(start, end, true) / 360.0),
            _ => Err(ErrorValue::Num),
        }
    })
}

/// Start, second argument and holidays of NETWORKDAYS/WORKDAY
fn workday_args(call: &FnCall<'_>) -> FormulaResult<(f64, f64, Vec<f64>)> {
    let args = call.mixed(&[2]);
    let d = call.dates_1904();
    let start = number(&args[0], d)?.floor();
    serial_to_ymd(start, d)?;
    let second = opt_number(&args, 1, 0.0, d)?;
    let holidays = match args.get(2) {
        Some(Value::Missing) | None => Vec::new(),
        Some(v) => array_numbers(&array(v.clone())?)?
            .into_iter()
            .map(f64::floor)
            .collect(),
    };
    Ok((start, second, holidays))
}

fn is_workday(serial: f64, holidays: &[f64], dates_1904: bool) -> Calc<bool> {
    let wd = weekday_index(serial, dates_1904)?;
    Ok(wd != 0 && wd != 6 && !holidays.contains(&serial))
}

/// NETWORKDAYS(start_date, end_date, [holidays]) - Inclusive; negative when the end
/// comes first
pub fn fn_networkdays(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (start, end, holidays) = workday_args(call)?;
    let d = call.dates_1904();
    let end = end.floor();
    serial_to_ymd(end, d)?;
    let (lo, hi, sign) = if start <= end {
        (start, end, 1.0)
    } else {
        (end, start, -1.0)
    };
    let mut count = 0.0;
    let mut day = lo;
    while day <= hi {
        if is_workday(day, &holidays, d)? {
            count += 1.0;
        }
        day += 1.0;
    }
    Ok(Value::Number(sign * count))
}

/// WORKDAY(start_date, days, [holidays])
pub fn fn_workday(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (start, days, holidays) = workday_args(call)?;
    let d = call.dates_1904();
    let step = if days < 0.0 { -1.0 } else { 1.0 };
    let mut remaining = days.trunc().abs();
    if remaining > MAX_SERIAL_1900 {
        return Ok(Value::Error(ErrorValue::Num));
    }
    let mut day = start;
    while remaining > 0.0 {
        day += step;
        // stepping off either end of the calendar
        serial_to_ymd(day, d)?;
        if is_workday(day, &holidays, d)? {
            remaining -= 1.0;
        }
    }
    Ok(serial_to_ymd(day, d).map(|_| day).into())
}

/// NOW() - Local date and time
pub fn fn_now(call: &FnCall<'_>) -> FormulaResult<Value> {
    let now = Local::now().naive_local();
    Ok(datetime_to_serial(&now, call.dates_1904())
        .map_or(Value::Error(ErrorValue::Num), Value::Number))
}

/// TODAY() - Local date
pub fn fn_today(call: &FnCall<'_>) -> FormulaResult<Value> {
    let today = Local::now().date_naive();
    Ok(date_to_serial(today, call.dates_1904())
        .map_or(Value::Error(ErrorValue::Num), Value::Number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_approx, eval};

    fn num(v: f64) -> Value {
        Value::Number(v)
    }

    #[test]
    fn test_date_parts() {
        assert_eq!(eval("=DATE(2024,1,15)"), num(45306.0));
        assert_eq!(eval("=DATE(2024,13,1)"), eval("=DATE(2025,1,1)"));
        assert_eq!(eval("=DATE(2024,3,0)"), eval("=DATE(2024,2,29)"));
        assert_eq!(eval("=DATE(10000,1,1)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=YEAR(45306)"), num(2024.0));
        assert_eq!(eval("=MONTH(45306)"), num(1.0));
        assert_eq!(eval("=DAY(45306)"), num(15.0));
        assert_eq!(eval("=DAY(60)"), num(29.0));
        assert_eq!(eval("=YEAR(-1)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=DAY(\"2024-01-15\")"), num(15.0));
    }

    #[test]
    fn test_text_dates() {
        assert_eq!(eval("=DATEVALUE(\"2024-01-15\")"), num(45306.0));
        assert_eq!(eval("=DATEVALUE(\"not a date\")"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=DATEVALUE(45306)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=TIMEVALUE(\"18:00\")"), num(0.75));
    }

    #[test]
    fn test_time_parts() {
        assert_eq!(eval("=TIME(12,0,0)"), num(0.5));
        assert_eq!(eval("=TIME(25,0,0)"), eval("=TIME(1,0,0)"));
        assert_eq!(eval("=TIME(-1,0,0)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=HOUR(0.75)"), num(18.0));
        assert_eq!(eval("=MINUTE(TIME(10,45,30))"), num(45.0));
        assert_eq!(eval("=SECOND(TIME(10,45,30))"), num(30.0));
        assert_eq!(eval("=HOUR(45306.5)"), num(12.0));
    }

    #[test]
    fn test_weekdays() {
        // 2024-01-15 was a Monday
        assert_eq!(eval("=WEEKDAY(45306)"), num(2.0));
        assert_eq!(eval("=WEEKDAY(45306,2)"), num(1.0));
        assert_eq!(eval("=WEEKDAY(45306,3)"), num(0.0));
        assert_eq!(eval("=WEEKDAY(45306,9)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=WEEKNUM(DATE(2024,1,1))"), num(1.0));
        assert_eq!(eval("=WEEKNUM(DATE(2024,1,7))"), num(2.0));
        assert_eq!(eval("=WEEKNUM(DATE(2024,1,7),2)"), num(1.0));
    }

    #[test]
    fn test_month_shifts() {
        assert_eq!(eval("=EDATE(DATE(2024,1,31),1)"), eval("=DATE(2024,2,29)"));
        assert_eq!(eval("=EDATE(DATE(2024,3,15),-2)"), eval("=DATE(2024,1,15)"));
        assert_eq!(eval("=EOMONTH(DATE(2024,1,15),1)"), eval("=DATE(2024,2,29)"));
        assert_eq!(eval("=EOMONTH(DATE(2024,1,15),-1)"), eval("=DATE(2023,12,31)"));
    }

    #[test]
    fn test_day_counts() {
        assert_eq!(eval("=DAYS360(DATE(2024,1,31),DATE(2024,3,31))"), num(60.0));
        assert_eq!(eval("=DAYS360(DATE(2024,1,1),DATE(2024,12,31))"), num(360.0));
        assert_eq!(eval("=DAYS360(DATE(2024,1,30),DATE(2024,3,31),TRUE)"), num(60.0));
        assert_approx(eval("=YEARFRAC(DATE(2024,1,1),DATE(2024,7,1))"), 0.5);
        assert_approx(eval("=YEARFRAC(DATE(2023,1,1),DATE(2023,7,2),3)"), 182.0 / 365.0);
        assert_approx(eval("=YEARFRAC(DATE(2024,1,1),DATE(2024,7,1),1)"), 182.0 / 366.0);
        assert_approx(eval("=YEARFRAC(DATE(2024,1,1),DATE(2024,7,1),2)"), 182.0 / 360.0);
    }

    #[test]
    fn test_workdays() {
        // Mon 2024-01-15 .. Fri 2024-01-26
        assert_eq!(eval("=NETWORKDAYS(DATE(2024,1,15),DATE(2024,1,26))"), num(10.0));
        assert_eq!(eval("=NETWORKDAYS(DATE(2024,1,26),DATE(2024,1,15))"), num(-10.0));
        assert_eq!(
            eval("=NETWORKDAYS(DATE(2024,1,15),DATE(2024,1,26),{45307,45308})"),
            num(8.0)
        );
        assert_eq!(eval("=WORKDAY(DATE(2024,1,19),1)"), eval("=DATE(2024,1,22)"));
        assert_eq!(eval("=WORKDAY(DATE(2024,1,22),-1)"), eval("=DATE(2024,1,19)"));
        assert_eq!(eval("=WORKDAY(DATE(2024,1,15),0)"), num(45306.0));
        assert_eq!(eval("=WORKDAY(1,1e8)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=WORKDAY(3,-5)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=NETWORKDAYS(1,1e8)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=NETWORKDAYS(-1,10)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_now_is_after_today() {
        let (Value::Number(now), Value::Number(today)) = (eval("=NOW()"), eval("=TODAY()")) else {
            panic!("dates should be numbers");
        };
        assert!(now >= today && now < today + 1.000_01);
    }
}
