//! Statistical functions

use super::args::{array, array_numbers, finite, number, opt_number, paired_numbers};
use super::{FnCall, FunctionRegistry};
use crate::aggregate::Reduce;
use crate::error::{Calc, FormulaResult};
use crate::value::{Accumulator, Array2D, Value};
use gridcalc_core::ErrorValue;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("AVERAGE", 1, None, fn_average);
    r.add("AVERAGEA", 1, None, fn_averagea);
    r.add("MIN", 1, None, fn_min);
    r.add("MINA", 1, None, fn_mina);
    r.add("MAX", 1, None, fn_max);
    r.add("MAXA", 1, None, fn_maxa);
    r.add("COUNT", 1, None, fn_count);
    r.add("COUNTA", 1, None, fn_counta);
    r.add("COUNTBLANK", 1, Some(1), fn_countblank);
    r.add("GEOMEAN", 1, None, fn_geomean);
    r.add("HARMEAN", 1, None, fn_harmean);
    r.add("AVEDEV", 1, None, fn_avedev);
    r.add("DEVSQ", 1, None, fn_devsq);

    r.add("VAR", 1, None, fn_var);
    r.add("VAR.S", 1, None, fn_var);
    r.add("VARA", 1, None, fn_vara);
    r.add("VARP", 1, None, fn_varp);
    r.add("VAR.P", 1, None, fn_varp);
    r.add("VARPA", 1, None, fn_varpa);
    r.add("STDEV", 1, None, fn_stdev);
    r.add("STDEV.S", 1, None, fn_stdev);
    r.add("STDEVA", 1, None, fn_stdeva);
    r.add("STDEVP", 1, None, fn_stdevp);
    r.add("STDEV.P", 1, None, fn_stdevp);
    r.add("STDEVPA", 1, None, fn_stdevpa);
    r.add("KURT", 1, None, fn_kurt);
    r.add("SKEW", 1, None, fn_skew);

    r.add("MEDIAN", 1, None, fn_median);
    r.add("MODE", 1, None, fn_mode);
    r.add("MODE.SNGL", 1, None, fn_mode);
    r.add("LARGE", 2, Some(2), fn_large);
    r.add("SMALL", 2, Some(2), fn_small);
    r.add("PERCENTILE", 2, Some(2), fn_percentile);
    r.add("PERCENTILE.INC", 2, Some(2), fn_percentile);
    r.add("PERCENTILE.EXC", 2, Some(2), fn_percentile_exc);
    r.add("QUARTILE", 2, Some(2), fn_quartile);
    r.add("QUARTILE.INC", 2, Some(2), fn_quartile);
    r.add("QUARTILE.EXC", 2, Some(2), fn_quartile_exc);
    r.add("PERCENTRANK", 2, Some(3), fn_percentrank);
    r.add("RANK", 2, Some(3), fn_rank);
    r.add("TRIMMEAN", 2, Some(2), fn_trimmean);
    r.add("FREQUENCY", 2, Some(2), fn_frequency);

    r.add("CORREL", 2, Some(2), fn_correl);
    r.add("PEARSON", 2, Some(2), fn_correl);
    r.add("RSQ", 2, Some(2), fn_rsq);
    r.add("COVAR", 2, Some(2), fn_covar);
    r.add("SLOPE", 2, Some(2), fn_slope);
    r.add("INTERCEPT", 2, Some(2), fn_intercept);
    r.add("FORECAST", 3, Some(3), fn_forecast);
    r.add("STEYX", 2, Some(2), fn_steyx);
    r.add("STANDARDIZE", 3, Some(3), fn_standardize);
    r.add("FISHER", 1, Some(1), fn_fisher);
    r.add("FISHERINV", 1, Some(1), fn_fisherinv);
}

// ==================== Reducers ====================

/// AVERAGE(number1, [number2], ...)
pub fn fn_average(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::AVERAGE)
}

/// AVERAGEA(value1, [value2], ...) - Text and FALSE count as 0, TRUE as 1
pub fn fn_averagea(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::AVERAGE_A)
}

/// MIN(number1, [number2], ...)
pub fn fn_min(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::MIN)
}

/// MINA(value1, [value2], ...)
pub fn fn_mina(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::MIN_A)
}

/// MAX(number1, [number2], ...)
pub fn fn_max(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::MAX)
}

/// MAXA(value1, [value2], ...)
pub fn fn_maxa(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::MAX_A)
}

/// COUNT(value1, [value2], ...) - Counts numbers; errors are skipped, never propagated
pub fn fn_count(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::COUNT)
}

/// COUNTA(value1, [value2], ...) - Counts non-empty values, errors included
pub fn fn_counta(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::COUNT_A)
}

/// COUNTBLANK(range) - Empty cells and empty text
pub fn fn_countblank(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::COUNT_BLANK)
}

/// GEOMEAN(number1, ...) - #NUM! if any number is not positive
pub fn fn_geomean(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::GEO_MEAN)
}

/// HARMEAN(number1, ...) - #NUM! if any number is not positive
pub fn fn_harmean(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::HAR_MEAN)
}

// ==================== Two-pass deviations ====================

/// Mean and count of the arguments, read without moving the cursor
fn mean_and_count(call: &FnCall<'_>, count_anything: bool) -> FormulaResult<Calc<(f64, f64)>> {
    let avg = if count_anything {
        Reduce::AVERAGE_A
    } else {
        Reduce::AVERAGE
    };
    Ok(match call.partial(&avg)? {
        Value::Accumulator(Accumulator::Average { sum, count }) if count > 0.0 => {
            Ok((sum / count, count))
        }
        Value::Accumulator(Accumulator::Average { .. }) => Err(ErrorValue::Div0),
        Value::Error(e) => Err(e),
        _ => Err(ErrorValue::Value),
    })
}

/// Σ(x - mean)² and the sample count, evaluating the arguments twice
fn squared_deviations(call: &FnCall<'_>, count_anything: bool) -> FormulaResult<Calc<(f64, f64)>> {
    let (mean, count) = match mean_and_count(call, count_anything)? {
        Ok(mc) => mc,
        Err(e) => return Ok(Err(e)),
    };
    match call.reduce(&Reduce::deviation(mean, 2, count_anything))? {
        Value::Number(total) => Ok(Ok((total, count))),
        Value::Error(e) => Ok(Err(e)),
        _ => Ok(Err(ErrorValue::Value)),
    }
}

fn variance(call: &FnCall<'_>, count_anything: bool, sample: bool) -> FormulaResult<Calc<f64>> {
    Ok(squared_deviations(call, count_anything)?.and_then(|(total, count)| {
        let denominator = if sample { count - 1.0 } else { count };
        if denominator <= 0.0 {
            Err(ErrorValue::Div0)
        } else {
            Ok(total / denominator)
        }
    }))
}

/// VAR(number1, ...) - Sample variance
pub fn fn_var(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, false, true)?.into())
}

/// VARA(value1, ...)
pub fn fn_vara(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, true, true)?.into())
}

/// VARP(number1, ...) - Population variance
pub fn fn_varp(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, false, false)?.into())
}

/// VARPA(value1, ...)
pub fn fn_varpa(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, true, false)?.into())
}

/// STDEV(number1, ...) - Sample standard deviation
pub fn fn_stdev(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, false, true)?.map(f64::sqrt).into())
}

/// STDEVA(value1, ...)
pub fn fn_stdeva(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, true, true)?.map(f64::sqrt).into())
}

/// STDEVP(number1, ...) - Population standard deviation
pub fn fn_stdevp(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, false, false)?.map(f64::sqrt).into())
}

/// STDEVPA(value1, ...)
pub fn fn_stdevpa(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(variance(call, true, false)?.map(f64::sqrt).into())
}

/// DEVSQ(number1, ...) - Σ(x - mean)²
pub fn fn_devsq(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(squared_deviations(call, false)?.map(|(total, _)| total).into())
}

/// AVEDEV(number1, ...) - Mean absolute deviation
pub fn fn_avedev(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (mean, count) = match mean_and_count(call, false)? {
        Ok(mc) => mc,
        Err(ErrorValue::Div0) => return Ok(Value::Error(ErrorValue::Num)),
        Err(e) => return Ok(Value::Error(e)),
    };
    match call.reduce(&Reduce::abs_deviation(mean, false))? {
        Value::Number(total) => Ok(Value::Number(total / count)),
        other => Ok(other),
    }
}

/// Count, mean and sample standard deviation
fn sample_stats(xs: &[f64]) -> (f64, f64, f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (n, mean, var.sqrt())
}

/// KURT(number1, ...) - Excess kurtosis
pub fn fn_kurt(call: &FnCall<'_>) -> FormulaResult<Value> {
    let xs = call.collect(false)?;
    if xs.len() < 4 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    let (n, mean, sd) = sample_stats(&xs);
    if sd == 0.0 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    let s4: f64 = xs.iter().map(|x| ((x - mean) / sd).powi(4)).sum();
    let k = n * (n + 1.0) / ((n - 1.0) * (n - 2.0) * (n - 3.0)) * s4
        - 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    Ok(finite(k).into())
}

/// SKEW(number1, ...)
pub fn fn_skew(call: &FnCall<'_>) -> FormulaResult<Value> {
    let xs = call.collect(false)?;
    if xs.len() < 3 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    let (n, mean, sd) = sample_stats(&xs);
    if sd == 0.0 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    let s3: f64 = xs.iter().map(|x| ((x - mean) / sd).powi(3)).sum();
    Ok(finite(n / ((n - 1.0) * (n - 2.0)) * s3).into())
}

// ==================== Order statistics ====================

fn sorted(mut xs: Vec<f64>) -> Vec<f64> {
    xs.sort_by(f64::total_cmp);
    xs
}

/// MEDIAN(number1, ...)
pub fn fn_median(call: &FnCall<'_>) -> FormulaResult<Value> {
    let xs = sorted(call.collect(false)?);
    let n = xs.len();
    if n == 0 {
        return Ok(Value::Error(ErrorValue::Num));
    }
    Ok(Value::Number(if n % 2 == 1 {
        xs[n / 2]
    } else {
        (xs[n / 2 - 1] + xs[n / 2]) / 2.0
    }))
}

/// Most frequent value; ties go to the value seen first
pub(crate) fn mode_of(xs: &[f64]) -> Calc<f64> {
    let mut best: Option<(f64, usize)> = None;
    for (i, x) in xs.iter().enumerate() {
        let count = xs[i..].iter().filter(|y| *y == x).count();
        let seen = xs[..i].contains(x);
        if count > 1 && !seen && best.map_or(true, |(_, c)| count > c) {
            best = Some((*x, count));
        }
    }
    best.map(|(x, _)| x).ok_or(ErrorValue::Na)
}

/// MODE(number1, ...) - #N/A when no value repeats
pub fn fn_mode(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(mode_of(&call.collect(false)?).into())
}

fn array_and_scalar(call: &FnCall<'_>) -> FormulaResult<(Vec<f64>, Vec<Value>)> {
    let args = call.mixed(&[0]);
    let xs = array_numbers(&array(args[0].clone())?)?;
    Ok((xs, args))
}

pub(crate) fn kth_largest(xs: &[f64], k: f64) -> Calc<f64> {
    let k = k.ceil();
    if k < 1.0 || k > xs.len() as f64 {
        return Err(ErrorValue::Num);
    }
    let s = sorted(xs.to_vec());
    Ok(s[s.len() - k as usize])
}

pub(crate) fn kth_smallest(xs: &[f64], k: f64) -> Calc<f64> {
    let k = k.ceil();
    if k < 1.0 || k > xs.len() as f64 {
        return Err(ErrorValue::Num);
    }
    Ok(sorted(xs.to_vec())[k as usize - 1])
}

/// LARGE(array, k)
pub fn fn_large(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let k = number(&args[1], call.dates_1904())?;
    Ok(kth_largest(&xs, k).into())
}

/// SMALL(array, k)
pub fn fn_small(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let k = number(&args[1], call.dates_1904())?;
    Ok(kth_smallest(&xs, k).into())
}

/// Linear interpolation at zero-based fractional rank `pos` of sorted data
fn interpolate(s: &[f64], pos: f64) -> f64 {
    let lo = pos.floor() as usize;
    let frac = pos - pos.floor();
    if lo + 1 >= s.len() {
        s[s.len() - 1]
    } else {
        s[lo] + frac * (s[lo + 1] - s[lo])
    }
}

pub(crate) fn percentile_inc(xs: &[f64], k: f64) -> Calc<f64> {
    if xs.is_empty() || !(0.0..=1.0).contains(&k) {
        return Err(ErrorValue::Num);
    }
    let s = sorted(xs.to_vec());
    Ok(interpolate(&s, k * (s.len() - 1) as f64))
}

pub(crate) fn percentile_exc(xs: &[f64], k: f64) -> Calc<f64> {
    let n = xs.len() as f64;
    if xs.is_empty() || k <= 0.0 || k >= 1.0 {
        return Err(ErrorValue::Num);
    }
    let pos = k * (n + 1.0) - 1.0;
    if pos < 0.0 || pos > n - 1.0 {
        return Err(ErrorValue::Num);
    }
    Ok(interpolate(&sorted(xs.to_vec()), pos))
}

/// PERCENTILE(array, k) - Inclusive, k in [0, 1]
pub fn fn_percentile(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let k = number(&args[1], call.dates_1904())?;
    Ok(percentile_inc(&xs, k).into())
}

/// PERCENTILE.EXC(array, k) - Exclusive, k in (0, 1)
pub fn fn_percentile_exc(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let k = number(&args[1], call.dates_1904())?;
    Ok(percentile_exc(&xs, k).into())
}

pub(crate) fn quartile_inc(xs: &[f64], q: f64) -> Calc<f64> {
    let q = q.trunc();
    if !(0.0..=4.0).contains(&q) {
        return Err(ErrorValue::Num);
    }
    percentile_inc(xs, q / 4.0)
}

pub(crate) fn quartile_exc(xs: &[f64], q: f64) -> Calc<f64> {
    let q = q.trunc();
    if !(1.0..=3.0).contains(&q) {
        return Err(ErrorValue::Num);
    }
    percentile_exc(xs, q / 4.0)
}

/// QUARTILE(array, quart)
pub fn fn_quartile(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let q = number(&args[1], call.dates_1904())?;
    Ok(quartile_inc(&xs, q).into())
}

/// QUARTILE.EXC(array, quart)
pub fn fn_quartile_exc(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let q = number(&args[1], call.dates_1904())?;
    Ok(quartile_exc(&xs, q).into())
}

/// PERCENTRANK(array, x, [significance]) - Rank of x as a fraction of the data
pub fn fn_percentrank(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let d = call.dates_1904();
    let x = number(&args[1], d)?;
    let significance = opt_number(&args, 2, 3.0, d)?.trunc();
    if xs.is_empty() || significance < 1.0 {
        return Ok(Value::Error(ErrorValue::Num));
    }
    let s = sorted(xs);
    let n = s.len();
    if x < s[0] || x > s[n - 1] {
        return Ok(Value::Error(ErrorValue::Na));
    }
    if n == 1 {
        return Ok(Value::Number(1.0));
    }
    let below = s.iter().filter(|v| **v < x).count();
    let rank = if s[below] == x {
        below as f64 / (n - 1) as f64
    } else {
        // x falls between s[below - 1] and s[below]
        let lo = s[below - 1];
        let hi = s[below];
        let frac = (x - lo) / (hi - lo);
        ((below - 1) as f64 + frac) / (n - 1) as f64
    };
    let scale = 10f64.powf(significance);
    Ok(Value::Number((rank * scale + 1e-9).floor() / scale))
}

/// RANK(number, ref, [order]) - 1 for the largest unless order is non-zero
pub fn fn_rank(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.mixed(&[1]);
    let xs = array_numbers(&array(args[1].clone())?)?;
    let d = call.dates_1904();
    let x = number(&args[0], d)?;
    let ascending = opt_number(&args, 2, 0.0, d)? != 0.0;
    if !xs.contains(&x) {
        return Ok(Value::Error(ErrorValue::Na));
    }
    let ahead = xs
        .iter()
        .filter(|v| if ascending { **v < x } else { **v > x })
        .count();
    Ok(Value::Number(ahead as f64 + 1.0))
}

/// TRIMMEAN(array, percent) - Mean after trimming percent/2 of the data off each end
pub fn fn_trimmean(call: &FnCall<'_>) -> FormulaResult<Value> {
    let (xs, args) = array_and_scalar(call)?;
    let percent = number(&args[1], call.dates_1904())?;
    if xs.is_empty() || !(0.0..1.0).contains(&percent) {
        return Ok(Value::Error(ErrorValue::Num));
    }
    let s = sorted(xs);
    let trim = ((s.len() as f64 * percent) / 2.0).floor() as usize;
    let kept = &s[trim..s.len() - trim];
    Ok(Value::Number(kept.iter().sum::<f64>() / kept.len() as f64))
}

/// FREQUENCY(data_array, bins_array) - A column of counts, one per bin plus overflow
pub fn fn_frequency(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.arrays();
    let data = array_numbers(&array(args[0].clone())?)?;
    let bins = array_numbers(&array(args[1].clone())?)?;
    let mut order: Vec<usize> = (0..bins.len()).collect();
    order.sort_by(|a, b| bins[*a].total_cmp(&bins[*b]));
    let mut counts = vec![0.0; bins.len() + 1];
    for x in data {
        let slot = order
            .iter()
            .find(|i| x <= bins[**i])
            .copied()
            .unwrap_or(bins.len());
        counts[slot] += 1.0;
    }
    let column = counts.into_iter().map(Value::Number).collect();
    Ok(Array2D::column(column).map_or(Value::Error(ErrorValue::Na), Value::Array))
}

// ==================== Paired data ====================

fn paired(call: &FnCall<'_>, first: usize) -> FormulaResult<Calc<(Vec<f64>, Vec<f64>)>> {
    let args = call.arrays();
    let a = array(args[first].clone())?;
    let b = array(args[first + 1].clone())?;
    Ok(paired_numbers(&a, &b))
}

struct Moments {
    n: f64,
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

fn moments(xs: &[f64], ys: &[f64]) -> Calc<Moments> {
    if xs.is_empty() {
        return Err(ErrorValue::Div0);
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut m = Moments {
        n,
        mean_x,
        mean_y,
        sxx: 0.0,
        syy: 0.0,
        sxy: 0.0,
    };
    for (x, y) in xs.iter().zip(ys) {
        m.sxx += (x - mean_x).powi(2);
        m.syy += (y - mean_y).powi(2);
        m.sxy += (x - mean_x) * (y - mean_y);
    }
    Ok(m)
}

fn correlation(xs: &[f64], ys: &[f64]) -> Calc<f64> {
    let m = moments(xs, ys)?;
    if m.sxx == 0.0 || m.syy == 0.0 {
        return Err(ErrorValue::Div0);
    }
    Ok(m.sxy / (m.sxx * m.syy).sqrt())
}

/// CORREL(array1, array2) - Also registered as PEARSON
pub fn fn_correl(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(paired(call, 0)?.and_then(|(x, y)| correlation(&x, &y)).into())
}

/// RSQ(known_y's, known_x's)
pub fn fn_rsq(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(paired(call, 0)?
        .and_then(|(y, x)| correlation(&x, &y))
        .map(|r| r * r)
        .into())
}

/// COVAR(array1, array2) - Population covariance
pub fn fn_covar(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(paired(call, 0)?
        .and_then(|(x, y)| moments(&x, &y))
        .map(|m| m.sxy / m.n)
        .into())
}

fn slope_of(ys: &[f64], xs: &[f64]) -> Calc<(f64, Moments)> {
    let m = moments(xs, ys)?;
    if m.sxx == 0.0 {
        return Err(ErrorValue::Div0);
    }
    Ok((m.sxy / m.sxx, m))
}

/// SLOPE(known_y's, known_x's)
pub fn fn_slope(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(paired(call, 0)?
        .and_then(|(y, x)| slope_of(&y, &x))
        .map(|(b, _)| b)
        .into())
}

/// INTERCEPT(known_y's, known_x's)
pub fn fn_intercept(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(paired(call, 0)?
        .and_then(|(y, x)| slope_of(&y, &x))
        .map(|(b, m)| m.mean_y - b * m.mean_x)
        .into())
}

/// FORECAST(x, known_y's, known_x's) - Linear-regression prediction at x
pub fn fn_forecast(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.arrays();
    let x = number(&args[0], call.dates_1904())?;
    let ys = array(args[1].clone())?;
    let xs = array(args[2].clone())?;
    Ok(paired_numbers(&ys, &xs)
        .and_then(|(y, xv)| slope_of(&y, &xv))
        .map(|(b, m)| m.mean_y + b * (x - m.mean_x))
        .into())
}

/// STEYX(known_y's, known_x's) - Standard error of the regression
pub fn fn_steyx(call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(paired(call, 0)?
        .and_then(|(y, x)| {
            let m = moments(&x, &y)?;
            if m.n < 3.0 || m.sxx == 0.0 {
                return Err(ErrorValue::Div0);
            }
            Ok(((m.syy - m.sxy * m.sxy / m.sxx) / (m.n - 2.0)).sqrt())
        })
        .into())
}

/// STANDARDIZE(x, mean, standard_dev)
pub fn fn_standardize(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        if a[2] <= 0.0 {
            Err(ErrorValue::Num)
        } else {
            Ok((a[0] - a[1]) / a[2])
        }
    })
}

/// FISHER(x) - #NUM! unless -1 < x < 1
pub fn fn_fisher(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0].abs() >= 1.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(0.5 * ((1.0 + a[0]) / (1.0 - a[0])).ln())
        }
    })
}

/// FISHERINV(y)
pub fn fn_fisherinv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        let e = (2.0 * a[0]).exp();
        finite((e - 1.0) / (e + 1.0))
    })
}
