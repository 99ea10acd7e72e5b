//! Math and trigonometry functions

use super::args::{array, finite, number};
use super::{FnCall, FunctionRegistry};
use crate::aggregate::{Reduce, ARRAY};
use crate::coerce::as_array;
use crate::error::{Calc, FormulaResult};
use crate::value::{Array2D, Value};
use gridcalc_core::ErrorValue;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("SUM", 1, None, fn_sum);
    r.add("PRODUCT", 1, None, fn_product);
    r.add("SUMSQ", 1, None, fn_sumsq);
    r.add("SUMPRODUCT", 1, None, fn_sumproduct);
    r.add("SUMX2MY2", 2, Some(2), fn_sumx2my2);
    r.add("SUMX2PY2", 2, Some(2), fn_sumx2py2);
    r.add("SUMXMY2", 2, Some(2), fn_sumxmy2);
    r.add("SERIESSUM", 4, Some(4), fn_seriessum);

    r.add("ABS", 1, Some(1), fn_abs);
    r.add("SIGN", 1, Some(1), fn_sign);
    r.add("SQRT", 1, Some(1), fn_sqrt);
    r.add("SQRTPI", 1, Some(1), fn_sqrtpi);
    r.add("EXP", 1, Some(1), fn_exp);
    r.add("LN", 1, Some(1), fn_ln);
    r.add("LOG", 1, Some(2), fn_log);
    r.add("LOG10", 1, Some(1), fn_log10);
    r.add("POWER", 2, Some(2), fn_power);
    r.add("MOD", 2, Some(2), fn_mod);
    r.add("QUOTIENT", 2, Some(2), fn_quotient);
    r.add("PI", 0, Some(0), fn_pi);
    r.add_volatile("RAND", 0, Some(0), fn_rand);
    r.add_volatile("RANDBETWEEN", 2, Some(2), fn_randbetween);

    r.add("ROUND", 1, Some(2), fn_round);
    r.add("ROUNDUP", 1, Some(2), fn_roundup);
    r.add("ROUNDDOWN", 1, Some(2), fn_rounddown);
    r.add("TRUNC", 1, Some(2), fn_trunc);
    r.add("INT", 1, Some(1), fn_int);
    r.add("CEILING", 2, Some(2), fn_ceiling);
    r.add("FLOOR", 2, Some(2), fn_floor);
    r.add("MROUND", 2, Some(2), fn_mround);
    r.add("EVEN", 1, Some(1), fn_even);
    r.add("ODD", 1, Some(1), fn_odd);

    r.add("FACT", 1, Some(1), fn_fact);
    r.add("FACTDOUBLE", 1, Some(1), fn_factdouble);
    r.add("COMBIN", 2, Some(2), fn_combin);
    r.add("PERMUT", 2, Some(2), fn_permut);
    r.add("GCD", 1, None, fn_gcd);
    r.add("LCM", 1, None, fn_lcm);

    r.add("SIN", 1, Some(1), fn_sin);
    r.add("COS", 1, Some(1), fn_cos);
    r.add("TAN", 1, Some(1), fn_tan);
    r.add("ASIN", 1, Some(1), fn_asin);
    r.add("ACOS", 1, Some(1), fn_acos);
    r.add("ATAN", 1, Some(1), fn_atan);
    r.add("ATAN2", 2, Some(2), fn_atan2);
    r.add("SINH", 1, Some(1), fn_sinh);
    r.add("COSH", 1, Some(1), fn_cosh);
    r.add("TANH", 1, Some(1), fn_tanh);
    r.add("ASINH", 1, Some(1), fn_asinh);
    r.add("ACOSH", 1, Some(1), fn_acosh);
    r.add("ATANH", 1, Some(1), fn_atanh);
    r.add("DEGREES", 1, Some(1), fn_degrees);
    r.add("RADIANS", 1, Some(1), fn_radians);

    r.add("MMULT", 2, Some(2), fn_mmult);
    r.add("MDETERM", 1, Some(1), fn_mdeterm);
    r.add("MINVERSE", 1, Some(1), fn_minverse);
    r.add("TRANSPOSE", 1, Some(1), fn_transpose);
}

// ==================== Range reducers ====================

/// SUM(number1, [number2], ...)
pub fn fn_sum(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::SUM)
}

/// PRODUCT(number1, [number2], ...)
pub fn fn_product(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::PRODUCT)
}

/// SUMSQ(number1, [number2], ...) - Sum of squares
pub fn fn_sumsq(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.reduce(&Reduce::SUM_SQ)
}

/// SUMPRODUCT(array1, [array2], ...) - Sum of the element-wise products.
///
/// Arguments are evaluated in array mode, so `SUMPRODUCT((A1:A3>1)*B1:B3)` works in
/// an ordinary cell. Non-numeric elements count as 0.
pub fn fn_sumproduct(call: &FnCall<'_>) -> FormulaResult<Value> {
    let mut cx = call.cx;
    cx.info.options.is_array_formula = true;
    cx.info.sumproduct_depth += 1;
    let mut arrays = Vec::with_capacity(call.argc);
    for _ in 0..call.argc {
        arrays.push(array(call.list.evaluate_token(&cx, &ARRAY))?);
    }
    arrays.reverse();
    let (rows, cols) = (arrays[0].rows(), arrays[0].cols());
    if arrays.iter().any(|a| a.rows() != rows || a.cols() != cols) {
        return Ok(Value::Error(ErrorValue::Value));
    }
    let mut total = 0.0;
    for i in 0..rows * cols {
        let mut product = 1.0;
        for a in &arrays {
            match a.get(i / cols, i % cols) {
                Some(Value::Number(n)) => product *= n,
                Some(Value::Error(e)) => return Ok(Value::Error(*e)),
                _ => product = 0.0,
            }
        }
        total += product;
    }
    Ok(finite(total).into())
}

fn two_array_sum(call: &FnCall<'_>, f: fn(f64, f64) -> f64) -> FormulaResult<Value> {
    let args = call.arrays();
    let a = array(args[0].clone())?;
    let b = array(args[1].clone())?;
    let (xs, ys) = super::args::paired_numbers(&a, &b)?;
    Ok(finite(xs.iter().zip(&ys).map(|(x, y)| f(*x, *y)).sum()).into())
}

/// SUMX2MY2(array_x, array_y) - Σ(x² - y²)
pub fn fn_sumx2my2(call: &FnCall<'_>) -> FormulaResult<Value> {
    two_array_sum(call, |x, y| x * x - y * y)
}

/// SUMX2PY2(array_x, array_y) - Σ(x² + y²)
pub fn fn_sumx2py2(call: &FnCall<'_>) -> FormulaResult<Value> {
    two_array_sum(call, |x, y| x * x + y * y)
}

/// SUMXMY2(array_x, array_y) - Σ(x - y)²
pub fn fn_sumxmy2(call: &FnCall<'_>) -> FormulaResult<Value> {
    two_array_sum(call, |x, y| (x - y) * (x - y))
}

/// SERIESSUM(x, n, m, coefficients) - Σ aᵢ·x^(n + i·m)
pub fn fn_seriessum(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.arrays();
    let d = call.dates_1904();
    let x = number(&args[0], d)?;
    let n = number(&args[1], d)?;
    let m = number(&args[2], d)?;
    let coefficients = array(args[3].clone())?;
    let mut total = 0.0;
    for (i, a) in coefficients.iter().enumerate() {
        let a = match a {
            Value::Number(a) => *a,
            Value::Error(e) => return Ok(Value::Error(*e)),
            _ => return Ok(Value::Error(ErrorValue::Value)),
        };
        total += a * crate::evaluator::power(x, n + i as f64 * m)?;
    }
    Ok(finite(total).into())
}

// ==================== Simple numeric functions ====================

/// ABS(number)
pub fn fn_abs(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].abs()))
}

/// SIGN(number) - 1, 0 or -1
pub fn fn_sign(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        Ok(if a[0] > 0.0 {
            1.0
        } else if a[0] < 0.0 {
            -1.0
        } else {
            0.0
        })
    })
}

/// SQRT(number) - #NUM! for negative numbers
pub fn fn_sqrt(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0] < 0.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].sqrt())
        }
    })
}

/// SQRTPI(number) - √(number·π)
pub fn fn_sqrtpi(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0] < 0.0 {
            Err(ErrorValue::Num)
        } else {
            Ok((a[0] * std::f64::consts::PI).sqrt())
        }
    })
}

/// EXP(number)
pub fn fn_exp(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| finite(a[0].exp()))
}

/// LN(number)
pub fn fn_ln(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0] <= 0.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].ln())
        }
    })
}

/// LOG(number, [base]) - Default base is 10
pub fn fn_log(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, Some(10.0)], |a| {
        let (x, base) = (a[0], a[1]);
        if x <= 0.0 || base <= 0.0 {
            return Err(ErrorValue::Num);
        }
        if base == 1.0 {
            return Err(ErrorValue::Div0);
        }
        Ok(x.ln() / base.ln())
    })
}

/// LOG10(number)
pub fn fn_log10(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0] <= 0.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].log10())
        }
    })
}

/// POWER(number, power)
pub fn fn_power(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| crate::evaluator::power(a[0], a[1]))
}

/// MOD(number, divisor) - The result has the sign of the divisor
pub fn fn_mod(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| modulo(a[0], a[1]))
}

pub(crate) fn modulo(n: f64, d: f64) -> Calc<f64> {
    if d == 0.0 {
        return Err(ErrorValue::Div0);
    }
    let r = n - d * (n / d).floor();
    // float noise can leave r == d
    if (d > 0.0 && r >= d) || (d < 0.0 && r <= d) {
        Ok(0.0)
    } else {
        Ok(r)
    }
}

/// QUOTIENT(numerator, denominator) - Integer part of a division
pub fn fn_quotient(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        if a[1] == 0.0 {
            Err(ErrorValue::Div0)
        } else {
            Ok((a[0] / a[1]).trunc())
        }
    })
}

/// PI()
pub fn fn_pi(_call: &FnCall<'_>) -> FormulaResult<Value> {
    Ok(Value::Number(std::f64::consts::PI))
}

/// RAND() - Returns a random number between 0 and 1
pub fn fn_rand(_call: &FnCall<'_>) -> FormulaResult<Value> {
    let mut rng = rand::thread_rng();
    Ok(Value::Number(rng.gen::<f64>()))
}

/// RANDBETWEEN(bottom, top) - Returns a random integer between bottom and top (inclusive)
pub fn fn_randbetween(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (bottom, top) = (a[0].ceil(), a[1].floor());
        if bottom > top {
            return Err(ErrorValue::Num);
        }
        let mut rng = rand::thread_rng();
        Ok(rng.gen_range(bottom as i64..=top as i64) as f64)
    })
}

// ==================== Rounding ====================

/// Round to `digits` decimal places (negative digits round left of the point).
///
/// The number is first read at 15 significant digits, so that 2.675 rounds as the
/// 2.675 the user typed rather than as its binary neighbour 2.67499999...
pub(crate) fn round_with(x: f64, digits: f64, strategy: RoundingStrategy) -> Calc<f64> {
    if !x.is_finite() || !digits.is_finite() {
        return Err(ErrorValue::Num);
    }
    let digits = digits.trunc() as i64;
    if x == 0.0 || x.abs() >= 1e27 {
        return Ok(x);
    }
    let d = Decimal::from_scientific(&format!("{:.14e}", x)).map_err(|_| ErrorValue::Num)?;
    let rounded = if digits >= 0 {
        d.round_dp_with_strategy(digits.min(28) as u32, strategy)
    } else {
        let k = (-digits) as u32;
        if k > 27 {
            return Ok(0.0);
        }
        let p = Decimal::from_i128_with_scale(10i128.pow(k), 0);
        (d / p)
            .round_dp_with_strategy(0, strategy)
            .checked_mul(p)
            .ok_or(ErrorValue::Num)?
    };
    rounded.to_f64().ok_or(ErrorValue::Num)
}

/// ROUND(number, [num_digits]) - Half away from zero
pub fn fn_round(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, Some(0.0)], |a| {
        round_with(a[0], a[1], RoundingStrategy::MidpointAwayFromZero)
    })
}

/// ROUNDUP(number, [num_digits]) - Away from zero
pub fn fn_roundup(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, Some(0.0)], |a| {
        round_with(a[0], a[1], RoundingStrategy::AwayFromZero)
    })
}

/// ROUNDDOWN(number, [num_digits]) - Toward zero
pub fn fn_rounddown(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, Some(0.0)], |a| round_with(a[0], a[1], RoundingStrategy::ToZero))
}

/// TRUNC(number, [num_digits])
pub fn fn_trunc(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, Some(0.0)], |a| round_with(a[0], a[1], RoundingStrategy::ToZero))
}

/// INT(number) - Rounds toward negative infinity
pub fn fn_int(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].floor()))
}

/// Quotient snapped to an integer when float noise moved it off one
fn snapped_quotient(x: f64, significance: f64) -> f64 {
    let q = x / significance;
    if (q - q.round()).abs() < 1e-12 * q.abs().max(1.0) {
        q.round()
    } else {
        q
    }
}

/// CEILING(number, significance)
pub fn fn_ceiling(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (x, s) = (a[0], a[1]);
        if x == 0.0 || s == 0.0 {
            return Ok(0.0);
        }
        if x > 0.0 && s < 0.0 {
            return Err(ErrorValue::Num);
        }
        let r = snapped_quotient(x, s).ceil() * s;
        Ok(if r == 0.0 { 0.0 } else { r })
    })
}

/// FLOOR(number, significance)
pub fn fn_floor(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (x, s) = (a[0], a[1]);
        if x == 0.0 {
            return Ok(0.0);
        }
        if s == 0.0 {
            return Err(ErrorValue::Div0);
        }
        if x > 0.0 && s < 0.0 {
            return Err(ErrorValue::Num);
        }
        let q = snapped_quotient(x, s);
        Ok(q.floor() * s)
    })
}

/// MROUND(number, multiple)
pub fn fn_mround(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (x, m) = (a[0], a[1]);
        if m == 0.0 {
            return Ok(0.0);
        }
        if x * m < 0.0 {
            return Err(ErrorValue::Num);
        }
        let q = round_with(x / m, 0.0, RoundingStrategy::MidpointAwayFromZero)?;
        Ok(q * m)
    })
}

/// EVEN(number) - Rounds away from zero to an even integer
pub fn fn_even(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        let x = a[0];
        let r = (x.abs() / 2.0).ceil() * 2.0;
        Ok(if x < 0.0 { -r } else { r })
    })
}

/// ODD(number) - Rounds away from zero to an odd integer
pub fn fn_odd(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        let x = a[0];
        let mut r = x.abs().ceil();
        if r % 2.0 == 0.0 {
            r += 1.0;
        }
        Ok(if x < 0.0 { -r } else { r })
    })
}

// ==================== Combinatorics ====================

pub(crate) fn factorial(n: f64) -> Calc<f64> {
    if n < 0.0 {
        return Err(ErrorValue::Num);
    }
    let n = n.trunc();
    if n > 170.0 {
        return Err(ErrorValue::Num);
    }
    Ok((1..=n as u32).fold(1.0, |acc, k| acc * k as f64))
}

/// FACT(number)
pub fn fn_fact(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| factorial(a[0]))
}

/// FACTDOUBLE(number) - n·(n-2)·(n-4)...
pub fn fn_factdouble(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        let n = a[0].trunc();
        if n < -1.0 {
            return Err(ErrorValue::Num);
        }
        let mut acc = 1.0;
        let mut k = n;
        while k > 1.0 {
            acc *= k;
            k -= 2.0;
        }
        finite(acc)
    })
}

/// Binomial coefficient; the running quotient stays integral at each step
pub(crate) fn combin(n: f64, k: f64) -> Calc<f64> {
    let (n, k) = (n.trunc(), k.trunc());
    if n < 0.0 || k < 0.0 || k > n {
        return Err(ErrorValue::Num);
    }
    let k = k.min(n - k);
    let mut acc = 1.0;
    for i in 1..=k as u64 {
        acc = acc * (n - k + i as f64) / i as f64;
        if !acc.is_finite() {
            return Err(ErrorValue::Num);
        }
    }
    finite(acc.round())
}

/// COMBIN(number, number_chosen)
pub fn fn_combin(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| combin(a[0], a[1]))
}

/// PERMUT(number, number_chosen)
pub fn fn_permut(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (n, k) = (a[0].trunc(), a[1].trunc());
        if n < 0.0 || k < 0.0 || n < k {
            return Err(ErrorValue::Num);
        }
        finite(((n - k + 1.0) as u64..=n as u64).fold(1.0, |acc, i| acc * i as f64))
    })
}

fn gcd2(mut a: f64, mut b: f64) -> f64 {
    while b > 0.5 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn integer_args(call: &FnCall<'_>) -> FormulaResult<Vec<f64>> {
    let values = call.collect(false)?;
    if values.iter().any(|x| *x < 0.0) {
        return Err(ErrorValue::Num.into());
    }
    Ok(values.into_iter().map(f64::trunc).collect())
}

/// GCD(number1, [number2], ...)
pub fn fn_gcd(call: &FnCall<'_>) -> FormulaResult<Value> {
    let values = integer_args(call)?;
    Ok(Value::Number(values.into_iter().fold(0.0, gcd2)))
}

/// LCM(number1, [number2], ...)
pub fn fn_lcm(call: &FnCall<'_>) -> FormulaResult<Value> {
    let values = integer_args(call)?;
    if values.iter().any(|x| *x == 0.0) {
        return Ok(Value::Number(0.0));
    }
    let lcm = values.into_iter().fold(1.0, |acc, x| acc / gcd2(acc, x) * x);
    Ok(finite(lcm).into())
}

// ==================== Trigonometry ====================

/// SIN(number)
pub fn fn_sin(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].sin()))
}

/// COS(number)
pub fn fn_cos(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].cos()))
}

/// TAN(number)
pub fn fn_tan(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| finite(a[0].tan()))
}

/// ASIN(number) - #NUM! outside [-1, 1]
pub fn fn_asin(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0].abs() > 1.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].asin())
        }
    })
}

/// ACOS(number) - #NUM! outside [-1, 1]
pub fn fn_acos(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0].abs() > 1.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].acos())
        }
    })
}

/// ATAN(number)
pub fn fn_atan(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].atan()))
}

/// ATAN2(x_num, y_num) - Angle of the point (x, y)
pub fn fn_atan2(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (x, y) = (a[0], a[1]);
        if x == 0.0 && y == 0.0 {
            Err(ErrorValue::Div0)
        } else {
            Ok(y.atan2(x))
        }
    })
}

/// SINH(number)
pub fn fn_sinh(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| finite(a[0].sinh()))
}

/// COSH(number)
pub fn fn_cosh(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| finite(a[0].cosh()))
}

/// TANH(number)
pub fn fn_tanh(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].tanh()))
}

/// ASINH(number)
pub fn fn_asinh(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].asinh()))
}

/// ACOSH(number) - #NUM! below 1
pub fn fn_acosh(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0] < 1.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].acosh())
        }
    })
}

/// ATANH(number) - #NUM! unless -1 < number < 1
pub fn fn_atanh(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0].abs() >= 1.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(a[0].atanh())
        }
    })
}

/// DEGREES(angle)
pub fn fn_degrees(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].to_degrees()))
}

/// RADIANS(angle)
pub fn fn_radians(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(a[0].to_radians()))
}

// ==================== Matrices ====================

/// A fully numeric matrix, `#VALUE!` if any element is not a number
fn numeric_matrix(a: &Array2D) -> Calc<Vec<Vec<f64>>> {
    let mut out = Vec::with_capacity(a.rows());
    for r in 0..a.rows() {
        let mut row = Vec::with_capacity(a.cols());
        for v in a.row_slice(r) {
            match v {
                Value::Number(n) => row.push(*n),
                Value::Error(e) => return Err(*e),
                _ => return Err(ErrorValue::Value),
            }
        }
        out.push(row);
    }
    Ok(out)
}

fn matrix_value(m: Vec<Vec<f64>>) -> Value {
    let rows = m
        .into_iter()
        .map(|r| r.into_iter().map(Value::Number).collect())
        .collect();
    Array2D::from_rows(rows).map_or(Value::Error(ErrorValue::Value), Value::Array)
}

/// MMULT(array1, array2)
pub fn fn_mmult(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.arrays();
    let a = numeric_matrix(&array(args[0].clone())?)?;
    let b = numeric_matrix(&array(args[1].clone())?)?;
    let inner = a.first().map_or(0, Vec::len);
    if inner != b.len() {
        return Ok(Value::Error(ErrorValue::Value));
    }
    let cols = b.first().map_or(0, Vec::len);
    let product = a
        .iter()
        .map(|row| {
            (0..cols)
                .map(|j| row.iter().zip(&b).map(|(x, brow)| x * brow[j]).sum())
                .collect()
        })
        .collect();
    Ok(matrix_value(product))
}

/// LU decomposition with partial pivoting: returns the determinant and, when it is
/// non-zero, the inverse
fn gauss_jordan(mut m: Vec<Vec<f64>>) -> (f64, Option<Vec<Vec<f64>>>) {
    let n = m.len();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    let mut det = 1.0;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < 1e-300 {
            return (0.0, None);
        }
        if pivot != col {
            m.swap(pivot, col);
            inv.swap(pivot, col);
            det = -det;
        }
        let p = m[col][col];
        det *= p;
        for j in 0..n {
            m[col][j] /= p;
            inv[col][j] /= p;
        }
        for r in 0..n {
            if r != col {
                let factor = m[r][col];
                if factor != 0.0 {
                    for j in 0..n {
                        m[r][j] -= factor * m[col][j];
                        inv[r][j] -= factor * inv[col][j];
                    }
                }
            }
        }
    }
    (det, Some(inv))
}

fn square_matrix(call: &FnCall<'_>) -> FormulaResult<Vec<Vec<f64>>> {
    let args = call.arrays();
    let a = array(args[0].clone())?;
    if a.rows() != a.cols() {
        return Err(ErrorValue::Value.into());
    }
    Ok(numeric_matrix(&a)?)
}

/// MDETERM(array)
pub fn fn_mdeterm(call: &FnCall<'_>) -> FormulaResult<Value> {
    let m = square_matrix(call)?;
    Ok(Value::Number(gauss_jordan(m).0))
}

/// MINVERSE(array) - #NUM! for singular matrices
pub fn fn_minverse(call: &FnCall<'_>) -> FormulaResult<Value> {
    let m = square_matrix(call)?;
    match gauss_jordan(m) {
        (_, Some(inv)) => Ok(matrix_value(inv)),
        (_, None) => Ok(Value::Error(ErrorValue::Num)),
    }
}

/// TRANSPOSE(array)
pub fn fn_transpose(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.arrays();
    call.cx.check_aborted()?;
    match &args[0] {
        Value::Error(e) => Ok(Value::Error(*e)),
        other => Ok(Value::Array(as_array(other.clone()).transpose())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_approx, eval, eval_in, sheet_with};

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(eval("=ROUND(2.5,0)"), Value::Number(3.0));
        assert_eq!(eval("=ROUND(-2.5,0)"), Value::Number(-3.0));
        assert_eq!(eval("=ROUND(2.675,2)"), Value::Number(2.68));
        assert_eq!(eval("=ROUND(1234.5678,-2)"), Value::Number(1200.0));
        assert_eq!(eval("=ROUND(1.5,)"), Value::Number(2.0));
        assert_eq!(eval("=ROUNDUP(3.2,0)"), Value::Number(4.0));
        assert_eq!(eval("=ROUNDDOWN(-3.7,0)"), Value::Number(-3.0));
        assert_eq!(eval("=TRUNC(8.9)"), Value::Number(8.0));
        assert_eq!(eval("=INT(-8.9)"), Value::Number(-9.0));
    }

    #[test]
    fn test_ceiling_floor() {
        assert_eq!(eval("=CEILING(2.5,1)"), Value::Number(3.0));
        assert_eq!(eval("=CEILING(-2.5,-2)"), Value::Number(-4.0));
        assert_eq!(eval("=CEILING(2.5,-1)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=FLOOR(2.5,1)"), Value::Number(2.0));
        assert_eq!(eval("=FLOOR(2.5,0)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=MROUND(10,3)"), Value::Number(9.0));
        assert_eq!(eval("=EVEN(1.5)"), Value::Number(2.0));
        assert_eq!(eval("=ODD(-2)"), Value::Number(-3.0));
    }

    #[test]
    fn test_mod_and_quotient() {
        assert_eq!(eval("=MOD(3,2)"), Value::Number(1.0));
        assert_eq!(eval("=MOD(-3,2)"), Value::Number(1.0));
        assert_eq!(eval("=MOD(3,-2)"), Value::Number(-1.0));
        assert_eq!(eval("=MOD(1,0)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=QUOTIENT(-7,2)"), Value::Number(-3.0));
    }

    #[test]
    fn test_logs_and_roots() {
        assert_eq!(eval("=SQRT(-1)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=LOG(100)"), Value::Number(2.0));
        assert_eq!(eval("=LOG(8,1)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=LN(0)"), Value::Error(ErrorValue::Num));
        assert_approx(eval("=SQRTPI(1)"), std::f64::consts::PI.sqrt());
        assert_eq!(eval("=POWER(2,-1)"), Value::Number(0.5));
    }

    #[test]
    fn test_combinatorics() {
        assert_eq!(eval("=FACT(5)"), Value::Number(120.0));
        assert_eq!(eval("=FACT(-1)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=FACTDOUBLE(7)"), Value::Number(105.0));
        assert_eq!(eval("=COMBIN(10,3)"), Value::Number(120.0));
        assert_eq!(eval("=COMBIN(1e10,5e9)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=PERMUT(5,2)"), Value::Number(20.0));
        assert_eq!(eval("=GCD(12,18,30)"), Value::Number(6.0));
        assert_eq!(eval("=LCM(4,6)"), Value::Number(12.0));
        assert_eq!(eval("=GCD(-1,2)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_trig() {
        assert_approx(eval("=SIN(PI()/2)"), 1.0);
        assert_approx(eval("=ATAN2(1,1)"), std::f64::consts::FRAC_PI_4);
        assert_eq!(eval("=ATAN2(0,0)"), Value::Error(ErrorValue::Div0));
        assert_eq!(eval("=ASIN(2)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=ACOSH(0.5)"), Value::Error(ErrorValue::Num));
        assert_approx(eval("=DEGREES(PI())"), 180.0);
    }

    #[test]
    fn test_sum_family() {
        let book = sheet_with(&[("A1", 1.0), ("A2", 2.0), ("A3", 3.0), ("B1", 4.0), ("B2", 5.0), ("B3", 6.0)]);
        assert_eq!(eval_in(&book, "=SUM(A1:A3,10)"), Value::Number(16.0));
        assert_eq!(eval_in(&book, "=PRODUCT(A1:A3)"), Value::Number(6.0));
        assert_eq!(eval_in(&book, "=SUMSQ(A1:A3,2)"), Value::Number(18.0));
        assert_eq!(eval_in(&book, "=SUMSQ(A1:A2)"), Value::Number(5.0));
        assert_eq!(eval_in(&book, "=SUMPRODUCT(A1:A3,B1:B3)"), Value::Number(32.0));
        assert_eq!(eval_in(&book, "=SUMPRODUCT((A1:A3>1)*B1:B3)"), Value::Number(11.0));
        assert_eq!(eval_in(&book, "=SUMPRODUCT(A1:A3,B1:B2)"), Value::Error(ErrorValue::Value));
        assert_eq!(eval_in(&book, "=SUMX2MY2(A1:A3,B1:B3)"), Value::Number(-63.0));
        assert_eq!(eval_in(&book, "=SUMX2PY2(A1:A3,B1:B3)"), Value::Number(91.0));
        assert_eq!(eval_in(&book, "=SUMXMY2(A1:A3,B1:B3)"), Value::Number(27.0));
        assert_eq!(eval_in(&book, "=SERIESSUM(2,0,1,A1:A3)"), Value::Number(17.0));
    }

    #[test]
    fn test_sum_literals_coerce() {
        assert_eq!(eval("=SUM(\"3\",TRUE,)"), Value::Number(4.0));
        assert_eq!(eval("=SUM(\"x\")"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=SUM({1,\"2\",3})"), Value::Number(4.0));
    }

    #[test]
    fn test_matrices() {
        assert_eq!(eval("=MDETERM({1,2;3,4})"), Value::Number(-2.0));
        assert_eq!(eval("=MDETERM({1,2})"), Value::Error(ErrorValue::Value));
        assert_eq!(eval("=INDEX(MMULT({1,2;3,4},{5;6}),2,1)"), Value::Number(39.0));
        assert_approx(eval("=INDEX(MINVERSE({4,7;2,6}),1,1)"), 0.6);
        assert_eq!(eval("=MINVERSE({1,2;2,4})"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=INDEX(TRANSPOSE({1,2,3}),3,1)"), Value::Number(3.0));
    }

    #[test]
    fn test_rand() {
        let Value::Number(x) = eval("=RAND()") else { panic!("RAND") };
        assert!((0.0..1.0).contains(&x));
        let Value::Number(y) = eval("=RANDBETWEEN(1,3)") else { panic!("RANDBETWEEN") };
        assert!((1.0..=3.0).contains(&y));
        assert_eq!(eval("=RANDBETWEEN(5,1)"), Value::Error(ErrorValue::Num));
    }
}
