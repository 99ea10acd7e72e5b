//! Financial functions
//!
//! Cash flows follow the sign convention of the host application: money paid out is
//! negative. `type` 0 means payments at the end of each period, 1 at the beginning.

use super::args::{array, array_numbers, doubles, finite, number, opt_number};
use super::{FnCall, FunctionRegistry};
use crate::aggregate::{reduce_args, COLLECT, ERR2};
use crate::context::{SECANT_MAX_ITER, SECANT_TOLERANCE};
use crate::error::{Calc, FormulaResult};
use crate::value::Value;
use gridcalc_core::ErrorValue;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("PV", 3, Some(5), fn_pv);
    r.add("FV", 3, Some(5), fn_fv);
    r.add("PMT", 3, Some(5), fn_pmt);
    r.add("NPER", 3, Some(5), fn_nper);
    r.add("IPMT", 4, Some(6), fn_ipmt);
    r.add("PPMT", 4, Some(6), fn_ppmt);
    r.add("ISPMT", 4, Some(4), fn_ispmt);
    r.add("RATE", 3, Some(6), fn_rate);
    r.add("NPV", 2, None, fn_npv);
    r.add("IRR", 1, Some(2), fn_irr);
    r.add("MIRR", 3, Some(3), fn_mirr);
    r.add("SLN", 3, Some(3), fn_sln);
    r.add("SYD", 4, Some(4), fn_syd);
    r.add("DB", 4, Some(5), fn_db);
    r.add("DDB", 4, Some(5), fn_ddb);
    r.add("VDB", 5, Some(7), fn_vdb);
}

// ==================== Time value of money ====================

/// Growth factor of the annuity term: `(1 + r*type) * ((1+r)^n - 1) / r`
fn annuity(rate: f64, nper: f64, due: bool) -> f64 {
    let growth = ((1.0 + rate).powf(nper) - 1.0) / rate;
    if due {
        growth * (1.0 + rate)
    } else {
        growth
    }
}

pub(crate) fn future_value(rate: f64, nper: f64, pmt: f64, pv: f64, due: bool) -> f64 {
    if rate == 0.0 {
        -(pv + pmt * nper)
    } else {
        -(pv * (1.0 + rate).powf(nper) + pmt * annuity(rate, nper, due))
    }
}

pub(crate) fn present_value(rate: f64, nper: f64, pmt: f64, fv: f64, due: bool) -> f64 {
    if rate == 0.0 {
        -(fv + pmt * nper)
    } else {
        -(fv + pmt * annuity(rate, nper, due)) / (1.0 + rate).powf(nper)
    }
}

pub(crate) fn payment(rate: f64, nper: f64, pv: f64, fv: f64, due: bool) -> Calc<f64> {
    if nper == 0.0 {
        return Err(ErrorValue::Num);
    }
    if rate == 0.0 {
        return Ok(-(pv + fv) / nper);
    }
    finite(-(pv * (1.0 + rate).powf(nper) + fv) / annuity(rate, nper, due))
}

fn interest_payment(rate: f64, per: f64, nper: f64, pv: f64, fv: f64, due: bool) -> Calc<f64> {
    if per < 1.0 || per > nper {
        return Err(ErrorValue::Num);
    }
    if due && per == 1.0 {
        return Ok(0.0);
    }
    let pmt = payment(rate, nper, pv, fv, due)?;
    let balance = future_value(rate, per - 1.0, pmt, pv, due);
    let interest = balance * rate;
    finite(if due { interest / (1.0 + rate) } else { interest })
}

/// PV(rate, nper, pmt, [fv], [type])
pub fn fn_pv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, Some(0.0), Some(0.0)], |a| {
        finite(present_value(a[0], a[1], a[2], a[3], a[4] != 0.0))
    })
}

/// FV(rate, nper, pmt, [pv], [type])
pub fn fn_fv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, Some(0.0), Some(0.0)], |a| {
        finite(future_value(a[0], a[1], a[2], a[3], a[4] != 0.0))
    })
}

/// PMT(rate, nper, pv, [fv], [type])
pub fn fn_pmt(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, Some(0.0), Some(0.0)], |a| {
        payment(a[0], a[1], a[2], a[3], a[4] != 0.0)
    })
}

/// NPER(rate, pmt, pv, [fv], [type])
pub fn fn_nper(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, Some(0.0), Some(0.0)], |a| {
        let (rate, pmt, pv, fv, due) = (a[0], a[1], a[2], a[3], a[4] != 0.0);
        if rate == 0.0 {
            if pmt == 0.0 {
                return Err(ErrorValue::Num);
            }
            return Ok(-(pv + fv) / pmt);
        }
        let flow = pmt * if due { 1.0 + rate } else { 1.0 };
        let ratio = (flow - fv * rate) / (flow + pv * rate);
        if ratio <= 0.0 || rate <= -1.0 {
            return Err(ErrorValue::Num);
        }
        finite(ratio.ln() / (1.0 + rate).ln())
    })
}

/// IPMT(rate, per, nper, pv, [fv], [type]) - Interest part of one payment
pub fn fn_ipmt(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None, Some(0.0), Some(0.0)], |a| {
        interest_payment(a[0], a[1], a[2], a[3], a[4], a[5] != 0.0)
    })
}

/// PPMT(rate, per, nper, pv, [fv], [type]) - Principal part of one payment
pub fn fn_ppmt(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None, Some(0.0), Some(0.0)], |a| {
        let due = a[5] != 0.0;
        let pmt = payment(a[0], a[2], a[3], a[4], due)?;
        Ok(pmt - interest_payment(a[0], a[1], a[2], a[3], a[4], due)?)
    })
}

/// ISPMT(rate, per, nper, pv) - Interest paid during a period of a straight-line loan
pub fn fn_ispmt(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        if a[2] == 0.0 {
            return Err(ErrorValue::Div0);
        }
        Ok(a[3] * a[0] * (a[1] / a[2] - 1.0))
    })
}

// ==================== Root finding ====================

/// Secant search for a root of `f` starting at `guess`.
///
/// Two iterates with the same function value would divide by zero, so the newer one
/// is nudged instead.
fn secant(guess: f64, f: impl Fn(f64) -> f64) -> Calc<f64> {
    let mut x0 = guess;
    let mut x1 = if guess == 0.0 { 0.1 } else { guess * 1.1 };
    let mut f0 = f(x0);
    for _ in 0..SECANT_MAX_ITER {
        let mut f1 = f(x1);
        if !f1.is_finite() || !f0.is_finite() {
            return Err(ErrorValue::Num);
        }
        if f1 == 0.0 {
            return Ok(x1);
        }
        if f1 == f0 {
            x1 += if x1.abs() > 1e-3 { x1 * 1e-3 } else { 1e-4 };
            f1 = f(x1);
            if f1 == f0 {
                return Err(ErrorValue::Num);
            }
        }
        let x2 = x1 - f1 * (x1 - x0) / (f1 - f0);
        if (x2 - x1).abs() < SECANT_TOLERANCE {
            return finite(x2);
        }
        x0 = x1;
        f0 = f1;
        x1 = x2;
    }
    Err(ErrorValue::Num)
}

/// RATE(nper, pmt, pv, [fv], [type], [guess])
pub fn fn_rate(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(
        &[None, None, None, Some(0.0), Some(0.0), Some(0.1)],
        |a| {
            let (nper, pmt, pv, fv, due) = (a[0], a[1], a[2], a[3], a[4] != 0.0);
            if nper <= 0.0 {
                return Err(ErrorValue::Num);
            }
            secant(a[5], |rate| {
                if rate == 0.0 {
                    pv + pmt * nper + fv
                } else {
                    pv * (1.0 + rate).powf(nper) + pmt * annuity(rate, nper, due) + fv
                }
            })
        },
    )
}

/// Σ flow / (1+rate)^i for i starting at `first`
fn discounted(rate: f64, flows: &[f64], first: i32) -> f64 {
    flows
        .iter()
        .zip(first..)
        .map(|(v, i)| v / (1.0 + rate).powi(i))
        .sum()
}

/// NPV(rate, value1, ...) - The first flow is discounted one period
pub fn fn_npv(call: &FnCall<'_>) -> FormulaResult<Value> {
    let flows = doubles(reduce_args(call.list, &call.cx, call.argc - 1, &COLLECT)?)?;
    let rate = number(&call.list.evaluate_token(&call.cx, &ERR2), call.dates_1904())?;
    if rate == -1.0 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    Ok(finite(discounted(rate, &flows, 1)).into())
}

/// Numbers of the cash-flow array argument
fn cash_flows(v: &Value) -> Calc<Vec<f64>> {
    array_numbers(&array(v.clone())?)
}

/// IRR(values, [guess])
pub fn fn_irr(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.mixed(&[0]);
    let flows = cash_flows(&args[0])?;
    let guess = opt_number(&args, 1, 0.1, call.dates_1904())?;
    if !flows.iter().any(|v| *v > 0.0) || !flows.iter().any(|v| *v < 0.0) {
        return Ok(Value::Error(ErrorValue::Num));
    }
    Ok(secant(guess, |rate| discounted(rate, &flows, 0)).into())
}

/// MIRR(values, finance_rate, reinvest_rate)
pub fn fn_mirr(call: &FnCall<'_>) -> FormulaResult<Value> {
    let args = call.mixed(&[0]);
    let flows = cash_flows(&args[0])?;
    let d = call.dates_1904();
    let (finance, reinvest) = (number(&args[1], d)?, number(&args[2], d)?);
    let n = flows.len() as f64;
    if n < 2.0 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    let negatives: Vec<f64> = flows.iter().map(|v| v.min(0.0)).collect();
    let positives: Vec<f64> = flows.iter().map(|v| v.max(0.0)).collect();
    let pv_neg = discounted(finance, &negatives, 1);
    let pv_pos = discounted(reinvest, &positives, 1);
    if pv_neg == 0.0 || pv_pos == 0.0 {
        return Ok(Value::Error(ErrorValue::Div0));
    }
    let ratio = -pv_pos * (1.0 + reinvest).powf(n) / (pv_neg * (1.0 + finance));
    Ok(finite(ratio.powf(1.0 / (n - 1.0)) - 1.0).into())
}

// ==================== Depreciation ====================

/// SLN(cost, salvage, life)
pub fn fn_sln(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        if a[2] == 0.0 {
            return Err(ErrorValue::Div0);
        }
        Ok((a[0] - a[1]) / a[2])
    })
}

/// SYD(cost, salvage, life, per) - Sum-of-years' digits
pub fn fn_syd(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        let (cost, salvage, life, per) = (a[0], a[1], a[2], a[3]);
        if life <= 0.0 || per <= 0.0 || per > life {
            return Err(ErrorValue::Num);
        }
        Ok((cost - salvage) * (life - per + 1.0) * 2.0 / (life * (life + 1.0)))
    })
}

/// DB(cost, salvage, life, period, [month]) - Fixed declining balance with the rate
/// rounded to three decimals
pub fn fn_db(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None, Some(12.0)], |a| {
        let (cost, salvage, life, period, month) =
            (a[0], a[1], a[2].trunc(), a[3].trunc(), a[4].trunc());
        if cost < 0.0 || salvage < 0.0 || life <= 0.0 || period <= 0.0 {
            return Err(ErrorValue::Num);
        }
        if !(1.0..=12.0).contains(&month) || period > life + 1.0 || (period > life && month == 12.0) {
            return Err(ErrorValue::Num);
        }
        if cost == 0.0 {
            return Ok(0.0);
        }
        let rate = ((1.0 - (salvage / cost).powf(1.0 / life)) * 1000.0).round() / 1000.0;
        let mut total = cost * rate * month / 12.0;
        let mut current = total;
        let mut p = 2.0;
        while p <= period {
            current = if p == life + 1.0 {
                (cost - total) * rate * (12.0 - month) / 12.0
            } else {
                (cost - total) * rate
            };
            total += current;
            p += 1.0;
        }
        Ok(current)
    })
}

/// Double-declining depreciation of one (possibly fractional) period
fn ddb(cost: f64, salvage: f64, life: f64, period: f64, factor: f64) -> f64 {
    let mut rate = factor / life;
    let old = if rate >= 1.0 {
        rate = 1.0;
        if period == 1.0 {
            cost
        } else {
            0.0
        }
    } else {
        cost * (1.0 - rate).powf(period - 1.0)
    };
    let new = cost * (1.0 - rate).powf(period);
    let depreciation = if new < salvage { old - salvage } else { old - new };
    depreciation.max(0.0)
}

/// DDB(cost, salvage, life, period, [factor])
pub fn fn_ddb(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None, Some(2.0)], |a| {
        let (cost, salvage, life, period, factor) = (a[0], a[1], a[2], a[3], a[4]);
        if cost < 0.0 || salvage < 0.0 || life <= 0.0 || period <= 0.0 || period > life || factor <= 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(ddb(cost, salvage, life, period, factor))
    })
}

/// Declining balance through `period`, switching to straight line once that is larger
fn switching_depreciation(
    cost: f64,
    salvage: f64,
    life: f64,
    remaining_life: f64,
    period: f64,
    factor: f64,
) -> f64 {
    let end = period.ceil();
    let mut total = 0.0;
    let mut remaining = cost - salvage;
    let mut straight = 0.0;
    let mut switched = false;
    let mut i = 1.0;
    while i <= end {
        let mut term = if switched {
            straight
        } else {
            let declining = ddb(cost, salvage, life, i, factor);
            straight = remaining / (remaining_life - (i - 1.0));
            if straight > declining {
                switched = true;
                straight
            } else {
                remaining -= declining;
                declining
            }
        };
        if i == end {
            term *= period + 1.0 - end;
        }
        total += term;
        i += 1.0;
    }
    total
}

/// VDB(cost, salvage, life, start_period, end_period, [factor], [no_switch])
pub fn fn_vdb(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(
        &[None, None, None, None, None, Some(2.0), Some(0.0)],
        |a| {
            let (mut cost, salvage, life, mut start, mut end, factor) =
                (a[0], a[1], a[2], a[3], a[4], a[5]);
            let no_switch = a[6] != 0.0;
            if cost < 0.0 || salvage < 0.0 || life <= 0.0 || factor <= 0.0 {
                return Err(ErrorValue::Num);
            }
            if start < 0.0 || end < start || end > life {
                return Err(ErrorValue::Num);
            }
            let (int_start, int_end) = (start.floor(), end.ceil());
            if no_switch {
                let mut total = 0.0;
                let mut i = int_start + 1.0;
                while i <= int_end {
                    let mut term = ddb(cost, salvage, life, i, factor);
                    if i == int_start + 1.0 {
                        term *= end.min(int_start + 1.0) - start;
                    } else if i == int_end {
                        term *= end + 1.0 - int_end;
                    }
                    total += term;
                    i += 1.0;
                }
                return Ok(total);
            }
            let mut life1 = life;
            if start != int_start && factor > 1.0 && start >= life / 2.0 {
                let part = start - life / 2.0;
                start = life / 2.0;
                end -= part;
                life1 += 1.0;
            }
            cost -= switching_depreciation(cost, salvage, life, life1, start, factor);
            Ok(switching_depreciation(cost, salvage, life, life - start, end - start, factor))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_near, eval, eval_in, sheet_with};

    #[test]
    fn test_annuities() {
        assert_near(eval("=PMT(0.08/12,10,10000)"), -1037.0320893591, 1e-8);
        assert_near(eval("=PMT(0,10,1000)"), -100.0, 1e-12);
        assert_near(eval("=FV(0.06/12,10,-200,-500,1)"), 2581.4033740601, 1e-8);
        assert_near(eval("=PV(0.08/12,12*20,500,,0)"), -59777.145851188, 1e-6);
        assert_near(eval("=NPER(0.12/12,-100,-1000,10000,1)"), 59.673865674, 1e-8);
        assert_near(eval("=NPER(0,-100,1000)"), 10.0, 1e-12);
        assert_eq!(eval("=NPER(0,0,1000)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_payment_parts() {
        assert_near(eval("=IPMT(0.1/12,1,36,8000)"), -66.666666667, 1e-8);
        assert_near(eval("=IPMT(0.1,3,3,8000)"), -292.447129909, 1e-8);
        assert_near(eval("=PPMT(0.1/12,1,24,2000)"), -75.623186008, 1e-8);
        assert_eq!(eval("=IPMT(0.1,4,3,8000)"), Value::Error(ErrorValue::Num));
        assert_near(eval("=IPMT(0.1,2,3,8000)+PPMT(0.1,2,3,8000)"), -3216.918429, 1e-5);
        assert_near(eval("=ISPMT(0.1/12,1,36,8000000)"), -64814.814815, 1e-5);
    }

    #[test]
    fn test_rate_and_irr() {
        assert_near(eval("=RATE(4*12,-200,8000)"), 0.0077014724, 1e-9);
        assert_near(eval("=IRR({-70000,12000,15000,18000,21000,26000})"), 0.0866309480, 1e-9);
        assert_near(eval("=IRR({-70000,12000,15000,18000,21000},-0.1)"), -0.0212448482, 1e-9);
        assert_eq!(eval("=IRR({100,200})"), Value::Error(ErrorValue::Num));
        assert_near(
            eval("=MIRR({-120000,39000,30000,21000,37000,46000},0.1,0.12)"),
            0.1260941303,
            1e-9,
        );
    }

    #[test]
    fn test_npv_reads_ranges() {
        let book = sheet_with(&[("A1", -10000.0), ("A2", 3000.0), ("A3", 4200.0), ("A4", 6800.0)]);
        assert_near(eval_in(&book, "=NPV(0.1,A1:A4)"), 1188.4434123352, 1e-8);
        assert_near(eval("=NPV(0.1,-10000,3000,4200,6800)"), 1188.4434123352, 1e-8);
    }

    #[test]
    fn test_depreciation() {
        assert_near(eval("=SLN(30000,7500,10)"), 2250.0, 1e-12);
        assert_eq!(eval("=SLN(30000,7500,0)"), Value::Error(ErrorValue::Div0));
        assert_near(eval("=SYD(30000,7500,10,1)"), 4090.909090909, 1e-8);
        assert_near(eval("=DB(1000000,100000,6,1,7)"), 186083.33333333, 1e-6);
        assert_near(eval("=DB(1000000,100000,6,2,7)"), 259639.41666667, 1e-6);
        assert_near(eval("=DB(1000000,100000,6,7,7)"), 15845.098473, 1e-5);
        assert_near(eval("=DDB(2400,300,10,1)"), 480.0, 1e-12);
        assert_near(eval("=DDB(2400,300,3650,1)"), 1.3150685, 1e-6);
        assert_near(eval("=DDB(2400,300,10,10)"), 22.1225472, 1e-6);
        assert_eq!(eval("=DDB(2400,300,10,11)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_variable_declining_balance() {
        assert_near(eval("=VDB(2400,300,10,0,1)"), 480.0, 1e-9);
        assert_near(eval("=VDB(2400,300,10*12,0,1)"), 40.0, 1e-9);
        assert_near(eval("=VDB(2400,300,10*12,6,18)"), 396.306053, 1e-5);
        assert_near(eval("=VDB(2400,300,10,0,10)"), 2100.0, 1e-9);
        assert_eq!(eval("=VDB(2400,300,10,5,4)"), Value::Error(ErrorValue::Num));
    }
}
