//! Probability distributions and their inverses

use super::args::finite;
use super::math::combin;
use super::{FnCall, FunctionRegistry};
use crate::context::{INVERSE_TOLERANCE, NEWTON_MAX_ITER};
use crate::error::{Calc, FormulaResult};
use crate::value::Value;
use gridcalc_core::ErrorValue;
use std::f64::consts::PI;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.add("NORMDIST", 4, Some(4), fn_normdist);
    r.add("NORMINV", 3, Some(3), fn_norminv);
    r.add("NORMSDIST", 1, Some(1), fn_normsdist);
    r.add("NORMSINV", 1, Some(1), fn_normsinv);
    r.add("LOGNORMDIST", 3, Some(3), fn_lognormdist);
    r.add("LOGINV", 3, Some(3), fn_loginv);
    r.add("CONFIDENCE", 3, Some(3), fn_confidence);

    r.add("GAMMADIST", 4, Some(4), fn_gammadist);
    r.add("GAMMAINV", 3, Some(3), fn_gammainv);
    r.add("GAMMALN", 1, Some(1), fn_gammaln);
    r.add("CHIDIST", 2, Some(2), fn_chidist);
    r.add("CHIINV", 2, Some(2), fn_chiinv);
    r.add("BETADIST", 3, Some(5), fn_betadist);
    r.add("BETAINV", 3, Some(5), fn_betainv);
    r.add("FDIST", 3, Some(3), fn_fdist);
    r.add("FINV", 3, Some(3), fn_finv);
    r.add("TDIST", 3, Some(3), fn_tdist);
    r.add("TINV", 2, Some(2), fn_tinv);
    r.add("EXPONDIST", 3, Some(3), fn_expondist);
    r.add("WEIBULL", 4, Some(4), fn_weibull);

    r.add("BINOMDIST", 4, Some(4), fn_binomdist);
    r.add("CRITBINOM", 3, Some(3), fn_critbinom);
    r.add("NEGBINOMDIST", 3, Some(3), fn_negbinomdist);
    r.add("POISSON", 3, Some(3), fn_poisson);
    r.add("HYPGEOMDIST", 4, Some(4), fn_hypgeomdist);
}

// ==================== Special functions ====================

/// Natural logarithm of Γ(x), Lanczos approximation (g = 7)
#[allow(clippy::excessive_precision)]
pub(crate) fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const C: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        PI.ln() - (PI * x).sin().abs().ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut sum = C[0];
        for (i, c) in C.iter().enumerate().skip(1) {
            sum += c / (x + i as f64);
        }
        let t = x + G + 0.5;
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
    }
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Regularized lower incomplete gamma P(a, x): power series below a+1, continued
/// fraction above
pub(crate) fn gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let prefix = (-x + a * x.ln() - ln_gamma(a)).exp();
    if x < a + 1.0 {
        let mut term = 1.0 / a;
        let mut sum = term;
        for n in 1..500 {
            term *= x / (a + n as f64);
            sum += term;
            if term.abs() < sum.abs() * 1e-16 {
                break;
            }
        }
        (sum * prefix).min(1.0)
    } else {
        1.0 - gamma_cf(a, x) * prefix
    }
}

/// Modified Lentz evaluation of the upper incomplete gamma continued fraction
fn gamma_cf(a: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..500 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < 1e-16 {
            break;
        }
    }
    h
}

/// Regularized incomplete beta I_x(a, b)
pub(crate) fn beta_i(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    if x > (a + 1.0) / (a + b + 2.0) {
        return 1.0 - beta_i(1.0 - x, b, a);
    }
    let prefix = (a * x.ln() + b * (1.0 - x).ln() - ln_beta(a, b)).exp() / a;
    prefix * beta_cf(x, a, b)
}

fn beta_cf(x: f64, a: f64, b: f64) -> f64 {
    const TINY: f64 = 1e-300;
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..500 {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < 1e-16 {
            break;
        }
    }
    h
}

/// Standard normal cumulative distribution, W. J. Cody's rational Chebyshev
/// approximations on three intervals
#[allow(clippy::excessive_precision)]
pub(crate) fn norm_s_cdf(x: f64) -> f64 {
    const A: [f64; 5] = [
        2.2352520354606839287,
        161.02823106855587881,
        1067.6894854603709582,
        18154.981253343561249,
        0.065682337918207449113,
    ];
    const B: [f64; 4] = [
        47.20258190468824187,
        976.09855173777669322,
        10260.932208618978205,
        45507.789335026729956,
    ];
    const C: [f64; 9] = [
        0.39894151208813466764,
        8.8831497943883759412,
        93.506656132177855979,
        597.27027639480026226,
        2494.5375852903726711,
        6848.1904505362823326,
        11602.651437647350124,
        9842.7148383839780218,
        1.0765576773720192317e-8,
    ];
    const D: [f64; 8] = [
        22.266688044328115691,
        235.38790178262499861,
        1519.377599407554805,
        6485.558298266760755,
        18615.571640885098091,
        34900.952721145977266,
        38912.003286093271411,
        19685.429676859990727,
    ];
    const P: [f64; 6] = [
        0.21589853405795699,
        0.1274011611602473639,
        0.022235277870649807,
        0.001421619193227893466,
        2.9112874951168792e-5,
        0.02307344176494017303,
    ];
    const Q: [f64; 5] = [
        1.28426009614491121,
        0.468238212480865118,
        0.0659881378689285515,
        0.00378239633202758244,
        7.29751555083966205e-5,
    ];
    const SQRT_32: f64 = 5.656854249492380195206754896838;
    const FRAC_1_SQRT_2PI: f64 = 0.398942280401432677939946059934;

    if x.is_nan() {
        return f64::NAN;
    }
    let y = x.abs();
    // upper tail mass of |x| for the two outer intervals
    let tail = |temp: f64| {
        let xsq = (y * 16.0).trunc() / 16.0;
        let del = (y - xsq) * (y + xsq);
        (-xsq * xsq * 0.5).exp() * (-del * 0.5).exp() * temp
    };
    if y <= 0.67448975 {
        let (mut xnum, mut xden) = (0.0, 0.0);
        if y > 1.11e-16 {
            let xsq = x * x;
            xnum = A[4] * xsq;
            xden = xsq;
            for i in 0..3 {
                xnum = (xnum + A[i]) * xsq;
                xden = (xden + B[i]) * xsq;
            }
        }
        return 0.5 + x * (xnum + A[3]) / (xden + B[3]);
    }
    let upper = if y <= SQRT_32 {
        let mut xnum = C[8] * y;
        let mut xden = y;
        for i in 0..7 {
            xnum = (xnum + C[i]) * y;
            xden = (xden + D[i]) * y;
        }
        tail((xnum + C[7]) / (xden + D[7]))
    } else {
        let xsq = 1.0 / (x * x);
        let mut xnum = P[5] * xsq;
        let mut xden = xsq;
        for i in 0..4 {
            xnum = (xnum + P[i]) * xsq;
            xden = (xden + Q[i]) * xsq;
        }
        let temp = xsq * (xnum + P[4]) / (xden + Q[4]);
        tail((FRAC_1_SQRT_2PI - temp) / y)
    };
    if x > 0.0 {
        1.0 - upper
    } else {
        upper
    }
}

pub(crate) fn norm_s_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Acklam's rational approximation, used as the starting point for the inverse
#[allow(clippy::excessive_precision)]
fn norm_s_inv_guess(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

pub(crate) fn norm_s_inv(p: f64) -> Calc<f64> {
    if p <= 0.0 || p >= 1.0 {
        return Err(ErrorValue::Num);
    }
    invert(p, -40.0, 40.0, norm_s_inv_guess(p), norm_s_cdf, norm_s_pdf)
}

/// Solve `cdf(x) = p` for an increasing cdf on `[lo, hi]` (hi may be infinite) with
/// Newton steps, falling back to bisection when a step leaves the bracket.
/// `#N/A` when the iteration cap is reached without convergence.
fn invert(
    p: f64,
    mut lo: f64,
    mut hi: f64,
    start: f64,
    cdf: impl Fn(f64) -> f64,
    pdf: impl Fn(f64) -> f64,
) -> Calc<f64> {
    let mut x = if start > lo && start < hi {
        start
    } else if hi.is_finite() {
        (lo + hi) / 2.0
    } else {
        lo + 1.0
    };
    for _ in 0..NEWTON_MAX_ITER {
        let f = cdf(x) - p;
        if f.abs() < INVERSE_TOLERANCE {
            return Ok(x);
        }
        if f < 0.0 {
            lo = x;
        } else {
            hi = x;
        }
        let slope = pdf(x);
        let mut next = x - f / slope;
        if !(slope > 0.0 && next > lo && next < hi) {
            next = if hi.is_finite() { (lo + hi) / 2.0 } else { x.abs().max(1.0) * 2.0 };
        }
        if (next - x).abs() <= INVERSE_TOLERANCE * x.abs().max(1.0) {
            return Ok(next);
        }
        x = next;
    }
    if (cdf(x) - p).abs() < 1e-7 {
        Ok(x)
    } else {
        Err(ErrorValue::Na)
    }
}

// ==================== Normal family ====================

/// NORMDIST(x, mean, standard_dev, cumulative)
pub fn fn_normdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        let (x, mean, sd, cumulative) = (a[0], a[1], a[2], a[3] != 0.0);
        if sd <= 0.0 {
            return Err(ErrorValue::Num);
        }
        let z = (x - mean) / sd;
        Ok(if cumulative {
            norm_s_cdf(z)
        } else {
            norm_s_pdf(z) / sd
        })
    })
}

/// NORMINV(probability, mean, standard_dev)
pub fn fn_norminv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        if a[2] <= 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(a[1] + a[2] * norm_s_inv(a[0])?)
    })
}

/// NORMSDIST(z)
pub fn fn_normsdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| Ok(norm_s_cdf(a[0])))
}

/// NORMSINV(probability)
pub fn fn_normsinv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| norm_s_inv(a[0]))
}

/// LOGNORMDIST(x, mean, standard_dev) - Cumulative log-normal
pub fn fn_lognormdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        if a[0] <= 0.0 || a[2] <= 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(norm_s_cdf((a[0].ln() - a[1]) / a[2]))
    })
}

/// LOGINV(probability, mean, standard_dev)
pub fn fn_loginv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        if a[2] <= 0.0 {
            return Err(ErrorValue::Num);
        }
        finite((a[1] + a[2] * norm_s_inv(a[0])?).exp())
    })
}

/// CONFIDENCE(alpha, standard_dev, size) - Half-width of the confidence interval
pub fn fn_confidence(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (alpha, sd, n) = (a[0], a[1], a[2].trunc());
        if alpha <= 0.0 || alpha >= 1.0 || sd <= 0.0 || n < 1.0 {
            return Err(ErrorValue::Num);
        }
        Ok(norm_s_inv(1.0 - alpha / 2.0)? * sd / n.sqrt())
    })
}

// ==================== Gamma, chi-squared, beta, F, t ====================

fn gamma_pdf(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    ((a - 1.0) * x.ln() - x / b - a * b.ln() - ln_gamma(a)).exp()
}

/// GAMMADIST(x, alpha, beta, cumulative)
pub fn fn_gammadist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        let (x, alpha, beta, cumulative) = (a[0], a[1], a[2], a[3] != 0.0);
        if x < 0.0 || alpha <= 0.0 || beta <= 0.0 {
            return Err(ErrorValue::Num);
        }
        finite(if cumulative {
            gamma_p(alpha, x / beta)
        } else {
            gamma_pdf(x, alpha, beta)
        })
    })
}

fn gamma_inv(p: f64, alpha: f64, beta: f64) -> Calc<f64> {
    if !(0.0..1.0).contains(&p) || alpha <= 0.0 || beta <= 0.0 {
        return Err(ErrorValue::Num);
    }
    if p == 0.0 {
        return Ok(0.0);
    }
    invert(
        p,
        0.0,
        f64::INFINITY,
        alpha * beta,
        |x| gamma_p(alpha, x / beta),
        |x| gamma_pdf(x, alpha, beta),
    )
}

/// GAMMAINV(probability, alpha, beta)
pub fn fn_gammainv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| gamma_inv(a[0], a[1], a[2]))
}

/// GAMMALN(x)
pub fn fn_gammaln(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None], |a| {
        if a[0] <= 0.0 {
            Err(ErrorValue::Num)
        } else {
            Ok(ln_gamma(a[0]))
        }
    })
}

fn chi_df(df: f64) -> Calc<f64> {
    let df = df.trunc();
    if !(1.0..=1e10).contains(&df) {
        Err(ErrorValue::Num)
    } else {
        Ok(df)
    }
}

/// CHIDIST(x, degrees_freedom) - Right-tailed chi-squared probability
pub fn fn_chidist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let df = chi_df(a[1])?;
        if a[0] < 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(1.0 - gamma_p(df / 2.0, a[0] / 2.0))
    })
}

/// CHIINV(probability, degrees_freedom) - Inverse of CHIDIST
pub fn fn_chiinv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let df = chi_df(a[1])?;
        let p = a[0];
        if p <= 0.0 || p > 1.0 {
            return Err(ErrorValue::Num);
        }
        if p == 1.0 {
            return Ok(0.0);
        }
        gamma_inv(1.0 - p, df / 2.0, 2.0)
    })
}

fn beta_pdf(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 {
        return 0.0;
    }
    ((a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - ln_beta(a, b)).exp()
}

/// BETADIST(x, alpha, beta, [A], [B]) - Cumulative beta on [A, B]
pub fn fn_betadist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, Some(0.0), Some(1.0)], |a| {
        let (x, alpha, beta, lo, hi) = (a[0], a[1], a[2], a[3], a[4]);
        if alpha <= 0.0 || beta <= 0.0 || x < lo || x > hi || lo == hi {
            return Err(ErrorValue::Num);
        }
        Ok(beta_i((x - lo) / (hi - lo), alpha, beta))
    })
}

/// BETAINV(probability, alpha, beta, [A], [B])
pub fn fn_betainv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, Some(0.0), Some(1.0)], |a| {
        let (p, alpha, beta, lo, hi) = (a[0], a[1], a[2], a[3], a[4]);
        if p <= 0.0 || p > 1.0 || alpha <= 0.0 || beta <= 0.0 || lo >= hi {
            return Err(ErrorValue::Num);
        }
        if p == 1.0 {
            return Ok(hi);
        }
        let x = invert(
            p,
            0.0,
            1.0,
            alpha / (alpha + beta),
            |x| beta_i(x, alpha, beta),
            |x| beta_pdf(x, alpha, beta),
        )?;
        Ok(lo + x * (hi - lo))
    })
}

fn f_right_tail(x: f64, d1: f64, d2: f64) -> f64 {
    beta_i(d2 / (d2 + d1 * x), d2 / 2.0, d1 / 2.0)
}

fn f_freedom(d1: f64, d2: f64) -> Calc<(f64, f64)> {
    let (d1, d2) = (d1.trunc(), d2.trunc());
    if !(1.0..1e10).contains(&d1) || !(1.0..1e10).contains(&d2) {
        Err(ErrorValue::Num)
    } else {
        Ok((d1, d2))
    }
}

/// FDIST(x, degrees_freedom1, degrees_freedom2) - Right-tailed F probability
pub fn fn_fdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (d1, d2) = f_freedom(a[1], a[2])?;
        if a[0] < 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(f_right_tail(a[0], d1, d2))
    })
}

/// FINV(probability, degrees_freedom1, degrees_freedom2)
pub fn fn_finv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (d1, d2) = f_freedom(a[1], a[2])?;
        let p = a[0];
        if p <= 0.0 || p > 1.0 {
            return Err(ErrorValue::Num);
        }
        if p == 1.0 {
            return Ok(0.0);
        }
        // solve in the beta variable y = d2 / (d2 + d1 x), which falls as x grows
        let y = invert(
            p,
            0.0,
            1.0,
            0.5,
            |y| beta_i(y, d2 / 2.0, d1 / 2.0),
            |y| beta_pdf(y, d2 / 2.0, d1 / 2.0),
        )?;
        finite(d2 * (1.0 - y) / (d1 * y))
    })
}

/// TDIST(x, degrees_freedom, tails)
pub fn fn_tdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (x, df, tails) = (a[0], a[1].trunc(), a[2].trunc());
        if x < 0.0 || df < 1.0 || !(tails == 1.0 || tails == 2.0) {
            return Err(ErrorValue::Num);
        }
        let one_tail = 0.5 * beta_i(df / (df + x * x), df / 2.0, 0.5);
        Ok(one_tail * tails)
    })
}

/// TINV(probability, degrees_freedom) - Two-tailed inverse
pub fn fn_tinv(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None], |a| {
        let (p, df) = (a[0], a[1].trunc());
        if p <= 0.0 || p > 1.0 || df < 1.0 {
            return Err(ErrorValue::Num);
        }
        if p == 1.0 {
            return Ok(0.0);
        }
        // two-tailed p = I_y(df/2, 1/2) with y = df / (df + t²)
        let y = invert(
            p,
            0.0,
            1.0,
            0.5,
            |y| beta_i(y, df / 2.0, 0.5),
            |y| beta_pdf(y, df / 2.0, 0.5),
        )?;
        finite((df * (1.0 - y) / y).sqrt())
    })
}

/// EXPONDIST(x, lambda, cumulative)
pub fn fn_expondist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (x, lambda, cumulative) = (a[0], a[1], a[2] != 0.0);
        if x < 0.0 || lambda <= 0.0 {
            return Err(ErrorValue::Num);
        }
        Ok(if cumulative {
            1.0 - (-lambda * x).exp()
        } else {
            lambda * (-lambda * x).exp()
        })
    })
}

/// WEIBULL(x, alpha, beta, cumulative)
pub fn fn_weibull(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        let (x, alpha, beta, cumulative) = (a[0], a[1], a[2], a[3] != 0.0);
        if x < 0.0 || alpha <= 0.0 || beta <= 0.0 {
            return Err(ErrorValue::Num);
        }
        let t = (x / beta).powf(alpha);
        finite(if cumulative {
            1.0 - (-t).exp()
        } else {
            alpha / beta.powf(alpha) * x.powf(alpha - 1.0) * (-t).exp()
        })
    })
}

// ==================== Discrete distributions ====================

/// Mass of a discrete distribution on `lo..=hi` built from the term ratios
/// `ratio(j) = p(j+1) / p(j)`, walking outward from the mode so that no single
/// term needs a factorial. Returns p(k), or Σ p(j) for j ≤ k when `cumulative`.
pub(crate) fn mode_walk(
    lo: f64,
    hi: f64,
    mode: f64,
    ratio: impl Fn(f64) -> f64,
    k: f64,
    cumulative: bool,
) -> f64 {
    let wanted = |j: f64| if cumulative { j <= k } else { j == k };
    let mode = mode.clamp(lo, hi);
    let mut total = 1.0;
    let mut hit = if wanted(mode) { 1.0 } else { 0.0 };

    let (mut w, mut j) = (1.0, mode);
    while j < hi {
        w *= ratio(j);
        j += 1.0;
        if w < total * 1e-18 {
            break;
        }
        total += w;
        if wanted(j) {
            hit += w;
        }
    }
    let (mut w, mut j) = (1.0, mode);
    while j > lo {
        j -= 1.0;
        w /= ratio(j);
        if !w.is_finite() || w < total * 1e-18 {
            break;
        }
        total += w;
        if wanted(j) {
            hit += w;
        }
    }
    hit / total
}

/// Direct term, `None` when it overflows or underflows
fn direct(term: f64) -> Option<f64> {
    (term.is_finite() && term > 0.0).then_some(term)
}

fn binom_pmf_direct(k: f64, n: f64, p: f64) -> Option<f64> {
    if p == 0.0 || p == 1.0 {
        let certain = if p == 0.0 { 0.0 } else { n };
        return Some(if k == certain { 1.0 } else { 0.0 });
    }
    direct(combin(n, k).ok()? * p.powf(k) * (1.0 - p).powf(n - k))
}

pub(crate) fn binom_dist(k: f64, n: f64, p: f64, cumulative: bool) -> f64 {
    if p == 0.0 || p == 1.0 {
        let certain = if p == 0.0 { 0.0 } else { n };
        let hit = if cumulative { certain <= k } else { certain == k };
        return if hit { 1.0 } else { 0.0 };
    }
    let direct_value = if cumulative {
        (0..=k as u64).try_fold(0.0, |acc, j| Some(acc + binom_pmf_direct(j as f64, n, p)?))
    } else {
        binom_pmf_direct(k, n, p)
    };
    match direct_value {
        Some(v) => v.min(1.0),
        None => {
            let q = p / (1.0 - p);
            mode_walk(0.0, n, ((n + 1.0) * p).floor(), |j| (n - j) / (j + 1.0) * q, k, cumulative)
        }
    }
}

/// BINOMDIST(number_s, trials, probability_s, cumulative)
pub fn fn_binomdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        let (k, n, p, cumulative) = (a[0].trunc(), a[1].trunc(), a[2], a[3] != 0.0);
        if k < 0.0 || n < 0.0 || k > n || !(0.0..=1.0).contains(&p) {
            return Err(ErrorValue::Num);
        }
        Ok(binom_dist(k, n, p, cumulative))
    })
}

/// CRITBINOM(trials, probability_s, alpha) - Smallest k whose cumulative
/// binomial probability reaches alpha
pub fn fn_critbinom(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (n, p, alpha) = (a[0].trunc(), a[1], a[2]);
        if n < 0.0 || !(0.0..=1.0).contains(&p) || !(0.0..=1.0).contains(&alpha) {
            return Err(ErrorValue::Num);
        }
        // the cumulative distribution only grows with k
        let (mut lo, mut hi) = (0.0, n);
        while lo < hi {
            let mid = ((lo + hi) / 2.0).floor();
            if binom_dist(mid, n, p, true) < alpha {
                lo = mid + 1.0;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    })
}

/// NEGBINOMDIST(number_f, number_s, probability_s) - Probability of number_f
/// failures before the number_s-th success
pub fn fn_negbinomdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (f, s, p) = (a[0].trunc(), a[1].trunc(), a[2]);
        if f < 0.0 || s < 1.0 || p <= 0.0 || p >= 1.0 {
            return Err(ErrorValue::Num);
        }
        let direct_value = combin(f + s - 1.0, s - 1.0)
            .ok()
            .and_then(|c| direct(c * p.powf(s) * (1.0 - p).powf(f)));
        Ok(match direct_value {
            Some(v) => v,
            None => {
                let mode = ((s - 1.0) * (1.0 - p) / p).floor().max(0.0);
                mode_walk(0.0, f64::INFINITY, mode, |j| (j + s) / (j + 1.0) * (1.0 - p), f, false)
            }
        })
    })
}

/// POISSON(x, mean, cumulative)
pub fn fn_poisson(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None], |a| {
        let (x, mean, cumulative) = (a[0].trunc(), a[1], a[2] != 0.0);
        if x < 0.0 || mean < 0.0 {
            return Err(ErrorValue::Num);
        }
        if mean == 0.0 {
            return Ok(if cumulative || x == 0.0 { 1.0 } else { 0.0 });
        }
        let pmf = |j: f64| direct((j * mean.ln() - mean - ln_gamma(j + 1.0)).exp());
        let direct_value = if cumulative {
            (0..=x as u64).try_fold(0.0, |acc, j| Some(acc + pmf(j as f64)?))
        } else {
            pmf(x)
        };
        Ok(match direct_value {
            Some(v) => v.min(1.0),
            None => mode_walk(0.0, f64::INFINITY, mean.floor(), |j| mean / (j + 1.0), x, cumulative),
        })
    })
}

/// HYPGEOMDIST(sample_s, number_sample, population_s, number_population)
pub fn fn_hypgeomdist(call: &FnCall<'_>) -> FormulaResult<Value> {
    call.numeric(&[None, None, None, None], |a| {
        let (k, n, big_k, big_n) = (a[0].trunc(), a[1].trunc(), a[2].trunc(), a[3].trunc());
        let lo = (n - big_n + big_k).max(0.0);
        let hi = n.min(big_k);
        if k < lo || k > hi || n <= 0.0 || n > big_n || big_k <= 0.0 || big_k > big_n {
            return Err(ErrorValue::Num);
        }
        let direct_value = (|| {
            let v = combin(big_k, k).ok()? * combin(big_n - big_k, n - k).ok()?
                / combin(big_n, n).ok()?;
            direct(v)
        })();
        Ok(match direct_value {
            Some(v) => v,
            None => {
                let mode = ((n + 1.0) * (big_k + 1.0) / (big_n + 2.0)).floor();
                let ratio = |j: f64| {
                    (big_k - j) * (n - j) / ((j + 1.0) * (big_n - big_k - n + j + 1.0))
                };
                mode_walk(lo, hi, mode, ratio, k, false)
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_approx, assert_near, eval};

    #[test]
    fn test_normal_cdf() {
        assert_eq!(norm_s_cdf(0.0), 0.5);
        assert!((norm_s_cdf(1.96) - 0.9750021048517795).abs() < 1e-12);
        assert!((norm_s_cdf(-3.0) - 0.0013498980316301).abs() < 1e-12);
        assert!((norm_s_cdf(7.0) - 0.9999999999987201).abs() < 1e-12);
        assert_near(eval("=NORMDIST(42,40,1.5,TRUE)"), 0.9087887802741321, 1e-10);
        assert_near(eval("=NORMDIST(42,40,1.5,FALSE)"), 0.10934004978399577, 1e-10);
        assert_eq!(eval("=NORMDIST(1,0,0,TRUE)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_normal_inverse() {
        assert_near(eval("=NORMSINV(0.975)"), 1.959963984540054, 1e-9);
        assert_near(eval("=NORMINV(0.908789,40,1.5)"), 42.000002, 1e-5);
        assert_eq!(eval("=NORMSINV(0)"), Value::Error(ErrorValue::Num));
        assert_near(eval("=CONFIDENCE(0.05,2.5,50)"), 0.692951912, 1e-6);
        assert_near(eval("=LOGINV(0.039084,3.5,1.2)"), 4.000025, 1e-4);
        assert_near(eval("=LOGNORMDIST(4,3.5,1.2)"), 0.0390836, 1e-5);
    }

    #[test]
    fn test_gamma_family() {
        assert_approx(eval("=GAMMALN(5)"), 24f64.ln());
        assert_near(eval("=GAMMADIST(10.00001131,9,2,TRUE)"), 0.068094, 1e-5);
        assert_near(eval("=GAMMAINV(0.068094,9,2)"), 10.0000112, 1e-3);
        assert_near(eval("=CHIDIST(18.307,10)"), 0.050001, 1e-5);
        assert_near(eval("=CHIINV(0.050001,10)"), 18.306973, 1e-3);
    }

    #[test]
    fn test_beta_f_t() {
        assert_near(eval("=BETADIST(2,8,10,1,3)"), 0.6854706, 1e-6);
        assert_near(eval("=BETAINV(0.685470581,8,10,1,3)"), 2.0, 1e-5);
        assert_near(eval("=FDIST(15.2068649,6,4)"), 0.01, 1e-7);
        assert_near(eval("=FINV(0.01,6,4)"), 15.2068649, 1e-4);
        assert_near(eval("=TDIST(1.959999998,60,2)"), 0.054644930, 1e-7);
        assert_near(eval("=TDIST(1.959999998,60,1)"), 0.027322465, 1e-7);
        assert_near(eval("=TINV(0.054644930,60)"), 1.96, 1e-5);
        assert_eq!(eval("=TDIST(-1,60,1)"), Value::Error(ErrorValue::Num));
    }

    #[test]
    fn test_exponential_weibull() {
        assert_near(eval("=EXPONDIST(0.2,10,TRUE)"), 0.86466472, 1e-8);
        assert_near(eval("=EXPONDIST(0.2,10,FALSE)"), 1.35335283, 1e-8);
        assert_near(eval("=WEIBULL(105,20,100,TRUE)"), 0.929581, 1e-6);
        assert_near(eval("=WEIBULL(105,20,100,FALSE)"), 0.035589, 1e-6);
    }

    #[test]
    fn test_discrete() {
        assert_near(eval("=BINOMDIST(6,10,0.5,FALSE)"), 0.205078125, 1e-12);
        assert_near(eval("=BINOMDIST(6,10,0.5,TRUE)"), 0.828125, 1e-12);
        assert_eq!(eval("=BINOMDIST(11,10,0.5,FALSE)"), Value::Error(ErrorValue::Num));
        assert_eq!(eval("=CRITBINOM(6,0.5,0.75)"), Value::Number(4.0));
        assert_eq!(eval("=CRITBINOM(1e9,0.5,0.5)"), Value::Number(5e8));
        assert_eq!(eval("=CRITBINOM(10,1,0.5)"), Value::Number(10.0));
        assert_near(eval("=NEGBINOMDIST(10,5,0.25)"), 0.05504866, 1e-8);
        assert_near(eval("=POISSON(2,5,FALSE)"), 0.084224337, 1e-8);
        assert_near(eval("=POISSON(2,5,TRUE)"), 0.124652019, 1e-8);
        assert_near(eval("=HYPGEOMDIST(1,4,8,20)"), 0.363261094, 1e-8);
    }

    #[test]
    fn test_mode_walk_matches_direct() {
        let direct = binom_pmf_direct(30.0, 100.0, 0.3).unwrap();
        let walked = mode_walk(0.0, 100.0, 30.0, |j| (100.0 - j) / (j + 1.0) * (0.3 / 0.7), 30.0, false);
        assert!((direct - walked).abs() < 1e-12);
        // far past the factorial range
        let big = binom_dist(5000.0, 10000.0, 0.5, false);
        assert!((big - 0.007978646).abs() < 1e-7);
        let big_cumulative = binom_dist(5000.0, 10000.0, 0.5, true);
        assert!((big_cumulative - 0.503989).abs() < 1e-5);
    }
}
