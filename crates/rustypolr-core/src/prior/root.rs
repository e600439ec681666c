// =============================================================================
// Brent's Root Finder
// =============================================================================
//
// Bracketing root finder combining bisection, secant and inverse quadratic
// interpolation. Always keeps a sign change inside [a, b], so it cannot
// diverge, and converges superlinearly on smooth functions.
//
// The function values at the end points are passed in by the caller. This
// allows limits to be supplied where the function itself cannot be evaluated
// (e.g. f(1) = −∞ for a map through −ln(1 − p)).
//
// =============================================================================

use crate::error::{PolrError, Result};

/// Outcome of a root search.
#[derive(Debug, Clone, Copy)]
pub struct RootResult {
    pub root: f64,
    pub f_root: f64,
    pub iterations: usize,
}

/// Find x in [a, b] with f(x) = 0.
///
/// `fa` and `fb` are f(a) and f(b) (or their limits) and must have opposite
/// signs. Fails if `max_iter` iterations pass without reaching `tol`.
pub fn brent_root<F>(
    mut f: F,
    a: f64,
    b: f64,
    fa: f64,
    fb: f64,
    tol: f64,
    max_iter: usize,
) -> Result<RootResult>
where
    F: FnMut(f64) -> f64,
{
    if fa.is_nan() || fb.is_nan() {
        return Err(PolrError::InvalidValue(
            "root finder: function is NaN at an end point".to_string(),
        ));
    }
    if fa == 0.0 {
        return Ok(RootResult { root: a, f_root: fa, iterations: 0 });
    }
    if fb == 0.0 {
        return Ok(RootResult { root: b, f_root: fb, iterations: 0 });
    }
    if fa.signum() == fb.signum() {
        return Err(PolrError::InvalidValue(format!(
            "root finder: f({}) = {} and f({}) = {} do not bracket a root",
            a, fa, b, fb
        )));
    }

    let (mut a, mut b, mut fa, mut fb) = (a, b, fa, fb);
    let (mut c, mut fc) = (a, fa);
    let mut d = b - a;
    let mut e = d;

    for iter in 0..max_iter {
        if fb.signum() == fc.signum() {
            // Root is between a and b; restart the bracket from a
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            // Keep b as the best estimate
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * tol;
        let xm = 0.5 * (c - b);

        if xm.abs() <= tol1 || fb == 0.0 {
            return Ok(RootResult { root: b, f_root: fb, iterations: iter + 1 });
        }

        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                // Secant step
                (2.0 * xm * s, 1.0 - s)
            } else {
                // Inverse quadratic interpolation
                let q = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0)),
                    (q - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            } else {
                p = -p;
            }
            if 2.0 * p < (3.0 * xm * q - (tol1 * q).abs()).min((e * q).abs()) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;
        b += if d.abs() > tol1 { d } else { tol1.copysign(xm) };
        fb = f(b);
        if fb.is_nan() {
            return Err(PolrError::InvalidValue(format!(
                "root finder: function is NaN at x = {}",
                b
            )));
        }
    }

    Err(PolrError::InvalidValue(format!(
        "root finder did not converge in {} iterations (last x = {}, f(x) = {})",
        max_iter, b, fb
    )))
}
