//! Un-traced execution of the builtin ufuncs and reductions over plain
//! [`Const`] values.
//!
//! Nothing else in this crate has a surrounding array library to fall back
//! on the way cupy falls back to numpy when fusion is bypassed, so this
//! module stands in for that fallback: [`crate::dispatch`] calls into it
//! when no trace is active, and it is the oracle tests compare compiled-
//! kernel semantics against. Every operation dispatches on the actual
//! [`Const`] variant of its operands rather than collapsing everything
//! through `f64`, so integer and boolean arithmetic stays exact instead of
//! silently becoming floating-point.

use crate::dtype::Const;
use crate::error::{FusionError, TypeError};

fn as_f64(c: Const) -> f64 {
    match c {
        Const::Bool(b) => b as u8 as f64,
        Const::Int(i) => i as f64,
        Const::Float(f) => f,
        Const::Complex(re, _) => re,
    }
}

fn as_int(c: Const) -> i128 {
    match c {
        Const::Bool(b) => b as i128,
        Const::Int(i) => i,
        Const::Float(f) => f as i128,
        Const::Complex(re, _) => re as i128,
    }
}

fn as_bool(c: Const) -> bool {
    match c {
        Const::Bool(b) => b,
        Const::Int(i) => i != 0,
        Const::Float(f) => f != 0.0,
        Const::Complex(re, im) => re != 0.0 || im != 0.0,
    }
}

fn as_complex(c: Const) -> (f64, f64) {
    match c {
        Const::Bool(b) => (b as u8 as f64, 0.0),
        Const::Int(i) => (i as f64, 0.0),
        Const::Float(f) => (f, 0.0),
        Const::Complex(re, im) => (re, im),
    }
}

fn is_complex(c: Const) -> bool {
    matches!(c, Const::Complex(_, _))
}

fn is_float(c: Const) -> bool {
    matches!(c, Const::Float(_))
}

fn is_bool(c: Const) -> bool {
    matches!(c, Const::Bool(_))
}

/// Floors toward negative infinity, matching numpy's `floor_divide` rather
/// than Rust's truncating `/`.
fn floor_div(x: i128, y: i128) -> i128 {
    if y == 0 {
        return 0;
    }
    let q = x / y;
    let r = x % y;
    if r != 0 && (r < 0) != (y < 0) {
        q - 1
    } else {
        q
    }
}

/// Numpy's `remainder`: same sign as the divisor, derived from [`floor_div`].
fn int_remainder(x: i128, y: i128) -> i128 {
    if y == 0 {
        return 0;
    }
    x - floor_div(x, y) * y
}

fn complex_mul(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

/// Evaluates a binary ufunc by name over two scalar constants.
///
/// Comparisons always yield [`Const::Bool`]. Bitwise ops yield `Bool` when
/// both operands are `Bool`, otherwise `Int`. Arithmetic ops promote to
/// `Complex` or `Float` if either operand is, otherwise stay exact `Int`
/// arithmetic (wrapping on overflow, floor-style division and remainder).
///
/// # Errors
/// [`TypeError::UnsupportedArgument`] if `name` isn't a known binary ufunc.
pub fn eval_binary(name: &str, a: Const, b: Const) -> Result<Const, FusionError> {
    match name {
        "less" => return Ok(Const::Bool(compare(a, b) < 0)),
        "less_equal" => return Ok(Const::Bool(compare(a, b) <= 0)),
        "equal" => return Ok(Const::Bool(compare(a, b) == 0)),
        "not_equal" => return Ok(Const::Bool(compare(a, b) != 0)),
        "greater" => return Ok(Const::Bool(compare(a, b) > 0)),
        "greater_equal" => return Ok(Const::Bool(compare(a, b) >= 0)),
        "bitwise_and" | "bitwise_or" | "bitwise_xor" | "left_shift" | "right_shift" => {
            if is_bool(a) && is_bool(b) {
                let (x, y) = (as_bool(a), as_bool(b));
                let r = match name {
                    "bitwise_and" => x && y,
                    "bitwise_or" => x || y,
                    "bitwise_xor" => x != y,
                    _ => return Err(TypeError::UnsupportedArgument(leak(name)).into()),
                };
                return Ok(Const::Bool(r));
            }
            let (x, y) = (as_int(a), as_int(b));
            let r = match name {
                "bitwise_and" => x & y,
                "bitwise_or" => x | y,
                "bitwise_xor" => x ^ y,
                "left_shift" => y.try_into().ok().and_then(|s| x.checked_shl(s)).unwrap_or(0),
                "right_shift" => y.try_into().ok().and_then(|s| x.checked_shr(s)).unwrap_or(0),
                _ => unreachable!(),
            };
            return Ok(Const::Int(r));
        }
        _ => {}
    }

    if is_complex(a) || is_complex(b) {
        let (x, y) = (as_complex(a), as_complex(b));
        let (re, im) = match name {
            "add" => (x.0 + y.0, x.1 + y.1),
            "subtract" => (x.0 - y.0, x.1 - y.1),
            "multiply" => complex_mul(x, y),
            "true_divide" => {
                let denom = y.0 * y.0 + y.1 * y.1;
                ((x.0 * y.0 + x.1 * y.1) / denom, (x.1 * y.0 - x.0 * y.1) / denom)
            }
            "power" => (x.0.powf(y.0), 0.0),
            other => return Err(TypeError::UnsupportedArgument(leak(other)).into()),
        };
        return Ok(Const::Complex(re, im));
    }

    if is_float(a) || is_float(b) {
        let (x, y) = (as_f64(a), as_f64(b));
        let result = match name {
            "add" => x + y,
            "subtract" => x - y,
            "multiply" => x * y,
            "true_divide" => x / y,
            "floor_divide" => (x / y).floor(),
            "remainder" => x.rem_euclid(y),
            "power" => x.powf(y),
            other => return Err(TypeError::UnsupportedArgument(leak(other)).into()),
        };
        return Ok(Const::Float(result));
    }

    let (x, y) = (as_int(a), as_int(b));
    let result = match name {
        "add" => x.wrapping_add(y),
        "subtract" => x.wrapping_sub(y),
        "multiply" => x.wrapping_mul(y),
        "true_divide" => return Ok(Const::Float(x as f64 / y as f64)),
        "floor_divide" => floor_div(x, y),
        "remainder" => int_remainder(x, y),
        "power" => {
            let exp = u32::try_from(y).unwrap_or(0);
            x.wrapping_pow(exp)
        }
        other => return Err(TypeError::UnsupportedArgument(leak(other)).into()),
    };
    Ok(Const::Int(result))
}

/// Orders two constants for the comparison ufuncs. Exact for integer and
/// boolean operands; falls back to `f64` only when either side is
/// float/complex.
fn compare(a: Const, b: Const) -> i32 {
    if is_float(a) || is_float(b) || is_complex(a) || is_complex(b) {
        let (x, y) = (as_f64(a), as_f64(b));
        return x.partial_cmp(&y).map_or(0, |o| o as i32);
    }
    let (x, y) = (as_int(a), as_int(b));
    x.cmp(&y) as i32
}

/// Evaluates a unary ufunc by name over one scalar constant.
///
/// # Errors
/// [`TypeError::UnsupportedArgument`] if `name` isn't a known unary ufunc.
pub fn eval_unary(name: &str, a: Const) -> Result<Const, FusionError> {
    match name {
        "copy" => Ok(a),
        "negative" => Ok(match a {
            Const::Bool(b) => Const::Int(-(b as i128)),
            Const::Int(i) => Const::Int(i.wrapping_neg()),
            Const::Float(f) => Const::Float(-f),
            Const::Complex(re, im) => Const::Complex(-re, -im),
        }),
        "invert" => Ok(if is_bool(a) {
            Const::Bool(!as_bool(a))
        } else {
            Const::Int(!as_int(a))
        }),
        other => Err(TypeError::UnsupportedArgument(leak(other)).into()),
    }
}

/// Folds a reduction by name over a slice of scalar constants.
///
/// `amax`/`amin` return one of the original values untouched (so a `Bool`
/// or `Int` input stays that variant); `sum`/`prod` accumulate through the
/// matching numeric domain (exact `Int` arithmetic unless a `Float` or
/// `Complex` value is present).
///
/// # Errors
/// [`TypeError::UnsupportedArgument`] if `name` isn't a known reduction, or
/// if `values` is empty for a reduction with no identity element.
pub fn eval_reduction(name: &str, values: &[Const]) -> Result<Const, FusionError> {
    match name {
        "sum" => Ok(values
            .iter()
            .copied()
            .fold(Const::Int(0), |acc, v| eval_binary("add", acc, v).unwrap_or(acc))),
        "prod" => Ok(values
            .iter()
            .copied()
            .fold(Const::Int(1), |acc, v| eval_binary("multiply", acc, v).unwrap_or(acc))),
        "amax" => values
            .iter()
            .copied()
            .reduce(|a, b| if compare(b, a) > 0 { b } else { a })
            .ok_or_else(|| TypeError::UnsupportedArgument("amax of empty input").into()),
        "amin" => values
            .iter()
            .copied()
            .reduce(|a, b| if compare(b, a) < 0 { b } else { a })
            .ok_or_else(|| TypeError::UnsupportedArgument("amin of empty input").into()),
        other => Err(TypeError::UnsupportedArgument(leak(other)).into()),
    }
}

/// `TypeError::UnsupportedArgument` needs a `&'static str`; reference
/// evaluation only ever sees a closed set of names so leaking is bounded.
fn leak(s: &str) -> &'static str {
    Box::leak(s.to_owned().into_boxed_str())
}
