//! Math and number formatting functions
//!
//! - random(lo, hi): inclusive, from the context RNG
//! - sqrt, pow, abs, cos, round, sin, tan
//! - toInteger (truncating), toReal
//! - integerFormat, realFormat, currencyFormat
//!
//! Real parameters accept Integers; results follow IEEE 754, so domain
//! errors produce NaN rather than failing.

use super::{expect_args, lib_error, real_arg, ExecutionContext};
use crate::value::{RuntimeError, Value};
use rand::RngExt;

type LibResult = Result<Option<Value>, RuntimeError>;

/// random(lo: Integer, hi: Integer) -> Integer
pub fn random(ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("random", args, 2)?;
    let lo = args[0].as_int()?;
    let hi = args[1].as_int()?;
    if hi < lo {
        return Err(lib_error(
            "random",
            format!("empty range [{}, {}]", lo, hi),
        ));
    }
    Ok(Some(Value::Int(ctx.rng.random_range(lo..=hi))))
}

// ============================================================================
// Real functions
// ============================================================================

fn unary_real(name: &str, args: &[Value], f: fn(f64) -> f64) -> LibResult {
    expect_args(name, args, 1)?;
    Ok(Some(Value::Real(f(real_arg(&args[0])?))))
}

pub fn sqrt(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    unary_real("sqrt", args, f64::sqrt)
}

pub fn cos(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    unary_real("cos", args, f64::cos)
}

pub fn sin(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    unary_real("sin", args, f64::sin)
}

pub fn tan(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    unary_real("tan", args, f64::tan)
}

/// round(x) -> Real, half away from zero
pub fn round(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    unary_real("round", args, f64::round)
}

pub fn pow(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("pow", args, 2)?;
    let base = real_arg(&args[0])?;
    let exp = real_arg(&args[1])?;
    Ok(Some(Value::Real(base.powf(exp))))
}

/// abs keeps the argument's type
pub fn abs(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Some(Value::Int(n.wrapping_abs()))),
        other => Ok(Some(Value::Real(real_arg(other)?.abs()))),
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// toInteger(x: Real) -> Integer, truncating toward zero
pub fn to_integer(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("toInteger", args, 1)?;
    Ok(Some(Value::Int(args[0].as_real()? as i64)))
}

pub fn to_real(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("toReal", args, 1)?;
    Ok(Some(Value::Real(args[0].as_int()? as f64)))
}

// ============================================================================
// Formatting
// ============================================================================

/// Insert a comma between every group of three digits
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let lead = match digits.len() % 3 {
        0 => 3,
        n => n,
    };
    let (head, mut rest) = digits.split_at(lead.min(digits.len()));
    out.push_str(head);
    while !rest.is_empty() {
        let (group, tail) = rest.split_at(3);
        out.push(',');
        out.push_str(group);
        rest = tail;
    }
    out
}

/// Render `hundredths` (already rounded) as `[-][prefix]1,234.56`
fn format_hundredths(hundredths: i128, prefix: &str) -> String {
    let sign = if hundredths < 0 { "-" } else { "" };
    let magnitude = hundredths.unsigned_abs();
    let whole = (magnitude / 100).to_string();
    format!(
        "{}{}{}.{:02}",
        sign,
        prefix,
        group_thousands(&whole),
        magnitude % 100
    )
}

fn to_hundredths(function: &str, amount: f64) -> Result<i128, RuntimeError> {
    if !amount.is_finite() {
        return Err(lib_error(function, format!("cannot format {}", amount)));
    }
    Ok((amount * 100.0).round() as i128)
}

/// integerFormat(n: Integer) -> String, e.g. `-1,234,567`
pub fn integer_format(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("integerFormat", args, 1)?;
    let n = args[0].as_int()?;
    let sign = if n < 0 { "-" } else { "" };
    let grouped = group_thousands(&n.unsigned_abs().to_string());
    Ok(Some(Value::str(&format!("{}{}", sign, grouped))))
}

/// realFormat(x: Real) -> String, two decimals, e.g. `1,234.50`
pub fn real_format(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("realFormat", args, 1)?;
    let hundredths = to_hundredths("realFormat", real_arg(&args[0])?)?;
    Ok(Some(Value::str(&format_hundredths(hundredths, ""))))
}

/// currencyFormat(x: Real) -> String, e.g. `-$9,876.54`
pub fn currency_format(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("currencyFormat", args, 1)?;
    let hundredths = to_hundredths("currencyFormat", real_arg(&args[0])?)?;
    Ok(Some(Value::str(&format_hundredths(hundredths, "$"))))
}
