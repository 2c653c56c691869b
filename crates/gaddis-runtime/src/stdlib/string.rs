//! String functions
//!
//! Strings are byte sequences; lengths and offsets count bytes.

use super::{expect_args, lib_error, text_arg, ExecutionContext};
use crate::value::{RuntimeError, Value};

type LibResult = Result<Option<Value>, RuntimeError>;

pub fn length(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("length", args, 1)?;
    Ok(Some(Value::Int(args[0].as_str()?.len() as i64)))
}

pub fn append(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("append", args, 2)?;
    let mut joined = args[0].as_str()?.to_vec();
    joined.extend_from_slice(args[1].as_str()?);
    Ok(Some(Value::bytes(joined)))
}

pub fn to_upper(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("toUpper", args, 1)?;
    Ok(Some(Value::bytes(args[0].as_str()?.to_ascii_uppercase())))
}

pub fn to_lower(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("toLower", args, 1)?;
    Ok(Some(Value::bytes(args[0].as_str()?.to_ascii_lowercase())))
}

/// substring(s, start, end) - bytes `start..=end`
///
/// `end = start - 1` selects the empty string.
pub fn substring(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("substring", args, 3)?;
    let s = args[0].as_str()?;
    let start = args[1].as_int()?;
    let end = args[2].as_int()?;

    let len = s.len() as i64;
    let stop = end.saturating_add(1);
    if start < 0 || stop < start || stop > len {
        return Err(lib_error(
            "substring",
            format!("range [{}, {}] out of bounds for length {}", start, end, len),
        ));
    }
    Ok(Some(Value::bytes(s[start as usize..stop as usize].to_vec())))
}

/// contains(haystack, needle)
pub fn contains(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("contains", args, 2)?;
    let haystack = args[0].as_str()?;
    let needle = args[1].as_str()?;
    let found = needle.is_empty() || haystack.windows(needle.len()).any(|w| w == &needle[..]);
    Ok(Some(Value::Bool(found)))
}

pub fn string_to_integer(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("stringToInteger", args, 1)?;
    let text = text_arg(&args[0])?;
    text.parse::<i64>()
        .map(|n| Some(Value::Int(n)))
        .map_err(|e| lib_error("stringToInteger", format!("{:?}: {}", text, e)))
}

pub fn string_to_real(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("stringToReal", args, 1)?;
    let text = text_arg(&args[0])?;
    text.parse::<f64>()
        .map(|n| Some(Value::Real(n)))
        .map_err(|e| lib_error("stringToReal", format!("{:?}: {}", text, e)))
}

pub fn is_integer(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("isInteger", args, 1)?;
    let ok = text_arg(&args[0])?.parse::<i64>().is_ok();
    Ok(Some(Value::Bool(ok)))
}

pub fn is_real(_ctx: &mut ExecutionContext, args: &[Value]) -> LibResult {
    expect_args("isReal", args, 1)?;
    let ok = text_arg(&args[0])?.parse::<f64>().is_ok();
    Ok(Some(Value::Bool(ok)))
}
