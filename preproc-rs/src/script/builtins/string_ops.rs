//! String built-ins.  Positions and lengths count characters, not bytes.

use crate::script::error::{ErrorKind, Result};
use crate::script::function::Invocation;
use crate::script::value::Value;

pub fn builtin_strlen(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::from(call.string(0).chars().count() as i64))
}

/// `%substr(s, start)`: everything from `start`.
pub fn builtin_substr_from(call: &mut Invocation<'_>) -> Result<Value> {
    let s = call.string(0);
    let start = clamp_index(call.int(1)?);
    Ok(Value::from(s.chars().skip(start).collect::<String>()))
}

/// `%substr(s, start, len)`.
pub fn builtin_substr(call: &mut Invocation<'_>) -> Result<Value> {
    let s = call.string(0);
    let start = clamp_index(call.int(1)?);
    let len = clamp_index(call.int(2)?);
    Ok(Value::from(s.chars().skip(start).take(len).collect::<String>()))
}

pub fn builtin_strpos(call: &mut Invocation<'_>) -> Result<Value> {
    let haystack = call.string(0);
    let needle = call.string(1);
    let pos = haystack
        .find(&needle)
        .map_or(-1, |byte| haystack[..byte].chars().count() as i64);
    Ok(Value::from(pos))
}

pub fn builtin_upper(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::from(call.string(0).to_uppercase()))
}

pub fn builtin_lower(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::from(call.string(0).to_lowercase()))
}

/// `%splitstr(s, sep)`.  An empty separator splits into characters.
pub fn builtin_splitstr(call: &mut Invocation<'_>) -> Result<Value> {
    let s = call.string(0);
    let sep = call.string(1);
    let pieces: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(sep.as_str()).map(Value::from).collect()
    };
    Ok(Value::Array(pieces))
}

pub fn builtin_newline(_call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::from("\n"))
}

pub fn builtin_chr(call: &mut Invocation<'_>) -> Result<Value> {
    let code = call.int(0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::from(c.to_string()))
        .ok_or_else(|| call.error(ErrorKind::TypeCoercionFailure, format!("{code} is not a valid code point")))
}

/// Code point of the first character; 0 for an empty string.
pub fn builtin_ord(call: &mut Invocation<'_>) -> Result<Value> {
    let code = call.string(0).chars().next().map_or(0, |c| i64::from(u32::from(c)));
    Ok(Value::from(code))
}

/// Integer remainder, truncating toward zero.
pub fn builtin_mod(call: &mut Invocation<'_>) -> Result<Value> {
    let a = call.int(0)?;
    let b = call.int(1)?;
    if b == 0 {
        return Err(call.error(ErrorKind::Runtime, "modulo by zero"));
    }
    Ok(Value::from(a.checked_rem(b).unwrap_or(0)))
}

fn clamp_index(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
