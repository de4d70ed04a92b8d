use crate::script::error::Result;
use crate::script::function::Invocation;
use crate::script::value::Value;

pub fn builtin_true(_call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::Boolean(true))
}

pub fn builtin_false(_call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::Boolean(false))
}

pub fn builtin_not(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::Boolean(!call.arg(0).is_truthy()))
}

/// Looser than plain truthiness: zero and the strings `""`, `"0"` and
/// `"false"` also count as false.
pub fn builtin_boolval(call: &mut Invocation<'_>) -> Result<Value> {
    let b = match call.arg(0) {
        Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => n.as_f64() != 0.0,
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Value::Object(_) | Value::Array(_) => true,
    };
    Ok(Value::Boolean(b))
}

pub fn builtin_intval(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::from(call.int(0)?))
}

pub fn builtin_string(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::from(call.string(0)))
}

pub fn builtin_size(call: &mut Invocation<'_>) -> Result<Value> {
    let size = match call.arg(0) {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(obj) => obj.len(),
        _ => 0,
    };
    Ok(Value::from(size as i64))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
