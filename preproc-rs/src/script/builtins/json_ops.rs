use crate::loader::decode;
use crate::script::error::{DirectiveError, ErrorKind, Result};
use crate::script::function::Invocation;
use crate::script::value::{Object, Value};

pub fn builtin_str2json(call: &mut Invocation<'_>) -> Result<Value> {
    Value::from_json(&call.string(0)).map_err(|e| DirectiveError::from_value(e, call.location))
}

/// `%json_key_exists(obj, key)`.  For arrays the key is an index.
pub fn builtin_json_key_exists(call: &mut Invocation<'_>) -> Result<Value> {
    let exists = match call.arg(0) {
        Value::Object(obj) => obj.contains_key(&call.string(1)),
        Value::Array(items) => call
            .arg(1)
            .to_number()
            .ok()
            .filter(|n| n.is_integral())
            .and_then(|n| usize::try_from(n.as_i64()).ok())
            .is_some_and(|i| i < items.len()),
        _ => false,
    };
    Ok(Value::Boolean(exists))
}

/// `%json_set(target, key, value)`: a copy of `target` with `key` set.
/// `Null` starts a fresh object; on arrays the key is an index and one past
/// the end appends.
pub fn builtin_json_set(call: &mut Invocation<'_>) -> Result<Value> {
    let value = call.arg(2).clone();
    match call.arg(0).clone() {
        Value::Null => {
            let mut obj = Object::new();
            obj.insert(call.string(1), value);
            Ok(Value::Object(obj))
        }
        Value::Object(mut obj) => {
            obj.insert(call.string(1), value);
            Ok(Value::Object(obj))
        }
        Value::Array(mut items) => {
            let index = call.int(1)?;
            match usize::try_from(index) {
                Ok(i) if i < items.len() => items[i] = value,
                Ok(i) if i == items.len() => items.push(value),
                _ => {
                    return Err(call.error(
                        ErrorKind::Runtime,
                        format!("index {index} out of range for array of {}", items.len()),
                    ))
                }
            }
            Ok(Value::Array(items))
        }
        other => Err(call.error(
            ErrorKind::TypeCoercionFailure,
            format!("cannot set a key on {}", other.type_name()),
        )),
    }
}

/// `%load_json(path [, default [, charset]])`.  A missing or empty resource
/// yields `default`, or an empty object when none is given.
pub fn builtin_load_json(call: &mut Invocation<'_>) -> Result<Value> {
    let path = call.string(0);
    let fallback = || match call.args.get(1) {
        Some(v) => v.clone(),
        None => Value::Object(Object::new()),
    };
    let bytes = match call.ctx.load_resource(&path, call.location)? {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            tracing::debug!(source = %path, "JSON resource absent, using default");
            return Ok(fallback());
        }
    };
    let charset = match call.arg(2) {
        Value::Null => call.ctx.config().default_charset.clone(),
        v => v.to_string(),
    };
    let text = decode(&bytes, &charset).map_err(|e| {
        tracing::error!(source = %path, error = %e, "cannot decode JSON resource");
        call.error(ErrorKind::ExternalResourceFailure, format!("JSON encoding issue in source {path}: {e}"))
    })?;
    Value::from_json(&text).map_err(|e| {
        call.error(ErrorKind::MalformedLiteral, format!("JSON parse error in source {path}: {e}"))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
