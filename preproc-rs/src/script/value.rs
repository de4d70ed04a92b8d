//! Runtime value type for the directive language.
//!
//! Every expression, variable binding, and function result is exactly one
//! [`Value`].  Containers are plain owned data: binding a value clones it, so
//! two variables never share a mutable `Object` or `Array`.
//!
//! Truthiness is deliberately permissive: only `Null` and `Boolean(false)`
//! are false.  `Number(0)`, `""`, `{}` and `[]` are all true.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value as Json;

use super::error::ErrorKind;

// ── ValueError ────────────────────────────────────────────────────────────────

/// A failure inside a value operation.  Carries no location; the evaluator
/// attaches one when lifting it into a [`DirectiveError`](super::error::DirectiveError).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("cannot convert {found} {text:?} to a number")]
    NotANumber { found: &'static str, text: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("arithmetic result {0} is not a finite number")]
    NonFinite(f64),
    #[error("cannot compare {0} with {1}")]
    Incomparable(&'static str, &'static str),
    #[error("malformed JSON: {0}")]
    Json(String),
}

impl ValueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotANumber { .. } | Self::Incomparable(..) => ErrorKind::TypeCoercionFailure,
            Self::DivisionByZero | Self::ModuloByZero | Self::NonFinite(_) => ErrorKind::Runtime,
            Self::Json(_) => ErrorKind::MalformedLiteral,
        }
    }
}

// ── Number ────────────────────────────────────────────────────────────────────

/// A decimal number.  Integral values stay exact as `Int`; anything with a
/// fractional part (or outside the `i64` range) is a `Float`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    /// Truncate toward zero.  Saturates at the `i64` bounds.
    pub fn as_i64(self) -> i64 {
        match self {
            Number::Int(n) => n,
            Number::Float(x) => x as i64,
        }
    }

    pub fn is_integral(self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(x) => x.is_finite() && x.fract() == 0.0,
        }
    }

    /// Parse the textual form of a number.  Accepts integers, decimals and
    /// exponent notation; rejects `inf`/`NaN` spellings.
    pub fn parse(s: &str) -> Option<Number> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Some(Number::Int(n));
        }
        let starts_ok = s
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
        if !starts_ok {
            return None;
        }
        s.parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .map(Number::Float)
    }

    fn checked(self, rhs: Number, int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64) -> Number {
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            if let Some(n) = int(a, b) {
                return Number::Int(n);
            }
        }
        Number::Float(float(self.as_f64(), rhs.as_f64()))
    }

    pub fn add(self, rhs: Number) -> Number {
        self.checked(rhs, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, rhs: Number) -> Number {
        self.checked(rhs, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, rhs: Number) -> Number {
        self.checked(rhs, i64::checked_mul, |a, b| a * b)
    }

    /// Exact integer quotients stay integral; `7 / 2` is `3.5`.
    pub fn div(self, rhs: Number) -> Result<Number, ValueError> {
        if rhs.as_f64() == 0.0 {
            return Err(ValueError::DivisionByZero);
        }
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            if a.checked_rem(b) == Some(0) {
                if let Some(q) = a.checked_div(b) {
                    return Ok(Number::Int(q));
                }
            }
        }
        Ok(Number::Float(self.as_f64() / rhs.as_f64()))
    }

    pub fn rem(self, rhs: Number) -> Result<Number, ValueError> {
        if rhs.as_f64() == 0.0 {
            return Err(ValueError::ModuloByZero);
        }
        Ok(self.checked(rhs, i64::checked_rem, |a, b| a % b))
    }

    pub fn neg(self) -> Number {
        match self {
            Number::Int(n) => n.checked_neg().map_or(Number::Float(-(n as f64)), Number::Int),
            Number::Float(x) => Number::Float(-x),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(n) => write!(f, "{n}"),
            // `f64`'s Display never uses exponent notation; integral floats
            // within i64 range print without a fractional part.
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e18 => {
                write!(f, "{}", x as i64)
            }
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Int(n)
    }
}

impl From<f64> for Number {
    fn from(x: f64) -> Self {
        Number::Float(x)
    }
}

// ── Object ────────────────────────────────────────────────────────────────────

/// String-keyed mapping that remembers insertion order.
///
/// Equality ignores order: two objects are equal when they have the same key
/// set and equal values under each key.
#[derive(Debug, Clone, Default)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace.  A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut obj = Object::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl IntoIterator for Object {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A directive-language runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Object(Object),
    Array(Vec<Value>),
}

impl fmt::Display for Value {
    /// Canonical text form.  `Null` is empty text here; inside containers it
    /// serializes as `null` because containers render as compact JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) | Value::Array(_) => f.write_str(&self.to_json()),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Only `Null` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    /// Coerce to a number: booleans are 1/0, `Null` is 0, strings must parse.
    pub fn to_number(&self) -> Result<Number, ValueError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(Number::Int(i64::from(*b))),
            Value::Null => Ok(Number::Int(0)),
            Value::String(s) => Number::parse(s).ok_or_else(|| ValueError::NotANumber {
                found: "string",
                text: s.clone(),
            }),
            other => Err(ValueError::NotANumber {
                found: other.type_name(),
                text: other.to_json(),
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    /// `+`: string concatenation when either side is a string, numeric
    /// addition otherwise.
    pub fn add(&self, rhs: &Value) -> Result<Value, ValueError> {
        if self.is_string() || rhs.is_string() {
            return Ok(Value::String(format!("{self}{rhs}")));
        }
        finite(self.to_number()?.add(rhs.to_number()?))
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, ValueError> {
        finite(self.to_number()?.sub(rhs.to_number()?))
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, ValueError> {
        finite(self.to_number()?.mul(rhs.to_number()?))
    }

    pub fn div(&self, rhs: &Value) -> Result<Value, ValueError> {
        finite(self.to_number()?.div(rhs.to_number()?)?)
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, ValueError> {
        finite(self.to_number()?.rem(rhs.to_number()?)?)
    }

    pub fn neg(&self) -> Result<Value, ValueError> {
        Ok(Value::Number(self.to_number()?.neg()))
    }

    /// Relational comparison: two strings compare lexically, anything else
    /// numerically.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering, ValueError> {
        if let (Value::String(a), Value::String(b)) = (self, rhs) {
            return Ok(a.cmp(b));
        }
        let (a, b) = (self.to_number()?, rhs.to_number()?);
        a.partial_cmp(&b)
            .ok_or(ValueError::Incomparable(self.type_name(), rhs.type_name()))
    }

    // ── JSON ──────────────────────────────────────────────────────────────────

    /// Compact JSON text.  Non-finite floats serialize as `null`.
    pub fn to_json(&self) -> String {
        Json::from(self).to_string()
    }

    pub fn from_json(src: &str) -> Result<Value, ValueError> {
        serde_json::from_str::<Json>(src)
            .map(Value::from)
            .map_err(|e| ValueError::Json(e.to_string()))
    }
}

/// Reject overflowed results so infinities never reach text or JSON.
fn finite(n: Number) -> Result<Value, ValueError> {
    match n {
        Number::Float(x) if !x.is_finite() => Err(ValueError::NonFinite(x)),
        n => Ok(Value::Number(n)),
    }
}

impl From<&Value> for Json {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Number(Number::Int(n)) => Json::from(*n),
            Value::Number(Number::Float(x)) => {
                serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number)
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(Json::from).collect()),
            Value::Object(obj) => Json::Object(
                obj.iter()
                    .map(|(k, v)| (k.to_owned(), Json::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(Number::Int(i)),
                None => n.as_f64().map_or(Value::Null, |x| Value::Number(Number::Float(x))),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::Int(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Number(Number::Float(x))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
