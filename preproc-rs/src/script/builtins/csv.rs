//! `%load_csv(path [, pairs [, charset]])`.
//!
//! The first line holds the column names.  In columns mode the result maps
//! each name to the array of its cells:
//!
//! ```text
//! t,load            {"t": [0, 1], "load": [0.5, null]}
//! 0,0.5       →
//! 1,
//! ```
//!
//! In pairs mode each column after the first becomes the string
//! `"[(t0,y0),(t1,y1),…]"`, ready to paste into chart data.

use std::fmt::Write as _;

use crate::loader::decode;
use crate::script::error::{ErrorKind, Result};
use crate::script::function::Invocation;
use crate::script::value::{Number, Object, Value};

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

pub fn builtin_load_csv(call: &mut Invocation<'_>) -> Result<Value> {
    let path = call.string(0);
    let pairs = call.arg(1).is_truthy();
    let charset = match call.arg(2) {
        Value::Null => call.ctx.config().default_charset.clone(),
        v => v.to_string(),
    };

    let bytes = match call.ctx.load_resource(&path, call.location)? {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            tracing::debug!(source = %path, "CSV resource absent or empty");
            return Ok(Value::Object(Object::new()));
        }
    };
    let text = decode(&bytes, &charset).map_err(|e| {
        tracing::error!(source = %path, %charset, error = %e, "cannot decode CSV resource");
        call.error(ErrorKind::ExternalResourceFailure, format!("CSV encoding issue in source {path}: {e}"))
    })?;
    let table = parse_table(&text);
    tracing::debug!(source = %path, columns = table.headers.len(), rows = table.rows.len(), "loaded CSV");

    Ok(Value::Object(if pairs { table.pairs() } else { table.columns() }))
}

fn parse_table(text: &str) -> Table {
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return Table { headers: Vec::new(), rows: Vec::new() };
    };
    let headers: Vec<String> = split_fields(header).into_iter().map(|h| h.trim().to_owned()).collect();
    let rows: Vec<Vec<Value>> = lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| split_fields(line).iter().map(|f| parse_cell(f)).collect())
        .collect();
    Table { headers, rows }
}

/// Split one line on commas.  A field opening with `"` runs to the closing
/// quote, or to the end of the line when there is none, with `""` standing
/// for a literal quote; stray quotes elsewhere are dropped.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut at_start = true;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if at_start => {
                at_start = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' if chars.peek() == Some(&'"') => {
                            chars.next();
                            field.push('"');
                        }
                        '"' => break,
                        c => field.push(c),
                    }
                }
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                at_start = true;
            }
            '"' => {}
            c => {
                field.push(c);
                at_start = false;
            }
        }
    }
    fields.push(field);
    fields
}

fn parse_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if s.contains('.') {
        if let Some(x) = s.parse::<f64>().ok().filter(|x| x.is_finite()) {
            return Value::Number(Number::Float(x));
        }
    }
    match s.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(s),
    }
}

impl Table {
    fn cell(row: &[Value], i: usize) -> &Value {
        static NULL: Value = Value::Null;
        row.get(i).unwrap_or(&NULL)
    }

    fn columns(&self) -> Object {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cells = self.rows.iter().map(|row| Self::cell(row, i).clone()).collect();
                (name.clone(), Value::Array(cells))
            })
            .collect()
    }

    fn pairs(&self) -> Object {
        if self.headers.len() < 2 {
            return Object::new();
        }
        self.headers
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, name)| {
                let mut series = String::from("[");
                for (n, row) in self.rows.iter().enumerate() {
                    if n > 0 {
                        series.push(',');
                    }
                    let _ = write!(series, "({},{})", plot_text(Self::cell(row, 0)), plot_text(Self::cell(row, i)));
                }
                series.push(']');
                (name.clone(), Value::from(series))
            })
            .collect()
    }
}

/// Point coordinate text: `Null` plots as 0.
fn plot_text(v: &Value) -> String {
    match v {
        Value::Null => "0".to_owned(),
        other => other.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
