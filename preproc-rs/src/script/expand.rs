//! Plain-line expansion.
//!
//! Handles the substitution sequences that appear in non-directive lines:
//!
//! | Sequence          | Meaning                                              |
//! |-------------------|------------------------------------------------------|
//! | `%name(args)`     | Call a built-in and substitute its result            |
//! | `name(args)`      | Call a user function (only when one is defined)      |
//! | `name` / `$name`  | A defined variable's value, with any `.a[0]` chain   |
//! | `$$`              | Literal `$`                                          |
//! | `%%`              | Literal `%`                                          |
//!
//! Anything else, including names that are neither variables nor user
//! functions, is copied through unchanged.

use super::error::Result;
use super::expr::{eval_expr, is_ident_char, is_ident_start, parse_reference, EvalContext};

/// Expand all substitution sequences in `src`, returning the result.
///
/// `ctx.location()` is taken as the location of `src`'s first character.
pub fn expand(src: &str, ctx: &mut dyn EvalContext) -> Result<String> {
    let base = ctx.location();
    let mut out = String::with_capacity(src.len());
    let mut pos = 0;
    let mut prev: Option<char> = None;

    while let Some(ch) = src[pos..].chars().next() {
        let rest = &src[pos..];

        if rest.starts_with("$$") || rest.starts_with("%%") {
            out.push(ch);
            pos += 2;
            prev = Some(ch);
            // An escaped sigil keeps the name after it literal.
            let tail = &src[pos..];
            if tail.starts_with(is_ident_start) {
                let len = tail.find(|c: char| !is_ident_char(c)).unwrap_or(tail.len());
                out.push_str(&tail[..len]);
                pos += len;
                prev = tail[..len].chars().last();
            }
            continue;
        }

        let at_boundary = !prev.is_some_and(is_ident_char);
        let name_len = if at_boundary { reference_name_len(rest) } else { 0 };
        if name_len == 0 {
            out.push(ch);
            pos += ch.len_utf8();
            prev = Some(ch);
            continue;
        }

        let name = &rest[..name_len];
        let called = rest[name_len..].starts_with('(');
        let wanted = if name.starts_with('%') {
            called
        } else if called && ctx.has_user_function(name) {
            true
        } else {
            ctx.get_var(name).is_some()
        };

        if wanted {
            let location = base.shifted(src[..pos].chars().count());
            let (expr, len) = parse_reference(rest, location)?;
            let value = eval_expr(&expr, ctx)?;
            out.push_str(&value.to_string());
            pos += len;
            prev = rest[..len].chars().last();
        } else {
            out.push_str(name);
            pos += name_len;
            prev = name.chars().last();
        }
    }
    Ok(out)
}

/// Length of a `%name`, `$name` or bare `name` at the start of `s`, or 0.
fn reference_name_len(s: &str) -> usize {
    let (sigil, body) = match s.chars().next() {
        Some(c @ ('%' | '$')) => (c.len_utf8(), &s[1..]),
        _ => (0, s),
    };
    if !body.chars().next().is_some_and(is_ident_start) {
        return 0;
    }
    let len = body.find(|c: char| !is_ident_char(c)).unwrap_or(body.len());
    sigil + len
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::{DirectiveError, ErrorKind};
    use crate::script::function::NamedArgs;
    use crate::script::location::Location;
    use crate::script::value::Value;
    use std::collections::HashMap;

    struct TestCtx {
        vars: HashMap<String, Value>,
    }

    impl TestCtx {
        fn new() -> Self {
            TestCtx { vars: HashMap::new() }
        }
        fn with(mut self, k: &str, v: Value) -> Self {
            self.vars.insert(k.into(), v);
            self
        }
    }

    impl EvalContext for TestCtx {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }
        fn has_user_function(&self, name: &str) -> bool {
            name == "greet"
        }
        fn call_fn(&mut self, name: &str, args: Vec<Value>, _named: NamedArgs, location: Location) -> Result<Value> {
            match name {
                "greet" => Ok(Value::from(format!("hello {}", args[0]))),
                "%upper" => Ok(Value::from(args[0].to_string().to_uppercase())),
                _ => Err(DirectiveError::new(ErrorKind::UnknownFunction, format!("unknown function {name}"), location)),
            }
        }
        fn location(&self) -> Location {
            Location::new(5, 1)
        }
    }

    fn exp(src: &str, ctx: &mut TestCtx) -> String {
        expand(src, ctx).expect("expand failed")
    }

    #[test]
    fn no_references() {
        assert_eq!(exp("Alice -> Bob : hello", &mut TestCtx::new()), "Alice -> Bob : hello");
    }

    #[test]
    fn variables() {
        let mut ctx = TestCtx::new().with("$who", Value::from("Bob")).with("n", Value::from(3));
        assert_eq!(exp("Alice -> $who : n=n", &mut ctx), "Alice -> Bob : n=3");
    }

    #[test]
    fn identifier_boundaries() {
        let mut ctx = TestCtx::new().with("n", Value::from(3));
        assert_eq!(exp("name n2 an n", &mut ctx), "name n2 an 3");
    }

    #[test]
    fn member_chain() {
        let data = Value::from_json(r#"{"time_ms": 12, "tags": ["a", "b"]}"#).unwrap();
        let mut ctx = TestCtx::new().with("$data", data);
        assert_eq!(exp("took $data.time_ms ms, tag $data.tags[1].", &mut ctx), "took 12 ms, tag b.");
    }

    #[test]
    fn null_renders_empty() {
        let mut ctx = TestCtx::new().with("$x", Value::Null);
        assert_eq!(exp("[$x]", &mut ctx), "[]");
    }

    #[test]
    fn escapes() {
        let mut ctx = TestCtx::new().with("$x", Value::from(1));
        assert_eq!(exp("$$x costs 100%%", &mut ctx), "$x costs 100%");
    }

    #[test]
    fn escaped_sigil_keeps_name_literal() {
        let mut ctx = TestCtx::new().with("x", Value::from(1)).with("upper", Value::from("U"));
        assert_eq!(exp("$$x and %%upper(x)", &mut ctx), "$x and %upper(1)");
        assert_eq!(exp("$$ x", &mut ctx), "$ 1");
    }

    #[test]
    fn builtin_calls() {
        assert_eq!(exp("%upper(\"abc\") and %date", &mut TestCtx::new()), "ABC and %date");
    }

    #[test]
    fn user_function_calls() {
        let mut ctx = TestCtx::new().with("$n", Value::from("Ann"));
        assert_eq!(exp("say greet($n)! other(1)", &mut ctx), "say hello Ann! other(1)");
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        let err = expand("x %bogus() y", &mut TestCtx::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownFunction);
        assert_eq!(err.location, Location::new(5, 3));
    }

    #[test]
    fn unicode_text_is_preserved() {
        let mut ctx = TestCtx::new().with("$x", Value::from("é"));
        assert_eq!(exp("« $x »", &mut ctx), "« é »");
    }
}
