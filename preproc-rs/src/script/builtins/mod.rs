//! Standard built-in functions.
//!
//! Every built-in is a plain `fn(&mut Invocation) -> Result<Value>`; the
//! table in [`register_standard`] gives each one its name and arity.  A
//! name may appear more than once with different arities (`%substr`).

use std::sync::{Arc, OnceLock};

use super::function::{Builtin, BuiltinFn, FunctionSignature, Registry};

mod csv;
mod json_ops;
mod memory_ops;
mod string_ops;
mod type_ops;

/// Signature shape for one table entry.
enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

struct Entry {
    name: &'static str,
    arity: Arity,
    caller_scope: bool,
    func: BuiltinFn,
}

const fn entry(name: &'static str, arity: Arity, func: BuiltinFn) -> Entry {
    Entry { name, arity, caller_scope: false, func }
}

/// Built-ins that read or write the caller's variables.
const fn scoped(name: &'static str, arity: Arity, func: BuiltinFn) -> Entry {
    Entry { name, arity, caller_scope: true, func }
}

static BUILTINS: &[Entry] = &[
    // ── Type and truth ───────────────────────────────────────────────────────
    entry("%true", Arity::Exact(0), type_ops::builtin_true),
    entry("%false", Arity::Exact(0), type_ops::builtin_false),
    entry("%not", Arity::Exact(1), type_ops::builtin_not),
    entry("%boolval", Arity::Exact(1), type_ops::builtin_boolval),
    entry("%intval", Arity::Exact(1), type_ops::builtin_intval),
    entry("%string", Arity::Exact(1), type_ops::builtin_string),
    entry("%size", Arity::Exact(1), type_ops::builtin_size),
    // ── Strings ──────────────────────────────────────────────────────────────
    entry("%strlen", Arity::Exact(1), string_ops::builtin_strlen),
    entry("%substr", Arity::Exact(2), string_ops::builtin_substr_from),
    entry("%substr", Arity::Exact(3), string_ops::builtin_substr),
    entry("%strpos", Arity::Exact(2), string_ops::builtin_strpos),
    entry("%upper", Arity::Exact(1), string_ops::builtin_upper),
    entry("%lower", Arity::Exact(1), string_ops::builtin_lower),
    entry("%splitstr", Arity::Exact(2), string_ops::builtin_splitstr),
    entry("%newline", Arity::Exact(0), string_ops::builtin_newline),
    entry("%chr", Arity::Exact(1), string_ops::builtin_chr),
    entry("%ord", Arity::Exact(1), string_ops::builtin_ord),
    entry("%mod", Arity::Exact(2), string_ops::builtin_mod),
    // ── Memory and functions ─────────────────────────────────────────────────
    scoped("%variable_exists", Arity::Exact(1), memory_ops::builtin_variable_exists),
    scoped("%get_variable_value", Arity::Exact(1), memory_ops::builtin_get_variable_value),
    scoped("%set_variable_value", Arity::Exact(2), memory_ops::builtin_set_variable_value),
    entry("%function_exists", Arity::Exact(1), memory_ops::builtin_function_exists),
    scoped("%call_user_func", Arity::AtLeast(1), memory_ops::builtin_call_user_func),
    // ── JSON ─────────────────────────────────────────────────────────────────
    entry("%str2json", Arity::Exact(1), json_ops::builtin_str2json),
    entry("%json_key_exists", Arity::Exact(2), json_ops::builtin_json_key_exists),
    entry("%json_set", Arity::Exact(3), json_ops::builtin_json_set),
    entry("%load_json", Arity::Range(1, 3), json_ops::builtin_load_json),
    // ── Resources ────────────────────────────────────────────────────────────
    entry("%load_csv", Arity::Range(1, 3), csv::builtin_load_csv),
];

/// Add every standard built-in to `registry`.
pub fn register_standard(registry: &mut Registry) {
    for e in BUILTINS {
        let signature = match e.arity {
            Arity::Exact(n) => FunctionSignature::exact(e.name, n),
            Arity::Range(min, max) => FunctionSignature::range(e.name, min, max),
            Arity::AtLeast(min) => FunctionSignature::variadic(e.name, min),
        };
        let builtin = Builtin::new(signature, e.func);
        registry.register(if e.caller_scope { builtin.with_caller_scope() } else { builtin });
    }
}

/// The shared standard registry, built on first use.
pub fn standard() -> Arc<Registry> {
    static STANDARD: OnceLock<Arc<Registry>> = OnceLock::new();
    Arc::clone(STANDARD.get_or_init(|| {
        let mut registry = Registry::new();
        register_standard(&mut registry);
        tracing::debug!(builtins = registry.len(), "standard registry initialised");
        Arc::new(registry)
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use crate::loader::map_loader;
    use crate::script::error::DirectiveError;
    use crate::script::interp::Interpreter;
    use crate::script::value::Value;

    fn interp(resources: &[(&str, &[u8])]) -> Interpreter {
        let mut interp = Interpreter::default();
        interp.set_loader(map_loader(resources.iter().map(|(k, v)| (*k, v.to_vec()))));
        interp
    }

    /// Evaluate `expr` as the right-hand side of an assignment.
    pub fn eval(expr: &str) -> Value {
        eval_with(expr, &[])
    }

    pub fn eval_with(expr: &str, resources: &[(&str, &[u8])]) -> Value {
        let mut interp = interp(resources);
        interp
            .run_text(&format!("!result = {expr}"))
            .unwrap_or_else(|e| panic!("{expr}: {e}"));
        interp.variable("result").cloned().unwrap_or_default()
    }

    pub fn eval_err(expr: &str) -> DirectiveError {
        eval_err_with(expr, &[])
    }

    pub fn eval_err_with(expr: &str, resources: &[(&str, &[u8])]) -> DirectiveError {
        interp(resources)
            .run_text(&format!("!result = {expr}"))
            .expect_err("expected failure")
    }

    pub fn json(src: &str) -> Value {
        Value::from_json(src).expect("bad test JSON")
    }
}
