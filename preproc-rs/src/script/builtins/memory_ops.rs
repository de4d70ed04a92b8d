//! Built-ins that reach into the caller's variables or the function tables.
//! The variable accessors run in the caller's scope.

use crate::script::context::CallSite;
use crate::script::error::Result;
use crate::script::function::Invocation;
use crate::script::value::Value;

pub fn builtin_variable_exists(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::Boolean(call.memory.has(&call.string(0))))
}

pub fn builtin_get_variable_value(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(call.memory.value(&call.string(0)))
}

pub fn builtin_set_variable_value(call: &mut Invocation<'_>) -> Result<Value> {
    let name = call.string(0);
    let value = call.arg(1).clone();
    call.memory.set_local(name, value);
    Ok(Value::Null)
}

pub fn builtin_function_exists(call: &mut Invocation<'_>) -> Result<Value> {
    Ok(Value::Boolean(call.ctx.function_exists(&call.string(0))))
}

/// `%call_user_func(name, args...)`: dynamic call, resolved like a direct one.
pub fn builtin_call_user_func(call: &mut Invocation<'_>) -> Result<Value> {
    let name = call.string(0);
    let args = call.args.split_off(1);
    let named = std::mem::take(&mut call.named);
    call.ctx
        .call_function(call.memory, &name, args, named, call.location, CallSite::Expression)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::testing::{eval, eval_err};
    use crate::script::error::ErrorKind;
    use crate::script::interp::Interpreter;
    use crate::script::value::Value;

    fn output(src: &str) -> Vec<String> {
        Interpreter::default()
            .run_text(src)
            .expect("run failed")
            .into_iter()
            .map(|l| l.text)
            .collect()
    }

    #[test]
    fn variable_accessors() {
        let src = "\
!%set_variable_value(\"dyn\", 5)
%variable_exists(\"dyn\") %get_variable_value(\"dyn\") %variable_exists(\"nope\")";
        assert_eq!(output(src), vec!["true 5 false"]);
    }

    #[test]
    fn set_variable_value_binds_in_callers_scope() {
        let src = "\
!function f()
!%set_variable_value(\"tmp\", 1)
!return %variable_exists(\"tmp\")
!endfunction
f() %variable_exists(\"tmp\")";
        assert_eq!(output(src), vec!["true false"]);
    }

    #[test]
    fn function_exists() {
        let src = "!function mine() !return 1\n%function_exists(\"mine\") %function_exists(\"%strlen\") %function_exists(\"none\")";
        assert_eq!(output(src), vec!["true true false"]);
    }

    #[test]
    fn call_user_func() {
        let src = "!function add(a, b) !return a + b\n%call_user_func(\"add\", 2, 3) %call_user_func(\"%upper\", \"x\")";
        assert_eq!(output(src), vec!["5 X"]);
    }

    #[test]
    fn call_user_func_unknown() {
        assert_eq!(eval_err("%call_user_func(\"missing\")").kind, ErrorKind::UnknownFunction);
        assert_eq!(eval("%call_user_func(\"%true\")"), Value::Boolean(true));
    }
}
