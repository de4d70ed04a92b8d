//! Per-run execution state: call stack, function tables, resource loader,
//! and the output buffer.  Directive execution itself lives in
//! [`interp`](super::interp).

use std::sync::Arc;

use crate::config::{EngineConfig, MAX_CALL_DEPTH};
use crate::loader::ResourceLoader;

use super::error::{DirectiveError, ErrorKind, Result};
use super::function::{Function, FunctionKind, NamedArgs, Registry, UserFunction};
use super::location::{LocatedLine, Location};
use super::memory::Memory;
use super::value::Value;

/// One active call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub function: String,
    pub location: Location,
}

/// Where a call appears.  Procedures only run as statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    Expression,
    Statement,
}

pub struct ExecutionContext {
    config: EngineConfig,
    builtins: Arc<Registry>,
    functions: Registry,
    frames: Vec<CallFrame>,
    loader: Option<ResourceLoader>,
    pub(crate) output: Vec<LocatedLine>,
    pub(crate) log: Vec<String>,
    pub(crate) exit_requested: bool,
}

impl ExecutionContext {
    pub fn new(config: EngineConfig, builtins: Arc<Registry>) -> Self {
        Self {
            config,
            builtins,
            functions: Registry::new(),
            frames: Vec::new(),
            loader: None,
            output: Vec::new(),
            log: Vec::new(),
            exit_requested: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_loader(&mut self, loader: ResourceLoader) {
        self.loader = Some(loader);
    }

    pub fn call_stack(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop frames left behind by an aborted run.
    pub(crate) fn reset_frames(&mut self) {
        self.frames.clear();
    }

    /// Register a user function, superseding one of the same name and
    /// parameter count.
    pub fn define(&mut self, function: Arc<UserFunction>) {
        tracing::debug!(function = %function.signature(), "defining user function");
        self.functions.define(function);
    }

    pub fn has_user_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.functions.contains(name) || self.builtins.contains(name)
    }

    pub(crate) fn is_procedure(&self, name: &str) -> bool {
        self.functions
            .overloads(name)
            .iter()
            .any(|f| f.kind() == FunctionKind::Procedure)
    }

    /// Pick the overload for a call.  User definitions are consulted before
    /// built-ins; among several covering overloads the first registered wins.
    pub fn resolve(&self, name: &str, positional: usize, named: &NamedArgs, location: Location) -> Result<Arc<dyn Function>> {
        let keys: Vec<&str> = named.keys().map(String::as_str).collect();
        let candidates: Vec<&Arc<dyn Function>> = self
            .functions
            .overloads(name)
            .iter()
            .chain(self.builtins.overloads(name))
            .collect();
        if candidates.is_empty() {
            return Err(DirectiveError::new(
                ErrorKind::UnknownFunction,
                format!("unknown function {name}"),
                location,
            ));
        }
        let mut matching = candidates.into_iter().filter(|f| f.can_cover(positional, &keys));
        let Some(chosen) = matching.next() else {
            return Err(DirectiveError::new(
                ErrorKind::NoMatchingOverload,
                format!("no overload of {name} accepts {positional} positional argument(s){}", describe_named(&keys)),
                location,
            ));
        };
        let others = matching.count();
        if others > 0 {
            tracing::warn!(
                function = name,
                chosen = %chosen.signature(),
                others,
                %location,
                "ambiguous call, using first registered overload"
            );
        }
        Ok(Arc::clone(chosen))
    }

    /// Resolve and invoke `name`.
    pub fn call_function(
        &mut self,
        memory: &mut Memory,
        name: &str,
        args: Vec<Value>,
        named: NamedArgs,
        location: Location,
        site: CallSite,
    ) -> Result<Value> {
        let function = self.resolve(name, args.len(), &named, location)?;
        if site == CallSite::Expression && function.kind() == FunctionKind::Procedure {
            return Err(DirectiveError::runtime(
                format!("procedure {name} cannot be used in an expression"),
                location,
            ));
        }
        self.invoke(memory, function, args, named, location)
    }

    /// Push a frame (and a scope unless the function works in the caller's),
    /// execute, then pop both on every path.
    pub fn invoke(
        &mut self,
        memory: &mut Memory,
        function: Arc<dyn Function>,
        args: Vec<Value>,
        named: NamedArgs,
        location: Location,
    ) -> Result<Value> {
        let name = function.signature().name().to_owned();
        let limit = self.config.max_call_depth.min(MAX_CALL_DEPTH);
        if self.frames.len() >= limit {
            tracing::warn!(function = %name, depth = self.frames.len(), %location, "call depth limit reached");
            return Err(DirectiveError::new(
                ErrorKind::RecursionLimitExceeded,
                format!("call depth limit of {limit} exceeded calling {name}"),
                location,
            ));
        }
        let frame_depth = self.frames.len();
        let scope_depth = memory.depth();
        self.frames.push(CallFrame { function: name, location });
        if !function.uses_caller_scope() {
            memory.push_scope();
        }
        let result = function.execute(self, memory, location, args, named);
        memory.unwind_to(scope_depth);
        self.frames.truncate(frame_depth);
        result
    }

    /// Fetch a resource through the configured loader.  `Ok(None)` means the
    /// resource does not exist.
    pub fn load_resource(&self, path: &str, location: Location) -> Result<Option<Vec<u8>>> {
        if !self.config.allow_resource_loading {
            return Err(DirectiveError::new(
                ErrorKind::ExternalResourceFailure,
                format!("resource loading is disabled (source {path})"),
                location,
            ));
        }
        let Some(loader) = &self.loader else {
            return Err(DirectiveError::new(
                ErrorKind::ExternalResourceFailure,
                format!("no resource loader configured (source {path})"),
                location,
            ));
        };
        loader(path).map_err(|e| {
            tracing::error!(source = path, error = %e, "resource read failed");
            DirectiveError::new(
                ErrorKind::ExternalResourceFailure,
                format!("cannot read source {path}: {e}"),
                location,
            )
        })
    }

    pub(crate) fn emit(&mut self, line: LocatedLine) {
        self.output.push(line);
    }
}

fn describe_named(keys: &[&str]) -> String {
    if keys.is_empty() {
        String::new()
    } else {
        format!(" and named argument(s) {}", keys.join(", "))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::function::{Builtin, FunctionSignature, Invocation};

    fn one(_: &mut Invocation<'_>) -> Result<Value> {
        Ok(Value::from(1))
    }

    fn two(_: &mut Invocation<'_>) -> Result<Value> {
        Ok(Value::from(2))
    }

    fn depth(call: &mut Invocation<'_>) -> Result<Value> {
        Ok(Value::from(call.ctx.depth() as i64))
    }

    fn dive(call: &mut Invocation<'_>) -> Result<Value> {
        call.ctx
            .call_function(call.memory, "%dive", Vec::new(), NamedArgs::new(), call.location, CallSite::Expression)
    }

    fn context(registry: Registry) -> ExecutionContext {
        ExecutionContext::new(EngineConfig::default(), Arc::new(registry))
    }

    fn call(ctx: &mut ExecutionContext, name: &str, argc: usize) -> Result<Value> {
        let mut memory = Memory::new();
        let args = vec![Value::Null; argc];
        ctx.call_function(&mut memory, name, args, NamedArgs::new(), Location::new(1, 1), CallSite::Expression)
    }

    #[test]
    fn dispatch_by_arity() {
        let mut reg = Registry::new();
        reg.register(Builtin::new(FunctionSignature::exact("%f", 1), one));
        reg.register(Builtin::new(FunctionSignature::exact("%f", 2), two));
        let mut ctx = context(reg);
        assert_eq!(call(&mut ctx, "%f", 2).unwrap(), Value::from(2));
        assert_eq!(call(&mut ctx, "%f", 1).unwrap(), Value::from(1));
        assert_eq!(call(&mut ctx, "%f", 3).unwrap_err().kind, ErrorKind::NoMatchingOverload);
    }

    #[test]
    fn unknown_function() {
        let mut ctx = context(Registry::new());
        let err = call(&mut ctx, "%bogus", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownFunction);
        assert_eq!(err.location, Location::new(1, 1));
    }

    #[test]
    fn ambiguity_prefers_first_registered() {
        let mut reg = Registry::new();
        reg.register(Builtin::new(FunctionSignature::range("%f", 0, 2), one));
        reg.register(Builtin::new(FunctionSignature::exact("%f", 1), two));
        let mut ctx = context(reg);
        assert_eq!(call(&mut ctx, "%f", 1).unwrap(), Value::from(1));
    }

    #[test]
    fn frames_are_popped_after_call() {
        let mut reg = Registry::new();
        reg.register(Builtin::new(FunctionSignature::exact("%depth", 0), depth));
        let mut ctx = context(reg);
        assert_eq!(call(&mut ctx, "%depth", 0).unwrap(), Value::from(1));
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.call_stack().is_empty());
    }

    #[test]
    fn depth_limit() {
        let mut reg = Registry::new();
        reg.register(Builtin::new(FunctionSignature::exact("%depth", 0), depth));
        let config = EngineConfig { max_call_depth: 0, ..EngineConfig::default() };
        let mut ctx = ExecutionContext::new(config, Arc::new(reg));
        let err = call(&mut ctx, "%depth", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionLimitExceeded);
    }

    #[test]
    fn depth_limit_is_capped() {
        let mut reg = Registry::new();
        reg.register(Builtin::new(FunctionSignature::exact("%dive", 0), dive));
        let config = EngineConfig { max_call_depth: 3000, ..EngineConfig::default() };
        let mut ctx = ExecutionContext::new(config, Arc::new(reg));
        let err = call(&mut ctx, "%dive", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionLimitExceeded);
        assert_eq!(err.message, format!("call depth limit of {MAX_CALL_DEPTH} exceeded calling %dive"));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn resource_loading_requires_loader() {
        let ctx = context(Registry::new());
        let err = ctx.load_resource("data.csv", Location::new(2, 1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExternalResourceFailure);
    }

    #[test]
    fn resource_loading_can_be_disabled() {
        let config = EngineConfig { allow_resource_loading: false, ..EngineConfig::default() };
        let mut ctx = ExecutionContext::new(config, Arc::new(Registry::new()));
        ctx.set_loader(crate::loader::map_loader([("data.csv", "x")]));
        let err = ctx.load_resource("data.csv", Location::new(2, 1)).unwrap_err();
        assert!(err.message.contains("disabled"));
    }
}
