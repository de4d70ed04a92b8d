//! Callable functions: signatures, the [`Function`] trait, built-ins,
//! user-defined functions, and the registry that holds them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::context::ExecutionContext;
use super::error::{DirectiveError, ErrorKind, Result};
use super::expr::Expr;
use super::interp::ControlFlow;
use super::location::{LocatedLine, Location};
use super::memory::Memory;
use super::stmt::{parse_body, Directive};
use super::value::{Number, Value};

/// Named call arguments, keyed by parameter name.
pub type NamedArgs = BTreeMap<String, Value>;

// ── Signature ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxArgs {
    Bounded(usize),
    Unbounded,
}

impl MaxArgs {
    pub fn admits(self, n: usize) -> bool {
        match self {
            MaxArgs::Bounded(max) => n <= max,
            MaxArgs::Unbounded => true,
        }
    }
}

/// Name plus the argument shapes a function accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    name: String,
    min_args: usize,
    max_args: MaxArgs,
    named: BTreeSet<String>,
}

impl FunctionSignature {
    /// # Panics
    /// If `min_args` exceeds a bounded `max_args`.
    pub fn new(name: impl Into<String>, min_args: usize, max_args: MaxArgs) -> Self {
        assert!(max_args.admits(min_args), "minimum argument count exceeds maximum");
        Self { name: name.into(), min_args, max_args, named: BTreeSet::new() }
    }

    pub fn exact(name: impl Into<String>, n: usize) -> Self {
        Self::new(name, n, MaxArgs::Bounded(n))
    }

    pub fn range(name: impl Into<String>, min: usize, max: usize) -> Self {
        Self::new(name, min, MaxArgs::Bounded(max))
    }

    pub fn variadic(name: impl Into<String>, min: usize) -> Self {
        Self::new(name, min, MaxArgs::Unbounded)
    }

    pub fn with_named<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.named.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> MaxArgs {
        self.max_args
    }

    pub fn named_keys(&self) -> &BTreeSet<String> {
        &self.named
    }

    /// Arity and named-key check shared by built-ins.
    pub fn covers(&self, positional: usize, named_keys: &[&str]) -> bool {
        positional >= self.min_args
            && self.max_args.admits(positional)
            && named_keys.iter().all(|k| self.named.contains(*k))
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_args {
            MaxArgs::Bounded(max) if max == self.min_args => write!(f, "{}/{}", self.name, max),
            MaxArgs::Bounded(max) => write!(f, "{}/{}..{}", self.name, self.min_args, max),
            MaxArgs::Unbounded => write!(f, "{}/{}..", self.name, self.min_args),
        }
    }
}

// ── Function trait ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Returns a value; usable in expressions.
    Function,
    /// Emits output lines; callable only as a statement.
    Procedure,
}

/// Anything the resolver can dispatch a call to.
pub trait Function: Send + Sync + fmt::Debug {
    fn signature(&self) -> &FunctionSignature;

    fn can_cover(&self, positional: usize, named_keys: &[&str]) -> bool {
        self.signature().covers(positional, named_keys)
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Function
    }

    /// Run in the caller's scope instead of a fresh one.  Built-ins that read
    /// or write the caller's variables return `true`.
    fn uses_caller_scope(&self) -> bool {
        false
    }

    fn execute(
        &self,
        ctx: &mut ExecutionContext,
        memory: &mut Memory,
        location: Location,
        args: Vec<Value>,
        named: NamedArgs,
    ) -> Result<Value>;
}

// ── Built-ins ─────────────────────────────────────────────────────────────────

pub type BuiltinFn = fn(&mut Invocation<'_>) -> Result<Value>;

/// Everything a built-in sees for one call.
pub struct Invocation<'a> {
    pub ctx: &'a mut ExecutionContext,
    pub memory: &'a mut Memory,
    pub location: Location,
    pub name: &'a str,
    pub args: Vec<Value>,
    pub named: NamedArgs,
}

static NULL: Value = Value::Null;

impl Invocation<'_> {
    /// Positional argument `i`, or `Null` when absent.
    pub fn arg(&self, i: usize) -> &Value {
        self.args.get(i).unwrap_or(&NULL)
    }

    pub fn string(&self, i: usize) -> String {
        self.arg(i).to_string()
    }

    pub fn number(&self, i: usize) -> Result<Number> {
        self.arg(i).to_number().map_err(|e| {
            self.error(
                ErrorKind::TypeCoercionFailure,
                format!("argument {} of {}: {e}", i + 1, self.name),
            )
        })
    }

    pub fn int(&self, i: usize) -> Result<i64> {
        self.number(i).map(Number::as_i64)
    }

    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) -> DirectiveError {
        DirectiveError::new(kind, message, self.location)
    }
}

#[derive(Clone)]
pub struct Builtin {
    signature: FunctionSignature,
    caller_scope: bool,
    func: BuiltinFn,
}

impl Builtin {
    pub fn new(signature: FunctionSignature, func: BuiltinFn) -> Self {
        Self { signature, caller_scope: false, func }
    }

    pub fn with_caller_scope(mut self) -> Self {
        self.caller_scope = true;
        self
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.signature)
    }
}

impl Function for Builtin {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn uses_caller_scope(&self) -> bool {
        self.caller_scope
    }

    fn execute(
        &self,
        ctx: &mut ExecutionContext,
        memory: &mut Memory,
        location: Location,
        args: Vec<Value>,
        named: NamedArgs,
    ) -> Result<Value> {
        let mut call = Invocation { ctx, memory, location, name: &self.signature.name, args, named };
        (self.func)(&mut call)
    }
}

// ── User-defined functions ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Evaluated in the callee's scope when the argument is omitted.
    pub default: Option<Expr>,
}

/// A `!function` or `!procedure` definition.  The body is kept as raw lines
/// and parsed on first call; the parse result is cached.
#[derive(Debug)]
pub struct UserFunction {
    signature: FunctionSignature,
    kind: FunctionKind,
    params: Vec<Param>,
    body: Vec<LocatedLine>,
    location: Location,
    parsed: OnceLock<Result<Arc<[Directive]>>>,
}

impl UserFunction {
    pub fn new(name: impl Into<String>, kind: FunctionKind, params: Vec<Param>, body: Vec<LocatedLine>, location: Location) -> Self {
        let required = params.iter().take_while(|p| p.default.is_none()).count();
        let signature = FunctionSignature::range(name, required, params.len())
            .with_named(params.iter().map(|p| p.name.clone()));
        Self { signature, kind, params, body, location, parsed: OnceLock::new() }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn location(&self) -> Location {
        self.location
    }

    fn directives(&self) -> Result<Arc<[Directive]>> {
        self.parsed
            .get_or_init(|| parse_body(&self.body, self.kind).map(Arc::from))
            .clone()
    }

    /// Bind arguments in the (already pushed) callee scope.  Omitted
    /// parameters take their defaults, evaluated left to right so a default
    /// may refer to earlier parameters.
    fn bind(
        &self,
        ctx: &mut ExecutionContext,
        memory: &mut Memory,
        location: Location,
        args: Vec<Value>,
        mut named: NamedArgs,
    ) -> Result<()> {
        let given = args.len();
        for (param, value) in self.params.iter().zip(args) {
            memory.set_local(param.name.clone(), value);
        }
        for param in self.params.iter().skip(given) {
            let value = match (named.remove(&param.name), &param.default) {
                (Some(v), _) => v,
                (None, Some(default)) => ctx.eval(memory, default, location)?,
                (None, None) => {
                    return Err(DirectiveError::new(
                        ErrorKind::NoMatchingOverload,
                        format!("missing argument {} for {}", param.name, self.signature.name),
                        location,
                    ))
                }
            };
            memory.set_local(param.name.clone(), value);
        }
        Ok(())
    }
}

impl Function for UserFunction {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    /// Covers the call when every parameter is bound exactly once: by
    /// position, by name, or by its default.
    fn can_cover(&self, positional: usize, named_keys: &[&str]) -> bool {
        if positional > self.params.len() {
            return false;
        }
        let (bound, rest) = self.params.split_at(positional);
        if named_keys.iter().any(|k| bound.iter().any(|p| p.name == *k) || !rest.iter().any(|p| p.name == *k)) {
            return false;
        }
        rest.iter()
            .all(|p| p.default.is_some() || named_keys.contains(&p.name.as_str()))
    }

    fn kind(&self) -> FunctionKind {
        self.kind
    }

    fn execute(
        &self,
        ctx: &mut ExecutionContext,
        memory: &mut Memory,
        location: Location,
        args: Vec<Value>,
        named: NamedArgs,
    ) -> Result<Value> {
        let body = self.directives()?;
        self.bind(ctx, memory, location, args, named)?;
        match ctx.exec_block(memory, &body)? {
            Some(ControlFlow::Return(v)) if self.kind == FunctionKind::Function => Ok(v),
            _ => Ok(Value::Null),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Overloads by name, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, Vec<Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared registry of standard built-ins.
    pub fn standard() -> Arc<Registry> {
        super::builtins::standard()
    }

    /// Add an overload.  Existing overloads are kept; resolution prefers the
    /// first registered when several cover a call.
    pub fn register(&mut self, function: impl Function + 'static) {
        self.register_arc(Arc::new(function));
    }

    pub fn register_arc(&mut self, function: Arc<dyn Function>) {
        self.entries
            .entry(function.signature().name().to_owned())
            .or_default()
            .push(function);
    }

    /// Add or replace: an existing overload with the same parameter count is
    /// superseded by the new definition.
    pub fn define(&mut self, function: Arc<dyn Function>) {
        let overloads = self.entries.entry(function.signature().name().to_owned()).or_default();
        let max = function.signature().max_args();
        match overloads.iter_mut().find(|f| f.signature().max_args() == max) {
            Some(slot) => *slot = function,
            None => overloads.push(function),
        }
    }

    pub fn overloads(&self, name: &str) -> &[Arc<dyn Function>] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.overloads(name).is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
