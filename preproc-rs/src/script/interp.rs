//! Directive interpreter.
//!
//! [`Interpreter`] owns the memory and execution context for one document
//! and runs directive trees produced by [`stmt`](super::stmt).  Execution is
//! a tree walk: blocks return an optional [`ControlFlow`] signal that
//! unwinds loops and function bodies.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::loader::ResourceLoader;

use super::context::{CallSite, ExecutionContext};
use super::error::{DirectiveError, ErrorKind, Result};
use super::expand::expand;
use super::expr::{eval_args, eval_expr, parse_expr, EvalContext, Expr};
use super::function::{NamedArgs, Registry};
use super::location::{split_lines, LocatedLine, Location};
use super::memory::Memory;
use super::stmt::{parse_document, AssignScope, Condition, Directive};
use super::value::Value;

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-error control-flow signals that can unwind the call stack.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    Break,
    Return(Value),
    /// `!exit`: stop the whole pass.
    Exit,
}

// ── EvalContext adapter ───────────────────────────────────────────────────────

/// Evaluation view over the execution context and the current memory.
struct EvalScope<'a> {
    ctx: &'a mut ExecutionContext,
    memory: &'a mut Memory,
    location: Location,
}

impl EvalContext for EvalScope<'_> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.memory.get(name).cloned()
    }

    fn has_user_function(&self, name: &str) -> bool {
        self.ctx.has_user_function(name)
    }

    fn call_fn(&mut self, name: &str, args: Vec<Value>, named: NamedArgs, location: Location) -> Result<Value> {
        self.ctx
            .call_function(self.memory, name, args, named, location, CallSite::Expression)
    }

    fn location(&self) -> Location {
        self.location
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

impl ExecutionContext {
    /// Evaluate an expression with `memory` as the visible state.
    pub(crate) fn eval(&mut self, memory: &mut Memory, expr: &Expr, location: Location) -> Result<Value> {
        let mut scope = EvalScope { ctx: self, memory, location };
        eval_expr(expr, &mut scope)
    }

    /// Expand the references in a plain text line.
    pub(crate) fn expand_line(&mut self, memory: &mut Memory, line: &LocatedLine) -> Result<String> {
        let mut scope = EvalScope { ctx: self, memory, location: line.location };
        expand(&line.text, &mut scope)
    }

    /// Execute a block of directives in order.
    pub(crate) fn exec_block(&mut self, memory: &mut Memory, block: &[Directive]) -> Result<Option<ControlFlow>> {
        for directive in block {
            if let Some(cf) = self.exec_directive(memory, directive)? {
                return Ok(Some(cf));
            }
            if self.exit_requested {
                return Ok(Some(ControlFlow::Exit));
            }
        }
        Ok(None)
    }

    fn exec_directive(&mut self, memory: &mut Memory, directive: &Directive) -> Result<Option<ControlFlow>> {
        match directive {
            Directive::Plain(line) => {
                if let Some(call) = self.procedure_statement(line) {
                    self.exec_call(memory, &call, line.location)?;
                } else {
                    let text = self.expand_line(memory, line)?;
                    self.emit(LocatedLine::new(text, line.location));
                }
                Ok(None)
            }

            Directive::Assign { name, scope, only_if_undefined, value, location } => {
                if *only_if_undefined && memory.has(name) {
                    return Ok(None);
                }
                let v = self.eval(memory, value, *location)?;
                match scope {
                    AssignScope::Global => memory.set_global(name.clone(), v),
                    AssignScope::Current | AssignScope::Local => memory.set_local(name.clone(), v),
                }
                Ok(None)
            }

            Directive::If { cond, then_block, else_block, location } => {
                let taken = match cond {
                    Condition::Expr(e) => self.eval(memory, e, *location)?.is_truthy(),
                    Condition::Defined(name) => memory.has(name),
                    Condition::NotDefined(name) => !memory.has(name),
                };
                let block = if taken { then_block } else { else_block };
                self.exec_block(memory, block)
            }

            Directive::While { cond, body, location } => {
                let mut iterations = 0;
                while self.eval(memory, cond, *location)?.is_truthy() {
                    self.count_iteration(&mut iterations, "!while", *location)?;
                    match self.exec_block(memory, body)? {
                        Some(ControlFlow::Break) => break,
                        Some(cf) => return Ok(Some(cf)),
                        None => {}
                    }
                }
                Ok(None)
            }

            Directive::Foreach { var, iterable, body, location } => {
                let items = match self.eval(memory, iterable, *location)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(DirectiveError::coercion(
                            format!("cannot iterate over {}", other.type_name()),
                            *location,
                        ))
                    }
                };
                let mut iterations = 0;
                for item in items {
                    self.count_iteration(&mut iterations, "!foreach", *location)?;
                    memory.set_local(var.clone(), item);
                    match self.exec_block(memory, body)? {
                        Some(ControlFlow::Break) => break,
                        Some(cf) => return Ok(Some(cf)),
                        None => {}
                    }
                }
                Ok(None)
            }

            Directive::Call { call, location } => {
                self.exec_call(memory, call, *location)?;
                Ok(None)
            }

            Directive::Define { function, .. } => {
                self.define(Arc::clone(function));
                Ok(None)
            }

            Directive::Return { value, location } => {
                let v = match value {
                    Some(e) => self.eval(memory, e, *location)?,
                    None => Value::Null,
                };
                Ok(Some(ControlFlow::Return(v)))
            }

            Directive::Break { .. } => Ok(Some(ControlFlow::Break)),

            Directive::Exit { location } => {
                tracing::debug!(%location, "exit requested");
                self.exit_requested = true;
                Ok(Some(ControlFlow::Exit))
            }

            Directive::Undef { name, .. } => {
                memory.remove(name);
                Ok(None)
            }

            Directive::Log { text } => {
                let message = self.expand_line(memory, text)?;
                tracing::info!(location = %text.location, "{message}");
                self.log.push(message);
                Ok(None)
            }

            Directive::Assert { cond, source, message, location } => {
                if self.eval(memory, cond, *location)?.is_truthy() {
                    return Ok(None);
                }
                let text = match message {
                    Some(m) => self.eval(memory, m, *location)?.to_string(),
                    None => format!("assertion failed: {source}"),
                };
                Err(DirectiveError::new(ErrorKind::AssertionFailed, text, *location))
            }

            Directive::DumpMemory { location } => {
                let dump = Value::Object(memory.snapshot()).to_json();
                tracing::info!(%location, memory = %dump, "memory dump");
                self.log.push(dump);
                Ok(None)
            }
        }
    }

    fn count_iteration(&self, iterations: &mut usize, what: &str, location: Location) -> Result<()> {
        if *iterations >= self.config().max_loop_iterations {
            tracing::warn!(%location, limit = self.config().max_loop_iterations, "loop limit reached");
            return Err(DirectiveError::new(
                ErrorKind::LoopLimitExceeded,
                format!("{what} exceeded {} iterations", self.config().max_loop_iterations),
                location,
            ));
        }
        *iterations += 1;
        Ok(())
    }

    /// Run a call as a statement; the result, if any, is discarded.
    fn exec_call(&mut self, memory: &mut Memory, call: &Expr, location: Location) -> Result<()> {
        match call {
            Expr::Call { name, args, location: at } => {
                let (positional, named) = {
                    let mut scope = EvalScope { ctx: self, memory, location };
                    eval_args(args, &mut scope)?
                };
                self.call_function(memory, name, positional, named, *at, CallSite::Statement)?;
            }
            other => {
                self.eval(memory, other, location)?;
            }
        }
        Ok(())
    }

    /// A plain line consisting of exactly one call to a user procedure runs
    /// as a statement.
    fn procedure_statement(&self, line: &LocatedLine) -> Option<Expr> {
        let trimmed = line.text.trim();
        if !trimmed.ends_with(')') || !trimmed.starts_with(|c: char| c == '$' || c == '_' || c.is_ascii_alphabetic()) {
            return None;
        }
        let offset = line.text.len() - line.text.trim_start().len();
        let call = parse_expr(trimmed, line.location_at(offset)).ok()?;
        let is_procedure = matches!(&call, Expr::Call { name, .. } if self.is_procedure(name));
        is_procedure.then_some(call)
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

/// Runs documents through the directive engine.
///
/// Variables and function definitions persist across runs on the same
/// interpreter; output is returned per run.
pub struct Interpreter {
    context: ExecutionContext,
    memory: Memory,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Interpreter {
    /// Interpreter over the standard built-ins.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Registry::standard())
    }

    pub fn with_registry(config: EngineConfig, builtins: Arc<Registry>) -> Self {
        Self { context: ExecutionContext::new(config, builtins), memory: Memory::new() }
    }

    pub fn set_loader(&mut self, loader: ResourceLoader) {
        self.context.set_loader(loader);
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Global (top-level) value of a variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.memory.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.memory.set_global(name, value);
    }

    /// Messages produced by `!log` and `!dump_memory`.
    pub fn log(&self) -> &[String] {
        &self.context.log
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Preprocess document text, returning the emitted lines.
    pub fn run_text(&mut self, src: &str) -> Result<Vec<LocatedLine>> {
        self.run_lines(&split_lines(src))
    }

    pub fn run_lines(&mut self, lines: &[LocatedLine]) -> Result<Vec<LocatedLine>> {
        let directives = parse_document(lines)?;
        self.run_directives(&directives)
    }

    /// Execute a pre-parsed directive tree.  On failure the call stack and
    /// scopes are unwound to top level before the error is returned.
    pub fn run_directives(&mut self, directives: &[Directive]) -> Result<Vec<LocatedLine>> {
        self.context.output.clear();
        self.context.exit_requested = false;
        let result = self.context.exec_block(&mut self.memory, directives);
        self.memory.unwind_to(0);
        self.context.reset_frames();
        self.context.exit_requested = false;
        let output = std::mem::take(&mut self.context.output);
        match result {
            Ok(_) => Ok(output),
            Err(e) => {
                tracing::debug!(code = e.code(), error = %e, "preprocessing failed");
                Err(e)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
