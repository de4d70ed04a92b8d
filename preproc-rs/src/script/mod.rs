//! Directive language, run before diagram parsing.
//!
//! This module implements a tree-walking interpreter for the `!`-directive
//! preprocessor, covering:
//!
//! - Variables with global and per-call scopes (`!x = …`, `!local`, `!global`)
//! - JSON-shaped values and expressions
//! - Control flow: `!if` … `!elseif` … `!else` … `!endif`, `!while`, `!foreach`
//! - User functions and procedures with overloading by arity and named arguments
//! - Built-in `%functions`, including resource loading (`%load_json`, `%load_csv`)
//! - Expansion of variables and calls in plain diagram lines
//!
//! # Quick start
//!
//! ```rust
//! use preproc::script::Interpreter;
//!
//! let mut interp = Interpreter::default();
//! let out = interp.run_text("!$n = 6\nanswer: %string($n * 7)").unwrap();
//! assert_eq!(out[0].text, "answer: 42");
//! ```

pub mod builtins;
pub mod context;
pub mod error;
pub mod expand;
pub mod expr;
pub mod function;
pub mod interp;
pub mod location;
pub mod memory;
pub mod stmt;
pub mod value;

// Re-exports for convenience.
pub use context::ExecutionContext;
pub use error::{DirectiveError, ErrorKind};
pub use expr::EvalContext;
pub use function::{Builtin, Function, FunctionSignature, Invocation, Registry};
pub use interp::{ControlFlow, Interpreter};
pub use location::{LocatedLine, Location};
pub use memory::Memory;
pub use value::{Number, Object, Value};
