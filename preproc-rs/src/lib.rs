//! Directive preprocessing engine for text-to-diagram sources.

pub mod cli;
pub mod config;
pub mod loader;
pub mod script;

pub use config::EngineConfig;
pub use script::{DirectiveError, ErrorKind, Interpreter, LocatedLine, Location, Value};
