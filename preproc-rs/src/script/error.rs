//! The single located error type raised by directive execution.

use super::location::Location;
use super::value::ValueError;

/// What went wrong.  Each kind has a stable code for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownFunction,
    NoMatchingOverload,
    TypeCoercionFailure,
    RecursionLimitExceeded,
    LoopLimitExceeded,
    ExternalResourceFailure,
    MalformedLiteral,
    Syntax,
    AssertionFailed,
    Runtime,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::UnknownFunction => "E_UNKNOWN_FUNCTION",
            Self::NoMatchingOverload => "E_NO_MATCHING_OVERLOAD",
            Self::TypeCoercionFailure => "E_TYPE_COERCION",
            Self::RecursionLimitExceeded => "E_RECURSION_LIMIT",
            Self::LoopLimitExceeded => "E_LOOP_LIMIT",
            Self::ExternalResourceFailure => "E_RESOURCE",
            Self::MalformedLiteral => "E_MALFORMED_LITERAL",
            Self::Syntax => "E_SYNTAX",
            Self::AssertionFailed => "E_ASSERTION",
            Self::Runtime => "E_RUNTIME",
        }
    }
}

/// A directive failure pinned to the source location that caused it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{location}: {message}")]
pub struct DirectiveError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Location,
}

pub type Result<T> = std::result::Result<T, DirectiveError>;

impl DirectiveError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self { kind, message: message.into(), location }
    }

    pub fn syntax(message: impl Into<String>, location: Location) -> Self {
        Self::new(ErrorKind::Syntax, message, location)
    }

    pub fn runtime(message: impl Into<String>, location: Location) -> Self {
        Self::new(ErrorKind::Runtime, message, location)
    }

    pub fn coercion(message: impl Into<String>, location: Location) -> Self {
        Self::new(ErrorKind::TypeCoercionFailure, message, location)
    }

    /// Lift a value-level failure to a located error.
    pub fn from_value(err: ValueError, location: Location) -> Self {
        Self::new(err.kind(), err.to_string(), location)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location() {
        let e = DirectiveError::new(ErrorKind::UnknownFunction, "unknown function %bogus", Location::new(4, 7));
        assert_eq!(e.to_string(), "line 4, column 7: unknown function %bogus");
        assert_eq!(e.code(), "E_UNKNOWN_FUNCTION");
    }

    #[test]
    fn lifted_value_error_keeps_kind() {
        let e = DirectiveError::from_value(ValueError::DivisionByZero, Location::new(1, 1));
        assert_eq!(e.kind, ErrorKind::Runtime);
        assert_eq!(e.message, "division by zero");
    }
}
