//! Error types for expression evaluation

use thiserror::Error;

/// Result type alias using EvalError
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while parsing or evaluating an expression
///
/// Missing variables and absent path segments are *not* errors — they
/// resolve to the null sentinel. Errors are reserved for malformed
/// expressions and failed numeric coercion.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The expression text could not be parsed
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A call expression names a function outside the builtin table
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// Wrong number of arguments to a builtin
    #[error("{function}() expects {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: String,
        got: usize,
    },

    /// A value could not be coerced to a number where one was required
    #[error("Expected a number, got {0}")]
    NotNumeric(String),

    /// A sequence builtin was applied to a non-sequence value
    #[error("{function}() expects a sequence, got {got}")]
    NotASequence {
        function: &'static str,
        got: &'static str,
    },

    /// Two values with no defined ordering were compared with < <= > >=
    #[error("Cannot order {left} against {right}")]
    NotOrdered {
        left: &'static str,
        right: &'static str,
    },

    /// Division or remainder by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Arithmetic overflowed to a non-finite number
    #[error("Arithmetic produced a non-finite number")]
    NonFinite,
}

impl EvalError {
    /// Create a parse error at the given byte offset
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }
}
