//! Error types for the dependency graph.
//!
//! Every fallible operation in the crate returns [`Result`]. The first three
//! variants of [`Error`] are raised before any state is touched, so the graph
//! is unchanged when a caller sees them. [`Error::ConsistencyViolation`]
//! means an internal invariant broke and should never be retried.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by cells, nodes and the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// `set` was called on something read-only.
    #[error("{what} is immutable")]
    Immutability { what: &'static str },

    /// A variable received a value of a different kind than it holds.
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The value cannot be held by a source node.
    #[error("value rejected: {reason}")]
    ValueRejected { reason: String },

    /// An internal invariant was broken.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// A derived node's function failed while recomputing.
    #[error("{source}\n  while evaluating: {expr}")]
    Compute {
        expr: String,
        #[source]
        source: ComputeError,
    },
}

impl Error {
    /// Whether this error signals a bug rather than a caller mistake.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConsistencyViolation(_))
    }

    /// The description of the failing node, for [`Error::Compute`].
    pub fn expression(&self) -> Option<&str> {
        match self {
            Error::Compute { expr, .. } => Some(expr),
            _ => None,
        }
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        Error::ConsistencyViolation(msg.into())
    }
}

/// Failure returned by a derived node's function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("unsupported operand kinds for {op}: {lhs} and {rhs}")]
    UnsupportedOperands {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },

    #[error("{func} expected {expected} arguments, got {found}")]
    Arity {
        func: String,
        expected: usize,
        found: usize,
    },

    #[error("{0}")]
    Custom(String),
}

impl From<String> for ComputeError {
    fn from(msg: String) -> Self {
        ComputeError::Custom(msg)
    }
}

impl From<&str> for ComputeError {
    fn from(msg: &str) -> Self {
        ComputeError::Custom(msg.to_owned())
    }
}
