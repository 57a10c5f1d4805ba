//! Typed failures raised by the interpreter.
//!
//! Every fallible function in this crate returns [`anyhow::Result`]. The
//! variants below are raised with `bail!` and can be recovered with
//! `anyhow::Error::downcast_ref::<InterpError>()`, even after context has
//! been attached while the error unwinds through nested calls.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("size mismatch: expected {expected} bytes, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("unsupported operand types for {op}: {types}")]
    UnsupportedOperandTypes { op: String, types: String },

    #[error("{value} has no binding in `{function}`")]
    UnboundValue { value: String, function: String },

    #[error("global `{0}` has not been registered")]
    UnresolvedGlobal(String),

    #[error("PHI in `{function}` has no entry for predecessor {block}")]
    UnlistedPredecessor { function: String, block: String },

    #[error("`{function}` expects {expected} arguments, but {found} were given")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("foreign symbol `{0}` not found")]
    ForeignSymbolNotFound(String),

    #[error("type {0} has no foreign ABI mapping")]
    UnsupportedAbiType(String),

    #[error("reached unreachable code in `{function}`")]
    ReachedUnreachable { function: String },

    #[error("call depth {depth} exceeds the limit of {limit} frames")]
    StackOverflow { depth: usize, limit: usize },

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("invalid memory access of {size} bytes at 0x{address:x}")]
    InvalidMemoryAccess { address: usize, size: usize },

    #[error("no function at address 0x{0:x}")]
    UnknownFunction(usize),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}

/// Returns the typed failure carried by `error`, if any.
pub fn interp_error(error: &anyhow::Error) -> Option<&InterpError> {
    error.downcast_ref::<InterpError>()
}
