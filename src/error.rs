//! Error types for tracing, binding, and compilation.
//!
//! Uses `thiserror` for structured, matchable variants covering every
//! failure mode a trace or a compiled-artifact invocation can surface.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while binding, tracing, compiling, or invoking.
#[derive(Debug, Error)]
pub enum Error {
    /// A container value was supplied where a graph-trackable scalar or
    /// tensor was required.
    #[error("function arguments can not be containers (received a container for argument '{name}')")]
    InvalidArgumentShape {
        /// Declared name of the offending parameter.
        name: String,
    },

    /// A bound argument's identity was not found after a trace.
    #[error("unable to trace argument '{name}'")]
    UntraceableArgument {
        /// Declared name of the offending parameter.
        name: String,
    },

    /// One element of the variadic tuple was not found after a trace.
    #[error("unable to trace item {index} of variable argument '{name}' (indexed from 1)")]
    UntraceableVariadicItem {
        /// Name of the variadic parameter.
        name: String,
        /// 1-based position of the element within the variadic tuple.
        index: usize,
    },

    /// A returned value's identity was not found after a trace.
    #[error("unable to trace result #{index} (indexed from 1)")]
    UntraceableResult {
        /// 1-based position of the result.
        index: usize,
    },

    /// A parameter-descriptor list was rejected at signature construction.
    #[error("invalid signature: {reason}")]
    InvalidSignature {
        /// What the descriptor list got wrong.
        reason: String,
    },

    /// Call arguments could not be bound to the declared parameters, or an
    /// artifact invocation did not match its compiled calling convention.
    #[error("cannot bind arguments: {reason}")]
    BindingFailure {
        /// What failed to bind.
        reason: String,
    },

    /// The symbolic engine rejected the declared inputs/outputs or the
    /// differentiation request.
    #[error("compilation failed: {reason}")]
    CompilationFailure {
        /// Reason reported by the engine.
        reason: String,
    },
}
