//! Numeric operations on values.
//!
//! Every operation computes eagerly and, when a trace session is
//! installed, reports its result so the session can shadow it with a
//! graph node.

mod binary;
mod reduce;
mod unary;
