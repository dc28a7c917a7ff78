//! Tracing infrastructure: the instrumented execution engine and the
//! tracer that correlates one execution with its graph shadow.

pub mod session;
pub mod tracer;

pub use session::{is_tracing, TraceSession};
pub use tracer::{TracedArg, Tracer};
