//! # symtrace: symbolic tracing for numeric functions
//!
//! Executes an ordinary imperative numeric function once under an
//! instrumented runtime, shadows every intermediate value with a symbolic
//! graph node, and compiles the captured graph into a reusable executable
//! artifact. Gradients come from differentiating the captured graph, not
//! from rewriting the function.
//!
//! ## Key pieces
//!
//! - **Tracing**: one instrumented execution per distinct calling shape,
//!   correlating runtime values with graph nodes by identity
//! - **Compilation**: traced arguments become declared artifact inputs
//!   (variadic elements individually, defaults threaded through)
//! - **Caching**: artifacts are cached by the number of variadic
//!   arguments supplied and reused without retracing
//! - **Gradients**: a lazily compiled gradient artifact, discarded on
//!   invocation failure so the next call retraces from scratch
//!
//! Tracing is thread-local and the wrappers use interior mutability
//! without synchronization, so `Function` and `Gradient` are not `Sync`;
//! share an instance across threads only behind an external lock.
//!
//! ## Quick Start
//!
//! ```
//! use symtrace::{Function, Param, Signature, Value};
//!
//! let sig = Signature::new([Param::positional("x")]).unwrap();
//! let f = Function::new("square", sig, |args| {
//!     let x = args.arg("x");
//!     vec![x.mul(x)]
//! });
//!
//! let out = f.call(&[Value::from(3.0)], &[]).unwrap();
//! assert_eq!(out.as_single(), Some(&Value::from(9.0)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod function;
mod gradient;
pub mod graph;
mod ops;
mod signature;
pub mod trace;
mod value;

// Public exports
pub use error::{Error, Result};
pub use function::{ArtifactCache, Function};
pub use gradient::Gradient;
pub use graph::{CompiledArtifact, InputSpec, Node, Primitive, ReturnValue};
pub use signature::{BoundArgs, BoundValue, Param, ParamKind, Signature};
pub use trace::{TracedArg, Tracer};
pub use value::{Payload, Value, INTERN_MAX, INTERN_MIN};
