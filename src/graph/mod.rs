//! The symbolic engine: expression nodes, evaluation, compiled artifacts,
//! and graph-based differentiation.

pub mod artifact;
pub mod gradient;
pub mod interp;
pub mod node;

pub use artifact::{CompiledArtifact, InputSpec, ReturnValue};
pub use gradient::gradients;
pub use interp::Evaluator;
pub use node::{Node, Primitive};
