//! Lazily compiled gradient wrapper.
//!
//! Wraps a function and, on first call, traces it once, differentiates the
//! traced result with respect to every supplied argument, and compiles the
//! gradient expression into its own artifact. The artifact is cached until
//! an invocation fails, at which point it is discarded so the next call
//! retraces from scratch.

use crate::function::Function;
use crate::graph::{gradients, CompiledArtifact, InputSpec, Node, ReturnValue};
use crate::signature::{BoundArgs, Signature};
use crate::trace::session;
use crate::{Error, Result, Value};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// The gradient wrapper's compilation state.
#[derive(Debug)]
enum GradientState {
    /// No gradient artifact is cached; the next call traces and compiles.
    Uncompiled,
    /// A compiled gradient artifact is live.
    Ready(Rc<CompiledArtifact>),
}

/// A callable wrapper computing gradients of a wrapped function.
///
/// Invoked with the same arguments as the wrapped function; returns the
/// gradient of the single result with respect to every supplied argument,
/// positional arguments before keyword values.
///
/// Unlike the tracer, the gradient trace applies no small-integer boxing
/// to its arguments; interned identities can therefore still collide
/// here. This gap is known and kept.
///
/// # Examples
///
/// ```
/// # use symtrace::{Gradient, Param, Signature, Value};
/// let sig = Signature::new([Param::positional("x")]).unwrap();
/// let df = Gradient::new("square", sig, |args| {
///     let x = args.arg("x");
///     vec![x.mul(x)]
/// });
///
/// let out = df.call(&[Value::from(3.0)], &[]).unwrap();
/// assert_eq!(out.as_single(), Some(&Value::from(6.0)));
/// ```
pub struct Gradient<F> {
    name: String,
    signature: Signature,
    body: F,
    state: RefCell<GradientState>,
}

impl<F> Gradient<F>
where
    F: Fn(&BoundArgs) -> Vec<Value>,
{
    /// Wrap a function body behind a declared signature.
    pub fn new(name: &str, signature: Signature, body: F) -> Self {
        Self {
            name: name.to_string(),
            signature,
            body,
            state: RefCell::new(GradientState::Uncompiled),
        }
    }

    /// Name of the wrapped function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live gradient artifact, if one is compiled.
    pub fn artifact(&self) -> Option<Rc<CompiledArtifact>> {
        match &*self.state.borrow() {
            GradientState::Ready(artifact) => Some(artifact.clone()),
            GradientState::Uncompiled => None,
        }
    }

    /// Compute the gradient of the wrapped function at the given call.
    ///
    /// In the uncompiled state this traces and compiles first; in the
    /// ready state the cached artifact is invoked directly. Any invocation
    /// error discards the cached artifact before it is re-raised, so the
    /// next call retraces from scratch.
    pub fn call(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<ReturnValue> {
        if matches!(*self.state.borrow(), GradientState::Uncompiled) {
            let artifact = self.build(args, kwargs)?;
            *self.state.borrow_mut() = GradientState::Ready(artifact);
        }

        let artifact = match &*self.state.borrow() {
            GradientState::Ready(artifact) => artifact.clone(),
            GradientState::Uncompiled => unreachable!("gradient artifact just compiled"),
        };

        let mut flat: Vec<Value> = args.to_vec();
        flat.extend(kwargs.iter().map(|(_, value)| value.clone()));

        match artifact.invoke(&flat, &[]) {
            Ok(output) => Ok(output),
            Err(err) => {
                debug!("'{}': discarding gradient artifact after failed invocation", self.name);
                *self.state.borrow_mut() = GradientState::Uncompiled;
                Err(err)
            }
        }
    }

    /// Trace once and compile the gradient artifact.
    ///
    /// The artifact's inputs are the supplied arguments' nodes as one
    /// flattened positional list; its output is one gradient node per
    /// argument node, in the same order.
    fn build(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Rc<CompiledArtifact>> {
        let bound = self.signature.bind(args, kwargs)?;
        let (results, identity_map) = session::run(&bound, &self.body);

        let mut arg_nodes: Vec<Arc<Node>> = Vec::with_capacity(args.len() + kwargs.len());
        for (i, value) in args.iter().enumerate() {
            let node = identity_map.get(&value.id()).cloned().ok_or_else(|| {
                match self.signature.positionals().get(i) {
                    Some(param) => Error::UntraceableArgument { name: param.name().to_string() },
                    None => Error::UntraceableVariadicItem {
                        name: self
                            .signature
                            .varargs_name()
                            .unwrap_or("*")
                            .to_string(),
                        index: i - self.signature.positionals().len() + 1,
                    },
                }
            })?;
            arg_nodes.push(node);
        }
        for (name, value) in kwargs {
            let node = identity_map.get(&value.id()).cloned().ok_or_else(|| {
                Error::UntraceableArgument { name: name.to_string() }
            })?;
            arg_nodes.push(node);
        }

        if results.len() != 1 {
            return Err(Error::CompilationFailure {
                reason: format!(
                    "gradient requires a single result, found {}",
                    results.len()
                ),
            });
        }
        let result = &results[0];
        if result.elements().is_some_and(|data| data.len() > 1) {
            return Err(Error::CompilationFailure {
                reason: "gradient requires a scalar result".to_string(),
            });
        }
        let result_node = identity_map
            .get(&result.id())
            .cloned()
            .ok_or(Error::UntraceableResult { index: 1 })?;

        let grads = gradients(&result_node, &arg_nodes);
        let inputs = arg_nodes.into_iter().map(InputSpec::positional).collect();
        let artifact = CompiledArtifact::build(inputs, grads)?;

        debug!(
            "'{}': compiled gradient artifact over {} argument(s)",
            self.name,
            artifact.num_inputs()
        );
        Ok(Rc::new(artifact))
    }
}

impl<F> From<Function<F>> for Gradient<F>
where
    F: Fn(&BoundArgs) -> Vec<Value>,
{
    /// Wrap an existing function's name, signature, and body.
    fn from(function: Function<F>) -> Self {
        let (name, signature, body) = function.into_parts();
        Self::new(&name, signature, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Param;

    fn square_gradient() -> Gradient<impl Fn(&BoundArgs) -> Vec<Value>> {
        let sig = Signature::new([Param::positional("x")]).unwrap();
        Gradient::new("square", sig, |args: &BoundArgs| {
            let x = args.arg("x");
            vec![x.mul(x)]
        })
    }

    #[test]
    fn test_state_starts_uncompiled() {
        let df = square_gradient();
        assert_eq!(df.name(), "square");
        assert!(df.artifact().is_none());
    }

    #[test]
    fn test_first_call_compiles() {
        let df = square_gradient();
        let out = df.call(&[Value::from(3.0)], &[]).unwrap();
        assert_eq!(out.as_single(), Some(&Value::from(6.0)));
        assert!(df.artifact().is_some());
    }

    #[test]
    fn test_ready_state_reuses_artifact() {
        let df = square_gradient();
        df.call(&[Value::from(3.0)], &[]).unwrap();
        let first = df.artifact().unwrap();

        df.call(&[Value::from(5.0)], &[]).unwrap();
        let second = df.artifact().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_invocation_discards_artifact() {
        let df = square_gradient();
        df.call(&[Value::from(3.0)], &[]).unwrap();
        let before = df.artifact().unwrap();

        // Arity mismatch at invocation: the error must reset the state.
        let err = df
            .call(&[Value::from(1.0), Value::from(2.0)], &[])
            .unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
        assert!(df.artifact().is_none());

        // The next call retraces and compiles a distinct artifact.
        let out = df.call(&[Value::from(4.0)], &[]).unwrap();
        assert_eq!(out.as_single(), Some(&Value::from(8.0)));
        let after = df.artifact().unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_multiple_results_are_rejected() {
        let sig = Signature::new([Param::positional("x")]).unwrap();
        let df = Gradient::new("pair", sig, |args: &BoundArgs| {
            let x = args.arg("x");
            vec![x.neg(), x.mul(x)]
        });

        let err = df.call(&[Value::from(1.0)], &[]).unwrap_err();
        assert!(matches!(err, Error::CompilationFailure { .. }));
        assert!(df.artifact().is_none());
    }
}
