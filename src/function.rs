//! Cache-aware compiled-function wrapper.
//!
//! Wraps an ordinary function body behind a declared signature, traces it
//! once per distinct calling-convention shape, and reuses the compiled
//! artifact for every later call with the same shape.

use crate::graph::{CompiledArtifact, InputSpec, ReturnValue};
use crate::signature::{BoundArgs, Signature};
use crate::trace::{TracedArg, Tracer};
use crate::{Result, Value};
use log::{debug, trace};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Cache of compiled artifacts keyed by calling-convention shape.
///
/// The key is the number of variadic arguments supplied: the compiled
/// input list differs whenever that count differs, so artifacts are not
/// interchangeable across counts, while every non-variadic call shares
/// key 0. Entries are added on first use of a shape and never evicted.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: RefCell<HashMap<usize, Rc<CompiledArtifact>>>,
}

impl ArtifactCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact compiled for the given variadic-argument count.
    pub fn get(&self, key: usize) -> Option<Rc<CompiledArtifact>> {
        self.entries.borrow().get(&key).cloned()
    }

    /// Store an artifact under the given variadic-argument count.
    pub fn insert(&self, key: usize, artifact: CompiledArtifact) -> Rc<CompiledArtifact> {
        let artifact = Rc::new(artifact);
        self.entries.borrow_mut().insert(key, artifact.clone());
        artifact
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A callable wrapper that compiles its function on demand.
///
/// # Examples
///
/// ```
/// # use symtrace::{Function, Param, Signature, Value};
/// let sig = Signature::new([Param::positional("x")]).unwrap();
/// let f = Function::new("square", sig, |args| {
///     let x = args.arg("x");
///     vec![x.mul(x)]
/// });
///
/// let out = f.call(&[Value::from(3.0)], &[]).unwrap();
/// assert_eq!(out.as_single(), Some(&Value::from(9.0)));
/// ```
pub struct Function<F> {
    name: String,
    signature: Signature,
    body: F,
    tracer: RefCell<Tracer>,
    cache: ArtifactCache,
}

impl<F> Function<F>
where
    F: Fn(&BoundArgs) -> Vec<Value>,
{
    /// Wrap a function body behind a declared signature.
    ///
    /// Small-integer defaults in the signature are boxed to fresh
    /// identities up front, so interned values never reach a trace
    /// through the defaults.
    pub fn new(name: &str, signature: Signature, body: F) -> Self {
        Self::with_cache(name, signature, body, ArtifactCache::new())
    }

    /// Wrap a function body using a caller-provided artifact cache.
    pub fn with_cache(
        name: &str,
        signature: Signature,
        body: F,
        cache: ArtifactCache,
    ) -> Self {
        Self {
            name: name.to_string(),
            signature: signature.boxed_defaults(),
            body,
            tracer: RefCell::new(Tracer::new()),
            cache,
        }
    }

    /// Name of the wrapped function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared calling convention.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The artifact cache.
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Run the body eagerly, without tracing or compilation.
    pub fn apply(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Vec<Value>> {
        let bound = self.signature.bind(args, kwargs)?;
        Ok((self.body)(&bound))
    }

    /// Call the function through its compiled artifact.
    ///
    /// Looks up the artifact cache by the call's variadic-argument count;
    /// on a miss, traces the function once and compiles (and caches) an
    /// artifact; on a hit, reuses the cached artifact with no retrace.
    pub fn call(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<ReturnValue> {
        let bound = self.signature.bind(args, kwargs)?;
        let key = bound.variadic_len();

        let artifact = match self.cache.get(key) {
            Some(artifact) => {
                trace!("'{}': reusing artifact for {} variadic argument(s)", self.name, key);
                artifact
            }
            None => self.compile(args, kwargs)?,
        };

        let positional = bound.positional_values();
        let keywords = bound.keyword_values();
        artifact.invoke(&positional, &keywords)
    }

    /// Trace once and compile an artifact for this call's shape.
    ///
    /// Declares one graph input per traced argument: variadic elements get
    /// fresh inputs named `{name}_{index}`; every other entry one named
    /// input, with the signature's default threaded through where one
    /// applies. Outputs are the traced results in order.
    fn compile(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Rc<CompiledArtifact>> {
        let mut tracer = self.tracer.borrow_mut();
        let (bound, _) = tracer.trace(&self.signature, &self.body, args, kwargs)?;

        let mut inputs = Vec::new();
        for (name, traced) in tracer.argument_binding() {
            match traced {
                TracedArg::Sequence(nodes) => {
                    for (i, node) in nodes.iter().enumerate() {
                        inputs.push(InputSpec::named(format!("{name}_{i}"), node.clone()));
                    }
                }
                TracedArg::Single(node) => {
                    inputs.push(InputSpec::with_default(
                        name.clone(),
                        self.signature.compiled_default(name),
                        node.clone(),
                    ));
                }
            }
        }

        let outputs = tracer.result_binding().values().cloned().collect();
        let artifact = CompiledArtifact::build(inputs, outputs)?;

        let key = bound.variadic_len();
        debug!(
            "'{}': compiled artifact with {} input(s) for {} variadic argument(s)",
            self.name,
            artifact.num_inputs(),
            key
        );
        Ok(self.cache.insert(key, artifact))
    }

    /// Decompose into name, signature, and body.
    pub(crate) fn into_parts(self) -> (String, Signature, F) {
        (self.name, self.signature, self.body)
    }
}
