//! Correlating one execution with its graph shadow.
//!
//! The tracer runs the target function once under the instrumented engine
//! and maintains three ordered maps, all rebuilt from scratch on every
//! trace:
//!
//! - the identity map: every runtime value observed, by identity;
//! - the argument binding: the subset that are the function's bound
//!   arguments, by declared name;
//! - the result binding: the subset that are the function's results.

use crate::graph::Node;
use crate::signature::{BoundArgs, BoundValue, Signature};
use crate::trace::session;
use crate::{Error, Result, Value};
use indexmap::IndexMap;
use log::trace;
use std::sync::Arc;

/// Graph nodes bound to one declared parameter.
#[derive(Debug, Clone)]
pub enum TracedArg {
    /// An ordinary parameter's single node.
    Single(Arc<Node>),
    /// The variadic parameter's nodes, one per supplied element.
    Sequence(Vec<Arc<Node>>),
}

/// Captures value-to-node correspondences for one function.
#[derive(Debug, Default)]
pub struct Tracer {
    /// All values observed during the last trace, by identity
    vars: IndexMap<usize, Arc<Node>>,
    /// The function's bound arguments, by declared name
    args: IndexMap<String, TracedArg>,
    /// The function's results, by identity
    results: IndexMap<usize, Arc<Node>>,
}

impl Tracer {
    /// Create a tracer with empty maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value observed during the last trace, keyed by identity.
    pub fn identity_map(&self) -> &IndexMap<usize, Arc<Node>> {
        &self.vars
    }

    /// The last trace's arguments, keyed by declared name.
    pub fn argument_binding(&self) -> &IndexMap<String, TracedArg> {
        &self.args
    }

    /// The last trace's results, keyed by value identity.
    pub fn result_binding(&self) -> &IndexMap<usize, Arc<Node>> {
        &self.results
    }

    /// Execute the function once under instrumentation and rebuild all
    /// three maps from the observed correspondences.
    ///
    /// Returns the bound (pre-processed) arguments and the results the
    /// body produced.
    pub fn trace<F>(
        &mut self,
        signature: &Signature,
        body: &F,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<(BoundArgs, Vec<Value>)>
    where
        F: Fn(&BoundArgs) -> Vec<Value>,
    {
        let (args, owned_kwargs) = preprocess(signature, args, kwargs)?;
        let kwargs: Vec<(&str, Value)> = owned_kwargs
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        let bound = signature.bind(&args, &kwargs)?;

        self.vars.clear();
        self.args.clear();
        self.results.clear();

        let (results, identity_map) = session::run(&bound, body);
        self.vars = identity_map;

        for (name, entry) in bound.entries() {
            match entry {
                BoundValue::Sequence(values) => {
                    let mut nodes = Vec::with_capacity(values.len());
                    for (i, value) in values.iter().enumerate() {
                        let node = self.vars.get(&value.id()).cloned().ok_or_else(|| {
                            Error::UntraceableVariadicItem {
                                name: name.clone(),
                                index: i + 1,
                            }
                        })?;
                        nodes.push(node);
                    }
                    self.args.insert(name.clone(), TracedArg::Sequence(nodes));
                }
                BoundValue::Bag(bag) => {
                    for (key, value) in bag {
                        let node = self.vars.get(&value.id()).cloned().ok_or_else(|| {
                            Error::UntraceableArgument { name: key.clone() }
                        })?;
                        self.args.insert(key.clone(), TracedArg::Single(node));
                    }
                }
                BoundValue::One(value) => {
                    let node = self.vars.get(&value.id()).cloned().ok_or_else(|| {
                        Error::UntraceableArgument { name: name.clone() }
                    })?;
                    self.args.insert(name.clone(), TracedArg::Single(node));
                }
            }
        }

        for (i, result) in results.iter().enumerate() {
            let node = self
                .vars
                .get(&result.id())
                .cloned()
                .ok_or(Error::UntraceableResult { index: i + 1 })?;
            self.results.insert(result.id(), node);
        }

        trace!(
            "traced {} value(s), {} argument(s), {} result(s)",
            self.vars.len(),
            self.args.len(),
            self.results.len()
        );

        Ok((bound, results))
    }
}

/// Pre-process the supplied arguments before binding.
///
/// Small integers are boxed to fresh identities, because interned values
/// would collide on one graph node; containers are rejected outright,
/// because the compiled calling convention cannot represent them.
fn preprocess(
    signature: &Signature,
    args: &[Value],
    kwargs: &[(&str, Value)],
) -> Result<(Vec<Value>, Vec<(String, Value)>)> {
    let check = |name: &str, value: &Value| -> Result<Value> {
        if value.is_container() {
            return Err(Error::InvalidArgumentShape { name: name.to_string() });
        }
        if value.is_small_int() {
            return Ok(value.boxed());
        }
        Ok(value.clone())
    };

    let mut checked_args = Vec::with_capacity(args.len());
    for (i, value) in args.iter().enumerate() {
        let name = signature
            .positionals()
            .get(i)
            .map(|p| p.name().to_string())
            .or_else(|| signature.varargs_name().map(str::to_string))
            .unwrap_or_else(|| format!("#{}", i + 1));
        checked_args.push(check(&name, value)?);
    }

    let mut checked_kwargs = Vec::with_capacity(kwargs.len());
    for (name, value) in kwargs {
        checked_kwargs.push((name.to_string(), check(name, value)?));
    }

    Ok((checked_args, checked_kwargs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Param;

    fn product_signature() -> Signature {
        Signature::new([Param::positional("x"), Param::positional("y")]).unwrap()
    }

    fn product(args: &BoundArgs) -> Vec<Value> {
        vec![args.arg("x").mul(args.arg("y"))]
    }

    #[test]
    fn test_trace_binds_every_parameter_and_result() {
        let sig = product_signature();
        let mut tracer = Tracer::new();
        let (_, results) = tracer
            .trace(&sig, &product, &[Value::from(2.0), Value::from(3.0)], &[])
            .unwrap();

        assert_eq!(results, vec![Value::from(6.0)]);
        assert_eq!(tracer.argument_binding().len(), 2);
        assert_eq!(tracer.result_binding().len(), 1);
        assert!(tracer.argument_binding().contains_key("x"));
        assert!(tracer.argument_binding().contains_key("y"));
    }

    #[test]
    fn test_retrace_discards_previous_nodes() {
        let sig = product_signature();
        let mut tracer = Tracer::new();

        tracer
            .trace(&sig, &product, &[Value::from(2.0), Value::from(3.0)], &[])
            .unwrap();
        let first: Vec<usize> =
            tracer.identity_map().values().map(Node::addr).collect();

        tracer
            .trace(&sig, &product, &[Value::from(4.0), Value::from(5.0)], &[])
            .unwrap();
        let second: Vec<usize> =
            tracer.identity_map().values().map(Node::addr).collect();

        assert!(first.iter().all(|addr| !second.contains(addr)));
    }

    #[test]
    fn test_small_ints_are_boxed_apart() {
        // Both arguments carry the interned integer 1; boxing must keep
        // their graph nodes distinct.
        let sig = product_signature();
        let mut tracer = Tracer::new();
        let one = Value::from(1i64);
        tracer.trace(&sig, &product, &[one.clone(), one], &[]).unwrap();

        let x = match &tracer.argument_binding()["x"] {
            TracedArg::Single(node) => Node::addr(node),
            other => panic!("expected single binding, got {other:?}"),
        };
        let y = match &tracer.argument_binding()["y"] {
            TracedArg::Single(node) => Node::addr(node),
            other => panic!("expected single binding, got {other:?}"),
        };
        assert_ne!(x, y);
    }

    #[test]
    fn test_container_argument_is_rejected() {
        let sig = product_signature();
        let mut tracer = Tracer::new();
        let err = tracer
            .trace(
                &sig,
                &product,
                &[Value::list(vec![Value::from(1i64)]), Value::from(2.0)],
                &[],
            )
            .unwrap_err();

        match err {
            Error::InvalidArgumentShape { name } => assert_eq!(name, "x"),
            other => panic!("expected InvalidArgumentShape, got {other:?}"),
        }
    }

    #[test]
    fn test_variadic_elements_bind_individually() {
        let sig =
            Signature::new([Param::positional("x"), Param::variadic("rest")]).unwrap();

        let body = |args: &BoundArgs| -> Vec<Value> {
            let mut acc = args.arg("x").clone();
            for v in args.varargs() {
                acc = acc.add(v);
            }
            vec![acc]
        };

        let mut tracer = Tracer::new();
        tracer
            .trace(
                &sig,
                &body,
                &[Value::from(1.0), Value::from(2.0), Value::from(3.0)],
                &[],
            )
            .unwrap();

        match &tracer.argument_binding()["rest"] {
            TracedArg::Sequence(nodes) => assert_eq!(nodes.len(), 2),
            other => panic!("expected sequence binding, got {other:?}"),
        }
    }

    #[test]
    fn test_keyword_bag_entries_bind_by_name() {
        let sig =
            Signature::new([Param::positional("x"), Param::keyword_bag("opts")]).unwrap();

        let body = |args: &BoundArgs| -> Vec<Value> {
            let scale = args.keyword("scale").expect("scale supplied");
            vec![args.arg("x").mul(scale)]
        };

        let mut tracer = Tracer::new();
        tracer
            .trace(&sig, &body, &[Value::from(2.0)], &[("scale", Value::from(4.0))])
            .unwrap();

        assert!(matches!(
            tracer.argument_binding().get("scale"),
            Some(TracedArg::Single(_))
        ));
    }

    #[test]
    fn test_untraceable_result_names_its_index() {
        let sig = Signature::new([Param::positional("x")]).unwrap();

        // The second result is created outside graph-aware operations, so
        // its identity never reaches the identity map.
        let body = |args: &BoundArgs| -> Vec<Value> {
            vec![args.arg("x").neg(), Value::from(5.0)]
        };

        let mut tracer = Tracer::new();
        let err =
            tracer.trace(&sig, &body, &[Value::from(1.0)], &[]).unwrap_err();

        match err {
            Error::UntraceableResult { index } => assert_eq!(index, 2),
            other => panic!("expected UntraceableResult, got {other:?}"),
        }
    }
}
