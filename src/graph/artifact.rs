//! Compiled executable artifacts.
//!
//! An artifact is built from declared inputs (optionally named, optionally
//! defaulted), output nodes, and the graph those outputs close over. Each
//! input records which traced node it relabels; invocation seeds those
//! nodes and evaluates the outputs.

use crate::graph::{Evaluator, Node};
use crate::{Error, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One declared input of a compiled artifact.
#[derive(Debug, Clone)]
pub struct InputSpec {
    name: Option<String>,
    default: Option<Value>,
    node: Arc<Node>,
}

impl InputSpec {
    /// A named input relabeling the given traced node.
    pub fn named(name: String, node: Arc<Node>) -> Self {
        Self { name: Some(name), default: None, node }
    }

    /// A named input with a default value.
    pub fn with_default(name: String, default: Option<Value>, node: Arc<Node>) -> Self {
        Self { name: Some(name), default, node }
    }

    /// An unnamed, positional-only input.
    pub fn positional(node: Arc<Node>) -> Self {
        Self { name: None, default: None, node }
    }

    /// Stable name of this input, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Default value threaded through compilation, if any.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// What an artifact invocation yields: the original function's value shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    /// The function produced exactly one value.
    Single(Value),
    /// The function produced a tuple of values (possibly empty).
    Tuple(Vec<Value>),
}

impl ReturnValue {
    /// The single value, if this is a single-valued return.
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            ReturnValue::Single(value) => Some(value),
            ReturnValue::Tuple(_) => None,
        }
    }

    /// Flatten into a vector of values regardless of shape.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            ReturnValue::Single(value) => vec![value],
            ReturnValue::Tuple(values) => values,
        }
    }
}

/// An executable compiled from a traced graph. Immutable once built.
#[derive(Debug)]
pub struct CompiledArtifact {
    inputs: Vec<InputSpec>,
    outputs: Vec<Arc<Node>>,
}

impl CompiledArtifact {
    /// Build an artifact from declared inputs and output nodes.
    ///
    /// Every leaf reachable from the outputs must be covered by a declared
    /// input; declared inputs the outputs never consume are tolerated and
    /// ignored at call time.
    pub fn build(inputs: Vec<InputSpec>, outputs: Vec<Arc<Node>>) -> Result<Self> {
        let declared: Vec<usize> =
            inputs.iter().map(|spec| Node::addr(&spec.node)).collect();
        for leaf in Node::free_leaves(&outputs) {
            if !declared.contains(&Node::addr(&leaf)) {
                return Err(Error::CompilationFailure {
                    reason: "an output depends on a value that is not a declared input"
                        .to_string(),
                });
            }
        }
        Ok(Self { inputs, outputs })
    }

    /// Number of declared inputs.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of declared outputs.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Names of the declared inputs, in declaration order.
    pub fn input_names(&self) -> Vec<Option<&str>> {
        self.inputs.iter().map(|spec| spec.name()).collect()
    }

    /// Invoke the artifact.
    ///
    /// Positional values fill inputs left to right; remaining named inputs
    /// may be filled by keyword; unfilled inputs fall back to their
    /// default. Exactly one declared output is returned as
    /// [`ReturnValue::Single`], any other arity as [`ReturnValue::Tuple`].
    pub fn invoke(
        &self,
        positional: &[Value],
        keywords: &[(&str, Value)],
    ) -> Result<ReturnValue> {
        if positional.len() > self.inputs.len() {
            return Err(Error::BindingFailure {
                reason: format!(
                    "expected at most {} positional value(s), got {}",
                    self.inputs.len(),
                    positional.len()
                ),
            });
        }

        let mut seeds: HashMap<usize, Value> = HashMap::new();
        let mut filled = vec![false; self.inputs.len()];

        for (i, value) in positional.iter().enumerate() {
            seeds.insert(Node::addr(&self.inputs[i].node), value.clone());
            filled[i] = true;
        }

        for (name, value) in keywords {
            let idx = self
                .inputs
                .iter()
                .position(|spec| spec.name() == Some(*name))
                .ok_or_else(|| Error::BindingFailure {
                    reason: format!("unknown input '{name}'"),
                })?;
            if filled[idx] {
                return Err(Error::BindingFailure {
                    reason: format!("input '{name}' supplied more than once"),
                });
            }
            seeds.insert(Node::addr(&self.inputs[idx].node), value.clone());
            filled[idx] = true;
        }

        for (idx, spec) in self.inputs.iter().enumerate() {
            if filled[idx] {
                continue;
            }
            match spec.default() {
                Some(default) => {
                    seeds.insert(Node::addr(&spec.node), default.clone());
                }
                None => {
                    let name = spec
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("#{}", idx + 1));
                    return Err(Error::BindingFailure {
                        reason: format!("missing value for input '{name}'"),
                    });
                }
            }
        }

        let values = Evaluator::new().execute(&self.outputs, seeds)?;
        if values.len() == 1 {
            let mut values = values;
            Ok(ReturnValue::Single(values.pop().expect("one output")))
        } else {
            Ok(ReturnValue::Tuple(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Primitive;

    fn simple_artifact() -> (CompiledArtifact, Arc<Node>, Arc<Node>) {
        let x = Node::leaf(0);
        let y = Node::leaf(1);
        let out = Node::binary(Primitive::Mul, x.clone(), y.clone());
        let artifact = CompiledArtifact::build(
            vec![
                InputSpec::named("x".to_string(), x.clone()),
                InputSpec::with_default(
                    "y".to_string(),
                    Some(Value::from(2.0)),
                    y.clone(),
                ),
            ],
            vec![out],
        )
        .unwrap();
        (artifact, x, y)
    }

    #[test]
    fn test_invoke_positional() {
        let (artifact, _, _) = simple_artifact();
        let result = artifact
            .invoke(&[Value::from(3.0), Value::from(4.0)], &[])
            .unwrap();
        assert_eq!(result, ReturnValue::Single(Value::from(12.0)));
    }

    #[test]
    fn test_invoke_uses_default() {
        let (artifact, _, _) = simple_artifact();
        let result = artifact.invoke(&[Value::from(3.0)], &[]).unwrap();
        assert_eq!(result, ReturnValue::Single(Value::from(6.0)));
    }

    #[test]
    fn test_invoke_by_keyword() {
        let (artifact, _, _) = simple_artifact();
        let result = artifact
            .invoke(&[Value::from(3.0)], &[("y", Value::from(5.0))])
            .unwrap();
        assert_eq!(result, ReturnValue::Single(Value::from(15.0)));
    }

    #[test]
    fn test_invoke_rejects_duplicate_binding() {
        let (artifact, _, _) = simple_artifact();
        let err = artifact
            .invoke(
                &[Value::from(3.0), Value::from(4.0)],
                &[("y", Value::from(5.0))],
            )
            .unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
    }

    #[test]
    fn test_invoke_rejects_missing_input() {
        let (artifact, _, _) = simple_artifact();
        let err = artifact.invoke(&[], &[]).unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
    }

    #[test]
    fn test_unused_input_is_ignored() {
        // The output consumes only x; y is declared but never read.
        let x = Node::leaf(0);
        let y = Node::leaf(1);
        let out = Node::unary(Primitive::Neg, x.clone());
        let artifact = CompiledArtifact::build(
            vec![
                InputSpec::named("x".to_string(), x),
                InputSpec::named("y".to_string(), y),
            ],
            vec![out],
        )
        .unwrap();

        let result = artifact
            .invoke(&[Value::from(3.0), Value::from(99.0)], &[])
            .unwrap();
        assert_eq!(result, ReturnValue::Single(Value::from(-3.0)));
    }

    #[test]
    fn test_build_rejects_undeclared_leaf() {
        let x = Node::leaf(0);
        let y = Node::leaf(1);
        let out = Node::binary(Primitive::Add, x.clone(), y);
        let err = CompiledArtifact::build(
            vec![InputSpec::named("x".to_string(), x)],
            vec![out],
        )
        .unwrap_err();
        assert!(matches!(err, Error::CompilationFailure { .. }));
    }

    #[test]
    fn test_multiple_outputs_return_tuple() {
        let x = Node::leaf(0);
        let neg = Node::unary(Primitive::Neg, x.clone());
        let sq = Node::binary(Primitive::Mul, x.clone(), x.clone());
        let artifact = CompiledArtifact::build(
            vec![InputSpec::named("x".to_string(), x)],
            vec![neg, sq],
        )
        .unwrap();

        let result = artifact.invoke(&[Value::from(3.0)], &[]).unwrap();
        assert_eq!(
            result,
            ReturnValue::Tuple(vec![Value::from(-3.0), Value::from(9.0)])
        );
    }
}
