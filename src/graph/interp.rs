//! Evaluator for symbolic expression graphs.
//!
//! Takes output nodes plus seeded leaf values and evaluates eagerly, with
//! a per-execution memo table keyed by node address.

use crate::graph::{Node, Primitive};
use crate::{Error, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluates expression graphs.
pub struct Evaluator {
    /// Cache of evaluated nodes (node address -> result)
    cache: HashMap<usize, Value>,
}

impl Evaluator {
    /// Create a new evaluator.
    pub fn new() -> Self {
        Self { cache: HashMap::new() }
    }

    /// Evaluate the given outputs with leaf values seeded by node address.
    pub fn execute(
        &mut self,
        outputs: &[Arc<Node>],
        seeds: HashMap<usize, Value>,
    ) -> Result<Vec<Value>> {
        // Fresh memo table per execution
        self.cache = seeds;
        outputs.iter().map(|node| self.eval(node)).collect()
    }

    /// Evaluate a single node recursively.
    fn eval(&mut self, node: &Arc<Node>) -> Result<Value> {
        let addr = Node::addr(node);

        if let Some(result) = self.cache.get(&addr) {
            return Ok(result.clone());
        }

        let result = match node.as_ref() {
            Node::Leaf { source } => {
                return Err(Error::CompilationFailure {
                    reason: format!(
                        "expression depends on an undeclared input (leaf of value {source})"
                    ),
                });
            }

            Node::Constant { value } => value.clone(),

            Node::Unary { op, input } => {
                let input = self.eval(input)?;
                Self::apply_unary(*op, &input)
            }

            Node::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Self::apply_binary(*op, &lhs, &rhs)
            }

            Node::Reduce { op, input } => {
                let input = self.eval(input)?;
                Self::apply_reduce(*op, &input)
            }
        };

        self.cache.insert(addr, result.clone());
        Ok(result)
    }

    /// Evaluate a unary operation.
    fn apply_unary(op: Primitive, input: &Value) -> Value {
        match op {
            Primitive::Neg => input.neg(),
            Primitive::Exp => input.exp(),
            Primitive::Log => input.log(),
            Primitive::Sqrt => input.sqrt(),
            Primitive::Sin => input.sin(),
            Primitive::Cos => input.cos(),
            Primitive::Tanh => input.tanh(),
            Primitive::OnesLike => input.ones_like(),
            Primitive::ZerosLike => input.zeros_like(),
            _ => panic!("unsupported unary operation: {op:?}"),
        }
    }

    /// Evaluate a binary operation.
    fn apply_binary(op: Primitive, lhs: &Value, rhs: &Value) -> Value {
        match op {
            Primitive::Add => lhs.add(rhs),
            Primitive::Sub => lhs.sub(rhs),
            Primitive::Mul => lhs.mul(rhs),
            Primitive::Div => lhs.div(rhs),
            Primitive::Pow => lhs.pow(rhs),
            _ => panic!("unsupported binary operation: {op:?}"),
        }
    }

    /// Evaluate a reduction operation.
    fn apply_reduce(op: Primitive, input: &Value) -> Value {
        match op {
            Primitive::SumAll => input.sum(),
            _ => panic!("unsupported reduction operation: {op:?}"),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
