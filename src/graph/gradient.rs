//! Symbolic reverse-mode differentiation.
//!
//! Builds gradient *expressions*: cotangents are themselves nodes, so the
//! result of differentiation is a graph that can be compiled into its own
//! artifact and invoked many times.

use crate::graph::{Node, Primitive};
use crate::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Gradient nodes of `output` with respect to each node in `wrt`.
///
/// Propagates cotangents from the output toward the leaves in reverse
/// topological order, accumulating fan-in with `Add`. A `wrt` node the
/// output does not depend on yields a `ZerosLike` expression over it.
pub fn gradients(output: &Arc<Node>, wrt: &[Arc<Node>]) -> Vec<Arc<Node>> {
    let order = topological_order(output);
    let mut cotangents: HashMap<usize, Arc<Node>> = HashMap::new();
    cotangents.insert(Node::addr(output), scalar(1.0));

    // Reverse topological order: every consumer of a node is visited
    // before the node itself, so its cotangent is complete when read.
    for node in order.iter().rev() {
        let Some(cot) = cotangents.get(&Node::addr(node)).cloned() else {
            continue;
        };

        match node.as_ref() {
            Node::Leaf { .. } | Node::Constant { .. } => {}

            Node::Unary { op, input } => {
                if let Some(grad) = unary_rule(*op, node, input, &cot) {
                    accumulate(&mut cotangents, input, grad);
                }
            }

            Node::Binary { op, lhs, rhs } => {
                let (grad_lhs, grad_rhs) = binary_rule(*op, node, lhs, rhs, &cot);
                accumulate(&mut cotangents, lhs, grad_lhs);
                accumulate(&mut cotangents, rhs, grad_rhs);
            }

            Node::Reduce { op, input } => {
                let grad = reduce_rule(*op, input, &cot);
                accumulate(&mut cotangents, input, grad);
            }
        }
    }

    wrt.iter()
        .map(|node| {
            cotangents
                .get(&Node::addr(node))
                .cloned()
                .unwrap_or_else(|| Node::unary(Primitive::ZerosLike, node.clone()))
        })
        .collect()
}

/// Post-order over the graph reachable from `root`, deduplicated by node
/// address. Reversing it yields a topological order from root to leaves.
fn topological_order(root: &Arc<Node>) -> Vec<Arc<Node>> {
    fn visit(node: &Arc<Node>, order: &mut Vec<Arc<Node>>, visited: &mut HashSet<usize>) {
        if !visited.insert(Node::addr(node)) {
            return;
        }
        match node.as_ref() {
            Node::Leaf { .. } | Node::Constant { .. } => {}
            Node::Unary { input, .. } | Node::Reduce { input, .. } => {
                visit(input, order, visited);
            }
            Node::Binary { lhs, rhs, .. } => {
                visit(lhs, order, visited);
                visit(rhs, order, visited);
            }
        }
        order.push(node.clone());
    }

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    visit(root, &mut order, &mut visited);
    order
}

/// Add a contribution to a node's cotangent.
fn accumulate(cotangents: &mut HashMap<usize, Arc<Node>>, node: &Arc<Node>, grad: Arc<Node>) {
    let addr = Node::addr(node);
    let combined = match cotangents.remove(&addr) {
        Some(existing) => Node::binary(Primitive::Add, existing, grad),
        None => grad,
    };
    cotangents.insert(addr, combined);
}

fn scalar(x: f64) -> Arc<Node> {
    Node::constant(Value::from(x))
}

/// Cotangent of a unary node's operand. `node` is the operation's own
/// output expression, reused where the derivative is cheapest in terms of
/// it (exp, sqrt, tanh).
fn unary_rule(
    op: Primitive,
    node: &Arc<Node>,
    input: &Arc<Node>,
    cot: &Arc<Node>,
) -> Option<Arc<Node>> {
    let grad = match op {
        Primitive::Neg => Node::unary(Primitive::Neg, cot.clone()),
        Primitive::Exp => Node::binary(Primitive::Mul, cot.clone(), node.clone()),
        Primitive::Log => Node::binary(Primitive::Div, cot.clone(), input.clone()),
        Primitive::Sqrt => Node::binary(
            Primitive::Div,
            cot.clone(),
            Node::binary(Primitive::Mul, scalar(2.0), node.clone()),
        ),
        Primitive::Sin => Node::binary(
            Primitive::Mul,
            cot.clone(),
            Node::unary(Primitive::Cos, input.clone()),
        ),
        Primitive::Cos => Node::unary(
            Primitive::Neg,
            Node::binary(
                Primitive::Mul,
                cot.clone(),
                Node::unary(Primitive::Sin, input.clone()),
            ),
        ),
        Primitive::Tanh => Node::binary(
            Primitive::Mul,
            cot.clone(),
            Node::binary(
                Primitive::Sub,
                scalar(1.0),
                Node::binary(Primitive::Mul, node.clone(), node.clone()),
            ),
        ),
        Primitive::OnesLike | Primitive::ZerosLike => return None,
        other => panic!("unsupported unary operation in gradient: {other:?}"),
    };
    Some(grad)
}

/// Cotangents of a binary node's operands.
fn binary_rule(
    op: Primitive,
    node: &Arc<Node>,
    lhs: &Arc<Node>,
    rhs: &Arc<Node>,
    cot: &Arc<Node>,
) -> (Arc<Node>, Arc<Node>) {
    match op {
        Primitive::Add => (cot.clone(), cot.clone()),
        Primitive::Sub => (cot.clone(), Node::unary(Primitive::Neg, cot.clone())),
        Primitive::Mul => (
            Node::binary(Primitive::Mul, cot.clone(), rhs.clone()),
            Node::binary(Primitive::Mul, cot.clone(), lhs.clone()),
        ),
        Primitive::Div => (
            Node::binary(Primitive::Div, cot.clone(), rhs.clone()),
            // d(l/r)/dr = -(l/r)/r
            Node::unary(
                Primitive::Neg,
                Node::binary(
                    Primitive::Div,
                    Node::binary(Primitive::Mul, cot.clone(), node.clone()),
                    rhs.clone(),
                ),
            ),
        ),
        Primitive::Pow => (
            // d(l^r)/dl = r * l^(r - 1)
            Node::binary(
                Primitive::Mul,
                cot.clone(),
                Node::binary(
                    Primitive::Mul,
                    rhs.clone(),
                    Node::binary(
                        Primitive::Pow,
                        lhs.clone(),
                        Node::binary(Primitive::Sub, rhs.clone(), scalar(1.0)),
                    ),
                ),
            ),
            // d(l^r)/dr = l^r * ln(l)
            Node::binary(
                Primitive::Mul,
                cot.clone(),
                Node::binary(
                    Primitive::Mul,
                    node.clone(),
                    Node::unary(Primitive::Log, lhs.clone()),
                ),
            ),
        ),
        other => panic!("unsupported binary operation in gradient: {other:?}"),
    }
}

/// Cotangent of a reduction node's operand.
fn reduce_rule(op: Primitive, input: &Arc<Node>, cot: &Arc<Node>) -> Arc<Node> {
    match op {
        // Every element contributes once: broadcast the cotangent over
        // the operand's shape.
        Primitive::SumAll => Node::binary(
            Primitive::Mul,
            Node::unary(Primitive::OnesLike, input.clone()),
            cot.clone(),
        ),
        other => panic!("unsupported reduction operation in gradient: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CompiledArtifact, InputSpec, ReturnValue};

    fn eval_single(
        grads: Vec<Arc<Node>>,
        inputs: Vec<Arc<Node>>,
        values: &[Value],
    ) -> Vec<Value> {
        let artifact = CompiledArtifact::build(
            inputs.into_iter().map(InputSpec::positional).collect(),
            grads,
        )
        .unwrap();
        artifact.invoke(values, &[]).unwrap().into_values()
    }

    #[test]
    fn test_gradient_of_square() {
        // d(x*x)/dx = 2x
        let x = Node::leaf(0);
        let square = Node::binary(Primitive::Mul, x.clone(), x.clone());

        let grads = gradients(&square, &[x.clone()]);
        let out = eval_single(grads, vec![x], &[Value::from(3.0)]);
        assert_eq!(out, vec![Value::from(6.0)]);
    }

    #[test]
    fn test_gradient_of_product() {
        // d(x*y)/dx = y, d(x*y)/dy = x
        let x = Node::leaf(0);
        let y = Node::leaf(1);
        let product = Node::binary(Primitive::Mul, x.clone(), y.clone());

        let grads = gradients(&product, &[x.clone(), y.clone()]);
        let out = eval_single(grads, vec![x, y], &[Value::from(2.0), Value::from(3.0)]);
        assert_eq!(out, vec![Value::from(3.0), Value::from(2.0)]);
    }

    #[test]
    fn test_gradient_accumulates_fan_in() {
        // f = x*x + x  =>  f' = 2x + 1
        let x = Node::leaf(0);
        let square = Node::binary(Primitive::Mul, x.clone(), x.clone());
        let f = Node::binary(Primitive::Add, square, x.clone());

        let grads = gradients(&f, &[x.clone()]);
        let out = eval_single(grads, vec![x], &[Value::from(4.0)]);
        assert_eq!(out, vec![Value::from(9.0)]);
    }

    #[test]
    fn test_gradient_through_shared_subexpression() {
        // g = x*x; f = g + g  =>  f' = 4x
        let x = Node::leaf(0);
        let g = Node::binary(Primitive::Mul, x.clone(), x.clone());
        let f = Node::binary(Primitive::Add, g.clone(), g);

        let grads = gradients(&f, &[x.clone()]);
        let out = eval_single(grads, vec![x], &[Value::from(5.0)]);
        assert_eq!(out, vec![Value::from(20.0)]);
    }

    #[test]
    fn test_gradient_of_exp() {
        // d(exp(x))/dx = exp(x)
        let x = Node::leaf(0);
        let f = Node::unary(Primitive::Exp, x.clone());

        let grads = gradients(&f, &[x.clone()]);
        let out = eval_single(grads, vec![x], &[Value::from(0.0)]);
        assert_eq!(out, vec![Value::from(1.0)]);
    }

    #[test]
    fn test_gradient_of_division() {
        // d(x/y)/dx = 1/y, d(x/y)/dy = -x/y^2
        let x = Node::leaf(0);
        let y = Node::leaf(1);
        let f = Node::binary(Primitive::Div, x.clone(), y.clone());

        let grads = gradients(&f, &[x.clone(), y.clone()]);
        let out = eval_single(grads, vec![x, y], &[Value::from(6.0), Value::from(2.0)]);
        assert_eq!(out[0], Value::from(0.5));
        assert_eq!(out[1], Value::from(-1.5));
    }

    #[test]
    fn test_gradient_of_sum_broadcasts() {
        // d(sum(x*x))/dx = 2x, element-wise over the tensor
        let x = Node::leaf(0);
        let square = Node::binary(Primitive::Mul, x.clone(), x.clone());
        let f = Node::reduce(Primitive::SumAll, square);

        let grads = gradients(&f, &[x.clone()]);
        let out = eval_single(grads, vec![x], &[Value::from(vec![1.0, 2.0, 3.0])]);
        assert_eq!(out, vec![Value::from(vec![2.0, 4.0, 6.0])]);
    }

    #[test]
    fn test_disconnected_input_gets_zeros() {
        let x = Node::leaf(0);
        let y = Node::leaf(1);
        let f = Node::binary(Primitive::Mul, x.clone(), x.clone());

        let grads = gradients(&f, &[x.clone(), y.clone()]);
        let out = eval_single(grads, vec![x, y], &[Value::from(3.0), Value::from(7.0)]);
        assert_eq!(out, vec![Value::from(6.0), Value::from(0.0)]);
    }

    #[test]
    fn test_gradient_of_pow() {
        // d(x^3)/dx = 3x^2
        let x = Node::leaf(0);
        let f = Node::binary(Primitive::Pow, x.clone(), Node::constant(Value::from(3.0)));

        let grads = gradients(&f, &[x.clone()]);
        let artifact = CompiledArtifact::build(
            vec![InputSpec::positional(x)],
            grads,
        )
        .unwrap();
        let out = artifact.invoke(&[Value::from(2.0)], &[]).unwrap();
        assert_eq!(out, ReturnValue::Single(Value::from(12.0)));
    }
}
