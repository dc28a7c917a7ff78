//! The instrumented execution engine.
//!
//! A thread-local session shadows every value produced by graph-aware
//! operations during one execution of a target function, keyed by value
//! identity. Each run opens a fresh session; correspondences are never
//! carried across runs.

use crate::graph::{Node, Primitive};
use crate::signature::{BoundArgs, BoundValue};
use crate::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

thread_local! {
    /// Currently installed session (thread-local).
    static ACTIVE: RefCell<Option<Rc<RefCell<TraceSession>>>> = const { RefCell::new(None) };
}

/// One instrumented execution scope.
///
/// Holds the identity map from runtime value id to the graph node that
/// shadows it.
#[derive(Debug)]
pub struct TraceSession {
    /// Mapping from value identity to its shadow node
    nodes: IndexMap<usize, Arc<Node>>,
}

impl TraceSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self { nodes: IndexMap::new() }
    }

    /// Register a leaf node shadowing a bound argument value.
    ///
    /// Re-registering the same identity keeps the first leaf; two
    /// arguments sharing an identity therefore alias on one node, which is
    /// exactly the hazard the tracer's small-integer boxing removes.
    pub fn register_leaf(&mut self, value: &Value) -> Arc<Node> {
        if let Some(node) = self.nodes.get(&value.id()) {
            return node.clone();
        }
        let node = Node::leaf(value.id());
        self.nodes.insert(value.id(), node.clone());
        node
    }

    /// Shadow an operand, capturing unseen values as constants.
    fn shadow_operand(&mut self, value: &Value) -> Arc<Node> {
        if let Some(node) = self.nodes.get(&value.id()) {
            return node.clone();
        }
        let node = Node::constant(value.clone());
        self.nodes.insert(value.id(), node.clone());
        node
    }

    /// Record a unary operation result.
    pub fn record_unary(&mut self, result: &Value, op: Primitive, input: &Value) {
        let input_node = self.shadow_operand(input);
        let node = Node::unary(op, input_node);
        self.nodes.insert(result.id(), node);
    }

    /// Record a binary operation result.
    pub fn record_binary(
        &mut self,
        result: &Value,
        op: Primitive,
        lhs: &Value,
        rhs: &Value,
    ) {
        let lhs_node = self.shadow_operand(lhs);
        let rhs_node = self.shadow_operand(rhs);
        let node = Node::binary(op, lhs_node, rhs_node);
        self.nodes.insert(result.id(), node);
    }

    /// Record a reduction result.
    pub fn record_reduce(&mut self, result: &Value, op: Primitive, input: &Value) {
        let input_node = self.shadow_operand(input);
        let node = Node::reduce(op, input_node);
        self.nodes.insert(result.id(), node);
    }

    /// Consume the session, yielding the identity map.
    pub fn into_identity_map(self) -> IndexMap<usize, Arc<Node>> {
        self.nodes
    }
}

impl Default for TraceSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a session on this thread.
fn enter(session: Rc<RefCell<TraceSession>>) {
    ACTIVE.with(|active| {
        *active.borrow_mut() = Some(session);
    });
}

/// Remove the installed session.
fn exit() {
    ACTIVE.with(|active| {
        *active.borrow_mut() = None;
    });
}

/// Whether a session is currently installed on this thread.
pub fn is_tracing() -> bool {
    ACTIVE.with(|active| active.borrow().is_some())
}

/// Report a unary result to the installed session, if any.
pub(crate) fn record_unary(result: &Value, op: Primitive, input: &Value) {
    ACTIVE.with(|active| {
        if let Some(session) = active.borrow().as_ref() {
            session.borrow_mut().record_unary(result, op, input);
        }
    });
}

/// Report a binary result to the installed session, if any.
pub(crate) fn record_binary(result: &Value, op: Primitive, lhs: &Value, rhs: &Value) {
    ACTIVE.with(|active| {
        if let Some(session) = active.borrow().as_ref() {
            session.borrow_mut().record_binary(result, op, lhs, rhs);
        }
    });
}

/// Report a reduction result to the installed session, if any.
pub(crate) fn record_reduce(result: &Value, op: Primitive, input: &Value) {
    ACTIVE.with(|active| {
        if let Some(session) = active.borrow().as_ref() {
            session.borrow_mut().record_reduce(result, op, input);
        }
    });
}

/// Run a function once under a fresh session.
///
/// Every graph-trackable value in `bound` is registered as a leaf before
/// the body executes, so the function's arguments are shadowed at the call
/// boundary. Container values are skipped, not shadowed. Returns the body's
/// result together with the identity map observed during the run.
pub fn run<F, R>(bound: &BoundArgs, body: F) -> (R, IndexMap<usize, Arc<Node>>)
where
    F: FnOnce(&BoundArgs) -> R,
{
    let session = Rc::new(RefCell::new(TraceSession::new()));

    {
        let mut session = session.borrow_mut();
        for entry in bound.entries().values() {
            match entry {
                BoundValue::One(value) => {
                    if !value.is_container() {
                        session.register_leaf(value);
                    }
                }
                BoundValue::Sequence(values) => {
                    for value in values {
                        if !value.is_container() {
                            session.register_leaf(value);
                        }
                    }
                }
                BoundValue::Bag(bag) => {
                    for value in bag.values() {
                        if !value.is_container() {
                            session.register_leaf(value);
                        }
                    }
                }
            }
        }
    }

    enter(session.clone());
    let result = body(bound);
    exit();

    let session = Rc::try_unwrap(session)
        .expect("trace session still has references")
        .into_inner();

    (result, session.into_identity_map())
}
