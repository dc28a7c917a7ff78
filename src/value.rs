//! Runtime values tracked by identity during tracing.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Global counter for generating unique value IDs
static VALUE_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Generate a unique ID for a value
fn next_value_id() -> usize {
    VALUE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Lower bound of the integer interning range.
pub const INTERN_MIN: i64 = -5;
/// Upper bound of the integer interning range.
pub const INTERN_MAX: i64 = 256;

/// The numeric (or container) payload carried by a [`Value`].
#[derive(Debug, Clone)]
pub enum Payload {
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Dense n-dimensional array of `f64` elements.
    Tensor {
        /// Flat element storage, row-major.
        data: Vec<f64>,
        /// Extent of each dimension.
        shape: Vec<usize>,
    },
    /// Ordered container of values. Constructible, never graph-trackable.
    List(Vec<Value>),
}

#[derive(Debug)]
struct Inner {
    id: usize,
    payload: Payload,
}

/// A runtime value observed during one execution of a traced function.
///
/// `Value` is a cheap handle: cloning shares the payload and, crucially, the
/// identity. Tracing correlates runtime values with graph nodes purely by
/// this identity.
///
/// Integers in `INTERN_MIN..=INTERN_MAX` are interned: every
/// `Value::from(3i64)` in that range is a clone of one process-wide
/// instance, so two logically independent `3`s share an id. The tracer
/// defends against this by boxing such arguments before a trace (see
/// [`Value::boxed`]).
///
/// # Examples
///
/// ```
/// # use symtrace::Value;
/// let a = Value::from(2.0);
/// let b = a.clone();
/// assert_eq!(a.id(), b.id());
/// assert_eq!(a, Value::from(2.0));
/// ```
#[derive(Clone)]
pub struct Value {
    inner: Arc<Inner>,
}

/// Interned instances for the small-integer range.
fn interned() -> &'static Vec<Value> {
    static TABLE: OnceLock<Vec<Value>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (INTERN_MIN..=INTERN_MAX)
            .map(|i| Value::fresh(Payload::Int(i)))
            .collect()
    })
}

impl Value {
    /// Wrap a payload in a value with a fresh identity.
    fn fresh(payload: Payload) -> Self {
        Self { inner: Arc::new(Inner { id: next_value_id(), payload }) }
    }

    /// Create a tensor value from flat data and a shape.
    ///
    /// # Panics
    ///
    /// Panics if the shape size doesn't match the data length.
    ///
    /// # Examples
    ///
    /// ```
    /// # use symtrace::Value;
    /// let t = Value::tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(t.shape(), Some(&[2, 2][..]));
    /// ```
    pub fn tensor(data: Vec<f64>, shape: Vec<usize>) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Data length must match shape size"
        );
        Self::fresh(Payload::Tensor { data, shape })
    }

    /// Create a container value from a sequence of values.
    ///
    /// Containers can be constructed and inspected, but supplying one as a
    /// traced-function argument is rejected during pre-processing.
    pub fn list(values: Vec<Value>) -> Self {
        Self::fresh(Payload::List(values))
    }

    /// Copy a value's payload into a new value with a fresh identity.
    ///
    /// This is the boxing step the tracer applies to small-integer
    /// arguments so interned identities cannot collide on one graph node.
    pub fn boxed(&self) -> Value {
        Self::fresh(self.inner.payload.clone())
    }

    /// The unique identity of this value.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// The payload carried by this value.
    pub fn payload(&self) -> &Payload {
        &self.inner.payload
    }

    /// Whether this value is a container (and so not graph-trackable).
    pub fn is_container(&self) -> bool {
        matches!(self.inner.payload, Payload::List(_))
    }

    /// Whether this value is an integer in the interning range.
    pub fn is_small_int(&self) -> bool {
        matches!(self.inner.payload, Payload::Int(i) if (INTERN_MIN..=INTERN_MAX).contains(&i))
    }

    /// Scalar reading of this value, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.inner.payload {
            Payload::Int(i) => Some(*i as f64),
            Payload::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Flat elements of a tensor value.
    pub fn elements(&self) -> Option<&[f64]> {
        match &self.inner.payload {
            Payload::Tensor { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Shape of a tensor value.
    pub fn shape(&self) -> Option<&[usize]> {
        match &self.inner.payload {
            Payload::Tensor { shape, .. } => Some(shape),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    /// Integers in the interning range return the shared interned instance.
    fn from(i: i64) -> Self {
        if (INTERN_MIN..=INTERN_MAX).contains(&i) {
            interned()[(i - INTERN_MIN) as usize].clone()
        } else {
            Self::fresh(Payload::Int(i))
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::fresh(Payload::Float(x))
    }
}

impl From<Vec<f64>> for Value {
    /// A flat `Vec` becomes a rank-1 tensor.
    fn from(data: Vec<f64>) -> Self {
        let len = data.len();
        Self::tensor(data, vec![len])
    }
}

impl PartialEq for Value {
    /// Payload equality. Identity never participates; ints and floats
    /// cross-compare numerically.
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner.payload, &other.inner.payload) {
            (Payload::List(a), Payload::List(b)) => a == b,
            (
                Payload::Tensor { data: a, shape: sa },
                Payload::Tensor { data: b, shape: sb },
            ) => sa == sb && a == b,
            (Payload::List(_), _) | (_, Payload::List(_)) => false,
            (Payload::Tensor { .. }, _) | (_, Payload::Tensor { .. }) => false,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.payload {
            Payload::Int(i) => write!(f, "Value({i} @ {})", self.inner.id),
            Payload::Float(x) => write!(f, "Value({x} @ {})", self.inner.id),
            Payload::Tensor { data, shape } => {
                write!(f, "Value({data:?} x {shape:?} @ {})", self.inner.id)
            }
            Payload::List(items) => {
                write!(f, "Value([{} items] @ {})", items.len(), self.inner.id)
            }
        }
    }
}
