//! Unary operations on values.

use crate::graph::Primitive;
use crate::trace::session;
use crate::value::Payload;
use crate::Value;

/// Apply a unary function element-wise to a value.
fn unary_op<F>(input: &Value, op: Primitive, f: F) -> Value
where
    F: Fn(f64) -> f64,
{
    let result = match input.payload() {
        Payload::Int(i) => Value::from(f(*i as f64)),
        Payload::Float(x) => Value::from(f(*x)),
        Payload::Tensor { data, shape } => {
            Value::tensor(data.iter().map(|&x| f(x)).collect(), shape.clone())
        }
        Payload::List(_) => {
            panic!("container values do not support numeric operations")
        }
    };

    session::record_unary(&result, op, input);
    result
}

impl Value {
    /// Negate the value element-wise.
    ///
    /// # Examples
    ///
    /// ```
    /// # use symtrace::Value;
    /// let a = Value::from(vec![1.0, -2.0, 3.0]);
    /// assert_eq!(a.neg(), Value::from(vec![-1.0, 2.0, -3.0]));
    /// ```
    pub fn neg(&self) -> Value {
        unary_op(self, Primitive::Neg, |x| -x)
    }

    /// Natural exponential (e^x) element-wise.
    pub fn exp(&self) -> Value {
        unary_op(self, Primitive::Exp, f64::exp)
    }

    /// Natural logarithm element-wise.
    pub fn log(&self) -> Value {
        unary_op(self, Primitive::Log, f64::ln)
    }

    /// Square root element-wise.
    pub fn sqrt(&self) -> Value {
        unary_op(self, Primitive::Sqrt, f64::sqrt)
    }

    /// Sine element-wise.
    pub fn sin(&self) -> Value {
        unary_op(self, Primitive::Sin, f64::sin)
    }

    /// Cosine element-wise.
    pub fn cos(&self) -> Value {
        unary_op(self, Primitive::Cos, f64::cos)
    }

    /// Hyperbolic tangent element-wise.
    pub fn tanh(&self) -> Value {
        unary_op(self, Primitive::Tanh, f64::tanh)
    }

    /// A value of ones with this value's shape.
    pub fn ones_like(&self) -> Value {
        unary_op(self, Primitive::OnesLike, |_| 1.0)
    }

    /// A value of zeros with this value's shape.
    pub fn zeros_like(&self) -> Value {
        unary_op(self, Primitive::ZerosLike, |_| 0.0)
    }
}
