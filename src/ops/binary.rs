//! Binary operations on values.

use crate::graph::Primitive;
use crate::trace::session;
use crate::value::Payload;
use crate::Value;

/// Apply a binary function element-wise to two values.
///
/// Scalars broadcast against tensors; tensor operands must agree on shape.
fn binary_op<F>(lhs: &Value, rhs: &Value, op: Primitive, f: F) -> Value
where
    F: Fn(f64, f64) -> f64,
{
    let result = match (lhs.payload(), rhs.payload()) {
        (Payload::List(_), _) | (_, Payload::List(_)) => {
            panic!("container values do not support numeric operations")
        }
        (
            Payload::Tensor { data: a, shape: sa },
            Payload::Tensor { data: b, shape: sb },
        ) => {
            assert_eq!(sa, sb, "tensor operands must have the same shape");
            Value::tensor(
                a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect(),
                sa.clone(),
            )
        }
        (Payload::Tensor { data, shape }, _) => {
            let y = rhs.as_f64().expect("scalar operand");
            Value::tensor(data.iter().map(|&x| f(x, y)).collect(), shape.clone())
        }
        (_, Payload::Tensor { data, shape }) => {
            let x = lhs.as_f64().expect("scalar operand");
            Value::tensor(data.iter().map(|&y| f(x, y)).collect(), shape.clone())
        }
        _ => {
            let x = lhs.as_f64().expect("scalar operand");
            let y = rhs.as_f64().expect("scalar operand");
            Value::from(f(x, y))
        }
    };

    session::record_binary(&result, op, lhs, rhs);
    result
}

impl Value {
    /// Add two values element-wise.
    ///
    /// # Examples
    ///
    /// ```
    /// # use symtrace::Value;
    /// let a = Value::from(vec![1.0, 2.0]);
    /// let b = Value::from(vec![3.0, 4.0]);
    /// assert_eq!(a.add(&b), Value::from(vec![4.0, 6.0]));
    /// ```
    pub fn add(&self, other: &Value) -> Value {
        binary_op(self, other, Primitive::Add, |x, y| x + y)
    }

    /// Subtract two values element-wise.
    pub fn sub(&self, other: &Value) -> Value {
        binary_op(self, other, Primitive::Sub, |x, y| x - y)
    }

    /// Multiply two values element-wise.
    pub fn mul(&self, other: &Value) -> Value {
        binary_op(self, other, Primitive::Mul, |x, y| x * y)
    }

    /// Divide two values element-wise.
    pub fn div(&self, other: &Value) -> Value {
        binary_op(self, other, Primitive::Div, |x, y| x / y)
    }

    /// Raise to a power element-wise.
    pub fn pow(&self, other: &Value) -> Value {
        binary_op(self, other, Primitive::Pow, f64::powf)
    }
}
