//! Reduction operations on values.

use crate::graph::Primitive;
use crate::trace::session;
use crate::value::Payload;
use crate::Value;

impl Value {
    /// Sum all elements into a scalar.
    ///
    /// # Examples
    ///
    /// ```
    /// # use symtrace::Value;
    /// let t = Value::from(vec![1.0, 2.0, 3.0]);
    /// assert_eq!(t.sum(), Value::from(6.0));
    /// ```
    pub fn sum(&self) -> Value {
        let result = match self.payload() {
            Payload::Int(i) => Value::from(*i as f64),
            Payload::Float(x) => Value::from(*x),
            Payload::Tensor { data, .. } => Value::from(data.iter().sum::<f64>()),
            Payload::List(_) => {
                panic!("container values do not support numeric operations")
            }
        };

        session::record_reduce(&result, Primitive::SumAll, self);
        result
    }
}
