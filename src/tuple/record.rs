//! Tuple (row) representation.

use std::fmt;

use crate::datum::Value;

/// A tuple consisting of column values in schema order.
///
/// # Example
///
/// ```
/// use tessera::datum::Value;
/// use tessera::tuple::Tuple;
///
/// let tuple = Tuple::new(vec![Value::Int32(42), Value::from("hello"), Value::Null]);
/// assert_eq!(tuple.len(), 3);
/// assert_eq!(tuple.project(&[1, 0]).values, vec![Value::from("hello"), Value::Int32(42)]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    /// Column values in order.
    pub values: Vec<Value>,
}

impl Tuple {
    /// Creates a new tuple with the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `column_id`, if any.
    pub fn value(&self, column_id: usize) -> Option<&Value> {
        self.values.get(column_id)
    }

    /// Returns a new tuple holding the given columns in the given order.
    ///
    /// Out-of-range column ids produce NULL.
    pub fn project(&self, column_ids: &[usize]) -> Tuple {
        Tuple::new(
            column_ids
                .iter()
                .map(|&id| self.values.get(id).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::new(values)
    }
}
