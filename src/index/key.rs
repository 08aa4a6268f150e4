//! Index keys and key comparison operators.

use std::cmp::Ordering;
use std::fmt;

use crate::datum::Value;
use crate::tuple::Tuple;

/// A key tuple: the values of the indexed columns, in key order.
///
/// Keys order lexicographically, so a one-column prefix `[v]` sorts before
/// every longer key starting with `v`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(Vec<Value>);

impl IndexKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Projects `tuple` onto `key_columns`.
    pub fn from_tuple(tuple: &Tuple, key_columns: &[usize]) -> Self {
        Self(tuple.project(key_columns).values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Returns the value at key position `position`.
    pub fn value(&self, position: usize) -> Option<&Value> {
        self.0.get(position)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if any key column is NULL.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Comparison operator usable against an index key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `=`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
}

impl CompareOp {
    /// Returns true if `lhs.cmp(rhs) == ord` satisfies `lhs <op> rhs`.
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Gt => ord == Ordering::Greater,
        }
    }

    /// Returns the SQL symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "=",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
