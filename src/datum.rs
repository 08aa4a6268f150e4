//! Database data types and values.
//!
//! [`Type`] names a column type and [`Value`] is a single typed column value.
//!
//! `Value` carries two notions of comparison:
//!
//! - A **total order** ([`Ord`]) used for index keys. NULL sorts first, then
//!   booleans, then all numerics (compared across widths), then text.
//! - A **SQL comparison** ([`Value::sql_cmp`]) used by predicate evaluation,
//!   which yields `None` when either side is NULL or the types are not
//!   comparable.

use std::cmp::Ordering;
use std::fmt;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean type.
    Bool,
    /// 2-byte integer.
    Int2,
    /// 4-byte integer.
    Int4,
    /// 8-byte integer.
    Int8,
    /// Double-precision floating-point.
    Float8,
    /// Variable-length string.
    Text,
}

impl Type {
    /// Returns the SQL display name for this type (e.g., `"BOOLEAN"`, `"INTEGER"`).
    pub const fn display_name(self) -> &'static str {
        match self {
            Type::Bool => "BOOLEAN",
            Type::Int2 => "SMALLINT",
            Type::Int4 => "INTEGER",
            Type::Int8 => "BIGINT",
            Type::Float8 => "DOUBLE PRECISION",
            Type::Text => "TEXT",
        }
    }

    /// Returns true if `value` can be stored in a column of this type.
    ///
    /// NULL is accepted by every type; nullability is a schema concern.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Type::Bool, Value::Boolean(_))
                | (Type::Int2, Value::Int16(_))
                | (Type::Int4, Value::Int32(_))
                | (Type::Int8, Value::Int64(_))
                | (Type::Float8, Value::Float64(_))
                | (Type::Text, Value::Text(_))
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A typed database value.
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL NULL (type is unknown/any).
    Null,
    /// Boolean (true/false).
    Boolean(bool),
    /// 16-bit signed integer (SMALLINT).
    Int16(i16),
    /// 32-bit signed integer (INTEGER).
    Int32(i32),
    /// 64-bit signed integer (BIGINT).
    Int64(i64),
    /// 64-bit floating point (DOUBLE PRECISION).
    Float64(f64),
    /// Variable-length text (TEXT, VARCHAR).
    Text(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type of this value, or `None` for NULL.
    pub fn data_type(&self) -> Option<Type> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(Type::Bool),
            Value::Int16(_) => Some(Type::Int2),
            Value::Int32(_) => Some(Type::Int4),
            Value::Int64(_) => Some(Type::Int8),
            Value::Float64(_) => Some(Type::Float8),
            Value::Text(_) => Some(Type::Text),
        }
    }

    /// Returns the value widened to `i64` for integer variants.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(n) => Some(i64::from(*n)),
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as `f64` for any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(n) => Some(*n),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Compares two values with SQL semantics.
    ///
    /// Returns `None` if either side is NULL or the values belong to
    /// incomparable type classes (e.g. text vs. integer).
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.rank() != other.rank() {
            return None;
        }
        Some(self.cmp(other))
    }

    /// Sort rank of the type class, used by the total order.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ if self.rank() == 2 && other.rank() == 2 => {
                match (self.as_i64(), other.as_i64()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    // At least one side is a float. -0.0 equals 0.0; NaN
                    // falls back to the IEEE total order.
                    _ => {
                        let a = self.as_f64().unwrap_or(f64::NAN);
                        let b = other.as_f64().unwrap_or(f64::NAN);
                        a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
                    }
                }
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int16(n) => write!(f, "{}", n),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "{}", n),
            Value::Float64(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int16(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float64(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
