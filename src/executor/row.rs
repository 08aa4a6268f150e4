//! Row type produced by executor nodes.

use crate::datum::Value;
use crate::storage::TupleLocation;
use crate::tuple::Tuple;

/// A single row produced by the executor.
///
/// Rows read from a table carry the [`TupleLocation`] they came from.
/// Computed rows (from projections) keep the location of their input row,
/// since every projection here sits over exactly one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Physical location in the table (if applicable).
    pub location: Option<TupleLocation>,
    /// The column values.
    pub values: Vec<Value>,
}

impl Row {
    /// Creates a row read from a table slot.
    pub fn from_table(location: TupleLocation, values: Vec<Value>) -> Self {
        Self {
            location: Some(location),
            values,
        }
    }

    /// Returns the values as a tuple for expression evaluation.
    pub fn to_tuple(&self) -> Tuple {
        Tuple::new(self.values.clone())
    }
}
