//! Secondary index contract.
//!
//! An [`Index`] maps an [`IndexKey`] (the projection of a tuple onto the
//! indexed table columns) to the [`TupleLocation`]s holding that key. The
//! table drives maintenance; the index only guarantees that every single
//! entry operation is atomic from the caller's point of view.
//!
//! [`OrderedIndex`] is the in-memory reference implementation.
//!
//! # Key scans
//!
//! [`Index::scan`] evaluates a conjunction of `key_column <op> value`
//! predicates. The default implementation derives a range on the leading
//! key column, walks it with [`Index::range_scan`], and re-checks every
//! predicate on each entry:
//!
//! ```text
//! k0 >= 10 AND k0 < 20 AND k1 = 'x'
//!   range_scan([10] ..)  -> stop once k0 > 20 -> filter all three
//! ```

mod error;
mod key;
mod ordered;

pub use error::IndexError;
pub use key::{CompareOp, IndexKey};
pub use ordered::OrderedIndex;

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use crate::catalog::Oid;
use crate::datum::Value;
use crate::storage::TupleLocation;
use crate::tuple::Tuple;

/// Static description of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Index identifier, unique within its table.
    pub oid: Oid,
    /// Index name (for logging and EXPLAIN output).
    pub name: String,
    /// Table column ids forming the key, in key order.
    pub key_columns: Vec<usize>,
    /// Whether two live tuples may share a non-NULL key.
    pub unique: bool,
}

impl IndexMetadata {
    /// Creates metadata for a non-unique index.
    pub fn new(oid: Oid, name: impl Into<String>, key_columns: Vec<usize>) -> Self {
        Self {
            oid,
            name: name.into(),
            key_columns,
            unique: false,
        }
    }

    /// Marks the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Returns the number of key columns.
    pub fn key_arity(&self) -> usize {
        self.key_columns.len()
    }

    /// Projects `tuple` onto this index's key columns.
    pub fn build_key(&self, tuple: &Tuple) -> IndexKey {
        IndexKey::from_tuple(tuple, &self.key_columns)
    }
}

/// A single `(key, location)` pair returned by range scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: IndexKey,
    pub location: TupleLocation,
}

/// Contract every secondary index must satisfy.
///
/// Implementations use their own internal locking; each method must either
/// fully succeed or have no effect. Inserting an identical
/// `(key, location)` pair twice is a no-op.
pub trait Index: fmt::Debug + Send + Sync {
    /// Returns the static description of this index.
    fn metadata(&self) -> &IndexMetadata;

    /// Adds `location` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UniqueViolation`] if the index is unique and a
    /// different location already holds the (non-NULL) key, or
    /// [`IndexError::KeyArity`] if the key has the wrong number of columns.
    fn insert_entry(&self, key: &IndexKey, location: TupleLocation) -> Result<(), IndexError>;

    /// Removes `location` from under `key`. Returns false if it was absent.
    fn delete_entry(&self, key: &IndexKey, location: TupleLocation) -> bool;

    /// Returns entries with keys inside the bounds, in key order.
    fn range_scan(&self, lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> Vec<IndexEntry>;

    /// Returns the total number of `(key, location)` entries.
    fn entry_count(&self) -> usize;

    fn oid(&self) -> Oid {
        self.metadata().oid
    }

    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Returns every location stored under exactly `key`.
    fn point_lookup(&self, key: &IndexKey) -> Vec<TupleLocation> {
        self.range_scan(Bound::Included(key), Bound::Included(key))
            .into_iter()
            .map(|e| e.location)
            .collect()
    }

    /// Returns true if `location` is stored under `key`.
    fn contains_entry(&self, key: &IndexKey, location: TupleLocation) -> bool {
        self.point_lookup(key).contains(&location)
    }

    /// Returns locations whose keys satisfy every `key_column_ids[i] ops[i] values[i]`.
    ///
    /// The three slices are parallel. Key column ids are 0-based positions
    /// within the index key. An empty predicate list returns every entry in
    /// key order.
    fn scan(
        &self,
        key_column_ids: &[usize],
        ops: &[CompareOp],
        values: &[Value],
    ) -> Vec<TupleLocation> {
        let (lower, upper) = leading_column_bounds(key_column_ids, ops, values);
        let lower_key = lower.map(|v| IndexKey::new(vec![v.clone()]));
        let lower_bound = lower_key.as_ref().map_or(Bound::Unbounded, Bound::Included);

        self.range_scan(lower_bound, Bound::Unbounded)
            .into_iter()
            .take_while(|entry| match (upper, entry.key.value(0)) {
                (Some(limit), Some(first)) => first.cmp(limit) != Ordering::Greater,
                _ => true,
            })
            .filter(|entry| key_matches(&entry.key, key_column_ids, ops, values))
            .map(|entry| entry.location)
            .collect()
    }
}

/// Returns the tightest lower and upper values constraining key column 0.
///
/// Both bounds are treated as inclusive; exclusivity is enforced by the
/// per-entry re-check.
fn leading_column_bounds<'a>(
    key_column_ids: &[usize],
    ops: &[CompareOp],
    values: &'a [Value],
) -> (Option<&'a Value>, Option<&'a Value>) {
    let mut lower: Option<&Value> = None;
    let mut upper: Option<&Value> = None;

    for ((&column, &op), value) in key_column_ids.iter().zip(ops).zip(values) {
        if column != 0 {
            continue;
        }
        if matches!(op, CompareOp::Eq | CompareOp::Ge | CompareOp::Gt) {
            lower = Some(lower.map_or(value, |l| l.max(value)));
        }
        if matches!(op, CompareOp::Eq | CompareOp::Le | CompareOp::Lt) {
            upper = Some(upper.map_or(value, |u| u.min(value)));
        }
    }

    (lower, upper)
}

/// Checks every predicate against `key` with SQL comparison semantics.
pub(crate) fn key_matches(
    key: &IndexKey,
    key_column_ids: &[usize],
    ops: &[CompareOp],
    values: &[Value],
) -> bool {
    key_column_ids
        .iter()
        .zip(ops)
        .zip(values)
        .all(|((&column, &op), value)| {
            key.value(column)
                .and_then(|k| k.sql_cmp(value))
                .is_some_and(|ord| op.matches(ord))
        })
}
