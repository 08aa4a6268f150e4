//! Ordered in-memory index.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use super::error::IndexError;
use super::key::IndexKey;
use super::{Index, IndexEntry, IndexMetadata};
use crate::storage::TupleLocation;

/// B-tree backed index guarded by a single reader-writer lock.
///
/// Locations under one key are kept in insertion order. For unique indexes,
/// keys containing NULL never conflict.
#[derive(Debug)]
pub struct OrderedIndex {
    metadata: IndexMetadata,
    entries: RwLock<BTreeMap<IndexKey, Vec<TupleLocation>>>,
}

impl OrderedIndex {
    /// Creates an empty index.
    pub fn new(metadata: IndexMetadata) -> Self {
        Self {
            metadata,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.entries.read().len()
    }

    fn check_arity(&self, key: &IndexKey) -> Result<(), IndexError> {
        let expected = self.metadata.key_arity();
        if key.len() != expected {
            return Err(IndexError::KeyArity {
                expected,
                found: key.len(),
            });
        }
        Ok(())
    }
}

impl Index for OrderedIndex {
    fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn insert_entry(&self, key: &IndexKey, location: TupleLocation) -> Result<(), IndexError> {
        self.check_arity(key)?;

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key) {
            if existing.contains(&location) {
                return Ok(());
            }
            if self.metadata.unique && !key.has_null() && !existing.is_empty() {
                return Err(IndexError::UniqueViolation {
                    index: self.metadata.name.clone(),
                    key: key.clone(),
                });
            }
        }
        entries.entry(key.clone()).or_default().push(location);
        Ok(())
    }

    fn delete_entry(&self, key: &IndexKey, location: TupleLocation) -> bool {
        let mut entries = self.entries.write();
        let Some(locations) = entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = locations.iter().position(|l| *l == location) else {
            return false;
        };
        locations.remove(pos);
        if locations.is_empty() {
            entries.remove(key);
        }
        true
    }

    fn range_scan(&self, lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> Vec<IndexEntry> {
        if is_empty_range(lower, upper) {
            return Vec::new();
        }
        let entries = self.entries.read();
        entries
            .range((lower.cloned(), upper.cloned()))
            .flat_map(|(key, locations)| {
                locations.iter().map(|&location| IndexEntry {
                    key: key.clone(),
                    location,
                })
            })
            .collect()
    }

    fn entry_count(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }
}

/// Returns true for bounds that select nothing.
///
/// `BTreeMap::range` panics when start > end, or when start == end with
/// both bounds excluded.
fn is_empty_range(lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> bool {
    match (lower, upper) {
        (
            Bound::Included(l) | Bound::Excluded(l),
            Bound::Included(u) | Bound::Excluded(u),
        ) => match l.cmp(u) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => {
                !matches!((lower, upper), (Bound::Included(_), Bound::Included(_)))
            }
            std::cmp::Ordering::Less => false,
        },
        _ => false,
    }
}
