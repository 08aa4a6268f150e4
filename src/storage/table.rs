//! Tables built from tile groups plus secondary indexes.
//!
//! A [`DataTable`] is a vertical stack of tile groups:
//!
//! ```text
//! <tile group 0>   full
//! <tile group 1>   full
//! <tile group n>   tail, receives new inserts
//! ```
//!
//! The table also owns the order in which its indexes are maintained.
//! Inserts update indexes in declaration order; if one fails, the ones
//! already updated are undone in reverse order and the slot is marked dead
//! before the error is returned.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::config::StorageConfig;
use super::error::{ConstraintViolation, StorageError};
use super::location::{TileGroupId, TupleLocation};
use super::tile_group::TileGroup;
use crate::catalog::Oid;
use crate::index::{Index, IndexError, IndexKey};
use crate::tuple::{Schema, Tuple};

/// Index insertion stopped part-way through the table's index list.
///
/// Never leaves the table: [`DataTable::insert_in_indexes`] resolves it by
/// undoing the first `inserted` indexes before reporting `cause`.
struct PartialInsertRollback {
    inserted: usize,
    cause: IndexError,
}

/// A table: ordered tile groups and the indexes declared on it.
#[derive(Debug)]
pub struct DataTable {
    database_oid: Oid,
    oid: Oid,
    name: String,
    schema: Arc<Schema>,
    config: StorageConfig,
    tile_groups: RwLock<Vec<Arc<TileGroup>>>,
    indexes: RwLock<Vec<Arc<dyn Index>>>,
    /// Indexes registered on a non-empty table and not yet backfilled.
    pending_backfill: RwLock<HashSet<Oid>>,
    /// Shared by inserts and deletes, exclusive for index registration and backfill.
    maintenance: RwLock<()>,
}

impl DataTable {
    /// Creates an empty table with its first tile group.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] or [`StorageError::InvalidLayout`]
    /// if the configuration does not fit the schema.
    pub fn new(
        database_oid: Oid,
        oid: Oid,
        name: impl Into<String>,
        schema: Schema,
        config: StorageConfig,
    ) -> Result<Self, StorageError> {
        config.validate()?;
        let schema = Arc::new(schema);
        let first = TileGroup::new(
            0,
            schema.clone(),
            config.tuples_per_tile_group,
            &config.layout,
        )?;

        Ok(Self {
            database_oid,
            oid,
            name: name.into(),
            schema,
            config,
            tile_groups: RwLock::new(vec![Arc::new(first)]),
            indexes: RwLock::new(Vec::new()),
            pending_backfill: RwLock::new(HashSet::new()),
            maintenance: RwLock::new(()),
        })
    }

    pub fn database_oid(&self) -> Oid {
        self.database_oid
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    //===------------------------------------------------------------------===//
    // Tuples
    //===------------------------------------------------------------------===//

    /// Inserts a tuple and indexes it in every declared index.
    ///
    /// # Errors
    ///
    /// - [`StorageError::SchemaMismatch`] for wrong arity or value types
    /// - [`StorageError::ConstraintViolation`] for NOT NULL (checked before a
    ///   slot is allocated) or unique conflicts (after which the slot is dead
    ///   and no index keeps an entry)
    /// - [`StorageError::OutOfSpace`] when the tile group limit is reached
    pub fn insert_tuple(&self, tuple: &Tuple) -> Result<TupleLocation, StorageError> {
        self.check_schema(tuple)?;
        if let Some(column) = self.first_null_violation(tuple) {
            return Err(ConstraintViolation::NotNull { column }.into());
        }

        let _maintenance = self.maintenance.read();
        let (tile_group, location) = self.allocate_slot()?;

        if let Err(e) = tile_group.write(location.slot, tuple) {
            self.abandon_slot(&tile_group, location);
            return Err(e);
        }
        if let Err(e) = self.insert_in_indexes(tuple, location) {
            self.abandon_slot(&tile_group, location);
            return Err(e);
        }
        // Only a fully indexed tuple becomes visible to scans and deletes.
        if let Err(e) = tile_group.publish(location.slot) {
            self.delete_in_indexes(tuple, location);
            return Err(e);
        }

        debug!(table = %self.name, %location, "inserted tuple");
        Ok(location)
    }

    /// Logically deletes the tuple at `location` and removes its index entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SlotNotFound`] if no live tuple is stored there.
    pub fn delete_tuple(&self, location: TupleLocation) -> Result<Tuple, StorageError> {
        let _maintenance = self.maintenance.read();
        let tile_group = self
            .tile_group(location.tile_group_id)
            .ok_or(StorageError::SlotNotFound(location))?;
        let tuple = tile_group
            .get(location.slot)
            .ok_or(StorageError::SlotNotFound(location))?;
        tile_group.mark_deleted(location.slot)?;

        self.delete_in_indexes(&tuple, location);
        debug!(table = %self.name, %location, "deleted tuple");
        Ok(tuple)
    }

    /// Returns the live tuple at `location`.
    pub fn get_tuple(&self, location: TupleLocation) -> Option<Tuple> {
        self.tile_group(location.tile_group_id)?.get(location.slot)
    }

    /// Returns every live tuple, ordered by location.
    pub fn live_tuples(&self) -> Vec<(TupleLocation, Tuple)> {
        let groups = self.tile_groups.read().clone();
        groups.iter().flat_map(|g| g.live_tuples()).collect()
    }

    /// Returns the number of live tuples.
    pub fn tuple_count(&self) -> usize {
        self.tile_groups
            .read()
            .iter()
            .map(|g| g.live_tuple_count())
            .sum()
    }

    /// Returns true if no NOT NULL column of `tuple` holds NULL.
    pub fn check_nulls(&self, tuple: &Tuple) -> bool {
        self.first_null_violation(tuple).is_none()
    }

    fn first_null_violation(&self, tuple: &Tuple) -> Option<String> {
        self.schema
            .not_null_columns()
            .find(|&c| tuple.value(c).is_none_or(|v| v.is_null()))
            .and_then(|c| self.schema.column(c))
            .map(|c| c.name.clone())
    }

    fn check_schema(&self, tuple: &Tuple) -> Result<(), StorageError> {
        if tuple.len() != self.schema.column_count() {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple has {} values, table \"{}\" has {} columns",
                tuple.len(),
                self.name,
                self.schema.column_count()
            )));
        }
        for (column, value) in self.schema.columns().iter().zip(&tuple.values) {
            if !column.ty.accepts(value) {
                return Err(StorageError::SchemaMismatch(format!(
                    "column \"{}\" is {}, got {}",
                    column.name, column.ty, value
                )));
            }
        }
        Ok(())
    }

    fn abandon_slot(&self, tile_group: &TileGroup, location: TupleLocation) {
        if let Err(e) = tile_group.mark_deleted(location.slot) {
            warn!(table = %self.name, %location, error = %e, "failed to release slot");
        }
    }

    //===------------------------------------------------------------------===//
    // Tile groups
    //===------------------------------------------------------------------===//

    pub fn tile_group_count(&self) -> usize {
        self.tile_groups.read().len()
    }

    pub fn tile_group(&self, id: TileGroupId) -> Option<Arc<TileGroup>> {
        self.tile_groups.read().get(id as usize).cloned()
    }

    /// Reserves a slot in the tail tile group, appending groups as needed.
    fn allocate_slot(&self) -> Result<(Arc<TileGroup>, TupleLocation), StorageError> {
        loop {
            let tail = self.tile_groups.read().last().cloned();
            let Some(tail) = tail else {
                self.append_tile_group(None)?;
                continue;
            };
            match tail.allocate() {
                Ok(location) => return Ok((tail, location)),
                Err(StorageError::OutOfSpace { tile_group_id }) => {
                    self.append_tile_group(Some(tile_group_id))?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Appends a tile group if the tail is still the one observed as `full`.
    ///
    /// Concurrent callers that saw the same full tail race for the write
    /// lock; the first appends, the rest see a new tail and return.
    fn append_tile_group(&self, full: Option<TileGroupId>) -> Result<(), StorageError> {
        let mut groups = self.tile_groups.write();
        if groups.last().map(|g| g.id()) != full {
            return Ok(());
        }

        let out_of_space = StorageError::OutOfSpace {
            tile_group_id: full.unwrap_or_default(),
        };
        if self
            .config
            .max_tile_groups
            .is_some_and(|max| groups.len() >= max)
        {
            warn!(table = %self.name, tile_groups = groups.len(), "tile group limit reached");
            return Err(out_of_space);
        }
        let id = TileGroupId::try_from(groups.len()).map_err(|_| out_of_space)?;

        let group = TileGroup::new(
            id,
            self.schema.clone(),
            self.config.tuples_per_tile_group,
            &self.config.layout,
        )?;
        groups.push(Arc::new(group));
        debug!(table = %self.name, tile_group_id = id, "appended tile group");
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Indexes
    //===------------------------------------------------------------------===//

    /// Registers an index. Existing tuples are NOT indexed.
    ///
    /// When the table already holds tuples the index is recorded as awaiting
    /// backfill and must not be used for scans until
    /// [`backfill_index`](Self::backfill_index) has run.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidIndex`] for key columns outside the
    /// schema and [`StorageError::IndexAlreadyExists`] for a duplicate oid.
    pub fn add_index(&self, index: Arc<dyn Index>) -> Result<(), StorageError> {
        let meta = index.metadata();
        if meta.key_columns.is_empty() {
            return Err(StorageError::InvalidIndex(format!(
                "index \"{}\" has no key columns",
                meta.name
            )));
        }
        if let Some(column) = meta
            .key_columns
            .iter()
            .find(|&&c| c >= self.schema.column_count())
        {
            return Err(StorageError::InvalidIndex(format!(
                "index \"{}\" key column {} is not in table \"{}\"",
                meta.name, column, self.name
            )));
        }

        let _maintenance = self.maintenance.write();
        let mut indexes = self.indexes.write();
        if indexes.iter().any(|i| i.oid() == meta.oid) {
            return Err(StorageError::IndexAlreadyExists(meta.oid));
        }
        if self.tuple_count() > 0 {
            self.pending_backfill.write().insert(meta.oid);
            warn!(
                table = %self.name,
                index = %meta.name,
                "index added to non-empty table; backfill required before scans"
            );
        }
        info!(table = %self.name, index = %meta.name, oid = meta.oid, "added index");
        indexes.push(index);
        Ok(())
    }

    /// Unregisters an index and returns it.
    pub fn drop_index(&self, oid: Oid) -> Option<Arc<dyn Index>> {
        let _maintenance = self.maintenance.write();
        let mut indexes = self.indexes.write();
        let position = indexes.iter().position(|i| i.oid() == oid)?;
        self.pending_backfill.write().remove(&oid);
        let index = indexes.remove(position);
        info!(table = %self.name, index = %index.name(), "dropped index");
        Some(index)
    }

    /// Indexes every live tuple that `oid` does not hold yet.
    ///
    /// Holds the table maintenance lock exclusively, so no insert or delete
    /// runs concurrently. Returns the number of entries added.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexNotFound`] for an unknown oid, or a
    /// constraint violation if the existing tuples conflict in a unique
    /// index; in that case every entry added by this call is removed again.
    pub fn backfill_index(&self, oid: Oid) -> Result<usize, StorageError> {
        let _maintenance = self.maintenance.write();
        let index = self
            .get_index_with_oid(oid)
            .ok_or(StorageError::IndexNotFound(oid))?;

        let mut added: Vec<(IndexKey, TupleLocation)> = Vec::new();
        for (location, tuple) in self.live_tuples() {
            let key = index.metadata().build_key(&tuple);
            if index.contains_entry(&key, location) {
                continue;
            }
            if let Err(e) = index.insert_entry(&key, location) {
                for (key, location) in added.iter().rev() {
                    index.delete_entry(key, *location);
                }
                warn!(table = %self.name, index = %index.name(), error = %e, "backfill aborted");
                return Err(e.into());
            }
            added.push((key, location));
        }

        self.pending_backfill.write().remove(&oid);
        info!(table = %self.name, index = %index.name(), entries = added.len(), "backfilled index");
        Ok(added.len())
    }

    pub fn index_count(&self) -> usize {
        self.indexes.read().len()
    }

    /// Returns the index at position `offset` in declaration order.
    pub fn get_index(&self, offset: usize) -> Option<Arc<dyn Index>> {
        self.indexes.read().get(offset).cloned()
    }

    pub fn get_index_with_oid(&self, oid: Oid) -> Option<Arc<dyn Index>> {
        self.indexes.read().iter().find(|i| i.oid() == oid).cloned()
    }

    /// Returns all indexes in declaration order.
    pub fn indexes(&self) -> Vec<Arc<dyn Index>> {
        self.indexes.read().clone()
    }

    /// Returns true if `oid` is registered and not awaiting backfill.
    pub fn is_index_ready(&self, oid: Oid) -> bool {
        self.get_index_with_oid(oid).is_some() && !self.pending_backfill.read().contains(&oid)
    }

    /// Inserts `tuple` into every index, reporting the first failure.
    ///
    /// On failure, indexes already updated are rolled back in reverse order
    /// before returning.
    pub fn insert_in_indexes(&self, tuple: &Tuple, location: TupleLocation) -> Result<(), StorageError> {
        let indexes = self.indexes();
        match insert_all(&indexes, tuple, location) {
            Ok(()) => Ok(()),
            Err(partial) => {
                warn!(
                    table = %self.name,
                    %location,
                    index = %indexes[partial.inserted].name(),
                    error = %partial.cause,
                    "index insert failed; rolling back"
                );
                for index in indexes[..partial.inserted].iter().rev() {
                    let key = index.metadata().build_key(tuple);
                    if !index.delete_entry(&key, location) {
                        warn!(index = %index.name(), %location, "rollback found no entry");
                    }
                }
                Err(partial.cause.into())
            }
        }
    }

    /// Like [`insert_in_indexes`](Self::insert_in_indexes) but only reports
    /// whether the tuple ended up fully indexed.
    pub fn try_insert_in_indexes(&self, tuple: &Tuple, location: TupleLocation) -> bool {
        self.insert_in_indexes(tuple, location).is_ok()
    }

    /// Removes `tuple`'s entries from every index.
    ///
    /// A missing entry is logged and skipped.
    pub fn delete_in_indexes(&self, tuple: &Tuple, location: TupleLocation) {
        for index in self.indexes() {
            let key = index.metadata().build_key(tuple);
            if !index.delete_entry(&key, location) {
                warn!(
                    table = %self.name,
                    index = %index.name(),
                    %key,
                    %location,
                    "index entry missing during delete"
                );
            }
        }
    }
}

fn insert_all(
    indexes: &[Arc<dyn Index>],
    tuple: &Tuple,
    location: TupleLocation,
) -> Result<(), PartialInsertRollback> {
    for (inserted, index) in indexes.iter().enumerate() {
        let key = index.metadata().build_key(tuple);
        index
            .insert_entry(&key, location)
            .map_err(|cause| PartialInsertRollback { inserted, cause })?;
    }
    Ok(())
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Table \"{}\" (oid {}, database {})",
            self.name, self.oid, self.database_oid
        )?;
        writeln!(
            f,
            "  tile groups: {} x {} slots, live tuples: {}",
            self.tile_group_count(),
            self.config.tuples_per_tile_group,
            self.tuple_count()
        )?;
        for index in self.indexes() {
            let meta = index.metadata();
            write!(
                f,
                "  index {} \"{}\" on {:?}",
                meta.oid, meta.name, meta.key_columns
            )?;
            if meta.unique {
                write!(f, " unique")?;
            }
            if !self.is_index_ready(meta.oid) {
                write!(f, " (backfill pending)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
