//! Fixed-capacity tuple arenas.
//!
//! A tile group holds `capacity` tuple slots. Its columns are split into
//! one or more tiles according to a [`TileLayout`]; each tile stores, per
//! slot, the values of its own column subset.
//!
//! ```text
//!             tile 0 (id, name)     tile 1 (age)
//! slot 0   | [1, 'alice']        | [30]        |  Occupied
//! slot 1   | [2, 'bob']          | [41]        |  Deleted
//! slot 2   | (reserved)          | (reserved)  |  Reserved
//! slot 3.. | (empty)             | (empty)     |  Empty   <- next_slot
//! ```
//!
//! Slot lifecycle: `Empty -> Reserved -> Occupied -> Deleted`, or
//! `Reserved -> Deleted` when an insert is abandoned. A reserved slot may
//! already hold its values but stays invisible until
//! [`TileGroup::publish`]. Slots are never recycled here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::error::StorageError;
use super::location::{SlotId, TileGroupId, TupleLocation};
use crate::datum::Value;
use crate::tuple::{Schema, Tuple};

const SLOT_EMPTY: u8 = 0;
const SLOT_RESERVED: u8 = 1;
const SLOT_OCCUPIED: u8 = 2;
const SLOT_DELETED: u8 = 3;

/// How the columns of a schema are split into tiles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TileLayout {
    /// A single tile holding every column.
    #[default]
    Row,
    /// One tile per column.
    Columnar,
    /// Explicit column groups; every column must appear in exactly one group.
    Partitioned(Vec<Vec<usize>>),
}

impl TileLayout {
    /// Resolves the layout into column groups for a schema of `column_count` columns.
    pub fn partition(&self, column_count: usize) -> Result<Vec<Vec<usize>>, StorageError> {
        match self {
            TileLayout::Row => Ok(vec![(0..column_count).collect()]),
            TileLayout::Columnar => Ok((0..column_count).map(|c| vec![c]).collect()),
            TileLayout::Partitioned(groups) => {
                let mut seen = vec![false; column_count];
                for group in groups {
                    if group.is_empty() {
                        return Err(StorageError::InvalidLayout("empty tile".to_string()));
                    }
                    for &column in group {
                        match seen.get_mut(column) {
                            None => {
                                return Err(StorageError::InvalidLayout(format!(
                                    "column {} out of range for {} columns",
                                    column, column_count
                                )));
                            }
                            Some(true) => {
                                return Err(StorageError::InvalidLayout(format!(
                                    "column {} assigned to more than one tile",
                                    column
                                )));
                            }
                            Some(flag) => *flag = true,
                        }
                    }
                }
                if let Some(missing) = seen.iter().position(|s| !s) {
                    return Err(StorageError::InvalidLayout(format!(
                        "column {} not assigned to any tile",
                        missing
                    )));
                }
                Ok(groups.clone())
            }
        }
    }
}

/// Values of one column subset for every slot.
#[derive(Debug)]
struct Tile {
    column_ids: Vec<usize>,
    cells: Box<[RwLock<Vec<Value>>]>,
}

impl Tile {
    fn new(column_ids: Vec<usize>, capacity: usize) -> Self {
        let cells = (0..capacity).map(|_| RwLock::new(Vec::new())).collect();
        Self { column_ids, cells }
    }
}

/// A fixed-capacity arena of tuple slots.
///
/// Slot allocation is a single compare-and-swap on the allocation cursor,
/// so concurrent callers never receive the same slot. Contents become
/// visible only when [`publish`](Self::publish) flips the slot to occupied.
#[derive(Debug)]
pub struct TileGroup {
    id: TileGroupId,
    schema: Arc<Schema>,
    capacity: usize,
    /// Next never-allocated slot. Never exceeds `capacity`.
    next_slot: AtomicUsize,
    states: Box<[AtomicU8]>,
    tiles: Vec<Tile>,
}

impl TileGroup {
    /// Creates an empty tile group.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidLayout`] if `layout` does not partition
    /// the schema columns.
    pub fn new(
        id: TileGroupId,
        schema: Arc<Schema>,
        capacity: usize,
        layout: &TileLayout,
    ) -> Result<Self, StorageError> {
        let tiles = layout
            .partition(schema.column_count())?
            .into_iter()
            .map(|columns| Tile::new(columns, capacity))
            .collect();
        let states = (0..capacity).map(|_| AtomicU8::new(SLOT_EMPTY)).collect();

        Ok(Self {
            id,
            schema,
            capacity,
            next_slot: AtomicUsize::new(0),
            states,
            tiles,
        })
    }

    pub fn id(&self) -> TileGroupId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Returns how many slots have been handed out.
    pub fn allocated_slot_count(&self) -> usize {
        self.next_slot.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.allocated_slot_count() >= self.capacity
    }

    /// Reserves the next free slot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfSpace`] once every slot has been handed out.
    pub fn allocate(&self) -> Result<TupleLocation, StorageError> {
        let slot = self
            .next_slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < self.capacity).then_some(next + 1)
            })
            .map_err(|_| StorageError::OutOfSpace {
                tile_group_id: self.id,
            })?;

        self.states[slot].store(SLOT_RESERVED, Ordering::Release);
        Ok(TupleLocation::new(self.id, slot as SlotId))
    }

    /// Stores `tuple` into a reserved slot. The slot stays reserved.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SlotNotFound`] if the slot is not reserved,
    /// or [`StorageError::SchemaMismatch`] if the tuple arity is wrong.
    pub fn write(&self, slot: SlotId, tuple: &Tuple) -> Result<(), StorageError> {
        let index = slot as usize;
        let location = TupleLocation::new(self.id, slot);
        if self.state(index) != Some(SLOT_RESERVED) {
            return Err(StorageError::SlotNotFound(location));
        }
        if tuple.len() != self.schema.column_count() {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple has {} values, schema has {} columns",
                tuple.len(),
                self.schema.column_count()
            )));
        }

        for tile in &self.tiles {
            let values = tile
                .column_ids
                .iter()
                .map(|&c| tuple.values[c].clone())
                .collect();
            *tile.cells[index].write() = values;
        }
        Ok(())
    }

    /// Makes a written, reserved slot visible to readers.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SlotNotFound`] if the slot is not reserved,
    /// e.g. because it was abandoned in the meantime.
    pub fn publish(&self, slot: SlotId) -> Result<(), StorageError> {
        let location = TupleLocation::new(self.id, slot);
        self.states
            .get(slot as usize)
            .ok_or(StorageError::SlotNotFound(location))?
            .compare_exchange(
                SLOT_RESERVED,
                SLOT_OCCUPIED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| StorageError::SlotNotFound(location))
    }

    /// Returns the tuple in `slot` if it is occupied.
    pub fn get(&self, slot: SlotId) -> Option<Tuple> {
        let index = slot as usize;
        if self.state(index)? != SLOT_OCCUPIED {
            return None;
        }

        let mut values = vec![Value::Null; self.schema.column_count()];
        for tile in &self.tiles {
            let cells = tile.cells[index].read();
            for (offset, &column) in tile.column_ids.iter().enumerate() {
                if let Some(v) = cells.get(offset) {
                    values[column] = v.clone();
                }
            }
        }
        Some(Tuple::new(values))
    }

    /// Marks an occupied or reserved slot as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SlotNotFound`] if the slot was never allocated
    /// or is already deleted.
    pub fn mark_deleted(&self, slot: SlotId) -> Result<(), StorageError> {
        let location = TupleLocation::new(self.id, slot);
        let state = self
            .states
            .get(slot as usize)
            .ok_or(StorageError::SlotNotFound(location))?;
        state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                matches!(s, SLOT_RESERVED | SLOT_OCCUPIED).then_some(SLOT_DELETED)
            })
            .map(|_| ())
            .map_err(|_| StorageError::SlotNotFound(location))
    }

    /// Returns true if `slot` holds a published, non-deleted tuple.
    pub fn is_live(&self, slot: SlotId) -> bool {
        self.state(slot as usize) == Some(SLOT_OCCUPIED)
    }

    /// Returns every live tuple with its location, in slot order.
    pub fn live_tuples(&self) -> Vec<(TupleLocation, Tuple)> {
        (0..self.allocated_slot_count() as SlotId)
            .filter_map(|slot| {
                self.get(slot)
                    .map(|tuple| (TupleLocation::new(self.id, slot), tuple))
            })
            .collect()
    }

    pub fn live_tuple_count(&self) -> usize {
        (0..self.allocated_slot_count() as SlotId)
            .filter(|&slot| self.is_live(slot))
            .count()
    }

    fn state(&self, index: usize) -> Option<u8> {
        self.states.get(index).map(|s| s.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;
    use crate::tuple::Column;
    use std::collections::HashSet;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Column::new("id", Type::Int4).not_null(),
            Column::new("name", Type::Text),
            Column::new("age", Type::Int4),
        ]))
    }

    fn row(id: i32, name: &str, age: i32) -> Tuple {
        Tuple::new(vec![Value::Int32(id), Value::from(name), Value::Int32(age)])
    }

    #[test]
    fn test_allocate_until_full() {
        let group = TileGroup::new(3, schema(), 2, &TileLayout::Row).unwrap();
        assert_eq!(group.allocate().unwrap(), TupleLocation::new(3, 0));
        assert_eq!(group.allocate().unwrap(), TupleLocation::new(3, 1));
        assert!(group.is_full());
        assert_eq!(
            group.allocate().unwrap_err(),
            StorageError::OutOfSpace { tile_group_id: 3 }
        );
        assert_eq!(group.allocated_slot_count(), 2);
    }

    #[test]
    fn test_write_and_get() {
        let group = TileGroup::new(0, schema(), 4, &TileLayout::Row).unwrap();
        let loc = group.allocate().unwrap();

        // Reserved slots are not visible yet.
        assert!(group.get(loc.slot).is_none());

        group.write(loc.slot, &row(1, "alice", 30)).unwrap();
        // Written but unpublished.
        assert!(group.get(loc.slot).is_none());
        assert!(group.live_tuples().is_empty());

        group.publish(loc.slot).unwrap();
        assert_eq!(group.get(loc.slot), Some(row(1, "alice", 30)));
        assert!(group.is_live(loc.slot));
        assert_eq!(group.live_tuple_count(), 1);
    }

    #[test]
    fn test_write_requires_reserved_slot() {
        let group = TileGroup::new(0, schema(), 4, &TileLayout::Row).unwrap();
        assert!(matches!(
            group.write(0, &row(1, "a", 1)),
            Err(StorageError::SlotNotFound(_))
        ));

        let loc = group.allocate().unwrap();
        group.write(loc.slot, &row(1, "a", 1)).unwrap();
        group.publish(loc.slot).unwrap();
        assert!(matches!(
            group.write(loc.slot, &row(2, "b", 2)),
            Err(StorageError::SlotNotFound(_))
        ));
        assert!(group.publish(loc.slot).is_err());
        assert!(group.publish(42).is_err());
    }

    #[test]
    fn test_write_arity_mismatch() {
        let group = TileGroup::new(0, schema(), 4, &TileLayout::Row).unwrap();
        let loc = group.allocate().unwrap();
        let short = Tuple::new(vec![Value::Int32(1)]);
        assert!(matches!(
            group.write(loc.slot, &short),
            Err(StorageError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_columnar_and_partitioned_layouts_round_trip() {
        let layouts = [
            TileLayout::Columnar,
            TileLayout::Partitioned(vec![vec![2, 0], vec![1]]),
        ];
        for layout in layouts {
            let group = TileGroup::new(0, schema(), 4, &layout).unwrap();
            let loc = group.allocate().unwrap();
            group.write(loc.slot, &row(7, "carol", 52)).unwrap();
            group.publish(loc.slot).unwrap();
            assert_eq!(group.get(loc.slot), Some(row(7, "carol", 52)));
        }
        let group = TileGroup::new(0, schema(), 1, &TileLayout::Columnar).unwrap();
        assert_eq!(group.tile_count(), 3);
    }

    #[test]
    fn test_invalid_layouts() {
        let bad = [
            TileLayout::Partitioned(vec![vec![0, 1]]),
            TileLayout::Partitioned(vec![vec![0, 1], vec![1, 2]]),
            TileLayout::Partitioned(vec![vec![0, 1, 2, 3]]),
            TileLayout::Partitioned(vec![vec![0, 1, 2], vec![]]),
        ];
        for layout in bad {
            assert!(matches!(
                TileGroup::new(0, schema(), 1, &layout),
                Err(StorageError::InvalidLayout(_))
            ));
        }
    }

    #[test]
    fn test_mark_deleted() {
        let group = TileGroup::new(0, schema(), 4, &TileLayout::Row).unwrap();
        let written = group.allocate().unwrap();
        group.write(written.slot, &row(1, "a", 1)).unwrap();
        group.publish(written.slot).unwrap();
        let reserved = group.allocate().unwrap();

        group.mark_deleted(written.slot).unwrap();
        group.mark_deleted(reserved.slot).unwrap();
        assert!(group.get(written.slot).is_none());
        assert!(group.mark_deleted(written.slot).is_err());
        assert!(group.mark_deleted(3).is_err());
        assert!(group.mark_deleted(99).is_err());
        assert!(group.live_tuples().is_empty());

        // A deleted reservation can no longer be written or published.
        assert!(group.write(reserved.slot, &row(2, "b", 2)).is_err());
        assert!(group.publish(reserved.slot).is_err());
    }

    #[test]
    fn test_concurrent_allocate_distinct_slots() {
        let group = TileGroup::new(0, schema(), 256, &TileLayout::Row).unwrap();
        let results: Vec<Vec<TupleLocation>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let mut mine = Vec::new();
                        while let Ok(loc) = group.allocate() {
                            mine.push(loc);
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let all: Vec<TupleLocation> = results.into_iter().flatten().collect();
        let distinct: HashSet<TupleLocation> = all.iter().copied().collect();
        assert_eq!(all.len(), 256);
        assert_eq!(distinct.len(), 256);
        assert_eq!(group.allocated_slot_count(), 256);
    }
}
