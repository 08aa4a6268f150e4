//! Stable tuple addresses.

use std::fmt;

/// Tile group identifier; equal to the group's position in its table.
pub type TileGroupId = u32;

/// Slot offset within a tile group.
pub type SlotId = u32;

/// Physical address of a tuple version.
///
/// Once handed out by [`TileGroup::allocate`](super::TileGroup::allocate) a
/// location is never reassigned to another tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleLocation {
    /// Tile group containing the tuple.
    pub tile_group_id: TileGroupId,
    /// Slot within the tile group.
    pub slot: SlotId,
}

impl TupleLocation {
    /// Creates a new tuple location.
    pub const fn new(tile_group_id: TileGroupId, slot: SlotId) -> Self {
        Self {
            tile_group_id,
            slot,
        }
    }
}

impl fmt::Display for TupleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tile_group_id, self.slot)
    }
}
