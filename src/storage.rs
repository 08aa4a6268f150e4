//! Tile-group table storage.
//!
//! Tables keep their tuples in fixed-capacity tile groups. A tuple is
//! addressed by a [`TupleLocation`] that stays valid for its whole life;
//! slots are never recycled by this layer.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | DataTable         |  <- index maintenance, NOT NULL checks
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | TileGroup 0..n    |  <- atomic slot allocation
//! +-------------------+
//!       /      \
//!      v        v
//! +--------+ +--------+
//! | Tile   | | Tile   |  <- column subsets per TileLayout
//! +--------+ +--------+
//! ```

mod config;
mod error;
mod location;
mod table;
mod tile_group;

pub use config::{DEFAULT_TUPLES_PER_TILE_GROUP, StorageConfig};
pub use error::{ConstraintViolation, StorageError};
pub use location::{SlotId, TileGroupId, TupleLocation};
pub use table::DataTable;
pub use tile_group::{TileGroup, TileLayout};
