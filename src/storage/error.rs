//! Storage layer errors.

use crate::catalog::Oid;
use crate::index::IndexError;

use super::location::{TileGroupId, TupleLocation};

/// A constraint rejected an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// NULL in a NOT NULL column.
    NotNull { column: String },
    /// Conflict in a unique index.
    Unique(IndexError),
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintViolation::NotNull { column } => {
                write!(
                    f,
                    "null value in column \"{}\" violates not-null constraint",
                    column
                )
            }
            ConstraintViolation::Unique(e) => write!(f, "{}", e),
        }
    }
}

/// Storage layer errors.
///
/// Every insert failure leaves the table in a state equivalent to before
/// the insert: no index entry survives and the slot, if any, is dead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The tile group is full, or the table reached its tile group limit.
    OutOfSpace {
        /// Tail tile group at the time of failure.
        tile_group_id: TileGroupId,
    },

    /// NOT NULL or unique constraint violation.
    ConstraintViolation(ConstraintViolation),

    /// Tuple arity or value types do not match the table schema.
    SchemaMismatch(String),

    /// Slot is not allocated, or is not in the state the operation requires.
    SlotNotFound(TupleLocation),

    /// Tile layout does not partition the schema columns.
    InvalidLayout(String),

    /// Invalid storage configuration.
    InvalidConfig(String),

    /// Index definition does not fit the table.
    InvalidIndex(String),

    /// An index with the same oid is already registered.
    IndexAlreadyExists(Oid),

    /// No index with this oid is registered on the table.
    IndexNotFound(Oid),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::OutOfSpace { tile_group_id } => {
                write!(f, "out of space in tile group {}", tile_group_id)
            }
            StorageError::ConstraintViolation(v) => write!(f, "{}", v),
            StorageError::SchemaMismatch(msg) => write!(f, "schema mismatch: {}", msg),
            StorageError::SlotNotFound(location) => {
                write!(f, "slot {} not found or not live", location)
            }
            StorageError::InvalidLayout(msg) => write!(f, "invalid tile layout: {}", msg),
            StorageError::InvalidConfig(msg) => write!(f, "invalid storage config: {}", msg),
            StorageError::InvalidIndex(msg) => write!(f, "invalid index: {}", msg),
            StorageError::IndexAlreadyExists(oid) => {
                write!(f, "index {} already exists", oid)
            }
            StorageError::IndexNotFound(oid) => write!(f, "index {} not found", oid),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::ConstraintViolation(ConstraintViolation::Unique(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<ConstraintViolation> for StorageError {
    fn from(v: ConstraintViolation) -> Self {
        StorageError::ConstraintViolation(v)
    }
}

impl From<IndexError> for StorageError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::UniqueViolation { .. } => {
                StorageError::ConstraintViolation(ConstraintViolation::Unique(e))
            }
            IndexError::KeyArity { .. } => StorageError::InvalidIndex(e.to_string()),
        }
    }
}
