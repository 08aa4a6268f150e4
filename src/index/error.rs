//! Index-specific errors.

use super::key::IndexKey;

/// Errors returned by [`Index`](super::Index) entry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A unique index already holds the key under another location.
    UniqueViolation { index: String, key: IndexKey },

    /// The key does not have one value per key column.
    KeyArity { expected: usize, found: usize },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::UniqueViolation { index, key } => {
                write!(
                    f,
                    "duplicate key value {} violates unique index \"{}\"",
                    key, index
                )
            }
            IndexError::KeyArity { expected, found } => {
                write!(
                    f,
                    "index key has {} columns, expected {}",
                    found, expected
                )
            }
        }
    }
}

impl std::error::Error for IndexError {}
