//! Table storage configuration.

use super::error::StorageError;
use super::tile_group::TileLayout;

/// Default number of tuple slots per tile group.
pub const DEFAULT_TUPLES_PER_TILE_GROUP: usize = 1000;

/// Per-table storage settings.
///
/// # Example
///
/// ```
/// use tessera::storage::{StorageConfig, TileLayout};
///
/// let config = StorageConfig::default()
///     .with_tuples_per_tile_group(64)
///     .with_max_tile_groups(4)
///     .with_layout(TileLayout::Columnar);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Slot capacity of every tile group.
    pub tuples_per_tile_group: usize,
    /// Upper bound on tile groups per table. `None` means unbounded.
    ///
    /// Reaching the bound makes inserts fail with
    /// [`StorageError::OutOfSpace`], standing in for exhausted backing storage.
    pub max_tile_groups: Option<usize>,
    /// How columns are split into tiles inside each tile group.
    pub layout: TileLayout,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tuples_per_tile_group: DEFAULT_TUPLES_PER_TILE_GROUP,
            max_tile_groups: None,
            layout: TileLayout::Row,
        }
    }
}

impl StorageConfig {
    pub fn with_tuples_per_tile_group(mut self, tuples: usize) -> Self {
        self.tuples_per_tile_group = tuples;
        self
    }

    pub fn with_max_tile_groups(mut self, max: usize) -> Self {
        self.max_tile_groups = Some(max);
        self
    }

    pub fn with_layout(mut self, layout: TileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Checks numeric limits. Layout validity depends on the schema and is
    /// checked when a tile group is built.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.tuples_per_tile_group == 0 {
            return Err(StorageError::InvalidConfig(
                "tuples_per_tile_group must be positive".to_string(),
            ));
        }
        if u32::try_from(self.tuples_per_tile_group).is_err() {
            return Err(StorageError::InvalidConfig(format!(
                "tuples_per_tile_group {} exceeds slot id range",
                self.tuples_per_tile_group
            )));
        }
        if self.max_tile_groups == Some(0) {
            return Err(StorageError::InvalidConfig(
                "max_tile_groups must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.tuples_per_tile_group, DEFAULT_TUPLES_PER_TILE_GROUP);
        assert_eq!(config.max_tile_groups, None);
        assert_eq!(config.layout, TileLayout::Row);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = StorageConfig::default().with_tuples_per_tile_group(0);
        assert!(matches!(
            config.validate(),
            Err(StorageError::InvalidConfig(_))
        ));

        let config = StorageConfig::default().with_max_tile_groups(0);
        assert!(config.validate().is_err());
    }
}
