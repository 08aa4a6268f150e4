//! Table registry.
//!
//! [`Catalog`] is an explicit handle passed to whoever needs table lookups;
//! there is no process-wide instance. The plan builder only depends on the
//! [`TableResolver`] trait, so tests can substitute their own resolver.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::storage::{DataTable, StorageConfig, StorageError};
use crate::tuple::Schema;

/// Object identifier for databases, tables and indexes.
pub type Oid = u32;

/// Resolves tables by `(database_oid, table_oid)`.
pub trait TableResolver {
    fn get_table_with_oid(&self, database_oid: Oid, table_oid: Oid) -> Option<Arc<DataTable>>;
}

/// Errors that can occur during catalog operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A table with the same oid is already registered in the database.
    TableAlreadyExists { database_oid: Oid, table_oid: Oid },

    /// Table construction failed.
    Storage(StorageError),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::TableAlreadyExists {
                database_oid,
                table_oid,
            } => {
                write!(
                    f,
                    "table {} already exists in database {}",
                    table_oid, database_oid
                )
            }
            CatalogError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Storage(e) => Some(e),
            CatalogError::TableAlreadyExists { .. } => None,
        }
    }
}

impl From<StorageError> for CatalogError {
    fn from(e: StorageError) -> Self {
        CatalogError::Storage(e)
    }
}

/// In-memory registry of tables keyed by `(database_oid, table_oid)`.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<HashMap<(Oid, Oid), Arc<DataTable>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers an empty table.
    pub fn create_table(
        &self,
        database_oid: Oid,
        table_oid: Oid,
        name: impl Into<String>,
        schema: Schema,
        config: StorageConfig,
    ) -> Result<Arc<DataTable>, CatalogError> {
        let table = Arc::new(DataTable::new(
            database_oid,
            table_oid,
            name,
            schema,
            config,
        )?);
        self.register_table(table.clone())?;
        Ok(table)
    }

    /// Registers an existing table under its own oids.
    pub fn register_table(&self, table: Arc<DataTable>) -> Result<(), CatalogError> {
        let key = (table.database_oid(), table.oid());
        let mut tables = self.tables.write();
        if tables.contains_key(&key) {
            return Err(CatalogError::TableAlreadyExists {
                database_oid: key.0,
                table_oid: key.1,
            });
        }
        info!(
            database_oid = key.0,
            table_oid = key.1,
            table = %table.name(),
            "registered table"
        );
        tables.insert(key, table);
        Ok(())
    }

    /// Removes a table from the registry and returns it.
    pub fn drop_table(&self, database_oid: Oid, table_oid: Oid) -> Option<Arc<DataTable>> {
        self.tables.write().remove(&(database_oid, table_oid))
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }
}

impl TableResolver for Catalog {
    fn get_table_with_oid(&self, database_oid: Oid, table_oid: Oid) -> Option<Arc<DataTable>> {
        self.tables.read().get(&(database_oid, table_oid)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;
    use crate::tuple::Column;

    fn schema() -> Schema {
        Schema::new(vec![Column::new("id", Type::Int4).not_null()])
    }

    #[test]
    fn test_create_and_resolve_table() {
        let catalog = Catalog::new();
        let table = catalog
            .create_table(1, 5, "users", schema(), StorageConfig::default())
            .unwrap();

        let resolved = catalog.get_table_with_oid(1, 5).unwrap();
        assert!(Arc::ptr_eq(&table, &resolved));
        assert!(catalog.get_table_with_oid(2, 5).is_none());
        assert!(catalog.get_table_with_oid(1, 6).is_none());
        assert_eq!(catalog.table_count(), 1);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let catalog = Catalog::new();
        catalog
            .create_table(1, 5, "users", schema(), StorageConfig::default())
            .unwrap();
        let err = catalog
            .create_table(1, 5, "users_again", schema(), StorageConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::TableAlreadyExists {
                database_oid: 1,
                table_oid: 5
            }
        );

        // Same table oid in another database is a different table.
        catalog
            .create_table(2, 5, "users", schema(), StorageConfig::default())
            .unwrap();
        assert_eq!(catalog.table_count(), 2);
    }

    #[test]
    fn test_invalid_config_surfaces_storage_error() {
        let catalog = Catalog::new();
        let err = catalog
            .create_table(
                1,
                5,
                "t",
                schema(),
                StorageConfig::default().with_tuples_per_tile_group(0),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Storage(StorageError::InvalidConfig(_))
        ));
        assert_eq!(catalog.table_count(), 0);
    }

    #[test]
    fn test_drop_table() {
        let catalog = Catalog::new();
        catalog
            .create_table(1, 5, "users", schema(), StorageConfig::default())
            .unwrap();
        assert!(catalog.drop_table(1, 5).is_some());
        assert!(catalog.drop_table(1, 5).is_none());
        assert!(catalog.get_table_with_oid(1, 5).is_none());
    }
}
