//! Column definitions for a table.

use crate::datum::Type;

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared data type.
    pub ty: Type,
    /// Whether NULL is allowed in this column.
    pub nullable: bool,
}

impl Column {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    /// Marks this column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered column definitions of a table.
///
/// Column ids used throughout the crate are 0-based positions in this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from column definitions.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Returns the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column at `column_id`, if any.
    pub fn column(&self, column_id: usize) -> Option<&Column> {
        self.columns.get(column_id)
    }

    /// Returns all columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Resolves a column name to its id.
    pub fn column_id(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterates over the ids of NOT NULL columns.
    pub fn not_null_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.nullable)
            .map(|(i, _)| i)
    }
}
