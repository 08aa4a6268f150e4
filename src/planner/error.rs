//! Plan construction errors.

use crate::catalog::Oid;
use crate::expr::ExprError;

use super::request::ScanDirection;

/// Errors that abort plan construction.
///
/// Catalog failures are reported before any scan key is looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// No table with these oids in the catalog.
    TableNotFound { database_oid: Oid, table_oid: Oid },

    /// The table has no index with this oid.
    IndexNotFound { table: String, index_oid: Oid },

    /// The index exists but still awaits backfill.
    IndexNotReady { table: String, index_oid: Oid },

    /// A scan key cannot be pushed into the index. Callers should evaluate
    /// the predicate as a residual filter instead.
    UnsupportedPredicate { attno: i16, reason: String },

    /// A scan key uses a strategy number outside `1..=5`.
    UnsupportedOperator { attno: i16, strategy: u16 },

    /// Only forward scans are supported.
    UnsupportedScanDirection(ScanDirection),

    /// Output column outside the table schema.
    InvalidColumn { table: String, column: usize },

    /// Projection expressions could not be rebound onto the scan output.
    InvalidProjection(ExprError),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::TableNotFound {
                database_oid,
                table_oid,
            } => {
                write!(
                    f,
                    "table {} not found in database {}",
                    table_oid, database_oid
                )
            }
            PlanError::IndexNotFound { table, index_oid } => {
                write!(f, "index {} not found on table \"{}\"", index_oid, table)
            }
            PlanError::IndexNotReady { table, index_oid } => {
                write!(
                    f,
                    "index {} on table \"{}\" is awaiting backfill",
                    index_oid, table
                )
            }
            PlanError::UnsupportedPredicate { attno, reason } => {
                write!(f, "unsupported scan key on attribute {}: {}", attno, reason)
            }
            PlanError::UnsupportedOperator { attno, strategy } => {
                write!(
                    f,
                    "unsupported strategy {} on attribute {}",
                    strategy, attno
                )
            }
            PlanError::UnsupportedScanDirection(direction) => {
                write!(f, "unsupported scan direction: {:?}", direction)
            }
            PlanError::InvalidColumn { table, column } => {
                write!(f, "column {} does not exist in table \"{}\"", column, table)
            }
            PlanError::InvalidProjection(e) => write!(f, "invalid projection: {}", e),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::InvalidProjection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExprError> for PlanError {
    fn from(e: ExprError) -> Self {
        PlanError::InvalidProjection(e)
    }
}
