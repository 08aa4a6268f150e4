//! Scan key compilation.
//!
//! Translates generic scan keys into an [`IndexScanDescriptor`] bound to a
//! specific index. Only `key_attribute <op> constant` with B-tree strategies
//! 1 through 5 is accepted; anything else fails the whole compilation.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::datum::Value;
use crate::index::{CompareOp, Index};
use crate::storage::TupleLocation;

use super::error::PlanError;
use super::request::{ScanArgument, ScanDirection, ScanKey, ScanKeyFlags, strategy};

/// Flags whose presence means the key is not a plain comparison.
const UNSUPPORTED_FLAGS: ScanKeyFlags = ScanKeyFlags::from_bits(
    ScanKeyFlags::ISNULL.bits()
        | ScanKeyFlags::UNARY.bits()
        | ScanKeyFlags::ROW_HEADER.bits()
        | ScanKeyFlags::ROW_MEMBER.bits()
        | ScanKeyFlags::ROW_END.bits()
        | ScanKeyFlags::SEARCHARRAY.bits()
        | ScanKeyFlags::SEARCHNULL.bits()
        | ScanKeyFlags::SEARCHNOTNULL.bits()
        | ScanKeyFlags::ORDER_BY.bits(),
);

/// Compiled index predicates: three parallel lists in encounter order.
#[derive(Debug, Clone)]
pub struct IndexScanDescriptor {
    index: Arc<dyn Index>,
    key_column_ids: Vec<usize>,
    ops: Vec<CompareOp>,
    values: Vec<Value>,
}

impl IndexScanDescriptor {
    pub fn index(&self) -> &Arc<dyn Index> {
        &self.index
    }

    /// 0-based positions within the index key.
    pub fn key_column_ids(&self) -> &[usize] {
        &self.key_column_ids
    }

    pub fn ops(&self) -> &[CompareOp] {
        &self.ops
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.key_column_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_column_ids.is_empty()
    }

    /// Runs the described scan and returns matching locations in key order.
    pub fn scan(&self) -> Vec<TupleLocation> {
        self.index
            .scan(&self.key_column_ids, &self.ops, &self.values)
    }
}

impl fmt::Display for IndexScanDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(full scan)");
        }
        for (i, ((column, op), value)) in self
            .key_column_ids
            .iter()
            .zip(&self.ops)
            .zip(&self.values)
            .enumerate()
        {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "key{} {} {}", column, op, value)?;
        }
        Ok(())
    }
}

/// Compiles scan keys against one index.
pub struct ScanKeyCompiler {
    index: Arc<dyn Index>,
}

impl ScanKeyCompiler {
    pub fn new(index: Arc<dyn Index>) -> Self {
        Self { index }
    }

    /// Compiles `keys` into a descriptor, or fails without a partial result.
    ///
    /// # Errors
    ///
    /// - [`PlanError::UnsupportedScanDirection`] for backward scans
    /// - [`PlanError::UnsupportedPredicate`] for special-form flags,
    ///   non-constant, array or NULL arguments, or an attribute outside the
    ///   index key
    /// - [`PlanError::UnsupportedOperator`] for unknown strategy numbers
    pub fn compile(
        &self,
        keys: &[ScanKey],
        direction: ScanDirection,
    ) -> Result<IndexScanDescriptor, PlanError> {
        if direction == ScanDirection::Backward {
            return Err(PlanError::UnsupportedScanDirection(direction));
        }

        let arity = self.index.metadata().key_arity();
        let mut key_column_ids = Vec::with_capacity(keys.len());
        let mut ops = Vec::with_capacity(keys.len());
        let mut values = Vec::with_capacity(keys.len());

        for key in keys {
            let (column, op, value) = compile_key(key, arity)?;
            debug!(index = %self.index.name(), attno = key.attno, "key {} {}", op, value);
            key_column_ids.push(column);
            ops.push(op);
            values.push(value);
        }

        Ok(IndexScanDescriptor {
            index: self.index.clone(),
            key_column_ids,
            ops,
            values,
        })
    }
}

fn compile_key(key: &ScanKey, arity: usize) -> Result<(usize, CompareOp, Value), PlanError> {
    let unsupported = |reason: String| PlanError::UnsupportedPredicate {
        attno: key.attno,
        reason,
    };

    if key.flags.intersects(UNSUPPORTED_FLAGS) {
        return Err(unsupported(format!("flags {}", key.flags)));
    }

    let value = match &key.argument {
        ScanArgument::Constant(v) if v.is_null() => {
            return Err(unsupported("NULL comparison constant".to_string()));
        }
        ScanArgument::Constant(v) => v.clone(),
        ScanArgument::NonConstant(desc) => {
            return Err(unsupported(format!("non-constant argument {}", desc)));
        }
        ScanArgument::Array(_) => return Err(unsupported("array argument".to_string())),
    };

    let column = usize::try_from(key.attno)
        .ok()
        .filter(|&attno| (1..=arity).contains(&attno))
        .map(|attno| attno - 1)
        .ok_or_else(|| {
            unsupported(format!(
                "attribute outside index key of {} columns",
                arity
            ))
        })?;

    let op = compare_op(key.strategy).ok_or(PlanError::UnsupportedOperator {
        attno: key.attno,
        strategy: key.strategy,
    })?;

    Ok((column, op, value))
}

fn compare_op(strategy: u16) -> Option<CompareOp> {
    match strategy {
        strategy::LESS => Some(CompareOp::Lt),
        strategy::LESS_EQUAL => Some(CompareOp::Le),
        strategy::EQUAL => Some(CompareOp::Eq),
        strategy::GREATER_EQUAL => Some(CompareOp::Ge),
        strategy::GREATER => Some(CompareOp::Gt),
        _ => None,
    }
}
