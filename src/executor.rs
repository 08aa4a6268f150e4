//! Query executor implementing the Volcano iterator model.
//!
//! Runs [`PlanNode`] trees produced by the plan builder against live
//! table storage.
//!
//! # Architecture
//!
//! ```text
//! PlanNode tree
//!       |
//! [ExecutorNode::build]
//!       |
//! ExecutorNode tree:
//!   Projection
//!     └── IndexScan (index probe -> live tuples -> residual filter)
//! ```
//!
//! Reads are not isolated from concurrent writers: a tuple deleted between
//! the index probe and the fetch is skipped, and one inserted after the
//! probe is not returned.

mod error;
mod node;
mod row;

pub use error::ExecutorError;
pub use node::{ExecutorNode, IndexScan, Projection, SeqScan};
pub use row::Row;

use crate::planner::PlanNode;

/// Builds and drains an executor tree for `plan`.
pub fn execute(plan: &PlanNode) -> Result<Vec<Row>, ExecutorError> {
    let mut node = ExecutorNode::build(plan)?;
    let mut rows = Vec::new();
    while let Some(row) = node.next()? {
        rows.push(row);
    }
    Ok(rows)
}
