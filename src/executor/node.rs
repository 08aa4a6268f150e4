//! Executor nodes implementing the Volcano iterator model.
//!
//! Each node produces rows one at a time via [`ExecutorNode::next()`].
//! Nodes are composed into a tree (e.g., Projection -> IndexScan) where each
//! parent pulls rows from its child.

use std::sync::Arc;

use tracing::trace;

use crate::expr::Expr;
use crate::planner::{IndexScanDescriptor, PlanKind, PlanNode};
use crate::storage::{DataTable, TileGroupId, TupleLocation};
use crate::tuple::Tuple;

use super::error::ExecutorError;
use super::row::Row;

/// A query executor node.
///
/// Uses enum dispatch; the set of node types is small and fixed.
#[derive(Debug)]
pub enum ExecutorNode {
    /// Index range query followed by tuple fetch.
    IndexScan(IndexScan),
    /// Scan over every tile group in order.
    SeqScan(SeqScan),
    /// Expression evaluation over a single child.
    Projection(Projection),
}

impl ExecutorNode {
    /// Converts a [`PlanNode`] tree into an executor tree.
    ///
    /// No tuples are read here; all storage access happens in
    /// [`ExecutorNode::next()`].
    pub fn build(plan: &PlanNode) -> Result<Self, ExecutorError> {
        match plan.kind() {
            PlanKind::IndexScan(scan) => {
                expect_children(plan, 0, "IndexScan")?;
                Ok(ExecutorNode::IndexScan(IndexScan::new(
                    scan.table.clone(),
                    scan.descriptor.clone(),
                    scan.predicate.clone(),
                    scan.column_ids.clone(),
                )))
            }
            PlanKind::SeqScan(scan) => {
                expect_children(plan, 0, "SeqScan")?;
                Ok(ExecutorNode::SeqScan(SeqScan::new(
                    scan.table.clone(),
                    scan.predicate.clone(),
                    scan.column_ids.clone(),
                )))
            }
            PlanKind::Projection(projection) => {
                expect_children(plan, 1, "Projection")?;
                let child = Self::build(&plan.children()[0])?;
                Ok(ExecutorNode::Projection(Projection::new(
                    child,
                    projection.exprs.clone(),
                )))
            }
        }
    }

    /// Returns the next row, or `None` if exhausted.
    ///
    /// This method follows the Volcano iterator model naming convention,
    /// not `std::iter::Iterator`, because it returns `Result<Option<_>>`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        match self {
            ExecutorNode::IndexScan(n) => n.next(),
            ExecutorNode::SeqScan(n) => n.next(),
            ExecutorNode::Projection(n) => n.next(),
        }
    }
}

fn expect_children(plan: &PlanNode, expected: usize, node: &str) -> Result<(), ExecutorError> {
    if plan.children().len() == expected {
        Ok(())
    } else {
        Err(ExecutorError::InvalidPlan(format!(
            "{} expects {} children, found {}",
            node,
            expected,
            plan.children().len()
        )))
    }
}

/// Shared residual filter and output projection of both scans.
#[derive(Debug)]
struct ScanOutput {
    predicate: Option<Expr>,
    /// Empty means every column.
    column_ids: Vec<usize>,
}

impl ScanOutput {
    /// Returns the output row if `tuple` passes the predicate. NULL is false.
    fn emit(&self, location: TupleLocation, tuple: Tuple) -> Result<Option<Row>, ExecutorError> {
        if let Some(predicate) = &self.predicate {
            if !predicate.is_satisfied_by(&tuple)? {
                return Ok(None);
            }
        }
        let values = if self.column_ids.is_empty() {
            tuple.values
        } else {
            tuple.project(&self.column_ids).values
        };
        Ok(Some(Row::from_table(location, values)))
    }
}

/// Index scan node.
///
/// The index is queried once, on the first call to `next()`. Locations
/// whose slot is no longer live are skipped.
#[derive(Debug)]
pub struct IndexScan {
    table: Arc<DataTable>,
    descriptor: IndexScanDescriptor,
    output: ScanOutput,
    /// `None` until the index has been queried.
    locations: Option<std::vec::IntoIter<TupleLocation>>,
}

impl IndexScan {
    pub fn new(
        table: Arc<DataTable>,
        descriptor: IndexScanDescriptor,
        predicate: Option<Expr>,
        column_ids: Vec<usize>,
    ) -> Self {
        Self {
            table,
            descriptor,
            output: ScanOutput {
                predicate,
                column_ids,
            },
            locations: None,
        }
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        let descriptor = &self.descriptor;
        let locations = self.locations.get_or_insert_with(|| {
            let found = descriptor.scan();
            trace!(index = %descriptor.index().name(), matches = found.len(), "index probe");
            found.into_iter()
        });

        for location in locations.by_ref() {
            let Some(tuple) = self.table.get_tuple(location) else {
                continue;
            };
            if let Some(row) = self.output.emit(location, tuple)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

/// Sequential scan node that loads one tile group at a time.
#[derive(Debug)]
pub struct SeqScan {
    table: Arc<DataTable>,
    output: ScanOutput,
    /// Next tile group to load.
    next_tile_group: TileGroupId,
    /// Live tuples of the current tile group.
    buffer: std::vec::IntoIter<(TupleLocation, Tuple)>,
}

impl SeqScan {
    pub fn new(table: Arc<DataTable>, predicate: Option<Expr>, column_ids: Vec<usize>) -> Self {
        Self {
            table,
            output: ScanOutput {
                predicate,
                column_ids,
            },
            next_tile_group: 0,
            buffer: Vec::new().into_iter(),
        }
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        loop {
            for (location, tuple) in self.buffer.by_ref() {
                if let Some(row) = self.output.emit(location, tuple)? {
                    return Ok(Some(row));
                }
            }
            let Some(tile_group) = self.table.tile_group(self.next_tile_group) else {
                return Ok(None);
            };
            self.next_tile_group += 1;
            self.buffer = tile_group.live_tuples().into_iter();
        }
    }
}

/// Projection node that evaluates expressions over its child's rows.
#[derive(Debug)]
pub struct Projection {
    child: Box<ExecutorNode>,
    exprs: Vec<Expr>,
}

impl Projection {
    pub fn new(child: ExecutorNode, exprs: Vec<Expr>) -> Self {
        Self {
            child: Box::new(child),
            exprs,
        }
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        let Some(row) = self.child.next()? else {
            return Ok(None);
        };
        let input = row.to_tuple();
        let values = self
            .exprs
            .iter()
            .map(|e| e.evaluate(&input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Row {
            location: row.location,
            values,
        }))
    }
}
