//! Plan node tree.
//!
//! Every [`PlanNode`] owns its children; traversal is top-down only.

use std::sync::Arc;

use crate::expr::Expr;
use crate::storage::DataTable;

use super::scan_key::IndexScanDescriptor;

/// Scan driven by an index range query.
#[derive(Debug, Clone)]
pub struct IndexScanPlan {
    /// Residual predicate over table columns.
    pub predicate: Option<Expr>,
    /// Table columns to output. Empty means all.
    pub column_ids: Vec<usize>,
    pub table: Arc<DataTable>,
    pub descriptor: IndexScanDescriptor,
}

/// Scan over every tile group of a table.
#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub predicate: Option<Expr>,
    pub column_ids: Vec<usize>,
    pub table: Arc<DataTable>,
}

/// Expressions evaluated over the single child's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPlan {
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum PlanKind {
    IndexScan(IndexScanPlan),
    SeqScan(SeqScanPlan),
    Projection(ProjectionPlan),
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    kind: PlanKind,
    children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(kind: PlanKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> &PlanKind {
        &self.kind
    }

    pub fn add_child(&mut self, child: PlanNode) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[PlanNode] {
        &self.children
    }

    /// Formats the tree as an indented EXPLAIN string.
    ///
    /// ```text
    /// Projection: $1, ($0 > 10)
    ///   IndexScan on users using idx_age (key0 >= 18) cols: [2, 4]
    /// ```
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();
        self.format_into(0, &mut lines);
        lines.join("\n")
    }

    fn format_into(&self, indent: usize, lines: &mut Vec<String>) {
        let prefix = "  ".repeat(indent);
        let line = match &self.kind {
            PlanKind::IndexScan(scan) => {
                let mut line = format!(
                    "{}IndexScan on {} using {} ({})",
                    prefix,
                    scan.table.name(),
                    scan.descriptor.index().name(),
                    scan.descriptor
                );
                push_scan_details(&mut line, scan.predicate.as_ref(), &scan.column_ids);
                line
            }
            PlanKind::SeqScan(scan) => {
                let mut line = format!("{}SeqScan on {}", prefix, scan.table.name());
                push_scan_details(&mut line, scan.predicate.as_ref(), &scan.column_ids);
                line
            }
            PlanKind::Projection(projection) => {
                let exprs: Vec<String> = projection.exprs.iter().map(|e| e.to_string()).collect();
                format!("{}Projection: {}", prefix, exprs.join(", "))
            }
        };
        lines.push(line);
        for child in &self.children {
            child.format_into(indent + 1, lines);
        }
    }
}

fn push_scan_details(line: &mut String, predicate: Option<&Expr>, column_ids: &[usize]) {
    if let Some(predicate) = predicate {
        line.push_str(&format!(" filter: {}", predicate));
    }
    if !column_ids.is_empty() {
        line.push_str(&format!(" cols: {:?}", column_ids));
    }
}
