//! Translates generic scan requests into plan trees.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::catalog::{Oid, TableResolver};
use crate::storage::DataTable;

use super::error::PlanError;
use super::plan::{IndexScanPlan, PlanKind, PlanNode, SeqScanPlan};
use super::request::{GenericScanInfo, ScanDirection, ScanKey, ScanRequest, extract_generic_scan_info};
use super::scan_key::{IndexScanDescriptor, ScanKeyCompiler};

/// Knobs for [`PlanBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Turn computed projections into a projection node above the scan.
    pub use_projection: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            use_projection: true,
        }
    }
}

/// Builds plan trees from [`ScanRequest`]s.
///
/// Holds no state between calls; the same request against the same
/// catalog contents always yields an equivalent plan.
///
/// Resolution order is fixed: table, then index, then scan keys. A missing
/// table or index is therefore reported even when the scan keys are also
/// invalid.
pub struct PlanBuilder<'a> {
    resolver: &'a dyn TableResolver,
    options: TransformOptions,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(resolver: &'a dyn TableResolver) -> Self {
        Self {
            resolver,
            options: TransformOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the scan node and attaches it under its parent, if any.
    ///
    /// Returns the parent when one is produced, otherwise the scan node.
    pub fn build(&self, request: &ScanRequest) -> Result<PlanNode, PlanError> {
        let state = request.scan_state();
        let table = self
            .resolver
            .get_table_with_oid(state.database_oid, state.table_oid)
            .ok_or(PlanError::TableNotFound {
                database_oid: state.database_oid,
                table_oid: state.table_oid,
            })?;

        let descriptor = match request {
            ScanRequest::IndexScan(s) | ScanRequest::IndexOnlyScan(s) => {
                Some(self.index_descriptor(&table, s.index_oid, &s.scan_keys, s.direction)?)
            }
            ScanRequest::BitmapHeapScan(s) => Some(self.index_descriptor(
                &table,
                s.probe.index_oid,
                &s.probe.scan_keys,
                ScanDirection::Forward,
            )?),
            ScanRequest::SeqScan(_) => None,
        };

        let GenericScanInfo {
            parent,
            predicate,
            column_ids,
        } = extract_generic_scan_info(state, self.options.use_projection)?;
        check_columns(&table, &column_ids, predicate.iter().flat_map(|p| p.referenced_columns()))?;

        let kind = match descriptor {
            Some(descriptor) => PlanKind::IndexScan(IndexScanPlan {
                predicate,
                column_ids,
                table: table.clone(),
                descriptor,
            }),
            None => PlanKind::SeqScan(SeqScanPlan {
                predicate,
                column_ids,
                table: table.clone(),
            }),
        };
        let scan = PlanNode::new(kind);

        info!(
            table = %table.name(),
            scan = request.label(),
            with_parent = parent.is_some(),
            "built scan plan"
        );
        Ok(match parent {
            Some(mut parent) => {
                parent.add_child(scan);
                parent
            }
            None => scan,
        })
    }

    fn index_descriptor(
        &self,
        table: &DataTable,
        index_oid: Oid,
        keys: &[ScanKey],
        direction: ScanDirection,
    ) -> Result<IndexScanDescriptor, PlanError> {
        let Some(index) = table.get_index_with_oid(index_oid) else {
            error!(table = %table.name(), index_oid, "index not found");
            return Err(PlanError::IndexNotFound {
                table: table.name().to_string(),
                index_oid,
            });
        };
        if !table.is_index_ready(index_oid) {
            warn!(table = %table.name(), index = %index.name(), "index awaiting backfill");
            return Err(PlanError::IndexNotReady {
                table: table.name().to_string(),
                index_oid,
            });
        }

        info!(
            table = %table.name(),
            index = %index.name(),
            keys = keys.len(),
            ?direction,
            "compiling scan keys"
        );
        ScanKeyCompiler::new(Arc::clone(&index)).compile(keys, direction)
    }
}

fn check_columns(
    table: &DataTable,
    column_ids: &[usize],
    predicate_columns: impl IntoIterator<Item = usize>,
) -> Result<(), PlanError> {
    let column_count = table.schema().column_count();
    match column_ids
        .iter()
        .copied()
        .chain(predicate_columns)
        .find(|&c| c >= column_count)
    {
        Some(column) => Err(PlanError::InvalidColumn {
            table: table.name().to_string(),
            column,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::datum::{Type, Value};
    use crate::expr::Expr;
    use crate::index::{CompareOp, IndexMetadata, OrderedIndex};
    use crate::planner::{
        BitmapHeapScanState, BitmapIndexScanState, IndexScanState, ProjectionInfo, ScanState,
        strategy,
    };
    use crate::storage::StorageConfig;
    use crate::tuple::{Column, Schema};

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        let schema = Schema::new(vec![
            Column::new("a", Type::Int4),
            Column::new("b", Type::Int4),
            Column::new("c", Type::Int4),
            Column::new("d", Type::Text),
        ]);
        let table = catalog
            .create_table(1, 5, "t", schema, StorageConfig::default())
            .unwrap();
        let index = OrderedIndex::new(IndexMetadata::new(2, "idx_abc", vec![0, 1, 2]));
        table.add_index(Arc::new(index)).unwrap();
        catalog
    }

    fn index_scan(keys: Vec<ScanKey>) -> ScanRequest {
        ScanRequest::IndexScan(IndexScanState::new(ScanState::new(1, 5), 2, keys))
    }

    fn index_plan(node: &PlanNode) -> &IndexScanPlan {
        match node.kind() {
            PlanKind::IndexScan(plan) => plan,
            other => panic!("expected index scan, got {:?}", other),
        }
    }

    #[test]
    fn test_single_scan_node() {
        let catalog = catalog();
        let plan = PlanBuilder::new(&catalog)
            .build(&index_scan(vec![ScanKey::new(3, strategy::EQUAL, 42)]))
            .unwrap();

        let scan = index_plan(&plan);
        assert!(plan.children().is_empty());
        assert_eq!(scan.descriptor.key_column_ids(), &[2]);
        assert_eq!(scan.descriptor.ops(), &[CompareOp::Eq]);
        assert_eq!(scan.descriptor.values(), &[Value::Int32(42)]);
        assert_eq!(scan.table.oid(), 5);
    }

    #[test]
    fn test_resolution_precedes_compilation() {
        let catalog = catalog();
        let bad_keys = vec![ScanKey::new(1, 99, 1)];

        let missing_table = ScanRequest::IndexScan(IndexScanState::new(
            ScanState::new(1, 6),
            2,
            bad_keys.clone(),
        ));
        assert_eq!(
            PlanBuilder::new(&catalog).build(&missing_table).unwrap_err(),
            PlanError::TableNotFound {
                database_oid: 1,
                table_oid: 6
            }
        );

        let missing_index =
            ScanRequest::IndexScan(IndexScanState::new(ScanState::new(1, 5), 7, bad_keys));
        assert_eq!(
            PlanBuilder::new(&catalog).build(&missing_index).unwrap_err(),
            PlanError::IndexNotFound {
                table: "t".to_string(),
                index_oid: 7
            }
        );
    }

    #[test]
    fn test_projection_parent() {
        let catalog = catalog();
        let state = ScanState::new(1, 5).with_projection(ProjectionInfo::new(vec![
            Expr::column(3),
            Expr::compare(CompareOp::Gt, Expr::column(1), Expr::constant(0)),
        ]));
        let request = ScanRequest::IndexOnlyScan(IndexScanState::new(
            state,
            2,
            vec![ScanKey::new(1, strategy::GREATER, 0)],
        ));

        let plan = PlanBuilder::new(&catalog).build(&request).unwrap();
        assert!(matches!(plan.kind(), PlanKind::Projection(_)));
        assert_eq!(plan.children().len(), 1);
        assert_eq!(index_plan(&plan.children()[0]).column_ids, vec![1, 3]);

        let flat = PlanBuilder::new(&catalog)
            .with_options(TransformOptions {
                use_projection: false,
            })
            .build(&request)
            .unwrap();
        assert!(flat.children().is_empty());
        assert!(index_plan(&flat).column_ids.is_empty());
    }

    #[test]
    fn test_bitmap_heap_scan_uses_probe_keys() {
        let catalog = catalog();
        let request = ScanRequest::BitmapHeapScan(BitmapHeapScanState {
            scan: ScanState::new(1, 5)
                .with_qual(Expr::is_null(Expr::column(3), true))
                .with_target_columns(vec![0, 3]),
            probe: BitmapIndexScanState {
                index_oid: 2,
                scan_keys: vec![
                    ScanKey::new(1, strategy::GREATER_EQUAL, 1),
                    ScanKey::new(2, strategy::LESS, 9),
                ],
            },
        });

        let plan = PlanBuilder::new(&catalog).build(&request).unwrap();
        let scan = index_plan(&plan);
        assert_eq!(scan.descriptor.key_column_ids(), &[0, 1]);
        assert_eq!(scan.column_ids, vec![0, 3]);
        assert!(scan.predicate.is_some());
    }

    #[test]
    fn test_seq_scan() {
        let catalog = catalog();
        let plan = PlanBuilder::new(&catalog)
            .build(&ScanRequest::SeqScan(ScanState::new(1, 5)))
            .unwrap();
        assert!(matches!(plan.kind(), PlanKind::SeqScan(_)));
    }

    #[test]
    fn test_backward_scan_rejected() {
        let catalog = catalog();
        let request = ScanRequest::IndexScan(
            IndexScanState::new(ScanState::new(1, 5), 2, vec![])
                .with_direction(ScanDirection::Backward),
        );
        assert_eq!(
            PlanBuilder::new(&catalog).build(&request).unwrap_err(),
            PlanError::UnsupportedScanDirection(ScanDirection::Backward)
        );
    }

    #[test]
    fn test_invalid_output_column() {
        let catalog = catalog();
        let request = ScanRequest::SeqScan(ScanState::new(1, 5).with_target_columns(vec![0, 4]));
        assert_eq!(
            PlanBuilder::new(&catalog).build(&request).unwrap_err(),
            PlanError::InvalidColumn {
                table: "t".to_string(),
                column: 4
            }
        );
    }

    #[test]
    fn test_index_awaiting_backfill_rejected() {
        let catalog = catalog();
        let table = catalog.get_table_with_oid(1, 5).unwrap();
        table
            .insert_tuple(&crate::tuple::Tuple::new(vec![
                Value::Int32(1),
                Value::Int32(2),
                Value::Int32(3),
                Value::from("x"),
            ]))
            .unwrap();
        let late = OrderedIndex::new(IndexMetadata::new(3, "idx_d", vec![3]));
        table.add_index(Arc::new(late)).unwrap();

        let request = ScanRequest::IndexScan(IndexScanState::new(ScanState::new(1, 5), 3, vec![]));
        assert!(matches!(
            PlanBuilder::new(&catalog).build(&request),
            Err(PlanError::IndexNotReady { index_oid: 3, .. })
        ));

        table.backfill_index(3).unwrap();
        assert!(PlanBuilder::new(&catalog).build(&request).is_ok());
    }
}
