//! Scan plan construction.
//!
//! Turns generic scan requests from an external planner into plan trees
//! over [`DataTable`](crate::storage::DataTable)s and their indexes.
//!
//! # Architecture
//!
//! ```text
//! ScanRequest
//!       |
//! [PlanBuilder] -- resolves table and index via TableResolver
//!       |
//!       +-- ScanKeyCompiler: ScanKey[] -> IndexScanDescriptor
//!       +-- extract_generic_scan_info: predicate, columns, parent
//!       |
//! PlanNode tree:
//!   Projection (optional)
//!     └── IndexScan | SeqScan
//! ```

mod builder;
mod error;
mod plan;
mod request;
mod scan_key;

pub use builder::{PlanBuilder, TransformOptions};
pub use error::PlanError;
pub use plan::{IndexScanPlan, PlanKind, PlanNode, ProjectionPlan, SeqScanPlan};
pub use request::{
    BitmapHeapScanState, BitmapIndexScanState, GenericScanInfo, IndexScanState, ProjectionInfo,
    ScanArgument, ScanDirection, ScanKey, ScanKeyFlags, ScanRequest, ScanState,
    extract_generic_scan_info, strategy,
};
pub use scan_key::{IndexScanDescriptor, ScanKeyCompiler};
