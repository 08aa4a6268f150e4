//! Generic scan descriptions handed to the plan builder.
//!
//! These types are produced by an external planner. The scan keys follow
//! the B-tree convention: a 1-based index attribute number, a strategy
//! number and an argument, plus flag bits describing special forms.

use std::fmt;
use std::ops::BitOr;

use crate::catalog::Oid;
use crate::datum::Value;
use crate::expr::Expr;

use super::error::PlanError;
use super::plan::{PlanKind, PlanNode, ProjectionPlan};

/// B-tree strategy numbers.
pub mod strategy {
    pub const LESS: u16 = 1;
    pub const LESS_EQUAL: u16 = 2;
    pub const EQUAL: u16 = 3;
    pub const GREATER_EQUAL: u16 = 4;
    pub const GREATER: u16 = 5;
}

/// Flag bits attached to a scan key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ScanKeyFlags(u32);

impl ScanKeyFlags {
    pub const NONE: Self = Self(0);
    /// The argument is NULL.
    pub const ISNULL: Self = Self(0x0001);
    /// Unary operator, no argument.
    pub const UNARY: Self = Self(0x0002);
    /// Header of a row comparison.
    pub const ROW_HEADER: Self = Self(0x0004);
    /// Member of a row comparison.
    pub const ROW_MEMBER: Self = Self(0x0008);
    /// Last member of a row comparison.
    pub const ROW_END: Self = Self(0x0010);
    /// `key op ANY (array)`.
    pub const SEARCHARRAY: Self = Self(0x0020);
    /// `key IS NULL`.
    pub const SEARCHNULL: Self = Self(0x0040);
    /// `key IS NOT NULL`.
    pub const SEARCHNOTNULL: Self = Self(0x0080);
    /// Ordering operator rather than a qualifier.
    pub const ORDER_BY: Self = Self(0x0100);

    const NAMED: [(Self, &'static str); 9] = [
        (Self::ISNULL, "ISNULL"),
        (Self::UNARY, "UNARY"),
        (Self::ROW_HEADER, "ROW_HEADER"),
        (Self::ROW_MEMBER, "ROW_MEMBER"),
        (Self::ROW_END, "ROW_END"),
        (Self::SEARCHARRAY, "SEARCHARRAY"),
        (Self::SEARCHNULL, "SEARCHNULL"),
        (Self::SEARCHNOTNULL, "SEARCHNOTNULL"),
        (Self::ORDER_BY, "ORDER_BY"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ScanKeyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ScanKeyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        let unknown = self.0 & !Self::NAMED.iter().fold(0, |acc, (flag, _)| acc | flag.0);
        match (names.is_empty(), unknown) {
            (true, 0) => f.write_str("NONE"),
            (_, 0) => f.write_str(&names.join("|")),
            (true, bits) => write!(f, "{:#x}", bits),
            (false, bits) => write!(f, "{}|{:#x}", names.join("|"), bits),
        }
    }
}

/// The comparison argument of a scan key.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanArgument {
    Constant(Value),
    /// Runtime-computed operand, described for diagnostics.
    NonConstant(String),
    /// Array operand of `op ANY (...)`.
    Array(Vec<Value>),
}

/// A single `attribute <strategy> argument` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanKey {
    /// 1-based attribute number within the index key.
    pub attno: i16,
    pub strategy: u16,
    pub argument: ScanArgument,
    pub flags: ScanKeyFlags,
}

impl ScanKey {
    /// Creates a plain `attno <strategy> value` key.
    pub fn new(attno: i16, strategy: u16, value: impl Into<Value>) -> Self {
        Self {
            attno,
            strategy,
            argument: ScanArgument::Constant(value.into()),
            flags: ScanKeyFlags::NONE,
        }
    }

    pub fn with_argument(mut self, argument: ScanArgument) -> Self {
        self.argument = argument;
        self
    }

    pub fn with_flags(mut self, flags: ScanKeyFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }
}

/// Requested index scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    Backward,
    /// Direction does not matter; scanned forward.
    NoMovement,
    #[default]
    Forward,
}

/// Target list evaluated above the scan.
///
/// Expressions reference table columns by position.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionInfo {
    pub exprs: Vec<Expr>,
}

impl ProjectionInfo {
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { exprs }
    }

    /// Returns the plain column list if every target is a column reference.
    pub fn simple_columns(&self) -> Option<Vec<usize>> {
        self.exprs
            .iter()
            .map(|e| match e {
                Expr::Column(c) => Some(*c),
                _ => None,
            })
            .collect()
    }
}

/// Parts shared by every scan request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanState {
    pub database_oid: Oid,
    pub table_oid: Oid,
    /// Residual predicate over table columns.
    pub qual: Option<Expr>,
    /// Output columns when no projection is used. Empty means all columns.
    pub target_columns: Vec<usize>,
    pub projection: Option<ProjectionInfo>,
}

impl ScanState {
    pub fn new(database_oid: Oid, table_oid: Oid) -> Self {
        Self {
            database_oid,
            table_oid,
            ..Self::default()
        }
    }

    pub fn with_qual(mut self, qual: Expr) -> Self {
        self.qual = Some(qual);
        self
    }

    pub fn with_target_columns(mut self, columns: Vec<usize>) -> Self {
        self.target_columns = columns;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionInfo) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Index scan or index-only scan request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexScanState {
    pub scan: ScanState,
    pub index_oid: Oid,
    pub scan_keys: Vec<ScanKey>,
    pub direction: ScanDirection,
}

impl IndexScanState {
    pub fn new(scan: ScanState, index_oid: Oid, scan_keys: Vec<ScanKey>) -> Self {
        Self {
            scan,
            index_oid,
            scan_keys,
            direction: ScanDirection::Forward,
        }
    }

    pub fn with_direction(mut self, direction: ScanDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// The index probe beneath a bitmap heap scan.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapIndexScanState {
    pub index_oid: Oid,
    pub scan_keys: Vec<ScanKey>,
}

/// Bitmap heap scan request; the scan keys live in the nested probe.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapHeapScanState {
    pub scan: ScanState,
    pub probe: BitmapIndexScanState,
}

/// A scan the plan builder can translate.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanRequest {
    IndexScan(IndexScanState),
    IndexOnlyScan(IndexScanState),
    BitmapHeapScan(BitmapHeapScanState),
    SeqScan(ScanState),
}

impl ScanRequest {
    /// Returns the generic part of the request.
    pub fn scan_state(&self) -> &ScanState {
        match self {
            ScanRequest::IndexScan(s) | ScanRequest::IndexOnlyScan(s) => &s.scan,
            ScanRequest::BitmapHeapScan(s) => &s.scan,
            ScanRequest::SeqScan(s) => s,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScanRequest::IndexScan(_) => "index scan",
            ScanRequest::IndexOnlyScan(_) => "index-only scan",
            ScanRequest::BitmapHeapScan(_) => "bitmap heap scan",
            ScanRequest::SeqScan(_) => "sequential scan",
        }
    }
}

/// Parent node, residual predicate and output columns of a scan.
#[derive(Debug)]
pub struct GenericScanInfo {
    pub parent: Option<PlanNode>,
    pub predicate: Option<Expr>,
    pub column_ids: Vec<usize>,
}

/// Splits a scan state into what the scan node evaluates and what goes above it.
///
/// With `use_projection` and a projection containing anything other than
/// plain column references, a projection parent is returned. The scan then
/// outputs the sorted distinct columns the projection reads, and the
/// parent's expressions are rebound onto that output. A projection of plain
/// columns becomes the output column list. In every other case the state's
/// target columns are used.
pub fn extract_generic_scan_info(
    state: &ScanState,
    use_projection: bool,
) -> Result<GenericScanInfo, PlanError> {
    let predicate = state.qual.clone();
    let projection = state.projection.as_ref().filter(|_| use_projection);

    let Some(projection) = projection else {
        return Ok(GenericScanInfo {
            parent: None,
            predicate,
            column_ids: state.target_columns.clone(),
        });
    };

    if let Some(column_ids) = projection.simple_columns() {
        return Ok(GenericScanInfo {
            parent: None,
            predicate,
            column_ids,
        });
    }

    let mut column_ids: Vec<usize> = projection
        .exprs
        .iter()
        .flat_map(|e| e.referenced_columns())
        .collect();
    column_ids.sort_unstable();
    column_ids.dedup();

    let exprs = projection
        .exprs
        .iter()
        .map(|e| e.rebind(&column_ids))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GenericScanInfo {
        parent: Some(PlanNode::new(PlanKind::Projection(ProjectionPlan { exprs }))),
        predicate,
        column_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::CompareOp;

    #[test]
    fn test_flags_display() {
        assert_eq!(ScanKeyFlags::NONE.to_string(), "NONE");
        assert_eq!(
            (ScanKeyFlags::ISNULL | ScanKeyFlags::ORDER_BY).to_string(),
            "ISNULL|ORDER_BY"
        );
        assert_eq!(ScanKeyFlags::from_bits(0x1000).to_string(), "0x1000");
    }

    #[test]
    fn test_flags_contains_and_intersects() {
        let flags = ScanKeyFlags::ROW_HEADER | ScanKeyFlags::ROW_END;
        assert!(flags.contains(ScanKeyFlags::ROW_END));
        assert!(!flags.contains(ScanKeyFlags::ROW_MEMBER));
        assert!(flags.intersects(ScanKeyFlags::ROW_MEMBER | ScanKeyFlags::ROW_END));
        assert!(ScanKeyFlags::NONE.is_empty());
    }

    #[test]
    fn test_extract_without_projection() {
        let state = ScanState::new(1, 5)
            .with_target_columns(vec![2, 0])
            .with_qual(Expr::is_null(Expr::column(1), true));
        let info = extract_generic_scan_info(&state, true).unwrap();
        assert!(info.parent.is_none());
        assert_eq!(info.column_ids, vec![2, 0]);
        assert!(info.predicate.is_some());
    }

    #[test]
    fn test_extract_simple_projection() {
        let state = ScanState::new(1, 5)
            .with_target_columns(vec![0])
            .with_projection(ProjectionInfo::new(vec![Expr::column(3), Expr::column(1)]));

        let info = extract_generic_scan_info(&state, true).unwrap();
        assert!(info.parent.is_none());
        assert_eq!(info.column_ids, vec![3, 1]);

        // Projection ignored when disabled.
        let info = extract_generic_scan_info(&state, false).unwrap();
        assert_eq!(info.column_ids, vec![0]);
    }

    #[test]
    fn test_extract_computed_projection() {
        let state = ScanState::new(1, 5).with_projection(ProjectionInfo::new(vec![
            Expr::column(4),
            Expr::compare(CompareOp::Gt, Expr::column(2), Expr::constant(10)),
        ]));

        let info = extract_generic_scan_info(&state, true).unwrap();
        assert_eq!(info.column_ids, vec![2, 4]);
        let parent = info.parent.unwrap();
        let PlanKind::Projection(projection) = parent.kind() else {
            panic!("expected projection parent");
        };
        assert_eq!(
            projection.exprs,
            vec![
                Expr::column(1),
                Expr::compare(CompareOp::Gt, Expr::column(0), Expr::constant(10)),
            ]
        );
        assert!(parent.children().is_empty());
    }
}
