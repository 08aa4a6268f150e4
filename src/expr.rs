//! Residual predicates and projection expressions.
//!
//! [`Expr`] is evaluated against a single [`Tuple`] with SQL three-valued
//! logic. Column references are positional (`Column(i)` reads `tuple[i]`),
//! so an expression written against table columns must be [`rebind`]ed
//! before it can run over a narrower scan output.
//!
//! [`rebind`]: Expr::rebind

use std::collections::BTreeSet;
use std::fmt;

use crate::datum::Value;
use crate::index::CompareOp;
use crate::tuple::Tuple;

/// Errors raised while evaluating or rebinding an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Column reference beyond the end of the tuple.
    ColumnOutOfRange { index: usize, len: usize },

    /// Column is not part of the target column list during rebinding.
    UnboundColumn(usize),

    /// Operand type does not fit the operator.
    TypeMismatch { expected: String, found: String },
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::ColumnOutOfRange { index, len } => {
                write!(
                    f,
                    "column index {} out of bounds for tuple with {} columns",
                    index, len
                )
            }
            ExprError::UnboundColumn(index) => {
                write!(f, "column {} is not produced by the input", index)
            }
            ExprError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for ExprError {}

/// An expression over the columns of one tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Constant(Value),
    /// Positional column reference.
    Column(usize),
    /// Binary comparison; NULL if either side is NULL.
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `IS [NOT] NULL`; never NULL itself.
    IsNull { expr: Box<Expr>, negated: bool },
}

impl Expr {
    pub fn column(index: usize) -> Self {
        Expr::Column(index)
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    pub fn is_null(expr: Expr, negated: bool) -> Self {
        Expr::IsNull {
            expr: Box::new(expr),
            negated,
        }
    }

    /// Evaluates the expression against `tuple`.
    pub fn evaluate(&self, tuple: &Tuple) -> Result<Value, ExprError> {
        match self {
            Expr::Constant(v) => Ok(v.clone()),
            Expr::Column(index) => {
                tuple
                    .value(*index)
                    .cloned()
                    .ok_or(ExprError::ColumnOutOfRange {
                        index: *index,
                        len: tuple.len(),
                    })
            }
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(tuple)?;
                let r = right.evaluate(tuple)?;
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let ord = l.sql_cmp(&r).ok_or_else(|| ExprError::TypeMismatch {
                    expected: type_name(&l),
                    found: type_name(&r),
                })?;
                Ok(Value::Boolean(op.matches(ord)))
            }
            Expr::And(left, right) => {
                let l = truth(&left.evaluate(tuple)?)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = truth(&right.evaluate(tuple)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            Expr::Or(left, right) => {
                let l = truth(&left.evaluate(tuple)?)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = truth(&right.evaluate(tuple)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            Expr::Not(inner) => Ok(match truth(&inner.evaluate(tuple)?)? {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Expr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(tuple)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
        }
    }

    /// Returns true only if the expression evaluates to TRUE. NULL is false.
    pub fn is_satisfied_by(&self, tuple: &Tuple) -> Result<bool, ExprError> {
        Ok(truth(&self.evaluate(tuple)?)?.unwrap_or(false))
    }

    /// Returns the distinct column indexes referenced, in ascending order.
    pub fn referenced_columns(&self) -> Vec<usize> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns.into_iter().collect()
    }

    fn collect_columns(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Column(index) => {
                out.insert(*index);
            }
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(inner) | Expr::IsNull { expr: inner, .. } => inner.collect_columns(out),
        }
    }

    /// Rewrites column references onto an input that produces `columns`.
    ///
    /// `Column(c)` becomes `Column(i)` where `columns[i] == c`.
    pub fn rebind(&self, columns: &[usize]) -> Result<Expr, ExprError> {
        Ok(match self {
            Expr::Constant(v) => Expr::Constant(v.clone()),
            Expr::Column(c) => Expr::Column(
                columns
                    .iter()
                    .position(|x| x == c)
                    .ok_or(ExprError::UnboundColumn(*c))?,
            ),
            Expr::Compare { op, left, right } => {
                Expr::compare(*op, left.rebind(columns)?, right.rebind(columns)?)
            }
            Expr::And(l, r) => Expr::and(l.rebind(columns)?, r.rebind(columns)?),
            Expr::Or(l, r) => Expr::or(l.rebind(columns)?, r.rebind(columns)?),
            Expr::Not(inner) => Expr::not(inner.rebind(columns)?),
            Expr::IsNull { expr, negated } => Expr::is_null(expr.rebind(columns)?, *negated),
        })
    }
}

fn truth(value: &Value) -> Result<Option<bool>, ExprError> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(ExprError::TypeMismatch {
            expected: "boolean".to_string(),
            found: type_name(other),
        }),
    }
}

fn type_name(value: &Value) -> String {
    value
        .data_type()
        .map_or_else(|| "null".to_string(), |t| t.to_string())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(v) => write!(f, "{}", v),
            Expr::Column(index) => write!(f, "${}", index),
            Expr::Compare { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::And(l, r) => write!(f, "({} AND {})", l, r),
            Expr::Or(l, r) => write!(f, "({} OR {})", l, r),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", expr)
                } else {
                    write!(f, "{} IS NULL", expr)
                }
            }
        }
    }
}
