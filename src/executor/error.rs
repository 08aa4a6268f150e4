//! Executor-specific errors.

use crate::expr::ExprError;

/// Errors that can occur during plan execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Expression evaluation failed.
    Expr(ExprError),

    /// A plan node does not have the number of children it requires.
    InvalidPlan(String),
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::Expr(e) => write!(f, "{}", e),
            ExecutorError::InvalidPlan(msg) => write!(f, "invalid plan: {}", msg),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Expr(e) => Some(e),
            ExecutorError::InvalidPlan(_) => None,
        }
    }
}

impl From<ExprError> for ExecutorError {
    fn from(e: ExprError) -> Self {
        ExecutorError::Expr(e)
    }
}
