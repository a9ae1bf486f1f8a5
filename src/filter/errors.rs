//! Filter errors
//!
//! Raised while normalizing or compiling a where clause, before any host call.

use thiserror::Error;

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors from where-clause normalization and compilation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("operator '{op}' on '{field}' expects an array value")]
    ExpectedArray { field: String, op: &'static str },

    #[error("operator '{op}' on '{field}' expects a string value")]
    ExpectedString { field: String, op: &'static str },

    #[error("invalid LIKE pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown operator '{op}' on field '{field}'")]
    UnknownOperator { field: String, op: String },

    #[error("table '{table}' has no column '{field}'")]
    UnknownColumn { table: String, field: String },

    #[error("malformed object filter: {reason}")]
    MalformedObject { reason: String },

    #[error("{op} requires at least one child")]
    EmptyLogical { op: &'static str },
}

impl FilterError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        FilterError::MalformedObject {
            reason: reason.into(),
        }
    }
}
