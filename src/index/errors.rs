//! Index range errors
//!
//! Raised while building ranges, before any host call.

use thiserror::Error;

/// Result type for index range construction
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors from building an index range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("field '{field}' is not part of index fields {fields:?}")]
    UnknownField { field: String, fields: Vec<String> },

    #[error("field '{field}' requires leading fields {missing:?} to be bound by equality first")]
    NonLeadingRange { field: String, missing: Vec<String> },

    #[error("field '{field}' is already bound")]
    OutOfSequence { field: String },

    #[error("equality on '{field}' cannot follow a range bound")]
    EqualityAfterRange { field: String },

    #[error("duplicate {bound} bound on '{field}'")]
    DuplicateBound { field: String, bound: &'static str },
}
