//! Stream and cursor errors
//!
//! Error codes:
//! - ORM_ORDER_ALREADY_SET
//! - ORM_ORDER_MISMATCH
//! - ORM_INDEX_FIELD_MISMATCH
//! - ORM_FILTER_MISUSE
//! - ORM_NOT_UNIQUE
//! - ORM_END_CURSOR_UNSUPPORTED
//! - ORM_ROW_READ_LIMIT
//! - ORM_EMPTY_UNION
//! - ORM_CURSOR_DECODE
//! - ORM_CURSOR_SHAPE

use thiserror::Error;

/// Stream composition and consumption errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("order has already been set on this stream")]
    OrderAlreadySet,

    #[error("cannot combine streams with different order: {expected} and {found}")]
    OrderMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("cannot combine streams with different index fields: {expected:?} and {found:?}")]
    IndexFieldMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error(".filter() reads every row without an index; use .filter_with() for streaming predicates or put the condition in the where clause")]
    FilterMisuse,

    #[error("expected at most one row, found more")]
    NotUnique,

    #[error("endCursor is not supported on flat-mapped streams")]
    EndCursorUnsupported,

    #[error("row read limit of {limit} reached before the stream finished")]
    RowReadLimitExceeded { limit: usize },

    #[error("union requires at least one stream")]
    EmptyUnion,
}

impl StreamError {
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::OrderAlreadySet => "ORM_ORDER_ALREADY_SET",
            StreamError::OrderMismatch { .. } => "ORM_ORDER_MISMATCH",
            StreamError::IndexFieldMismatch { .. } => "ORM_INDEX_FIELD_MISMATCH",
            StreamError::FilterMisuse => "ORM_FILTER_MISUSE",
            StreamError::NotUnique => "ORM_NOT_UNIQUE",
            StreamError::EndCursorUnsupported => "ORM_END_CURSOR_UNSUPPORTED",
            StreamError::RowReadLimitExceeded { .. } => "ORM_ROW_READ_LIMIT",
            StreamError::EmptyUnion => "ORM_EMPTY_UNION",
        }
    }

    /// Caller misuse rather than a runtime limit
    pub fn is_misuse(&self) -> bool {
        !matches!(
            self,
            StreamError::RowReadLimitExceeded { .. } | StreamError::NotUnique
        )
    }
}

/// Cursor strings that cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("invalid cursor: {reason}")]
    Decode { reason: String },

    #[error("cursor does not match the stream shape: expected {expected}, found {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl CursorError {
    pub fn code(&self) -> &'static str {
        match self {
            CursorError::Decode { .. } => "ORM_CURSOR_DECODE",
            CursorError::ShapeMismatch { .. } => "ORM_CURSOR_SHAPE",
        }
    }
}
