//! Planner error types
//!
//! Error codes:
//! - ORM_UNKNOWN_INDEX
//! - ORM_NON_LEADING_RANGE
//! - ORM_INVALID_FILTER
//! - ORM_INVALID_RANGE
//!
//! Every planning error is raised before any host call.

use thiserror::Error;

use crate::filter::FilterError;
use crate::index::IndexError;

/// Result type for planning
pub type PlanningResult<T> = Result<T, PlanningError>;

/// Unsupported predicate/index combinations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("unknown index '{index}' on table '{table}'")]
    UnknownIndex { table: String, index: String },

    #[error("index '{index}' cannot serve '{field}': leading fields {missing:?} are not bound by equality")]
    NonLeadingRange {
        index: String,
        field: String,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Range(#[from] IndexError),
}

impl PlanningError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            PlanningError::UnknownIndex { .. } => "ORM_UNKNOWN_INDEX",
            PlanningError::NonLeadingRange { .. } => "ORM_NON_LEADING_RANGE",
            PlanningError::Filter(_) => "ORM_INVALID_FILTER",
            PlanningError::Range(_) => "ORM_INVALID_RANGE",
        }
    }
}
