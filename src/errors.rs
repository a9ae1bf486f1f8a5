//! Engine error taxonomy
//!
//! Every failure surfaces as an `EngineError`. Subsystem errors convert
//! with `?`; `kind()` groups them the way callers react to them:
//!
//! - Planning: the predicate/index combination cannot be planned
//! - Guardrail: a safety limit or opt-in requirement was hit
//! - Composition: mutually exclusive options or misuse of the API
//! - Host: a storage/scheduler/search capability failed
//! - NotFound: `find_first_or_throw` matched nothing
//!
//! Guardrail and composition errors are raised before any host call.

use std::fmt;

use thiserror::Error;

use crate::filter::FilterError;
use crate::planner::PlanningError;
use crate::schema::SchemaError;
use crate::store::HostError;
use crate::stream::{CursorError, StreamError};

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Planning,
    Guardrail,
    Composition,
    Host,
    NotFound,
    Schema,
    Stream,
    Cursor,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Planning => "planning",
            ErrorKind::Guardrail => "guardrail",
            ErrorKind::Composition => "composition",
            ErrorKind::Host => "host",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Schema => "schema",
            ErrorKind::Stream => "stream",
            ErrorKind::Cursor => "cursor",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A safety limit or explicit opt-in requirement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardrailError {
    #[error("findMany on '{table}' has no limit, cursor or allowFullScan and no defaultLimit is configured")]
    UnsizedQuery { table: String },

    #[error("query on '{table}' requires allowFullScan: {reason}")]
    FullScanRequired { table: String, reason: String },

    #[error("'{table}' plan has {probes} disjoint probes and cannot be paginated")]
    MultiProbePagination { table: String, probes: usize },

    #[error("mutation on '{table}' exceeds mutationMaxRows ({max})")]
    MutationTooLarge { table: String, max: usize },

    #[error("relation '{relation}' needs {keys} distinct keys, above relationFanOutMaxKeys ({max})")]
    FanOutExceeded {
        relation: String,
        keys: usize,
        max: usize,
    },

    #[error("relation '{relation}' matched more than relationMaxRows ({max}) rows")]
    RelationTooLarge { relation: String, max: usize },

    #[error("relation '{relation}' has no index on its target columns")]
    MissingRelationIndex { relation: String },

    #[error("relation nesting deeper than relationMaxDepth ({max})")]
    RelationDepthExceeded { max: usize },

    #[error("{provider} cannot be combined with {option}")]
    SearchIncompatible {
        provider: &'static str,
        option: &'static str,
    },

    #[error("vectorSearch limit must be within 1..=256, got {limit}")]
    VectorLimitOutOfRange { limit: usize },

    #[error("ordering '{table}' by '{field}' is not served by the selected index and requires allowFullScan")]
    UnindexedOrder { table: String, field: String },

    #[error("on-conflict target {columns:?} on '{table}' is not covered by an index")]
    ConflictTargetNotIndexed { table: String, columns: Vec<String> },

    #[error("cannot delete from '{table}': rows in '{dependent}' still reference it")]
    RestrictViolation { table: String, dependent: String },
}

impl GuardrailError {
    pub fn code(&self) -> &'static str {
        match self {
            GuardrailError::UnsizedQuery { .. } => "ORM_UNSIZED_QUERY",
            GuardrailError::FullScanRequired { .. } => "ORM_FULL_SCAN_REQUIRED",
            GuardrailError::MultiProbePagination { .. } => "ORM_MULTI_PROBE_PAGINATION",
            GuardrailError::MutationTooLarge { .. } => "ORM_MUTATION_TOO_LARGE",
            GuardrailError::FanOutExceeded { .. } => "ORM_FAN_OUT_EXCEEDED",
            GuardrailError::RelationTooLarge { .. } => "ORM_RELATION_TOO_LARGE",
            GuardrailError::MissingRelationIndex { .. } => "ORM_MISSING_RELATION_INDEX",
            GuardrailError::RelationDepthExceeded { .. } => "ORM_RELATION_DEPTH",
            GuardrailError::SearchIncompatible { .. } => "ORM_SEARCH_INCOMPATIBLE",
            GuardrailError::VectorLimitOutOfRange { .. } => "ORM_VECTOR_LIMIT",
            GuardrailError::UnindexedOrder { .. } => "ORM_UNINDEXED_ORDER",
            GuardrailError::ConflictTargetNotIndexed { .. } => "ORM_CONFLICT_TARGET",
            GuardrailError::RestrictViolation { .. } => "ORM_RESTRICT_VIOLATION",
        }
    }
}

/// Mutually exclusive options and unusable inputs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("scheduled deletes cannot run through executeAsync")]
    ScheduledAsync,

    #[error("search filter '{field}' conflicts with the where clause")]
    SearchFilterConflict { field: String },

    #[error("a predicate where clause cannot be carried by an async continuation")]
    PredicateNotSerializable,

    #[error("{operation} requires a scheduler")]
    SchedulerRequired { operation: &'static str },

    #[error("search requires a search provider")]
    SearchProviderRequired,

    #[error("{operation} requires a document writer")]
    WriterRequired { operation: &'static str },

    #[error("invalid continuation payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("conflicting options: {reason}")]
    ConflictingOptions { reason: String },
}

impl CompositionError {
    pub fn code(&self) -> &'static str {
        match self {
            CompositionError::ScheduledAsync => "ORM_SCHEDULED_ASYNC",
            CompositionError::SearchFilterConflict { .. } => "ORM_SEARCH_FILTER_CONFLICT",
            CompositionError::PredicateNotSerializable => "ORM_PREDICATE_NOT_SERIALIZABLE",
            CompositionError::SchedulerRequired { .. } => "ORM_SCHEDULER_REQUIRED",
            CompositionError::SearchProviderRequired => "ORM_SEARCH_PROVIDER_REQUIRED",
            CompositionError::WriterRequired { .. } => "ORM_WRITER_REQUIRED",
            CompositionError::InvalidPayload { .. } => "ORM_INVALID_PAYLOAD",
            CompositionError::ConflictingOptions { .. } => "ORM_CONFLICTING_OPTIONS",
        }
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        CompositionError::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn conflicting(reason: impl Into<String>) -> Self {
        CompositionError::ConflictingOptions {
            reason: reason.into(),
        }
    }
}

/// Top-level engine error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("no row in '{table}' matched")]
    NotFound { table: String },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Planning(_) => ErrorKind::Planning,
            EngineError::Guardrail(_) => ErrorKind::Guardrail,
            EngineError::Composition(_) => ErrorKind::Composition,
            EngineError::Stream(e) if e.is_misuse() => ErrorKind::Composition,
            EngineError::Stream(StreamError::RowReadLimitExceeded { .. }) => ErrorKind::Guardrail,
            EngineError::Stream(_) => ErrorKind::Stream,
            EngineError::Cursor(_) => ErrorKind::Cursor,
            EngineError::Host(_) => ErrorKind::Host,
            EngineError::Schema(_) => ErrorKind::Schema,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Planning(e) => e.code(),
            EngineError::Guardrail(e) => e.code(),
            EngineError::Composition(e) => e.code(),
            EngineError::Stream(e) => e.code(),
            EngineError::Cursor(e) => e.code(),
            EngineError::Host(_) => "ORM_HOST_ERROR",
            EngineError::Schema(_) => "ORM_SCHEMA_ERROR",
            EngineError::NotFound { .. } => "ORM_NOT_FOUND",
        }
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        EngineError::NotFound {
            table: table.into(),
        }
    }
}

impl From<FilterError> for EngineError {
    fn from(err: FilterError) -> Self {
        EngineError::Planning(PlanningError::Filter(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err: EngineError = GuardrailError::UnsizedQuery {
            table: "posts".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Guardrail);
        assert_eq!(err.code(), "ORM_UNSIZED_QUERY");

        let err: EngineError = StreamError::OrderAlreadySet.into();
        assert_eq!(err.kind(), ErrorKind::Composition);

        let err: EngineError = StreamError::RowReadLimitExceeded { limit: 5 }.into();
        assert_eq!(err.kind(), ErrorKind::Guardrail);

        let err: EngineError = StreamError::NotUnique.into();
        assert_eq!(err.kind(), ErrorKind::Stream);

        let err: EngineError = FilterError::EmptyLogical { op: "AND" }.into();
        assert_eq!(err.kind(), ErrorKind::Planning);

        assert_eq!(EngineError::not_found("users").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_messages_name_the_limit() {
        let err = GuardrailError::FanOutExceeded {
            relation: "users.posts".into(),
            keys: 1200,
            max: 1000,
        };
        let text = err.to_string();
        assert!(text.contains("1200"));
        assert!(text.contains("relationFanOutMaxKeys"));
    }
}
