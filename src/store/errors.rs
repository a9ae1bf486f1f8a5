//! Host errors
//!
//! Failures reported by the document store, scheduler or search provider.
//! The engine propagates them verbatim and never retries.

use thiserror::Error;

/// Result type for host calls
pub type HostResult<T> = Result<T, HostError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host has no table '{table}'")]
    UnknownTable { table: String },

    #[error("host has no index '{index}' on table '{table}'")]
    UnknownIndex { table: String, index: String },

    #[error("document '{id}' not found in '{table}'")]
    DocumentNotFound { table: String, id: String },

    #[error("scheduler failure: {0}")]
    Scheduler(String),

    #[error("search failure: {0}")]
    Search(String),

    #[error("host failure: {0}")]
    Other(String),
}
