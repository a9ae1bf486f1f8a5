//! Schema errors
//!
//! Raised while building or loading a schema. A schema that fails to build
//! is never handed to an executor.

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema construction and lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("table '{table}' is declared twice")]
    DuplicateTable { table: String },

    #[error("index '{index}' is declared twice on table '{table}'")]
    DuplicateIndex { table: String, index: String },

    #[error("index '{index}' on table '{table}' is invalid: {reason}")]
    InvalidIndex {
        table: String,
        index: String,
        reason: String,
    },

    #[error("unknown index '{index}' on table '{table}'")]
    UnknownIndex { table: String, index: String },

    #[error("relation '{alias}' is declared twice on table '{table}'")]
    DuplicateRelation { table: String, alias: String },

    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("unknown relation '{alias}' on table '{table}'")]
    UnknownRelation { table: String, alias: String },

    #[error("relation '{alias}' on table '{table}' is invalid: {reason}")]
    InvalidRelation {
        table: String,
        alias: String,
        reason: String,
    },

    #[error("invalid config field '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("cannot read '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("malformed schema in '{source_name}': {reason}")]
    Malformed { source_name: String, reason: String },
}

impl SchemaError {
    pub fn unknown_table(table: impl Into<String>) -> Self {
        SchemaError::UnknownTable {
            table: table.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_relation(
        table: impl Into<String>,
        alias: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SchemaError::InvalidRelation {
            table: table.into(),
            alias: alias.into(),
            reason: reason.into(),
        }
    }
}
