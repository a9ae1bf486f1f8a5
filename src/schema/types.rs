//! Table and index descriptors
//!
//! Descriptors are built once at schema-build time and never change for
//! the lifetime of the process.

use serde::{Deserialize, Serialize};

use crate::store::{CREATION_TIME_FIELD, DELETION_TIME_FIELD, ID_FIELD};

/// Implicit index over `_id`
pub const BY_ID_INDEX: &str = "by_id";
/// Implicit index over `_creationTime`, the default scan index
pub const BY_CREATION_TIME_INDEX: &str = "by_creation_time";

/// Ordered index over one or more fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    #[serde(alias = "orderedFields")]
    pub fields: Vec<String>,
}

impl IndexDescriptor {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Fields the host actually orders by.
    ///
    /// Every index is implicitly suffixed with `_creationTime`; `_id` is the
    /// final tie-breaker carried by the position itself.
    pub fn effective_fields(&self) -> Vec<String> {
        let mut fields = self.fields.clone();
        let already_unique = fields.first().map(String::as_str) == Some(ID_FIELD);
        if !already_unique && fields.last().map(String::as_str) != Some(CREATION_TIME_FIELD) {
            fields.push(CREATION_TIME_FIELD.to_string());
        }
        fields
    }

    pub fn leading_field(&self) -> Option<&str> {
        self.fields.first().map(String::as_str)
    }

    /// True when the declared fields start with `columns`
    pub fn covers_prefix(&self, columns: &[String]) -> bool {
        !columns.is_empty()
            && self.fields.len() >= columns.len()
            && self.fields[..columns.len()] == *columns
    }

    pub fn is_system(&self) -> bool {
        self.name == BY_ID_INDEX || self.name == BY_CREATION_TIME_INDEX
    }
}

/// Full-text search index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexDescriptor {
    pub name: String,
    pub search_field: String,
    #[serde(default)]
    pub filter_fields: Vec<String>,
}

/// Vector similarity index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndexDescriptor {
    pub name: String,
    pub vector_field: String,
    pub dimensions: usize,
    #[serde(default)]
    pub filter_fields: Vec<String>,
}

/// How a delete removes rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Physical delete
    #[default]
    Hard,
    /// Sets `deletionTime`, row stays
    Soft,
    /// Sets `deletionTime` now, physical delete after a delay
    Scheduled,
}

impl DeleteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteMode::Hard => "hard",
            DeleteMode::Soft => "soft",
            DeleteMode::Scheduled => "scheduled",
        }
    }
}

/// A table: its columns, indexes and delete policy
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    /// Declared columns. `None` accepts any field.
    pub columns: Option<Vec<String>>,
    /// Indexes in registration order, implicit ones first
    pub indexes: Vec<IndexDescriptor>,
    pub search_indexes: Vec<SearchIndexDescriptor>,
    pub vector_indexes: Vec<VectorIndexDescriptor>,
    pub default_delete_mode: DeleteMode,
}

impl TableSchema {
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// The index scanned when nothing else applies
    pub fn default_index(&self) -> Option<&IndexDescriptor> {
        self.index(BY_CREATION_TIME_INDEX)
    }

    /// First registered index whose declared fields start with `columns`
    pub fn index_covering(&self, columns: &[String]) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.covers_prefix(columns))
    }

    pub fn search_index(&self, name: &str) -> Option<&SearchIndexDescriptor> {
        self.search_indexes.iter().find(|i| i.name == name)
    }

    pub fn vector_index(&self, name: &str) -> Option<&VectorIndexDescriptor> {
        self.vector_indexes.iter().find(|i| i.name == name)
    }

    /// System fields are always present; other fields must be declared when
    /// the table declares columns.
    pub fn has_column(&self, field: &str) -> bool {
        if field == ID_FIELD || field == CREATION_TIME_FIELD || field == DELETION_TIME_FIELD {
            return true;
        }
        match &self.columns {
            Some(columns) => columns.iter().any(|c| c == field),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_fields_append_creation_time() {
        let idx = IndexDescriptor::new("by_status", ["status"]);
        assert_eq!(idx.effective_fields(), vec!["status", "_creationTime"]);

        let idx = IndexDescriptor::new(BY_CREATION_TIME_INDEX, [CREATION_TIME_FIELD]);
        assert_eq!(idx.effective_fields(), vec!["_creationTime"]);

        let idx = IndexDescriptor::new(BY_ID_INDEX, [ID_FIELD]);
        assert_eq!(idx.effective_fields(), vec!["_id"]);
    }

    #[test]
    fn test_covers_prefix() {
        let idx = IndexDescriptor::new("by_a_b", ["a", "b"]);
        assert!(idx.covers_prefix(&["a".to_string()]));
        assert!(idx.covers_prefix(&["a".to_string(), "b".to_string()]));
        assert!(!idx.covers_prefix(&["b".to_string()]));
        assert!(!idx.covers_prefix(&[]));
    }

    #[test]
    fn test_delete_mode_serde() {
        let mode: DeleteMode = serde_json::from_str("\"scheduled\"").unwrap();
        assert_eq!(mode, DeleteMode::Scheduled);
        assert_eq!(DeleteMode::default(), DeleteMode::Hard);
    }
}
