//! Schema loader
//!
//! Reads a JSON schema definition from disk or from a string:
//!
//! ```text
//! {
//!   "config":    { "defaultLimit": 100, ... },
//!   "tables":    [ { "name": "users", "indexes": [ { "name": "by_status", "fields": ["status"] } ] } ],
//!   "relations": [ { "table": "users", "alias": "posts", "kind": "many", "target": "posts",
//!                    "from": ["_id"], "to": ["authorId"] } ]
//! }
//! ```
//!
//! Missing or malformed files fail the load; nothing is partially registered.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::builder::{RelationDefinition, SchemaBuilder, TableBuilder};
use super::config::EngineConfig;
use super::errors::{SchemaError, SchemaResult};
use super::types::{DeleteMode, IndexDescriptor, SearchIndexDescriptor, VectorIndexDescriptor};
use super::Schema;

/// One table in a schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
    #[serde(default)]
    pub search_indexes: Vec<SearchIndexDescriptor>,
    #[serde(default)]
    pub vector_indexes: Vec<VectorIndexDescriptor>,
    #[serde(default)]
    pub default_delete_mode: DeleteMode,
}

/// A complete schema document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDefinition {
    pub config: EngineConfig,
    pub tables: Vec<TableDefinition>,
    pub relations: Vec<RelationDefinition>,
}

impl SchemaDefinition {
    /// Converts the definition into a builder
    pub fn into_builder(self) -> SchemaBuilder {
        let mut builder = SchemaBuilder::new().config(self.config);
        for table in self.tables {
            let mut tb = TableBuilder::new(table.name).default_delete_mode(table.default_delete_mode);
            if let Some(columns) = table.columns {
                tb = tb.columns(columns);
            }
            for index in table.indexes {
                tb = tb.index(index.name, index.fields);
            }
            for search in table.search_indexes {
                tb = tb.search_index(search.name, search.search_field, search.filter_fields);
            }
            for vector in table.vector_indexes {
                tb = tb.vector_index(
                    vector.name,
                    vector.vector_field,
                    vector.dimensions,
                    vector.filter_fields,
                );
            }
            builder = builder.table(tb);
        }
        for relation in self.relations {
            builder = builder.relation(relation);
        }
        builder
    }
}

/// Loads schema definitions
pub struct SchemaLoader;

impl SchemaLoader {
    /// Loads and builds a schema from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> SchemaResult<Schema> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Loads and builds a schema from JSON text.
    pub fn from_json_str(text: &str) -> SchemaResult<Schema> {
        Self::parse(text, "<in-memory>")
    }

    fn parse(text: &str, source_name: &str) -> SchemaResult<Schema> {
        let definition: SchemaDefinition =
            serde_json::from_str(text).map_err(|e| SchemaError::Malformed {
                source_name: source_name.to_string(),
                reason: format!("Invalid JSON: {}", e),
            })?;
        definition.into_builder().build()
    }
}
