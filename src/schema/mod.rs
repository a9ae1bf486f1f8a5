//! Schema subsystem
//!
//! One immutable `Schema` is built at startup and passed explicitly to
//! every call. There is no global registry.
//!
//! - Tables carry their ordered indexes; `by_id` and `by_creation_time`
//!   are registered implicitly before declared indexes
//! - Relations live in an arena keyed by `(table, alias)`
//! - `EngineConfig` carries every limit the executors enforce

mod builder;
mod config;
mod errors;
mod loader;
mod relations;
mod types;

use std::collections::HashMap;

pub use builder::{RelationDefinition, RelationShape, SchemaBuilder, TableBuilder};
pub use config::{EngineConfig, ExecutionMode};
pub use errors::{SchemaError, SchemaResult};
pub use loader::{SchemaDefinition, SchemaLoader, TableDefinition};
pub use relations::{
    ForeignKeyAction, RelationArena, RelationEdge, RelationId, RelationKind, ThroughSpec,
};
pub use types::{
    DeleteMode, IndexDescriptor, SearchIndexDescriptor, TableSchema, VectorIndexDescriptor,
    BY_CREATION_TIME_INDEX, BY_ID_INDEX,
};

/// Immutable schema: tables, relations and engine configuration
#[derive(Debug, Clone)]
pub struct Schema {
    tables: HashMap<String, TableSchema>,
    relations: RelationArena,
    config: EngineConfig,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn table(&self, name: &str) -> SchemaResult<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::unknown_table(name))
    }

    /// Tables sorted by name
    pub fn tables(&self) -> Vec<&TableSchema> {
        let mut tables: Vec<&TableSchema> = self.tables.values().collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    pub fn relations(&self) -> &RelationArena {
        &self.relations
    }

    pub fn relation(&self, table: &str, alias: &str) -> SchemaResult<&RelationEdge> {
        self.relations
            .edge(table, alias)
            .ok_or_else(|| SchemaError::UnknownRelation {
                table: table.to_string(),
                alias: alias.to_string(),
            })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
