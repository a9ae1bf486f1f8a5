//! Programmatic schema construction
//!
//! ```ignore
//! let schema = SchemaBuilder::new()
//!     .table(TableBuilder::new("users").index("by_status", ["status"]))
//!     .table(TableBuilder::new("posts").index("by_author", ["authorId"]))
//!     .relation(RelationDefinition::many("users", "posts", "posts", ["_id"], ["authorId"]))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::errors::{SchemaError, SchemaResult};
use super::relations::{ForeignKeyAction, RelationArena, RelationEdge, RelationKind, ThroughSpec};
use super::types::{
    DeleteMode, IndexDescriptor, SearchIndexDescriptor, TableSchema, VectorIndexDescriptor,
    BY_CREATION_TIME_INDEX, BY_ID_INDEX,
};
use super::Schema;
use crate::store::{CREATION_TIME_FIELD, ID_FIELD};

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Builder for one table
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Option<Vec<String>>,
    indexes: Vec<IndexDescriptor>,
    search_indexes: Vec<SearchIndexDescriptor>,
    vector_indexes: Vec<VectorIndexDescriptor>,
    default_delete_mode: DeleteMode,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: None,
            indexes: Vec::new(),
            search_indexes: Vec::new(),
            vector_indexes: Vec::new(),
            default_delete_mode: DeleteMode::Hard,
        }
    }

    /// Declares the table's columns; filters on other fields are rejected.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(strings(columns));
        self
    }

    pub fn index<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDescriptor::new(name, fields));
        self
    }

    pub fn search_index<I, S>(mut self, name: impl Into<String>, search_field: impl Into<String>, filter_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_indexes.push(SearchIndexDescriptor {
            name: name.into(),
            search_field: search_field.into(),
            filter_fields: strings(filter_fields),
        });
        self
    }

    pub fn vector_index<I, S>(
        mut self,
        name: impl Into<String>,
        vector_field: impl Into<String>,
        dimensions: usize,
        filter_fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vector_indexes.push(VectorIndexDescriptor {
            name: name.into(),
            vector_field: vector_field.into(),
            dimensions,
            filter_fields: strings(filter_fields),
        });
        self
    }

    pub fn default_delete_mode(mut self, mode: DeleteMode) -> Self {
        self.default_delete_mode = mode;
        self
    }

    /// Validates the declared indexes and registers the implicit ones first.
    pub fn build(self) -> SchemaResult<TableSchema> {
        let mut indexes = vec![
            IndexDescriptor::new(BY_ID_INDEX, [ID_FIELD]),
            IndexDescriptor::new(BY_CREATION_TIME_INDEX, [CREATION_TIME_FIELD]),
        ];
        let mut table = TableSchema {
            name: self.name,
            columns: self.columns,
            indexes: Vec::new(),
            search_indexes: self.search_indexes,
            vector_indexes: self.vector_indexes,
            default_delete_mode: self.default_delete_mode,
        };

        for index in self.indexes {
            let invalid = |reason: &str| SchemaError::InvalidIndex {
                table: table.name.clone(),
                index: index.name.clone(),
                reason: reason.to_string(),
            };
            if indexes.iter().any(|i| i.name == index.name) {
                return Err(SchemaError::DuplicateIndex {
                    table: table.name.clone(),
                    index: index.name.clone(),
                });
            }
            if index.fields.is_empty() {
                return Err(invalid("no fields"));
            }
            let distinct: HashSet<&String> = index.fields.iter().collect();
            if distinct.len() != index.fields.len() {
                return Err(invalid("repeated field"));
            }
            if let Some(field) = index.fields.iter().find(|f| !table.has_column(f)) {
                return Err(invalid(&format!("unknown column '{}'", field)));
            }
            indexes.push(index);
        }

        for search in &table.search_indexes {
            if !table.has_column(&search.search_field) {
                return Err(SchemaError::InvalidIndex {
                    table: table.name.clone(),
                    index: search.name.clone(),
                    reason: format!("unknown search field '{}'", search.search_field),
                });
            }
        }
        for vector in &table.vector_indexes {
            if vector.dimensions == 0 {
                return Err(SchemaError::InvalidIndex {
                    table: table.name.clone(),
                    index: vector.name.clone(),
                    reason: "dimensions must be positive".into(),
                });
            }
        }

        table.indexes = indexes;
        Ok(table)
    }
}

/// Relation shape as written in a schema definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationShape {
    One,
    Many,
    Through,
}

/// Declarative relation, resolved into a `RelationEdge` at build time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDefinition {
    pub table: String,
    pub alias: String,
    pub kind: RelationShape,
    pub target: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub through: Option<ThroughSpec>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
}

impl RelationDefinition {
    fn new<F, T, S1, S2>(
        kind: RelationShape,
        table: &str,
        alias: &str,
        target: &str,
        from: F,
        to: T,
    ) -> Self
    where
        F: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            kind,
            target: target.to_string(),
            from: strings(from),
            to: strings(to),
            through: None,
            index: None,
            on_delete: ForeignKeyAction::NoAction,
        }
    }

    /// Source row references one target row
    pub fn one<F, T, S1, S2>(table: &str, alias: &str, target: &str, from: F, to: T) -> Self
    where
        F: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::new(RelationShape::One, table, alias, target, from, to)
    }

    /// Target rows reference the source row
    pub fn many<F, T, S1, S2>(table: &str, alias: &str, target: &str, from: F, to: T) -> Self
    where
        F: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::new(RelationShape::Many, table, alias, target, from, to)
    }

    /// Source and target are linked by rows of a join table
    pub fn through<F, T, S1, S2>(
        table: &str,
        alias: &str,
        target: &str,
        from: F,
        to: T,
        through: ThroughSpec,
    ) -> Self
    where
        F: IntoIterator<Item = S1>,
        T: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        let mut def = Self::new(RelationShape::Through, table, alias, target, from, to);
        def.through = Some(through);
        def
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// Builder for a complete schema
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableBuilder>,
    relations: Vec<RelationDefinition>,
    config: EngineConfig,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: TableBuilder) -> Self {
        self.tables.push(table);
        self
    }

    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SchemaResult<Schema> {
        self.config.validate()?;

        let mut tables: HashMap<String, TableSchema> = HashMap::new();
        for builder in self.tables {
            let table = builder.build()?;
            if tables.contains_key(&table.name) {
                return Err(SchemaError::DuplicateTable { table: table.name });
            }
            tables.insert(table.name.clone(), table);
        }

        let mut relations = RelationArena::new();
        for def in self.relations {
            let edge = resolve_relation(&tables, def)?;
            relations.insert(edge)?;
        }

        Ok(Schema {
            tables,
            relations,
            config: self.config,
        })
    }
}

fn resolve_relation(
    tables: &HashMap<String, TableSchema>,
    def: RelationDefinition,
) -> SchemaResult<RelationEdge> {
    let invalid = |reason: String| SchemaError::invalid_relation(&def.table, &def.alias, reason);

    let source = tables
        .get(&def.table)
        .ok_or_else(|| SchemaError::unknown_table(&def.table))?;
    let target = tables
        .get(&def.target)
        .ok_or_else(|| SchemaError::unknown_table(&def.target))?;

    if def.from.is_empty() || def.to.is_empty() {
        return Err(invalid("from/to columns must not be empty".into()));
    }
    if let Some(col) = def.from.iter().find(|c| !source.has_column(c)) {
        return Err(invalid(format!("unknown source column '{}'", col)));
    }
    if let Some(col) = def.to.iter().find(|c| !target.has_column(c)) {
        return Err(invalid(format!("unknown target column '{}'", col)));
    }
    if def.on_delete != ForeignKeyAction::NoAction && def.kind != RelationShape::Many {
        return Err(invalid("onDelete is only supported on many relations".into()));
    }

    let required_index = match &def.index {
        Some(name) => {
            let index = target.index(name).ok_or_else(|| SchemaError::UnknownIndex {
                table: target.name.clone(),
                index: name.clone(),
            })?;
            if !index.covers_prefix(&def.to) {
                return Err(invalid(format!(
                    "index '{}' is not led by {:?}",
                    name, def.to
                )));
            }
            Some(name.clone())
        }
        None => target.index_covering(&def.to).map(|i| i.name.clone()),
    };

    let kind = match def.kind {
        RelationShape::One => {
            if def.from.len() != def.to.len() {
                return Err(invalid("from/to column counts differ".into()));
            }
            RelationKind::One
        }
        RelationShape::Many => {
            if def.from.len() != def.to.len() {
                return Err(invalid("from/to column counts differ".into()));
            }
            RelationKind::Many
        }
        RelationShape::Through => {
            let mut spec = def
                .through
                .clone()
                .ok_or_else(|| invalid("through relation needs a join table".into()))?;
            let join = tables
                .get(&spec.table)
                .ok_or_else(|| SchemaError::unknown_table(&spec.table))?;
            if spec.source_columns.len() != def.from.len()
                || spec.target_columns.len() != def.to.len()
            {
                return Err(invalid("join column counts differ".into()));
            }
            spec.index = match &spec.index {
                Some(name) => {
                    let index = join.index(name).ok_or_else(|| SchemaError::UnknownIndex {
                        table: join.name.clone(),
                        index: name.clone(),
                    })?;
                    if !index.covers_prefix(&spec.source_columns) {
                        return Err(invalid(format!(
                            "join index '{}' is not led by {:?}",
                            name, spec.source_columns
                        )));
                    }
                    Some(name.clone())
                }
                None => join
                    .index_covering(&spec.source_columns)
                    .map(|i| i.name.clone()),
            };
            RelationKind::Through(spec)
        }
    };

    Ok(RelationEdge {
        kind,
        source_table: def.table,
        target_table: def.target,
        alias: def.alias,
        from_columns: def.from,
        to_columns: def.to,
        required_index,
        on_delete: def.on_delete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SchemaBuilder {
        SchemaBuilder::new()
            .table(TableBuilder::new("users").index("by_status", ["status"]))
            .table(TableBuilder::new("posts").index("by_author", ["authorId", "published"]))
    }

    #[test]
    fn test_implicit_indexes_registered_first() {
        let schema = base().build().unwrap();
        let users = schema.table("users").unwrap();
        let names: Vec<&str> = users.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["by_id", "by_creation_time", "by_status"]);
    }

    #[test]
    fn test_reserved_index_name_rejected() {
        let err = TableBuilder::new("t").index("by_id", ["x"]).build().unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateIndex { .. }));
    }

    #[test]
    fn test_index_on_undeclared_column_rejected() {
        let err = TableBuilder::new("t")
            .columns(["a"])
            .index("by_b", ["b"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIndex { .. }));
    }

    #[test]
    fn test_relation_index_resolved() {
        let schema = base()
            .relation(RelationDefinition::many("users", "posts", "posts", ["_id"], ["authorId"]))
            .relation(RelationDefinition::one("posts", "author", "users", ["authorId"], ["_id"]))
            .build()
            .unwrap();
        let posts = schema.relation("users", "posts").unwrap();
        assert_eq!(posts.required_index.as_deref(), Some("by_author"));
        let author = schema.relation("posts", "author").unwrap();
        assert_eq!(author.required_index.as_deref(), Some("by_id"));
    }

    #[test]
    fn test_relation_without_index_left_unresolved() {
        let schema = base()
            .relation(RelationDefinition::many("users", "edits", "posts", ["_id"], ["editorId"]))
            .build()
            .unwrap();
        assert!(schema.relation("users", "edits").unwrap().required_index.is_none());
    }

    #[test]
    fn test_explicit_index_must_lead_with_target_columns() {
        let err = base()
            .relation(
                RelationDefinition::many("users", "posts", "posts", ["_id"], ["published"])
                    .with_index("by_author"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRelation { .. }));
    }

    #[test]
    fn test_on_delete_only_on_many() {
        let err = base()
            .relation(
                RelationDefinition::one("posts", "author", "users", ["authorId"], ["_id"])
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRelation { .. }));
    }
}
