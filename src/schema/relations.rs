//! Relation graph
//!
//! Relation edges live in a flat arena keyed by `(table, alias)`. Edges
//! refer to tables by name, never by pointer, so self-referential and
//! cyclic graphs (a tree node with `parent`/`left`/`right` pointing back
//! at its own table) need no cyclic object graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};

/// Join table used by a `through` relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughSpec {
    pub table: String,
    /// Join-table columns matching the parent's `from_columns`
    pub source_columns: Vec<String>,
    /// Join-table columns matching the target's `to_columns`
    pub target_columns: Vec<String>,
    /// Index on the join table led by `source_columns`
    #[serde(default)]
    pub index: Option<String>,
}

/// Shape of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    One,
    Many,
    Through(ThroughSpec),
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::One => "one",
            RelationKind::Many => "many",
            RelationKind::Through(_) => "through",
        }
    }
}

/// What happens to related rows when a parent is hard-deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

/// A resolved relation edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEdge {
    pub kind: RelationKind,
    pub source_table: String,
    pub target_table: String,
    pub alias: String,
    /// Columns on the source row
    pub from_columns: Vec<String>,
    /// Columns on the target row matched against `from_columns`
    pub to_columns: Vec<String>,
    /// Target index led by `to_columns`; `None` when the schema has none
    pub required_index: Option<String>,
    pub on_delete: ForeignKeyAction,
}

impl RelationEdge {
    /// True when the target side is the primary key
    pub fn targets_primary_key(&self) -> bool {
        self.to_columns.len() == 1 && self.to_columns[0] == crate::store::ID_FIELD
    }

    pub fn through(&self) -> Option<&ThroughSpec> {
        match &self.kind {
            RelationKind::Through(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Stable handle to an edge in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(usize);

/// Flat storage for relation edges
#[derive(Debug, Clone, Default)]
pub struct RelationArena {
    edges: Vec<RelationEdge>,
    by_key: HashMap<(String, String), RelationId>,
}

impl RelationArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge: RelationEdge) -> SchemaResult<RelationId> {
        let key = (edge.source_table.clone(), edge.alias.clone());
        if self.by_key.contains_key(&key) {
            return Err(SchemaError::DuplicateRelation {
                table: key.0,
                alias: key.1,
            });
        }
        let id = RelationId(self.edges.len());
        self.edges.push(edge);
        self.by_key.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: RelationId) -> &RelationEdge {
        &self.edges[id.0]
    }

    pub fn lookup(&self, table: &str, alias: &str) -> Option<RelationId> {
        self.by_key
            .get(&(table.to_string(), alias.to_string()))
            .copied()
    }

    pub fn edge(&self, table: &str, alias: &str) -> Option<&RelationEdge> {
        self.lookup(table, alias).map(|id| self.get(id))
    }

    /// Edges declared on `table`, in declaration order
    pub fn edges_from<'s>(&'s self, table: &'s str) -> impl Iterator<Item = &'s RelationEdge> + 's {
        self.edges.iter().filter(move |e| e.source_table == table)
    }

    /// `many` edges from `table` carrying a foreign-key action
    pub fn dependents<'s>(&'s self, table: &'s str) -> impl Iterator<Item = &'s RelationEdge> + 's {
        self.edges_from(table).filter(|e| {
            e.kind == RelationKind::Many && e.on_delete != ForeignKeyAction::NoAction
        })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
