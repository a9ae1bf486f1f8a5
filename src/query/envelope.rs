//! Materialized rows
//!
//! A `RowEnvelope` keeps the raw document next to what the caller asked
//! for: projected columns, computed extras and loaded relations. Relation
//! loading reads join columns from the raw document, so projection never
//! hides them from the loader.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::options::{Columns, Extra};
use crate::store::{Document, ID_FIELD};

/// Loaded relation slot
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Option<Box<RowEnvelope>>),
    Many(Vec<RowEnvelope>),
}

impl RelationValue {
    pub fn to_value(&self) -> Value {
        match self {
            RelationValue::One(Some(row)) => row.to_value(),
            RelationValue::One(None) => Value::Null,
            RelationValue::Many(rows) => Value::Array(rows.iter().map(RowEnvelope::to_value).collect()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RelationValue::One(row) => usize::from(row.is_some()),
            RelationValue::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A returned row
#[derive(Debug, Clone, PartialEq)]
pub struct RowEnvelope {
    document: Document,
    columns: Map<String, Value>,
    extras: Map<String, Value>,
    relations: BTreeMap<String, RelationValue>,
    score: Option<f64>,
}

impl RowEnvelope {
    /// Every column visible
    pub fn new(document: Document) -> Self {
        let columns = document.body().clone();
        Self {
            document,
            columns,
            extras: Map::new(),
            relations: BTreeMap::new(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn id(&self) -> &str {
        self.document.id()
    }

    /// The raw row, ignoring projection
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Projected column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> &Map<String, Value> {
        &self.columns
    }

    pub fn extra(&self, name: &str) -> Option<&Value> {
        self.extras.get(name)
    }

    pub fn relation(&self, alias: &str) -> Option<&RelationValue> {
        self.relations.get(alias)
    }

    /// Related row of a `one` relation
    pub fn one(&self, alias: &str) -> Option<&RowEnvelope> {
        match self.relations.get(alias) {
            Some(RelationValue::One(Some(row))) => Some(row),
            _ => None,
        }
    }

    /// Related rows of a `many` or `through` relation
    pub fn many(&self, alias: &str) -> &[RowEnvelope] {
        match self.relations.get(alias) {
            Some(RelationValue::Many(rows)) => rows,
            _ => &[],
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn set_relation(&mut self, alias: impl Into<String>, value: RelationValue) {
        self.relations.insert(alias.into(), value);
    }

    /// Applies a projection to the visible columns. `_id` always stays.
    pub fn project(&mut self, columns: &Columns) {
        match columns {
            Columns::Include(keep) => {
                self.columns
                    .retain(|name, _| name == ID_FIELD || keep.iter().any(|k| k == name));
            }
            Columns::Exclude(drop) => {
                self.columns
                    .retain(|name, _| name == ID_FIELD || !drop.iter().any(|d| d == name));
            }
        }
    }

    /// Computes extras from the raw row
    pub fn compute_extras(&mut self, extras: &[Extra]) {
        for extra in extras {
            let value = (extra.compute)(&self.document);
            self.extras.insert(extra.name.clone(), value);
        }
    }

    /// Columns, extras and relations as one JSON object.
    ///
    /// Extras and relations shadow columns of the same name.
    pub fn to_value(&self) -> Value {
        let mut out = self.columns.clone();
        for (name, value) in &self.extras {
            out.insert(name.clone(), value.clone());
        }
        for (alias, relation) in &self.relations {
            out.insert(alias.clone(), relation.to_value());
        }
        if let Some(score) = self.score {
            out.insert("_score".to_string(), Value::from(score));
        }
        Value::Object(out)
    }
}

/// Projection and extras, applied after relations are loaded
pub(crate) fn finish_rows(rows: &mut [RowEnvelope], columns: Option<&Columns>, extras: &[Extra]) {
    for row in rows {
        row.compute_extras(extras);
        if let Some(columns) = columns {
            row.project(columns);
        }
    }
}
