//! Stored documents
//!
//! A document is a JSON object carrying two system fields:
//! - `_id`: unique id within its table
//! - `_creationTime`: monotonically increasing insertion time

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::index::IndexPosition;

/// System field holding the document id
pub const ID_FIELD: &str = "_id";
/// System field holding the creation time
pub const CREATION_TIME_FIELD: &str = "_creationTime";
/// Marker written by soft and scheduled deletes
pub const DELETION_TIME_FIELD: &str = "deletionTime";

/// A document as read from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    body: Map<String, Value>,
}

impl Document {
    /// Creates a document, stamping the system fields into the body.
    pub fn new(id: impl Into<String>, creation_time: f64, mut body: Map<String, Value>) -> Self {
        let id = id.into();
        body.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        body.insert(CREATION_TIME_FIELD.to_string(), Value::from(creation_time));
        Self { id, body }
    }

    /// Rebuilds a document from a body that already carries `_id`.
    pub fn from_body(body: Map<String, Value>) -> Option<Self> {
        let id = body.get(ID_FIELD)?.as_str()?.to_string();
        Some(Self { id, body })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creation_time(&self) -> f64 {
        self.body
            .get(CREATION_TIME_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Field value; missing fields are `None`
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_body(self) -> Map<String, Value> {
        self.body
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Position of this document in an index with the given key fields
    pub fn position(&self, key_fields: &[String]) -> IndexPosition {
        IndexPosition::of(&self.body, key_fields, &self.id)
    }

    /// Serialized size in bytes, used for batch byte budgets
    pub fn approximate_size(&self) -> usize {
        serde_json::to_vec(&self.body).map(|v| v.len()).unwrap_or(0)
    }

    /// True when a soft/scheduled delete marker is present
    pub fn is_marked_deleted(&self) -> bool {
        self.body
            .get(DELETION_TIME_FIELD)
            .map_or(false, |v| !v.is_null())
    }

    /// Applies a shallow patch. System fields cannot be overwritten.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if key == ID_FIELD || key == CREATION_TIME_FIELD {
                continue;
            }
            self.body.insert(key.clone(), value.clone());
        }
    }
}
