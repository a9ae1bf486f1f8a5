//! Exact positions inside an index.
//!
//! A position is the tuple of key values for the index's effective fields
//! followed by the document id. Positions are unique per index entry and
//! totally ordered, which is what makes cursors stable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::key::IndexKey;

/// Position of one entry within an index
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexPosition {
    /// Key values, one per effective index field
    pub keys: Vec<IndexKey>,
    /// Document id, the final tie-breaker
    pub id: String,
}

impl IndexPosition {
    pub fn new(keys: Vec<IndexKey>, id: impl Into<String>) -> Self {
        Self {
            keys,
            id: id.into(),
        }
    }

    /// Computes the position of a document body for the given key fields.
    pub fn of(body: &Map<String, Value>, key_fields: &[String], id: &str) -> Self {
        let keys = key_fields
            .iter()
            .map(|field| IndexKey::from_field(body.get(field)))
            .collect();
        Self::new(keys, id)
    }

    /// Lowest possible position sharing the given key prefix.
    ///
    /// Shorter key vectors sort before any extension of themselves, and the
    /// empty id sorts before every real id.
    pub fn seek(prefix: Vec<IndexKey>) -> Self {
        Self::new(prefix, String::new())
    }

    /// JSON rendering of the key values
    pub fn key_values(&self) -> Vec<Value> {
        self.keys.iter().map(IndexKey::to_json).collect()
    }
}
