//! Stream cursors
//!
//! A cursor mirrors the shape of the pipeline that produced it: one scan
//! position per index scan, a list for merges, the last emitted key for
//! distinct stages and an outer/inner pair for flat maps. Cursors travel
//! as opaque strings: base64url (no padding) of their JSON form.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::errors::CursorError;
use crate::index::{IndexKey, IndexPosition};

/// Progress of one index scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", content = "pos", rename_all = "lowercase")]
pub enum ScanPosition {
    /// Nothing consumed yet
    Start,
    /// Everything up to and including this entry consumed
    After(IndexPosition),
    /// Scan finished
    End,
}

/// Serializable position of a whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "k", rename_all = "camelCase")]
pub enum StreamCursor {
    Scan { position: ScanPosition },
    Merge { branches: Vec<StreamCursor> },
    Distinct {
        inner: Box<StreamCursor>,
        last: Option<Vec<IndexKey>>,
    },
    Nested {
        outer: Box<StreamCursor>,
        inner: Option<Box<StreamCursor>>,
    },
}

impl StreamCursor {
    pub fn scan(position: ScanPosition) -> Self {
        StreamCursor::Scan { position }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamCursor::Scan { .. } => "scan",
            StreamCursor::Merge { .. } => "merge",
            StreamCursor::Distinct { .. } => "distinct",
            StreamCursor::Nested { .. } => "nested",
        }
    }

    /// Error for a cursor handed to a pipeline of a different shape
    pub fn mismatch(&self, expected: &'static str) -> CursorError {
        CursorError::ShapeMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn encode(&self) -> String {
        // serializing plain enums of strings and keys cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(text: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| CursorError::Decode {
                reason: e.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| CursorError::Decode {
            reason: e.to_string(),
        })
    }
}
