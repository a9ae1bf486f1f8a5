//! Host capabilities
//!
//! The engine never touches storage directly. Everything it needs from the
//! host is expressed by four traits:
//!
//! - `DocumentReader`: point reads and bounded, ordered index scans
//! - `DocumentWriter`: insert/patch/replace/delete by id
//! - `Scheduler`: delayed function invocation for continuations
//! - `SearchProvider`: full-text and vector search
//!
//! Calls are made one at a time from a single thread; the host provides
//! per-invocation isolation. `MemoryStore` and `MemoryScheduler` implement
//! the traits in memory.

mod document;
mod errors;
mod index_tree;
mod memory;
mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::index::{IndexPosition, IndexRange};

pub use document::{Document, CREATION_TIME_FIELD, DELETION_TIME_FIELD, ID_FIELD};
pub use errors::{HostError, HostResult};
pub use index_tree::IndexTree;
pub use memory::{MemoryStore, StoreStats};
pub use scheduler::{MemoryScheduler, ScheduledJob};

/// Scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }

    pub fn reverse(&self) -> Order {
        match self {
            Order::Asc => Order::Desc,
            Order::Desc => Order::Asc,
        }
    }
}

/// One bounded index scan.
///
/// The host returns entries of `range` in `order`, strictly after
/// `start_after` and no further than `end_at` (inclusive), at most `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub index: String,
    pub range: IndexRange,
    pub order: Order,
    pub start_after: Option<IndexPosition>,
    pub end_at: Option<IndexPosition>,
    pub limit: usize,
}

/// An index entry with its document
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub position: IndexPosition,
    pub document: Document,
}

/// Result of one scan call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanBatch {
    pub entries: Vec<ScanEntry>,
    /// No entries remain past the last one returned
    pub exhausted: bool,
}

/// Index-only read access
pub trait DocumentReader {
    fn get(&self, table: &str, id: &str) -> HostResult<Option<Document>>;

    fn scan(&self, request: &ScanRequest) -> HostResult<ScanBatch>;
}

/// Write access by document id
pub trait DocumentWriter {
    /// Inserts a new document and returns its id
    fn insert(&self, table: &str, body: Map<String, Value>) -> HostResult<String>;

    /// Shallow-merges `patch` into the document
    fn patch(&self, table: &str, id: &str, patch: &Map<String, Value>) -> HostResult<()>;

    /// Replaces every non-system field
    fn replace(&self, table: &str, id: &str, body: Map<String, Value>) -> HostResult<()>;

    fn delete(&self, table: &str, id: &str) -> HostResult<()>;
}

/// Delayed function invocation
pub trait Scheduler {
    fn run_after(&self, delay_ms: u64, function: &str, payload: Value) -> HostResult<Uuid>;

    fn run_at(&self, at: DateTime<Utc>, function: &str, payload: Value) -> HostResult<Uuid>;

    fn cancel(&self, job: Uuid) -> HostResult<()>;
}

/// A vector search hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub document: Document,
    pub score: f64,
}

/// Search capabilities. Ranking is the provider's business.
pub trait SearchProvider {
    fn search(
        &self,
        table: &str,
        index: &str,
        query: &str,
        filters: &[(String, Value)],
        limit: usize,
    ) -> HostResult<Vec<Document>>;

    fn vector_search(
        &self,
        table: &str,
        index: &str,
        vector: &[f64],
        limit: usize,
        filters: &[(String, Value)],
    ) -> HostResult<Vec<VectorHit>>;
}
