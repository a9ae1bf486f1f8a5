//! In-memory host
//!
//! A complete reference implementation of the host traits, used by the
//! test suites and by embedders that want the engine without a backend.
//! Every declared index is maintained eagerly on write.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::index::IndexKey;
use crate::schema::{Schema, TableSchema};

use super::document::Document;
use super::errors::{HostError, HostResult};
use super::index_tree::IndexTree;
use super::{
    DocumentReader, DocumentWriter, ScanBatch, ScanEntry, ScanRequest, SearchProvider, VectorHit,
};

#[derive(Debug)]
struct MemoryIndex {
    name: String,
    fields: Vec<String>,
    tree: IndexTree,
}

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    docs: HashMap<String, Document>,
    indexes: Vec<MemoryIndex>,
}

impl MemoryTable {
    fn new(schema: &TableSchema) -> Self {
        let indexes = schema
            .indexes
            .iter()
            .map(|i| MemoryIndex {
                name: i.name.clone(),
                fields: i.effective_fields(),
                tree: IndexTree::new(),
            })
            .collect();
        Self {
            schema: schema.clone(),
            docs: HashMap::new(),
            indexes,
        }
    }

    fn index_doc(&mut self, doc: &Document) {
        for index in &mut self.indexes {
            index.tree.insert(doc.position(&index.fields));
        }
    }

    fn unindex_doc(&mut self, doc: &Document) {
        for index in &mut self.indexes {
            index.tree.remove(&doc.position(&index.fields));
        }
    }

    fn take(&mut self, id: &str) -> HostResult<Document> {
        let doc = self
            .docs
            .remove(id)
            .ok_or_else(|| HostError::DocumentNotFound {
                table: self.schema.name.clone(),
                id: id.to_string(),
            })?;
        self.unindex_doc(&doc);
        Ok(doc)
    }

    fn put(&mut self, doc: Document) {
        self.index_doc(&doc);
        self.docs.insert(doc.id().to_string(), doc);
    }
}

/// Counters describing host traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub scan_calls: u64,
    pub rows_scanned: u64,
    pub point_reads: u64,
}

/// In-memory document store
#[derive(Debug)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, MemoryTable>>,
    last_creation_time: Cell<f64>,
    scan_calls: Cell<u64>,
    rows_scanned: Cell<u64>,
    point_reads: Cell<u64>,
}

impl MemoryStore {
    /// Creates an empty store with one table per schema table.
    pub fn new(schema: &Schema) -> Self {
        let tables = schema
            .tables()
            .into_iter()
            .map(|t| (t.name.clone(), MemoryTable::new(t)))
            .collect();
        Self {
            tables: RefCell::new(tables),
            last_creation_time: Cell::new(0.0),
            scan_calls: Cell::new(0),
            rows_scanned: Cell::new(0),
            point_reads: Cell::new(0),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            scan_calls: self.scan_calls.get(),
            rows_scanned: self.rows_scanned.get(),
            point_reads: self.point_reads.get(),
        }
    }

    pub fn reset_stats(&self) {
        self.scan_calls.set(0);
        self.rows_scanned.set(0);
        self.point_reads.set(0);
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables
            .borrow()
            .get(table)
            .map_or(0, |t| t.docs.len())
    }

    /// Every document of a table in creation order
    pub fn all(&self, table: &str) -> Vec<Document> {
        let tables = self.tables.borrow();
        let mut docs: Vec<Document> = tables
            .get(table)
            .map(|t| t.docs.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| {
            a.creation_time()
                .total_cmp(&b.creation_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        docs
    }

    /// Strictly increasing creation time in milliseconds
    fn next_creation_time(&self) -> f64 {
        let now = Utc::now().timestamp_millis() as f64;
        let next = now.max(self.last_creation_time.get() + 1.0);
        self.last_creation_time.set(next);
        next
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut MemoryTable) -> HostResult<R>,
    ) -> HostResult<R> {
        let mut tables = self.tables.borrow_mut();
        let t = tables.get_mut(table).ok_or_else(|| HostError::UnknownTable {
            table: table.to_string(),
        })?;
        f(t)
    }

    fn matches_filters(doc: &Document, filters: &[(String, Value)]) -> bool {
        filters
            .iter()
            .all(|(field, value)| IndexKey::from_field(doc.get(field)) == IndexKey::from_json(value))
    }
}

impl DocumentReader for MemoryStore {
    fn get(&self, table: &str, id: &str) -> HostResult<Option<Document>> {
        self.point_reads.set(self.point_reads.get() + 1);
        let tables = self.tables.borrow();
        let t = tables.get(table).ok_or_else(|| HostError::UnknownTable {
            table: table.to_string(),
        })?;
        Ok(t.docs.get(id).cloned())
    }

    fn scan(&self, request: &ScanRequest) -> HostResult<ScanBatch> {
        let tables = self.tables.borrow();
        let t = tables
            .get(&request.table)
            .ok_or_else(|| HostError::UnknownTable {
                table: request.table.clone(),
            })?;
        let index = t
            .indexes
            .iter()
            .find(|i| i.name == request.index)
            .ok_or_else(|| HostError::UnknownIndex {
                table: request.table.clone(),
                index: request.index.clone(),
            })?;

        let (positions, exhausted) = index.tree.scan(
            &request.range,
            request.order,
            request.start_after.as_ref(),
            request.end_at.as_ref(),
            request.limit,
        );

        let mut entries = Vec::with_capacity(positions.len());
        for position in positions {
            let document = t.docs.get(&position.id).cloned().ok_or_else(|| {
                HostError::Other(format!("index '{}' points at missing '{}'", index.name, position.id))
            })?;
            entries.push(ScanEntry { position, document });
        }

        self.scan_calls.set(self.scan_calls.get() + 1);
        self.rows_scanned
            .set(self.rows_scanned.get() + entries.len() as u64);
        Ok(ScanBatch { entries, exhausted })
    }
}

impl DocumentWriter for MemoryStore {
    fn insert(&self, table: &str, body: Map<String, Value>) -> HostResult<String> {
        let creation_time = self.next_creation_time();
        self.with_table(table, |t| {
            let id = Uuid::new_v4().simple().to_string();
            t.put(Document::new(id.clone(), creation_time, body));
            Ok(id)
        })
    }

    fn patch(&self, table: &str, id: &str, patch: &Map<String, Value>) -> HostResult<()> {
        self.with_table(table, |t| {
            let mut doc = t.take(id)?;
            doc.apply_patch(patch);
            t.put(doc);
            Ok(())
        })
    }

    fn replace(&self, table: &str, id: &str, body: Map<String, Value>) -> HostResult<()> {
        self.with_table(table, |t| {
            let old = t.take(id)?;
            t.put(Document::new(old.id(), old.creation_time(), body));
            Ok(())
        })
    }

    fn delete(&self, table: &str, id: &str) -> HostResult<()> {
        self.with_table(table, |t| t.take(id).map(|_| ()))
    }
}

impl SearchProvider for MemoryStore {
    /// Scores documents by the number of query terms their search field contains.
    fn search(
        &self,
        table: &str,
        index: &str,
        query: &str,
        filters: &[(String, Value)],
        limit: usize,
    ) -> HostResult<Vec<Document>> {
        let tables = self.tables.borrow();
        let t = tables.get(table).ok_or_else(|| HostError::UnknownTable {
            table: table.to_string(),
        })?;
        let descriptor = t
            .schema
            .search_index(index)
            .ok_or_else(|| HostError::UnknownIndex {
                table: table.to_string(),
                index: index.to_string(),
            })?;

        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let mut scored: Vec<(usize, &Document)> = t
            .docs
            .values()
            .filter(|doc| Self::matches_filters(doc, filters))
            .filter_map(|doc| {
                let text = doc.get(&descriptor.search_field)?.as_str()?.to_lowercase();
                let words: Vec<&str> = text.split_whitespace().collect();
                let score = terms.iter().filter(|t| words.contains(&t.as_str())).count();
                (score > 0).then_some((score, doc))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then_with(|| a.creation_time().total_cmp(&b.creation_time()))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    /// Ranks documents by cosine similarity.
    fn vector_search(
        &self,
        table: &str,
        index: &str,
        vector: &[f64],
        limit: usize,
        filters: &[(String, Value)],
    ) -> HostResult<Vec<VectorHit>> {
        let tables = self.tables.borrow();
        let t = tables.get(table).ok_or_else(|| HostError::UnknownTable {
            table: table.to_string(),
        })?;
        let descriptor = t
            .schema
            .vector_index(index)
            .ok_or_else(|| HostError::UnknownIndex {
                table: table.to_string(),
                index: index.to_string(),
            })?;
        if vector.len() != descriptor.dimensions {
            return Err(HostError::Search(format!(
                "expected {} dimensions, got {}",
                descriptor.dimensions,
                vector.len()
            )));
        }

        let mut hits: Vec<VectorHit> = t
            .docs
            .values()
            .filter(|doc| Self::matches_filters(doc, filters))
            .filter_map(|doc| {
                let stored: Vec<f64> = doc
                    .get(&descriptor.vector_field)?
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_f64)
                    .collect();
                let score = cosine(&stored, vector)?;
                Some(VectorHit {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document.id().cmp(b.document.id()))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexRangeBuilder;
    use crate::schema::{SchemaBuilder, TableBuilder};
    use crate::store::Order;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .table(
                TableBuilder::new("users")
                    .index("by_status", ["status"])
                    .search_index("search_bio", "bio", ["status"])
                    .vector_index("by_embedding", "embedding", 2, Vec::<String>::new()),
            )
            .build()
            .unwrap()
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn scan(store: &MemoryStore, status: &str, limit: usize) -> ScanBatch {
        let fields = vec!["status".to_string(), "_creationTime".to_string()];
        let range = IndexRangeBuilder::new(&fields)
            .eq("status", &json!(status))
            .unwrap()
            .build();
        store
            .scan(&ScanRequest {
                table: "users".into(),
                index: "by_status".into(),
                range,
                order: Order::Asc,
                start_after: None,
                end_at: None,
                limit,
            })
            .unwrap()
    }

    #[test]
    fn test_insert_get_and_index() {
        let store = MemoryStore::new(&schema());
        let id = store.insert("users", body(json!({"status": "draft"}))).unwrap();
        let doc = store.get("users", &id).unwrap().unwrap();
        assert_eq!(doc.get("status"), Some(&json!("draft")));
        assert_eq!(scan(&store, "draft", 10).entries.len(), 1);
    }

    #[test]
    fn test_creation_time_strictly_increases() {
        let store = MemoryStore::new(&schema());
        for _ in 0..5 {
            store.insert("users", Map::new()).unwrap();
        }
        let docs = store.all("users");
        for pair in docs.windows(2) {
            assert!(pair[0].creation_time() < pair[1].creation_time());
        }
    }

    #[test]
    fn test_patch_reindexes() {
        let store = MemoryStore::new(&schema());
        let id = store.insert("users", body(json!({"status": "draft"}))).unwrap();
        store.patch("users", &id, &body(json!({"status": "live"}))).unwrap();
        assert!(scan(&store, "draft", 10).entries.is_empty());
        assert_eq!(scan(&store, "live", 10).entries.len(), 1);
    }

    #[test]
    fn test_delete_unindexes() {
        let store = MemoryStore::new(&schema());
        let id = store.insert("users", body(json!({"status": "draft"}))).unwrap();
        store.delete("users", &id).unwrap();
        assert!(scan(&store, "draft", 10).entries.is_empty());
        assert!(store.get("users", &id).unwrap().is_none());
        assert!(matches!(
            store.delete("users", &id),
            Err(HostError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_scan_counts_rows() {
        let store = MemoryStore::new(&schema());
        for _ in 0..3 {
            store.insert("users", body(json!({"status": "draft"}))).unwrap();
        }
        let batch = scan(&store, "draft", 2);
        assert_eq!(batch.entries.len(), 2);
        assert!(!batch.exhausted);
        assert_eq!(store.stats().rows_scanned, 2);
        assert_eq!(store.stats().scan_calls, 1);
    }

    #[test]
    fn test_search_scores_terms() {
        let store = MemoryStore::new(&schema());
        store
            .insert("users", body(json!({"bio": "rust systems engineer", "status": "a"})))
            .unwrap();
        store
            .insert("users", body(json!({"bio": "rust", "status": "b"})))
            .unwrap();
        let hits = store.search("users", "search_bio", "rust systems", &[], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].get("status"), Some(&json!("a")));

        let filtered = store
            .search("users", "search_bio", "rust", &[("status".into(), json!("b"))], 10)
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_vector_search_ranks_by_cosine() {
        let store = MemoryStore::new(&schema());
        store.insert("users", body(json!({"embedding": [1.0, 0.0], "n": 1}))).unwrap();
        store.insert("users", body(json!({"embedding": [0.0, 1.0], "n": 2}))).unwrap();
        let hits = store.vector_search("users", "by_embedding", &[0.9, 0.1], 1, &[]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.get("n"), Some(&json!(1)));
    }
}
