//! Rows and plans shared by the stream tests

use serde_json::{json, Value};

use super::StreamOptions;
use crate::filter::FilterExpression;
use crate::planner::{IndexPlan, WhereClauseCompiler};
use crate::schema::{Schema, TableBuilder};
use crate::store::{Document, DocumentWriter, MemoryStore};

/// `items` (status, rank, author) and `authors` (name)
pub(crate) fn schema() -> Schema {
    Schema::builder()
        .table(
            TableBuilder::new("items")
                .index("by_status", ["status"])
                .index("by_rank", ["rank"])
                .index("by_author", ["author"]),
        )
        .table(TableBuilder::new("authors"))
        .build()
        .unwrap()
}

pub(crate) fn items(store: &MemoryStore, rows: &[(&str, i64, &str)]) {
    for (status, rank, author) in rows {
        let body = json!({"status": status, "rank": rank, "author": author});
        store.insert("items", body.as_object().cloned().unwrap()).unwrap();
    }
}

pub(crate) fn authors(store: &MemoryStore, names: &[&str]) {
    for name in names {
        let body = json!({"name": name});
        store.insert("authors", body.as_object().cloned().unwrap()).unwrap();
    }
}

/// Ranks 0..n, all `draft`, in insertion order
pub(crate) fn ranked(store: &MemoryStore, n: i64) {
    let rows: Vec<(&str, i64, &str)> = (0..n).map(|rank| ("draft", rank, "ada")).collect();
    items(store, &rows);
}

pub(crate) fn plan(schema: &Schema, table: &str, expression: Option<FilterExpression>) -> IndexPlan {
    let table = schema.table(table).unwrap();
    WhereClauseCompiler::new(table)
        .compile(expression.as_ref())
        .unwrap()
}

pub(crate) fn options() -> StreamOptions {
    StreamOptions::default()
}

pub(crate) fn ranks(rows: &[Document]) -> Vec<i64> {
    rows.iter()
        .filter_map(|doc| doc.get("rank").and_then(Value::as_i64))
        .collect()
}
