//! In-memory ordering
//!
//! Used only when the requested order is not served by an index and the
//! caller opted into a full scan, and for per-parent ordering of relation
//! slices. Values compare in index key order so an in-memory sort agrees
//! with an index scan over the same field.

use std::cmp::Ordering;

use super::options::OrderBy;
use crate::index::IndexKey;
use crate::store::Order;
use crate::stream::HasFields;

use super::envelope::RowEnvelope;

/// Sorts rows by one field
pub struct RowSorter;

impl RowSorter {
    /// Sorts rows according to `order_by`.
    ///
    /// Sort is stable: rows with equal keys keep their scan order.
    pub fn sort<T: HasFields>(rows: &mut [T], order_by: &OrderBy) {
        rows.sort_by(|a, b| {
            let ordering = Self::compare(a, b, &order_by.field);
            match order_by.order {
                Order::Asc => ordering,
                Order::Desc => ordering.reverse(),
            }
        });
    }

    fn compare<T: HasFields>(a: &T, b: &T, field: &str) -> Ordering {
        let a_key = IndexKey::from_field(a.field(field));
        let b_key = IndexKey::from_field(b.field(field));
        a_key.cmp(&b_key)
    }
}

impl HasFields for RowEnvelope {
    fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.document().get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Document;
    use serde_json::{json, Map, Value};

    fn make_doc(id: &str, age: Value) -> Document {
        let mut body = Map::new();
        body.insert("age".into(), age);
        Document::new(id, 0.0, body)
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(Document::id).collect()
    }

    #[test]
    fn test_sort_ascending() {
        let mut docs = vec![make_doc("c", json!(30)), make_doc("a", json!(20)), make_doc("b", json!(25))];
        RowSorter::sort(&mut docs, &OrderBy::asc("age"));
        assert_eq!(ids(&docs), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_descending() {
        let mut docs = vec![make_doc("c", json!(30)), make_doc("a", json!(20)), make_doc("b", json!(25))];
        RowSorter::sort(&mut docs, &OrderBy::desc("age"));
        assert_eq!(ids(&docs), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_stable() {
        let mut docs = vec![make_doc("b", json!(25)), make_doc("a", json!(25)), make_doc("c", json!(25))];
        RowSorter::sort(&mut docs, &OrderBy::asc("age"));
        assert_eq!(ids(&docs), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_null_and_mixed_types_follow_index_order() {
        let mut docs = vec![
            make_doc("s", json!("x")),
            make_doc("n", Value::Null),
            make_doc("num", json!(1)),
            make_doc("b", json!(true)),
        ];
        RowSorter::sort(&mut docs, &OrderBy::asc("age"));
        assert_eq!(ids(&docs), vec!["n", "b", "num", "s"]);
    }
}
