//! BTree-based index structure
//!
//! An index is a `BTreeSet<IndexPosition>` for deterministic ordering.
//! Positions already carry the document id, so duplicate keys need no
//! side lists.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

use crate::index::{IndexPosition, IndexRange};

use super::Order;

/// A single ordered index
#[derive(Debug, Default, Clone)]
pub struct IndexTree {
    entries: BTreeSet<IndexPosition>,
}

impl IndexTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: IndexPosition) {
        self.entries.insert(position);
    }

    pub fn remove(&mut self, position: &IndexPosition) {
        self.entries.remove(position);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns up to `limit` positions of `range` in `order`.
    ///
    /// Positions start strictly after `start_after` and stop at `end_at`
    /// inclusive. The flag is true when nothing in range remains past the
    /// returned positions.
    pub fn scan(
        &self,
        range: &IndexRange,
        order: Order,
        start_after: Option<&IndexPosition>,
        end_at: Option<&IndexPosition>,
        limit: usize,
    ) -> (Vec<IndexPosition>, bool) {
        if range.is_empty_interval() {
            return (Vec::new(), true);
        }
        let seek = range.lower_seek();

        let iter: Box<dyn Iterator<Item = &IndexPosition> + '_> = match order {
            Order::Asc => {
                let start = match start_after {
                    Some(after) if *after >= seek => Bound::Excluded(after.clone()),
                    _ => Bound::Included(seek),
                };
                Box::new(self.entries.range((start, Bound::Unbounded)))
            }
            Order::Desc => {
                let upper = match start_after {
                    Some(after) if *after < seek => return (Vec::new(), true),
                    Some(after) => Bound::Excluded(after.clone()),
                    None => Bound::Unbounded,
                };
                Box::new(self.entries.range((Bound::Included(seek), upper)).rev())
            }
        };

        let mut out = Vec::new();
        for position in iter {
            match (range.compare(&position.keys), order) {
                // only entries equal to an exclusive bound sort before the range
                (Ordering::Less, Order::Asc) | (Ordering::Greater, Order::Desc) => continue,
                (Ordering::Greater, Order::Asc) | (Ordering::Less, Order::Desc) => break,
                (Ordering::Equal, _) => {}
            }
            if let Some(end) = end_at {
                let past_end = match order {
                    Order::Asc => position > end,
                    Order::Desc => position < end,
                };
                if past_end {
                    break;
                }
            }
            if out.len() == limit {
                return (out, false);
            }
            out.push(position.clone());
        }
        (out, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexKey, IndexRangeBuilder};
    use serde_json::json;

    fn pos(status: &str, n: f64, id: &str) -> IndexPosition {
        IndexPosition::new(
            vec![IndexKey::from_string(status), IndexKey::from_f64(n)],
            id,
        )
    }

    fn tree() -> IndexTree {
        let mut tree = IndexTree::new();
        tree.insert(pos("draft", 1.0, "a"));
        tree.insert(pos("draft", 2.0, "b"));
        tree.insert(pos("draft", 3.0, "c"));
        tree.insert(pos("live", 4.0, "d"));
        tree.insert(pos("live", 5.0, "e"));
        tree
    }

    fn ids(positions: &[IndexPosition]) -> Vec<&str> {
        positions.iter().map(|p| p.id.as_str()).collect()
    }

    fn fields() -> Vec<String> {
        vec!["status".into(), "_creationTime".into()]
    }

    #[test]
    fn test_scan_eq_prefix_asc() {
        let tree = tree();
        let f = fields();
        let range = IndexRangeBuilder::new(&f).eq("status", &json!("draft")).unwrap().build();
        let (found, exhausted) = tree.scan(&range, Order::Asc, None, None, 10);
        assert_eq!(ids(&found), vec!["a", "b", "c"]);
        assert!(exhausted);
    }

    #[test]
    fn test_scan_desc_with_cursor() {
        let tree = tree();
        let f = fields();
        let range = IndexRangeBuilder::new(&f).eq("status", &json!("draft")).unwrap().build();
        let (found, _) = tree.scan(&range, Order::Desc, Some(&pos("draft", 3.0, "c")), None, 10);
        assert_eq!(ids(&found), vec!["b", "a"]);
    }

    #[test]
    fn test_scan_limit_reports_remaining() {
        let tree = tree();
        let (found, exhausted) = tree.scan(&IndexRange::full(), Order::Asc, None, None, 2);
        assert_eq!(ids(&found), vec!["a", "b"]);
        assert!(!exhausted);

        let (found, exhausted) = tree.scan(&IndexRange::full(), Order::Asc, Some(&found[1]), None, 3);
        assert_eq!(ids(&found), vec!["c", "d", "e"]);
        assert!(exhausted);
    }

    #[test]
    fn test_scan_exclusive_lower_bound() {
        let tree = tree();
        let f = fields();
        let range = IndexRangeBuilder::new(&f).gt("status", &json!("draft")).unwrap().build();
        let (found, exhausted) = tree.scan(&range, Order::Asc, None, None, 10);
        assert_eq!(ids(&found), vec!["d", "e"]);
        assert!(exhausted);
    }

    #[test]
    fn test_scan_end_at_inclusive() {
        let tree = tree();
        let (found, exhausted) =
            tree.scan(&IndexRange::full(), Order::Asc, None, Some(&pos("draft", 2.0, "b")), 10);
        assert_eq!(ids(&found), vec!["a", "b"]);
        assert!(exhausted);
    }

    #[test]
    fn test_remove() {
        let mut tree = tree();
        tree.remove(&pos("draft", 1.0, "a"));
        assert_eq!(tree.len(), 4);
    }
}
