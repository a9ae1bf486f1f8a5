//! Pull-based ordered streams
//!
//! A `Stream` is a lazy pipeline anchored to one or more index scans.
//! Stages are attached without reading anything; rows are pulled one at a
//! time, so per-row work is only paid for rows actually consumed.
//!
//! # Design Principles
//!
//! - Single-threaded cooperative pulls; dropping a stream has no effect
//! - Every pull reports a cursor, including pulls that drop the row
//! - Host reads are bounded by an explicit read budget
//! - Cursors mirror the pipeline shape and round-trip through strings
//!
//! ```ignore
//! let page = Stream::from_plan(reader, &plan, Order::Desc, &options)?
//!     .filter_with(|doc| doc.get("title").is_some())
//!     .paginate(&PaginationOptions::new(10))?;
//! ```

mod cursor;
mod errors;
#[cfg(test)]
mod fixture;
mod flat_map;
mod merge;
mod paginate;
mod pipeline;
mod scan;
mod source;
mod stages;

pub use cursor::{ScanPosition, StreamCursor};
pub use errors::{CursorError, StreamError};
pub use flat_map::{FlatMapOptions, FlatRow};
pub use paginate::{Page, PageStatus, PaginationOptions};
pub use pipeline::{ReadBudget, Step};
pub use scan::{ScanSpec, StreamOptions, DEFAULT_ROW_READ_LIMIT, DEFAULT_SCAN_BATCH};
pub use source::ProbeMerge;
pub use stages::HasFields;

use crate::errors::EngineResult;
use crate::filter::FilterExpression;
use crate::store::{Document, Order};

use flat_map::FlatMapNode;
use merge::{MergeKey, MergeNode};
use paginate::{run_page, WeightCap};
use pipeline::Pipeline;
use stages::{DistinctNode, FilterNode, MapNode};

/// A lazy, ordered sequence of rows
pub struct Stream<'a, T> {
    node: Box<dyn Pipeline<T> + 'a>,
    order_locked: bool,
    row_read_limit: usize,
    budget: ReadBudget,
    finished: bool,
}

impl<'a, T: 'a> Stream<'a, T> {
    pub(crate) fn from_node(node: Box<dyn Pipeline<T> + 'a>, row_read_limit: usize) -> Self {
        Self {
            node,
            order_locked: false,
            row_read_limit,
            budget: ReadBudget::new(row_read_limit),
            finished: false,
        }
    }

    fn then<U: 'a>(
        self,
        build: impl FnOnce(Box<dyn Pipeline<T> + 'a>) -> Box<dyn Pipeline<U> + 'a>,
    ) -> Stream<'a, U> {
        let Stream {
            node,
            order_locked,
            row_read_limit,
            budget,
            finished,
        } = self;
        Stream {
            node: build(node),
            order_locked,
            row_read_limit,
            budget,
            finished,
        }
    }

    /// Sets the scan direction. May be called once.
    pub fn order(mut self, order: Order) -> EngineResult<Self> {
        if self.order_locked {
            return Err(StreamError::OrderAlreadySet.into());
        }
        self.node.set_order(order);
        self.order_locked = true;
        Ok(self)
    }

    pub fn current_order(&self) -> Order {
        self.node.order()
    }

    /// Effective index fields the stream is ordered by
    pub fn index_fields(&self) -> Vec<String> {
        self.node.index_fields()
    }

    /// Raw cursor covering every row read so far
    pub fn cursor(&self) -> StreamCursor {
        self.node.position()
    }

    /// Rows the iterator interface may read in total
    pub fn with_row_read_limit(mut self, limit: usize) -> Self {
        self.row_read_limit = limit;
        self.budget = ReadBudget::new(limit);
        self
    }

    pub fn map<U: 'a>(self, mut f: impl FnMut(T) -> U + 'a) -> Stream<'a, U> {
        self.try_map(move |item| Ok(f(item)))
    }

    pub fn try_map<U: 'a>(self, f: impl FnMut(T) -> EngineResult<U> + 'a) -> Stream<'a, U> {
        self.then(|node| Box::new(MapNode::new(node, Box::new(f))))
    }

    /// Streaming, non-indexed filter. Dropped rows still count as read.
    pub fn filter_with(self, mut predicate: impl FnMut(&T) -> bool + 'a) -> Self {
        self.try_filter_with(move |item| Ok(predicate(item)))
    }

    pub fn try_filter_with(self, predicate: impl FnMut(&T) -> EngineResult<bool> + 'a) -> Self {
        self.then(|node| Box::new(FilterNode::new(node, Box::new(predicate))))
    }

    /// Always fails: predicates belong in the where clause or `filter_with`.
    pub fn filter(self, _expression: FilterExpression) -> EngineResult<Self> {
        Err(StreamError::FilterMisuse.into())
    }

    /// Drops consecutive rows with equal `fields`
    pub fn distinct<I, S>(self, fields: I) -> Self
    where
        T: HasFields,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect();
        self.then(|node| Box::new(DistinctNode::new(node, fields)))
    }

    /// Opens one inner stream per row.
    ///
    /// Inner streams must scan `options.inner_index_fields`, or the outer
    /// stream's index fields when none are given, in the outer stream's order.
    pub fn flat_map<U: 'a>(
        self,
        options: FlatMapOptions,
        mut f: impl FnMut(&T) -> EngineResult<Stream<'a, U>> + 'a,
    ) -> Stream<'a, FlatRow<T, U>>
    where
        T: Clone,
    {
        let factory = move |item: &T| -> EngineResult<Box<dyn Pipeline<U> + 'a>> { Ok(f(item)?.node) };
        self.then(|node| Box::new(FlatMapNode::new(node, Box::new(factory), options)))
    }

    /// One page: at most `num_items` rows, reading at most `max_scan` rows
    pub fn paginate(mut self, options: &PaginationOptions) -> EngineResult<Page<T>> {
        run_page(self.node.as_mut(), options, self.row_read_limit, None)
    }

    /// Like `paginate`, also stopping once the summed weight reaches
    /// `max_weight` (at least one row per page)
    pub fn paginate_weighted(
        mut self,
        options: &PaginationOptions,
        max_weight: usize,
        weigh: impl Fn(&T) -> usize,
    ) -> EngineResult<Page<T>> {
        let cap = WeightCap {
            max: max_weight,
            weigh: &weigh,
        };
        run_page(self.node.as_mut(), options, self.row_read_limit, Some(cap))
    }

    /// The only row, `None` when empty, an error when there are more
    pub fn unique(mut self) -> EngineResult<Option<T>> {
        let Some(first) = self.next().transpose()? else {
            return Ok(None);
        };
        if self.next().transpose()?.is_some() {
            return Err(StreamError::NotUnique.into());
        }
        Ok(Some(first))
    }

    pub fn first(mut self) -> EngineResult<Option<T>> {
        self.next().transpose()
    }

    /// Up to `n` rows
    pub fn take(mut self, n: usize) -> EngineResult<Vec<T>> {
        let mut out = Vec::with_capacity(n.min(1024));
        while out.len() < n {
            match self.next() {
                Some(item) => out.push(item?),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn collect_all(self) -> EngineResult<Vec<T>> {
        self.collect()
    }
}

impl<'a> Stream<'a, Document> {
    /// Merges streams by full index position.
    ///
    /// Every stream must share order and index fields.
    pub fn union(streams: Vec<Stream<'a, Document>>) -> EngineResult<Self> {
        let first = streams.first().ok_or(StreamError::EmptyUnion)?;
        let fields = first.index_fields();
        check_orders(&streams)?;
        for stream in &streams[1..] {
            let found = stream.index_fields();
            if found != fields {
                return Err(StreamError::IndexFieldMismatch {
                    expected: fields,
                    found,
                }
                .into());
            }
        }
        Ok(Self::merge(streams, MergeKey::Position(fields)))
    }

    /// Merges streams by `fields`, then document id.
    ///
    /// Every stream must share order and be ordered by `fields`.
    pub fn interleave_by<I, S>(streams: Vec<Stream<'a, Document>>, fields: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if streams.is_empty() {
            return Err(StreamError::EmptyUnion.into());
        }
        check_orders(&streams)?;
        let fields = fields.into_iter().map(Into::into).collect();
        Ok(Self::merge(streams, MergeKey::Fields(fields)))
    }

    fn merge(streams: Vec<Stream<'a, Document>>, key: MergeKey) -> Self {
        let limit = streams
            .iter()
            .map(|s| s.row_read_limit)
            .min()
            .unwrap_or(DEFAULT_ROW_READ_LIMIT);
        let locked = streams.iter().any(|s| s.order_locked);
        let nodes = streams.into_iter().map(|s| s.node).collect();
        let mut stream = Stream::from_node(Box::new(MergeNode::new(nodes, key)), limit);
        stream.order_locked = locked;
        stream
    }
}

fn check_orders(streams: &[Stream<'_, Document>]) -> EngineResult<()> {
    let Some(first) = streams.first() else {
        return Ok(());
    };
    let expected = first.current_order();
    for stream in &streams[1..] {
        let found = stream.current_order();
        if found != expected {
            return Err(StreamError::OrderMismatch {
                expected: expected.as_str(),
                found: found.as_str(),
            }
            .into());
        }
    }
    Ok(())
}

impl<'a, T: 'a> Iterator for Stream<'a, T> {
    type Item = EngineResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.node.step(&mut self.budget) {
                Ok(Step::Yield(item, _)) => return Some(Ok(item)),
                Ok(Step::Skip(_)) => continue,
                Ok(Step::Done) => {
                    self.finished = true;
                    return None;
                }
                Ok(Step::Blocked) => {
                    self.finished = true;
                    return Some(Err(StreamError::RowReadLimitExceeded {
                        limit: self.row_read_limit,
                    }
                    .into()));
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::{self, options, plan, ranked, ranks};
    use super::*;
    use crate::filter::builder::{eq, gte};
    use crate::planner::IndexPlan;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_order_reverses_scan() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        ranked(&store, 4);
        let plan = plan(&schema, "items", Some(eq("status", json!("draft"))));

        let rows = Stream::from_plan(&store, &plan, Order::Asc, &options())
            .unwrap()
            .order(Order::Desc)
            .unwrap()
            .collect_all()
            .unwrap();
        assert_eq!(ranks(&rows), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_order_set_once() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        let plan = plan(&schema, "items", None);

        let err = Stream::from_plan(&store, &plan, Order::Asc, &options())
            .unwrap()
            .order(Order::Desc)
            .unwrap()
            .order(Order::Asc)
            .err()
            .unwrap();
        assert_eq!(err.code(), "ORM_ORDER_ALREADY_SET");
    }

    #[test]
    fn test_filter_points_to_filter_with() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        let plan = plan(&schema, "items", None);

        let err = Stream::from_plan(&store, &plan, Order::Asc, &options())
            .unwrap()
            .filter(eq("status", json!("draft")))
            .err()
            .unwrap();
        assert_eq!(err.code(), "ORM_FILTER_MISUSE");
        assert!(err.to_string().contains("filter_with"));
    }

    #[test]
    fn test_unique() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        fixture::items(&store, &[("draft", 1, "ada"), ("draft", 2, "ada"), ("live", 3, "bob")]);
        let stream = |status: &str| {
            let plan = plan(&schema, "items", Some(eq("status", json!(status))));
            Stream::from_plan(&store, &plan, Order::Asc, &options()).unwrap()
        };

        let live = stream("live").unique().unwrap().unwrap();
        assert_eq!(live.get("rank"), Some(&json!(3)));
        assert_eq!(stream("gone").unique().unwrap(), None);
        assert_eq!(stream("draft").unique().unwrap_err().code(), "ORM_NOT_UNIQUE");
    }

    #[test]
    fn test_take_and_first() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        ranked(&store, 5);
        let plan = plan(&schema, "items", Some(gte("rank", json!(1))));
        let stream = || Stream::from_plan(&store, &plan, Order::Asc, &options()).unwrap();

        assert_eq!(ranks(&stream().take(2).unwrap()), vec![1, 2]);
        assert_eq!(ranks(&stream().take(10).unwrap()), vec![1, 2, 3, 4]);
        let first = stream().first().unwrap().unwrap();
        assert_eq!(first.get("rank"), Some(&json!(1)));
    }

    #[test]
    fn test_iterator_stops_at_row_read_limit() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        ranked(&store, 5);
        let plan = plan(&schema, "items", None);

        let mut stream = Stream::from_plan(&store, &plan, Order::Asc, &options())
            .unwrap()
            .with_row_read_limit(2);
        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert_eq!(err.code(), "ORM_ROW_READ_LIMIT");
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_map_and_filter_with() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        ranked(&store, 6);
        let plan = plan(&schema, "items", None);

        let doubled: Vec<i64> = Stream::from_plan(&store, &plan, Order::Asc, &options())
            .unwrap()
            .filter_with(|doc| doc.get("rank").and_then(|r| r.as_i64()).is_some_and(|r| r % 2 == 0))
            .map(|doc| doc.get("rank").and_then(|r| r.as_i64()).unwrap_or_default() * 10)
            .collect_all()
            .unwrap();
        assert_eq!(doubled, vec![0, 20, 40]);
    }

    #[test]
    fn test_union_merges_by_index_position() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        fixture::items(
            &store,
            &[("live", 1, "ada"), ("draft", 2, "ada"), ("live", 3, "ada"), ("draft", 4, "ada")],
        );
        let stream = |status: &str| {
            let plan = plan(&schema, "items", Some(eq("status", json!(status))));
            Stream::from_plan(&store, &plan, Order::Asc, &options()).unwrap()
        };

        let rows = Stream::union(vec![stream("live"), stream("draft")])
            .unwrap()
            .collect_all()
            .unwrap();
        // drafts sort before lives on (status, creation time)
        assert_eq!(ranks(&rows), vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_union_rejects_mixed_streams() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        let by_status = plan(&schema, "items", Some(eq("status", json!("draft"))));
        let by_rank = plan(&schema, "items", Some(gte("rank", json!(0))));
        let stream = |plan: &IndexPlan| Stream::from_plan(&store, plan, Order::Asc, &options()).unwrap();

        let err = Stream::union(vec![stream(&by_status), stream(&by_rank)]).err().unwrap();
        assert_eq!(err.code(), "ORM_INDEX_FIELD_MISMATCH");

        let descending = stream(&by_status).order(Order::Desc).unwrap();
        let err = Stream::union(vec![stream(&by_status), descending]).err().unwrap();
        assert_eq!(err.code(), "ORM_ORDER_MISMATCH");

        let err = Stream::union(Vec::new()).err().unwrap();
        assert_eq!(err.code(), "ORM_EMPTY_UNION");
    }

    #[test]
    fn test_interleave_by_field() {
        let schema = fixture::schema();
        let store = MemoryStore::new(&schema);
        fixture::items(
            &store,
            &[("draft", 5, "ada"), ("live", 1, "ada"), ("draft", 2, "ada"), ("live", 4, "ada")],
        );
        let stream = |status: &str| {
            let plan = plan(&schema, "items", Some(eq("status", json!(status))));
            Stream::from_plan(&store, &plan, Order::Asc, &options()).unwrap()
        };

        let rows = Stream::interleave_by(vec![stream("draft"), stream("live")], ["rank"])
            .unwrap()
            .collect_all()
            .unwrap();
        // each input is in creation order, so heads are compared as they come
        assert_eq!(ranks(&rows), vec![1, 4, 5, 2]);

        let descending = stream("live").order(Order::Desc).unwrap();
        let err = Stream::interleave_by(vec![stream("draft"), descending], ["rank"])
            .err()
            .unwrap();
        assert_eq!(err.code(), "ORM_ORDER_MISMATCH");
    }
}
