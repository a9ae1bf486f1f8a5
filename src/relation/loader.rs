//! Batched relation loading
//!
//! Relations load one level at a time. For each edge the loader collects
//! the distinct join keys of every parent on the level, reads the related
//! rows once per key and hands each parent its slice. Nested relations run
//! on the flattened children of the whole level, never per parent.
//!
//! # Guardrails
//!
//! - Distinct keys above `relationFanOutMaxKeys` need `allowFullScan`
//! - Rows read above `relationMaxRows` need `allowFullScan`
//! - Nesting deeper than `relationMaxDepth` is rejected before the level
//!   that would exceed it reads anything
//! - A relation without an index on its target columns is rejected in
//!   strict schemas
//!
//! Relation filters on a parent query (`RelationFilter`) follow the same
//! row cap and fan-out limit, counted across every parent they test.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::warn;

use super::options::{nesting_depth, RelationLoad};
use crate::engine::EngineContext;
use crate::errors::{EngineResult, GuardrailError};
use crate::filter::{validate, CompiledFilter};
use crate::index::{IndexKey, IndexRange};
use crate::observability::{log_event, Event};
use crate::query::{finish_rows, RelationValue, RowEnvelope, RowSorter};
use crate::schema::{RelationEdge, RelationKind, TableSchema, ThroughSpec, BY_CREATION_TIME_INDEX};
use crate::store::{Document, Order, ScanRequest, ID_FIELD};
use crate::stream::{HasFields, StreamError};

type JoinKey = Vec<IndexKey>;

/// How rows of a table are found by column values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup<'h> {
    /// The columns are the primary key
    PointGet,
    /// Equality scan of an index led by the columns
    Indexed(&'h str),
    /// One scan of the whole table, bucketed in memory
    FullScan,
}

/// Rows one edge may still read
struct RowBudget {
    relation: String,
    remaining: usize,
    max: usize,
    /// Exceeding the budget is `RelationTooLarge` rather than the platform limit
    capped: bool,
}

/// Loads relations onto rows
#[derive(Debug, Clone)]
pub struct RelationLoader<'h> {
    ctx: EngineContext<'h>,
}

impl<'h> RelationLoader<'h> {
    pub fn new(ctx: EngineContext<'h>) -> Self {
        Self { ctx }
    }

    /// Loads every relation in `loads` onto `rows` of `table`.
    ///
    /// Join columns are read from the raw documents, so projections applied
    /// earlier do not affect loading.
    pub fn load(&self, table: &str, rows: &mut [RowEnvelope], loads: &[RelationLoad]) -> EngineResult<()> {
        self.load_level(table, rows, loads, 1)
    }

    /// A parent filter keeping rows with at least one related row matching
    /// `filter`.
    ///
    /// Without `allow_full_scan` the rows read across all parents are capped
    /// by `relationMaxRows` and the distinct parent keys by
    /// `relationFanOutMaxKeys`. `max_scan` lowers the row cap further.
    pub fn relation_filter(
        &self,
        edge: &'h RelationEdge,
        filter: CompiledFilter,
        allow_full_scan: bool,
        max_scan: Option<usize>,
    ) -> RelationFilter<'h> {
        let mut budget = self.budget(edge, allow_full_scan);
        if let Some(max) = max_scan.filter(|max| *max < budget.max) {
            budget.max = max;
            budget.remaining = max;
        }
        RelationFilter {
            loader: self.clone(),
            edge,
            filter,
            allow_full_scan,
            budget,
            tested: BTreeMap::new(),
        }
    }

    /// `depth` is the level `loads` sit on, starting at 1
    fn load_level(
        &self,
        table: &str,
        rows: &mut [RowEnvelope],
        loads: &[RelationLoad],
        depth: usize,
    ) -> EngineResult<()> {
        if loads.is_empty() {
            return Ok(());
        }
        let max = self.ctx.config().relation_max_depth;
        if depth + nesting_depth(loads) - 1 > max {
            return Err(self
                .ctx
                .reject(table, GuardrailError::RelationDepthExceeded { max }));
        }
        if rows.is_empty() {
            return Ok(());
        }
        for load in loads {
            let edge = self.ctx.schema().relation(table, &load.alias)?;
            let mut grouped = self.fetch(edge, rows, load)?;

            if !load.with.is_empty() {
                let counts: Vec<usize> = grouped.iter().map(Vec::len).collect();
                let mut flat: Vec<RowEnvelope> = grouped.into_iter().flatten().collect();
                self.load_level(&edge.target_table, &mut flat, &load.with, depth + 1)?;
                grouped = regroup(flat, &counts);
            }

            for (row, mut children) in rows.iter_mut().zip(grouped) {
                finish_rows(&mut children, load.columns.as_ref(), &load.extras);
                let value = match edge.kind {
                    RelationKind::One => RelationValue::One(children.into_iter().next().map(Box::new)),
                    RelationKind::Many | RelationKind::Through(_) => RelationValue::Many(children),
                };
                row.set_relation(load.alias.clone(), value);
            }
        }
        Ok(())
    }

    /// Related rows of every parent, filtered, ordered and sliced per parent
    fn fetch(
        &self,
        edge: &'h RelationEdge,
        parents: &[RowEnvelope],
        load: &RelationLoad,
    ) -> EngineResult<Vec<Vec<RowEnvelope>>> {
        let target = self.ctx.table(&edge.target_table)?;
        let filter = match &load.where_expression {
            Some(expression) => {
                validate(target, expression).map_err(|e| self.ctx.reject(&edge.source_table, e))?;
                Some(CompiledFilter::compile(expression)?)
            }
            None => None,
        };

        let parent_keys: Vec<Option<JoinKey>> = parents
            .iter()
            .map(|p| key_of(p.document(), &edge.from_columns))
            .collect();
        let keys = distinct_keys(parent_keys.iter().flatten());

        let max_keys = self.ctx.config().relation_fan_out_max_keys;
        if keys.len() > max_keys && !load.allow_full_scan {
            return Err(self.ctx.reject(
                &edge.source_table,
                GuardrailError::FanOutExceeded {
                    relation: relation_name(edge),
                    keys: keys.len(),
                    max: max_keys,
                },
            ));
        }

        // a `one` relation without a filter only needs the first row per key
        let first_only = edge.kind == RelationKind::One && filter.is_none();
        let mut budget = self.budget(edge, load.allow_full_scan);
        let buckets = self.read_edge(edge, &keys, first_only, load.allow_full_scan, &mut budget)?;

        let rows_read = budget.max - budget.remaining;
        self.ctx.metrics().increment_relation_batches();
        log_event(
            Event::RelationBatchLoaded,
            &[
                ("relation", &relation_name(edge)),
                ("parents", &parents.len().to_string()),
                ("keys", &keys.len().to_string()),
                ("rows", &rows_read.to_string()),
            ],
        );

        Ok(parent_keys
            .iter()
            .map(|key| {
                let docs = key
                    .as_ref()
                    .and_then(|k| buckets.get(k))
                    .cloned()
                    .unwrap_or_default();
                shape(docs, filter.as_ref(), load)
            })
            .collect())
    }

    /// Reads the rows related to each key
    fn read_edge(
        &self,
        edge: &'h RelationEdge,
        keys: &[JoinKey],
        first_only: bool,
        allow_full_scan: bool,
        budget: &mut RowBudget,
    ) -> EngineResult<BTreeMap<JoinKey, Vec<Document>>> {
        let target = self.ctx.table(&edge.target_table)?;
        match &edge.kind {
            RelationKind::Through(spec) => self.read_through(edge, spec, keys, allow_full_scan, budget),
            RelationKind::One | RelationKind::Many => {
                let lookup = self.lookup(
                    edge,
                    target,
                    &edge.to_columns,
                    edge.required_index.as_deref(),
                    allow_full_scan,
                )?;
                self.read_by_keys(target, &edge.to_columns, lookup, keys, first_only, budget)
            }
        }
    }

    /// Join rows first, then the targets they point at
    fn read_through(
        &self,
        edge: &'h RelationEdge,
        spec: &'h ThroughSpec,
        keys: &[JoinKey],
        allow_full_scan: bool,
        budget: &mut RowBudget,
    ) -> EngineResult<BTreeMap<JoinKey, Vec<Document>>> {
        let join = self.ctx.table(&spec.table)?;
        let target = self.ctx.table(&edge.target_table)?;
        let join_lookup = self.lookup(
            edge,
            join,
            &spec.source_columns,
            spec.index.as_deref(),
            allow_full_scan,
        )?;
        let target_lookup = self.lookup(
            edge,
            target,
            &edge.to_columns,
            edge.required_index.as_deref(),
            allow_full_scan,
        )?;

        let links = self.read_by_keys(join, &spec.source_columns, join_lookup, keys, false, budget)?;
        let link_keys: Vec<JoinKey> = links
            .values()
            .flatten()
            .filter_map(|row| key_of(row, &spec.target_columns))
            .collect();
        let target_keys = distinct_keys(&link_keys);
        let targets = self.read_by_keys(target, &edge.to_columns, target_lookup, &target_keys, false, budget)?;

        Ok(links
            .into_iter()
            .map(|(key, rows)| {
                let docs = rows
                    .iter()
                    .filter_map(|row| key_of(row, &spec.target_columns))
                    .flat_map(|k| targets.get(&k).cloned().unwrap_or_default())
                    .collect();
                (key, docs)
            })
            .collect())
    }

    fn lookup(
        &self,
        edge: &RelationEdge,
        table: &'h TableSchema,
        columns: &[String],
        index: Option<&'h str>,
        allow_full_scan: bool,
    ) -> EngineResult<Lookup<'h>> {
        if columns.len() == 1 && columns[0] == ID_FIELD {
            return Ok(Lookup::PointGet);
        }
        if let Some(index) = index {
            return Ok(Lookup::Indexed(index));
        }
        let relation = relation_name(edge);
        if self.ctx.config().strict {
            return Err(self.ctx.reject(
                &edge.source_table,
                GuardrailError::MissingRelationIndex { relation },
            ));
        }
        if !allow_full_scan {
            return Err(self.ctx.reject(
                &edge.source_table,
                GuardrailError::FullScanRequired {
                    table: table.name.clone(),
                    reason: format!("relation '{}' has no index on {:?}", relation, columns),
                },
            ));
        }
        warn!(relation = %relation, table = %table.name, "loading relation by full scan (relaxed schema)");
        Ok(Lookup::FullScan)
    }

    fn read_by_keys(
        &self,
        table: &TableSchema,
        columns: &[String],
        lookup: Lookup<'_>,
        keys: &[JoinKey],
        first_only: bool,
        budget: &mut RowBudget,
    ) -> EngineResult<BTreeMap<JoinKey, Vec<Document>>> {
        let mut buckets: BTreeMap<JoinKey, Vec<Document>> = BTreeMap::new();
        match lookup {
            Lookup::PointGet => {
                for key in keys {
                    let Some(IndexKey::String(id)) = key.first() else {
                        continue;
                    };
                    self.ctx.metrics().increment_point_reads();
                    if let Some(doc) = self.ctx.reader().get(&table.name, id)? {
                        self.charge(budget, 1)?;
                        buckets.insert(key.clone(), vec![doc]);
                    }
                }
            }
            Lookup::Indexed(index) => {
                for key in keys {
                    let range = IndexRange {
                        eq: key.clone(),
                        ..IndexRange::default()
                    };
                    let docs = self.scan(&table.name, index, range, first_only, budget)?;
                    if !docs.is_empty() {
                        buckets.insert(key.clone(), docs);
                    }
                }
            }
            Lookup::FullScan => {
                let index = table
                    .default_index()
                    .map_or(BY_CREATION_TIME_INDEX, |i| i.name.as_str());
                let wanted: BTreeSet<&JoinKey> = keys.iter().collect();
                for doc in self.scan(&table.name, index, IndexRange::full(), false, budget)? {
                    let key = doc.field_keys(columns);
                    if wanted.contains(&key) {
                        buckets.entry(key).or_default().push(doc);
                    }
                }
            }
        }
        Ok(buckets)
    }

    /// Reads a whole index range in batches, charging the budget
    fn scan(
        &self,
        table: &str,
        index: &str,
        range: IndexRange,
        first_only: bool,
        budget: &mut RowBudget,
    ) -> EngineResult<Vec<Document>> {
        let batch_size = self.ctx.config().scan_batch_size.max(1);
        let metrics = self.ctx.metrics();
        let mut docs = Vec::new();
        let mut start_after = None;
        loop {
            let limit = if first_only {
                1
            } else {
                batch_size.min(budget.remaining.saturating_add(1))
            };
            let request = ScanRequest {
                table: table.to_string(),
                index: index.to_string(),
                range: range.clone(),
                order: Order::Asc,
                start_after: start_after.take(),
                end_at: None,
                limit,
            };
            let batch = self.ctx.reader().scan(&request)?;
            metrics.increment_host_scans();
            metrics.add_rows_read(batch.entries.len() as u64);
            self.charge(budget, batch.entries.len())?;

            let done = first_only || batch.exhausted || batch.entries.is_empty();
            for entry in batch.entries {
                start_after = Some(entry.position);
                docs.push(entry.document);
            }
            if done {
                return Ok(docs);
            }
        }
    }

    /// Whether any row related to `key` matches, stopping at the first match
    fn any_related(
        &self,
        edge: &'h RelationEdge,
        key: &JoinKey,
        filter: &CompiledFilter,
        allow_full_scan: bool,
        budget: &mut RowBudget,
    ) -> EngineResult<bool> {
        if matches!(edge.kind, RelationKind::One | RelationKind::Many) {
            let target = self.ctx.table(&edge.target_table)?;
            let lookup = self.lookup(
                edge,
                target,
                &edge.to_columns,
                edge.required_index.as_deref(),
                allow_full_scan,
            )?;
            if let Lookup::Indexed(index) = lookup {
                let range = IndexRange {
                    eq: key.clone(),
                    ..IndexRange::default()
                };
                return self.scan_until(&target.name, index, range, budget, |doc| filter.matches(doc));
            }
        }
        let buckets = self.read_edge(edge, std::slice::from_ref(key), false, allow_full_scan, budget)?;
        Ok(buckets
            .get(key)
            .is_some_and(|docs| docs.iter().any(|doc| filter.matches(doc))))
    }

    /// Scans a range until `found` accepts a row, charging each row examined
    fn scan_until(
        &self,
        table: &str,
        index: &str,
        range: IndexRange,
        budget: &mut RowBudget,
        mut found: impl FnMut(&Document) -> bool,
    ) -> EngineResult<bool> {
        let batch_size = self.ctx.config().scan_batch_size.max(1);
        let metrics = self.ctx.metrics();
        let mut start_after = None;
        loop {
            let request = ScanRequest {
                table: table.to_string(),
                index: index.to_string(),
                range: range.clone(),
                order: Order::Asc,
                start_after: start_after.take(),
                end_at: None,
                limit: batch_size.min(budget.remaining.saturating_add(1)),
            };
            let batch = self.ctx.reader().scan(&request)?;
            metrics.increment_host_scans();
            metrics.add_rows_read(batch.entries.len() as u64);

            let exhausted = batch.exhausted || batch.entries.is_empty();
            for entry in batch.entries {
                self.charge(budget, 1)?;
                if found(&entry.document) {
                    return Ok(true);
                }
                start_after = Some(entry.position);
            }
            if exhausted {
                return Ok(false);
            }
        }
    }

    fn budget(&self, edge: &RelationEdge, allow_full_scan: bool) -> RowBudget {
        let config = self.ctx.config();
        let (max, capped) = if allow_full_scan {
            (config.platform_row_read_limit, false)
        } else {
            (config.relation_max_rows, true)
        };
        RowBudget {
            relation: relation_name(edge),
            remaining: max,
            max,
            capped,
        }
    }

    fn charge(&self, budget: &mut RowBudget, rows: usize) -> EngineResult<()> {
        if rows <= budget.remaining {
            budget.remaining -= rows;
            return Ok(());
        }
        if budget.capped {
            let table = budget.relation.split('.').next().unwrap_or_default();
            return Err(self.ctx.reject(
                table,
                GuardrailError::RelationTooLarge {
                    relation: budget.relation.clone(),
                    max: budget.max,
                },
            ));
        }
        Err(StreamError::RowReadLimitExceeded { limit: budget.max }.into())
    }
}

/// Parent-side relation filter, stateful across the parents it tests
pub struct RelationFilter<'h> {
    loader: RelationLoader<'h>,
    edge: &'h RelationEdge,
    filter: CompiledFilter,
    allow_full_scan: bool,
    budget: RowBudget,
    /// Outcome per parent key already tested
    tested: BTreeMap<JoinKey, bool>,
}

impl<'h> RelationFilter<'h> {
    /// True when `parent` has at least one related row matching the filter
    pub fn matches(&mut self, parent: &Document) -> EngineResult<bool> {
        let Some(key) = key_of(parent, &self.edge.from_columns) else {
            return Ok(false);
        };
        if let Some(&outcome) = self.tested.get(&key) {
            return Ok(outcome);
        }

        let ctx = &self.loader.ctx;
        let max_keys = ctx.config().relation_fan_out_max_keys;
        if self.tested.len() >= max_keys && !self.allow_full_scan {
            return Err(ctx.reject(
                &self.edge.source_table,
                GuardrailError::FanOutExceeded {
                    relation: relation_name(self.edge),
                    keys: self.tested.len() + 1,
                    max: max_keys,
                },
            ));
        }

        let outcome = self.loader.any_related(
            self.edge,
            &key,
            &self.filter,
            self.allow_full_scan,
            &mut self.budget,
        )?;
        self.tested.insert(key, outcome);
        Ok(outcome)
    }

    /// Rows read so far across every parent tested
    pub fn rows_read(&self) -> usize {
        self.budget.max - self.budget.remaining
    }
}

impl fmt::Debug for RelationFilter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationFilter")
            .field("relation", &relation_name(self.edge))
            .field("keys_tested", &self.tested.len())
            .field("rows_read", &self.rows_read())
            .finish()
    }
}

fn relation_name(edge: &RelationEdge) -> String {
    format!("{}.{}", edge.source_table, edge.alias)
}

/// Join key of a row; `None` when any column is null or missing
fn key_of(row: &impl HasFields, columns: &[String]) -> Option<JoinKey> {
    let keys = row.field_keys(columns);
    if keys.iter().any(IndexKey::is_null) {
        return None;
    }
    Some(keys)
}

/// Keys in first-seen order, without repeats
fn distinct_keys<'k>(keys: impl IntoIterator<Item = &'k JoinKey>) -> Vec<JoinKey> {
    let mut seen = BTreeSet::new();
    keys.into_iter()
        .filter(|k| seen.insert(*k))
        .cloned()
        .collect()
}

/// Per-parent where, order, offset and limit
fn shape(mut docs: Vec<Document>, filter: Option<&CompiledFilter>, load: &RelationLoad) -> Vec<RowEnvelope> {
    if let Some(filter) = filter {
        docs.retain(|doc| filter.matches(doc));
    }
    if let Some(order_by) = &load.order_by {
        RowSorter::sort(&mut docs, order_by);
    }
    let offset = load.offset.unwrap_or(0);
    docs.into_iter()
        .skip(offset)
        .take(load.limit.unwrap_or(usize::MAX))
        .map(RowEnvelope::new)
        .collect()
}

fn regroup(flat: Vec<RowEnvelope>, counts: &[usize]) -> Vec<Vec<RowEnvelope>> {
    let mut rows = flat.into_iter();
    counts
        .iter()
        .map(|&count| rows.by_ref().take(count).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Host, Orm};
    use crate::filter::builder;
    use crate::query::{Columns, FindManyOptions, OrderBy};
    use crate::schema::{EngineConfig, RelationDefinition, Schema, TableBuilder};
    use crate::store::{DocumentWriter, MemoryStore};
    use serde_json::{json, Map, Value};

    fn schema(config: EngineConfig) -> Schema {
        Schema::builder()
            .table(TableBuilder::new("users"))
            .table(TableBuilder::new("posts").index("by_author", ["authorId"]))
            .table(TableBuilder::new("comments").index("by_post", ["postId"]))
            .table(TableBuilder::new("tags"))
            .table(TableBuilder::new("post_tags").index("by_post", ["postId"]))
            .relation(RelationDefinition::many("users", "posts", "posts", ["_id"], ["authorId"]))
            .relation(RelationDefinition::one("posts", "author", "users", ["authorId"], ["_id"]))
            .relation(RelationDefinition::many("posts", "comments", "comments", ["_id"], ["postId"]))
            .relation(RelationDefinition::many("users", "comments", "comments", ["_id"], ["authorId"]))
            .relation(RelationDefinition::through(
                "posts",
                "tags",
                "tags",
                ["_id"],
                ["_id"],
                ThroughSpec {
                    table: "post_tags".into(),
                    source_columns: vec!["postId".into()],
                    target_columns: vec!["tagId".into()],
                    index: None,
                },
            ))
            .config(config)
            .build()
            .unwrap()
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    struct Fixture {
        ada: String,
        bob: String,
    }

    fn seed(store: &MemoryStore) -> Fixture {
        let ada = store.insert("users", body(json!({"name": "ada"}))).unwrap();
        let bob = store.insert("users", body(json!({"name": "bob"}))).unwrap();
        let rust = store.insert("tags", body(json!({"label": "rust"}))).unwrap();
        let db = store.insert("tags", body(json!({"label": "db"}))).unwrap();

        for (author, title, rank) in [(&ada, "a1", 2), (&ada, "a2", 1), (&bob, "b1", 1)] {
            let post = store
                .insert("posts", body(json!({"authorId": author, "title": title, "rank": rank})))
                .unwrap();
            store
                .insert("comments", body(json!({"postId": post, "authorId": bob, "text": format!("on {}", title)})))
                .unwrap();
            store
                .insert("post_tags", body(json!({"postId": post, "tagId": rust})))
                .unwrap();
            if title == "a1" {
                store
                    .insert("post_tags", body(json!({"postId": post, "tagId": db})))
                    .unwrap();
            }
        }
        Fixture { ada, bob }
    }

    fn users(orm: &Orm<'_>) -> Vec<RowEnvelope> {
        let rows = orm
            .query("users")
            .unwrap()
            .find_many(&FindManyOptions::new().with_limit(10))
            .unwrap();
        assert_eq!(rows.len(), 2);
        rows
    }

    fn titles(rows: &[RowEnvelope]) -> Vec<&str> {
        rows.iter()
            .map(|r| r.get("title").and_then(Value::as_str).unwrap())
            .collect()
    }

    #[test]
    fn test_many_grouped_per_parent() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let fixture = seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);

        orm.loader()
            .load(
                "users",
                &mut rows,
                &[RelationLoad::new("posts").with_order_by(OrderBy::asc("rank"))],
            )
            .unwrap();

        let ada = rows.iter().find(|r| r.id() == fixture.ada).unwrap();
        let bob = rows.iter().find(|r| r.id() == fixture.bob).unwrap();
        assert_eq!(titles(ada.many("posts")), vec!["a2", "a1"]);
        assert_eq!(titles(bob.many("posts")), vec!["b1"]);
        assert_eq!(orm.metrics().snapshot().relation_batches, 1);
    }

    #[test]
    fn test_one_by_primary_key_uses_point_reads() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut posts = orm
            .query("posts")
            .unwrap()
            .find_many(&FindManyOptions::new().with_limit(10))
            .unwrap();

        store.reset_stats();
        orm.loader()
            .load("posts", &mut posts, &[RelationLoad::new("author")])
            .unwrap();
        // two distinct authors, one read each
        assert_eq!(store.stats().point_reads, 2);
        assert_eq!(store.stats().scan_calls, 0);

        for post in &posts {
            let author = post.one("author").unwrap();
            assert_eq!(Some(&json!(author.id())), post.get("authorId"));
        }
    }

    #[test]
    fn test_where_limit_and_projection_per_parent() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let fixture = seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);

        let load = RelationLoad::new("posts")
            .with_where(builder::gte("rank", json!(1)))
            .with_order_by(OrderBy::desc("rank"))
            .with_limit(1)
            .with_columns(Columns::include(["title"]));
        orm.loader().load("users", &mut rows, &[load]).unwrap();

        let ada = rows.iter().find(|r| r.id() == fixture.ada).unwrap();
        let posts = ada.many("posts");
        assert_eq!(titles(posts), vec!["a1"]);
        assert!(posts[0].get("rank").is_none());
    }

    #[test]
    fn test_nested_and_through() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let fixture = seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);

        let load = RelationLoad::new("posts")
            .with_order_by(OrderBy::asc("title"))
            .with_relation(RelationLoad::new("comments"))
            .with_relation(RelationLoad::new("tags").with_order_by(OrderBy::asc("label")));
        orm.loader().load("users", &mut rows, &[load]).unwrap();

        let ada = rows.iter().find(|r| r.id() == fixture.ada).unwrap();
        let posts = ada.many("posts");
        assert_eq!(titles(posts), vec!["a1", "a2"]);
        assert_eq!(posts[0].many("comments").len(), 1);
        let labels: Vec<&str> = posts[0]
            .many("tags")
            .iter()
            .map(|t| t.get("label").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(labels, vec!["db", "rust"]);
        assert_eq!(posts[1].many("tags").len(), 1);

        let value = ada.to_value();
        assert_eq!(value["posts"][0]["comments"][0]["text"], json!("on a1"));
    }

    #[test]
    fn test_fan_out_guard() {
        let schema = schema(EngineConfig::default().with_relation_fan_out_max_keys(1));
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);

        store.reset_stats();
        let err = orm
            .loader()
            .load("users", &mut rows, &[RelationLoad::new("posts")])
            .unwrap_err();
        assert_eq!(err.code(), "ORM_FAN_OUT_EXCEEDED");
        assert_eq!(store.stats().scan_calls, 0);

        orm.loader()
            .load("users", &mut rows, &[RelationLoad::new("posts").with_allow_full_scan()])
            .unwrap();
    }

    #[test]
    fn test_relation_row_cap() {
        let schema = schema(EngineConfig::default().with_relation_max_rows(1));
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);

        let err = orm
            .loader()
            .load("users", &mut rows, &[RelationLoad::new("posts")])
            .unwrap_err();
        assert_eq!(err.code(), "ORM_RELATION_TOO_LARGE");
    }

    #[test]
    fn test_missing_index_strict_and_relaxed() {
        let strict = schema(EngineConfig::default());
        let store = MemoryStore::new(&strict);
        seed(&store);
        let orm = Orm::new(&strict, Host::new(&store));
        let mut rows = users(&orm);
        let err = orm
            .loader()
            .load("users", &mut rows, &[RelationLoad::new("comments")])
            .unwrap_err();
        assert_eq!(err.code(), "ORM_MISSING_RELATION_INDEX");

        let relaxed = schema(EngineConfig::default().with_strict(false));
        let store = MemoryStore::new(&relaxed);
        let fixture = seed(&store);
        let orm = Orm::new(&relaxed, Host::new(&store));
        let mut rows = users(&orm);
        let err = orm
            .loader()
            .load("users", &mut rows, &[RelationLoad::new("comments")])
            .unwrap_err();
        assert_eq!(err.code(), "ORM_FULL_SCAN_REQUIRED");

        orm.loader()
            .load(
                "users",
                &mut rows,
                &[RelationLoad::new("comments").with_allow_full_scan()],
            )
            .unwrap();
        let bob = rows.iter().find(|r| r.id() == fixture.bob).unwrap();
        assert_eq!(bob.many("comments").len(), 3);
    }

    #[test]
    fn test_depth_limit_checked_before_reads() {
        let mut config = EngineConfig::default();
        config.relation_max_depth = 1;
        let schema = schema(config);
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);

        store.reset_stats();
        let load = RelationLoad::new("posts").with_relation(RelationLoad::new("comments"));
        let err = orm.loader().load("users", &mut rows, &[load]).unwrap_err();
        assert_eq!(err.code(), "ORM_RELATION_DEPTH");
        assert_eq!(store.stats().scan_calls, 0);
    }

    #[test]
    fn test_relation_where_on_query() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let fixture = seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));

        let options = FindManyOptions::new()
            .with_relation_where("posts", builder::eq("title", json!("b1")))
            .with_max_scan(10)
            .with_limit(10);
        let rows = orm.query("users").unwrap().find_many(&options).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), fixture.bob);
    }

    #[test]
    fn test_depth_counted_per_level() {
        let mut config = EngineConfig::default();
        config.relation_max_depth = 2;
        let schema = schema(config);
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let mut rows = users(&orm);
        let loader = orm.loader();

        store.reset_stats();
        let posts = [RelationLoad::new("posts")];
        let err = loader.load_level("users", &mut rows, &posts, 3).unwrap_err();
        assert_eq!(err.code(), "ORM_RELATION_DEPTH");
        assert_eq!(store.stats().scan_calls, 0);

        loader.load_level("users", &mut rows, &posts, 2).unwrap();
        assert_eq!(rows.iter().map(|r| r.many("posts").len()).sum::<usize>(), 3);

        let nested = [RelationLoad::new("posts").with_relation(RelationLoad::new("comments"))];
        let err = loader.load_level("users", &mut rows, &nested, 2).unwrap_err();
        assert_eq!(err.code(), "ORM_RELATION_DEPTH");
    }

    fn seed_prolific(store: &MemoryStore, posts: usize) -> String {
        let ada = store.insert("users", body(json!({"name": "ada"}))).unwrap();
        store.insert("users", body(json!({"name": "bob"}))).unwrap();
        for i in 0..posts {
            store
                .insert(
                    "posts",
                    body(json!({"authorId": ada, "title": format!("p{}", i), "status": "draft"})),
                )
                .unwrap();
        }
        ada
    }

    fn relation_where(field: &str, value: &str) -> FindManyOptions {
        FindManyOptions::new()
            .with_relation_where("posts", builder::eq(field, json!(value)))
            .with_limit(10)
    }

    #[test]
    fn test_relation_where_stops_at_first_match() {
        let schema = schema(EngineConfig::default().with_relation_max_rows(5));
        let store = MemoryStore::new(&schema);
        let ada = seed_prolific(&store, 200);
        let orm = Orm::new(&schema, Host::new(&store));

        store.reset_stats();
        let rows = orm
            .query("users")
            .unwrap()
            .find_many(&relation_where("status", "draft").with_max_scan(50))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), ada);
        assert!(store.stats().rows_scanned < 20);
    }

    #[test]
    fn test_relation_where_respects_row_cap() {
        let schema = schema(EngineConfig::default().with_relation_max_rows(5));
        let store = MemoryStore::new(&schema);
        let ada = seed_prolific(&store, 200);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("users").unwrap();

        let err = query
            .find_many(&relation_where("title", "missing").with_max_scan(50))
            .unwrap_err();
        assert_eq!(err.code(), "ORM_RELATION_TOO_LARGE");

        let rows = query
            .find_many(&relation_where("title", "p150").with_allow_full_scan())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), ada);
    }

    #[test]
    fn test_relation_where_bounded_by_max_scan() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed_prolific(&store, 200);
        let orm = Orm::new(&schema, Host::new(&store));

        let err = orm
            .query("users")
            .unwrap()
            .find_many(&relation_where("title", "missing").with_max_scan(20))
            .unwrap_err();
        assert_eq!(err.code(), "ORM_RELATION_TOO_LARGE");
    }

    #[test]
    fn test_relation_where_fan_out_limit() {
        let schema = schema(EngineConfig::default().with_relation_fan_out_max_keys(2));
        let store = MemoryStore::new(&schema);
        for name in ["ada", "bob", "cy"] {
            store.insert("users", body(json!({"name": name}))).unwrap();
        }
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("users").unwrap();

        let err = query
            .find_many(&relation_where("title", "none").with_max_scan(50))
            .unwrap_err();
        assert_eq!(err.code(), "ORM_FAN_OUT_EXCEEDED");

        let rows = query
            .find_many(&relation_where("title", "none").with_allow_full_scan())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_relation_where_reads_each_key_once() {
        let schema = schema(EngineConfig::default().with_relation_fan_out_max_keys(2));
        let store = MemoryStore::new(&schema);
        let fixture = seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));

        store.reset_stats();
        let options = FindManyOptions::new()
            .with_relation_where("author", builder::eq("name", json!("ada")))
            .with_max_scan(10)
            .with_limit(10);
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();

        // three posts, two distinct authors
        assert_eq!(store.stats().point_reads, 2);
        assert_eq!(titles(&rows), vec!["a1", "a2"]);
        assert!(rows.iter().all(|r| r.get("authorId") == Some(&json!(fixture.ada))));
    }
}
