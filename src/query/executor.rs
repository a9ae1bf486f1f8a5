//! Query executor
//!
//! Answers reads against one table.
//!
//! Execution flow:
//! 1. Normalize the where clause and compile it into an `IndexPlan`
//! 2. Enforce guardrails (sizing, unindexed filters, unindexed order)
//! 3. Build a stream from the plan: one scan per probe, merged when needed
//! 4. Read rows, bounded by the limit, `maxScan` and the platform ceiling
//! 5. Load relations, then apply projection and extras
//!
//! Every guardrail is checked before the first host call.

use std::sync::Arc;

use serde_json::Value;

use super::envelope::{finish_rows, RowEnvelope};
use super::options::{
    FindManyOptions, KeyPage, OrderBy, PageByKeyOptions, MAX_VECTOR_LIMIT,
};
use super::sorter::RowSorter;
use crate::engine::EngineContext;
use crate::errors::{CompositionError, EngineError, EngineResult, GuardrailError};
use crate::filter::{normalize, ComparisonOp, CompiledFilter, FilterExpression, RowPredicate};
use crate::index::{IndexKey, IndexPosition, IndexRange};
use crate::observability::{log_event, Event};
use crate::planner::{IndexPlan, PlanStrategy, PlanningError, WhereClauseCompiler};
use crate::relation::RelationLoader;
use crate::schema::TableSchema;
use crate::store::{Document, Order, ScanRequest};
use crate::stream::{Page, PageStatus, PaginationOptions, ProbeMerge, Stream, StreamError};

/// How rows reach the requested order
#[derive(Debug, Clone, PartialEq)]
enum Ordering {
    /// The index scan already yields rows in order
    Index { order: Order, merge: ProbeMerge },
    /// Rows are read in index order and sorted afterwards
    InMemory(OrderBy),
}

/// A compiled, guarded read
struct ReadPlan {
    plan: IndexPlan,
    predicate: Option<RowPredicate>,
    ordering: Ordering,
}

/// Executes reads against one table
#[derive(Debug, Clone)]
pub struct QueryExecutor<'h> {
    ctx: EngineContext<'h>,
    table: &'h TableSchema,
}

impl<'h> QueryExecutor<'h> {
    pub fn new(ctx: EngineContext<'h>, table: &str) -> EngineResult<Self> {
        let table = ctx.table(table)?;
        Ok(Self { ctx, table })
    }

    pub fn table(&self) -> &'h TableSchema {
        self.table
    }

    /// Every matching row, up to the limit.
    ///
    /// A read with no limit and no `allowFullScan` fails unless the schema
    /// declares a `defaultLimit`.
    pub fn find_many(&self, options: &FindManyOptions) -> EngineResult<Vec<RowEnvelope>> {
        if options.search.is_some() || options.vector_search.is_some() {
            return self.search_rows(options);
        }

        let limit = options.limit.or(self.ctx.config().default_limit);
        if limit.is_none() && !options.allow_full_scan {
            return Err(self.reject(GuardrailError::UnsizedQuery {
                table: self.table.name.clone(),
            }));
        }

        let read = self.prepare(options)?;
        let offset = options.offset.unwrap_or(0);
        let docs = match &read.ordering {
            Ordering::Index { .. } => {
                let wanted = limit.map_or(usize::MAX, |l| l.saturating_add(offset));
                let mut docs = self.read_rows(&read, options, wanted)?;
                docs.drain(..offset.min(docs.len()));
                docs
            }
            Ordering::InMemory(order_by) => {
                let mut docs = self.read_rows(&read, options, usize::MAX)?;
                RowSorter::sort(&mut docs, order_by);
                docs.drain(..offset.min(docs.len()));
                if let Some(limit) = limit {
                    docs.truncate(limit);
                }
                docs
            }
        };

        let rows = self.materialize(docs, options)?;
        self.ctx.metrics().increment_queries_executed();
        Ok(rows)
    }

    /// The first matching row
    pub fn find_first(&self, options: &FindManyOptions) -> EngineResult<Option<RowEnvelope>> {
        let options = if options.vector_search.is_some() {
            options.clone()
        } else {
            options.clone().with_limit(1)
        };
        Ok(self.find_many(&options)?.into_iter().next())
    }

    pub fn find_first_or_throw(&self, options: &FindManyOptions) -> EngineResult<RowEnvelope> {
        self.find_first(options)?
            .ok_or_else(|| EngineError::not_found(&self.table.name))
    }

    /// One cursor page.
    ///
    /// Plans with more than one probe cannot be paginated: disjoint scans
    /// share no single page boundary.
    pub fn paginate(
        &self,
        options: &FindManyOptions,
        page: &PaginationOptions,
    ) -> EngineResult<Page<RowEnvelope>> {
        if page.num_items == 0 {
            return Err(self.reject(CompositionError::conflicting(
                "paginate limit must be positive",
            )));
        }
        if options.search.is_some() {
            return Err(self.reject(GuardrailError::SearchIncompatible {
                provider: "search",
                option: "cursor pagination",
            }));
        }
        if options.vector_search.is_some() {
            return Err(self.reject(GuardrailError::SearchIncompatible {
                provider: "vectorSearch",
                option: "cursor pagination",
            }));
        }
        if options.offset.is_some() {
            return Err(self.reject(CompositionError::conflicting(
                "offset cannot be combined with cursor pagination",
            )));
        }

        let read = self.prepare(options)?;
        if read.plan.probe_count() > 1 {
            return Err(self.reject(GuardrailError::MultiProbePagination {
                table: self.table.name.clone(),
                probes: read.plan.probe_count(),
            }));
        }
        if let Ordering::InMemory(order_by) = &read.ordering {
            return Err(self.reject(GuardrailError::UnindexedOrder {
                table: self.table.name.clone(),
                field: order_by.field.clone(),
            }));
        }

        let mut page_options = page.clone();
        if page_options.max_scan.is_none() {
            page_options.max_scan = options.max_scan;
        }
        let stream = self.build_stream(&read, options)?;
        let page = stream.paginate(&page_options)?;

        let rows = page.page.len().to_string();
        log_event(
            Event::PageRead,
            &[
                ("table", &self.table.name),
                ("rows", &rows),
                ("done", if page.is_done { "true" } else { "false" }),
            ],
        );

        let Page {
            page: docs,
            continue_cursor,
            is_done,
            page_status,
            split_cursor,
        } = page;
        let rows = self.materialize(docs, options)?;
        self.ctx.metrics().increment_queries_executed();
        Ok(Page {
            page: rows,
            continue_cursor,
            is_done,
            page_status,
            split_cursor,
        })
    }

    /// The raw row stream a read would consume, for custom pipelines
    pub fn stream(&self, options: &FindManyOptions) -> EngineResult<Stream<'h, Document>> {
        let read = self.prepare(options)?;
        if let Ordering::InMemory(order_by) = &read.ordering {
            return Err(self.reject(GuardrailError::UnindexedOrder {
                table: self.table.name.clone(),
                field: order_by.field.clone(),
            }));
        }
        self.build_stream(&read, options)
    }

    /// Compiled plan for the options' where clause and index choice
    pub fn plan(&self, options: &FindManyOptions) -> EngineResult<IndexPlan> {
        Ok(self.prepare(options)?.plan)
    }

    /// Reads a page of one index between two positions.
    ///
    /// The page holds `target_max_rows` rows, growing up to
    /// `absolute_max_rows` so rows with identical index keys are not split
    /// across pages.
    pub fn page_by_key(&self, options: &PageByKeyOptions) -> EngineResult<KeyPage> {
        let index_name = options
            .index
            .clone()
            .unwrap_or_else(|| crate::schema::BY_CREATION_TIME_INDEX.to_string());
        let index = self.table.index(&index_name).ok_or_else(|| {
            self.reject(PlanningError::UnknownIndex {
                table: self.table.name.clone(),
                index: index_name.clone(),
            })
        })?;
        let fields = index.effective_fields();
        // rows sharing the declared fields stay on one page
        let declared = index.fields.len();
        let platform = self.ctx.config().platform_row_read_limit;
        let target = options.target_max_rows.clamp(1, platform);
        let absolute = options
            .absolute_max_rows
            .unwrap_or(target)
            .clamp(target, platform);
        let reader = self.ctx.reader();
        let metrics = self.ctx.metrics();
        let end_at = options.end_key.as_ref().map(|k| k.position.clone());

        let mut rows: Vec<Document> = Vec::new();
        let mut index_keys: Vec<IndexPosition> = Vec::new();
        let mut start_after = options.start_key.as_ref().map(|k| k.position.clone());

        if let Some(start) = options.start_key.as_ref().filter(|k| k.inclusive) {
            metrics.increment_point_reads();
            if let Some(doc) = reader.get(&self.table.name, &start.position.id)? {
                let position = doc.position(&fields);
                let before_end = options
                    .end_key
                    .as_ref()
                    .map_or(true, |end| end.inclusive || end.position != position);
                if position == start.position && before_end {
                    index_keys.push(position);
                    rows.push(doc);
                }
            }
        }

        let mut has_more = true;
        'scan: while has_more {
            let request = ScanRequest {
                table: self.table.name.clone(),
                index: index.name.clone(),
                range: IndexRange::full(),
                order: options.order,
                start_after: start_after.clone(),
                end_at: end_at.clone(),
                limit: (absolute + 1 - rows.len()).min(self.ctx.config().scan_batch_size),
            };
            let batch = reader.scan(&request)?;
            metrics.increment_host_scans();
            metrics.add_rows_read(batch.entries.len() as u64);
            if batch.exhausted || batch.entries.is_empty() {
                has_more = false;
            }

            for entry in batch.entries {
                let ends_here = options
                    .end_key
                    .as_ref()
                    .is_some_and(|end| !end.inclusive && end.position == entry.position);
                if ends_here {
                    has_more = false;
                    break 'scan;
                }
                if rows.len() >= target {
                    let same_keys = index_keys.last().is_some_and(|last| {
                        declared_keys(last, declared) == declared_keys(&entry.position, declared)
                    });
                    if !same_keys || rows.len() >= absolute {
                        has_more = true;
                        break 'scan;
                    }
                }
                start_after = Some(entry.position.clone());
                index_keys.push(entry.position);
                rows.push(entry.document);
            }
        }

        self.ctx.metrics().increment_queries_executed();
        Ok(KeyPage {
            rows,
            index_keys,
            has_more,
        })
    }

    fn reject(&self, err: impl Into<EngineError>) -> EngineError {
        self.ctx.reject(&self.table.name, err)
    }

    /// Compiles the where clause and checks every read guardrail
    fn prepare(&self, options: &FindManyOptions) -> EngineResult<ReadPlan> {
        let normalized =
            normalize(self.table, options.where_clause.as_ref()).map_err(|e| self.reject(e))?;
        let compiler = WhereClauseCompiler::new(self.table);
        let expression = normalized.expression.as_ref();
        let plan = match &options.index {
            Some(index) => compiler.compile_with_index(index, expression),
            None => compiler.compile(expression),
        }
        .map_err(|e| self.reject(e))?;

        let filters_rows = !plan.post_filters.is_empty()
            || normalized.predicate.is_some()
            || !options.relation_where.is_empty();
        if plan.strategy == PlanStrategy::None
            && filters_rows
            && !options.allow_full_scan
            && options.max_scan.is_none()
        {
            self.ctx.require_opt_in(
                &self.table.name,
                GuardrailError::FullScanRequired {
                    table: self.table.name.clone(),
                    reason: "no index covers the where clause; pass allowFullScan or maxScan"
                        .into(),
                },
            )?;
        }

        let ordering = resolve_ordering(&plan, options.order_by.as_ref());
        if let Ordering::InMemory(order_by) = &ordering {
            if !options.allow_full_scan {
                self.ctx.require_opt_in(
                    &self.table.name,
                    GuardrailError::UnindexedOrder {
                        table: self.table.name.clone(),
                        field: order_by.field.clone(),
                    },
                )?;
            }
        }

        let probes = plan.probe_count().to_string();
        log_event(
            Event::QueryPlanned,
            &[
                ("table", &self.table.name),
                ("index", &plan.selected_index),
                ("strategy", plan.strategy.as_str()),
                ("probes", &probes),
            ],
        );

        Ok(ReadPlan {
            plan,
            predicate: normalized.predicate,
            ordering,
        })
    }

    fn build_stream(
        &self,
        read: &ReadPlan,
        options: &FindManyOptions,
    ) -> EngineResult<Stream<'h, Document>> {
        let (order, merge) = match &read.ordering {
            Ordering::Index { order, merge } => (*order, merge.clone()),
            Ordering::InMemory(_) => (Order::Asc, ProbeMerge::Union),
        };
        let mut stream = Stream::from_plan_merged(
            self.ctx.reader(),
            &read.plan,
            order,
            merge,
            &self.ctx.stream_options(),
        )?;

        if let Some(predicate) = &read.predicate {
            let predicate = Arc::clone(predicate);
            stream = stream.filter_with(move |doc| predicate(doc));
        }

        for (alias, expression) in &options.relation_where {
            let edge = self.ctx.schema().relation(&self.table.name, alias)?;
            let filter = CompiledFilter::compile(expression)?;
            let mut related = RelationLoader::new(self.ctx.clone()).relation_filter(
                edge,
                filter,
                options.allow_full_scan,
                options.max_scan,
            );
            stream = stream.try_filter_with(move |doc| related.matches(doc));
        }
        Ok(stream)
    }

    /// Reads up to `wanted` rows in one page
    fn read_rows(
        &self,
        read: &ReadPlan,
        options: &FindManyOptions,
        wanted: usize,
    ) -> EngineResult<Vec<Document>> {
        if wanted == 0 {
            return Ok(Vec::new());
        }
        let stream = self.build_stream(read, options)?;
        let mut page_options = PaginationOptions::new(wanted);
        page_options.max_scan = options.max_scan;
        let page = stream.paginate(&page_options)?;
        if page.page_status == Some(PageStatus::SplitRequired) {
            return Err(StreamError::RowReadLimitExceeded {
                limit: self.ctx.config().platform_row_read_limit,
            }
            .into());
        }
        Ok(page.page)
    }

    fn materialize(
        &self,
        docs: Vec<Document>,
        options: &FindManyOptions,
    ) -> EngineResult<Vec<RowEnvelope>> {
        let mut rows: Vec<RowEnvelope> = docs.into_iter().map(RowEnvelope::new).collect();
        self.finish(&mut rows, options)?;
        Ok(rows)
    }

    fn finish(&self, rows: &mut [RowEnvelope], options: &FindManyOptions) -> EngineResult<()> {
        if !options.with.is_empty() {
            RelationLoader::new(self.ctx.clone()).load(&self.table.name, rows, &options.with)?;
        }
        finish_rows(rows, options.columns.as_ref(), &options.extras);
        Ok(())
    }

    /// Full-text or vector search through the provider
    fn search_rows(&self, options: &FindManyOptions) -> EngineResult<Vec<RowEnvelope>> {
        let provider_name = if options.search.is_some() {
            "search"
        } else {
            "vectorSearch"
        };
        self.check_search_options(provider_name, options)?;

        let normalized =
            normalize(self.table, options.where_clause.as_ref()).map_err(|e| self.reject(e))?;
        let provider = self.ctx.search()?;

        let mut rows = if let Some(search) = &options.search {
            let filters = self.merge_search_filters(&search.filters, normalized.expression.as_ref())?;
            let limit = match options.limit.or(self.ctx.config().default_limit) {
                Some(limit) => limit,
                None if options.allow_full_scan => self.ctx.config().platform_row_read_limit,
                None => {
                    return Err(self.reject(GuardrailError::UnsizedQuery {
                        table: self.table.name.clone(),
                    }))
                }
            };
            provider
                .search(&self.table.name, &search.index, &search.query, &filters, limit)?
                .into_iter()
                .map(RowEnvelope::new)
                .collect::<Vec<_>>()
        } else if let Some(vector) = &options.vector_search {
            let filters = self.merge_search_filters(&vector.filters, normalized.expression.as_ref())?;
            provider
                .vector_search(
                    &self.table.name,
                    &vector.index,
                    &vector.vector,
                    vector.limit,
                    &filters,
                )?
                .into_iter()
                .map(|hit| RowEnvelope::new(hit.document).with_score(hit.score))
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        self.finish(&mut rows, options)?;
        self.ctx.metrics().increment_queries_executed();
        Ok(rows)
    }

    fn check_search_options(&self, provider: &'static str, options: &FindManyOptions) -> EngineResult<()> {
        let incompatible = |option: &'static str| {
            Err(self.reject(GuardrailError::SearchIncompatible { provider, option }))
        };
        if options.search.is_some() && options.vector_search.is_some() {
            return incompatible("vectorSearch");
        }
        if options.order_by.is_some() {
            return incompatible("orderBy");
        }
        if options.offset.is_some() {
            return incompatible("offset");
        }
        if options.has_predicate_where() {
            return incompatible("a predicate where clause");
        }
        if !options.relation_where.is_empty() {
            return incompatible("a relation where clause");
        }
        if let Some(vector) = &options.vector_search {
            if options.index.is_some() {
                return incompatible("withIndex");
            }
            if options.limit.is_some() {
                return incompatible("limit");
            }
            if vector.limit == 0 || vector.limit > MAX_VECTOR_LIMIT {
                return Err(self.reject(GuardrailError::VectorLimitOutOfRange {
                    limit: vector.limit,
                }));
            }
        }
        Ok(())
    }

    /// Combines provider filters with equality conjuncts of the where clause
    fn merge_search_filters(
        &self,
        filters: &[(String, Value)],
        expression: Option<&FilterExpression>,
    ) -> EngineResult<Vec<(String, Value)>> {
        let mut merged: Vec<(String, Value)> = filters.to_vec();
        let Some(expression) = expression else {
            return Ok(merged);
        };

        for conjunct in expression.conjuncts() {
            let comparison = match conjunct.as_comparison() {
                Some(c) if matches!(c.op, ComparisonOp::Eq | ComparisonOp::IsNull) => c,
                _ => {
                    return Err(self.reject(GuardrailError::SearchIncompatible {
                        provider: "search",
                        option: "a non-equality where clause",
                    }))
                }
            };
            let value = if comparison.op == ComparisonOp::IsNull {
                Value::Null
            } else {
                comparison.value.clone()
            };
            match merged.iter().find(|(field, _)| *field == comparison.field) {
                Some((_, existing)) if IndexKey::from_json(existing) != IndexKey::from_json(&value) => {
                    return Err(self.reject(CompositionError::SearchFilterConflict {
                        field: comparison.field.clone(),
                    }));
                }
                Some(_) => {}
                None => merged.push((comparison.field.clone(), value)),
            }
        }
        Ok(merged)
    }
}

fn declared_keys(position: &IndexPosition, declared: usize) -> &[IndexKey] {
    &position.keys[..declared.min(position.keys.len())]
}

/// Decides whether the plan's index order serves `order_by`
fn resolve_ordering(plan: &IndexPlan, order_by: Option<&OrderBy>) -> Ordering {
    let Some(order_by) = order_by else {
        return Ordering::Index {
            order: Order::Asc,
            merge: ProbeMerge::Union,
        };
    };
    let field = order_by.field.as_str();
    let order = order_by.order;

    if plan.constant_fields().contains(&field) || plan.leading_order_field() == Some(field) {
        return Ordering::Index {
            order,
            merge: ProbeMerge::Union,
        };
    }
    if plan.probe_count() > 1 && plan.trailing_order_field() == Some(field) {
        return Ordering::Index {
            order,
            merge: ProbeMerge::InterleaveBy(vec![field.to_string()]),
        };
    }
    Ordering::InMemory(order_by.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Host, Orm};
    use crate::errors::ErrorKind;
    use crate::filter::{builder, WhereClause};
    use crate::query::options::{Columns, Extra, PageKey, SearchRequest, VectorSearchRequest};
    use crate::schema::{EngineConfig, Schema, TableBuilder};
    use crate::store::{DocumentWriter, MemoryScheduler, MemoryStore};
    use serde_json::json;

    fn schema(config: EngineConfig) -> Schema {
        Schema::builder()
            .table(
                TableBuilder::new("posts")
                    .index("by_status", ["status"])
                    .index("by_status_rank", ["status", "rank"])
                    .search_index("search_title", "title", ["status"])
                    .vector_index("by_embedding", "embedding", 2, ["status"]),
            )
            .config(config)
            .build()
            .unwrap()
    }

    fn seed(store: &MemoryStore) {
        let rows = [
            ("draft", 3, "rust streams"),
            ("published", 1, "index plans"),
            ("draft", 1, "rust cursors"),
            ("archived", 2, "old news"),
            ("published", 2, "rust merges"),
        ];
        for (status, rank, title) in rows {
            let body = json!({"status": status, "rank": rank, "title": title, "embedding": [rank as f64, 1.0]});
            store.insert("posts", body.as_object().cloned().unwrap()).unwrap();
        }
    }

    fn ranks(rows: &[RowEnvelope]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.document().get("rank").and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[test]
    fn test_unsized_query_rejected() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let orm = Orm::new(&schema, Host::new(&store));
        let err = orm.query("posts").unwrap().find_many(&FindManyOptions::new()).unwrap_err();
        assert_eq!(err.code(), "ORM_UNSIZED_QUERY");
        assert_eq!(store.stats().scan_calls, 0);
    }

    #[test]
    fn test_default_limit_sizes_query() {
        let schema = schema(EngineConfig::default().with_default_limit(2));
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let rows = orm.query("posts").unwrap().find_many(&FindManyOptions::new()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_order_served_by_index() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new()
            .with_where(builder::eq("status", json!("draft")))
            .with_index("by_status_rank")
            .with_order_by(OrderBy::desc("rank"))
            .with_limit(10);
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();
        assert_eq!(ranks(&rows), vec![3, 1]);
    }

    #[test]
    fn test_in_array_interleaved_by_rank() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new()
            .with_where(builder::in_array("status", vec![json!("draft"), json!("published")]))
            .with_index("by_status_rank")
            .with_order_by(OrderBy::asc("rank"))
            .with_limit(10);
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();
        assert_eq!(ranks(&rows), vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_unindexed_order_needs_full_scan() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();

        let options = FindManyOptions::new()
            .with_order_by(OrderBy::asc("title"))
            .with_limit(2);
        let err = query.find_many(&options).unwrap_err();
        assert_eq!(err.code(), "ORM_UNINDEXED_ORDER");

        let rows = query.find_many(&options.with_allow_full_scan()).unwrap();
        let titles: Vec<&str> = rows
            .iter()
            .map(|r| r.get("title").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(titles, vec!["index plans", "old news"]);
    }

    #[test]
    fn test_unindexed_filter_needs_opt_in_or_max_scan() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();
        let options = FindManyOptions::new()
            .with_where(builder::ends_with("title", "plans"))
            .with_limit(5);

        let err = query.find_many(&options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Guardrail);
        assert_eq!(err.code(), "ORM_FULL_SCAN_REQUIRED");

        let rows = query.find_many(&options.clone().with_max_scan(100)).unwrap();
        assert_eq!(rows.len(), 1);
        let rows = query.find_many(&options.with_allow_full_scan()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_max_scan_bounds_rows_read() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new()
            .with_where(builder::ends_with("title", "news"))
            .with_max_scan(2)
            .with_limit(5);
        // the only match is the fourth row
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.stats().rows_scanned, 2);
    }

    #[test]
    fn test_predicate_where() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new()
            .with_where(WhereClause::predicate(|doc| {
                doc.get("rank").and_then(Value::as_i64) == Some(2)
            }))
            .with_allow_full_scan();
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_projection_extras_and_offset() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new()
            .with_where(builder::eq("status", json!("draft")))
            .with_index("by_status_rank")
            .with_columns(Columns::include(["title"]))
            .with_extra(Extra::new("shout", |d| {
                json!(d.get("title").and_then(Value::as_str).map(str::to_uppercase))
            }))
            .with_offset(1)
            .with_limit(5);
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title"), Some(&json!("rust streams")));
        assert!(rows[0].get("status").is_none());
        assert_eq!(rows[0].extra("shout"), Some(&json!("RUST STREAMS")));
    }

    #[test]
    fn test_find_first_or_throw() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();

        let found = query
            .find_first_or_throw(&FindManyOptions::new().with_where(builder::eq("status", json!("archived"))))
            .unwrap();
        assert_eq!(found.get("title"), Some(&json!("old news")));

        let err = query
            .find_first_or_throw(&FindManyOptions::new().with_where(builder::eq("status", json!("missing"))))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_paginate_rejects_multi_probe() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new()
            .with_where(builder::in_array("status", vec![json!("draft"), json!("published")]));
        let err = orm
            .query("posts")
            .unwrap()
            .paginate(&options, &PaginationOptions::new(2))
            .unwrap_err();
        assert_eq!(err.code(), "ORM_MULTI_PROBE_PAGINATION");
    }

    #[test]
    fn test_paginate_zero_items_rejected() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let options = FindManyOptions::new().with_where(builder::eq("status", json!("draft")));
        let err = orm
            .query("posts")
            .unwrap()
            .paginate(&options, &PaginationOptions::new(0))
            .unwrap_err();
        assert_eq!(err.code(), "ORM_CONFLICTING_OPTIONS");
        assert_eq!(store.stats().scan_calls, 0);
    }

    #[test]
    fn test_paginate_index_range() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();
        let options = FindManyOptions::new()
            .with_where(builder::eq("status", json!("published")))
            .with_index("by_status_rank");

        let first = query.paginate(&options, &PaginationOptions::new(1)).unwrap();
        assert_eq!(ranks(&first.page), vec![1]);
        assert!(!first.is_done);

        let next = PaginationOptions::new(1).with_cursor(Some(first.continue_cursor.clone()));
        let second = query.paginate(&options, &next).unwrap();
        assert_eq!(ranks(&second.page), vec![2]);

        let last = query
            .paginate(&options, &PaginationOptions::new(1).with_cursor(Some(second.continue_cursor)))
            .unwrap();
        assert!(last.page.is_empty());
        assert!(last.is_done);
    }

    #[test]
    fn test_search_merges_where_equalities() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let scheduler = MemoryScheduler::new();
        let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
        let query = orm.query("posts").unwrap();

        let options = FindManyOptions::new()
            .with_search(SearchRequest::new("search_title", "rust"))
            .with_where(builder::eq("status", json!("draft")))
            .with_limit(10);
        let rows = query.find_many(&options).unwrap();
        assert_eq!(rows.len(), 2);

        let conflicting = FindManyOptions::new()
            .with_search(SearchRequest::new("search_title", "rust").with_filter("status", json!("published")))
            .with_where(builder::eq("status", json!("draft")))
            .with_limit(10);
        let err = query.find_many(&conflicting).unwrap_err();
        assert_eq!(err.code(), "ORM_SEARCH_FILTER_CONFLICT");
    }

    #[test]
    fn test_search_incompatible_options() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        let scheduler = MemoryScheduler::new();
        let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
        let query = orm.query("posts").unwrap();

        let ordered = FindManyOptions::new()
            .with_search(SearchRequest::new("search_title", "rust"))
            .with_order_by(OrderBy::asc("rank"))
            .with_limit(10);
        assert_eq!(query.find_many(&ordered).unwrap_err().code(), "ORM_SEARCH_INCOMPATIBLE");

        let sized = FindManyOptions::new()
            .with_vector_search(VectorSearchRequest::new("by_embedding", vec![1.0, 1.0], 5))
            .with_limit(5);
        assert_eq!(query.find_many(&sized).unwrap_err().code(), "ORM_SEARCH_INCOMPATIBLE");

        let too_many = FindManyOptions::new()
            .with_vector_search(VectorSearchRequest::new("by_embedding", vec![1.0, 1.0], 257));
        assert_eq!(query.find_many(&too_many).unwrap_err().code(), "ORM_VECTOR_LIMIT");

        let paged = FindManyOptions::new().with_search(SearchRequest::new("search_title", "rust"));
        assert!(query.paginate(&paged, &PaginationOptions::new(5)).is_err());
    }

    #[test]
    fn test_vector_search_scores() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let scheduler = MemoryScheduler::new();
        let orm = Orm::new(&schema, Host::memory(&store, &scheduler));
        let options = FindManyOptions::new()
            .with_vector_search(VectorSearchRequest::new("by_embedding", vec![1.0, 0.0], 2));
        let rows = orm.query("posts").unwrap().find_many(&options).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.score().is_some()));
    }

    #[test]
    fn test_page_by_key_walks_index() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();

        let first = query
            .page_by_key(&PageByKeyOptions::new(2).with_index("by_status"))
            .unwrap();
        assert_eq!(first.rows.len(), 2);
        assert!(first.has_more);
        // archived, then the first draft
        assert_eq!(first.rows[0].get("status"), Some(&json!("archived")));

        let mut seen = first.rows.len();
        let mut start = first.next_start();
        loop {
            let mut options = PageByKeyOptions::new(2).with_index("by_status");
            if let Some(key) = start.clone() {
                options = options.with_start(key);
            }
            let page = query.page_by_key(&options).unwrap();
            seen += page.rows.len();
            if !page.has_more {
                break;
            }
            start = page.next_start();
        }
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_page_by_key_inclusive_start() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();

        let all = query.page_by_key(&PageByKeyOptions::new(10)).unwrap();
        assert_eq!(all.rows.len(), 5);
        assert!(!all.has_more);

        let from_third = query
            .page_by_key(&PageByKeyOptions::new(10).with_start(PageKey::from(all.index_keys[2].clone())))
            .unwrap();
        assert_eq!(from_third.rows.len(), 3);
        assert_eq!(from_third.rows[0].id(), all.rows[2].id());
    }

    #[test]
    fn test_page_by_key_keeps_equal_keys_together() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();

        let first = query
            .page_by_key(&PageByKeyOptions::new(1).with_index("by_status"))
            .unwrap();
        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.rows[0].get("status"), Some(&json!("archived")));

        // both drafts share the status key, so the page grows past its target
        let drafts = query
            .page_by_key(
                &PageByKeyOptions::new(1)
                    .with_index("by_status")
                    .with_start(first.next_start().unwrap())
                    .with_absolute_max_rows(3),
            )
            .unwrap();
        assert_eq!(drafts.rows.len(), 2);
        assert!(drafts.rows.iter().all(|d| d.get("status") == Some(&json!("draft"))));
        assert!(drafts.has_more);
    }

    #[test]
    fn test_page_by_key_exclusive_end() {
        let schema = schema(EngineConfig::default());
        let store = MemoryStore::new(&schema);
        seed(&store);
        let orm = Orm::new(&schema, Host::new(&store));
        let query = orm.query("posts").unwrap();

        let all = query.page_by_key(&PageByKeyOptions::new(10)).unwrap();
        let page = query
            .page_by_key(&PageByKeyOptions::new(10).with_end(PageKey::after(all.index_keys[3].clone())))
            .unwrap();
        assert_eq!(page.rows.len(), 3);
        assert!(!page.has_more);
    }
}
