//! Bulk update/delete execution
//!
//! Updates and deletes share one pipeline:
//! 1. Validate the operation and the host capabilities it needs
//! 2. Compile the where clause into an `IndexPlan` and check guardrails
//! 3. Read the affected rows through a stream over the plan
//! 4. Write them, applying foreign-key actions for hard deletes
//!
//! Three execution shapes sit on top:
//!
//! - sync: every matching row in one call, capped by `mutationMaxRows`
//! - paginate: one caller-driven page per call, resumed by cursor
//! - async: one batch inline, the rest through scheduled continuations
//!
//! Rows of a batch are read completely before the first write, so a
//! guardrail failure never leaves a batch half-written.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use super::cascade;
use super::continuation::{self, BatchSettings, ContinuationPayload, RootTarget};
use super::options::{ExecuteOptions, MutationPage, MutationResult};
use crate::engine::EngineContext;
use crate::errors::{CompositionError, EngineError, EngineResult, GuardrailError};
use crate::filter::{normalize, FilterExpression, RowPredicate, WhereClause};
use crate::observability::{log_event, Event};
use crate::planner::{IndexPlan, PlanStrategy, WhereClauseCompiler};
use crate::schema::{DeleteMode, ExecutionMode, SchemaError, TableSchema};
use crate::store::{Document, Order, CREATION_TIME_FIELD, DELETION_TIME_FIELD, ID_FIELD};
use crate::stream::{Page, PageStatus, PaginationOptions, ProbeMerge, Stream, StreamError};

/// What happens to each selected row
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriteOp {
    Update(Map<String, Value>),
    Delete(DeleteMode),
}

impl WriteOp {
    fn name(&self) -> &'static str {
        match self {
            WriteOp::Update(_) => "update",
            WriteOp::Delete(_) => "delete",
        }
    }
}

/// Row selection of an update or delete
#[derive(Debug, Clone, Default)]
pub(crate) struct Target {
    pub where_clause: Option<WhereClause>,
    pub index: Option<String>,
    pub allow_full_scan: bool,
}

/// How dependents of hard-deleted rows are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cascades {
    /// Resolved and written within the call
    Inline,
    /// Handed to cascade continuation jobs
    Scheduled(BatchSettings),
}

/// A compiled selection
pub(crate) struct Prepared {
    plan: IndexPlan,
    expression: Option<FilterExpression>,
    predicate: Option<RowPredicate>,
}

/// Executes updates and deletes against one table
#[derive(Debug, Clone)]
pub(crate) struct MutationExecutor<'h> {
    ctx: EngineContext<'h>,
    table: &'h TableSchema,
}

impl<'h> MutationExecutor<'h> {
    pub(crate) fn new(ctx: EngineContext<'h>, table: &str) -> EngineResult<Self> {
        let table = ctx.table(table)?;
        Ok(Self { ctx, table })
    }

    pub(crate) fn table(&self) -> &'h TableSchema {
        self.table
    }

    /// Runs the mutation in the requested mode.
    ///
    /// A scheduled delete under an async schema default runs synchronously;
    /// only an explicit async request is rejected.
    pub(crate) fn execute(
        &self,
        target: &Target,
        op: &WriteOp,
        options: &ExecuteOptions,
    ) -> EngineResult<MutationResult> {
        let mode = match (options.mode, op) {
            (Some(mode), _) => mode,
            (None, WriteOp::Delete(DeleteMode::Scheduled)) => ExecutionMode::Sync,
            (None, _) => self.ctx.config().mutation_execution_mode,
        };
        match mode {
            ExecutionMode::Sync => self.execute_sync(target, op),
            ExecutionMode::Async => self.execute_async(target, op, options),
        }
    }

    /// One caller-driven page
    pub(crate) fn paginate(
        &self,
        target: &Target,
        op: &WriteOp,
        options: &PaginationOptions,
    ) -> EngineResult<MutationPage> {
        if options.num_items == 0 {
            return Err(self.reject(CompositionError::conflicting(
                "paginate limit must be positive",
            )));
        }
        self.preflight(op)?;
        let prepared = self.prepare(target, true)?;
        self.run_batch(&prepared, op, options, None, Cascades::Inline)
    }

    fn execute_sync(&self, target: &Target, op: &WriteOp) -> EngineResult<MutationResult> {
        self.preflight(op)?;
        let prepared = self.prepare(target, false)?;
        let rows = self.read_all(&prepared)?;
        let written = self.apply(op, rows, Cascades::Inline)?;
        Ok(MutationResult::done(written.len(), written))
    }

    fn execute_async(
        &self,
        target: &Target,
        op: &WriteOp,
        options: &ExecuteOptions,
    ) -> EngineResult<MutationResult> {
        if matches!(op, WriteOp::Delete(DeleteMode::Scheduled)) {
            return Err(self.reject(CompositionError::ScheduledAsync));
        }
        self.ctx
            .scheduler("executeAsync")
            .map_err(|e| self.reject(e))?;
        self.preflight(op)?;

        let config = self.ctx.config();
        let batch = BatchSettings {
            batch_size: options.batch_size.unwrap_or(config.mutation_batch_size),
            delay_ms: options.delay_ms.unwrap_or(config.mutation_delay_ms),
            max_bytes_per_batch: options
                .max_bytes_per_batch
                .or(config.mutation_max_bytes_per_batch),
        };
        if batch.batch_size == 0 {
            return Err(self.reject(CompositionError::conflicting("batchSize must be positive")));
        }
        if batch.max_bytes_per_batch == Some(0) {
            return Err(self.reject(CompositionError::conflicting(
                "maxBytesPerBatch must be positive",
            )));
        }

        let prepared = self.prepare(target, true)?;
        if prepared.predicate.is_some() {
            return Err(self.reject(CompositionError::PredicateNotSerializable));
        }

        let page_options = PaginationOptions::new(batch.batch_size);
        let page = self.run_batch(
            &prepared,
            op,
            &page_options,
            batch.max_bytes_per_batch,
            Cascades::Scheduled(batch),
        )?;

        let continuation = if page.is_done {
            None
        } else {
            let root = RootTarget {
                expression: prepared.expression.clone(),
                index: target.index.clone(),
                allow_full_scan: target.allow_full_scan,
            };
            let payload = ContinuationPayload {
                cursor: Some(page.continue_cursor.clone()),
                ..ContinuationPayload::root(&self.table.name, op, &root, &batch)
            };
            Some(continuation::schedule(&self.ctx, &payload)?)
        };

        Ok(MutationResult {
            num_affected: page.num_affected,
            returning: page.returning,
            continuation,
            is_done: page.is_done,
        })
    }

    fn reject(&self, err: impl Into<EngineError>) -> EngineError {
        self.ctx.reject(&self.table.name, err)
    }

    /// Checks the operation and the capabilities it needs before any read
    fn preflight(&self, op: &WriteOp) -> EngineResult<()> {
        self.ctx.writer(op.name()).map_err(|e| self.reject(e))?;
        match op {
            WriteOp::Update(set) => self.check_set(set),
            WriteOp::Delete(DeleteMode::Scheduled) => {
                self.ctx
                    .scheduler("scheduled delete")
                    .map_err(|e| self.reject(e))?;
                Ok(())
            }
            WriteOp::Delete(_) => Ok(()),
        }
    }

    pub(crate) fn check_set(&self, set: &Map<String, Value>) -> EngineResult<()> {
        if set.is_empty() {
            return Err(self.reject(CompositionError::conflicting("update has nothing to set")));
        }
        for column in set.keys() {
            if column == ID_FIELD || column == CREATION_TIME_FIELD {
                return Err(self.reject(CompositionError::conflicting(format!(
                    "system field '{}' cannot be written",
                    column
                ))));
            }
            if !self.table.has_column(column) {
                return Err(self.reject(SchemaError::UnknownColumn {
                    table: self.table.name.clone(),
                    column: column.clone(),
                }));
            }
        }
        Ok(())
    }

    /// Compiles the selection and checks the write guardrails
    pub(crate) fn prepare(&self, target: &Target, paginated: bool) -> EngineResult<Prepared> {
        let normalized =
            normalize(self.table, target.where_clause.as_ref()).map_err(|e| self.reject(e))?;
        let compiler = WhereClauseCompiler::new(self.table);
        let expression = normalized.expression.as_ref();
        let plan = match &target.index {
            Some(index) => compiler.compile_with_index(index, expression),
            None => compiler.compile(expression),
        }
        .map_err(|e| self.reject(e))?;

        // disjoint probes share no page boundary
        if paginated && plan.probe_count() > 1 {
            return Err(self.reject(GuardrailError::MultiProbePagination {
                table: self.table.name.clone(),
                probes: plan.probe_count(),
            }));
        }
        if plan.strategy == PlanStrategy::None && !target.allow_full_scan {
            self.ctx.require_opt_in(
                &self.table.name,
                GuardrailError::FullScanRequired {
                    table: self.table.name.clone(),
                    reason: "update/delete without an indexed where clause".into(),
                },
            )?;
        }

        let probes = plan.probe_count().to_string();
        log_event(
            Event::QueryPlanned,
            &[
                ("table", &self.table.name),
                ("index", &plan.selected_index),
                ("strategy", plan.strategy.as_str()),
                ("probes", &probes),
                ("mutation", "true"),
            ],
        );

        Ok(Prepared {
            plan,
            expression: normalized.expression,
            predicate: normalized.predicate,
        })
    }

    fn stream(&self, prepared: &Prepared) -> EngineResult<Stream<'h, Document>> {
        let stream = Stream::from_plan_merged(
            self.ctx.reader(),
            &prepared.plan,
            Order::Asc,
            ProbeMerge::Union,
            &self.ctx.stream_options(),
        )?;
        Ok(match &prepared.predicate {
            Some(predicate) => {
                let predicate = Arc::clone(predicate);
                stream.filter_with(move |doc| predicate(doc))
            }
            None => stream,
        })
    }

    /// Every matching row, failing once more than `mutationMaxRows` match
    fn read_all(&self, prepared: &Prepared) -> EngineResult<Vec<Document>> {
        let max = self.ctx.config().mutation_max_rows;
        let page = self
            .stream(prepared)?
            .paginate(&PaginationOptions::new(max.saturating_add(1)))?;
        if page.page_status == Some(PageStatus::SplitRequired) {
            return Err(self.reject(StreamError::RowReadLimitExceeded {
                limit: self.ctx.config().platform_row_read_limit,
            }));
        }
        if page.page.len() > max {
            return Err(self.reject(GuardrailError::MutationTooLarge {
                table: self.table.name.clone(),
                max,
            }));
        }
        Ok(page.page)
    }

    /// Reads one page of the selection and writes it
    pub(crate) fn run_batch(
        &self,
        prepared: &Prepared,
        op: &WriteOp,
        options: &PaginationOptions,
        max_bytes: Option<usize>,
        cascades: Cascades,
    ) -> EngineResult<MutationPage> {
        let stream = self.stream(prepared)?;
        let page: Page<Document> = match max_bytes {
            Some(max) => stream.paginate_weighted(options, max, Document::approximate_size)?,
            None => stream.paginate(options)?,
        };
        let written = self.apply(op, page.page, cascades)?;
        Ok(MutationPage {
            num_affected: written.len(),
            returning: written,
            continue_cursor: page.continue_cursor,
            is_done: page.is_done,
        })
    }

    /// Writes `rows`, returning them as written
    fn apply(&self, op: &WriteOp, rows: Vec<Document>, cascades: Cascades) -> EngineResult<Vec<Document>> {
        if rows.is_empty() {
            return Ok(rows);
        }
        let writer = self.ctx.writer(op.name())?;
        let table = &self.table.name;

        let written = match op {
            WriteOp::Update(set) => {
                let mut written = Vec::with_capacity(rows.len());
                for mut doc in rows {
                    writer.patch(table, doc.id(), set)?;
                    doc.apply_patch(set);
                    written.push(doc);
                }
                written
            }
            WriteOp::Delete(DeleteMode::Hard) => {
                match cascades {
                    Cascades::Inline => cascade::delete_inline(&self.ctx, table, &rows)?,
                    Cascades::Scheduled(batch) => {
                        cascade::delete_and_schedule(&self.ctx, table, &rows, &batch)?;
                    }
                }
                rows
            }
            WriteOp::Delete(mode) => {
                let marked_at = Utc::now().timestamp_millis();
                let mut marker = Map::new();
                marker.insert(DELETION_TIME_FIELD.to_string(), Value::from(marked_at));

                let mut written = Vec::with_capacity(rows.len());
                for mut doc in rows {
                    writer.patch(table, doc.id(), &marker)?;
                    doc.apply_patch(&marker);
                    written.push(doc);
                }
                if *mode == DeleteMode::Scheduled {
                    self.schedule_delete(&written, marked_at)?;
                }
                written
            }
        };

        self.ctx.metrics().add_rows_mutated(written.len() as u64);
        let rows = written.len().to_string();
        let mode = match op {
            WriteOp::Delete(mode) => mode.as_str(),
            WriteOp::Update(_) => "-",
        };
        log_event(
            Event::MutationBatchCommitted,
            &[
                ("table", table),
                ("operation", op.name()),
                ("mode", mode),
                ("rows", &rows),
            ],
        );
        Ok(written)
    }

    fn schedule_delete(&self, rows: &[Document], marked_at: i64) -> EngineResult<()> {
        let payload = continuation::ScheduledDeletePayload {
            table: self.table.name.clone(),
            ids: rows.iter().map(|d| d.id().to_string()).collect(),
            deletion_time: marked_at,
        };
        let value = serde_json::to_value(&payload)
            .map_err(|e| CompositionError::invalid_payload(e.to_string()))?;
        let scheduler = self.ctx.scheduler("scheduled delete")?;
        let delay_ms = self.ctx.config().scheduled_delete_delay_ms;
        let job = scheduler.run_after(delay_ms, continuation::SCHEDULED_DELETE_FUNCTION, value)?;
        self.ctx.metrics().increment_continuations();

        let job = job.to_string();
        let count = rows.len().to_string();
        log_event(
            Event::ContinuationScheduled,
            &[
                ("table", &self.table.name),
                ("work", "scheduled_delete"),
                ("rows", &count),
                ("job", &job),
            ],
        );
        Ok(())
    }
}
