//! Engine facade
//!
//! `Orm` binds one immutable `Schema` to the host capabilities of a single
//! invocation. Nothing is cached between calls; every executor receives the
//! same `EngineContext` explicitly.
//!
//! # Design Principles
//!
//! - The schema is built once and threaded through, never looked up globally
//! - Host capabilities are optional; a call that needs a missing one fails
//!   before touching the host
//! - Guardrail rejections are logged and counted in one place

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::errors::{CompositionError, EngineError, EngineResult, GuardrailError};
use crate::filter::{normalize, WhereClause};
use crate::mutation::{
    run_continuation, run_scheduled_delete, DeleteBuilder, InsertBuilder, JobOutcome,
    UpdateBuilder, CONTINUATION_FUNCTION, SCHEDULED_DELETE_FUNCTION,
};
use crate::observability::{log_event, EngineMetrics, Event};
use crate::planner::{ExplainPlan, WhereClauseCompiler};
use crate::query::QueryExecutor;
use crate::relation::RelationLoader;
use crate::schema::{EngineConfig, Schema, TableSchema};
use crate::store::{
    DocumentReader, DocumentWriter, MemoryScheduler, MemoryStore, Scheduler, SearchProvider,
};
use crate::stream::StreamOptions;

/// Host capabilities available to one invocation
#[derive(Clone, Copy)]
pub struct Host<'h> {
    pub reader: &'h dyn DocumentReader,
    pub writer: Option<&'h dyn DocumentWriter>,
    pub scheduler: Option<&'h dyn Scheduler>,
    pub search: Option<&'h dyn SearchProvider>,
}

impl<'h> Host<'h> {
    /// Read-only host
    pub fn new(reader: &'h dyn DocumentReader) -> Self {
        Self {
            reader,
            writer: None,
            scheduler: None,
            search: None,
        }
    }

    /// Every capability backed by the in-memory reference host
    pub fn memory(store: &'h MemoryStore, scheduler: &'h MemoryScheduler) -> Self {
        Self {
            reader: store,
            writer: Some(store),
            scheduler: Some(scheduler),
            search: Some(store),
        }
    }

    pub fn with_writer(mut self, writer: &'h dyn DocumentWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_scheduler(mut self, scheduler: &'h dyn Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_search(mut self, search: &'h dyn SearchProvider) -> Self {
        self.search = Some(search);
        self
    }
}

impl fmt::Debug for Host<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("writer", &self.writer.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .field("search", &self.search.is_some())
            .finish()
    }
}

/// Everything an executor needs for one call
#[derive(Clone, Debug)]
pub struct EngineContext<'h> {
    schema: &'h Schema,
    host: Host<'h>,
    metrics: Arc<EngineMetrics>,
}

impl<'h> EngineContext<'h> {
    pub fn new(schema: &'h Schema, host: Host<'h>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            schema,
            host,
            metrics,
        }
    }

    pub fn schema(&self) -> &'h Schema {
        self.schema
    }

    pub fn config(&self) -> &'h EngineConfig {
        self.schema.config()
    }

    pub fn table(&self, name: &str) -> EngineResult<&'h TableSchema> {
        Ok(self.schema.table(name)?)
    }

    pub fn reader(&self) -> &'h dyn DocumentReader {
        self.host.reader
    }

    pub fn writer(&self, operation: &'static str) -> EngineResult<&'h dyn DocumentWriter> {
        self.host
            .writer
            .ok_or_else(|| CompositionError::WriterRequired { operation }.into())
    }

    pub fn scheduler(&self, operation: &'static str) -> EngineResult<&'h dyn Scheduler> {
        self.host
            .scheduler
            .ok_or_else(|| CompositionError::SchedulerRequired { operation }.into())
    }

    pub fn search(&self) -> EngineResult<&'h dyn SearchProvider> {
        self.host
            .search
            .ok_or_else(|| CompositionError::SearchProviderRequired.into())
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Scan tuning derived from the configuration
    pub fn stream_options(&self) -> StreamOptions {
        let config = self.config();
        StreamOptions::default()
            .with_batch_size(config.scan_batch_size)
            .with_row_read_limit(config.platform_row_read_limit)
            .with_metrics(Arc::clone(&self.metrics))
    }

    /// Records a rejected call and hands the error back
    pub fn reject(&self, table: &str, err: impl Into<EngineError>) -> EngineError {
        let err = err.into();
        self.metrics.increment_queries_rejected();
        log_event(
            Event::QueryRejected,
            &[("table", table), ("code", err.code()), ("reason", &err.to_string())],
        );
        err
    }

    /// Enforces an opt-in guardrail.
    ///
    /// Strict schemas reject; relaxed schemas log a warning and proceed.
    pub fn require_opt_in(&self, table: &str, err: GuardrailError) -> EngineResult<()> {
        if self.config().strict {
            return Err(self.reject(table, err));
        }
        warn!(table, code = err.code(), reason = %err, "proceeding without opt-in (relaxed schema)");
        Ok(())
    }
}

/// Query and mutation entry point
#[derive(Debug, Clone)]
pub struct Orm<'h> {
    ctx: EngineContext<'h>,
}

impl<'h> Orm<'h> {
    pub fn new(schema: &'h Schema, host: Host<'h>) -> Self {
        Self {
            ctx: EngineContext::new(schema, host, Arc::new(EngineMetrics::new())),
        }
    }

    /// Shares counters with other invocations
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.ctx.metrics = metrics;
        self
    }

    pub fn context(&self) -> &EngineContext<'h> {
        &self.ctx
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        self.ctx.metrics()
    }

    pub fn query(&self, table: &str) -> EngineResult<QueryExecutor<'h>> {
        QueryExecutor::new(self.ctx.clone(), table)
    }

    pub fn loader(&self) -> RelationLoader<'h> {
        RelationLoader::new(self.ctx.clone())
    }

    pub fn insert(&self, table: &str) -> EngineResult<InsertBuilder<'h>> {
        InsertBuilder::new(self.ctx.clone(), table)
    }

    pub fn update(&self, table: &str) -> EngineResult<UpdateBuilder<'h>> {
        UpdateBuilder::new(self.ctx.clone(), table)
    }

    pub fn delete(&self, table: &str) -> EngineResult<DeleteBuilder<'h>> {
        DeleteBuilder::new(self.ctx.clone(), table)
    }

    /// Plan a where clause would run with, without touching the host
    pub fn explain(&self, table: &str, clause: Option<&WhereClause>) -> EngineResult<ExplainPlan> {
        let schema = self.ctx.table(table)?;
        let normalized = normalize(schema, clause)?;
        let compiler = WhereClauseCompiler::new(schema);
        Ok(match compiler.compile(normalized.expression.as_ref()) {
            Ok(plan) => ExplainPlan::from_plan(&plan),
            Err(err) => ExplainPlan::from_error(&err),
        })
    }

    /// Runs one scheduled job by function name
    pub fn handle_job(&self, function: &str, payload: &Value) -> EngineResult<JobOutcome> {
        match function {
            CONTINUATION_FUNCTION => run_continuation(&self.ctx, payload),
            SCHEDULED_DELETE_FUNCTION => run_scheduled_delete(&self.ctx, payload),
            other => Err(CompositionError::invalid_payload(format!(
                "unknown scheduled function '{}'",
                other
            ))
            .into()),
        }
    }

    /// Runs every queued job, including follow-ups, in schedule order.
    ///
    /// Stops at the first failing job; it is not retried.
    pub fn drain(&self, scheduler: &MemoryScheduler) -> EngineResult<usize> {
        scheduler.drain(|job| self.handle_job(&job.function, &job.payload).map(|_| ()))
    }
}
