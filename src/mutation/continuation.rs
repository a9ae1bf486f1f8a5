//! Scheduled mutation work
//!
//! Async bulk mutations run one batch inline and hand the rest to the
//! scheduler as a `ContinuationPayload`. Each job runs exactly one batch and
//! schedules its successor only after that batch is written, so a logical
//! job never has two batches in flight.
//!
//! Payloads arrive from the scheduler as plain JSON and are validated before
//! anything is read.
//!
//! Two functions are registered with the scheduler:
//!
//! - `mutation_continuation`: root batches and foreign-key cascade batches
//! - `scheduled_delete`: physical removal of rows marked by a scheduled delete

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::cascade;
use super::executor::{Cascades, MutationExecutor, Target, WriteOp};
use super::options::JobOutcome;
use crate::engine::EngineContext;
use crate::errors::{CompositionError, EngineResult};
use crate::filter::{builder, FilterExpression};
use crate::observability::{log_event, Event};
use crate::schema::{DeleteMode, RelationEdge};
use crate::store::DELETION_TIME_FIELD;
use crate::stream::PaginationOptions;

/// Scheduler function running continuation batches
pub const CONTINUATION_FUNCTION: &str = "mutation_continuation";

/// Scheduler function physically removing marked rows
pub const SCHEDULED_DELETE_FUNCTION: &str = "scheduled_delete";

/// What a continuation job works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    /// Rows selected by the original where clause
    Root,
    /// Dependents of hard-deleted rows, deleted in turn
    CascadeDelete,
    /// Dependents of hard-deleted rows, foreign columns nulled
    CascadeSetNull,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Root => "root",
            WorkType::CascadeDelete => "cascade_delete",
            WorkType::CascadeSetNull => "cascade_set_null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOperation {
    Update,
    Delete,
}

impl MutationOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOperation::Update => "update",
            MutationOperation::Delete => "delete",
        }
    }
}

/// Wire payload of one continuation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationPayload {
    pub work_type: WorkType,
    pub operation: MutationOperation,
    pub table: String,
    /// Resume point; `None` starts at the beginning of the range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub batch_size: usize,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes_per_batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_mode: Option<DeleteMode>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_expression: Option<FilterExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub allow_full_scan: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_source_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_index_name: Option<String>,
    /// Remaining parent key tuples; the first one is in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_values: Option<Vec<Vec<Value>>>,
}

impl ContinuationPayload {
    /// Continuation of a root update or delete
    pub(crate) fn root(table: &str, op: &WriteOp, target: &RootTarget, batch: &BatchSettings) -> Self {
        let (operation, update, delete_mode) = match op {
            WriteOp::Update(set) => (MutationOperation::Update, Some(set.clone()), None),
            WriteOp::Delete(mode) => (MutationOperation::Delete, None, Some(*mode)),
        };
        Self {
            work_type: WorkType::Root,
            operation,
            table: table.to_string(),
            cursor: None,
            batch_size: batch.batch_size,
            delay_ms: batch.delay_ms,
            max_bytes_per_batch: batch.max_bytes_per_batch,
            update,
            delete_mode,
            where_expression: target.expression.clone(),
            index: target.index.clone(),
            allow_full_scan: target.allow_full_scan,
            foreign_source_columns: None,
            foreign_index_name: None,
            target_values: None,
        }
    }

    /// Cascade work over the dependents of deleted rows
    pub(crate) fn cascade(
        edge: &RelationEdge,
        index: &str,
        target_values: Vec<Vec<Value>>,
        work_type: WorkType,
        batch: &BatchSettings,
    ) -> Self {
        let operation = match work_type {
            WorkType::CascadeSetNull => MutationOperation::Update,
            _ => MutationOperation::Delete,
        };
        Self {
            work_type,
            operation,
            table: edge.target_table.clone(),
            cursor: None,
            batch_size: batch.batch_size,
            delay_ms: batch.delay_ms,
            max_bytes_per_batch: batch.max_bytes_per_batch,
            update: None,
            delete_mode: None,
            where_expression: None,
            index: None,
            allow_full_scan: false,
            foreign_source_columns: Some(edge.to_columns.clone()),
            foreign_index_name: Some(index.to_string()),
            target_values: Some(target_values),
        }
    }

    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let payload: ContinuationPayload = serde_json::from_value(value.clone())
            .map_err(|e| CompositionError::invalid_payload(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn to_value(&self) -> EngineResult<Value> {
        Ok(serde_json::to_value(self).map_err(|e| CompositionError::invalid_payload(e.to_string()))?)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.batch_size == 0 {
            return Err(CompositionError::invalid_payload("batchSize must be positive").into());
        }
        if self.max_bytes_per_batch == Some(0) {
            return Err(
                CompositionError::invalid_payload("maxBytesPerBatch must be positive").into(),
            );
        }
        if self.delete_mode == Some(DeleteMode::Scheduled) {
            return Err(CompositionError::invalid_payload(
                "scheduled deletes cannot be resumed by a continuation",
            )
            .into());
        }

        match self.work_type {
            WorkType::Root => {
                match self.operation {
                    MutationOperation::Update if self.update.is_none() => {
                        return Err(
                            CompositionError::invalid_payload("root update requires update").into(),
                        );
                    }
                    MutationOperation::Delete if self.delete_mode.is_none() => {
                        return Err(CompositionError::invalid_payload(
                            "root delete requires deleteMode",
                        )
                        .into());
                    }
                    _ => {}
                }
                if self.foreign_source_columns.is_some()
                    || self.foreign_index_name.is_some()
                    || self.target_values.is_some()
                {
                    return Err(CompositionError::invalid_payload(
                        "root work cannot carry cascade fields",
                    )
                    .into());
                }
            }
            WorkType::CascadeDelete | WorkType::CascadeSetNull => {
                let (Some(columns), Some(_), Some(values)) = (
                    &self.foreign_source_columns,
                    &self.foreign_index_name,
                    &self.target_values,
                ) else {
                    return Err(CompositionError::invalid_payload(
                        "cascade work requires foreignSourceColumns, foreignIndexName and targetValues",
                    )
                    .into());
                };
                if columns.is_empty() {
                    return Err(CompositionError::invalid_payload(
                        "foreignSourceColumns must not be empty",
                    )
                    .into());
                }
                if values.iter().any(|tuple| tuple.len() != columns.len()) {
                    return Err(CompositionError::invalid_payload(
                        "targetValues tuples must match foreignSourceColumns",
                    )
                    .into());
                }
                let expected = match self.work_type {
                    WorkType::CascadeSetNull => MutationOperation::Update,
                    _ => MutationOperation::Delete,
                };
                if self.operation != expected {
                    return Err(CompositionError::invalid_payload(format!(
                        "{} work must be a {}",
                        self.work_type.as_str(),
                        expected.as_str()
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Selection carried by a root continuation
#[derive(Debug, Clone, Default)]
pub(crate) struct RootTarget {
    pub expression: Option<FilterExpression>,
    pub index: Option<String>,
    pub allow_full_scan: bool,
}

/// Batch shape shared by a job and its successors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchSettings {
    pub batch_size: usize,
    pub delay_ms: u64,
    pub max_bytes_per_batch: Option<usize>,
}

impl BatchSettings {
    fn of(payload: &ContinuationPayload) -> Self {
        Self {
            batch_size: payload.batch_size,
            delay_ms: payload.delay_ms,
            max_bytes_per_batch: payload.max_bytes_per_batch,
        }
    }
}

/// Hands a validated payload to the scheduler
pub(crate) fn schedule(ctx: &EngineContext<'_>, payload: &ContinuationPayload) -> EngineResult<Uuid> {
    payload.validate()?;
    let scheduler = ctx.scheduler("continuation")?;
    let job = scheduler.run_after(payload.delay_ms, CONTINUATION_FUNCTION, payload.to_value()?)?;
    ctx.metrics().increment_continuations();

    let batch_size = payload.batch_size.to_string();
    let job_id = job.to_string();
    log_event(
        Event::ContinuationScheduled,
        &[
            ("table", &payload.table),
            ("work", payload.work_type.as_str()),
            ("operation", payload.operation.as_str()),
            ("batch_size", &batch_size),
            ("job", &job_id),
        ],
    );
    Ok(job)
}

/// Runs one continuation batch and schedules the next one if rows remain
pub fn run_continuation(ctx: &EngineContext<'_>, payload: &Value) -> EngineResult<JobOutcome> {
    let payload = ContinuationPayload::from_value(payload)?;
    let executor = MutationExecutor::new(ctx.clone(), &payload.table)?;
    let batch = BatchSettings::of(&payload);
    let page_options = PaginationOptions::new(payload.batch_size).with_cursor(payload.cursor.clone());

    let (target, op) = match payload.work_type {
        WorkType::Root => {
            let op = match payload.operation {
                MutationOperation::Update => WriteOp::Update(payload.update.clone().unwrap_or_default()),
                MutationOperation::Delete => {
                    WriteOp::Delete(payload.delete_mode.unwrap_or(DeleteMode::Hard))
                }
            };
            let target = Target {
                where_clause: payload.where_expression.clone().map(Into::into),
                index: payload.index.clone(),
                allow_full_scan: payload.allow_full_scan,
            };
            (target, op)
        }
        WorkType::CascadeDelete | WorkType::CascadeSetNull => {
            let Some(target) = cascade_target(&payload) else {
                log_completed(&payload);
                return Ok(JobOutcome {
                    num_affected: 0,
                    scheduled: None,
                });
            };
            let op = match payload.work_type {
                WorkType::CascadeSetNull => WriteOp::Update(cascade::null_patch(
                    payload.foreign_source_columns.as_deref().unwrap_or_default(),
                )),
                _ => WriteOp::Delete(DeleteMode::Hard),
            };
            (target, op)
        }
    };

    let prepared = executor.prepare(&target, true)?;
    let page = executor.run_batch(&prepared, &op, &page_options, batch.max_bytes_per_batch, Cascades::Scheduled(batch))?;

    let next = match (page.is_done, payload.work_type) {
        (false, _) => Some(ContinuationPayload {
            cursor: Some(page.continue_cursor.clone()),
            ..payload.clone()
        }),
        (true, WorkType::Root) => None,
        (true, _) => {
            let mut rest = payload.target_values.clone().unwrap_or_default();
            if !rest.is_empty() {
                rest.remove(0);
            }
            (!rest.is_empty()).then(|| ContinuationPayload {
                cursor: None,
                target_values: Some(rest),
                ..payload.clone()
            })
        }
    };

    let scheduled = match next {
        Some(next) => Some(schedule(ctx, &next)?),
        None => {
            log_completed(&payload);
            None
        }
    };
    Ok(JobOutcome {
        num_affected: page.num_affected,
        scheduled,
    })
}

/// Dependents of the first pending parent key
fn cascade_target(payload: &ContinuationPayload) -> Option<Target> {
    let columns = payload.foreign_source_columns.as_ref()?;
    let values = payload.target_values.as_ref()?.first()?;
    let conjuncts = columns
        .iter()
        .zip(values)
        .map(|(column, value)| builder::eq(column, value.clone()))
        .collect();
    Some(Target {
        where_clause: FilterExpression::and_all(conjuncts).map(Into::into),
        index: payload.foreign_index_name.clone(),
        allow_full_scan: false,
    })
}

fn log_completed(payload: &ContinuationPayload) {
    log_event(
        Event::ContinuationCompleted,
        &[
            ("table", &payload.table),
            ("work", payload.work_type.as_str()),
            ("operation", payload.operation.as_str()),
        ],
    );
}

/// Wire payload of a scheduled delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDeletePayload {
    pub table: String,
    pub ids: Vec<String>,
    /// Marker written when the rows were scheduled, in epoch milliseconds
    pub deletion_time: i64,
}

/// Hard-deletes marked rows whose marker is unchanged.
///
/// Rows that were deleted meanwhile, or re-marked or unmarked, are skipped.
pub fn run_scheduled_delete(ctx: &EngineContext<'_>, payload: &Value) -> EngineResult<JobOutcome> {
    let payload: ScheduledDeletePayload = serde_json::from_value(payload.clone())
        .map_err(|e| CompositionError::invalid_payload(e.to_string()))?;
    let table = ctx.table(&payload.table)?;
    ctx.writer("scheduled delete")?;

    let mut due = Vec::new();
    for id in &payload.ids {
        ctx.metrics().increment_point_reads();
        let Some(doc) = ctx.reader().get(&table.name, id)? else {
            continue;
        };
        let marker = doc.get(DELETION_TIME_FIELD).and_then(Value::as_i64);
        if marker == Some(payload.deletion_time) {
            due.push(doc);
        }
    }

    cascade::delete_inline(ctx, &table.name, &due)?;
    ctx.metrics().add_rows_mutated(due.len() as u64);

    let rows = due.len().to_string();
    let skipped = (payload.ids.len() - due.len()).to_string();
    log_event(
        Event::ScheduledDeleteExecuted,
        &[("table", &table.name), ("rows", &rows), ("skipped", &skipped)],
    );
    Ok(JobOutcome {
        num_affected: due.len(),
        scheduled: None,
    })
}
