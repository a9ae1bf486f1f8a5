//! Foreign-key actions on hard delete
//!
//! A `many` edge may declare what happens to its dependent rows when a
//! source row is physically deleted:
//!
//! - `restrict`: the delete fails while dependents exist
//! - `cascade`: dependents are deleted as well, recursively
//! - `set_null`: dependents stay, their foreign columns are nulled
//!
//! Inline deletes resolve the whole dependent tree before the first write.
//! Async deletes remove their batch and hand the dependents to cascade
//! continuation jobs, one job per edge.

use std::collections::{BTreeSet, HashSet};

use serde_json::{Map, Value};

use super::continuation::{self, BatchSettings, ContinuationPayload, WorkType};
use crate::engine::EngineContext;
use crate::errors::{EngineResult, GuardrailError};
use crate::index::{IndexKey, IndexRange};
use crate::observability::{log_event, Event};
use crate::schema::{ForeignKeyAction, RelationEdge};
use crate::store::{Document, Order, ScanRequest};

/// Nulls every column in `columns`
pub(crate) fn null_patch(columns: &[String]) -> Map<String, Value> {
    columns
        .iter()
        .map(|column| (column.clone(), Value::Null))
        .collect()
}

/// Hard-deletes `rows` of `table` with every foreign-key action applied.
///
/// Fails before writing anything when a restrict edge has dependents or the
/// dependent tree exceeds `mutationMaxRows`.
pub(crate) fn delete_inline<'h>(
    ctx: &EngineContext<'h>,
    table: &'h str,
    rows: &[Document],
) -> EngineResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut plan = CascadePlan::new(ctx, rows.len());
    plan.collect(table, rows)?;
    plan.apply(rows.len())
}

/// Hard-deletes `rows` and schedules cascade jobs for their dependents
pub(crate) fn delete_and_schedule<'h>(
    ctx: &EngineContext<'h>,
    table: &'h str,
    rows: &[Document],
    batch: &BatchSettings,
) -> EngineResult<()> {
    let mut jobs = Vec::new();
    for edge in ctx.schema().relations().dependents(table) {
        let index = required_index(ctx, edge)?;
        let values = parent_values(edge, rows);
        if values.is_empty() {
            continue;
        }
        match edge.on_delete {
            ForeignKeyAction::Restrict => check_restrict(ctx, edge, index, &values)?,
            ForeignKeyAction::Cascade => jobs.push(ContinuationPayload::cascade(
                edge,
                index,
                values,
                WorkType::CascadeDelete,
                batch,
            )),
            ForeignKeyAction::SetNull => jobs.push(ContinuationPayload::cascade(
                edge,
                index,
                values,
                WorkType::CascadeSetNull,
                batch,
            )),
            ForeignKeyAction::NoAction => {}
        }
    }

    let writer = ctx.writer("delete")?;
    for row in rows {
        writer.delete(table, row.id())?;
    }
    for job in &jobs {
        continuation::schedule(ctx, job)?;
    }
    Ok(())
}

/// Dependent writes collected before anything is written
struct CascadePlan<'c, 'h> {
    ctx: &'c EngineContext<'h>,
    /// Rows the tree may still add
    remaining: usize,
    visited: HashSet<(&'h str, String)>,
    deletes: Vec<(&'h str, String)>,
    set_nulls: Vec<(&'h str, String, &'h [String])>,
}

impl<'c, 'h> CascadePlan<'c, 'h> {
    fn new(ctx: &'c EngineContext<'h>, roots: usize) -> Self {
        Self {
            ctx,
            remaining: ctx.config().mutation_max_rows.saturating_sub(roots),
            visited: HashSet::new(),
            deletes: Vec::new(),
            set_nulls: Vec::new(),
        }
    }

    fn collect(&mut self, table: &'h str, rows: &[Document]) -> EngineResult<()> {
        let fresh: Vec<&Document> = rows
            .iter()
            .filter(|row| self.visited.insert((table, row.id().to_string())))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        self.deletes
            .extend(fresh.iter().map(|row| (table, row.id().to_string())));

        let fresh: Vec<Document> = fresh.into_iter().cloned().collect();
        for edge in self.ctx.schema().relations().dependents(table) {
            let index = required_index(self.ctx, edge)?;
            let values = parent_values(edge, &fresh);
            if values.is_empty() {
                continue;
            }
            match edge.on_delete {
                ForeignKeyAction::Restrict => check_restrict(self.ctx, edge, index, &values)?,
                ForeignKeyAction::Cascade => {
                    let children = self.children(edge, index, &values)?;
                    log_applied(edge, children.len());
                    self.collect(&edge.target_table, &children)?;
                }
                ForeignKeyAction::SetNull => {
                    let children = self.children(edge, index, &values)?;
                    log_applied(edge, children.len());
                    for child in children {
                        self.set_nulls.push((
                            edge.target_table.as_str(),
                            child.id().to_string(),
                            edge.to_columns.as_slice(),
                        ));
                    }
                }
                ForeignKeyAction::NoAction => {}
            }
        }
        Ok(())
    }

    /// Dependents of every parent key, charged against the row cap
    fn children(
        &mut self,
        edge: &'h RelationEdge,
        index: &str,
        values: &[Vec<Value>],
    ) -> EngineResult<Vec<Document>> {
        let mut out = Vec::new();
        for tuple in values {
            let limit = self.remaining.saturating_add(1);
            let rows = scan_dependents(self.ctx, edge, index, tuple, limit)?;
            if rows.len() > self.remaining {
                return Err(self.ctx.reject(
                    &edge.source_table,
                    GuardrailError::MutationTooLarge {
                        table: edge.target_table.clone(),
                        max: self.ctx.config().mutation_max_rows,
                    },
                ));
            }
            self.remaining -= rows.len();
            out.extend(rows);
        }
        Ok(out)
    }

    fn apply(self, roots: usize) -> EngineResult<()> {
        let writer = self.ctx.writer("delete")?;
        // nulled rows may be deleted further down the tree
        for (table, id, columns) in &self.set_nulls {
            if self.visited.contains(&(*table, id.clone())) {
                continue;
            }
            writer.patch(table, id, &null_patch(columns))?;
        }
        for (table, id) in &self.deletes {
            writer.delete(table, id)?;
        }

        let dependents = self.deletes.len().saturating_sub(roots) + self.set_nulls.len();
        self.ctx.metrics().add_rows_mutated(dependents as u64);
        Ok(())
    }
}

fn log_applied(edge: &RelationEdge, rows: usize) {
    let relation = format!("{}.{}", edge.source_table, edge.alias);
    let rows = rows.to_string();
    let action = match edge.on_delete {
        ForeignKeyAction::Cascade => "cascade",
        ForeignKeyAction::SetNull => "set_null",
        ForeignKeyAction::Restrict => "restrict",
        ForeignKeyAction::NoAction => "no_action",
    };
    log_event(
        Event::CascadeApplied,
        &[("relation", &relation), ("action", action), ("rows", &rows)],
    );
}

/// Index on the dependent side; cascades never fall back to a full scan
fn required_index<'h>(ctx: &EngineContext<'h>, edge: &'h RelationEdge) -> EngineResult<&'h str> {
    edge.required_index.as_deref().ok_or_else(|| {
        ctx.reject(
            &edge.source_table,
            GuardrailError::MissingRelationIndex {
                relation: format!("{}.{}", edge.source_table, edge.alias),
            },
        )
    })
}

/// Distinct non-null parent key tuples, in key order
fn parent_values(edge: &RelationEdge, rows: &[Document]) -> Vec<Vec<Value>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for row in rows {
        let tuple: Vec<Value> = edge
            .from_columns
            .iter()
            .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
            .collect();
        if tuple.iter().any(Value::is_null) {
            continue;
        }
        let key: Vec<IndexKey> = tuple.iter().map(IndexKey::from_json).collect();
        if seen.insert(key) {
            out.push(tuple);
        }
    }
    out
}

fn check_restrict(
    ctx: &EngineContext<'_>,
    edge: &RelationEdge,
    index: &str,
    values: &[Vec<Value>],
) -> EngineResult<()> {
    for tuple in values {
        if !scan_dependents(ctx, edge, index, tuple, 1)?.is_empty() {
            return Err(ctx.reject(
                &edge.source_table,
                GuardrailError::RestrictViolation {
                    table: edge.source_table.clone(),
                    dependent: edge.target_table.clone(),
                },
            ));
        }
    }
    Ok(())
}

/// Up to `limit` dependents of one parent key
fn scan_dependents(
    ctx: &EngineContext<'_>,
    edge: &RelationEdge,
    index: &str,
    tuple: &[Value],
    limit: usize,
) -> EngineResult<Vec<Document>> {
    let range = IndexRange {
        eq: tuple.iter().map(IndexKey::from_json).collect(),
        ..IndexRange::default()
    };
    let batch_size = ctx.config().scan_batch_size.max(1);
    let metrics = ctx.metrics();
    let mut docs = Vec::new();
    let mut start_after = None;
    loop {
        let request = ScanRequest {
            table: edge.target_table.clone(),
            index: index.to_string(),
            range: range.clone(),
            order: Order::Asc,
            start_after: start_after.take(),
            end_at: None,
            limit: batch_size.min(limit - docs.len()),
        };
        let batch = ctx.reader().scan(&request)?;
        metrics.increment_host_scans();
        metrics.add_rows_read(batch.entries.len() as u64);

        let done = batch.exhausted || batch.entries.is_empty();
        for entry in batch.entries {
            start_after = Some(entry.position);
            docs.push(entry.document);
        }
        if done || docs.len() >= limit {
            return Ok(docs);
        }
    }
}
