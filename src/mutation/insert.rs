//! `insert(table).values(..)`
//!
//! Rows are written one at a time in the order given. With an on-conflict
//! clause each row is first looked up through the index covering the
//! conflict target; rows with a null in any target column never conflict.

use serde_json::{Map, Value};

use super::options::MutationResult;
use crate::engine::EngineContext;
use crate::errors::{CompositionError, EngineError, EngineResult, GuardrailError};
use crate::index::{IndexKey, IndexRange};
use crate::observability::{log_event, Event};
use crate::schema::{SchemaError, TableSchema};
use crate::store::{Document, Order, ScanRequest, CREATION_TIME_FIELD, ID_FIELD};

/// What to do when a row collides with an existing one
#[derive(Debug, Clone, PartialEq)]
enum OnConflict {
    DoNothing { target: Vec<String> },
    DoUpdate { target: Vec<String>, set: Value },
}

impl OnConflict {
    fn target(&self) -> &[String] {
        match self {
            OnConflict::DoNothing { target } | OnConflict::DoUpdate { target, .. } => target,
        }
    }
}

/// Inserts rows into one table
#[derive(Debug, Clone)]
pub struct InsertBuilder<'h> {
    ctx: EngineContext<'h>,
    table: &'h TableSchema,
    rows: Vec<Value>,
    on_conflict: Option<OnConflict>,
    returning: bool,
}

impl<'h> InsertBuilder<'h> {
    pub fn new(ctx: EngineContext<'h>, table: &str) -> EngineResult<Self> {
        let table = ctx.table(table)?;
        Ok(Self {
            ctx,
            table,
            rows: Vec::new(),
            on_conflict: None,
            returning: false,
        })
    }

    /// Adds one row, a JSON object
    pub fn value(mut self, row: Value) -> Self {
        self.rows.push(row);
        self
    }

    pub fn values(mut self, rows: impl IntoIterator<Item = Value>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Skips rows whose `target` columns match an existing row
    pub fn on_conflict_do_nothing<I, S>(mut self, target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_conflict = Some(OnConflict::DoNothing {
            target: target.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Patches the existing row with `set` instead of inserting
    pub fn on_conflict_do_update<I, S>(mut self, target: I, set: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_conflict = Some(OnConflict::DoUpdate {
            target: target.into_iter().map(Into::into).collect(),
            set,
        });
        self
    }

    /// Writes every row.
    ///
    /// `num_affected` counts inserted and conflict-updated rows; skipped
    /// rows are not counted.
    pub fn execute(&self) -> EngineResult<MutationResult> {
        let writer = self.ctx.writer("insert").map_err(|e| self.reject(e))?;
        let rows = self.validated_rows()?;
        let conflict = self.resolve_conflict()?;

        let mut affected = 0;
        let mut skipped = 0;
        let mut returning = Vec::new();
        for row in rows {
            let existing = match &conflict {
                Some((index, clause)) => self.find_existing(index, clause.target(), &row)?,
                None => None,
            };

            let written = match (existing, &conflict) {
                (Some(_), Some((_, OnConflict::DoNothing { .. }))) => {
                    skipped += 1;
                    continue;
                }
                (Some(mut doc), Some((_, OnConflict::DoUpdate { set, .. }))) => {
                    let set = self.object(set)?;
                    writer.patch(&self.table.name, doc.id(), &set)?;
                    doc.apply_patch(&set);
                    doc
                }
                _ => {
                    let id = writer.insert(&self.table.name, row.clone())?;
                    if self.returning {
                        self.ctx.metrics().increment_point_reads();
                        self.ctx
                            .reader()
                            .get(&self.table.name, &id)?
                            .unwrap_or_else(|| Document::new(id, 0.0, row))
                    } else {
                        Document::new(id, 0.0, row)
                    }
                }
            };
            affected += 1;
            if self.returning {
                returning.push(written);
            }
        }

        self.ctx.metrics().add_rows_mutated(affected as u64);
        let rows = affected.to_string();
        let skipped = skipped.to_string();
        log_event(
            Event::MutationBatchCommitted,
            &[
                ("table", &self.table.name),
                ("operation", "insert"),
                ("rows", &rows),
                ("skipped", &skipped),
            ],
        );
        Ok(MutationResult::done(affected, returning))
    }

    fn reject(&self, err: impl Into<EngineError>) -> EngineError {
        self.ctx.reject(&self.table.name, err)
    }

    fn object(&self, value: &Value) -> EngineResult<Map<String, Value>> {
        let Value::Object(map) = value else {
            return Err(self.reject(CompositionError::conflicting(
                "insert rows and conflict updates must be JSON objects",
            )));
        };
        for column in map.keys() {
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
        Ok(map.clone())
    }

    fn validated_rows(&self) -> EngineResult<Vec<Map<String, Value>>> {
        let max = self.ctx.config().mutation_max_rows;
        if self.rows.len() > max {
            return Err(self.reject(GuardrailError::MutationTooLarge {
                table: self.table.name.clone(),
                max,
            }));
        }
        if let Some(OnConflict::DoUpdate { set, .. }) = &self.on_conflict {
            self.object(set)?;
        }
        self.rows.iter().map(|row| self.object(row)).collect()
    }

    /// Index serving the conflict target
    fn resolve_conflict(&self) -> EngineResult<Option<(&'h str, &OnConflict)>> {
        let Some(clause) = &self.on_conflict else {
            return Ok(None);
        };
        let target = clause.target();
        if target.is_empty() {
            return Err(self.reject(CompositionError::conflicting(
                "on-conflict target must name at least one column",
            )));
        }
        if let Some(column) = target.iter().find(|c| !self.table.has_column(c)) {
            return Err(self.reject(SchemaError::UnknownColumn {
                table: self.table.name.clone(),
                column: column.clone(),
            }));
        }
        let index = self.table.index_covering(target).ok_or_else(|| {
            self.reject(GuardrailError::ConflictTargetNotIndexed {
                table: self.table.name.clone(),
                columns: target.to_vec(),
            })
        })?;
        Ok(Some((index.name.as_str(), clause)))
    }

    fn find_existing(
        &self,
        index: &str,
        target: &[String],
        row: &Map<String, Value>,
    ) -> EngineResult<Option<Document>> {
        let keys: Vec<IndexKey> = target
            .iter()
            .map(|column| IndexKey::from_field(row.get(column)))
            .collect();
        if keys.iter().any(IndexKey::is_null) {
            return Ok(None);
        }
        let request = ScanRequest {
            table: self.table.name.clone(),
            index: index.to_string(),
            range: IndexRange {
                eq: keys,
                ..IndexRange::default()
            },
            order: Order::Asc,
            start_after: None,
            end_at: None,
            limit: 1,
        };
        let batch = self.ctx.reader().scan(&request)?;
        self.ctx.metrics().increment_host_scans();
        self.ctx.metrics().add_rows_read(batch.entries.len() as u64);
        Ok(batch.entries.into_iter().next().map(|entry| entry.document))
    }
}
