//! `update(table).set(..).where(..)`

use serde_json::{Map, Value};

use super::executor::{MutationExecutor, Target, WriteOp};
use super::options::{ExecuteOptions, MutationPage, MutationResult};
use crate::engine::EngineContext;
use crate::errors::{CompositionError, EngineResult};
use crate::filter::WhereClause;
use crate::schema::ExecutionMode;
use crate::stream::PaginationOptions;

/// Bulk update of the rows matching a where clause
#[derive(Debug, Clone)]
pub struct UpdateBuilder<'h> {
    executor: MutationExecutor<'h>,
    set: Option<Value>,
    target: Target,
    returning: bool,
}

impl<'h> UpdateBuilder<'h> {
    pub fn new(ctx: EngineContext<'h>, table: &str) -> EngineResult<Self> {
        Ok(Self {
            executor: MutationExecutor::new(ctx, table)?,
            set: None,
            target: Target::default(),
            returning: false,
        })
    }

    /// Fields to write, as a JSON object. Merged shallowly into each row.
    pub fn set(mut self, values: Value) -> Self {
        self.set = Some(values);
        self
    }

    pub fn with_where(mut self, clause: impl Into<WhereClause>) -> Self {
        self.target.where_clause = Some(clause.into());
        self
    }

    /// Forces the index the where clause is planned against
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.target.index = Some(index.into());
        self
    }

    pub fn allow_full_scan(mut self) -> Self {
        self.target.allow_full_scan = true;
        self
    }

    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    pub fn execute(&self, options: &ExecuteOptions) -> EngineResult<MutationResult> {
        let op = self.op()?;
        let mut result = self.executor.execute(&self.target, &op, options)?;
        if !self.returning {
            result.returning.clear();
        }
        Ok(result)
    }

    /// One batch now, the rest through scheduled continuations
    pub fn execute_async(&self, options: &ExecuteOptions) -> EngineResult<MutationResult> {
        self.execute(&options.clone().with_mode(ExecutionMode::Async))
    }

    /// Updates one page of matching rows
    pub fn paginate(&self, options: &PaginationOptions) -> EngineResult<MutationPage> {
        let op = self.op()?;
        let mut page = self.executor.paginate(&self.target, &op, options)?;
        if !self.returning {
            page.returning.clear();
        }
        Ok(page)
    }

    fn op(&self) -> EngineResult<WriteOp> {
        let set = match &self.set {
            Some(Value::Object(set)) => set.clone(),
            Some(_) => {
                return Err(CompositionError::conflicting("set() expects a JSON object").into())
            }
            None => Map::new(),
        };
        self.executor.check_set(&set)?;
        Ok(WriteOp::Update(set))
    }
}
