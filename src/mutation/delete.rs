//! `delete(table).where(..)`
//!
//! The delete mode defaults to the table's `default_delete_mode` and can be
//! overridden per call:
//!
//! - `hard()`: rows are physically removed, foreign-key actions applied
//! - `soft()`: rows get a `deletionTime` marker and stay readable
//! - `scheduled()`: rows are marked now and removed by a scheduled job

use super::executor::{MutationExecutor, Target, WriteOp};
use super::options::{ExecuteOptions, MutationPage, MutationResult};
use crate::engine::EngineContext;
use crate::errors::EngineResult;
use crate::filter::WhereClause;
use crate::schema::{DeleteMode, ExecutionMode};
use crate::stream::PaginationOptions;

/// Bulk delete of the rows matching a where clause
#[derive(Debug, Clone)]
pub struct DeleteBuilder<'h> {
    executor: MutationExecutor<'h>,
    mode: DeleteMode,
    target: Target,
    returning: bool,
}

impl<'h> DeleteBuilder<'h> {
    pub fn new(ctx: EngineContext<'h>, table: &str) -> EngineResult<Self> {
        let executor = MutationExecutor::new(ctx, table)?;
        let mode = executor.table().default_delete_mode;
        Ok(Self {
            executor,
            mode,
            target: Target::default(),
            returning: false,
        })
    }

    pub fn with_where(mut self, clause: impl Into<WhereClause>) -> Self {
        self.target.where_clause = Some(clause.into());
        self
    }

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

    pub fn hard(mut self) -> Self {
        self.mode = DeleteMode::Hard;
        self
    }

    pub fn soft(mut self) -> Self {
        self.mode = DeleteMode::Soft;
        self
    }

    pub fn scheduled(mut self) -> Self {
        self.mode = DeleteMode::Scheduled;
        self
    }

    pub fn mode(&self) -> DeleteMode {
        self.mode
    }

    pub fn execute(&self, options: &ExecuteOptions) -> EngineResult<MutationResult> {
        let mut result = self
            .executor
            .execute(&self.target, &WriteOp::Delete(self.mode), options)?;
        if !self.returning {
            result.returning.clear();
        }
        Ok(result)
    }

    /// One batch now, the rest through scheduled continuations.
    ///
    /// Scheduled deletes cannot run this way.
    pub fn execute_async(&self, options: &ExecuteOptions) -> EngineResult<MutationResult> {
        self.execute(&options.clone().with_mode(ExecutionMode::Async))
    }

    pub fn paginate(&self, options: &PaginationOptions) -> EngineResult<MutationPage> {
        let mut page = self
            .executor
            .paginate(&self.target, &WriteOp::Delete(self.mode), options)?;
        if !self.returning {
            page.returning.clear();
        }
        Ok(page)
    }
}
