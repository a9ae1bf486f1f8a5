//! Pull protocol shared by every stream stage

use super::cursor::StreamCursor;
use crate::errors::EngineResult;
use crate::store::Order;

/// Outcome of one pull
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// An item, with the cursor that resumes right after it
    Yield(T, StreamCursor),
    /// A row was consumed but produced nothing
    Skip(StreamCursor),
    /// The read budget is spent
    Blocked,
    /// No more rows
    Done,
}

/// Rows a pull sequence may still consume from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBudget {
    limit: usize,
    consumed: usize,
}

impl ReadBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, consumed: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.consumed)
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_spent(&self) -> bool {
        self.remaining() == 0
    }

    pub fn consume(&mut self, rows: usize) {
        self.consumed += rows;
    }
}

/// One stage of a stream
pub(crate) trait Pipeline<T> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<T>>;

    /// Cursor covering every row consumed so far
    fn position(&self) -> StreamCursor;

    /// Continue after a previously returned cursor
    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()>;

    /// Stop at a previously returned cursor, inclusive
    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()>;

    fn order(&self) -> Order;

    fn set_order(&mut self, order: Order);

    fn index_fields(&self) -> Vec<String>;
}
