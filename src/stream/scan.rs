//! Index scan source
//!
//! Reads one index range in batches. A batch never asks the host for more
//! rows than the budget still allows.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use super::cursor::{ScanPosition, StreamCursor};
use super::pipeline::{Pipeline, ReadBudget, Step};
use crate::errors::EngineResult;
use crate::index::{IndexPosition, IndexRange};
use crate::observability::EngineMetrics;
use crate::store::{Document, DocumentReader, Order, ScanEntry, ScanRequest};

/// Default rows per host scan call
pub const DEFAULT_SCAN_BATCH: usize = 256;
/// Default rows a single call may read
pub const DEFAULT_ROW_READ_LIMIT: usize = 16_384;

/// What to scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSpec {
    pub table: String,
    pub index: String,
    /// Effective index fields
    pub fields: Vec<String>,
    pub range: IndexRange,
    pub order: Order,
}

/// Read tuning shared by every scan of a stream
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub batch_size: usize,
    pub row_read_limit: usize,
    pub metrics: Option<Arc<EngineMetrics>>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SCAN_BATCH,
            row_read_limit: DEFAULT_ROW_READ_LIMIT,
            metrics: None,
        }
    }
}

impl StreamOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_row_read_limit(mut self, limit: usize) -> Self {
        self.row_read_limit = limit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

pub(crate) struct ScanNode<'a> {
    reader: &'a dyn DocumentReader,
    spec: ScanSpec,
    position: ScanPosition,
    end_at: Option<IndexPosition>,
    buffer: VecDeque<ScanEntry>,
    exhausted: bool,
    batch_size: usize,
    metrics: Option<Arc<EngineMetrics>>,
}

impl<'a> ScanNode<'a> {
    pub(crate) fn new(reader: &'a dyn DocumentReader, spec: ScanSpec, options: &StreamOptions) -> Self {
        Self {
            reader,
            spec,
            position: ScanPosition::Start,
            end_at: None,
            buffer: VecDeque::new(),
            exhausted: false,
            batch_size: options.batch_size.max(1),
            metrics: options.metrics.clone(),
        }
    }

    fn fetch(&mut self, budget: &ReadBudget) -> EngineResult<()> {
        let request = ScanRequest {
            table: self.spec.table.clone(),
            index: self.spec.index.clone(),
            range: self.spec.range.clone(),
            order: self.spec.order,
            start_after: match &self.position {
                ScanPosition::After(p) => Some(p.clone()),
                _ => None,
            },
            end_at: self.end_at.clone(),
            limit: self.batch_size.min(budget.remaining()),
        };
        let batch = self.reader.scan(&request)?;
        trace!(
            table = %self.spec.table,
            index = %self.spec.index,
            rows = batch.entries.len(),
            exhausted = batch.exhausted,
            "scan batch"
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_host_scans();
        }
        self.exhausted = batch.exhausted || batch.entries.is_empty();
        self.buffer.extend(batch.entries);
        Ok(())
    }
}

impl<'a> Pipeline<Document> for ScanNode<'a> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<Document>> {
        if self.buffer.is_empty() {
            if self.exhausted || self.position == ScanPosition::End {
                self.position = ScanPosition::End;
                return Ok(Step::Done);
            }
            if budget.is_spent() {
                return Ok(Step::Blocked);
            }
            self.fetch(budget)?;
            if self.buffer.is_empty() {
                self.position = ScanPosition::End;
                return Ok(Step::Done);
            }
        }
        if budget.is_spent() {
            return Ok(Step::Blocked);
        }

        let Some(entry) = self.buffer.pop_front() else {
            return Ok(Step::Done);
        };
        budget.consume(1);
        if let Some(metrics) = &self.metrics {
            metrics.add_rows_read(1);
        }
        self.position = ScanPosition::After(entry.position);
        Ok(Step::Yield(entry.document, self.position()))
    }

    fn position(&self) -> StreamCursor {
        StreamCursor::scan(self.position.clone())
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Scan { position } = cursor else {
            return Err(cursor.mismatch("scan").into());
        };
        self.buffer.clear();
        self.exhausted = *position == ScanPosition::End;
        self.position = position.clone();
        Ok(())
    }

    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Scan { position } = cursor else {
            return Err(cursor.mismatch("scan").into());
        };
        match position {
            ScanPosition::After(end) => self.end_at = Some(end.clone()),
            // the pinned page was empty
            ScanPosition::Start => {
                self.buffer.clear();
                self.exhausted = true;
            }
            ScanPosition::End => {}
        }
        Ok(())
    }

    fn order(&self) -> Order {
        self.spec.order
    }

    fn set_order(&mut self, order: Order) {
        self.spec.order = order;
    }

    fn index_fields(&self) -> Vec<String> {
        self.spec.fields.clone()
    }
}

/// A stream with no rows
pub(crate) struct EmptyNode {
    order: Order,
    fields: Vec<String>,
}

impl EmptyNode {
    pub(crate) fn new(order: Order, fields: Vec<String>) -> Self {
        Self { order, fields }
    }
}

impl<T> Pipeline<T> for EmptyNode {
    fn step(&mut self, _budget: &mut ReadBudget) -> EngineResult<Step<T>> {
        Ok(Step::Done)
    }

    fn position(&self) -> StreamCursor {
        StreamCursor::Merge {
            branches: Vec::new(),
        }
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        match cursor {
            StreamCursor::Merge { branches } if branches.is_empty() => Ok(()),
            other => Err(other.mismatch("merge").into()),
        }
    }

    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        <Self as Pipeline<T>>::resume(self, cursor)
    }

    fn order(&self) -> Order {
        self.order
    }

    fn set_order(&mut self, order: Order) {
        self.order = order;
    }

    fn index_fields(&self) -> Vec<String> {
        self.fields.clone()
    }
}
