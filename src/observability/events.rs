//! Observable engine events
//!
//! Events are explicit and typed. Each maps to one stable name used as the
//! `event` field of the emitted log record.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Queries
    /// Plan compiled and accepted
    QueryPlanned,
    /// Read rejected by a guardrail or planning error
    QueryRejected,
    /// One page of a paginated read completed
    PageRead,

    // Relations
    /// One relation edge loaded for a batch of parents
    RelationBatchLoaded,

    // Mutations
    /// A batch of writes committed
    MutationBatchCommitted,
    /// Follow-up work handed to the scheduler
    ContinuationScheduled,
    /// A continuation chain reached the end of its rows
    ContinuationCompleted,
    /// Marked rows physically removed
    ScheduledDeleteExecuted,
    /// Foreign-key action applied to dependents
    CascadeApplied,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryPlanned => "QUERY_PLANNED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::PageRead => "PAGE_READ",
            Event::RelationBatchLoaded => "RELATION_BATCH_LOADED",
            Event::MutationBatchCommitted => "MUTATION_BATCH_COMMITTED",
            Event::ContinuationScheduled => "CONTINUATION_SCHEDULED",
            Event::ContinuationCompleted => "CONTINUATION_COMPLETED",
            Event::ScheduledDeleteExecuted => "SCHEDULED_DELETE_EXECUTED",
            Event::CascadeApplied => "CASCADE_APPLIED",
        }
    }

    /// Rejections are logged at warn level
    pub fn is_warning(&self) -> bool {
        matches!(self, Event::QueryRejected)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
