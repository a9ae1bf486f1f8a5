//! # In-memory scheduler
//!
//! Queues delayed function invocations. Nothing runs on its own: the owner
//! drains the queue and dispatches each job, earliest `run_at` first and
//! in scheduling order among equal times.

use std::cell::{Cell, RefCell};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::errors::{HostError, HostResult};
use super::Scheduler;

/// A queued function invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    /// Job ID
    pub id: Uuid,

    /// Function name
    pub function: String,

    /// Arguments handed to the function
    pub payload: Value,

    /// Earliest time the job may run
    pub run_at: DateTime<Utc>,

    sequence: u64,
}

/// Scheduler that keeps jobs in memory until drained
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    jobs: RefCell<Vec<ScheduledJob>>,
    next_sequence: Cell<u64>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of queued jobs in run order
    pub fn pending(&self) -> Vec<ScheduledJob> {
        let mut jobs = self.jobs.borrow().clone();
        jobs.sort_by(|a, b| a.run_at.cmp(&b.run_at).then(a.sequence.cmp(&b.sequence)));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the next job to run
    pub fn pop_next(&self) -> Option<ScheduledJob> {
        let mut jobs = self.jobs.borrow_mut();
        let next = jobs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.run_at.cmp(&b.run_at).then(a.sequence.cmp(&b.sequence)))
            .map(|(i, _)| i)?;
        Some(jobs.remove(next))
    }

    /// Runs queued jobs, including ones scheduled while draining, until the
    /// queue is empty.
    ///
    /// Stops at the first failing job; that job is not re-queued.
    pub fn drain<E>(&self, mut handler: impl FnMut(&ScheduledJob) -> Result<(), E>) -> Result<usize, E> {
        let mut ran = 0;
        while let Some(job) = self.pop_next() {
            handler(&job)?;
            ran += 1;
        }
        Ok(ran)
    }

    fn push(&self, run_at: DateTime<Utc>, function: &str, payload: Value) -> Uuid {
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        let id = Uuid::new_v4();
        self.jobs.borrow_mut().push(ScheduledJob {
            id,
            function: function.to_string(),
            payload,
            run_at,
            sequence,
        });
        id
    }
}

impl Scheduler for MemoryScheduler {
    fn run_after(&self, delay_ms: u64, function: &str, payload: Value) -> HostResult<Uuid> {
        let delay = i64::try_from(delay_ms)
            .map_err(|_| HostError::Scheduler(format!("delay {}ms out of range", delay_ms)))?;
        Ok(self.push(Utc::now() + Duration::milliseconds(delay), function, payload))
    }

    fn run_at(&self, at: DateTime<Utc>, function: &str, payload: Value) -> HostResult<Uuid> {
        Ok(self.push(at, function, payload))
    }

    fn cancel(&self, job: Uuid) -> HostResult<()> {
        let mut jobs = self.jobs.borrow_mut();
        let before = jobs.len();
        jobs.retain(|j| j.id != job);
        if jobs.len() == before {
            return Err(HostError::Scheduler(format!("unknown job {}", job)));
        }
        Ok(())
    }
}
