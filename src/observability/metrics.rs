//! Engine metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Relaxed atomics; values are exact once the call returns

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one engine instance
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Rows consumed from host scans
    rows_read: AtomicU64,
    /// Host scan calls
    host_scans: AtomicU64,
    /// Host point reads
    point_reads: AtomicU64,
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    /// Rows inserted, updated or deleted
    rows_mutated: AtomicU64,
    continuations_scheduled: AtomicU64,
    relation_batches: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows_read(&self, rows: u64) {
        self.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_host_scans(&self) {
        self.host_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_point_reads(&self) {
        self.point_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows_mutated(&self, rows: u64) {
        self.rows_mutated.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_continuations(&self) {
        self.continuations_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_relation_batches(&self) {
        self.relation_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_read: self.rows_read.load(Ordering::Relaxed),
            host_scans: self.host_scans.load(Ordering::Relaxed),
            point_reads: self.point_reads.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            rows_mutated: self.rows_mutated.load(Ordering::Relaxed),
            continuations_scheduled: self.continuations_scheduled.load(Ordering::Relaxed),
            relation_batches: self.relation_batches.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rows_read: u64,
    pub host_scans: u64,
    pub point_reads: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub rows_mutated: u64,
    pub continuations_scheduled: u64,
    pub relation_batches: u64,
}
