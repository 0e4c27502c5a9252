//! Free-list of retired records.
//!
//! The pool is a lock-free `SegQueue`. [`RecordPool::acquire`] checks it
//! before allocating; [`RecordPool::release`] resets the record before
//! making it available again, so callers can never observe stale content.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::SegQueue;

use crate::record::Record;

/// Concurrent free-list of [`Record`]s.
#[derive(Debug, Default)]
pub struct RecordPool {
    free: SegQueue<Record>,
    allocated: AtomicU64,
    recycled: AtomicU64,
}

impl RecordPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a cleared record from the pool, allocating only if it is empty.
    pub fn acquire(&self) -> Record {
        self.free.pop().unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Record::new()
        })
    }

    /// Reset a record and return it to the pool.
    pub fn release(&self, mut record: Record) {
        record.reset();
        self.recycled.fetch_add(1, Ordering::Relaxed);
        self.free.push(record);
    }

    /// Records currently idle in the pool.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Total records ever allocated.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total records returned to the pool.
    #[must_use]
    pub fn recycled(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }
}
