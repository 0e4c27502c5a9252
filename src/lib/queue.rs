//! The shared in-flight queue.
//!
//! Every consumer sees the same [`Record`] objects; there are no per-consumer
//! copies. A record stays queued until its seen mask covers every registered
//! consumer. The consumer whose mark completes the mask removes it from the
//! queue, and whichever holder drops the last handle returns it to the pool.
//!
//! # Signaling
//!
//! The queue owns two condition variables instead of sleep-and-retry loops:
//!
//! - `published`: notified when a record is pushed; idle consumers wait on it.
//! - `retired`: notified when a record is removed; the producer waits on it
//!   under backpressure and while draining.
//!
//! All waits are timed. The timeouts mirror the polling intervals of a
//! busy-wait design (randomized 10-30 ms for backpressure, depth-proportional
//! for idle consumers), so a missed wakeup costs at most one interval.
//!
//! # Ordering
//!
//! Records are appended in serial order and removed from arbitrary positions,
//! so the deque stays sorted by serial. Consumers process records in order and
//! track a cursor (the lowest serial they have not processed yet), which lets
//! them skip records they already marked with a binary search.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::pool::RecordPool;
use crate::record::Record;
use crate::registry::{ConsumerIndex, ConsumerRegistry};

/// Lower bound of the randomized backpressure wait, in milliseconds.
pub const BACKPRESSURE_WAIT_MIN_MS: u64 = 10;
/// Upper bound (exclusive) of the randomized backpressure wait, in milliseconds.
pub const BACKPRESSURE_WAIT_MAX_MS: u64 = 30;

/// A record accepted by [`SharedQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pushed {
    /// Serial assigned to the record.
    pub serial: u64,
    /// Number of backpressure waits before the record fit.
    pub stalls: u64,
}

struct QueueInner {
    records: VecDeque<Arc<Record>>,
    next_serial: u64,
}

/// Bounded queue of records shared by every consumer.
pub struct SharedQueue {
    inner: Mutex<QueueInner>,
    published: Condvar,
    retired: Condvar,
    len: AtomicUsize, // Cached for lock-free checks
    peak_len: AtomicUsize,
}

impl Default for SharedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner { records: VecDeque::new(), next_serial: 0 }),
            published: Condvar::new(),
            retired: Condvar::new(),
            len: AtomicUsize::new(0),
            peak_len: AtomicUsize::new(0),
        }
    }

    /// Append a record once the queue holds fewer than `max_len` records.
    ///
    /// While the queue is full the caller waits a randomized short interval
    /// (or until a record is retired) and each wait counts as one stall.
    ///
    /// # Errors
    ///
    /// Returns the record untouched if `abort` is raised while waiting.
    pub fn push(
        &self,
        mut record: Record,
        max_len: usize,
        abort: &AtomicBool,
    ) -> std::result::Result<Pushed, Record> {
        let mut inner = self.inner.lock();
        let mut stalls = 0;
        while inner.records.len() >= max_len {
            if abort.load(Ordering::Acquire) {
                return Err(record);
            }
            stalls += 1;
            let wait_ms =
                rand::rng().random_range(BACKPRESSURE_WAIT_MIN_MS..BACKPRESSURE_WAIT_MAX_MS);
            self.retired.wait_for(&mut inner, Duration::from_millis(wait_ms));
        }

        let serial = inner.next_serial;
        inner.next_serial += 1;
        record.set_serial(serial);
        inner.records.push_back(Arc::new(record));
        let new_len = inner.records.len();
        self.len.store(new_len, Ordering::Release);
        drop(inner);

        // Update peak using CAS loop
        let mut peak = self.peak_len.load(Ordering::Relaxed);
        while new_len > peak {
            match self.peak_len.compare_exchange_weak(
                peak,
                new_len,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }

        self.published.notify_all();
        Ok(Pushed { serial, stalls })
    }

    /// Find the first record at or after `cursor` that `index` has not seen.
    ///
    /// If none is queued, waits up to `wait` for a publication and looks once
    /// more. Returns `None` when nothing turned up.
    pub fn next_unseen(
        &self,
        index: ConsumerIndex,
        cursor: u64,
        wait: Duration,
    ) -> Option<Arc<Record>> {
        let mut inner = self.inner.lock();
        if let Some(record) = Self::find_unseen(&inner.records, index, cursor) {
            return Some(record);
        }
        if wait.is_zero() {
            return None;
        }
        self.published.wait_for(&mut inner, wait);
        Self::find_unseen(&inner.records, index, cursor)
    }

    fn find_unseen(
        records: &VecDeque<Arc<Record>>,
        index: ConsumerIndex,
        cursor: u64,
    ) -> Option<Arc<Record>> {
        let start = records.partition_point(|r| r.serial() < cursor);
        records.range(start..).find(|r| !r.seen().contains(index)).map(Arc::clone)
    }

    /// Mark `record` as seen by `index`.
    ///
    /// If this mark completes the mask, the record is removed from the queue.
    /// The handle is consumed; if it was the last one the record goes back to
    /// `pool`. Returns `true` when this call completed the mask.
    pub fn mark_seen(
        &self,
        record: Arc<Record>,
        index: ConsumerIndex,
        registry: &ConsumerRegistry,
        pool: &RecordPool,
    ) -> bool {
        let bits = record.seen().mark(index);
        let mut completed = false;
        if registry.is_complete(bits) {
            let mut inner = self.inner.lock();
            if let Ok(pos) = inner.records.binary_search_by_key(&record.serial(), |r| r.serial()) {
                if Arc::ptr_eq(&inner.records[pos], &record) {
                    inner.records.remove(pos);
                    self.len.store(inner.records.len(), Ordering::Release);
                    completed = true;
                }
            }
            drop(inner);
            if completed {
                self.retired.notify_all();
            }
        }

        // Exactly one of the handles still alive gets the record back
        if let Some(owned) = Arc::into_inner(record) {
            pool.release(owned);
        }
        completed
    }

    /// Wait up to `wait` for the queue to become empty. Returns whether it is.
    pub fn wait_for_drain(&self, wait: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.records.is_empty() {
            return true;
        }
        self.retired.wait_for(&mut inner, wait);
        inner.records.is_empty()
    }

    /// Wait up to `wait` for at least one record to be queued. Returns whether one is.
    pub fn wait_for_records(&self, wait: Duration) -> bool {
        let mut inner = self.inner.lock();
        if !inner.records.is_empty() {
            return true;
        }
        self.published.wait_for(&mut inner, wait);
        !inner.records.is_empty()
    }

    /// Wake every waiter so it re-checks the termination state.
    pub fn wake_all(&self) {
        self.published.notify_all();
        self.retired.notify_all();
    }

    /// Move every queued record back into `pool`. Used after an abort, once
    /// all consumers have been joined.
    pub fn clear_into(&self, pool: &RecordPool) -> usize {
        let records: Vec<Arc<Record>> = {
            let mut inner = self.inner.lock();
            let drained = inner.records.drain(..).collect();
            self.len.store(0, Ordering::Release);
            drained
        };
        let count = records.len();
        for record in records {
            if let Some(owned) = Arc::into_inner(record) {
                pool.release(owned);
            }
        }
        self.wake_all();
        count
    }

    /// Number of queued records (lock-free).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest length observed so far.
    #[must_use]
    pub fn peak_len(&self) -> usize {
        self.peak_len.load(Ordering::Relaxed)
    }

    /// Title and seen bits of the oldest queued record, for diagnostics.
    #[must_use]
    pub fn head(&self) -> Option<(String, u32)> {
        self.inner.lock().records.front().map(|r| (r.title().to_string(), r.seen().bits()))
    }
}
