//! Throughput reporting for the record source.
//!
//! The reporter is driven by the source thread: every enqueued record is
//! counted, and on the first record and every `interval` records after that a
//! single info line reports the rate since stream start together with the
//! queue depth and the source counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;

use crate::logging::{format_count, format_rate};

/// Source counters included in every throughput line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    /// Records currently in the shared queue.
    pub queue_len: usize,
    /// Backpressure waits so far.
    pub queue_full: u64,
    /// Redirect records discarded so far.
    pub redirects: u64,
    /// File/media records discarded so far.
    pub files: u64,
}

/// Periodic throughput logger.
///
/// # Example
/// ```
/// use wikifan_lib::progress::{SourceSnapshot, ThroughputReporter};
///
/// let reporter = ThroughputReporter::new("Imported").with_interval(100);
/// for i in 0..250 {
///     // Logs for records 1, 101 and 201
///     reporter.record_enqueued(&format!("page_{i}"), SourceSnapshot::default());
/// }
/// assert_eq!(reporter.count(), 250);
/// ```
pub struct ThroughputReporter {
    interval: u64,
    message: String,
    count: AtomicU64,
    started: Instant,
}

impl ThroughputReporter {
    /// Create a reporter with the default interval of 1,000 records.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: 1_000,
            message: message.into(),
            count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Set the number of records between two reports. Zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Count one enqueued record, logging a report if it is due.
    ///
    /// Returns `true` if a report was logged.
    pub fn record_enqueued(&self, title: &str, snapshot: SourceSnapshot) -> bool {
        let prev = self.count.fetch_add(1, Ordering::Relaxed);
        if !prev.is_multiple_of(self.interval) {
            return false;
        }
        let count = prev + 1;
        info!(
            "{} [{}]: {} thru: {} queue: {} queue full: {} redirects: {} files: {}",
            self.message,
            title,
            format_count(count),
            format_rate(count, self.started.elapsed()),
            snapshot.queue_len,
            format_count(snapshot.queue_full),
            format_count(snapshot.redirects),
            format_count(snapshot.files),
        );
        true
    }

    /// Records counted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
