//! Size statistics over record titles and bodies.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::consumer::Consumer;
use crate::metrics::Metric;
use crate::record::Record;

/// Totals collected by [`BodyStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyStatistics {
    pub records: u64,
    pub title_bytes: u64,
    pub body_bytes: u64,
    pub empty_bodies: u64,
    /// Title of the record with the longest body.
    pub longest_title: String,
    pub longest_body_bytes: u64,
}

impl Metric for BodyStatistics {
    fn metric_name() -> &'static str {
        "body statistics"
    }
}

impl BodyStatistics {
    fn add(&mut self, record: &Record) {
        let body_len = record.body().len() as u64;
        self.records += 1;
        self.title_bytes += record.title().len() as u64;
        self.body_bytes += body_len;
        if body_len == 0 {
            self.empty_bodies += 1;
        }
        if body_len > self.longest_body_bytes || self.records == 1 {
            self.longest_body_bytes = body_len;
            self.longest_title = record.title().to_string();
        }
    }

    /// Mean body size in bytes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_body_bytes(&self) -> f64 {
        if self.records == 0 { 0.0 } else { self.body_bytes as f64 / self.records as f64 }
    }
}

/// Consumer accumulating [`BodyStatistics`].
///
/// The totals live behind a shared handle so they can be read once the
/// pipeline has been joined.
#[derive(Default)]
pub struct BodyStats {
    totals: Arc<Mutex<BodyStatistics>>,
}

impl BodyStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the totals.
    #[must_use]
    pub fn totals(&self) -> Arc<Mutex<BodyStatistics>> {
        Arc::clone(&self.totals)
    }
}

impl Consumer for BodyStats {
    fn name(&self) -> &str {
        "stats"
    }

    fn perform(&mut self, record: &Record) -> anyhow::Result<()> {
        self.totals.lock().add(record);
        Ok(())
    }
}
