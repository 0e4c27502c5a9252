//! Run metrics written as TSV.

use std::path::Path;

use anyhow::Context;
use fgoxide::io::DelimFile;
use log::info;
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineReport;

/// A row type that can be written to a metrics file.
pub trait Metric: Serialize + for<'de> Deserialize<'de> + Clone + Default {
    /// Human-readable name for this metric type.
    fn metric_name() -> &'static str;
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Input dump path (`-` for stdin).
    pub input: String,
    /// Number of registered consumers.
    pub consumers: usize,
    /// Content records enqueued.
    pub content_records: u64,
    pub redirects: u64,
    pub files: u64,
    /// Backpressure waits of the source.
    pub queue_full_waits: u64,
    pub peak_queue_len: usize,
    pub records_allocated: u64,
    pub records_recycled: u64,
    pub consumer_failures: usize,
    pub aborted: bool,
    pub complete: bool,
    pub elapsed_secs: f64,
}

impl Metric for PipelineMetrics {
    fn metric_name() -> &'static str {
        "pipeline"
    }
}

impl PipelineMetrics {
    #[must_use]
    pub fn from_report(input: &str, report: &PipelineReport) -> Self {
        Self {
            input: input.to_string(),
            consumers: report.consumers.len(),
            content_records: report.counters.processed,
            redirects: report.counters.redirects,
            files: report.counters.files,
            queue_full_waits: report.counters.queue_full,
            peak_queue_len: report.peak_queue_len,
            records_allocated: report.allocated,
            records_recycled: report.recycled,
            consumer_failures: report.failures.len(),
            aborted: report.aborted,
            complete: report.is_complete(),
            elapsed_secs: report.elapsed.as_secs_f64(),
        }
    }
}

/// Write metric rows to a TSV file with a header line.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_metrics<M: Metric, P: AsRef<Path>>(path: P, metrics: &[M]) -> anyhow::Result<()> {
    let path_ref = path.as_ref();
    DelimFile::default()
        .write_tsv(&path_ref, metrics.to_vec())
        .with_context(|| format!("Failed to write {} metrics: {}", M::metric_name(), path_ref.display()))?;
    info!("Wrote {} metrics to {}", M::metric_name(), path_ref.display());
    Ok(())
}
