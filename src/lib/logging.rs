//! Formatting helpers and run summaries for log output.

use std::time::{Duration, Instant};

use crate::pipeline::PipelineReport;

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use wikifan_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i).is_multiple_of(3) {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a fraction (0.0-1.0) as a percentage.
///
/// ```
/// use wikifan_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a duration as e.g. `45s`, `2m 15s` or `1h 30m`.
///
/// ```
/// use wikifan_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let (mins, rest) = (secs / 60, secs % 60);
        if rest == 0 { format!("{mins}m") } else { format!("{mins}m {rest}s") }
    } else {
        let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a record rate, falling back to records/min below one per second.
///
/// ```
/// use wikifan_lib::logging::format_rate;
/// use std::time::Duration;
///
/// assert_eq!(format_rate(1000, Duration::from_secs(1)), "1,000 records/s");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} records/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} records/s", format_count(rate as u64))
    } else {
        format!("{:.1} records/min", count as f64 / (secs / 60.0))
    }
}

/// Logs the outcome of a pipeline run.
#[allow(clippy::cast_precision_loss)]
pub fn log_pipeline_summary(report: &PipelineReport) {
    let counters = &report.counters;
    log::info!("Pipeline Summary:");
    log::info!("  Content records: {}", format_count(counters.processed));
    log::info!("  Redirects skipped: {}", format_count(counters.redirects));
    log::info!("  Files skipped: {}", format_count(counters.files));
    log::info!("  Queue full waits: {}", format_count(counters.queue_full));
    log::info!("  Peak queue length: {}", report.peak_queue_len);

    if report.allocated > 0 {
        let reuse = report.recycled as f64 / (report.recycled + report.allocated) as f64;
        log::info!(
            "  Records allocated: {} (reuse {})",
            format_count(report.allocated),
            format_percent(reuse, 1)
        );
    }

    for consumer in &report.consumers {
        log::info!(
            "  {}: {} performed, {} failed",
            consumer.name,
            format_count(consumer.performed),
            format_count(consumer.failed)
        );
    }

    for failure in report.failures.iter().take(5) {
        log::warn!("  {failure}");
    }
    if report.failures.len() > 5 {
        log::warn!("  ... and {} more consumer failures", report.failures.len() - 5);
    }

    if let Some(error) = &report.source_error {
        log::error!("Run incomplete: {error}");
    } else if report.aborted {
        log::warn!("Run aborted after {}", format_duration(report.elapsed));
    } else {
        log::info!(
            "Run complete in {} ({})",
            format_duration(report.elapsed),
            format_rate(counters.processed, report.elapsed)
        );
    }
}

/// Logs the start and completion of an operation.
///
/// ```no_run
/// use wikifan_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Ingesting dump");
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with record count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} records in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}
