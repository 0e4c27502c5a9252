//! Common CLI options shared across commands.
//!
//! Option groups are composed into command structs with `#[command(flatten)]`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use log::warn;

use wikifan_lib::consumer::FailurePolicy;
use wikifan_lib::decoder::WikiDumpDecoder;
use wikifan_lib::input::open_input;
use wikifan_lib::logging::log_pipeline_summary;
use wikifan_lib::metrics::{PipelineMetrics, write_metrics};
use wikifan_lib::pipeline::{
    DEFAULT_MAX_QUEUE_LEN, DEFAULT_REPORT_INTERVAL, PipelineBuilder, PipelineConfig,
    PipelineReport,
};
use wikifan_lib::validation::validate_file_exists;

/// Input dump option.
#[derive(Debug, Clone, Args)]
pub struct InputOptions {
    /// Input dump (MediaWiki XML, optionally gzip or bzip2 compressed), or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

impl InputOptions {
    /// Validates that the input file exists (skipped for stdin paths).
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> Result<()> {
        validate_file_exists(&self.input, "Input dump")?;
        Ok(())
    }
}

/// Tuning of the fan-out pipeline.
#[derive(Debug, Clone, Args)]
pub struct PipelineOptions {
    /// Maximum number of records held in the shared queue (0 uses the default)
    #[arg(long = "max-queue-len", default_value_t = DEFAULT_MAX_QUEUE_LEN)]
    pub max_queue_len: usize,

    /// Log throughput every N enqueued records
    #[arg(long = "report-interval", default_value_t = DEFAULT_REPORT_INTERVAL)]
    pub report_interval: u64,

    /// Seconds to wait for the queue to start filling before consumers start
    #[arg(long = "warmup-secs", default_value_t = 3.0)]
    pub warmup_secs: f64,

    /// What to do when a consumer fails on a record
    #[arg(long = "on-consumer-error", value_enum, default_value_t = FailurePolicy::Skip)]
    pub on_consumer_error: FailurePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            report_interval: DEFAULT_REPORT_INTERVAL,
            warmup_secs: 3.0,
            on_consumer_error: FailurePolicy::Skip,
        }
    }
}

impl PipelineOptions {
    /// Build the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the warm-up is negative or not finite, or the
    /// resulting configuration is invalid.
    pub fn to_config(&self, namespace: &str) -> Result<PipelineConfig> {
        if !self.warmup_secs.is_finite() || self.warmup_secs < 0.0 {
            bail!("--warmup-secs must be a non-negative number, got {}", self.warmup_secs);
        }
        let config = PipelineConfig {
            max_queue_len: self.max_queue_len,
            report_interval: self.report_interval,
            warmup: Duration::from_secs_f64(self.warmup_secs),
            failure_policy: self.on_consumer_error,
            namespace: namespace.to_string(),
            ..PipelineConfig::default()
        };
        config.validate()?;
        Ok(config.resolved())
    }
}

/// Options for writing run metrics to a file.
#[derive(Debug, Clone, Default, Args)]
pub struct MetricsOptions {
    /// Optional output TSV for pipeline metrics
    #[arg(long = "metrics")]
    pub metrics: Option<PathBuf>,
}

/// Run the pipeline over a dump and log its summary.
///
/// # Errors
///
/// Returns an error if the input cannot be opened or the pipeline cannot start.
pub fn run_pipeline(builder: PipelineBuilder, input: &Path) -> Result<PipelineReport> {
    let decoder = WikiDumpDecoder::new(open_input(input)?);
    let report = builder.start(decoder)?.join();
    log_pipeline_summary(&report);
    Ok(report)
}

/// Write metrics if requested, then turn an incomplete run into an error.
///
/// # Errors
///
/// Returns an error if metrics cannot be written, the input was not fully
/// read, or the pipeline was aborted.
pub fn finish_run(report: &PipelineReport, input: &Path, metrics: &MetricsOptions) -> Result<()> {
    if let Some(path) = &metrics.metrics {
        let row = PipelineMetrics::from_report(&input.display().to_string(), report);
        write_metrics(path, &[row])?;
    }

    if let Some(error) = &report.source_error {
        bail!("Ingestion incomplete: {error}");
    }
    if report.aborted {
        match report.failures.first() {
            Some(failure) => bail!("Pipeline aborted: {failure}"),
            None => bail!("Pipeline aborted"),
        }
    }
    if !report.failures.is_empty() {
        warn!("{} records failed in at least one consumer", report.failures.len());
    }
    Ok(())
}
