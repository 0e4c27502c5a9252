//! Collect body statistics over a wiki dump.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{debug, info};

use wikifan_lib::consumers::BodyStats;
use wikifan_lib::logging::{OperationTimer, format_count};
use wikifan_lib::metrics::write_metrics;
use wikifan_lib::pipeline::{DEFAULT_NAMESPACE, PipelineBuilder};
use wikifan_lib::validation::validate_distinct_outputs;

use crate::commands::command::Command;
use crate::commands::common::{
    InputOptions, MetricsOptions, PipelineOptions, finish_run, run_pipeline,
};

/// Collect title and body size statistics over the content pages of a dump.
#[derive(Debug, Parser)]
#[command(
    name = "stats",
    about = "\x1b[38;5;173m[STATS]\x1b[0m          \x1b[36mCollect body statistics over a wiki dump\x1b[0m",
    long_about = r#"
Run the fan-out pipeline over a MediaWiki XML dump with a single statistics consumer.

Counts content pages, title and body bytes, empty bodies and the longest body. Redirects
and file/media pages are skipped and counted separately in the pipeline summary.

Example usage:
  wikifan stats -i enwiki-pages-articles.xml.bz2
  wikifan stats -i dump.xml.gz -o body_stats.tsv --metrics pipeline.tsv
"#
)]
pub struct Stats {
    /// Input dump options
    #[command(flatten)]
    pub input: InputOptions,

    /// Optional output TSV for the body statistics
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Pipeline tuning options
    #[command(flatten)]
    pub pipeline: PipelineOptions,

    /// Metrics output options
    #[command(flatten)]
    pub metrics: MetricsOptions,
}

impl Command for Stats {
    fn execute(&self, command_line: &str) -> Result<()> {
        debug!("Command line: {command_line}");
        self.input.validate()?;
        let outputs: Vec<(PathBuf, &str)> =
            [(self.output.clone(), "output"), (self.metrics.metrics.clone(), "metrics")]
                .into_iter()
                .filter_map(|(path, name)| path.map(|p| (p, name)))
                .collect();
        validate_distinct_outputs(&outputs)?;

        let config = self.pipeline.to_config(DEFAULT_NAMESPACE)?;
        info!("Input: {}", self.input.input.display());

        let stats = BodyStats::new();
        let totals = stats.totals();
        let mut builder = PipelineBuilder::new(config);
        builder.add_consumer(stats)?;

        let timer = OperationTimer::new("Collecting body statistics");
        let report = run_pipeline(builder, &self.input.input)?;
        timer.log_completion(report.counters.processed);

        let totals = totals.lock().clone();
        info!("Body Statistics:");
        info!("  Records: {}", format_count(totals.records));
        info!("  Title bytes: {}", format_count(totals.title_bytes));
        info!("  Body bytes: {}", format_count(totals.body_bytes));
        info!("  Mean body bytes: {:.1}", totals.mean_body_bytes());
        info!("  Empty bodies: {}", format_count(totals.empty_bodies));
        if totals.records > 0 {
            info!(
                "  Longest body: {} ({} bytes)",
                totals.longest_title,
                format_count(totals.longest_body_bytes)
            );
        }
        if let Some(path) = &self.output {
            write_metrics(path, &[totals])?;
        }

        finish_run(&report, &self.input.input, &self.metrics)
    }
}
