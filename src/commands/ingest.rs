//! Fan a wiki dump out to the title index and the link extractor.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info};

use wikifan_lib::consumers::{LinkExtractor, TitleIndexWriter};
use wikifan_lib::logging::OperationTimer;
use wikifan_lib::pipeline::{DEFAULT_NAMESPACE, PipelineBuilder};
use wikifan_lib::validation::validate_distinct_outputs;

use crate::commands::command::Command;
use crate::commands::common::{
    InputOptions, MetricsOptions, PipelineOptions, finish_run, run_pipeline,
};

/// Ingest a wiki dump, writing a title index and/or extracted links.
#[derive(Debug, Parser)]
#[command(
    name = "ingest",
    about = "\x1b[38;5;72m[INGEST]\x1b[0m         \x1b[36mWrite a title index and extracted links from a wiki dump\x1b[0m",
    long_about = r#"
Ingest a MediaWiki XML dump and fan every content page out to the selected outputs.

Redirect pages and file/media pages (titles starting with 'File:') are skipped. Each
remaining page is delivered exactly once to every output:

  --output   identifier<TAB>title<TAB>body_length, where identifier is the namespace
             followed by the percent-encoded title
  --links    source<TAB>predicate<TAB>target for [[links]] and [[predicate::object]]

Fields holding tabs, newlines or double quotes are wrapped in double quotes.

The input may be plain, gzip or bzip2 compressed XML; use '-' to read stdin.

Example usage:
  wikifan ingest -i enwiki-pages-articles.xml.bz2 -o titles.tsv --links links.tsv
  zcat dump.xml.gz | wikifan ingest -i - -o titles.tsv -n http://en.wikipedia.org/wiki/
"#
)]
pub struct Ingest {
    /// Input dump options
    #[command(flatten)]
    pub input: InputOptions,

    /// Output TSV of page identifiers and titles
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output TSV of links between pages
    #[arg(short = 'l', long = "links")]
    pub links: Option<PathBuf>,

    /// Namespace prefixed to page identifiers
    #[arg(short = 'n', long = "namespace", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Pipeline tuning options
    #[command(flatten)]
    pub pipeline: PipelineOptions,

    /// Metrics output options
    #[command(flatten)]
    pub metrics: MetricsOptions,
}

impl Command for Ingest {
    fn execute(&self, command_line: &str) -> Result<()> {
        debug!("Command line: {command_line}");
        self.input.validate()?;
        if self.output.is_none() && self.links.is_none() {
            bail!("At least one of --output or --links must be given");
        }
        let outputs: Vec<(PathBuf, &str)> = [
            (self.output.clone(), "output"),
            (self.links.clone(), "links"),
            (self.metrics.metrics.clone(), "metrics"),
        ]
        .into_iter()
        .filter_map(|(path, name)| path.map(|p| (p, name)))
        .collect();
        validate_distinct_outputs(&outputs)?;

        let config = self.pipeline.to_config(&self.namespace)?;
        info!("Input: {}", self.input.input.display());
        info!("Namespace: {}", config.namespace);
        info!("Max queue length: {}", config.max_queue_len);
        info!("On consumer error: {}", config.failure_policy);

        let mut builder = PipelineBuilder::new(config.clone());
        if let Some(path) = &self.output {
            info!("Title index: {}", path.display());
            builder.add_consumer(TitleIndexWriter::create(path, &config.namespace)?)?;
        }
        if let Some(path) = &self.links {
            info!("Links: {}", path.display());
            builder.add_consumer(LinkExtractor::create(path)?)?;
        }

        let timer = OperationTimer::new("Ingesting dump");
        let report = run_pipeline(builder, &self.input.input)?;
        timer.log_completion(report.counters.processed);
        finish_run(&report, &self.input.input, &self.metrics)
    }
}
