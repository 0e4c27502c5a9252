#![deny(unsafe_code)]
// Clippy lint configuration for CI
// - cast_*: counters and queue lengths are converted between usize/u64/f64 freely
// - missing_*_doc: Documentation improvements tracked separately
// - needless_pass_by_value: Some APIs designed for ownership transfer
// - module_name_repetitions: type names mirror their modules (e.g. queue::SharedQueue)
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
    clippy::redundant_closure_for_method_calls,
    clippy::uninlined_format_args
)]

//! # wikifan - fan-out ingestion of wiki dumps
//!
//! This library reads one large sequential stream of wiki documents and fans
//! every content record out to a set of independently paced consumers, each of
//! which observes every record exactly once.
//!
//! ## Overview
//!
//! ### Pipeline
//!
//! - **[`pipeline`]** - Configuration, consumer registration, start/abort/join and the run report
//! - **[`source`]** - The producer: classification, backpressure and end-of-stream signaling
//! - **[`queue`]** - The shared in-flight queue with completion tracking
//! - **[`pool`]** - Free-list of recycled records
//! - **[`registry`]** - Two-phase consumer registration and the full mask
//! - **[`record`]** - The record type and its seen mask
//! - **[`consumer`]** - Consumer contract, worker loop and failure policy
//!
//! ### Inputs
//!
//! - **[`input`]** - Opening files or stdin with gzip/bzip2 detection
//! - **[`decoder`]** - MediaWiki XML and in-memory decoders
//!
//! ### Consumers and Utilities
//!
//! - **[`consumers`]** - Title index, link extraction and body statistics
//! - **[`metrics`]** - Run metrics written as TSV
//! - **[`validation`]** - Parameter and file validation
//! - **[`progress`]** - Throughput reporting
//! - **[`logging`]** - Formatting helpers and run summaries
//! - **[`errors`]** - Error types
//!
//! ## Quick Start
//!
//! ```no_run
//! use wikifan_lib::consumers::{LinkExtractor, TitleIndexWriter};
//! use wikifan_lib::decoder::WikiDumpDecoder;
//! use wikifan_lib::input::open_input;
//! use wikifan_lib::pipeline::{PipelineBuilder, PipelineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let mut builder = PipelineBuilder::new(config.clone());
//! builder.add_consumer(TitleIndexWriter::create("titles.tsv", &config.namespace)?)?;
//! builder.add_consumer(LinkExtractor::create("links.tsv")?)?;
//!
//! let decoder = WikiDumpDecoder::new(open_input("enwiki-pages-articles.xml.bz2")?);
//! let report = builder.start(decoder)?.join();
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod consumers;
pub mod decoder;
pub mod errors;
pub mod input;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod record;
pub mod registry;
pub mod source;
pub mod validation;
