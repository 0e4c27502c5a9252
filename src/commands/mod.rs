//! CLI command implementations for wikifan.
//!
//! - [`ingest`] - Fan a dump out to the title index and link extractor
//! - [`stats`] - Collect body statistics over a dump

#![allow(
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod ingest;
pub mod stats;
