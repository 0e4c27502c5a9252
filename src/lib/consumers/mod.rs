//! Built-in consumers used by the `wikifan` commands.
//!
//! - [`TitleIndexWriter`] - one `identifier / title / body length` line per record
//! - [`LinkExtractor`] - wiki and semantic links as `source / predicate / target`
//! - [`BodyStats`] - size statistics over titles and bodies

pub mod links;
pub mod stats;
pub mod title_index;

pub use links::{LINKS_TO, Link, LinkExtractor};
pub use stats::{BodyStatistics, BodyStats};
pub use title_index::{TitleIndexWriter, identifier};

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;

/// Create an output file.
pub(crate) fn create_output<P: AsRef<Path>>(path: P, what: &str) -> anyhow::Result<File> {
    let path = path.as_ref();
    File::create(path)
        .with_context(|| format!("Failed to create {what} output: {}", path.display()))
}

/// Tab-delimited writer; fields holding tabs, newlines or quotes are quoted.
///
/// The header is written explicitly so that empty outputs still carry it.
pub(crate) fn tsv_writer<W: Write>(out: W, header: &[&str]) -> anyhow::Result<csv::Writer<W>> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').has_headers(false).from_writer(out);
    writer.write_record(header).context("Failed to write TSV header")?;
    Ok(writer)
}

/// Flush a TSV writer and return its inner writer.
pub(crate) fn into_inner<W: Write>(writer: csv::Writer<W>) -> anyhow::Result<W> {
    writer.into_inner().map_err(|e| anyhow::anyhow!("Failed to flush TSV output: {}", e.error()))
}
