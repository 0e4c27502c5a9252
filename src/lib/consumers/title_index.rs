//! Title index: maps each content record to a namespaced identifier.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::consumer::Consumer;
use crate::record::Record;

/// Characters left as-is in identifiers: alphanumerics and `.`, `-`, `*`, `_`.
const IDENTIFIER_ENCODE_SET: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'*').remove(b'_');

/// Build the identifier of a page: `namespace` followed by the percent-encoded title.
///
/// ```
/// use wikifan_lib::consumers::identifier;
///
/// assert_eq!(identifier("urn:wiki:", "Caf\u{e9}_(Paris)"), "urn:wiki:Caf%C3%A9_%28Paris%29");
/// ```
#[must_use]
pub fn identifier(namespace: &str, title: &str) -> String {
    format!("{namespace}{}", utf8_percent_encode(title, IDENTIFIER_ENCODE_SET))
}

/// One row of the title index.
#[derive(Debug, Serialize)]
struct TitleIndexRow<'a> {
    identifier: String,
    title: &'a str,
    body_length: usize,
}

const TITLE_INDEX_HEADER: [&str; 3] = ["identifier", "title", "body_length"];

/// Writes an `identifier / title / body_length` TSV row for every record.
pub struct TitleIndexWriter<W: Write + Send> {
    namespace: String,
    writer: csv::Writer<W>,
    written: u64,
}

impl TitleIndexWriter<File> {
    /// Create the index file and write its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, namespace: &str) -> anyhow::Result<Self> {
        Self::new(super::create_output(path, "title index")?, namespace)
    }
}

impl<W: Write + Send> TitleIndexWriter<W> {
    /// Wrap a writer and write the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(out: W, namespace: &str) -> anyhow::Result<Self> {
        let writer = super::tsv_writer(out, &TITLE_INDEX_HEADER)
            .context("Failed to write title index header")?;
        Ok(Self { namespace: namespace.to_string(), writer, written: 0 })
    }

    /// Rows written so far, header excluded.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush buffered rows and return the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered rows cannot be flushed.
    pub fn into_inner(self) -> anyhow::Result<W> {
        super::into_inner(self.writer)
    }
}

impl<W: Write + Send> Consumer for TitleIndexWriter<W> {
    fn name(&self) -> &str {
        "titles"
    }

    fn perform(&mut self, record: &Record) -> anyhow::Result<()> {
        let row = TitleIndexRow {
            identifier: identifier(&self.namespace, record.title()),
            title: record.title(),
            body_length: record.body().len(),
        };
        self.writer
            .serialize(&row)
            .with_context(|| format!("Failed to write title index entry for {}", record.title()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.writer.flush().context("Failed to flush title index")
    }
}
