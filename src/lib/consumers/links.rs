//! Link extraction from wiki markup.
//!
//! Recognized forms:
//!
//! | markup                    | predicate  | target     |
//! |---------------------------|------------|------------|
//! | `[[Paris]]`               | `links_to` | `Paris`    |
//! | `[[Paris\|the capital]]`  | `links_to` | `Paris`    |
//! | `[[Paris#History]]`       | `links_to` | `Paris`    |
//! | `[[capital of::France]]`  | `capital_of` | `France` |
//!
//! Targets and predicates are normalized like titles (spaces become `_`).
//! Links whose target is empty after stripping (e.g. `[[#Section]]`) are skipped.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use serde::Serialize;

use crate::consumer::Consumer;
use crate::record::Record;

/// Predicate of plain wiki links.
pub const LINKS_TO: &str = "links_to";

static LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("link pattern is valid"));

/// One extracted link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub predicate: String,
    pub target: String,
}

fn normalize(text: &str) -> String {
    text.trim().replace(' ', "_")
}

/// Parse the inside of one `[[...]]`.
fn parse_link(inner: &str) -> Option<Link> {
    let (predicate, rest) = match inner.split_once("::") {
        Some((predicate, object)) => (normalize(predicate), object),
        None => (LINKS_TO.to_string(), inner),
    };
    let target = rest.split('|').next().unwrap_or_default();
    let target = target.split('#').next().unwrap_or_default();
    let target = normalize(target);
    if target.is_empty() || predicate.is_empty() {
        return None;
    }
    Some(Link { predicate, target })
}

/// Extract every link from `body`, in order of appearance.
///
/// ```
/// use wikifan_lib::consumers::{links::extract_links, LINKS_TO};
///
/// let links = extract_links("See [[New York|NYC]] and [[located in::United States]].");
/// assert_eq!(links.len(), 2);
/// assert_eq!(links[0].predicate, LINKS_TO);
/// assert_eq!(links[0].target, "New_York");
/// assert_eq!(links[1].predicate, "located_in");
/// ```
#[must_use]
pub fn extract_links(body: &str) -> Vec<Link> {
    LINK_REGEX.captures_iter(body).filter_map(|caps| parse_link(&caps[1])).collect()
}

/// One row of the link file.
#[derive(Debug, Serialize)]
struct LinkRow<'a> {
    source: &'a str,
    predicate: &'a str,
    target: &'a str,
}

const LINK_HEADER: [&str; 3] = ["source", "predicate", "target"];

/// Writes a `source / predicate / target` TSV row for every link of every record.
pub struct LinkExtractor<W: Write + Send> {
    writer: csv::Writer<W>,
    links: u64,
}

impl LinkExtractor<File> {
    /// Create the link file and write its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::new(super::create_output(path, "link")?)
    }
}

impl<W: Write + Send> LinkExtractor<W> {
    /// Wrap a writer and write the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(out: W) -> anyhow::Result<Self> {
        let writer = super::tsv_writer(out, &LINK_HEADER).context("Failed to write link header")?;
        Ok(Self { writer, links: 0 })
    }

    /// Links written so far.
    #[must_use]
    pub fn links(&self) -> u64 {
        self.links
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

impl<W: Write + Send> Consumer for LinkExtractor<W> {
    fn name(&self) -> &str {
        "links"
    }

    fn perform(&mut self, record: &Record) -> anyhow::Result<()> {
        for link in extract_links(record.body()) {
            let row = LinkRow {
                source: record.title(),
                predicate: &link.predicate,
                target: &link.target,
            };
            self.writer
                .serialize(&row)
                .with_context(|| format!("Failed to write links of {}", record.title()))?;
            self.links += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        log::info!("Extracted {} links", crate::logging::format_count(self.links));
        self.writer.flush().context("Failed to flush link output")
    }
}
