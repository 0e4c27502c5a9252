//! The unit of work flowing through the pipeline.
//!
//! A [`Record`] is one decoded document: its title, its body and whether the
//! export flagged it as a redirect. Records are recycled through the
//! [`RecordPool`](crate::pool::RecordPool), so every buffer is cleared by
//! [`Record::reset`] before the record is handed out again.
//!
//! While a record sits in the shared queue, consumers only ever receive a
//! shared reference to it; the only mutation they perform is setting their bit
//! in the [`SeenMask`].

use std::sync::atomic::{AtomicU32, Ordering};

use crate::registry::ConsumerIndex;

/// Title prefix reserved for file/media pages.
pub const FILE_PREFIX: &str = "File:";

/// How the source classified a finished record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A regular document, fanned out to every consumer.
    Content,
    /// A redirect page; never enqueued.
    Redirect,
    /// A file/media description page; never enqueued.
    File,
}

/// Per-record bitmask of consumers that have processed the record.
///
/// Bits are only ever set (with an atomic `fetch_or`) until the record is
/// recycled, at which point the whole mask is cleared.
#[derive(Debug, Default)]
pub struct SeenMask(AtomicU32);

impl SeenMask {
    /// Set the bit for `index` and return the mask after the update.
    pub fn mark(&self, index: ConsumerIndex) -> u32 {
        let bit = index.bit();
        self.0.fetch_or(bit, Ordering::AcqRel) | bit
    }

    /// Whether the bit for `index` is set.
    #[must_use]
    pub fn contains(&self, index: ConsumerIndex) -> bool {
        self.0.load(Ordering::Acquire) & index.bit() != 0
    }

    /// Current raw bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// One decoded document.
#[derive(Debug, Default)]
pub struct Record {
    title: String,
    body: String,
    is_redirect: bool,
    seen: SeenMask,
    serial: u64,
    generation: u64,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a populated record, e.g. for exercising a consumer directly.
    #[must_use]
    pub fn from_parts(title: &str, body: &str, is_redirect: bool) -> Self {
        let mut record = Self::new();
        record.push_title(title);
        record.push_body(body);
        if is_redirect {
            record.mark_redirect();
        }
        record
    }

    /// The (normalized, once the record is enqueued) title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The raw document markup.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.is_redirect
    }

    /// Consumers that have already processed this record.
    #[must_use]
    pub fn seen(&self) -> &SeenMask {
        &self.seen
    }

    /// Publication order, assigned when the record is enqueued.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Number of times this record object has been recycled.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn push_title(&mut self, text: &str) {
        self.title.push_str(text);
    }

    pub(crate) fn push_body(&mut self, text: &str) {
        self.body.push_str(text);
    }

    pub(crate) fn mark_redirect(&mut self) {
        self.is_redirect = true;
    }

    pub(crate) fn set_serial(&mut self, serial: u64) {
        self.serial = serial;
    }

    /// Replace spaces in the title with `_`, the identifier convention for page names.
    pub(crate) fn normalize_title(&mut self) {
        if self.title.contains(' ') {
            self.title = self.title.replace(' ', "_");
        }
    }

    /// Classify the record. Expects a normalized title.
    #[must_use]
    pub fn kind(&self, file_prefix: &str) -> RecordKind {
        if self.is_redirect {
            RecordKind::Redirect
        } else if self.title.starts_with(file_prefix) {
            RecordKind::File
        } else {
            RecordKind::Content
        }
    }

    /// Clear every field so no content leaks into the next logical record.
    ///
    /// Buffers keep their capacity.
    pub(crate) fn reset(&mut self) {
        self.title.clear();
        self.body.clear();
        self.is_redirect = false;
        self.seen.clear();
        self.serial = 0;
        self.generation += 1;
    }
}
