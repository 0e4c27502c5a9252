//! Streaming decoders that turn an input stream into record events.
//!
//! A decoder drives a [`RecordSink`] with record-boundary, title-text,
//! body-text and redirect events. The [`RecordSource`](crate::source::RecordSource)
//! is the sink used by the pipeline.
//!
//! Two decoders are provided:
//!
//! - [`WikiDumpDecoder`] reads a MediaWiki XML export (`<page>`, `<title>`,
//!   `<text>`, `<redirect>`).
//! - [`InMemoryDecoder`] replays prepared [`RawRecord`]s.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::errors::{FanoutError, Result};

/// Receiver of decode events.
///
/// Text events may arrive in several chunks per record; they are appended.
pub trait RecordSink {
    /// A new record starts.
    ///
    /// # Errors
    ///
    /// Returns an error to stop decoding.
    fn begin_record(&mut self) -> Result<()>;

    /// A chunk of title text for the current record.
    fn title_text(&mut self, text: &str);

    /// A chunk of body text for the current record.
    fn body_text(&mut self, text: &str);

    /// The current record is a redirect.
    fn mark_redirect(&mut self);

    /// The current record is complete.
    ///
    /// # Errors
    ///
    /// Returns an error to stop decoding, e.g. when the pipeline was aborted.
    fn end_record(&mut self) -> Result<()>;
}

/// A streaming decoder run on the source thread.
pub trait RecordDecoder: Send {
    /// Decode the whole input, feeding `sink`.
    ///
    /// # Errors
    ///
    /// Returns a decode error on malformed input, or any error raised by the sink.
    fn decode(&mut self, sink: &mut dyn RecordSink) -> Result<()>;

    /// Release the underlying input.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::InputClose`] if the input cannot be released.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Which element's text is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    None,
    Title,
    Text,
}

/// Decoder for MediaWiki XML exports.
///
/// The input is held until [`RecordDecoder::close`] drops it.
pub struct WikiDumpDecoder<R: BufRead> {
    reader: Option<Reader<R>>,
}

impl<R: BufRead> WikiDumpDecoder<R> {
    #[must_use]
    pub fn new(input: R) -> Self {
        Self { reader: Some(Reader::from_reader(input)) }
    }

    /// Whether the input has not been released yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

fn decode_error<R>(reader: &Reader<R>, reason: impl ToString) -> FanoutError {
    FanoutError::Decode { position: reader.buffer_position() as u64, reason: reason.to_string() }
}

impl<R: BufRead + Send> RecordDecoder for WikiDumpDecoder<R> {
    fn decode(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(FanoutError::Decode {
                position: 0,
                reason: "input already released".to_string(),
            });
        };
        let mut buf = Vec::new();
        let mut step = Step::None;
        let mut in_page = false;

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => return Err(decode_error(reader, e)),
            };
            match event {
                Event::Start(e) => {
                    step = Step::None;
                    match e.local_name().as_ref() {
                        b"page" => {
                            sink.begin_record()?;
                            in_page = true;
                        }
                        b"title" if in_page => step = Step::Title,
                        b"text" if in_page => step = Step::Text,
                        b"redirect" if in_page => sink.mark_redirect(),
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if in_page && e.local_name().as_ref() == b"redirect" {
                        sink.mark_redirect();
                    }
                    step = Step::None;
                }
                Event::Text(t) => {
                    if step != Step::None {
                        let text = match t.unescape() {
                            Ok(text) => text.into_owned(),
                            Err(e) => return Err(decode_error(reader, e)),
                        };
                        emit(sink, step, &text);
                    }
                }
                Event::CData(c) => {
                    if step != Step::None {
                        let bytes = c.into_inner();
                        let text = match std::str::from_utf8(&bytes) {
                            Ok(text) => text.to_string(),
                            Err(e) => return Err(decode_error(reader, e)),
                        };
                        emit(sink, step, &text);
                    }
                }
                Event::End(e) => {
                    if in_page && e.local_name().as_ref() == b"page" {
                        in_page = false;
                        sink.end_record()?;
                    }
                    step = Step::None;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if in_page {
            return Err(decode_error(reader, "input ended inside a <page> element"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            drop(reader.into_inner());
        }
        Ok(())
    }
}

fn emit(sink: &mut dyn RecordSink, step: Step, text: &str) {
    match step {
        Step::Title => sink.title_text(text),
        Step::Text => sink.body_text(text),
        Step::None => {}
    }
}

/// A prepared record for [`InMemoryDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub title: String,
    pub body: String,
    pub redirect: bool,
}

impl RawRecord {
    #[must_use]
    pub fn content(title: &str, body: &str) -> Self {
        Self { title: title.to_string(), body: body.to_string(), redirect: false }
    }

    #[must_use]
    pub fn redirect(title: &str, target: &str) -> Self {
        Self {
            title: title.to_string(),
            body: format!("#REDIRECT [[{target}]]"),
            redirect: true,
        }
    }
}

/// Decoder replaying a list of [`RawRecord`]s.
#[derive(Debug, Default)]
pub struct InMemoryDecoder {
    records: Vec<RawRecord>,
    fail_after: Option<(usize, String)>,
    fail_on_close: bool,
}

impl InMemoryDecoder {
    #[must_use]
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records, fail_after: None, fail_on_close: false }
    }

    /// Fail with a decode error after emitting `count` records.
    #[must_use]
    pub fn with_failure_after(mut self, count: usize, reason: &str) -> Self {
        self.fail_after = Some((count, reason.to_string()));
        self
    }

    /// Fail when the input is released.
    #[must_use]
    pub fn with_close_failure(mut self) -> Self {
        self.fail_on_close = true;
        self
    }
}

impl RecordDecoder for InMemoryDecoder {
    fn decode(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        for (i, raw) in self.records.iter().enumerate() {
            if let Some((count, reason)) = &self.fail_after {
                if i == *count {
                    return Err(FanoutError::Decode { position: i as u64, reason: reason.clone() });
                }
            }
            sink.begin_record()?;
            sink.title_text(&raw.title);
            sink.body_text(&raw.body);
            if raw.redirect {
                sink.mark_redirect();
            }
            sink.end_record()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.fail_on_close {
            return Err(FanoutError::InputClose(std::io::Error::other("input already released")));
        }
        Ok(())
    }
}
