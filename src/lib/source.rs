//! The producer: turns decoder events into queued records.
//!
//! [`RecordSource`] is the [`RecordSink`] the decoder feeds. Each finished
//! record has its title normalized and is classified; redirects and
//! file/media pages go straight back to the pool, content records are pushed
//! to the shared queue under backpressure.
//!
//! [`run_source`] is the body of the source thread. It always signals end of
//! stream once decoding stops, even on a decode error, so consumers drain what
//! was already queued and exit.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};

use crate::decoder::{RecordDecoder, RecordSink};
use crate::errors::{FanoutError, Result};
use crate::pipeline::PipelineState;
use crate::progress::{SourceSnapshot, ThroughputReporter};
use crate::record::{Record, RecordKind};

/// Upper bound of a single wait while the source waits for the queue to drain.
const DRAIN_WAIT: Duration = Duration::from_millis(100);

/// Decoder sink that publishes content records.
pub struct RecordSource<'a> {
    state: &'a PipelineState,
    current: Option<Record>,
    reporter: ThroughputReporter,
}

impl<'a> RecordSource<'a> {
    pub(crate) fn new(state: &'a PipelineState) -> Self {
        let reporter =
            ThroughputReporter::new("imported").with_interval(state.config().report_interval);
        Self { state, current: None, reporter }
    }

    fn check_abort(&self) -> Result<()> {
        if self.state.is_aborted() { Err(FanoutError::Aborted) } else { Ok(()) }
    }

    fn snapshot(&self) -> SourceSnapshot {
        let counters = self.state.counters();
        SourceSnapshot {
            queue_len: self.state.queue.len(),
            queue_full: counters.queue_full,
            redirects: counters.redirects,
            files: counters.files,
        }
    }

    fn publish(&mut self, record: Record) -> Result<()> {
        let title = record.title().to_string();
        let max_len = self.state.config().max_queue_len;
        match self.state.queue.push(record, max_len, self.state.abort_flag()) {
            Ok(pushed) => {
                self.state.count_published(pushed.stalls);
                self.reporter.record_enqueued(&title, self.snapshot());
                Ok(())
            }
            Err(record) => {
                self.state.pool.release(record);
                Err(FanoutError::Aborted)
            }
        }
    }

    /// Return a half-built record to the pool.
    fn discard_current(&mut self) {
        if let Some(record) = self.current.take() {
            self.state.pool.release(record);
        }
    }
}

impl RecordSink for RecordSource<'_> {
    fn begin_record(&mut self) -> Result<()> {
        self.check_abort()?;
        self.discard_current();
        self.current = Some(self.state.pool.acquire());
        Ok(())
    }

    fn title_text(&mut self, text: &str) {
        if let Some(record) = self.current.as_mut() {
            record.push_title(text);
        }
    }

    fn body_text(&mut self, text: &str) {
        if let Some(record) = self.current.as_mut() {
            record.push_body(text);
        }
    }

    fn mark_redirect(&mut self) {
        if let Some(record) = self.current.as_mut() {
            record.mark_redirect();
        }
    }

    fn end_record(&mut self) -> Result<()> {
        let Some(mut record) = self.current.take() else {
            return Ok(());
        };
        record.normalize_title();
        match record.kind(&self.state.config().file_prefix) {
            RecordKind::Redirect => {
                self.state.pool.release(record);
                self.state.count_redirect();
            }
            RecordKind::File => {
                self.state.pool.release(record);
                self.state.count_file();
            }
            RecordKind::Content => self.publish(record)?,
        }
        self.check_abort()
    }
}

/// Body of the source thread.
///
/// Decodes the whole input, releases it, signals end of stream and then waits
/// until every queued record has been fully consumed (or the pipeline is
/// aborted).
///
/// # Errors
///
/// Returns the decode error or [`FanoutError::InputClose`] that ended the run,
/// or [`FanoutError::Aborted`] if the pipeline was aborted mid-stream.
pub(crate) fn run_source(
    state: Arc<PipelineState>,
    mut decoder: Box<dyn RecordDecoder>,
) -> Result<()> {
    info!("Parsing begins...");
    let decoded = {
        let mut source = RecordSource::new(&state);
        let decoded = decoder.decode(&mut source);
        source.discard_current();
        decoded
    };
    let closed = decoder.close();

    state.signal_end_of_stream();

    let outcome = match (decoded, closed) {
        (Err(FanoutError::Aborted), _) => {
            info!("Decoding stopped: pipeline aborted");
            Err(FanoutError::Aborted)
        }
        (Err(e), closed) => {
            error!("Decoding failed, draining already queued records: {e}");
            if let Err(close_error) = closed {
                error!("{close_error}");
            }
            Err(e)
        }
        (Ok(()), Err(e)) => {
            error!("{e}");
            Err(e)
        }
        (Ok(()), Ok(())) => {
            info!("Decoding finished: {} content records queued", state.processed_count());
            Ok(())
        }
    };

    debug!("Waiting for consumers to drain {} queued records", state.queue.len());
    while !state.is_aborted() && !state.queue.wait_for_drain(DRAIN_WAIT) {}
    outcome
}
