//! Consumer contract and the worker loop that drives each consumer.
//!
//! Every registered consumer runs on its own thread. The worker repeatedly
//! asks the shared queue for the oldest record its index has not seen yet,
//! hands it to [`Consumer::perform`] and then sets its bit in the record's
//! seen mask. When the queue has nothing new for it, the worker waits an
//! interval proportional to the queue depth (woken early on publication).
//!
//! Errors and panics raised by `perform` are captured and turned into a
//! [`ConsumerFailure`]; what happens next is decided by the [`FailurePolicy`].

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use log::{debug, error, warn};

use crate::pipeline::{ConsumerSummary, PipelineState};
use crate::record::Record;
use crate::registry::ConsumerIndex;

/// Base idle wait of a worker that found nothing to do, in microseconds.
const IDLE_WAIT_BASE_MICROS: u64 = 5_000;
/// Additional idle wait per queued record, in microseconds.
const IDLE_WAIT_PER_RECORD_MICROS: u64 = 400;

/// A downstream consumer of records.
///
/// `perform` only ever gets shared access to the record: the same object is
/// observed by every other consumer concurrently.
pub trait Consumer: Send {
    /// Display name used in logs, failures and the run report.
    fn name(&self) -> &str;

    /// Process one record.
    ///
    /// # Errors
    ///
    /// Any error is reported as a [`ConsumerFailure`].
    fn perform(&mut self, record: &Record) -> anyhow::Result<()>;

    /// Called once when the worker loop exits. Errors are logged only.
    ///
    /// # Errors
    ///
    /// Implementations may fail to flush or close their outputs.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<C: Consumer + ?Sized> Consumer for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn perform(&mut self, record: &Record) -> anyhow::Result<()> {
        (**self).perform(record)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        (**self).finish()
    }
}

/// What a worker does after its consumer failed on a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Record the failure, mark the record seen anyway and continue.
    #[default]
    Skip,
    /// Record the failure and abort the whole pipeline.
    Abort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// A captured error or panic from [`Consumer::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerFailure {
    pub consumer: String,
    pub index: usize,
    pub title: String,
    pub message: String,
}

impl fmt::Display for ConsumerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Consumer '{}' (#{}) failed on '{}': {}",
            self.consumer, self.index, self.title, self.message
        )
    }
}

/// Extract a human-readable message from a panic payload.
#[must_use]
pub(crate) fn extract_panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// How long an idle worker waits before scanning again.
#[must_use]
pub(crate) fn idle_wait(queue_len: usize) -> Duration {
    Duration::from_micros(IDLE_WAIT_BASE_MICROS + IDLE_WAIT_PER_RECORD_MICROS * queue_len as u64)
}

/// One consumer bound to its index and the shared pipeline state.
pub(crate) struct Worker {
    index: ConsumerIndex,
    consumer: Box<dyn Consumer>,
    state: Arc<PipelineState>,
}

impl Worker {
    pub(crate) fn new(
        index: ConsumerIndex,
        consumer: Box<dyn Consumer>,
        state: Arc<PipelineState>,
    ) -> Self {
        Self { index, consumer, state }
    }

    /// Run until the pipeline is finished or aborted, then call `finish`.
    pub(crate) fn run(mut self) -> ConsumerSummary {
        let name = self.consumer.name().to_string();
        let queue = &self.state.queue;
        let mut summary = ConsumerSummary { name: name.clone(), performed: 0, failed: 0 };
        let mut cursor = 0u64;

        debug!("Starting consumer {name} (#{})", self.index);
        while !self.state.is_finished() {
            let wait = idle_wait(queue.len());
            let Some(record) = queue.next_unseen(self.index, cursor, wait) else {
                if !self.state.is_finished() {
                    let head = queue.head().map_or_else(|| "/empty/".to_string(), |(t, _)| t);
                    debug!(
                        "{name} missed at {head} [{}], waits {wait:?} queue: {}",
                        self.state.processed_count(),
                        queue.len()
                    );
                }
                continue;
            };
            cursor = record.serial() + 1;

            let outcome = match catch_unwind(AssertUnwindSafe(|| self.consumer.perform(&record))) {
                Ok(result) => result.map_err(|e| format!("{e:#}")),
                Err(panic) => Err(format!("panicked: {}", extract_panic_message(panic))),
            };
            match outcome {
                Ok(()) => summary.performed += 1,
                Err(message) => {
                    summary.failed += 1;
                    let failure = ConsumerFailure {
                        consumer: name.clone(),
                        index: self.index.get(),
                        title: record.title().to_string(),
                        message,
                    };
                    warn!("{failure}");
                    self.state.record_failure(failure);

                    if self.state.config().failure_policy == FailurePolicy::Abort {
                        error!("Aborting pipeline after failure in consumer {name}");
                        self.state.request_abort();
                        break;
                    }
                }
            }
            queue.mark_seen(record, self.index, &self.state.registry, &self.state.pool);
        }

        debug!("{name}: finalizing ...");
        match catch_unwind(AssertUnwindSafe(|| self.consumer.finish())) {
            Ok(Ok(())) => debug!("{name}: done"),
            Ok(Err(e)) => error!("Consumer {name} failed to finish: {e:#}"),
            Err(panic) => {
                error!("Consumer {name} panicked in finish: {}", extract_panic_message(panic));
            }
        }
        summary
    }
}
