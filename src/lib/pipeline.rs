//! Pipeline coordination: configuration, registration, start, abort and join.
//!
//! ```text
//!                      ┌──────────────┐
//!  decoder ──events──▶ │ RecordSource │ ── push (backpressure) ──┐
//!                      └──────────────┘                          ▼
//!                                                  ┌───────────────────────┐
//!                 ┌──────────── next_unseen ────── │      SharedQueue      │
//!                 ▼                                └───────────────────────┘
//!  ┌────────────┐ ┌────────────┐     ┌────────────┐           │ full mask
//!  │ consumer 0 │ │ consumer 1 │ ... │ consumer n │           ▼
//!  └────────────┘ └────────────┘     └────────────┘     ┌────────────┐
//!                                                       │ RecordPool │
//!                                                       └────────────┘
//! ```
//!
//! A [`PipelineBuilder`] collects consumers. [`PipelineBuilder::start`]
//! freezes the registry, spawns the source thread, waits for the queue to
//! begin filling and spawns one thread per consumer. The returned
//! [`Pipeline`] can be polled with [`Pipeline::is_finished`], cancelled with
//! [`Pipeline::abort`] (or an [`AbortHandle`] from another thread) and joined
//! with [`Pipeline::join`], which yields a [`PipelineReport`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use parking_lot::Mutex;

use crate::consumer::{Consumer, ConsumerFailure, FailurePolicy, Worker, extract_panic_message};
use crate::decoder::RecordDecoder;
use crate::errors::{FanoutError, Result};
use crate::pool::RecordPool;
use crate::queue::SharedQueue;
use crate::record::FILE_PREFIX;
use crate::registry::{ConsumerIndex, ConsumerRegistry, RegistryBuilder};
use crate::source::run_source;
use crate::validation::{validate_namespace, validate_not_empty, validate_positive};

/// Default maximum number of records in the shared queue.
pub const DEFAULT_MAX_QUEUE_LEN: usize = 1050;
/// Default number of enqueued records between two throughput reports.
pub const DEFAULT_REPORT_INTERVAL: u64 = 1000;
/// Default time the coordinator waits for the queue to start filling.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(3);
/// Namespace used for identifiers when none is configured.
pub const DEFAULT_NAMESPACE: &str = "urn:wiki:";

/// Slice of the warm-up wait between two end-of-stream checks.
const WARMUP_POLL: Duration = Duration::from_millis(50);

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum queued records; 0 means [`DEFAULT_MAX_QUEUE_LEN`].
    pub max_queue_len: usize,
    /// Enqueued records between two throughput reports.
    pub report_interval: u64,
    /// Upper bound of the wait for the queue to start filling.
    pub warmup: Duration,
    pub failure_policy: FailurePolicy,
    /// Identifier namespace; empty means [`DEFAULT_NAMESPACE`].
    pub namespace: String,
    /// Title prefix of file/media pages.
    pub file_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            report_interval: DEFAULT_REPORT_INTERVAL,
            warmup: DEFAULT_WARMUP,
            failure_policy: FailurePolicy::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            file_prefix: FILE_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::InvalidParameter`] for the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        validate_positive(self.report_interval, "report-interval")?;
        validate_not_empty(&self.file_prefix, "file-prefix")?;
        validate_namespace(&self.namespace)
    }

    /// Copy with unset values replaced by their defaults.
    #[must_use]
    pub fn resolved(&self) -> Self {
        let mut resolved = self.clone();
        if resolved.max_queue_len == 0 {
            resolved.max_queue_len = DEFAULT_MAX_QUEUE_LEN;
        }
        if resolved.namespace.is_empty() {
            resolved.namespace = DEFAULT_NAMESPACE.to_string();
        }
        resolved
    }
}

/// Counters maintained by the source thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCounters {
    /// Content records enqueued.
    pub processed: u64,
    /// Redirect records discarded.
    pub redirects: u64,
    /// File/media records discarded.
    pub files: u64,
    /// Backpressure waits.
    pub queue_full: u64,
}

/// Per-consumer outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub name: String,
    pub performed: u64,
    pub failed: u64,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub counters: SourceCounters,
    /// In registration order.
    pub consumers: Vec<ConsumerSummary>,
    pub failures: Vec<ConsumerFailure>,
    /// Decode, close or source thread error that ended the input early.
    pub source_error: Option<String>,
    pub aborted: bool,
    pub elapsed: Duration,
    pub peak_queue_len: usize,
    pub allocated: u64,
    pub recycled: u64,
    /// Records idle in the pool after the run.
    pub pooled: usize,
}

impl PipelineReport {
    /// The whole input was read and every record reached every consumer.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.aborted && self.source_error.is_none()
    }
}

/// State shared by the source, the consumers and the coordinator.
pub(crate) struct PipelineState {
    config: PipelineConfig,
    pub(crate) registry: ConsumerRegistry,
    pub(crate) queue: SharedQueue,
    pub(crate) pool: RecordPool,
    end_of_stream: AtomicBool,
    abort: AtomicBool,
    processed: AtomicU64,
    redirects: AtomicU64,
    files: AtomicU64,
    queue_full: AtomicU64,
    failures: Mutex<Vec<ConsumerFailure>>,
}

impl PipelineState {
    pub(crate) fn new(config: PipelineConfig, registry: ConsumerRegistry) -> Self {
        Self {
            config,
            registry,
            queue: SharedQueue::new(),
            pool: RecordPool::new(),
            end_of_stream: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            redirects: AtomicU64::new(0),
            files: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Aborted, or end of stream with an empty queue.
    pub(crate) fn is_finished(&self) -> bool {
        self.is_aborted() || (self.end_of_stream.load(Ordering::Acquire) && self.queue.is_empty())
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub(crate) fn abort_flag(&self) -> &AtomicBool {
        &self.abort
    }

    pub(crate) fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
        self.queue.wake_all();
    }

    pub(crate) fn end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Acquire)
    }

    pub(crate) fn signal_end_of_stream(&self) {
        self.end_of_stream.store(true, Ordering::Release);
        self.queue.wake_all();
    }

    pub(crate) fn count_published(&self, stalls: u64) {
        self.queue_full.fetch_add(stalls, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn count_redirect(&self) {
        self.redirects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub(crate) fn counters(&self) -> SourceCounters {
        SourceCounters {
            processed: self.processed_count(),
            redirects: self.redirects.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_failure(&self, failure: ConsumerFailure) {
        self.failures.lock().push(failure);
    }
}

/// Registration phase of a pipeline.
pub struct PipelineBuilder {
    config: PipelineConfig,
    registry: RegistryBuilder<Box<dyn Consumer>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config, registry: RegistryBuilder::new() }
    }

    /// Register a consumer and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::TooManyConsumers`] past the 31st consumer.
    pub fn add_consumer<C: Consumer + 'static>(&mut self, consumer: C) -> Result<ConsumerIndex> {
        let name = consumer.name().to_string();
        let index = self.registry.register(name.clone(), Box::new(consumer))?;
        debug!("Registered consumer {name} as #{index}");
        Ok(index)
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Freeze the registry and start the source and consumer threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, no consumer is
    /// registered or a thread cannot be spawned.
    pub fn start<D: RecordDecoder + 'static>(self, decoder: D) -> Result<Pipeline> {
        self.config.validate()?;
        if self.registry.is_empty() {
            return Err(FanoutError::NoConsumers);
        }

        let (registry, consumers) = self.registry.freeze();
        debug!("Consumer mask: {:#b}", registry.full_mask());
        let state = Arc::new(PipelineState::new(self.config.resolved(), registry));
        let started = Instant::now();

        let source = {
            let state = Arc::clone(&state);
            let decoder: Box<dyn RecordDecoder> = Box::new(decoder);
            thread::Builder::new()
                .name("wikifan-source".to_string())
                .spawn(move || run_source(state, decoder))
                .map_err(|source| FanoutError::ThreadSpawn { role: "source".to_string(), source })?
        };

        debug!("Filling queue...");
        wait_for_warmup(&state);
        debug!("Queue holds {} records, starting consumers", state.queue.len());

        let mut pipeline = Pipeline { state, source: Some(source), workers: Vec::new(), started };
        for (index, consumer) in consumers {
            let name = consumer.name().to_string();
            let worker = Worker::new(index, consumer, Arc::clone(&pipeline.state));
            match thread::Builder::new()
                .name(format!("wikifan-consumer-{index}"))
                .spawn(move || worker.run())
            {
                Ok(handle) => pipeline.workers.push((name, handle)),
                Err(source) => {
                    error!("Failed to start consumer {name}: {source}");
                    let _ = pipeline.abort();
                    return Err(FanoutError::ThreadSpawn { role: format!("consumer {name}"), source });
                }
            }
        }
        info!("Started {} consumers", pipeline.workers.len());
        Ok(pipeline)
    }
}

/// Wait until a record is queued, the stream ended, or the warm-up elapsed.
fn wait_for_warmup(state: &PipelineState) {
    let deadline = Instant::now() + state.config().warmup;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || state.end_of_stream() {
            return;
        }
        if state.queue.wait_for_records(remaining.min(WARMUP_POLL)) {
            return;
        }
    }
}

/// Cancels a running pipeline from any thread.
#[derive(Clone)]
pub struct AbortHandle {
    state: Arc<PipelineState>,
}

impl AbortHandle {
    /// Force termination; consumer loops exit at their next check.
    pub fn abort(&self) {
        self.state.request_abort();
    }
}

/// A running pipeline.
pub struct Pipeline {
    state: Arc<PipelineState>,
    source: Option<JoinHandle<Result<()>>>,
    workers: Vec<(String, JoinHandle<ConsumerSummary>)>,
    started: Instant,
}

impl Pipeline {
    /// End of stream was signaled and the queue is empty, or the run was aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Content records enqueued so far. Never decreases.
    #[must_use]
    pub fn processed_count(&self) -> u64 {
        self.state.processed_count()
    }

    #[must_use]
    pub fn counters(&self) -> SourceCounters {
        self.state.counters()
    }

    /// Records currently in the shared queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.queue.len()
    }

    /// Effective settings, with defaults applied.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        self.state.config()
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle { state: Arc::clone(&self.state) }
    }

    /// Force termination and join every thread.
    ///
    /// A consumer blocked inside `perform` delays this until it returns.
    #[must_use]
    pub fn abort(mut self) -> PipelineReport {
        info!("Aborting pipeline");
        self.state.request_abort();
        self.finish()
    }

    /// Wait for natural completion (or an abort triggered elsewhere).
    #[must_use]
    pub fn join(mut self) -> PipelineReport {
        self.finish()
    }

    fn finish(&mut self) -> PipelineReport {
        let mut consumers = Vec::with_capacity(self.workers.len());
        let mut panicked = Vec::new();
        for (name, handle) in self.workers.drain(..) {
            match handle.join() {
                Ok(summary) => consumers.push(summary),
                Err(panic) => {
                    let message = extract_panic_message(panic);
                    error!("Consumer thread {name} panicked: {message}");
                    panicked.push(FanoutError::ThreadPanicked { role: name.clone(), message });
                    consumers.push(ConsumerSummary { name, performed: 0, failed: 0 });
                    self.state.request_abort();
                }
            }
        }

        let mut source_error = None;
        if let Some(handle) = self.source.take() {
            match handle.join() {
                Ok(Ok(()) | Err(FanoutError::Aborted)) => {}
                Ok(Err(e)) => source_error = Some(e.to_string()),
                Err(panic) => {
                    let message = extract_panic_message(panic);
                    source_error =
                        Some(FanoutError::ThreadPanicked { role: "source".to_string(), message }.to_string());
                }
            }
        }
        if source_error.is_none() {
            source_error = panicked.first().map(ToString::to_string);
        }

        let aborted = self.state.is_aborted();
        if aborted {
            let returned = self.state.queue.clear_into(&self.state.pool);
            debug!("Returned {returned} queued records to the pool");
        }

        PipelineReport {
            counters: self.state.counters(),
            consumers,
            failures: std::mem::take(&mut *self.state.failures.lock()),
            source_error,
            aborted,
            elapsed: self.started.elapsed(),
            peak_queue_len: self.state.queue.peak_len(),
            allocated: self.state.pool.allocated(),
            recycled: self.state.pool.recycled(),
            pooled: self.state.pool.available(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.source.is_some() || !self.workers.is_empty() {
            self.state.request_abort();
            let _ = self.finish();
        }
    }
}
