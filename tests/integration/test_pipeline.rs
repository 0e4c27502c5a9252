//! End-to-end tests of the fan-out pipeline through the library API.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;
use wikifan_lib::consumer::FailurePolicy;
use wikifan_lib::decoder::{InMemoryDecoder, RawRecord, RecordDecoder, RecordSink};
use wikifan_lib::errors::Result as FanoutResult;
use wikifan_lib::pipeline::{PipelineBuilder, PipelineConfig};

use crate::helpers::{
    FailOn, FailOnFinish, FailureMode, Gated, Recorder, assert_all_records_returned, assert_seen,
    numbered_pages, paris_pages,
};

fn config() -> PipelineConfig {
    PipelineConfig { warmup: Duration::from_millis(500), ..PipelineConfig::default() }
}

fn titles(records: &[RawRecord]) -> Vec<String> {
    records.iter().map(|r| r.title.replace(' ', "_")).collect()
}

/// Paris is delivered once to each consumer; the redirect and the file page never are.
#[test]
fn test_redirects_and_files_are_filtered() {
    let mut builder = PipelineBuilder::new(config());
    let (first, first_seen) = Recorder::new("first");
    let (second, second_seen) = Recorder::new("second");
    builder.add_consumer(first).unwrap();
    builder.add_consumer(second).unwrap();

    let report = builder.start(InMemoryDecoder::new(paris_pages())).unwrap().join();

    assert!(report.is_complete());
    assert_seen(&first_seen, &["Paris"]);
    assert_seen(&second_seen, &["Paris"]);
    assert_eq!(report.counters.redirects, 1);
    assert_eq!(report.counters.files, 1);
    assert_eq!(report.counters.processed, 1);
    assert_all_records_returned(&report);
}

/// With room for a single record and consumers held back, the source stalls
/// repeatedly but every record is eventually delivered.
#[test]
fn test_backpressure_with_single_slot() {
    let mut builder = PipelineBuilder::new(PipelineConfig { max_queue_len: 1, ..config() });
    let (gated, seen, open) = Gated::new("held");
    builder.add_consumer(gated).unwrap();

    let pages: Vec<RawRecord> = ["A", "B", "C", "D", "E"]
        .iter()
        .map(|t| RawRecord::content(t, "body"))
        .collect();
    let pipeline = builder.start(InMemoryDecoder::new(pages)).unwrap();

    thread::sleep(Duration::from_millis(200));
    assert!(pipeline.queue_len() <= 1);
    assert!(!pipeline.is_finished());
    open.store(true, Ordering::Release);

    let report = pipeline.join();
    assert!(report.is_complete());
    assert!(
        report.counters.queue_full >= 3,
        "expected at least 3 stalls, got {}",
        report.counters.queue_full
    );
    assert_eq!(report.peak_queue_len, 1);
    assert_seen(&seen, &["A", "B", "C", "D", "E"]);
    assert_all_records_returned(&report);
}

/// Skip policy: a failure on D is reported, the others still process D and D is recycled.
#[test]
fn test_consumer_failure_is_skipped() {
    let mut builder = PipelineBuilder::new(config());
    let (a, a_seen) = Recorder::new("a");
    let (failing, failing_seen) = FailOn::new("failing", "D", FailureMode::Error);
    let (c, c_seen) = Recorder::new("c");
    builder.add_consumer(a).unwrap();
    builder.add_consumer(failing).unwrap();
    builder.add_consumer(c).unwrap();

    let pages = ["A", "B", "C", "D", "E", "F"].iter().map(|t| RawRecord::content(t, "")).collect();
    let report = builder.start(InMemoryDecoder::new(pages)).unwrap().join();

    assert!(report.is_complete());
    assert_seen(&a_seen, &["A", "B", "C", "D", "E", "F"]);
    assert_seen(&c_seen, &["A", "B", "C", "D", "E", "F"]);
    assert_seen(&failing_seen, &["A", "B", "C", "E", "F"]);

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.consumer, "failing");
    assert_eq!(failure.index, 1);
    assert_eq!(failure.title, "D");
    assert!(failure.message.contains("cannot handle D"));
    assert_eq!(report.consumers[1].failed, 1);
    assert_eq!(report.consumers[1].performed, 5);
    assert_all_records_returned(&report);
}

/// Panics in `perform` are captured like errors.
#[test]
fn test_consumer_panic_is_captured() {
    let mut builder = PipelineBuilder::new(config());
    let (failing, _) = FailOn::new("panicky", "B", FailureMode::Panic);
    let (other, other_seen) = Recorder::new("other");
    builder.add_consumer(failing).unwrap();
    builder.add_consumer(other).unwrap();

    let pages = ["A", "B", "C"].iter().map(|t| RawRecord::content(t, "")).collect();
    let report = builder.start(InMemoryDecoder::new(pages)).unwrap().join();

    assert!(report.is_complete());
    assert_seen(&other_seen, &["A", "B", "C"]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("exploded on B"));
    assert_all_records_returned(&report);
}

/// Errors and panics in `finish` are logged only: the run stays complete and
/// no failure is recorded.
#[rstest]
#[case::skip(FailurePolicy::Skip)]
#[case::abort(FailurePolicy::Abort)]
fn test_finish_failures_are_only_logged(#[case] failure_policy: FailurePolicy) {
    let mut builder = PipelineBuilder::new(PipelineConfig { failure_policy, ..config() });
    let (erroring, erroring_seen) = FailOnFinish::new("erroring", FailureMode::Error);
    let (panicking, panicking_seen) = FailOnFinish::new("panicking", FailureMode::Panic);
    let (recorder, recorder_seen) = Recorder::new("recorder");
    let finished = recorder.finished_flag();
    builder.add_consumer(erroring).unwrap();
    builder.add_consumer(panicking).unwrap();
    builder.add_consumer(recorder).unwrap();

    let report = builder.start(InMemoryDecoder::new(numbered_pages(20))).unwrap().join();

    assert!(report.is_complete());
    assert!(!report.aborted);
    assert!(report.failures.is_empty(), "unexpected failures: {:?}", report.failures);
    assert_eq!(report.counters.processed, 20);
    for seen in [&erroring_seen, &panicking_seen, &recorder_seen] {
        assert_eq!(seen.lock().len(), 20);
    }
    for summary in &report.consumers {
        assert_eq!(summary.performed, 20);
        assert_eq!(summary.failed, 0);
    }
    assert!(finished.load(Ordering::Acquire));
    assert_all_records_returned(&report);
}

/// Abort policy: the first failure aborts the whole pipeline.
#[test]
fn test_consumer_failure_aborts() {
    let mut builder =
        PipelineBuilder::new(PipelineConfig { failure_policy: FailurePolicy::Abort, ..config() });
    let (a, _) = Recorder::new("a");
    let (failing, failing_seen) = FailOn::new("failing", "Page_10", FailureMode::Error);
    builder.add_consumer(a).unwrap();
    builder.add_consumer(failing).unwrap();

    let report = builder.start(InMemoryDecoder::new(numbered_pages(500))).unwrap().join();

    assert!(report.aborted);
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title, "Page_10");
    assert_eq!(failing_seen.lock().len(), 10);
    assert_all_records_returned(&report);
}

/// Every consumer sees every record exactly once and in publication order.
#[test]
fn test_exactly_once_with_many_consumers() {
    let max_queue_len = 16;
    let mut builder = PipelineBuilder::new(PipelineConfig { max_queue_len, ..config() });
    let mut seen = Vec::new();
    for i in 0..8 {
        let (recorder, s) = Recorder::new(&format!("c{i}"));
        builder.add_consumer(recorder).unwrap();
        seen.push(s);
    }

    let pages = numbered_pages(2000);
    let expected = titles(&pages);
    let report = builder.start(InMemoryDecoder::new(pages)).unwrap().join();

    assert!(report.is_complete());
    assert_eq!(report.counters.processed, 2000);
    for s in &seen {
        assert_eq!(*s.lock(), expected);
    }
    assert!(report.peak_queue_len <= max_queue_len);
    // Queue plus one record being decoded plus one handle per consumer
    assert!(report.allocated as usize <= max_queue_len + 1 + 8, "allocated {}", report.allocated);
    assert_all_records_returned(&report);
}

/// The maximum consumer count works end to end.
#[test]
fn test_thirty_one_consumers() {
    let mut builder = PipelineBuilder::new(config());
    let mut seen = Vec::new();
    for i in 0..31 {
        let (recorder, s) = Recorder::new(&format!("c{i}"));
        builder.add_consumer(recorder).unwrap();
        seen.push(s);
    }
    assert!(builder.add_consumer(Recorder::new("c31").0).is_err());

    let pages = numbered_pages(50);
    let expected = titles(&pages);
    let report = builder.start(InMemoryDecoder::new(pages)).unwrap().join();

    assert!(report.is_complete());
    for s in &seen {
        assert_eq!(*s.lock(), expected);
    }
}

/// A decode error ends the input, queued records still drain, the run is incomplete.
#[test]
fn test_decode_error_drains_queue() {
    let mut builder = PipelineBuilder::new(config());
    let (recorder, seen) = Recorder::new("only");
    let finished = recorder.finished_flag();
    builder.add_consumer(recorder).unwrap();

    let decoder = InMemoryDecoder::new(numbered_pages(10)).with_failure_after(3, "truncated block");
    let report = builder.start(decoder).unwrap().join();

    assert!(!report.is_complete());
    assert!(!report.aborted);
    assert!(report.source_error.as_deref().unwrap_or_default().contains("truncated block"));
    assert_eq!(report.counters.processed, 3);
    assert_seen(&seen, &["Page_0", "Page_1", "Page_2"]);
    assert!(finished.load(Ordering::Acquire));
    assert_all_records_returned(&report);
}

/// `is_finished` only becomes true once the stream ended and the queue is empty.
#[test]
fn test_is_finished_waits_for_drain() {
    let mut builder = PipelineBuilder::new(config());
    let (gated, _, open) = Gated::new("held");
    builder.add_consumer(gated).unwrap();

    let pipeline = builder.start(InMemoryDecoder::new(numbered_pages(3))).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pipeline.processed_count(), 3);
    assert!(!pipeline.is_finished(), "records are still queued");

    open.store(true, Ordering::Release);
    let deadline = Instant::now() + Duration::from_secs(10);
    while !pipeline.is_finished() {
        assert!(Instant::now() < deadline, "pipeline never finished");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(pipeline.queue_len(), 0);
    assert!(pipeline.join().is_complete());
}

/// Decoder that keeps emitting records until the sink refuses them.
struct Endless {
    delay: Duration,
}

impl RecordDecoder for Endless {
    fn decode(&mut self, sink: &mut dyn RecordSink) -> FanoutResult<()> {
        let mut i = 0u64;
        loop {
            sink.begin_record()?;
            sink.title_text(&format!("Endless {i}"));
            sink.end_record()?;
            i += 1;
            thread::sleep(self.delay);
        }
    }
}

/// Idle consumers and the source exit promptly after an abort.
#[test]
fn test_abort_stops_all_threads() {
    let mut builder = PipelineBuilder::new(config());
    let (a, a_seen) = Recorder::new("a");
    let (b, _) = Recorder::new("b");
    let a_finished = a.finished_flag();
    builder.add_consumer(a).unwrap();
    builder.add_consumer(b).unwrap();

    let pipeline = builder.start(Endless { delay: Duration::from_millis(5) }).unwrap();
    thread::sleep(Duration::from_millis(100));
    let processed_before = pipeline.processed_count();
    assert!(processed_before > 0);

    let started = Instant::now();
    let report = pipeline.abort();
    assert!(started.elapsed() < Duration::from_secs(2), "abort took {:?}", started.elapsed());

    assert!(report.aborted);
    assert!(report.source_error.is_none());
    assert!(report.counters.processed >= processed_before);
    assert!(!a_seen.lock().is_empty());
    assert!(a_finished.load(Ordering::Acquire));
    assert_all_records_returned(&report);
}

/// An abort handle cancels a pipeline that another thread is joining.
#[test]
fn test_abort_handle_from_other_thread() {
    let mut builder = PipelineBuilder::new(config());
    builder.add_consumer(Recorder::new("a").0).unwrap();
    let pipeline = builder.start(Endless { delay: Duration::from_millis(1) }).unwrap();
    let handle = pipeline.abort_handle();

    let joiner = thread::spawn(move || pipeline.join());
    thread::sleep(Duration::from_millis(50));
    handle.abort();

    let report = joiner.join().unwrap();
    assert!(report.aborted);
}

/// Dropping a running pipeline aborts and joins it.
#[test]
fn test_drop_aborts_pipeline() {
    let mut builder = PipelineBuilder::new(config());
    let (recorder, _) = Recorder::new("a");
    let finished = recorder.finished_flag();
    builder.add_consumer(recorder).unwrap();

    let pipeline = builder.start(Endless { delay: Duration::from_millis(1) }).unwrap();
    thread::sleep(Duration::from_millis(20));
    drop(pipeline);
    assert!(finished.load(Ordering::Acquire));
}
