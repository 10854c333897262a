//! End-to-end run-loop behavior with stub collaborators.

use std::fs::File;
use std::time::Duration;

use anyhow::Result;
use sentry_edge::{
    Classifier, ClassifyError, Detection, DetectionBackend, DetectionBatch, Frame, FrameDims,
    FrameStream, LivenessMarker, LocalBackend, LoopDelays, NullArtifactSink, RetryPolicy,
    RoundAggregator, RunLoop, RunMode, RunState, SourceMultiplexer, StageTimings, StubClassifier,
    StubStream,
};

const DIMS: FrameDims = FrameDims {
    width: 4,
    height: 2,
    channels: 3,
};

fn fast_policy(threshold: u32) -> RetryPolicy {
    RetryPolicy {
        failure_threshold: threshold,
        read_backoff: Duration::ZERO,
    }
}

fn no_delays() -> LoopDelays {
    LoopDelays {
        inter_round: Duration::ZERO,
        inter_attempt: Duration::ZERO,
    }
}

fn aggregator(dir: &std::path::Path) -> RoundAggregator {
    RoundAggregator::new(
        0,
        vec![1],
        Box::new(File::create(dir.join("predictions.log")).unwrap()),
        None,
        Box::new(NullArtifactSink),
    )
    .unwrap()
}

#[test]
fn single_pass_processes_exactly_one_frame_then_stops() {
    let dir = tempfile::tempdir().unwrap();

    let mut mux = SourceMultiplexer::new(DIMS, fast_policy(30));
    mux.attach(1, Box::new(StubStream::new(DIMS))).unwrap();

    let backend = LocalBackend::new(Box::new(StubClassifier::new()));
    let mut run_loop = RunLoop::new(
        mux,
        Box::new(backend),
        aggregator(dir.path()),
        LivenessMarker::disabled(),
        RunMode::SinglePass,
        no_delays(),
    );

    run_loop.run().unwrap();
    assert_eq!(run_loop.state(), RunState::Stopped);
    assert_eq!(run_loop.frames_processed(), 1);
}

#[test]
fn exhausted_source_ends_the_run_without_reaching_the_backend() {
    let dir = tempfile::tempdir().unwrap();

    /// Always delivers a truncated frame.
    struct Truncated;
    impl FrameStream for Truncated {
        fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(buf.len() / 2)
        }
    }

    /// Counts classify calls; short reads must never reach it.
    struct Counting {
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }
    impl DetectionBackend for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn classify(&mut self, frame: &Frame) -> Result<DetectionBatch, ClassifyError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(DetectionBatch::new(
                frame.source_id,
                vec![],
                StageTimings::default(),
            ))
        }
    }

    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut mux = SourceMultiplexer::new(DIMS, fast_policy(3));
    mux.attach(1, Box::new(Truncated)).unwrap();

    let mut run_loop = RunLoop::new(
        mux,
        Box::new(Counting {
            calls: calls.clone(),
        }),
        aggregator(dir.path()),
        LivenessMarker::disabled(),
        RunMode::Continuous,
        no_delays(),
    );

    run_loop.run().unwrap();
    assert_eq!(run_loop.state(), RunState::Stopped);
    assert_eq!(run_loop.frames_processed(), 0);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn classify_failures_are_isolated_per_frame() {
    let dir = tempfile::tempdir().unwrap();

    /// Fails on the first frame, succeeds with one detection on the second.
    struct FlakyClassifier {
        calls: u32,
    }
    impl Classifier for FlakyClassifier {
        fn classify(
            &mut self,
            _pixels: &[u8],
            _dims: FrameDims,
            _name: &str,
        ) -> Result<Vec<Detection>> {
            self.calls += 1;
            if self.calls == 1 {
                anyhow::bail!("no usable result");
            }
            Ok(vec![Detection {
                class_label: "MAN".to_string(),
                class_id: 7,
                confidence: 0.95,
                x_top_left: 0.0,
                y_top_left: 0.0,
                width: 1.0,
                height: 1.0,
            }])
        }
    }

    let mut mux = SourceMultiplexer::new(DIMS, fast_policy(30));
    mux.attach(1, Box::new(StubStream::new(DIMS))).unwrap();

    let backend = LocalBackend::new(Box::new(FlakyClassifier { calls: 0 }));
    let mut run_loop = RunLoop::new(
        mux,
        Box::new(backend),
        aggregator(dir.path()),
        LivenessMarker::disabled(),
        RunMode::SinglePass,
        no_delays(),
    );

    // The first frame's failure is logged and skipped; the run completes on
    // the second frame.
    run_loop.run().unwrap();
    assert_eq!(run_loop.frames_processed(), 1);

    let text = std::fs::read_to_string(dir.path().join("predictions.log")).unwrap();
    assert!(text.lines().any(|l| l.contains(",7,MAN,")));
}

#[test]
fn liveness_marker_is_cleared_by_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let marker_path = dir.path().join("alive");
    std::fs::write(&marker_path, b"").unwrap();

    let mut mux = SourceMultiplexer::new(DIMS, fast_policy(30));
    mux.attach(1, Box::new(StubStream::new(DIMS))).unwrap();

    let backend = LocalBackend::new(Box::new(StubClassifier::new()));
    let mut run_loop = RunLoop::new(
        mux,
        Box::new(backend),
        aggregator(dir.path()),
        LivenessMarker::new(marker_path.clone()),
        RunMode::SinglePass,
        no_delays(),
    );

    run_loop.run().unwrap();
    assert!(!marker_path.exists());
}
