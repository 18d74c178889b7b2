//! End-to-end scenarios exercising `StreamingPipeline` through its public
//! API only, against small in-test backend doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rvc_core::{BackendConvertError, BackendInitError, ConversionBackend, ConversionConfig, PipelineState, StreamingPipeline};

struct EchoBackend;

impl ConversionBackend for EchoBackend {
    fn initialize(&mut self) -> Result<(), BackendInitError> {
        Ok(())
    }

    fn convert_chunk(&mut self, chunk: &[f32], _context: &[f32]) -> Result<Vec<f32>, BackendConvertError> {
        Ok(chunk.to_vec())
    }

    fn cleanup(&mut self) {}
}

/// Fails every Nth call, otherwise echoes. Models an intermittent backend
/// without needing real model code.
struct FlakyBackend {
    call_count: usize,
    fail_every: usize,
}

impl ConversionBackend for FlakyBackend {
    fn initialize(&mut self) -> Result<(), BackendInitError> {
        Ok(())
    }

    fn convert_chunk(&mut self, chunk: &[f32], _context: &[f32]) -> Result<Vec<f32>, BackendConvertError> {
        self.call_count += 1;
        if self.call_count % self.fail_every == 0 {
            Err(BackendConvertError::retryable("flaky simulated fault"))
        } else {
            Ok(chunk.to_vec())
        }
    }

    fn cleanup(&mut self) {}
}

fn config(chunk_size: usize) -> ConversionConfig {
    ConversionConfig {
        model_id: "integration-test-model".into(),
        chunk_size,
        ..ConversionConfig::default()
    }
}

fn drain_output(pipeline: &StreamingPipeline, want: usize, timeout: Duration) -> Vec<f32> {
    let deadline = Instant::now() + timeout;
    let mut collected = Vec::new();
    while collected.len() < want && Instant::now() < deadline {
        let remaining = want - collected.len();
        let chunk = pipeline.get_output(remaining);
        if chunk.is_empty() {
            thread::sleep(Duration::from_millis(5));
        } else {
            collected.extend(chunk);
        }
    }
    collected
}

#[test]
fn passthrough_identity_across_many_chunks() {
    let pipeline = StreamingPipeline::new(config(1024), Box::new(EchoBackend)).unwrap();
    pipeline.start().unwrap();

    let mut all_input = Vec::new();
    for n in 0..8 {
        let samples: Vec<f32> = (0..1024).map(|i| ((i + n * 1024) as f32 % 997.0) / 997.0).collect();
        pipeline.process_input(&samples).unwrap();
        all_input.extend(samples);
    }

    let output = drain_output(&pipeline, all_input.len(), Duration::from_secs(5));
    pipeline.stop().unwrap();
    assert_eq!(output, all_input);
}

#[test]
fn crash_free_under_overload() {
    let pipeline = StreamingPipeline::new(config(1024), Box::new(EchoBackend)).unwrap();
    pipeline.start().unwrap();

    // Push far more input than the pipeline can possibly keep: this must
    // never panic or block, only drop silently-tracked excess.
    for _ in 0..200 {
        pipeline.process_input(&vec![0.5; 1024]).unwrap();
    }

    thread::sleep(Duration::from_millis(100));
    assert_eq!(pipeline.state(), PipelineState::Running);
    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn backend_failure_is_absorbed_as_silence() {
    let backend = FlakyBackend {
        call_count: 0,
        fail_every: 3,
    };
    let pipeline = StreamingPipeline::new(config(1024), Box::new(backend)).unwrap();
    pipeline.start().unwrap();

    for _ in 0..9 {
        pipeline.process_input(&vec![1.0; 1024]).unwrap();
    }

    let output = drain_output(&pipeline, 9 * 1024, Duration::from_secs(5));
    pipeline.stop().unwrap();

    assert_eq!(output.len(), 9 * 1024);
    // At least one chunk should have come back as silence from the flaky
    // failure (it fails on calls 3, 6, 9, each followed by one retry which
    // also lands on the same modulus only if fail_every divides 2; here it
    // always succeeds on retry since call_count advances past the boundary).
    assert!(pipeline.state() == PipelineState::Running);
}

#[test]
fn start_stop_start_cycle_requires_fresh_instances() {
    for _ in 0..3 {
        let pipeline = StreamingPipeline::new(config(1024), Box::new(EchoBackend)).unwrap();
        pipeline.start().unwrap();
        pipeline.process_input(&vec![0.25; 1024]).unwrap();
        let output = drain_output(&pipeline, 1024, Duration::from_secs(2));
        assert_eq!(output, vec![0.25; 1024]);
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }
}

#[test]
fn ordering_is_preserved_under_bursty_input() {
    let pipeline = StreamingPipeline::new(config(1024), Box::new(EchoBackend)).unwrap();
    pipeline.start().unwrap();

    let mut expected = Vec::new();
    for burst in 0..4 {
        let mut burst_samples = Vec::new();
        for _ in 0..2 {
            let samples: Vec<f32> = (0..1024).map(|i| (burst * 10000 + i) as f32).collect();
            burst_samples.extend(samples);
        }
        pipeline.process_input(&burst_samples).unwrap();
        expected.extend(burst_samples);
        thread::sleep(Duration::from_millis(10));
    }

    let output = drain_output(&pipeline, expected.len(), Duration::from_secs(5));
    pipeline.stop().unwrap();
    assert_eq!(output, expected);
}

#[test]
fn irregular_input_sizes_preserve_ordering_and_stay_running() {
    let chunk_size = 1024;
    let pipeline = StreamingPipeline::new(config(chunk_size), Box::new(EchoBackend)).unwrap();
    pipeline.start().unwrap();

    // 1, CS-1, CS, CS+1, 2*CS-1 samples per call: none of these line up
    // with the chunk boundary, so the buffer manager has to carry partial
    // chunks across calls without losing or reordering samples.
    let sizes = [1usize, chunk_size - 1, chunk_size, chunk_size + 1, 2 * chunk_size - 1];
    let mut expected = Vec::new();
    let mut next_value = 0.0f32;
    for &size in &sizes {
        let samples: Vec<f32> = (0..size).map(|_| {
            next_value += 1.0;
            next_value
        }).collect();
        pipeline.process_input(&samples).unwrap();
        expected.extend(samples);
    }

    let output = drain_output(&pipeline, expected.len(), Duration::from_secs(5));
    pipeline.stop().unwrap();
    assert_eq!(output, expected);
}

#[test]
fn concurrent_stop_calls_resolve_once() {
    let pipeline = Arc::new(StreamingPipeline::new(config(1024), Box::new(EchoBackend)).unwrap());
    pipeline.start().unwrap();

    let successes = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let pipeline = Arc::clone(&pipeline);
        let successes = Arc::clone(&successes);
        handles.push(thread::spawn(move || {
            if pipeline.stop().is_ok() {
                successes.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(successes.load(Ordering::SeqCst), 4);
}
