//! The streaming pipeline: owns the buffers, drives one inference worker
//! thread against a caller-supplied backend, and exposes the state machine
//! and metrics that callers poll from the audio I/O threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::backend::ConversionBackend;
use crate::buffer_manager::BufferManager;
use crate::config::ConversionConfig;
use crate::error::{PipelineError, PipelineResult, ValidationError};
use crate::message::PipelineEvent;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::state::{AtomicPipelineState, PipelineState};

/// How long `stop()` waits for the worker thread to notice the stop flag
/// and return before giving up and declaring the pipeline `Failed`.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the worker sleeps between polls when the input buffer doesn't
/// have a full chunk yet: `min(chunk_duration / 4, 5ms)`, which resolves to
/// `5ms` for every chunk size valid at the mandatory 48kHz working rate.
const WORKER_IDLE_POLL: Duration = Duration::from_millis(5);

/// Ties a [`ConversionBackend`] to the buffers and thread machinery that
/// move audio through it in real time.
///
/// Construction takes an already-selected backend rather than a
/// `BackendKind` alone, since backend implementations live in a crate that
/// depends on this one (to keep this crate free of any particular
/// backend's dependency weight); callers select the backend with a single
/// line at the construction site, e.g. `rvc_backend::build_backend(&config, loader)`.
pub struct StreamingPipeline {
    config: ConversionConfig,
    buffers: Arc<BufferManager>,
    metrics: Arc<Metrics>,
    state: Arc<AtomicPipelineState>,
    stop_flag: Arc<AtomicBool>,
    backend: Mutex<Option<Box<dyn ConversionBackend>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    event_tx: Sender<PipelineEvent>,
    event_rx: Receiver<PipelineEvent>,
    metrics_timer: Mutex<Option<(JoinHandle<()>, Arc<AtomicBool>)>>,
}

impl StreamingPipeline {
    /// Validates `config` and wraps `backend`, in `Created` state. Does not
    /// touch the backend until [`StreamingPipeline::start`].
    pub fn new(config: ConversionConfig, backend: Box<dyn ConversionBackend>) -> PipelineResult<Self> {
        config.validate()?;
        let context_size = config.context_size();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            buffers: Arc::new(BufferManager::new(config.chunk_size, context_size)),
            metrics: Arc::new(Metrics::new()),
            state: Arc::new(AtomicPipelineState::new(PipelineState::Created)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            backend: Mutex::new(Some(backend)),
            worker: Mutex::new(None),
            event_tx,
            event_rx,
            metrics_timer: Mutex::new(None),
            config,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Initializes the backend and, on success, spawns the inference
    /// worker. Backend initialization runs synchronously on the calling
    /// thread and may take several seconds (model load); the worker only
    /// starts once it has succeeded.
    pub fn start(&self) -> PipelineResult<()> {
        let current = self.state.load();
        if current != PipelineState::Created {
            return Err(PipelineError::NotStartable(current));
        }

        let mut backend = self
            .backend
            .lock()
            .take()
            .ok_or(PipelineError::NotStartable(current))?;

        if let Err(err) = backend.initialize() {
            self.state.store(PipelineState::Failed);
            let _ = self.event_tx.send(PipelineEvent::failed(&err));
            return Err(PipelineError::BackendInit(err));
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        self.state.store(PipelineState::Running);

        let buffers = Arc::clone(&self.buffers);
        let metrics = Arc::clone(&self.metrics);
        let state = Arc::clone(&self.state);
        let stop_flag = Arc::clone(&self.stop_flag);
        let event_tx = self.event_tx.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("rvc-inference-worker".into())
            .spawn(move || {
                worker_main(backend, buffers, metrics, state, stop_flag, event_tx, config);
            })
            .map_err(|e| PipelineError::SpawnFailed(e.to_string()))?;

        *self.worker.lock() = Some(handle);
        let _ = self.event_tx.send(PipelineEvent::Started);
        Ok(())
    }

    /// Signals the worker to stop, joins it (waiting up to
    /// [`WORKER_JOIN_TIMEOUT`]), and runs backend cleanup from the worker
    /// thread itself. Idempotent: calling `stop()` again after the pipeline
    /// is already `Stopped` or `Failed` is a no-op.
    pub fn stop(&self) -> PipelineResult<()> {
        let current = self.state.load();
        match current {
            PipelineState::Stopped | PipelineState::Failed => return Ok(()),
            PipelineState::Created => {
                self.state.store(PipelineState::Stopped);
                return Ok(());
            }
            _ => {}
        }

        self.state.store(PipelineState::Stopping);
        self.stop_flag.store(true, Ordering::SeqCst);
        self.stop_metrics_timer();

        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            self.state.store(PipelineState::Stopped);
            return Ok(());
        };

        if join_with_timeout(handle, WORKER_JOIN_TIMEOUT) {
            self.state.store(PipelineState::Stopped);
            let _ = self.event_tx.send(PipelineEvent::Stopped);
            Ok(())
        } else {
            self.state.store(PipelineState::Failed);
            let _ = self
                .event_tx
                .send(PipelineEvent::failed("worker thread did not join in time"));
            Err(PipelineError::JoinTimeout(WORKER_JOIN_TIMEOUT))
        }
    }

    /// Pushes captured audio into the pipeline. Validated for non-finite
    /// samples before entering the buffer. A no-op (but not an error) when
    /// the pipeline isn't `Running` or `Stopping`.
    pub fn process_input(&self, samples: &[f32]) -> Result<(), ValidationError> {
        let current = self.state.load();
        if !matches!(current, PipelineState::Running | PipelineState::Stopping) {
            return Ok(());
        }
        if let Some(offset) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ValidationError::NonFiniteSample(offset));
        }
        self.buffers.write_input(samples);
        Ok(())
    }

    /// Pulls up to `n` converted samples for playback. Returns an empty
    /// vector once the pipeline is `Stopped` or `Failed`, or before it has
    /// ever started.
    pub fn get_output(&self, n: usize) -> Vec<f32> {
        let current = self.state.load();
        if matches!(
            current,
            PipelineState::Created | PipelineState::Stopped | PipelineState::Failed
        ) {
            return Vec::new();
        }
        self.buffers.read_output(n)
    }

    /// Clears all buffers and drop counters. Only legal outside `Running`.
    pub fn reset_buffers(&self) -> PipelineResult<()> {
        if self.state.load() == PipelineState::Running {
            return Err(PipelineError::ResetWhileRunning);
        }
        self.buffers.reset();
        Ok(())
    }

    /// Current metrics, refreshed with the latest buffer fill levels.
    pub fn metrics(&self) -> MetricsSnapshot {
        let health = self.buffers.buffer_health();
        self.metrics.update_buffer_fill(health.input_fill, health.output_fill);
        self.metrics.snapshot()
    }

    /// Subscribe to lifecycle/health events. The returned receiver is
    /// shared; every event is delivered to exactly one caller's `recv`.
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.event_rx
    }

    /// Starts a background thread that calls `callback` with a fresh
    /// metrics snapshot every `interval_ms`, until the pipeline stops.
    /// Replaces any previously registered callback.
    pub fn set_metrics_callback<F>(&self, interval_ms: u64, callback: F)
    where
        F: Fn(MetricsSnapshot) + Send + 'static,
    {
        self.stop_metrics_timer();

        let buffers = Arc::clone(&self.buffers);
        let metrics = Arc::clone(&self.metrics);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let interval = Duration::from_millis(interval_ms.max(1));

        let handle = thread::Builder::new()
            .name("rvc-metrics-timer".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    let health = buffers.buffer_health();
                    metrics.update_buffer_fill(health.input_fill, health.output_fill);
                    callback(metrics.snapshot());
                    thread::sleep(interval);
                }
            })
            .expect("failed to spawn rvc-metrics-timer thread");

        *self.metrics_timer.lock() = Some((handle, stop));
    }

    fn stop_metrics_timer(&self) {
        if let Some((handle, stop)) = self.metrics_timer.lock().take() {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}

impl Drop for StreamingPipeline {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Joins `handle` on a watcher thread so the caller can give up after
/// `timeout` without leaking the panic if the worker never returns.
/// `std::thread::JoinHandle` has no timed join, so this is the common
/// workaround: a throwaway thread blocks on the real join and reports back
/// over a channel.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).is_ok()
}

enum ConvertOutcome {
    Success(Vec<f32>),
    Degraded { detail: String, retryable: bool },
    Fault(String),
}

fn call_convert(backend: &mut dyn ConversionBackend, chunk: &[f32], context: &[f32]) -> ConvertOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| backend.convert_chunk(chunk, context)));
    match result {
        Ok(Ok(converted)) => ConvertOutcome::Success(converted),
        Ok(Err(err)) => ConvertOutcome::Degraded {
            detail: err.detail,
            retryable: err.retryable,
        },
        Err(payload) => ConvertOutcome::Fault(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked with a non-string payload".to_string()
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_main(
    mut backend: Box<dyn ConversionBackend>,
    buffers: Arc<BufferManager>,
    metrics: Arc<Metrics>,
    state: Arc<AtomicPipelineState>,
    stop_flag: Arc<AtomicBool>,
    event_tx: Sender<PipelineEvent>,
    config: ConversionConfig,
) {
    let chunk_duration_ms = config.chunk_duration_ms();

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let Some((chunk, context)) = buffers.read_chunk_for_processing() else {
            thread::sleep(WORKER_IDLE_POLL);
            continue;
        };

        let t0 = Instant::now();
        let mut outcome = call_convert(backend.as_mut(), &chunk, &context);
        // Only a retryable failure gets a single retry; a non-retryable one
        // (a model contract violation) would just fail the same way again.
        if let ConvertOutcome::Degraded { retryable: true, .. } = outcome {
            outcome = call_convert(backend.as_mut(), &chunk, &context);
        }
        let elapsed_ms = t0.elapsed().as_secs_f32() * 1000.0;

        match outcome {
            ConvertOutcome::Success(converted) => {
                buffers.write_output(&converted);
                let health = buffers.buffer_health();
                let output_fill_ms = (health.output_fill as f32 / config.sample_rate as f32) * 1000.0;
                metrics.record_chunk_processed(elapsed_ms, chunk_duration_ms, output_fill_ms);
            }
            ConvertOutcome::Degraded { detail, .. } => {
                tracing::warn!(detail = %detail, "backend convert_chunk failed; substituting silence");
                buffers.write_output(&vec![0.0; chunk.len()]);
                metrics.record_chunk_dropped();
                let _ = event_tx.send(PipelineEvent::ChunkDegraded { detail });
            }
            ConvertOutcome::Fault(detail) => {
                tracing::error!(detail = %detail, "inference worker faulted; pipeline failing");
                state.store(PipelineState::Failed);
                let _ = event_tx.send(PipelineEvent::failed(format!("worker fault: {detail}")));
                let _ = panic::catch_unwind(AssertUnwindSafe(|| backend.cleanup()));
                return;
            }
        }
    }

    backend.cleanup();
}
