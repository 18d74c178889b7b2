//! Error taxonomy for the conversion pipeline.
//!
//! Mirrors the split used throughout this workspace: small, specific
//! `thiserror` enums at each boundary (validation, backend init, backend
//! convert), aggregated into [`PipelineError`] for anything that crosses the
//! pipeline's own API.

use std::time::Duration;

use thiserror::Error;

use crate::state::PipelineState;

/// Rejections raised while validating a [`crate::config::ConversionConfig`]
/// or an inbound audio chunk, before any buffer or backend is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("chunk_size must be in [{min}, {max}], got {actual}")]
    ChunkSizeOutOfRange {
        actual: usize,
        min: usize,
        max: usize,
    },

    #[error("sample_rate {0} Hz is not supported")]
    UnsupportedSampleRate(u32),

    #[error("pitch_shift must be in [-24, 24] semitones, got {0}")]
    PitchShiftOutOfRange(i32),

    #[error("index_rate must be in [0.0, 1.0], got {0}")]
    IndexRateOutOfRange(f32),

    #[error("model_id must not be empty")]
    EmptyModelId,

    #[error("input chunk contains a non-finite sample (NaN or infinity) at offset {0}")]
    NonFiniteSample(usize),
}

/// A backend failed to come up during [`crate::pipeline::StreamingPipeline::start`].
/// Always fatal to that start attempt; the pipeline moves to `Failed`.
#[derive(Error, Debug, Clone)]
pub enum BackendInitError {
    #[error("model file not found or unreadable: {0}")]
    ModelNotFound(String),

    #[error("model weights are incompatible with this backend: {0}")]
    IncompatibleWeights(String),

    #[error("insufficient compute resources to load model: {0}")]
    InsufficientCompute(String),

    #[error("scratch directory unavailable: {0}")]
    ScratchUnavailable(String),

    #[error("external converter process unavailable: {0}")]
    ExternalProcessUnavailable(String),

    #[error("backend initialization failed: {0}")]
    Other(String),
}

/// A backend failed to convert one chunk. `retryable` tells the worker
/// whether to attempt the same chunk once more before degrading to silence.
#[derive(Error, Debug, Clone)]
#[error("conversion failed (retryable={retryable}): {detail}")]
pub struct BackendConvertError {
    pub retryable: bool,
    pub detail: String,
}

impl BackendConvertError {
    pub fn retryable(detail: impl Into<String>) -> Self {
        Self {
            retryable: true,
            detail: detail.into(),
        }
    }

    pub fn fatal(detail: impl Into<String>) -> Self {
        Self {
            retryable: false,
            detail: detail.into(),
        }
    }
}

/// Errors surfaced across the pipeline's public API.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    BackendInit(#[from] BackendInitError),

    #[error("pipeline is not in a startable state (current state: {0:?})")]
    NotStartable(PipelineState),

    #[error("buffers cannot be reset while the pipeline is running")]
    ResetWhileRunning,

    #[error("worker thread did not join within {0:?}")]
    JoinTimeout(Duration),

    #[error("worker thread panicked: {0}")]
    WorkerFault(String),

    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
