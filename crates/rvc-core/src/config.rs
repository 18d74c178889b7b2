//! Pipeline configuration.
//!
//! `ConversionConfig` is plain data: constructing one never fails, only
//! [`ConversionConfig::validate`] can reject it. This keeps config loading
//! (from JSON, from defaults, from a UI form) decoupled from pipeline
//! construction.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which pitch-extraction algorithm the streaming backend's pitch predictor
/// should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchMethod {
    /// Neural pitch estimator; higher quality, higher latency.
    Rmvpe,
    /// Cheap DSP-based fallback for low-power targets.
    Fallback,
}

/// Which [`crate::backend::ConversionBackend`] implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Shells out to an external batch converter via WAV scratch files.
    BatchAdapter,
    /// In-process neural inference with context carry-over and crossfade.
    Streaming,
}

/// Full configuration for one [`crate::pipeline::StreamingPipeline`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Identifies which set of model weights / index to load.
    pub model_id: String,
    /// Samples per chunk handed to the backend. Must be in
    /// `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
    pub chunk_size: usize,
    /// Audio sample rate in Hz. Only `WORKING_SAMPLE_RATE` is guaranteed
    /// supported by every backend.
    pub sample_rate: u32,
    /// Pitch shift in semitones, applied on top of the model's natural pitch.
    pub pitch_shift: i32,
    /// Blend between the raw model output and the retrieval index, in `[0, 1]`.
    pub index_rate: f32,
    pub pitch_method: PitchMethod,
    pub backend: BackendKind,
}

impl ConversionConfig {
    pub const MIN_CHUNK_SIZE: usize = 1024;
    pub const MAX_CHUNK_SIZE: usize = 16384;
    pub const WORKING_SAMPLE_RATE: u32 = 48_000;

    /// Fraction of a chunk carried forward as synthesis context.
    pub const CONTEXT_FRACTION: f32 = 0.25;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model_id.trim().is_empty() {
            return Err(ValidationError::EmptyModelId);
        }
        if self.chunk_size < Self::MIN_CHUNK_SIZE || self.chunk_size > Self::MAX_CHUNK_SIZE {
            return Err(ValidationError::ChunkSizeOutOfRange {
                actual: self.chunk_size,
                min: Self::MIN_CHUNK_SIZE,
                max: Self::MAX_CHUNK_SIZE,
            });
        }
        if self.sample_rate != Self::WORKING_SAMPLE_RATE {
            return Err(ValidationError::UnsupportedSampleRate(self.sample_rate));
        }
        if !(-24..=24).contains(&self.pitch_shift) {
            return Err(ValidationError::PitchShiftOutOfRange(self.pitch_shift));
        }
        if !(0.0..=1.0).contains(&self.index_rate) {
            return Err(ValidationError::IndexRateOutOfRange(self.index_rate));
        }
        Ok(())
    }

    /// Samples of prior-chunk context carried into the next conversion call.
    pub fn context_size(&self) -> usize {
        ((self.chunk_size as f32) * Self::CONTEXT_FRACTION) as usize
    }

    pub fn chunk_duration_ms(&self) -> f32 {
        (self.chunk_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Low-latency preset: smallest legal chunk size.
    pub fn low_latency(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            chunk_size: Self::MIN_CHUNK_SIZE,
            sample_rate: Self::WORKING_SAMPLE_RATE,
            pitch_shift: 0,
            index_rate: 0.75,
            pitch_method: PitchMethod::Fallback,
            backend: BackendKind::Streaming,
        }
    }

    /// Stable preset: larger chunk size, trading latency for robustness.
    pub fn stable(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            chunk_size: 8192,
            sample_rate: Self::WORKING_SAMPLE_RATE,
            pitch_shift: 0,
            index_rate: 0.75,
            pitch_method: PitchMethod::Rmvpe,
            backend: BackendKind::Streaming,
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            chunk_size: 4096,
            sample_rate: Self::WORKING_SAMPLE_RATE,
            pitch_shift: 0,
            index_rate: 0.75,
            pitch_method: PitchMethod::Rmvpe,
            backend: BackendKind::Streaming,
        }
    }
}
