//! Collaborator traits for the neural components `StreamingBackend` drives.
//!
//! Model internals (network architecture, weight format, inference
//! runtime) are intentionally out of scope here: `StreamingBackend` only
//! needs a content embedder, a pitch predictor, and a synthesis network
//! behind stable trait boundaries, loaded once via a [`ModelLoader`]
//! supplied by the caller. This keeps the backend testable with simple
//! deterministic fakes instead of real model weights.

use rvc_core::BackendInitError;

/// Speaker-independent content features extracted from a chunk of source
/// audio, at whatever frame rate the embedder produces internally.
#[derive(Debug, Clone, Default)]
pub struct ContentFeatures {
    pub frames: Vec<f32>,
    pub feature_dim: usize,
}

/// A per-frame fundamental-frequency track, in Hz, `0.0` marking unvoiced
/// frames.
#[derive(Debug, Clone, Default)]
pub struct PitchTrack {
    pub hz: Vec<f32>,
}

/// Extracts content features from raw audio. Implementations must be
/// deterministic for identical input and context.
pub trait ContentEmbedder: Send {
    fn embed(&mut self, audio: &[f32], context: &[f32]) -> ContentFeatures;
}

/// Predicts pitch from raw audio, shifted by `semitone_shift` semitones.
pub trait PitchPredictor: Send {
    fn predict(&mut self, audio: &[f32], semitone_shift: i32) -> PitchTrack;
}

/// Synthesizes converted audio from content features, a pitch track, and
/// an index-blend rate, producing exactly as many samples as went into the
/// content embedder.
pub trait SynthesisNetwork: Send {
    fn synthesize(&mut self, content: &ContentFeatures, pitch: &PitchTrack, index_rate: f32, out_len: usize) -> Vec<f32>;
}

/// Produces the three model collaborators for one `model_id`. Implementing
/// this is how a caller plugs in real model weights without
/// `StreamingBackend` knowing anything about how they're stored or run.
pub trait ModelLoader: Send {
    fn load_content_embedder(&self, model_id: &str) -> Result<Box<dyn ContentEmbedder>, BackendInitError>;
    fn load_pitch_predictor(&self, model_id: &str) -> Result<Box<dyn PitchPredictor>, BackendInitError>;
    fn load_synthesis_network(&self, model_id: &str) -> Result<Box<dyn SynthesisNetwork>, BackendInitError>;
}
