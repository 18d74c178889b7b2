//! Conversion backend implementations and the factory that selects between
//! them from a [`ConversionConfig`].

pub mod batch;
pub mod models;
pub mod streaming;

pub use batch::{BatchAdapter, BatchAdapterConfig};
pub use models::{ContentEmbedder, ContentFeatures, ModelLoader, PitchPredictor, PitchTrack, SynthesisNetwork};
pub use streaming::StreamingBackend;

use rvc_core::{BackendInitError, BackendKind, ConversionBackend, ConversionConfig};

/// Constructs the `ConversionBackend` named by `config.backend`. This is
/// the single line a caller changes to swap implementations; everything
/// downstream of it only ever sees `Box<dyn ConversionBackend>`.
pub fn build_backend(config: &ConversionConfig, loader: Box<dyn ModelLoader>) -> Result<Box<dyn ConversionBackend>, BackendInitError> {
    match config.backend {
        BackendKind::Streaming => Ok(Box::new(StreamingBackend::new(
            config.model_id.clone(),
            loader,
            config.pitch_shift,
            config.index_rate,
        ))),
        BackendKind::BatchAdapter => {
            let batch_config = BatchAdapterConfig::new("rvc-batch-convert", config.sample_rate);
            Ok(Box::new(BatchAdapter::new(batch_config, config.model_id.clone())))
        }
    }
}
