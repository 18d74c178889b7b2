//! Status events the pipeline pushes out, distinct from the audio data path.

/// Lifecycle and health notifications a caller can subscribe to via
/// [`crate::pipeline::StreamingPipeline::events`]. This is a status channel,
/// not a command channel: the pipeline's public methods (`start`, `stop`,
/// `process_input`, `get_output`) remain the only way to drive it.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started,
    Stopped,
    /// The pipeline moved to `Failed`. `reason` is human-readable, not
    /// meant to be matched on.
    Failed { reason: String },
    /// A chunk's conversion failed and was replaced with silence.
    ChunkDegraded { detail: String },
}

impl PipelineEvent {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        PipelineEvent::Failed {
            reason: reason.to_string(),
        }
    }
}
