use thiserror::Error;

/// Errors from enumerating or driving audio hardware through `cpal`.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no default input device available")]
    NoDefaultInput,

    #[error("no default output device available")]
    NoDefaultOutput,

    #[error("device does not support the requested stream configuration: {0}")]
    UnsupportedConfig(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuildFailed(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlayFailed(String),

    #[error("failed to enumerate devices: {0}")]
    EnumerationFailed(String),
}
