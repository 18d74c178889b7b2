//! Audio device transport: enumerates hardware and drives a
//! `rvc_core::StreamingPipeline` as a peer, never an owner.

pub mod audio_io;
pub mod device;
pub mod error;

pub use audio_io::AudioIO;
pub use device::{AudioDevice, DeviceType, COMMON_RATES};
pub use error::DeviceError;
