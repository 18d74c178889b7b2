//! Capability trait implemented by conversion backends.
//!
//! This crate only depends on the trait: concrete backends (the external
//! batch adapter, the in-process streaming backend) live in a sibling crate
//! that depends back on this one, so swapping implementations never touches
//! `StreamingPipeline`'s code, only the single `Box<dyn ConversionBackend>`
//! handed to it at construction time.

use crate::error::{BackendConvertError, BackendInitError};

/// One interchangeable voice-conversion implementation.
///
/// Implementations own whatever state they need (model handles, scratch
/// directories, subprocess handles) and are moved onto the inference worker
/// thread for the lifetime of a single `start`/`stop` cycle; nothing else
/// touches them concurrently.
pub trait ConversionBackend: Send {
    /// Loads models / spawns subprocesses / otherwise prepares to convert.
    /// Called once, synchronously, before the worker thread is spawned.
    fn initialize(&mut self) -> Result<(), BackendInitError>;

    /// Converts one chunk of source audio, given prior-chunk context for
    /// continuity. Must return exactly `chunk.len()` samples on success.
    fn convert_chunk(&mut self, chunk: &[f32], context: &[f32]) -> Result<Vec<f32>, BackendConvertError>;

    /// Releases resources. Called exactly once, from the worker thread,
    /// whether the worker stopped cleanly or faulted.
    fn cleanup(&mut self);
}
