//! Core streaming pipeline for real-time voice conversion.
//!
//! ```text
//!               write_input()              read_chunk_for_processing()
//! capture ───────────────────▶ input_buf ───────────────────────────▶ worker
//!  thread                     (RingBuffer)                          thread
//!                                                                      │
//!                                                      convert_chunk()│
//!                                                  (ConversionBackend)│
//!                                                                      ▼
//! playback ◀─────────────────── output_buf ◀───────────────── write_output()
//!  thread      get_output()    (RingBuffer)
//! ```
//!
//! `StreamingPipeline` owns the buffers and the worker thread; it never
//! touches audio hardware itself. A peer crate owns device I/O and drives
//! `process_input`/`get_output` from its own capture/playback callbacks,
//! and a sibling crate supplies the `ConversionBackend` implementations.

pub mod backend;
pub mod buffer_manager;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod resample;
pub mod ring_buffer;
pub mod state;

pub use backend::ConversionBackend;
pub use buffer_manager::{BufferHealth, BufferManager};
pub use config::{BackendKind, ConversionConfig, PitchMethod};
pub use error::{BackendConvertError, BackendInitError, PipelineError, PipelineResult, ValidationError};
pub use message::PipelineEvent;
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::StreamingPipeline;
pub use resample::linear_resample;
pub use ring_buffer::RingBuffer;
pub use state::{AtomicPipelineState, PipelineState};
