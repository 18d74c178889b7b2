//! Composes the three ring buffers the pipeline moves audio through:
//! `input_buf` (capture -> worker), a small context carry-over slot
//! (worker -> worker, across chunks), and `output_buf` (worker -> playback).

use parking_lot::Mutex;

use crate::ring_buffer::RingBuffer;

/// Instantaneous fill levels and cumulative drop counts, used for metrics
/// and for the worker's idle-poll decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferHealth {
    pub input_fill: usize,
    pub output_fill: usize,
    pub context_fill: usize,
    pub input_drops: u64,
    pub output_drops: u64,
}

pub struct BufferManager {
    input_buf: RingBuffer,
    context: Mutex<Vec<f32>>,
    output_buf: RingBuffer,
    chunk_size: usize,
    context_size: usize,
}

impl BufferManager {
    /// `input_buf` holds at least two chunks so a burst of capture callbacks
    /// never blocks on the worker; `output_buf` holds four, giving playback
    /// enough headroom to survive a slow or retried conversion.
    pub fn new(chunk_size: usize, context_size: usize) -> Self {
        Self {
            input_buf: RingBuffer::new(chunk_size * 2),
            context: Mutex::new(Vec::new()),
            output_buf: RingBuffer::new(chunk_size * 4),
            chunk_size,
            context_size,
        }
    }

    /// Called from the capture thread (or directly by callers feeding the
    /// pipeline without real hardware).
    pub fn write_input(&self, samples: &[f32]) {
        self.input_buf.write(samples);
    }

    /// Called from the inference worker. If a full chunk isn't available
    /// yet, returns `None` without consuming anything. On success, returns
    /// `(chunk, context)` and rotates the context buffer to the tail of the
    /// chunk just taken, so the next call sees continuity across the seam.
    pub fn read_chunk_for_processing(&self) -> Option<(Vec<f32>, Vec<f32>)> {
        if self.input_buf.size() < self.chunk_size {
            return None;
        }
        let chunk = self.input_buf.read(self.chunk_size);
        if chunk.len() < self.chunk_size {
            // Another reader beat us to it; single-consumer in practice, but
            // don't silently hand back a short chunk.
            return None;
        }

        let mut context = self.context.lock();
        let previous_context = context.clone();
        let start = chunk.len().saturating_sub(self.context_size);
        context.clear();
        context.extend_from_slice(&chunk[start..]);

        Some((chunk, previous_context))
    }

    /// Called from the inference worker after a chunk is converted.
    pub fn write_output(&self, samples: &[f32]) {
        self.output_buf.write(samples);
    }

    /// Called from the playback thread.
    pub fn read_output(&self, n: usize) -> Vec<f32> {
        self.output_buf.read(n)
    }

    pub fn buffer_health(&self) -> BufferHealth {
        BufferHealth {
            input_fill: self.input_buf.size(),
            output_fill: self.output_buf.size(),
            context_fill: self.context.lock().len(),
            input_drops: self.input_buf.drops(),
            output_drops: self.output_buf.drops(),
        }
    }

    /// Clears all three buffers and their drop counters. The pipeline only
    /// permits this outside `Running`, enforced by the caller.
    pub fn reset(&self) {
        self.input_buf.clear();
        self.output_buf.clear();
        self.context.lock().clear();
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }
}
