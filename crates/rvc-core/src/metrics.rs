//! Lock-free runtime metrics, sampled from any thread.
//!
//! Floating-point gauges are stored as their bit pattern in an `AtomicU32`
//! (`f32::to_bits` / `f32::from_bits`) since there is no `AtomicF32` in the
//! standard library; this is the same trick used for shared gain/level
//! state elsewhere in this workspace.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const EMA_ALPHA: f32 = 0.2;

struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A point-in-time copy of [`Metrics`], cheap to clone and serialize for a
/// UI, log line, or metrics callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub chunks_processed: u64,
    pub chunks_dropped: u64,
    pub last_processing_ms: f32,
    pub ema_processing_ms: f32,
    pub estimated_latency_ms: f32,
    pub input_fill: usize,
    pub output_fill: usize,
    pub length_discrepancies: u64,
}

/// Counters and gauges updated by the inference worker and read by anyone
/// holding an `Arc<Metrics>`.
pub struct Metrics {
    chunks_processed: AtomicU64,
    chunks_dropped: AtomicU64,
    last_processing_ms: AtomicF32,
    ema_processing_ms: AtomicF32,
    estimated_latency_ms: AtomicF32,
    input_fill: AtomicU64,
    output_fill: AtomicU64,
    length_discrepancies: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            chunks_processed: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            last_processing_ms: AtomicF32::new(0.0),
            ema_processing_ms: AtomicF32::new(0.0),
            estimated_latency_ms: AtomicF32::new(0.0),
            input_fill: AtomicU64::new(0),
            output_fill: AtomicU64::new(0),
            length_discrepancies: AtomicU64::new(0),
        }
    }

    /// Records a successful chunk conversion. `output_fill_ms` is the
    /// current output buffer's fill, expressed as a duration, folded into
    /// the latency estimate alongside the chunk duration and the EMA of
    /// processing time.
    pub fn record_chunk_processed(&self, processing_ms: f32, chunk_duration_ms: f32, output_fill_ms: f32) {
        let processed = self.chunks_processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_processing_ms.store(processing_ms);

        let ema = if processed == 1 {
            processing_ms
        } else {
            EMA_ALPHA * processing_ms + (1.0 - EMA_ALPHA) * self.ema_processing_ms.load()
        };
        self.ema_processing_ms.store(ema);
        self.estimated_latency_ms
            .store(chunk_duration_ms + ema + output_fill_ms);
    }

    pub fn record_chunk_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that a backend's decoded output length didn't match the
    /// requested chunk length before pad/trim brought it back in line.
    pub fn record_length_discrepancy(&self) {
        self.length_discrepancies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_buffer_fill(&self, input_fill: usize, output_fill: usize) {
        self.input_fill.store(input_fill as u64, Ordering::Relaxed);
        self.output_fill.store(output_fill as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            last_processing_ms: self.last_processing_ms.load(),
            ema_processing_ms: self.ema_processing_ms.load(),
            estimated_latency_ms: self.estimated_latency_ms.load(),
            input_fill: self.input_fill.load(Ordering::Relaxed) as usize,
            output_fill: self.output_fill.load(Ordering::Relaxed) as usize,
            length_discrepancies: self.length_discrepancies.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_metrics_are_zero() {
        let m = Metrics::new();
        let snap = m.snapshot();
        assert_eq!(snap.chunks_processed, 0);
        assert_eq!(snap.ema_processing_ms, 0.0);
    }

    #[test]
    fn test_first_sample_sets_ema_directly() {
        let m = Metrics::new();
        m.record_chunk_processed(10.0, 85.0, 0.0);
        assert_eq!(m.snapshot().ema_processing_ms, 10.0);
    }

    #[test]
    fn test_ema_smooths_toward_new_samples() {
        let m = Metrics::new();
        m.record_chunk_processed(10.0, 85.0, 0.0);
        m.record_chunk_processed(20.0, 85.0, 0.0);
        let ema = m.snapshot().ema_processing_ms;
        assert!(ema > 10.0 && ema < 20.0);
    }

    #[test]
    fn test_dropped_chunks_counted_separately_from_processed() {
        let m = Metrics::new();
        m.record_chunk_processed(5.0, 85.0, 0.0);
        m.record_chunk_dropped();
        let snap = m.snapshot();
        assert_eq!(snap.chunks_processed, 1);
        assert_eq!(snap.chunks_dropped, 1);
    }

    #[test]
    fn test_buffer_fill_is_reported() {
        let m = Metrics::new();
        m.update_buffer_fill(128, 256);
        let snap = m.snapshot();
        assert_eq!(snap.input_fill, 128);
        assert_eq!(snap.output_fill, 256);
    }

    #[test]
    fn test_length_discrepancies_are_counted() {
        let m = Metrics::new();
        m.record_length_discrepancy();
        m.record_length_discrepancy();
        assert_eq!(m.snapshot().length_discrepancies, 2);
    }
}
