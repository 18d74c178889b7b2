//! Bounded audio sample queue shared between threads.
//!
//! Every audio thread in this crate (capture, playback, inference worker)
//! briefly contends for a ring buffer's internal mutex rather than using a
//! lock-free queue: the buffer needs `peek`, FIFO `read`, and
//! "overflow discards the oldest samples" semantics that a lock-free SPSC
//! ring does not give you for free, and the contention window here is a
//! handful of `VecDeque` operations, not a syscall.

use std::collections::VecDeque;

use parking_lot::Mutex;

struct Inner {
    data: VecDeque<f32>,
    capacity: usize,
    drops: u64,
}

/// A fixed-capacity FIFO of `f32` audio samples. Safe to share behind an
/// `Arc` and call from any number of threads; all operations take the
/// internal lock for their whole duration.
pub struct RingBuffer {
    inner: Mutex<Inner>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        Self {
            inner: Mutex::new(Inner {
                data: VecDeque::with_capacity(capacity),
                capacity,
                drops: 0,
            }),
        }
    }

    /// Appends `samples`, discarding the oldest data first if the buffer
    /// would otherwise exceed capacity. If `samples` alone is longer than
    /// the capacity, only its tail is kept.
    pub fn write(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        let capacity = inner.capacity;

        if samples.len() >= capacity {
            let dropped = inner.data.len() as u64 + (samples.len() - capacity) as u64;
            inner.drops += dropped;
            inner.data.clear();
            inner.data.extend(samples[samples.len() - capacity..].iter().copied());
            return;
        }

        let total = inner.data.len() + samples.len();
        if total > capacity {
            let excess = total - capacity;
            for _ in 0..excess {
                inner.data.pop_front();
            }
            inner.drops += excess as u64;
        }
        inner.data.extend(samples.iter().copied());
    }

    /// Removes and returns up to `n` samples from the front. Returns fewer
    /// than `n` (possibly zero) if the buffer doesn't have that many.
    pub fn read(&self, n: usize) -> Vec<f32> {
        let mut inner = self.inner.lock();
        let take = n.min(inner.data.len());
        inner.data.drain(..take).collect()
    }

    /// Like [`RingBuffer::read`] but leaves the data in place.
    pub fn peek(&self, n: usize) -> Vec<f32> {
        let inner = self.inner.lock();
        let take = n.min(inner.data.len());
        inner.data.iter().take(take).copied().collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn available(&self) -> usize {
        let inner = self.inner.lock();
        inner.capacity - inner.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// Total samples discarded by overflow since creation or the last
    /// [`RingBuffer::clear`].
    pub fn drops(&self) -> u64 {
        self.inner.lock().drops
    }

    /// Empties the buffer and resets the drop counter.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.data.clear();
        inner.drops = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_roundtrip() {
        let rb = RingBuffer::new(8);
        rb.write(&[1.0, 2.0, 3.0]);
        assert_eq!(rb.size(), 3);
        assert_eq!(rb.read(2), vec![1.0, 2.0]);
        assert_eq!(rb.size(), 1);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let rb = RingBuffer::new(8);
        rb.write(&[1.0, 2.0, 3.0]);
        assert_eq!(rb.peek(2), vec![1.0, 2.0]);
        assert_eq!(rb.size(), 3);
    }

    #[test]
    fn test_read_more_than_available_returns_what_exists() {
        let rb = RingBuffer::new(8);
        rb.write(&[1.0, 2.0]);
        assert_eq!(rb.read(10), vec![1.0, 2.0]);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let rb = RingBuffer::new(4);
        rb.write(&[1.0, 2.0, 3.0, 4.0]);
        rb.write(&[5.0, 6.0]);
        assert_eq!(rb.size(), 4);
        assert_eq!(rb.read(4), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(rb.drops(), 2);
    }

    #[test]
    fn test_write_larger_than_capacity_keeps_tail_only() {
        let rb = RingBuffer::new(3);
        rb.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(rb.size(), 3);
        assert_eq!(rb.read(3), vec![3.0, 4.0, 5.0]);
        assert_eq!(rb.drops(), 2);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let rb = RingBuffer::new(16);
        for _ in 0..100 {
            rb.write(&[0.0; 5]);
            assert!(rb.size() <= rb.capacity());
        }
    }

    #[test]
    fn test_clear_resets_data_and_drops() {
        let rb = RingBuffer::new(2);
        rb.write(&[1.0, 2.0, 3.0]);
        assert!(rb.drops() > 0);
        rb.clear();
        assert_eq!(rb.size(), 0);
        assert_eq!(rb.drops(), 0);
    }
}
