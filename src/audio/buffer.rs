//! Bounded byte FIFO between device callbacks and the pumps
//!
//! The host audio API runs its callbacks on its own thread; the pumps run on
//! the engine thread. Each device owns one lock-free ring split into a
//! writer and a reader. Capture callbacks hold the writer and the outbound
//! pump reads; the inbound pump writes and playback callbacks hold the
//! reader.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct RingCounters {
    /// Bytes refused because the ring was full
    overflow: AtomicUsize,
    /// Reads that came up short
    underrun: AtomicUsize,
}

/// Writing half of a byte ring
pub struct RingWriter {
    producer: HeapProd<u8>,
    counters: Arc<RingCounters>,
}

/// Reading half of a byte ring
pub struct RingReader {
    consumer: HeapCons<u8>,
    counters: Arc<RingCounters>,
}

/// Create a ring holding at most `capacity` bytes (at least one)
pub fn byte_ring(capacity: usize) -> (RingWriter, RingReader) {
    let (producer, consumer) = HeapRb::<u8>::new(capacity.max(1)).split();
    let counters = Arc::new(RingCounters::default());
    (
        RingWriter {
            producer,
            counters: counters.clone(),
        },
        RingReader { consumer, counters },
    )
}

impl RingWriter {
    /// Append as much of `data` as fits. Returns the number of bytes stored;
    /// the rest is dropped and counted as overflow.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = self.producer.push_slice(data);
        if n < data.len() {
            self.counters
                .overflow
                .fetch_add(data.len() - n, Ordering::Relaxed);
        }
        n
    }

    /// Bytes that can still be pushed without overflow
    pub fn free(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Bytes currently queued
    pub fn len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }

    pub fn overflow_count(&self) -> usize {
        self.counters.overflow.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.counters.underrun.load(Ordering::Relaxed)
    }
}

impl RingReader {
    /// Move up to `out.len()` bytes into `out`. A short read counts as an
    /// underrun.
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.take_into(out);
        if n < out.len() {
            self.counters.underrun.fetch_add(1, Ordering::Relaxed);
        }
        n
    }

    /// Move up to `out.len()` bytes into `out` without counting underruns
    pub fn take_into(&mut self, out: &mut [u8]) -> usize {
        self.consumer.pop_slice(out)
    }

    /// Bytes currently queued
    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard everything queued
    pub fn clear(&mut self) {
        self.consumer.clear();
    }

    pub fn overflow_count(&self) -> usize {
        self.counters.overflow.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.counters.underrun.load(Ordering::Relaxed)
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.consumer.capacity().get() as f32
    }
}
