//! Bounded sample queue between the I/O thread and the consumer
//!
//! The reader thread pushes decoded samples as they arrive; the consumer
//! drains everything once per tick. The queue never grows past its capacity:
//! when full, the oldest sample is evicted so the consumer always sees the
//! most recent data.
//!
//! A single `parking_lot::Mutex` guards the buffer. The lock is held only for
//! the push or the swap-out in `drain_all`, never across decoding or fusion.

use crate::core::types::SensorSample;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of buffered samples (about one second at 100 Hz)
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sample stored without loss
    Stored,
    /// Queue was full; the oldest sample was dropped to make room
    Evicted,
}

/// Thread-safe bounded FIFO of sensor samples
pub struct SampleQueue {
    capacity: usize,
    samples: Mutex<VecDeque<SensorSample>>,
    overflows: AtomicU64,
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            overflows: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Total samples dropped to overflow since creation.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Append a sample, evicting the oldest one if the queue is full.
    pub fn push(&self, sample: SensorSample) -> PushOutcome {
        let evicted = {
            let mut samples = self.samples.lock();
            let evicted = samples.len() >= self.capacity;
            if evicted {
                samples.pop_front();
            }
            samples.push_back(sample);
            evicted
        };

        if evicted {
            let total = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "Sample queue full ({}), dropped oldest sample ({} dropped total)",
                self.capacity,
                total
            );
            PushOutcome::Evicted
        } else {
            PushOutcome::Stored
        }
    }

    /// Remove and return every queued sample in arrival order.
    pub fn drain_all(&self) -> Vec<SensorSample> {
        let mut samples = self.samples.lock();
        samples.drain(..).collect()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}
