//! # Sample Buffer
//!
//! Ordered, append-only queue of samples awaiting a flush. The sampling
//! thread pushes; a flush drains everything at once.
//!
//! The buffer is capped. If flushes stop succeeding and the cap is reached,
//! the oldest sample is dropped for each new one so memory stays bounded
//! while the most recent data survives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use super::sample::Sample;
use crate::sync::{lock, lock_with_timeout};

#[derive(Debug, Default)]
struct Inner {
    samples: VecDeque<Sample>,
    dropped_since_drain: u64,
    dropped_total: u64,
}

/// Lock-guarded sample queue shared by the sampler and the flush path.
#[derive(Debug)]
pub struct SampleBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl SampleBuffer {
    /// Creates an empty buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Appends `sample` and returns the number of buffered samples.
    pub fn push(&self, sample: Sample) -> usize {
        let mut inner = lock(&self.inner);

        if inner.samples.len() >= self.capacity {
            inner.samples.pop_front();
            inner.dropped_total += 1;
            inner.dropped_since_drain += 1;
            if inner.dropped_since_drain == 1 {
                warn!(
                    "Sample buffer full ({} samples); dropping oldest samples until the next flush",
                    self.capacity
                );
            }
        }

        inner.samples.push_back(sample);
        inner.samples.len()
    }

    /// Removes and returns all buffered samples in append order.
    ///
    /// Returns `None` if the lock could not be taken within `timeout`; the
    /// samples then stay buffered for the next attempt.
    pub fn drain(&self, timeout: Duration) -> Option<Vec<Sample>> {
        let mut inner = lock_with_timeout(&self.inner, timeout)?;

        if inner.dropped_since_drain > 0 {
            warn!(
                "{} samples were dropped while the buffer was full",
                inner.dropped_since_drain
            );
            inner.dropped_since_drain = 0;
        }

        Some(inner.samples.drain(..).collect())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        lock(&self.inner).dropped_total
    }
}
