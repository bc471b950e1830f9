use crate::models::Sample;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO buffer of market samples
///
/// Owned by the engine; analyzers work on the snapshots returned by
/// [`RollingMarketHistory::prices`], [`RollingMarketHistory::volumes`] and
/// [`RollingMarketHistory::window`].
#[derive(Debug, Clone)]
pub struct RollingMarketHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl RollingMarketHistory {
    /// Create a new history
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of samples to keep (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if the buffer is full
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Get the `k` most recent samples in insertion order
    pub fn window(&self, k: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(k);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volume).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RollingMarketHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
