//! Bounded rolling history of per-day activity samples.

use std::collections::VecDeque;

use colmi_types::{ActivitySample, HISTORY_CAPACITY};

/// A bounded, insertion-ordered buffer of resolved activity samples.
///
/// Holds at most [`HISTORY_CAPACITY`] entries in fetch order; pushing
/// beyond capacity evicts the oldest entry.
#[derive(Debug, Clone, Default)]
pub struct ActivityHistory {
    samples: VecDeque<ActivitySample>,
}

impl ActivityHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append a resolved sample, evicting the oldest entry at capacity.
    pub fn push(&mut self, sample: ActivitySample) {
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Remove all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in fetch order, as a plain vector for snapshots.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ActivitySample> {
        self.samples.iter().copied().collect()
    }

    /// Iterate over samples in fetch order.
    pub fn iter(&self) -> impl Iterator<Item = &ActivitySample> {
        self.samples.iter()
    }
}
