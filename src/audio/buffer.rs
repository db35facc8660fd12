//! Sample buffer addressed by absolute sample index

use std::collections::VecDeque;

/// FIFO of mono samples that remembers the absolute index of its oldest
/// sample, so overlapping frames can be cut by position in the stream.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    data: VecDeque<f32>,
    start_index: u64,
}

impl SampleBuffer {
    /// Create an empty buffer whose first sample will have index 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            start_index: 0,
        }
    }

    /// Append samples at the end of the stream
    pub fn write(&mut self, samples: &[f32]) {
        self.data.extend(samples.iter().copied());
    }

    /// Absolute index of the oldest retained sample
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// Absolute index one past the newest sample
    pub fn end_index(&self) -> u64 {
        self.start_index + self.data.len() as u64
    }

    /// Copy `len` samples starting at absolute index `start`.
    ///
    /// Returns `None` if any part of the range has been discarded or has not
    /// been written yet.
    pub fn copy_range(&self, start: u64, len: usize) -> Option<Vec<f32>> {
        if start < self.start_index || start + len as u64 > self.end_index() {
            return None;
        }
        let offset = (start - self.start_index) as usize;
        Some(self.data.range(offset..offset + len).copied().collect())
    }

    /// Drop every sample whose absolute index is below `index`
    pub fn discard_before(&mut self, index: u64) {
        if index <= self.start_index {
            return;
        }
        let count = ((index - self.start_index) as usize).min(self.data.len());
        self.data.drain(..count);
        self.start_index += count as u64;
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop everything and restart indexing at 0
    pub fn reset(&mut self) {
        self.data.clear();
        self.start_index = 0;
    }
}
