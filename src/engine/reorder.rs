//! Restores sequence order for results completed out of order

use std::collections::BTreeMap;
use tracing::warn;

/// Holds results until every earlier sequence number has been resolved.
///
/// A sequence number is resolved either by a result ([`ReorderBuffer::insert`])
/// or by being declared dropped ([`ReorderBuffer::skip`]).
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, Option<T>>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Sequence number the next released item must have
    pub fn next_expected(&self) -> u64 {
        self.next
    }

    pub fn insert(&mut self, sequence: u64, item: T) {
        self.resolve(sequence, Some(item));
    }

    /// Mark `sequence` as never arriving
    pub fn skip(&mut self, sequence: u64) {
        self.resolve(sequence, None);
    }

    fn resolve(&mut self, sequence: u64, item: Option<T>) {
        if sequence < self.next || self.pending.contains_key(&sequence) {
            warn!("Duplicate or late sequence number {} ignored", sequence);
            return;
        }
        self.pending.insert(sequence, item);
    }

    /// Release the next item if everything before it is resolved
    pub fn pop(&mut self) -> Option<T> {
        while let Some(slot) = self.pending.remove(&self.next) {
            self.next += 1;
            if let Some(item) = slot {
                return Some(item);
            }
        }
        None
    }

    /// Release every item that is ready, in order
    #[cfg(test)]
    fn drain_ready(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.pop()).collect()
    }

    /// Number of sequence numbers waiting on an earlier one
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_passthrough() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, "a");
        assert_eq!(buffer.pop(), Some("a"));
        buffer.insert(1, "b");
        assert_eq!(buffer.pop(), Some("b"));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_out_of_order_is_held() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(2, 2);
        buffer.insert(1, 1);
        assert!(buffer.drain_ready().is_empty());
        assert_eq!(buffer.len(), 2);

        buffer.insert(0, 0);
        assert_eq!(buffer.drain_ready(), vec![0, 1, 2]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_expected(), 3);
    }

    #[test]
    fn test_skipped_numbers_release_later_items() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, 'x');
        buffer.insert(2, 'z');
        assert_eq!(buffer.drain_ready(), vec!['x']);

        buffer.skip(1);
        assert_eq!(buffer.drain_ready(), vec!['z']);
        assert_eq!(buffer.next_expected(), 3);
    }

    #[test]
    fn test_late_and_duplicate_ignored() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, 10);
        assert_eq!(buffer.pop(), Some(10));
        buffer.insert(0, 11);
        buffer.insert(1, 20);
        buffer.insert(1, 21);
        assert_eq!(buffer.drain_ready(), vec![20]);
    }
}
