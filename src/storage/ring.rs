// =============================================================================
// RingBuffer — fixed-capacity circular buffer for the recent tier
// =============================================================================
//
// Every element carries a sequence number equal to the total number of pushes
// that preceded it. Sequence numbers are contiguous from the front of the ring
// to the back, so an element can be addressed in O(1) by `seq - head_seq`.
// `retain` renumbers the survivors, so callers holding sequence numbers must
// rebuild them afterwards.
// =============================================================================

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    /// Sequence number of `items[0]`.
    head_seq: u64,
}

impl<T: Clone> RingBuffer<T> {
    /// A zero capacity is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            head_seq: 0,
        }
    }

    /// Append `item`, overwriting the oldest element when full.
    ///
    /// Returns the sequence number assigned to `item` and the evicted element,
    /// if any.
    pub fn push(&mut self, item: T) -> (u64, Option<T>) {
        let evicted = if self.is_full() {
            self.head_seq += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        (self.next_seq() - 1, evicted)
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// The element the next `push` would evict.
    pub fn peek_next(&self) -> Option<&T> {
        if self.is_full() {
            self.items.front()
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// All elements, oldest first.
    pub fn get_all(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// The last `n` elements, oldest first.
    pub fn get_window(&self, n: usize) -> Vec<T> {
        let start = self.items.len().saturating_sub(n);
        self.items.range(start..).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head_seq = 0;
    }

    pub fn get(&self, seq: u64) -> Option<&T> {
        let offset = seq.checked_sub(self.head_seq)?;
        self.items.get(usize::try_from(offset).ok()?)
    }

    pub fn get_mut(&mut self, seq: u64) -> Option<&mut T> {
        let offset = seq.checked_sub(self.head_seq)?;
        self.items.get_mut(usize::try_from(offset).ok()?)
    }

    /// Sequence-numbered view of every element, oldest first.
    pub fn iter_seq(&self) -> impl Iterator<Item = (u64, &T)> {
        let head = self.head_seq;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (head + i as u64, item))
    }

    /// Drop every element for which `keep` is false and return them in order.
    /// Survivors are renumbered so that sequence numbers stay contiguous.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let next = self.next_seq();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.capacity);
        for item in self.items.drain(..) {
            if keep(&item) {
                kept.push_back(item);
            } else {
                removed.push(item);
            }
        }
        self.items = kept;
        self.head_seq = next - self.items.len() as u64;
        removed
    }

    fn next_seq(&self) -> u64 {
        self.head_seq + self.items.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_until_full_then_overwrite() {
        let mut ring = RingBuffer::new(3);
        for i in 0..3 {
            let (_, evicted) = ring.push(i);
            assert!(evicted.is_none());
        }
        assert!(ring.is_full());
        assert_eq!(ring.peek_next(), Some(&0));

        let (seq, evicted) = ring.push(3);
        assert_eq!(seq, 3);
        assert_eq!(evicted, Some(0));
        assert_eq!(ring.get_all(), vec![1, 2, 3]);
        assert_eq!(ring.oldest(), Some(&1));
        assert_eq!(ring.latest(), Some(&3));
    }

    #[test]
    fn peek_next_empty_until_full() {
        let mut ring = RingBuffer::new(2);
        ring.push(1);
        assert!(ring.peek_next().is_none());
    }

    #[test]
    fn window_larger_than_len_returns_all() {
        let mut ring = RingBuffer::new(5);
        ring.push('a');
        ring.push('b');
        assert_eq!(ring.get_window(10), vec!['a', 'b']);
        assert_eq!(ring.get_window(1), vec!['b']);
        assert!(ring.get_window(0).is_empty());
    }

    #[test]
    fn sequence_lookup_survives_wraparound() {
        let mut ring = RingBuffer::new(2);
        let (s0, _) = ring.push("x");
        let (s1, _) = ring.push("y");
        let (s2, _) = ring.push("z");
        assert!(ring.get(s0).is_none());
        assert_eq!(ring.get(s1), Some(&"y"));
        assert_eq!(ring.get(s2), Some(&"z"));
        assert!(ring.get(s2 + 1).is_none());
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut ring = RingBuffer::new(2);
        let (seq, _) = ring.push(10);
        *ring.get_mut(seq).unwrap() = 11;
        assert_eq!(ring.latest(), Some(&11));
    }

    #[test]
    fn retain_renumbers_contiguously() {
        let mut ring = RingBuffer::new(4);
        for i in 0..4 {
            ring.push(i);
        }
        let removed = ring.retain(|v| v % 2 == 1);
        assert_eq!(removed, vec![0, 2]);
        assert_eq!(ring.len(), 2);

        let seqs: Vec<(u64, i32)> = ring.iter_seq().map(|(s, v)| (s, *v)).collect();
        assert_eq!(seqs.len(), 2);
        for (seq, v) in seqs {
            assert_eq!(ring.get(seq), Some(&v));
        }
        assert!(!ring.is_full());
    }

    #[test]
    fn zero_capacity_clamped() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(1);
        let (_, evicted) = ring.push(2);
        assert_eq!(evicted, Some(1));
    }

    #[test]
    fn clear_resets() {
        let mut ring = RingBuffer::new(2);
        ring.push(1);
        ring.push(2);
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.latest().is_none());
    }
}
