// =============================================================================
// TimestampIndex — O(1) point lookup over the recent tier
// =============================================================================
//
// Maps a candle timestamp to the ring sequence number that currently holds it.
// The owner keeps it exactly in sync with the ring: one entry per ring element.

use std::collections::HashMap;

use super::ring::RingBuffer;
use crate::types::Candle;

#[derive(Debug, Default, Clone)]
pub struct TimestampIndex {
    slots: HashMap<i64, u64>,
}

impl TimestampIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timestamp: i64, seq: u64) {
        self.slots.insert(timestamp, seq);
    }

    pub fn get(&self, timestamp: i64) -> Option<u64> {
        self.slots.get(&timestamp).copied()
    }

    pub fn remove(&mut self, timestamp: i64) -> Option<u64> {
        self.slots.remove(&timestamp)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.slots.contains_key(&timestamp)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Replace every entry with the current contents of `ring`.
    pub fn rebuild(&mut self, ring: &RingBuffer<Candle>) {
        self.slots.clear();
        for (seq, candle) in ring.iter_seq() {
            self.slots.insert(candle.timestamp, seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut idx = TimestampIndex::new();
        idx.insert(1_000, 7);
        assert_eq!(idx.get(1_000), Some(7));
        assert!(idx.contains(1_000));
        assert_eq!(idx.remove(1_000), Some(7));
        assert!(idx.get(1_000).is_none());
        assert!(idx.is_empty());
    }

    #[test]
    fn rebuild_tracks_ring() {
        let mut ring = RingBuffer::new(3);
        for ts in [1_000, 2_000, 3_000, 4_000] {
            ring.push(Candle::new(ts, 1.0, 1.0, 1.0, 1.0, 1.0));
        }
        let mut idx = TimestampIndex::new();
        idx.insert(1_000, 0);
        idx.rebuild(&ring);

        assert_eq!(idx.len(), ring.len());
        assert!(!idx.contains(1_000));
        let seq = idx.get(3_000).unwrap();
        assert_eq!(ring.get(seq).map(|c| c.timestamp), Some(3_000));
    }
}
