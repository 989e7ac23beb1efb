// =============================================================================
// TimeRangeIndex — sorted slice intervals for containment / overlap search
// =============================================================================
//
// Entries are kept sorted by `start` ascending. Slices are hour buckets, so
// intervals never overlap each other and `end` is sorted too. That lets
// `find_containing` binary search on `start` and check the single candidate,
// and `find_overlapping` bound its result with two binary searches.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub start: i64,
    pub end: i64,
    pub slice_key: String,
}

#[derive(Debug, Default, Clone)]
pub struct TimeRangeIndex {
    entries: Vec<RangeEntry>,
}

impl TimeRangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `entry.slice_key`, keeping the list
    /// sorted by `start`.
    pub fn insert(&mut self, entry: RangeEntry) {
        self.entries.retain(|e| e.slice_key != entry.slice_key);
        let pos = self.entries.partition_point(|e| e.start <= entry.start);
        self.entries.insert(pos, entry);
    }

    pub fn remove(&mut self, slice_key: &str) {
        self.entries.retain(|e| e.slice_key != slice_key);
    }

    /// Any slice with `start <= timestamp <= end`.
    pub fn find_containing(&self, timestamp: i64) -> Option<&str> {
        let upper = self.entries.partition_point(|e| e.start <= timestamp);
        self.entries[..upper]
            .last()
            .filter(|e| e.end >= timestamp)
            .map(|e| e.slice_key.as_str())
    }

    /// Slices where `!(entry.end < start || entry.start > end)`, in `start`
    /// order.
    pub fn find_overlapping(&self, start: i64, end: i64) -> Vec<&str> {
        if start > end {
            return Vec::new();
        }
        let lower = self.entries.partition_point(|e| e.end < start);
        let upper = self.entries.partition_point(|e| e.start <= end);
        if lower >= upper {
            return Vec::new();
        }
        self.entries[lower..upper]
            .iter()
            .map(|e| e.slice_key.as_str())
            .collect()
    }

    /// Slices that end at or before `timestamp`, most recent `end` first.
    pub fn find_before(&self, timestamp: i64) -> Vec<&str> {
        let mut hits: Vec<&RangeEntry> =
            self.entries.iter().filter(|e| e.end <= timestamp).collect();
        hits.sort_by(|a, b| b.end.cmp(&a.end));
        hits.into_iter().map(|e| e.slice_key.as_str()).collect()
    }

    pub fn first(&self) -> Option<&RangeEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
