// =============================================================================
// Compression Engine — hourly delta-encoded slices for aged candles
// =============================================================================
//
// Aged candles are grouped into one-hour buckets per symbol. Each bucket is
// stored as a base candle (the chronologically first one) plus parallel delta
// arrays for every field:
//
//   delta[field][i] = candle[i].field - base.field
//   candle[i].field = base.field + delta[field][i]
//
// Timestamps round-trip exactly. Prices and volumes round-trip within float
// tolerance: `(a - b) + b == a` does not hold for every IEEE-754 pair.
//
// Slices are immutable once built. Adding candles to an existing bucket builds
// a replacement slice from the merged set.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::range_index::{RangeEntry, TimeRangeIndex};
use crate::types::{Candle, CANDLE_SIZE_BYTES};

/// Width of one slice bucket.
pub const BUCKET_MS: i64 = 3_600_000;

/// Fixed per-slice bookkeeping (key, bounds, counters).
const SLICE_OVERHEAD_BYTES: usize = 64;
/// One timestamp delta plus five field deltas, 8 bytes each.
const DELTA_ROW_BYTES: usize = 48;

/// Start of the hour bucket containing `timestamp`.
pub fn bucket_start(timestamp: i64) -> i64 {
    timestamp.div_euclid(BUCKET_MS) * BUCKET_MS
}

/// Slice key for `(symbol, timestamp)`: `"{symbol}-{bucket_start}"`.
pub fn bucket_key(symbol: &str, timestamp: i64) -> String {
    format!("{symbol}-{}", bucket_start(timestamp))
}

// =============================================================================
// CompressedTimeSlice
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedTimeSlice {
    pub key: String,
    pub base: Candle,
    pub timestamp_deltas: Vec<i64>,
    pub open_deltas: Vec<f64>,
    pub high_deltas: Vec<f64>,
    pub low_deltas: Vec<f64>,
    pub close_deltas: Vec<f64>,
    pub volume_deltas: Vec<f64>,
    pub count: usize,
    pub start_time: i64,
    pub end_time: i64,
    /// Wall-clock time the slice was built (epoch ms).
    pub compressed_at: i64,
    /// Estimated encoded size over raw size. Informational only, and not
    /// bounded to `0..1` like `CompressionSettings::compression_ratio`: the
    /// fixed header and base outweigh the data below eight candles, so
    /// sparse slices report more than 1.
    pub compression_ratio: f64,
}

impl CompressedTimeSlice {
    /// Delta-encode `candles` under `key`.
    ///
    /// Input order does not matter. When several candles share a timestamp
    /// the one appearing last in `candles` wins. Returns `None` for an empty
    /// input.
    pub fn compress(key: String, candles: Vec<Candle>, compressed_at: i64) -> Option<Self> {
        let rows = dedup_sorted(candles);
        let base = *rows.first()?;
        let end_time = rows.last().map_or(base.timestamp, |c| c.timestamp);
        let count = rows.len();

        let mut slice = Self {
            key,
            base,
            timestamp_deltas: Vec::with_capacity(count),
            open_deltas: Vec::with_capacity(count),
            high_deltas: Vec::with_capacity(count),
            low_deltas: Vec::with_capacity(count),
            close_deltas: Vec::with_capacity(count),
            volume_deltas: Vec::with_capacity(count),
            count,
            start_time: base.timestamp,
            end_time,
            compressed_at,
            compression_ratio: 0.0,
        };

        for c in &rows {
            slice.timestamp_deltas.push(c.timestamp - base.timestamp);
            slice.open_deltas.push(c.open - base.open);
            slice.high_deltas.push(c.high - base.high);
            slice.low_deltas.push(c.low - base.low);
            slice.close_deltas.push(c.close - base.close);
            slice.volume_deltas.push(c.volume - base.volume);
        }

        slice.compression_ratio =
            slice.estimated_bytes() as f64 / (count * CANDLE_SIZE_BYTES) as f64;
        Some(slice)
    }

    /// Rebuild every candle, ascending by timestamp.
    pub fn decompress(&self) -> Vec<Candle> {
        (0..self.count).map(|i| self.row(i)).collect()
    }

    /// Exact-timestamp lookup. Deltas are sorted, so this binary searches
    /// instead of decompressing the whole slice.
    pub fn find(&self, timestamp: i64) -> Option<Candle> {
        let delta = timestamp.checked_sub(self.base.timestamp)?;
        let i = self.timestamp_deltas.binary_search(&delta).ok()?;
        Some(self.row(i))
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp
            .checked_sub(self.base.timestamp)
            .is_some_and(|d| self.timestamp_deltas.binary_search(&d).is_ok())
    }

    /// Candles with `start <= timestamp <= end`.
    pub fn range(&self, start: i64, end: i64) -> Vec<Candle> {
        let lo = self
            .timestamp_deltas
            .partition_point(|d| self.base.timestamp + d < start);
        let hi = self
            .timestamp_deltas
            .partition_point(|d| self.base.timestamp + d <= end);
        (lo..hi.max(lo)).map(|i| self.row(i)).collect()
    }

    /// A replacement slice holding this slice's candles plus `incoming`.
    /// Incoming candles overwrite existing ones with the same timestamp.
    pub fn merged_with(&self, incoming: Vec<Candle>, compressed_at: i64) -> Self {
        let mut rows = self.decompress();
        rows.extend(incoming);
        // `rows` is non-empty because `self.count >= 1`.
        Self::compress(self.key.clone(), rows, compressed_at).unwrap_or_else(|| self.clone())
    }

    /// A replacement slice without its `n` oldest candles, or `None` when
    /// nothing would remain.
    pub fn without_oldest(&self, n: usize) -> Option<Self> {
        if n >= self.count {
            return None;
        }
        let rows = self.decompress().split_off(n);
        Self::compress(self.key.clone(), rows, self.compressed_at)
    }

    pub fn estimated_bytes(&self) -> usize {
        SLICE_OVERHEAD_BYTES + CANDLE_SIZE_BYTES + self.count * DELTA_ROW_BYTES
    }

    fn row(&self, i: usize) -> Candle {
        Candle {
            timestamp: self.base.timestamp + self.timestamp_deltas[i],
            open: self.base.open + self.open_deltas[i],
            high: self.base.high + self.high_deltas[i],
            low: self.base.low + self.low_deltas[i],
            close: self.base.close + self.close_deltas[i],
            volume: self.base.volume + self.volume_deltas[i],
        }
    }
}

/// Sort ascending by timestamp and keep the last occurrence of each timestamp.
fn dedup_sorted(mut candles: Vec<Candle>) -> Vec<Candle> {
    // Stable sort keeps later duplicates after earlier ones.
    candles.sort_by_key(|c| c.timestamp);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for c in candles {
        match out.last_mut() {
            Some(last) if last.timestamp == c.timestamp => *last = c,
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// CompressedStore — the archive tier for one symbol
// =============================================================================

/// Slice map plus its interval index. Every slice key has exactly one
/// `TimeRangeIndex` entry and vice versa.
#[derive(Debug, Clone)]
pub struct CompressedStore {
    symbol: String,
    slices: HashMap<String, CompressedTimeSlice>,
    ranges: TimeRangeIndex,
    total: usize,
}

impl CompressedStore {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            slices: HashMap::new(),
            ranges: TimeRangeIndex::new(),
            total: 0,
        }
    }

    /// Move `candles` into their hour slices, merging with any slice that
    /// already exists for the bucket. Returns the number of slices written.
    pub fn archive(&mut self, candles: Vec<Candle>, now: i64) -> usize {
        let mut groups: BTreeMap<i64, Vec<Candle>> = BTreeMap::new();
        for c in candles {
            groups.entry(bucket_start(c.timestamp)).or_default().push(c);
        }

        let mut written = 0;
        for (start, group) in groups {
            let key = bucket_key(&self.symbol, start);
            let slice = match self.slices.get(&key) {
                Some(existing) => Some(existing.merged_with(group, now)),
                None => CompressedTimeSlice::compress(key.clone(), group, now),
            };
            if let Some(slice) = slice {
                self.put(slice);
                written += 1;
            }
        }
        written
    }

    /// Overwrite an archived candle that has the same timestamp as
    /// `candle`. Returns `false` when no archived candle matches.
    pub fn replace(&mut self, candle: Candle, now: i64) -> bool {
        let Some(key) = self.ranges.find_containing(candle.timestamp) else {
            return false;
        };
        let Some(slice) = self.slices.get(key) else {
            return false;
        };
        if !slice.contains(candle.timestamp) {
            return false;
        }
        let updated = slice.merged_with(vec![candle], now);
        self.put(updated);
        true
    }

    pub fn get(&self, timestamp: i64) -> Option<Candle> {
        let key = self.ranges.find_containing(timestamp)?;
        self.slices.get(key)?.find(timestamp)
    }

    /// Archived candles with `start <= timestamp <= end`, ascending.
    pub fn range(&self, start: i64, end: i64) -> Vec<Candle> {
        self.ranges
            .find_overlapping(start, end)
            .into_iter()
            .filter_map(|key| self.slices.get(key))
            .flat_map(|slice| slice.range(start, end))
            .collect()
    }

    /// Decompress slices from the most recent `end` backwards until at least
    /// `n` candles are collected. The result is unsorted.
    pub fn newest(&self, n: usize) -> Vec<Candle> {
        let mut out = Vec::with_capacity(n.min(self.total));
        for key in self.ranges.find_before(i64::MAX) {
            if out.len() >= n {
                break;
            }
            if let Some(slice) = self.slices.get(key) {
                out.extend(slice.decompress());
            }
        }
        out
    }

    /// Every archived candle, ascending.
    pub fn all(&self) -> Vec<Candle> {
        self.ranges
            .entries()
            .iter()
            .filter_map(|e| self.slices.get(&e.slice_key))
            .flat_map(CompressedTimeSlice::decompress)
            .collect()
    }

    /// Drop the `n` oldest archived candles. Returns how many were dropped.
    pub fn trim_oldest(&mut self, mut n: usize) -> usize {
        let mut dropped = 0;
        while n > 0 {
            let Some(first) = self.ranges.first() else {
                break;
            };
            let key = first.slice_key.clone();
            let Some(slice) = self.slices.get(&key) else {
                self.ranges.remove(&key);
                continue;
            };
            let take = n.min(slice.count);
            match slice.without_oldest(take) {
                Some(rest) => self.put(rest),
                None => self.remove(&key),
            }
            debug!(slice = %key, dropped = take, "archived candles trimmed");
            dropped += take;
            n -= take;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    pub fn slice(&self, key: &str) -> Option<&CompressedTimeSlice> {
        self.slices.get(key)
    }

    pub fn ranges(&self) -> &TimeRangeIndex {
        &self.ranges
    }

    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.slices.values().map(|s| s.start_time).min()
    }

    pub fn newest_timestamp(&self) -> Option<i64> {
        self.slices.values().map(|s| s.end_time).max()
    }

    pub fn clear(&mut self) {
        self.slices.clear();
        self.ranges.clear();
        self.total = 0;
    }

    fn put(&mut self, slice: CompressedTimeSlice) {
        self.ranges.insert(RangeEntry {
            start: slice.start_time,
            end: slice.end_time,
            slice_key: slice.key.clone(),
        });
        self.total += slice.count;
        if let Some(old) = self.slices.insert(slice.key.clone(), slice) {
            self.total -= old.count;
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.slices.remove(key) {
            self.total -= old.count;
        }
        self.ranges.remove(key);
    }
}

// =============================================================================
// Tests
// =============================================================================
