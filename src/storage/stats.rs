// =============================================================================
// Statistics — memory accounting snapshots and point-lookup hit rate
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::CANDLE_SIZE_BYTES;

/// Point-in-time summary of one buffer, suitable for a dashboard payload or a
/// persistence pipeline deciding what to drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferStatistics {
    pub symbol: String,
    pub total_candles: usize,
    pub recent_count: usize,
    pub compressed_count: usize,
    pub slice_count: usize,
    /// Bytes held by uncompressed candles in the recent tier.
    pub memory_usage: usize,
    /// 0 when empty.
    pub oldest_timestamp: i64,
    /// 0 when empty.
    pub newest_timestamp: i64,
    pub timespan: i64,
    pub average_candle_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub hit_rate: f64,
    pub access_count: u64,
    pub memory_usage: usize,
    /// `memory_usage / (total_candles * 64)`; 0 when empty.
    pub compression_ratio: f64,
}

impl PerformanceMetrics {
    pub fn new(access: &AccessTracker, memory_usage: usize, total_candles: usize) -> Self {
        let compression_ratio = if total_candles > 0 {
            memory_usage as f64 / (total_candles * CANDLE_SIZE_BYTES) as f64
        } else {
            0.0
        };
        Self {
            hit_rate: access.hit_rate(),
            access_count: access.access_count(),
            memory_usage,
            compression_ratio,
        }
    }
}

/// Running query counters.
///
/// `access_count` counts every query-class call. Each point lookup folds its
/// outcome into the hit rate incrementally:
///
///   hit:  rate = (rate * (n - 1) + 1) / n
///   miss: rate = (rate * (n - 1)) / n
///
/// where `n` is `access_count` including the lookup itself. Range, last-N
/// and full-scan queries bump `n` without touching the rate, so they dilute
/// it on the next lookup.
#[derive(Debug, Default, Clone)]
pub struct AccessTracker {
    access_count: u64,
    lookups: u64,
    hit_rate: f64,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a range / last-N / full-scan query.
    pub fn record_query(&mut self) {
        self.access_count += 1;
    }

    /// Count a point lookup and fold its outcome into the hit rate.
    pub fn record_lookup(&mut self, hit: bool) {
        self.access_count += 1;
        self.lookups += 1;
        let n = self.access_count as f64;
        let prior = self.hit_rate * (n - 1.0);
        self.hit_rate = if hit { (prior + 1.0) / n } else { prior / n };
    }

    pub fn hit_rate(&self) -> f64 {
        self.hit_rate
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
