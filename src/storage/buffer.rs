// =============================================================================
// TimeSeriesBuffer — two-tier OHLCV store for a single symbol
// =============================================================================
//
// Tiers:
//   - recent:     fixed-capacity ring + timestamp index, uncompressed
//   - compressed: hourly delta-encoded slices + interval index
//
// Every timestamp lives in exactly one tier. Candles leave the recent tier in
// two ways:
//   - eviction: the ring is full and a new candle is pushed. The evicted candle
//     is archived (or dropped when compression is disabled).
//   - compaction: candles older than `now - min_age_for_compression_ms` are
//     removed from the ring and the index and archived in one pass.
//
// Thread safety:
//   - parking_lot::RwLock over the tier state. Queries share it; ingestion,
//     compaction and `clear` take it exclusively.
//   - parking_lot::Mutex over the access counters so readers never need the
//     write lock. Lock order is always state, then access.
// =============================================================================

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::compression::CompressedStore;
use super::ring::RingBuffer;
use super::stats::{AccessTracker, BufferStatistics, PerformanceMetrics};
use super::timestamp_index::TimestampIndex;
use crate::config::{BatchPolicy, BufferConfig, CompressionSettings};
use crate::types::{Candle, CandleField, IngestOutcome, ValidationError, CANDLE_SIZE_BYTES};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Tier state
// =============================================================================

#[derive(Debug)]
struct TierState {
    ring: RingBuffer<Candle>,
    index: TimestampIndex,
    archive: CompressedStore,
    bytes_allocated: usize,
    last_compression: i64,
}

impl TierState {
    fn new(symbol: &str, recent_capacity: usize, now: i64) -> Self {
        Self {
            ring: RingBuffer::new(recent_capacity),
            index: TimestampIndex::new(),
            archive: CompressedStore::new(symbol),
            bytes_allocated: 0,
            last_compression: now,
        }
    }

    fn size(&self) -> usize {
        self.ring.len() + self.archive.len()
    }

    fn recent_candle(&self, timestamp: i64) -> Option<Candle> {
        let seq = self.index.get(timestamp)?;
        self.ring.get(seq).copied()
    }
}

// =============================================================================
// TimeSeriesBuffer
// =============================================================================

pub struct TimeSeriesBuffer {
    symbol: String,
    config: BufferConfig,
    state: RwLock<TierState>,
    access: Mutex<AccessTracker>,
}

impl TimeSeriesBuffer {
    pub fn new(symbol: impl Into<String>, config: BufferConfig) -> Self {
        let symbol = symbol.into();
        let state = TierState::new(&symbol, config.recent_capacity(), now_ms());
        debug!(
            symbol = %symbol,
            max_capacity = config.max_capacity,
            recent_capacity = config.recent_capacity(),
            compression = config.compression.enabled,
            "time-series buffer created"
        );
        Self {
            symbol,
            config,
            state: RwLock::new(state),
            access: Mutex::new(AccessTracker::new()),
        }
    }

    /// Build a buffer with default settings apart from capacity and,
    /// optionally, compression.
    pub fn create(
        symbol: impl Into<String>,
        max_capacity: usize,
        compression: Option<CompressionSettings>,
    ) -> Self {
        let mut config = BufferConfig::with_capacity(max_capacity);
        if let Some(settings) = compression {
            config.compression = settings;
        }
        Self::new(symbol, config)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Validate and store one candle, then give compaction a chance to run.
    ///
    /// A timestamp that is already stored is overwritten in place and the
    /// size does not change. An invalid candle leaves the buffer untouched.
    pub fn add_candle(&self, candle: Candle) -> Result<IngestOutcome, ValidationError> {
        self.add_candle_at(candle, now_ms())
    }

    /// [`add_candle`](Self::add_candle) with an explicit wall clock.
    pub fn add_candle_at(&self, candle: Candle, now: i64) -> Result<IngestOutcome, ValidationError> {
        if let Err(e) = candle.validate() {
            debug!(symbol = %self.symbol, error = %e, "candle rejected");
            return Err(e);
        }
        let mut state = self.state.write();
        let outcome = self.ingest(&mut state, candle, now);
        self.maybe_compress_locked(&mut state, now);
        Ok(outcome)
    }

    /// Sort `candles` by timestamp and ingest them in order under a single
    /// write lock.
    ///
    /// Returns one result per processed candle, in sorted order. With
    /// [`BatchPolicy::AbortOnFirstError`] the first error is the last element
    /// and the remaining candles are not ingested.
    pub fn add_candles(&self, candles: Vec<Candle>) -> Vec<Result<IngestOutcome, ValidationError>> {
        self.add_candles_at(candles, now_ms())
    }

    pub fn add_candles_at(
        &self,
        mut candles: Vec<Candle>,
        now: i64,
    ) -> Vec<Result<IngestOutcome, ValidationError>> {
        candles.sort_by_key(|c| c.timestamp);

        let mut results = Vec::with_capacity(candles.len());
        let mut state = self.state.write();
        for (i, candle) in candles.into_iter().enumerate() {
            if let Err(e) = candle.validate() {
                warn!(symbol = %self.symbol, position = i, error = %e, "batch candle rejected");
                results.push(Err(e));
                if self.config.batch_policy == BatchPolicy::AbortOnFirstError {
                    break;
                }
                continue;
            }
            results.push(Ok(self.ingest(&mut state, candle, now)));
            self.maybe_compress_locked(&mut state, now);
        }
        results
    }

    fn ingest(&self, state: &mut TierState, candle: Candle, now: i64) -> IngestOutcome {
        if let Some(seq) = state.index.get(candle.timestamp) {
            if let Some(slot) = state.ring.get_mut(seq) {
                *slot = candle;
                debug!(symbol = %self.symbol, timestamp = candle.timestamp, "recent candle replaced");
                return IngestOutcome::Replaced;
            }
        }

        if state.archive.replace(candle, now) {
            debug!(symbol = %self.symbol, timestamp = candle.timestamp, "archived candle replaced");
            return IngestOutcome::Replaced;
        }

        let (seq, evicted) = state.ring.push(candle);
        state.index.insert(candle.timestamp, seq);
        state.bytes_allocated += CANDLE_SIZE_BYTES;

        if let Some(old) = evicted {
            state.index.remove(old.timestamp);
            state.bytes_allocated = state.bytes_allocated.saturating_sub(CANDLE_SIZE_BYTES);
            if self.config.compression.enabled {
                state.archive.archive(vec![old], now);
                self.enforce_retention(state);
                debug!(symbol = %self.symbol, timestamp = old.timestamp, "evicted candle archived");
            } else {
                debug!(symbol = %self.symbol, timestamp = old.timestamp, "evicted candle dropped");
            }
        }

        IngestOutcome::Inserted
    }

    fn enforce_retention(&self, state: &mut TierState) {
        let excess = state.size().saturating_sub(self.config.max_capacity);
        if excess > 0 {
            let dropped = state.archive.trim_oldest(excess);
            debug!(symbol = %self.symbol, dropped, "retention limit applied");
        }
    }

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------

    /// Run compaction if the interval has elapsed or the recent tier is over
    /// its byte threshold. Returns whether it ran.
    pub fn maybe_compress(&self) -> bool {
        self.maybe_compress_at(now_ms())
    }

    pub fn maybe_compress_at(&self, now: i64) -> bool {
        let mut state = self.state.write();
        self.maybe_compress_locked(&mut state, now)
    }

    fn maybe_compress_locked(&self, state: &mut TierState, now: i64) -> bool {
        if !self.config.compression.enabled {
            return false;
        }
        let due = now - state.last_compression >= self.config.compression_interval_ms;
        let over_budget = state.bytes_allocated >= self.config.memory_threshold_bytes;
        if !due && !over_budget {
            return false;
        }
        self.compress_locked(state, now);
        true
    }

    /// Move every recent candle older than `now - min_age_for_compression_ms`
    /// into the compressed tier, regardless of the trigger policy. Returns the
    /// number of candles moved.
    pub fn compress_old_data(&self) -> usize {
        self.compress_old_data_at(now_ms())
    }

    pub fn compress_old_data_at(&self, now: i64) -> usize {
        let mut state = self.state.write();
        self.compress_locked(&mut state, now)
    }

    fn compress_locked(&self, state: &mut TierState, now: i64) -> usize {
        state.last_compression = now;
        let cutoff = now - self.config.compression.min_age_for_compression_ms;

        let aged = state.ring.retain(|c| c.timestamp >= cutoff);
        if aged.is_empty() {
            return 0;
        }

        // `retain` renumbered the ring; every sequence number is stale.
        state.index.rebuild(&state.ring);
        let moved = aged.len();
        state.bytes_allocated = state
            .bytes_allocated
            .saturating_sub(moved * CANDLE_SIZE_BYTES);

        let slices = state.archive.archive(aged, now);
        self.enforce_retention(state);

        info!(
            symbol = %self.symbol,
            moved,
            slices,
            recent = state.ring.len(),
            compressed = state.archive.len(),
            "aged candles compacted"
        );
        moved
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Newest candle in the recent tier. Not counted as an access.
    pub fn get_latest(&self) -> Option<Candle> {
        self.state.read().ring.latest().copied()
    }

    /// Exact-timestamp lookup across both tiers.
    pub fn get_candle(&self, timestamp: i64) -> Option<Candle> {
        let state = self.state.read();
        let found = state
            .recent_candle(timestamp)
            .or_else(|| state.archive.get(timestamp));
        self.access.lock().record_lookup(found.is_some());
        found
    }

    /// Candles with `start <= timestamp <= end`, ascending. With `limit`, only
    /// the most recent `limit` of them are returned.
    pub fn get_range(&self, start: i64, end: i64, limit: Option<usize>) -> Vec<Candle> {
        let state = self.state.read();
        let mut out: Vec<Candle> = state
            .ring
            .iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= end)
            .copied()
            .collect();
        out.extend(state.archive.range(start, end));
        self.access.lock().record_query();
        drop(state);

        out.sort_by_key(|c| c.timestamp);
        if let Some(limit) = limit {
            keep_last(&mut out, limit);
        }
        out
    }

    /// The `n` most recent candles, ascending.
    pub fn get_last_n(&self, n: usize) -> Vec<Candle> {
        let state = self.state.read();
        let mut out = if n <= state.ring.len() {
            state.ring.get_window(n)
        } else {
            let mut all = state.ring.get_all();
            all.extend(state.archive.newest(n - state.ring.len()));
            all
        };
        self.access.lock().record_query();
        drop(state);

        out.sort_by_key(|c| c.timestamp);
        keep_last(&mut out, n);
        out
    }

    /// Every stored candle, ascending. O(total size).
    pub fn get_all(&self) -> Vec<Candle> {
        let state = self.state.read();
        let mut out = state.archive.all();
        out.extend(state.ring.iter().copied());
        self.access.lock().record_query();
        drop(state);

        out.sort_by_key(|c| c.timestamp);
        out
    }

    /// One field of the last `count` candles, or of the whole recent tier when
    /// `count` is `None`.
    pub fn get_series(&self, field: CandleField, count: Option<usize>) -> Vec<f64> {
        let candles = match count {
            Some(n) => self.get_last_n(n),
            None => self.state.read().ring.get_all(),
        };
        candles
            .iter()
            .map(|c| match field {
                CandleField::Timestamp => c.timestamp as f64,
                CandleField::Open => c.open,
                CandleField::High => c.high,
                CandleField::Low => c.low,
                CandleField::Close => c.close,
                CandleField::Volume => c.volume,
            })
            .collect()
    }

    pub fn get_closes(&self, count: Option<usize>) -> Vec<f64> {
        self.get_series(CandleField::Close, count)
    }

    pub fn get_highs(&self, count: Option<usize>) -> Vec<f64> {
        self.get_series(CandleField::High, count)
    }

    pub fn get_lows(&self, count: Option<usize>) -> Vec<f64> {
        self.get_series(CandleField::Low, count)
    }

    pub fn get_volumes(&self, count: Option<usize>) -> Vec<f64> {
        self.get_series(CandleField::Volume, count)
    }

    /// `(high + low + close) / 3` per candle.
    pub fn get_typical_prices(&self, count: Option<usize>) -> Vec<f64> {
        let candles = match count {
            Some(n) => self.get_last_n(n),
            None => self.state.read().ring.get_all(),
        };
        candles.iter().map(Candle::typical_price).collect()
    }

    // -------------------------------------------------------------------------
    // Statistics & lifecycle
    // -------------------------------------------------------------------------

    pub fn get_statistics(&self) -> BufferStatistics {
        let state = self.state.read();
        let recent_count = state.ring.len();
        let compressed_count = state.archive.len();
        let total_candles = recent_count + compressed_count;
        let memory_usage = state.bytes_allocated;

        let oldest = state
            .ring
            .iter()
            .map(|c| c.timestamp)
            .chain(state.archive.oldest_timestamp())
            .min()
            .unwrap_or(0);
        let newest = state
            .ring
            .iter()
            .map(|c| c.timestamp)
            .chain(state.archive.newest_timestamp())
            .max()
            .unwrap_or(0);

        BufferStatistics {
            symbol: self.symbol.clone(),
            total_candles,
            recent_count,
            compressed_count,
            slice_count: state.archive.slice_count(),
            memory_usage,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            timespan: newest - oldest,
            average_candle_size: if total_candles > 0 {
                memory_usage as f64 / total_candles as f64
            } else {
                0.0
            },
        }
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let state = self.state.read();
        let access = self.access.lock();
        PerformanceMetrics::new(&access, state.bytes_allocated, state.size())
    }

    /// Drop every candle and reset the counters.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.ring.clear();
        state.index.clear();
        state.archive.clear();
        state.bytes_allocated = 0;
        self.access.lock().reset();
        info!(symbol = %self.symbol, "buffer cleared");
    }

    /// Candles across both tiers.
    pub fn size(&self) -> usize {
        self.state.read().size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl std::fmt::Debug for TimeSeriesBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TimeSeriesBuffer")
            .field("symbol", &self.symbol)
            .field("recent", &state.ring.len())
            .field("compressed", &state.archive.len())
            .field("bytes_allocated", &state.bytes_allocated)
            .finish()
    }
}

fn keep_last(candles: &mut Vec<Candle>, n: usize) {
    let start = candles.len().saturating_sub(n);
    candles.drain(..start);
}

// =============================================================================
// Tests
// =============================================================================
