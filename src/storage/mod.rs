// =============================================================================
// Storage Module
// =============================================================================
//
// Two-tier candle storage per symbol:
// - Recent tier: fixed-capacity ring with an O(1) timestamp index
// - Compressed tier: hourly delta-encoded slices with an interval index
// - Facade and per-symbol collection on top

pub mod buffer;
pub mod collection;
pub mod compression;
pub mod range_index;
pub mod ring;
pub mod stats;
pub mod timestamp_index;

pub use buffer::TimeSeriesBuffer;
pub use collection::BufferCollection;
pub use compression::{bucket_key, CompressedStore, CompressedTimeSlice};
pub use range_index::{RangeEntry, TimeRangeIndex};
pub use ring::RingBuffer;
pub use stats::{AccessTracker, BufferStatistics, PerformanceMetrics};
pub use timestamp_index::TimestampIndex;
