// =============================================================================
// Candle Archive — tiered in-memory OHLCV storage
// =============================================================================
//
// Ingests streaming candles per symbol and serves point, range and last-N
// queries. Recent candles sit uncompressed in a bounded ring; older ones are
// delta-encoded into hourly slices so a year of one-minute bars stays cheap.

pub mod config;
pub mod feed;
pub mod storage;
pub mod types;

pub use config::{BatchPolicy, BufferConfig, CompressionSettings};
pub use storage::{BufferCollection, BufferStatistics, PerformanceMetrics, TimeSeriesBuffer};
pub use types::{Candle, CandleField, IngestOutcome, ValidationError, ValidationErrorKind};
