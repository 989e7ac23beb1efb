// =============================================================================
// BufferCollection — one independent buffer per symbol
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::buffer::TimeSeriesBuffer;
use super::stats::BufferStatistics;
use crate::config::BufferConfig;

/// Buffers keyed by symbol. Buffers share no state, so callers may drive
/// different symbols from different tasks freely.
#[derive(Debug, Default)]
pub struct BufferCollection {
    buffers: HashMap<String, Arc<TimeSeriesBuffer>>,
}

impl BufferCollection {
    /// Create one buffer per symbol, each with its own copy of `config`.
    /// Symbols are upper-cased and blank or repeated entries skipped.
    pub fn new<S: AsRef<str>>(symbols: &[S], config: &BufferConfig) -> Self {
        let mut buffers = HashMap::with_capacity(symbols.len());
        for sym in symbols {
            let symbol = sym.as_ref().trim().to_uppercase();
            if symbol.is_empty() || buffers.contains_key(&symbol) {
                continue;
            }
            let buffer = Arc::new(TimeSeriesBuffer::new(symbol.clone(), config.clone()));
            buffers.insert(symbol, buffer);
        }
        info!(count = buffers.len(), max_capacity = config.max_capacity, "buffer collection created");
        Self { buffers }
    }

    /// Buffers for every symbol listed in `config.symbols`.
    pub fn from_config(config: &BufferConfig) -> Self {
        Self::new(config.symbols.as_slice(), config)
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<TimeSeriesBuffer>> {
        self.buffers.get(&symbol.to_uppercase()).cloned()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.buffers.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Statistics for every buffer, ordered by symbol.
    pub fn statistics(&self) -> Vec<BufferStatistics> {
        self.symbols()
            .iter()
            .filter_map(|s| self.buffers.get(s))
            .map(|b| b.get_statistics())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<TimeSeriesBuffer>)> {
        self.buffers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candle;

    #[test]
    fn one_buffer_per_symbol() {
        let cfg = BufferConfig::with_capacity(100);
        let col = BufferCollection::new(&["btcusdt", "ETHUSDT", " ", "BTCUSDT"], &cfg);
        assert_eq!(col.len(), 2);
        assert_eq!(col.symbols(), vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(col.get("btcusdt").unwrap().symbol(), "BTCUSDT");
        assert!(col.get("SOLUSDT").is_none());
    }

    #[test]
    fn buffers_are_independent() {
        let col = BufferCollection::from_config(&BufferConfig::default());
        let btc = col.get("BTCUSDT").unwrap();
        btc.add_candle(Candle::new(1_000, 1.0, 1.0, 1.0, 1.0, 1.0)).unwrap();

        assert_eq!(btc.size(), 1);
        assert_eq!(col.get("ETHUSDT").unwrap().size(), 0);

        let stats = col.statistics();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.iter().map(|s| s.total_candles).sum::<usize>(), 1);
    }
}
