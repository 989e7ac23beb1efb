// =============================================================================
// Buffer Configuration — per-symbol capacity and compression policy
// =============================================================================
//
// Loaded once at startup from JSON. Persistence uses an atomic tmp + rename
// pattern to prevent corruption on crash. All fields carry `#[serde(default)]`
// so that adding new fields never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One year of one-minute candles.
pub const DEFAULT_MAX_CAPACITY: usize = 525_600;
/// One day of one-minute candles; upper bound on the recent tier.
pub const MAX_RECENT_CAPACITY: usize = 1_440;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_max_capacity() -> usize {
    DEFAULT_MAX_CAPACITY
}

fn default_compression_ratio() -> f64 {
    0.5
}

fn default_min_age_for_compression_ms() -> i64 {
    86_400_000
}

fn default_compression_interval_ms() -> i64 {
    300_000
}

fn default_memory_threshold_bytes() -> usize {
    50_000_000
}

fn default_kline_interval() -> String {
    "1m".to_string()
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

// =============================================================================
// CompressionSettings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// When false, candles evicted from the recent tier are dropped and no
    /// time-based compaction runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Target ratio in [0, 1]. Reported only, never enforced.
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: f64,

    /// Candles older than `now - min_age_for_compression_ms` are compacted.
    #[serde(default = "default_min_age_for_compression_ms")]
    pub min_age_for_compression_ms: i64,

    /// Recent-tier capacity override. `None` derives it from `max_capacity`.
    #[serde(default)]
    pub max_uncompressed_items: Option<usize>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            compression_ratio: default_compression_ratio(),
            min_age_for_compression_ms: default_min_age_for_compression_ms(),
            max_uncompressed_items: None,
        }
    }
}

// =============================================================================
// BatchPolicy
// =============================================================================

/// What `add_candles` does when one candle of a batch fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchPolicy {
    /// Stop at the first invalid candle. Earlier candles stay ingested.
    #[default]
    AbortOnFirstError,
    /// Report the invalid candle and keep going.
    SkipInvalid,
}

impl std::fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AbortOnFirstError => write!(f, "AbortOnFirstError"),
            Self::SkipInvalid => write!(f, "SkipInvalid"),
        }
    }
}

// =============================================================================
// BufferConfig
// =============================================================================

/// Per-buffer settings. Every symbol in a collection gets its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Symbols a collection creates buffers for.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Upper bound on candles kept per symbol across both tiers.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,

    #[serde(default)]
    pub compression: CompressionSettings,

    /// Minimum wall-clock gap between two compaction runs.
    #[serde(default = "default_compression_interval_ms")]
    pub compression_interval_ms: i64,

    /// Recent-tier byte count that forces compaction regardless of the gap.
    #[serde(default = "default_memory_threshold_bytes")]
    pub memory_threshold_bytes: usize,

    #[serde(default)]
    pub batch_policy: BatchPolicy,

    /// Kline interval the feed subscribes to.
    #[serde(default = "default_kline_interval")]
    pub kline_interval: String,

    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            max_capacity: default_max_capacity(),
            compression: CompressionSettings::default(),
            compression_interval_ms: default_compression_interval_ms(),
            memory_threshold_bytes: default_memory_threshold_bytes(),
            batch_policy: BatchPolicy::default(),
            kline_interval: default_kline_interval(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

impl BufferConfig {
    /// Defaults with the given capacity.
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            ..Self::default()
        }
    }

    /// Recent-tier capacity: the explicit override if set, otherwise
    /// `min(1440, floor(max_capacity * 0.1))`. Never below 1.
    pub fn recent_capacity(&self) -> usize {
        self.compression
            .max_uncompressed_items
            .unwrap_or_else(|| MAX_RECENT_CAPACITY.min(self.max_capacity / 10))
            .max(1)
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read buffer config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse buffer config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            max_capacity = config.max_capacity,
            "buffer config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise buffer config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "buffer config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = BufferConfig::default();
        assert_eq!(cfg.max_capacity, 525_600);
        assert!(cfg.compression.enabled);
        assert_eq!(cfg.compression.min_age_for_compression_ms, 86_400_000);
        assert_eq!(cfg.compression_interval_ms, 300_000);
        assert_eq!(cfg.memory_threshold_bytes, 50_000_000);
        assert_eq!(cfg.batch_policy, BatchPolicy::AbortOnFirstError);
        assert_eq!(cfg.symbols[0], "BTCUSDT");
    }

    #[test]
    fn recent_capacity_formula() {
        assert_eq!(BufferConfig::default().recent_capacity(), 1_440);
        assert_eq!(BufferConfig::with_capacity(20).recent_capacity(), 2);
        assert_eq!(BufferConfig::with_capacity(5).recent_capacity(), 1);
        assert_eq!(BufferConfig::with_capacity(10_000).recent_capacity(), 1_000);
    }

    #[test]
    fn recent_capacity_override() {
        let mut cfg = BufferConfig::with_capacity(20);
        cfg.compression.max_uncompressed_items = Some(50);
        assert_eq!(cfg.recent_capacity(), 50);
        cfg.compression.max_uncompressed_items = Some(0);
        assert_eq!(cfg.recent_capacity(), 1);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: BufferConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, BufferConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "max_capacity": 1000,
            "compression": { "enabled": false },
            "batch_policy": "SkipInvalid"
        }"#;
        let cfg: BufferConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.max_capacity, 1000);
        assert!(!cfg.compression.enabled);
        assert_eq!(cfg.compression.min_age_for_compression_ms, 86_400_000);
        assert_eq!(cfg.batch_policy, BatchPolicy::SkipInvalid);
        assert_eq!(cfg.kline_interval, "1m");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer_config.json");

        let mut cfg = BufferConfig::with_capacity(4_096);
        cfg.symbols = vec!["ADAUSDT".into()];
        cfg.save(&path).unwrap();

        let loaded = BufferConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BufferConfig::load(dir.path().join("nope.json")).is_err());
    }
}
