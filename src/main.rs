// =============================================================================
// Candle Archive — Main Entry Point
// =============================================================================
//
// Streams closed klines for every configured symbol into per-symbol tiered
// buffers and logs buffer statistics periodically.
// =============================================================================

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use candle_archive::{feed, BufferCollection, BufferConfig};

const DEFAULT_CONFIG_PATH: &str = "buffer_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Candle Archive starting up");

    let config_path =
        std::env::var("CANDLE_ARCHIVE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = BufferConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        BufferConfig::default()
    });

    if let Ok(syms) = std::env::var("CANDLE_ARCHIVE_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    info!(
        symbols = ?config.symbols,
        max_capacity = config.max_capacity,
        recent_capacity = config.recent_capacity(),
        compression = config.compression.enabled,
        batch_policy = %config.batch_policy,
        "Configured buffers"
    );

    // ── 2. Buffers ───────────────────────────────────────────────────────
    let buffers = Arc::new(BufferCollection::from_config(&config));

    // ── 3. Kline streams ─────────────────────────────────────────────────
    for symbol in buffers.symbols() {
        let cb = buffers.clone();
        let interval = config.kline_interval.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = feed::run_kline_stream(&symbol, &interval, &cb).await {
                    error!(symbol = %symbol, error = %e, "Kline stream error — reconnecting in 5s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });
    }

    info!(count = buffers.len(), "Kline streams launched");

    // ── 4. Statistics loop ───────────────────────────────────────────────
    let stats_buffers = buffers.clone();
    let stats_every = config.stats_log_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(stats_every));
        loop {
            interval.tick().await;
            for (symbol, buffer) in stats_buffers.iter() {
                let stats = buffer.get_statistics();
                let perf = buffer.get_performance_metrics();
                info!(
                    symbol = %symbol,
                    total = stats.total_candles,
                    recent = stats.recent_count,
                    compressed = stats.compressed_count,
                    slices = stats.slice_count,
                    memory_bytes = stats.memory_usage,
                    newest = stats.newest_timestamp,
                    hit_rate = perf.hit_rate,
                    "buffer statistics"
                );
            }
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = config.save(&config_path) {
        error!(error = %e, "Failed to save buffer config on shutdown");
    }

    info!("Candle Archive shut down complete.");
    Ok(())
}
