// =============================================================================
// Kline Feed — Binance kline WebSocket into the candle archive
// =============================================================================
//
// Only closed klines are ingested: an in-progress kline would otherwise be
// rewritten on every tick. The kline open time becomes the candle timestamp.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::storage::BufferCollection;
use crate::types::Candle;

/// One parsed kline message.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineUpdate {
    pub symbol: String,
    pub interval: String,
    pub candle: Candle,
    pub is_closed: bool,
}

/// Binance single-stream kline endpoint for `(symbol, interval)`.
pub fn kline_url(symbol: &str, interval: &str) -> String {
    format!(
        "wss://stream.binance.com:9443/ws/{}@kline_{interval}",
        symbol.to_lowercase()
    )
}

/// Parse a kline message.
///
/// Accepts both the combined-stream envelope and the single-stream payload:
/// ```json
/// { "stream": "btcusdt@kline_1m", "data": { "s": "BTCUSDT", "k": { ... } } }
/// { "e": "kline", "s": "BTCUSDT", "k": { ... } }
/// ```
pub fn parse_kline_message(text: &str) -> Result<KlineUpdate> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let symbol = data["s"]
        .as_str()
        .context("missing field s")?
        .to_uppercase();

    let k = &data["k"];

    let interval = k["i"]
        .as_str()
        .context("missing field k.i")?
        .to_string();

    let timestamp = k["t"].as_i64().context("missing field k.t")?;
    let open = parse_string_f64(&k["o"], "k.o")?;
    let high = parse_string_f64(&k["h"], "k.h")?;
    let low = parse_string_f64(&k["l"], "k.l")?;
    let close = parse_string_f64(&k["c"], "k.c")?;
    let volume = parse_string_f64(&k["v"], "k.v")?;
    let is_closed = k["x"].as_bool().context("missing field k.x")?;

    Ok(KlineUpdate {
        symbol,
        interval,
        candle: Candle::new(timestamp, open, high, low, close, volume),
        is_closed,
    })
}

/// Binance sends numeric values as JSON strings inside kline objects.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

/// Route one update to its symbol's buffer. Returns whether a candle was
/// stored.
pub fn apply_update(buffers: &BufferCollection, update: &KlineUpdate) -> bool {
    if !update.is_closed {
        return false;
    }
    let Some(buffer) = buffers.get(&update.symbol) else {
        debug!(symbol = %update.symbol, "kline for unknown symbol ignored");
        return false;
    };
    match buffer.add_candle(update.candle) {
        Ok(outcome) => {
            debug!(
                symbol = %update.symbol,
                timestamp = update.candle.timestamp,
                close = update.candle.close,
                outcome = ?outcome,
                "closed kline stored"
            );
            true
        }
        Err(e) => {
            warn!(symbol = %update.symbol, error = %e, "closed kline rejected");
            false
        }
    }
}

/// Outcome of one WebSocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A closed kline was stored.
    Stored,
    /// Parsed but not stored: still open, unknown symbol or invalid shape.
    Skipped,
    /// Text frame that is not a kline.
    Malformed,
    /// Control or binary frame.
    Ignored,
}

/// Feed one frame into `buffers`. Pings are answered by tungstenite.
pub fn handle_frame(buffers: &BufferCollection, msg: &Message) -> FrameOutcome {
    let Message::Text(text) = msg else {
        return FrameOutcome::Ignored;
    };
    match parse_kline_message(text) {
        Ok(update) if apply_update(buffers, &update) => FrameOutcome::Stored,
        Ok(_) => FrameOutcome::Skipped,
        Err(e) => {
            warn!(error = %e, "failed to parse kline message");
            FrameOutcome::Malformed
        }
    }
}

/// Stream closed klines for `(symbol, interval)` into `buffers` until the
/// socket closes (`Ok`) or fails (`Err`). Reconnecting is up to the caller.
pub async fn run_kline_stream(
    symbol: &str,
    interval: &str,
    buffers: &Arc<BufferCollection>,
) -> Result<()> {
    let url = kline_url(symbol, interval);
    info!(url = %url, "connecting to kline WebSocket");

    let (ws_stream, _) = connect_async(&url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    info!(symbol = %symbol, interval = %interval, "kline WebSocket connected");

    let (_write, mut read) = ws_stream.split();
    let mut stored: u64 = 0;

    while let Some(frame) = read.next().await {
        let msg = frame.with_context(|| format!("kline read failed for {symbol}"))?;
        if handle_frame(buffers, &msg) == FrameOutcome::Stored {
            stored += 1;
        }
    }

    warn!(symbol = %symbol, interval = %interval, stored, "kline WebSocket stream ended");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;

    const SINGLE: &str = r#"{
        "e": "kline",
        "s": "BTCUSDT",
        "k": {
            "t": 1700000000000,
            "T": 1700000059999,
            "i": "1m",
            "o": "37000.00",
            "h": "37050.00",
            "l": "36990.00",
            "c": "37020.00",
            "v": "123.456",
            "n": 1500,
            "x": true
        }
    }"#;

    #[test]
    fn parse_single_stream_payload() {
        let u = parse_kline_message(SINGLE).expect("should parse");
        assert_eq!(u.symbol, "BTCUSDT");
        assert_eq!(u.interval, "1m");
        assert_eq!(u.candle.timestamp, 1_700_000_000_000);
        assert!((u.candle.close - 37020.0).abs() < f64::EPSILON);
        assert!((u.candle.volume - 123.456).abs() < 1e-9);
        assert!(u.is_closed);
    }

    #[test]
    fn parse_combined_envelope() {
        let json = format!(r#"{{ "stream": "btcusdt@kline_1m", "data": {SINGLE} }}"#);
        let u = parse_kline_message(&json).expect("should parse");
        assert_eq!(u.symbol, "BTCUSDT");
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(parse_kline_message(r#"{ "s": "BTCUSDT", "k": {} }"#).is_err());
        assert!(parse_kline_message("not json").is_err());
    }

    #[test]
    fn url_is_lowercase_single_stream() {
        assert_eq!(
            kline_url("BTCUSDT", "1m"),
            "wss://stream.binance.com:9443/ws/btcusdt@kline_1m"
        );
    }

    #[test]
    fn only_closed_klines_are_stored() {
        let buffers = BufferCollection::new(&["BTCUSDT"], &BufferConfig::default());
        let mut u = parse_kline_message(SINGLE).unwrap();

        u.is_closed = false;
        assert!(!apply_update(&buffers, &u));
        u.is_closed = true;
        assert!(apply_update(&buffers, &u));

        let buf = buffers.get("BTCUSDT").unwrap();
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.get_latest().map(|c| c.timestamp), Some(1_700_000_000_000));
    }

    #[test]
    fn invalid_or_unknown_klines_are_skipped() {
        let buffers = BufferCollection::new(&["BTCUSDT"], &BufferConfig::default());
        let mut u = parse_kline_message(SINGLE).unwrap();

        u.candle.low = 40_000.0;
        assert!(!apply_update(&buffers, &u));

        u.symbol = "DOGEUSDT".into();
        assert!(!apply_update(&buffers, &u));
        assert_eq!(buffers.get("BTCUSDT").unwrap().size(), 0);
    }

    #[test]
    fn frames_are_classified() {
        let buffers = BufferCollection::new(&["BTCUSDT"], &BufferConfig::default());

        let closed = Message::Text(SINGLE.to_string());
        assert_eq!(handle_frame(&buffers, &closed), FrameOutcome::Stored);

        let open = Message::Text(SINGLE.replace(r#""x": true"#, r#""x": false"#));
        assert_eq!(handle_frame(&buffers, &open), FrameOutcome::Skipped);

        let junk = Message::Text("{}".to_string());
        assert_eq!(handle_frame(&buffers, &junk), FrameOutcome::Malformed);
        assert_eq!(handle_frame(&buffers, &Message::Ping(vec![1])), FrameOutcome::Ignored);

        assert_eq!(buffers.get("BTCUSDT").unwrap().size(), 1);
    }
}
