// =============================================================================
// Shared types used across the candle archive
// =============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Estimated resident size of one uncompressed candle: six 8-byte numeric
/// fields plus fixed overhead.
pub const CANDLE_SIZE_BYTES: usize = 64;

/// A single OHLCV candle keyed by its open timestamp (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Check the OHLCV shape rules. A candle that fails is never stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timestamp <= 0 {
            return Err(ValidationError::new(
                ValidationErrorKind::NonPositive,
                CandleField::Timestamp,
                self.timestamp as f64,
                self.timestamp,
            ));
        }

        for (field, value) in [
            (CandleField::Open, self.open),
            (CandleField::High, self.high),
            (CandleField::Low, self.low),
            (CandleField::Close, self.close),
            (CandleField::Volume, self.volume),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::new(
                    ValidationErrorKind::NotFinite,
                    field,
                    value,
                    self.timestamp,
                ));
            }
        }

        for (field, value) in [
            (CandleField::Open, self.open),
            (CandleField::High, self.high),
            (CandleField::Low, self.low),
            (CandleField::Close, self.close),
        ] {
            if value <= 0.0 {
                return Err(ValidationError::new(
                    ValidationErrorKind::NonPositive,
                    field,
                    value,
                    self.timestamp,
                ));
            }
        }

        if self.volume < 0.0 {
            return Err(ValidationError::new(
                ValidationErrorKind::Negative,
                CandleField::Volume,
                self.volume,
                self.timestamp,
            ));
        }

        if self.high < self.open.max(self.close) {
            return Err(ValidationError::new(
                ValidationErrorKind::HighBelowBody,
                CandleField::High,
                self.high,
                self.timestamp,
            ));
        }

        if self.low > self.open.min(self.close) {
            return Err(ValidationError::new(
                ValidationErrorKind::LowAboveBody,
                CandleField::Low,
                self.low,
                self.timestamp,
            ));
        }

        Ok(())
    }
}

/// Individual candle fields, used to tag validation failures and select
/// series in the derived accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleField {
    Timestamp,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl std::fmt::Display for CandleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp => write!(f, "timestamp"),
            Self::Open => write!(f, "open"),
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
            Self::Close => write!(f, "close"),
            Self::Volume => write!(f, "volume"),
        }
    }
}

/// Which shape rule a rejected candle broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    /// NaN or infinite value.
    NotFinite,
    /// Timestamp or price at or below zero.
    NonPositive,
    /// Volume below zero.
    Negative,
    /// `high < max(open, close)`.
    HighBelowBody,
    /// `low > min(open, close)`.
    LowAboveBody,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFinite => write!(f, "must be a finite number"),
            Self::NonPositive => write!(f, "must be positive"),
            Self::Negative => write!(f, "must not be negative"),
            Self::HighBelowBody => write!(f, "is below max(open, close)"),
            Self::LowAboveBody => write!(f, "is above min(open, close)"),
        }
    }
}

/// Rejection of a candle at ingestion. The buffer is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid candle at {timestamp}: {field} = {value} {kind}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: CandleField,
    pub value: f64,
    pub timestamp: i64,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, field: CandleField, value: f64, timestamp: i64) -> Self {
        Self {
            kind,
            field,
            value,
            timestamp,
        }
    }
}

/// What `add_candle` did with an accepted candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    /// New timestamp pushed into the recent tier.
    Inserted,
    /// Existing timestamp overwritten in place; size unchanged.
    Replaced,
}
