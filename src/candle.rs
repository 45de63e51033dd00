//! Candle, timeframe-bundle, and symbol-data value types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::ticks;

/// One OHLCV bar covering `[open_time, close_time]`.
///
/// For aligned candles `close_time = open_time + duration − 1 tick`. The
/// vault stores candles exactly as given; only aggregation output is
/// guaranteed to satisfy `low ≤ min(open, close) ≤ max(open, close) ≤ high`
/// and `volume ≥ 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Build an aligned candle for `interval` starting at `open_time`,
    /// deriving the conventional close time.
    pub fn aligned(
        open_time: DateTime<Utc>,
        interval: Interval,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> crate::error::Result<Self> {
        let close_time = ticks::add_ticks(open_time + interval.duration()?, -1);
        Ok(Self::new(
            open_time, close_time, open, high, low, close, volume,
        ))
    }
}

/// An interval paired with its candles, ordered by `open_time`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeData {
    pub interval: Interval,
    pub candles: Vec<Candle>,
}

impl TimeframeData {
    pub fn new(interval: Interval, candles: Vec<Candle>) -> Self {
        Self { interval, candles }
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// A symbol with zero or more timeframe bundles.
///
/// Multiple bundles for the same interval are allowed on input; the save
/// path concatenates them when grouping by month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolData {
    pub symbol: String,
    pub timeframes: Vec<TimeframeData>,
}

impl SymbolData {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframes: Vec::new(),
        }
    }

    pub fn with_timeframe(mut self, interval: Interval, candles: Vec<Candle>) -> Self {
        self.timeframes.push(TimeframeData::new(interval, candles));
        self
    }

    /// First bundle for `interval`, if present.
    pub fn timeframe(&self, interval: Interval) -> Option<&TimeframeData> {
        self.timeframes.iter().find(|tf| tf.interval == interval)
    }
}
