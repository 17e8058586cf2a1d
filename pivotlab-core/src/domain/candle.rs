//! Candle — the fundamental market data unit.

use serde::{Deserialize, Serialize};

/// Milliseconds in one minute; candle timestamps are epoch milliseconds (UTC).
pub const MINUTE_MS: i64 = 60_000;

/// OHLCV candle stamped at its close boundary.
///
/// `time` is the epoch-millisecond timestamp at which the candle closed, not
/// opened. Aggregated candles produced from a base-resolution stream carry the
/// close boundary of their bucket. Candles are immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any OHLCV field is NaN (void candle).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, extremes bracket open/close,
    /// strictly positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }
}
