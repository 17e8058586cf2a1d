//! Per-timeframe configuration: interval, cascade role, and detector knobs.

use serde::{Deserialize, Serialize};

use crate::domain::candle::MINUTE_MS;

/// Role a timeframe plays in the cascade.
///
/// Exactly one configured timeframe must be `Primary` (its pivots open
/// cascade windows). `Execution` marks the timeframe whose confirmation is
/// additionally required when hierarchical validation is on. `Secondary` and
/// `Confirmation` both confirm; the distinction is reporting-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeframeRole {
    Primary,
    Secondary,
    Confirmation,
    Execution,
}

/// Which price field the pivot detector compares and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceMode {
    /// Compare candle extremes: highs for high pivots, lows for low pivots.
    /// Swing distance is measured against the opposite extreme.
    Extreme,
    /// Compare closes on both sides; the pivot price is the close.
    Close,
}

/// Configuration for one timeframe in the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    /// Candle interval in minutes. Must be a positive integer multiple of the
    /// base data resolution.
    pub interval_minutes: u32,

    pub role: TimeframeRole,

    /// How many prior candles a candidate extreme must strictly beat.
    /// Zero means compare only to the immediately preceding candle, with a
    /// deterministic excursion tie-break when both directions qualify.
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Minimum percentage excursion for a pivot to count. Zero disables the
    /// swing filter.
    #[serde(default)]
    pub min_swing_pct: f64,

    /// Minimum candle-index spacing from the previously accepted pivot.
    #[serde(default)]
    pub min_leg_bars: usize,

    /// Relative weight for reporting. Confirmation counting ignores it.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// When set, this timeframe confirms with the inverse of the primary's
    /// signal instead of a match.
    #[serde(default)]
    pub opposite: bool,

    #[serde(default = "default_price_mode")]
    pub price_mode: PriceMode,
}

fn default_lookback() -> usize {
    2
}

fn default_weight() -> f64 {
    1.0
}

fn default_price_mode() -> PriceMode {
    PriceMode::Close
}

impl TimeframeConfig {
    pub fn new(interval_minutes: u32, role: TimeframeRole) -> Self {
        Self {
            interval_minutes,
            role,
            lookback: default_lookback(),
            min_swing_pct: 0.0,
            min_leg_bars: 0,
            weight: default_weight(),
            opposite: false,
            price_mode: default_price_mode(),
        }
    }

    /// Interval length in epoch milliseconds.
    pub fn interval_ms(&self) -> i64 {
        i64::from(self.interval_minutes) * MINUTE_MS
    }
}
