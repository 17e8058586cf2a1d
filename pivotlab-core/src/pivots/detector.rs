//! Swing-pivot detection over one timeframe's aggregated candles.
//!
//! A high pivot fires at index i when the selected high-side field strictly
//! exceeds the same field at every one of the previous `lookback` candles;
//! low is symmetric. At most one pivot per candle: when both directions
//! qualify, lookback=0 keeps the larger excursion and lookback>0 keeps the
//! high. The decision at index i reads only candles [0..i], so the detector
//! can run streaming via [`PivotDetector::push`].

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Pivot, PivotKind, PriceMode, TimeframeConfig};

/// Detection knobs for one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub lookback: usize,
    /// Minimum percentage excursion; zero disables the swing filter (and the
    /// emitted `swing_pct` stays 0.0).
    pub min_swing_pct: f64,
    /// Minimum candle-index distance from the previously accepted pivot.
    pub min_leg_bars: usize,
    pub price_mode: PriceMode,
}

impl From<&TimeframeConfig> for DetectorConfig {
    fn from(tf: &TimeframeConfig) -> Self {
        Self {
            lookback: tf.lookback,
            min_swing_pct: tf.min_swing_pct,
            min_leg_bars: tf.min_leg_bars,
            price_mode: tf.price_mode,
        }
    }
}

/// Incremental swing-pivot detector.
///
/// Feed candles in ascending time order; each [`push`](Self::push) decides
/// whether a pivot closes on that candle. The spacing filter is stateful
/// across both pivot kinds: a candidate closer than `min_leg_bars` to the
/// last *accepted* pivot is rejected outright, never deferred.
#[derive(Debug, Clone)]
pub struct PivotDetector {
    config: DetectorConfig,
    candles: Vec<Candle>,
    last_accepted: Option<usize>,
}

impl PivotDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            candles: Vec::new(),
            last_accepted: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Number of candles seen so far.
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Appends the next candle and returns the pivot closing on it, if any.
    pub fn push(&mut self, candle: Candle) -> Option<Pivot> {
        self.candles.push(candle);
        let index = self.candles.len() - 1;

        let (kind, price) = self.candidate_at(index)?;

        let swing_pct = if self.config.min_swing_pct > 0.0 {
            let measured = self.max_swing_pct(kind, price, index);
            if measured < self.config.min_swing_pct {
                return None;
            }
            measured
        } else {
            0.0
        };

        if let Some(last) = self.last_accepted {
            if index - last < self.config.min_leg_bars {
                return None;
            }
        }

        self.last_accepted = Some(index);
        Some(Pivot::new(kind, price, self.candles[index].time, index, swing_pct))
    }

    /// Raw extreme test at `index`, before swing and spacing filters.
    fn candidate_at(&self, index: usize) -> Option<(PivotKind, f64)> {
        let (cur_high, cur_low) = self.fields(index);

        let (is_high, is_low) = if self.config.lookback == 0 {
            if index == 0 {
                return None;
            }
            let (prev_high, prev_low) = self.fields(index - 1);
            let mut is_high = cur_high > prev_high;
            let mut is_low = cur_low < prev_low;
            if is_high && is_low {
                // Both directions qualify against the single reference
                // candle: keep the dominant excursion. Ties go to the high.
                let up = (cur_high - prev_high).abs();
                let down = (prev_low - cur_low).abs();
                if up >= down {
                    is_low = false;
                } else {
                    is_high = false;
                }
            }
            (is_high, is_low)
        } else {
            if index < self.config.lookback {
                return None;
            }
            let mut is_high = true;
            let mut is_low = true;
            for j in 1..=self.config.lookback {
                let (cmp_high, cmp_low) = self.fields(index - j);
                if cur_high <= cmp_high {
                    is_high = false;
                }
                if cur_low >= cmp_low {
                    is_low = false;
                }
                if !is_high && !is_low {
                    break;
                }
            }
            (is_high, is_low)
        };

        if is_high {
            Some((PivotKind::High, cur_high))
        } else if is_low {
            Some((PivotKind::Low, cur_low))
        } else {
            None
        }
    }

    /// (high-side, low-side) comparison fields for the candle at `index`.
    /// In close mode both sides are the close.
    fn fields(&self, index: usize) -> (f64, f64) {
        let c = &self.candles[index];
        match self.config.price_mode {
            PriceMode::Close => (c.close, c.close),
            PriceMode::Extreme => (c.high, c.low),
        }
    }

    /// Largest percentage distance between the candidate price and the
    /// reference prices behind it. In extreme mode a high candidate measures
    /// against prior lows and a low candidate against prior highs. A zero
    /// reference contributes no distance, so degenerate input can never pass
    /// the threshold through a division blowup.
    fn max_swing_pct(&self, kind: PivotKind, pivot_price: f64, index: usize) -> f64 {
        let span = if self.config.lookback == 0 {
            1
        } else {
            self.config.lookback
        };
        let mut max_swing: f64 = 0.0;
        for j in 1..=span {
            if j > index {
                break;
            }
            let c = &self.candles[index - j];
            let reference = match (self.config.price_mode, kind) {
                (PriceMode::Close, _) => c.close,
                (PriceMode::Extreme, PivotKind::High) => c.low,
                (PriceMode::Extreme, PivotKind::Low) => c.high,
            };
            if reference == 0.0 {
                continue;
            }
            let pct = ((pivot_price - reference) / reference * 100.0).abs();
            max_swing = max_swing.max(pct);
        }
        max_swing
    }
}

/// Runs a fresh detector over a whole sequence. Identical to pushing the
/// candles one at a time.
pub fn detect_all(candles: &[Candle], config: DetectorConfig) -> Vec<Pivot> {
    let mut detector = PivotDetector::new(config);
    candles
        .iter()
        .filter_map(|c| detector.push(*c))
        .collect()
}
