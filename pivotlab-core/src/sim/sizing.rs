//! Position sizing from current capital.

use serde::{Deserialize, Serialize};

/// Notional size of a new position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingMode {
    /// Same notional for every trade, regardless of capital.
    Fixed { amount: f64 },

    /// Percentage of the capital at entry time.
    PercentOfCapital { percent: f64 },

    /// Percentage of capital, but never below a minimum notional.
    PercentWithFloor { percent: f64, minimum: f64 },
}

impl Default for SizingMode {
    fn default() -> Self {
        SizingMode::PercentOfCapital { percent: 100.0 }
    }
}

impl SizingMode {
    /// Notional for a trade opened with `capital` available. Never negative.
    pub fn size(&self, capital: f64) -> f64 {
        let size = match *self {
            SizingMode::Fixed { amount } => amount,
            SizingMode::PercentOfCapital { percent } => capital * percent / 100.0,
            SizingMode::PercentWithFloor { percent, minimum } => {
                (capital * percent / 100.0).max(minimum)
            }
        };
        size.max(0.0)
    }
}
