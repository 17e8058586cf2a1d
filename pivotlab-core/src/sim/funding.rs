//! Periodic funding charges on open positions.

use serde::{Deserialize, Serialize};

use crate::domain::Trade;

fn default_interval_hours() -> u32 {
    8
}

fn default_rate() -> f64 {
    0.0001
}

/// Funding cadence and per-period rate. The rate is a raw fraction of
/// notional, so 0.0001 charges 0.01% of each open position per period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,
    #[serde(default = "default_rate")]
    pub rate: f64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        FundingConfig {
            interval_hours: default_interval_hours(),
            rate: default_rate(),
        }
    }
}

/// Charges each funding bucket at most once, and only while positions are
/// open. A bucket that passes while flat is never charged retroactively.
#[derive(Debug, Clone)]
pub struct FundingTracker {
    config: Option<FundingConfig>,
    last_bucket: Option<i64>,
}

impl FundingTracker {
    pub fn new(config: Option<FundingConfig>) -> Self {
        FundingTracker {
            config,
            last_bucket: None,
        }
    }

    /// Applies funding at `time` to every open trade. Returns the total
    /// charged; each trade's `funding_paid` is bumped by its share.
    pub fn accrue(&mut self, time: i64, open_trades: &mut [Trade]) -> f64 {
        let Some(config) = self.config else {
            return 0.0;
        };
        if open_trades.is_empty() || config.rate == 0.0 || config.interval_hours == 0 {
            return 0.0;
        }
        let interval_ms = i64::from(config.interval_hours) * 3_600_000;
        let bucket = time.div_euclid(interval_ms);
        if self.last_bucket == Some(bucket) {
            return 0.0;
        }
        self.last_bucket = Some(bucket);

        let mut total = 0.0;
        for trade in open_trades {
            let cost = trade.size * config.rate;
            trade.funding_paid += cost;
            total += cost;
        }
        total
    }
}
