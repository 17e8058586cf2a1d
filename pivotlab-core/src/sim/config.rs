//! Simulator configuration and validation.

use chrono::{DateTime, Datelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Direction, Signal};

use super::funding::FundingConfig;
use super::sizing::SizingMode;
use super::slippage::SlippageModel;
use super::slot::{OppositePolicy, SlotConfig};
use super::trailing::TrailingConfig;

/// Which signal directions become trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectionPolicy {
    /// Long signals only; shorts are dropped.
    BuyOnly,
    /// Short signals only; longs are dropped.
    SellOnly,
    /// Take every signal as-is.
    Both,
    /// Take every signal inverted.
    Alternate,
}

impl DirectionPolicy {
    /// Trade direction for `signal`, or `None` when the policy drops it.
    pub fn map(self, signal: Signal) -> Option<Direction> {
        match (self, signal) {
            (DirectionPolicy::BuyOnly, Signal::Long) => Some(Direction::Long),
            (DirectionPolicy::BuyOnly, Signal::Short) => None,
            (DirectionPolicy::SellOnly, Signal::Short) => Some(Direction::Short),
            (DirectionPolicy::SellOnly, Signal::Long) => None,
            (DirectionPolicy::Both, Signal::Long) => Some(Direction::Long),
            (DirectionPolicy::Both, Signal::Short) => Some(Direction::Short),
            (DirectionPolicy::Alternate, Signal::Long) => Some(Direction::Short),
            (DirectionPolicy::Alternate, Signal::Short) => Some(Direction::Long),
        }
    }
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("max_concurrent_trades must be at least 1")]
    ZeroCapacity,
}

fn default_initial_capital() -> f64 {
    10_000.0
}

fn default_direction() -> DirectionPolicy {
    DirectionPolicy::Both
}

fn default_take_profit_pct() -> f64 {
    2.0
}

fn default_stop_loss_pct() -> f64 {
    1.0
}

fn default_leverage() -> f64 {
    1.0
}

fn default_fee_pct() -> f64 {
    0.1
}

fn default_slippage() -> SlippageModel {
    SlippageModel::None
}

fn default_max_concurrent_trades() -> usize {
    1
}

fn default_opposite_threshold() -> u32 {
    1
}

fn default_opposite_policy() -> OppositePolicy {
    OppositePolicy::Flip
}

fn default_seed() -> u64 {
    42
}

/// Everything the simulator needs to turn signals into trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    // ── Capital and exposure ──
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default)]
    pub sizing: SizingMode,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    /// Hard cap on simultaneously open positions.
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,
    /// Forces the cap down to one position at a time.
    #[serde(default)]
    pub single_trade_mode: bool,

    // ── Signal filtering ──
    #[serde(default = "default_direction")]
    pub direction: DirectionPolicy,
    /// Entries are suppressed on these UTC weekdays.
    #[serde(default)]
    pub no_trade_weekdays: Vec<Weekday>,

    // ── Exits ──
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default)]
    pub trailing_take_profit: Option<TrailingConfig>,
    #[serde(default)]
    pub trailing_stop: Option<TrailingConfig>,
    /// Closes any position held longer than this, checked on bar closes.
    #[serde(default)]
    pub max_holding_minutes: Option<u32>,

    // ── Reversals ──
    /// Consecutive opposite signals needed before acting on them.
    #[serde(default = "default_opposite_threshold")]
    pub opposite_threshold: u32,
    #[serde(default = "default_opposite_policy")]
    pub opposite_policy: OppositePolicy,

    // ── Frictions ──
    /// Per-side fee in percent of notional; every round trip pays it twice.
    #[serde(default = "default_fee_pct")]
    pub fee_pct: f64,
    #[serde(default = "default_slippage")]
    pub slippage: SlippageModel,
    #[serde(default)]
    pub funding: Option<FundingConfig>,

    // ── Timing ──
    /// Delay between signal and entry. The fill uses the first base bar at
    /// or after the delayed time, within a 30 second tolerance.
    #[serde(default)]
    pub entry_delay_minutes: u32,

    /// Seed for the slippage RNG; identical configs replay identically.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            initial_capital: default_initial_capital(),
            sizing: SizingMode::default(),
            leverage: default_leverage(),
            max_concurrent_trades: default_max_concurrent_trades(),
            single_trade_mode: false,
            direction: default_direction(),
            no_trade_weekdays: Vec::new(),
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            trailing_take_profit: None,
            trailing_stop: None,
            max_holding_minutes: None,
            opposite_threshold: default_opposite_threshold(),
            opposite_policy: default_opposite_policy(),
            fee_pct: default_fee_pct(),
            slippage: default_slippage(),
            funding: None,
            entry_delay_minutes: 0,
            seed: default_seed(),
        }
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<(), SimulatorError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(SimulatorError::NonPositive { name, value })
    }
}

fn require_non_negative(name: &'static str, value: f64) -> Result<(), SimulatorError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(SimulatorError::Negative { name, value })
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SimulatorError> {
        require_positive("initial_capital", self.initial_capital)?;
        require_positive("take_profit_pct", self.take_profit_pct)?;
        require_positive("stop_loss_pct", self.stop_loss_pct)?;
        require_positive("leverage", self.leverage)?;
        require_non_negative("fee_pct", self.fee_pct)?;
        if self.max_concurrent_trades == 0 {
            return Err(SimulatorError::ZeroCapacity);
        }
        match self.sizing {
            SizingMode::Fixed { amount } => require_positive("sizing.amount", amount)?,
            SizingMode::PercentOfCapital { percent } => {
                require_positive("sizing.percent", percent)?
            }
            SizingMode::PercentWithFloor { percent, minimum } => {
                require_positive("sizing.percent", percent)?;
                require_non_negative("sizing.minimum", minimum)?;
            }
        }
        match self.slippage {
            SlippageModel::None => {}
            SlippageModel::Fixed { pct } => require_non_negative("slippage.pct", pct)?,
            SlippageModel::Variable { max_pct } => {
                require_non_negative("slippage.max_pct", max_pct)?
            }
            SlippageModel::MarketImpact {
                base_pct,
                impact_coefficient,
                reference_size,
            } => {
                require_non_negative("slippage.base_pct", base_pct)?;
                require_non_negative("slippage.impact_coefficient", impact_coefficient)?;
                require_non_negative("slippage.reference_size", reference_size)?;
            }
        }
        for (name, trailing) in [
            ("trailing_take_profit", &self.trailing_take_profit),
            ("trailing_stop", &self.trailing_stop),
        ] {
            if let Some(t) = trailing {
                require_non_negative(name, t.trigger_pct)?;
                require_positive(name, t.distance_pct)?;
            }
        }
        if let Some(funding) = &self.funding {
            if funding.interval_hours == 0 {
                return Err(SimulatorError::NonPositive {
                    name: "funding.interval_hours",
                    value: 0.0,
                });
            }
            require_non_negative("funding.rate", funding.rate)?;
        }
        Ok(())
    }

    /// Capacity after the single-trade override.
    pub fn effective_capacity(&self) -> usize {
        if self.single_trade_mode {
            1
        } else {
            self.max_concurrent_trades
        }
    }

    /// True when entries at `time` fall on a suppressed UTC weekday.
    pub fn is_no_trade_time(&self, time: i64) -> bool {
        if self.no_trade_weekdays.is_empty() {
            return false;
        }
        match DateTime::from_timestamp_millis(time) {
            Some(dt) => self.no_trade_weekdays.contains(&dt.weekday()),
            None => false,
        }
    }

    pub(crate) fn slot_config(&self) -> SlotConfig {
        SlotConfig {
            opposite_threshold: self.opposite_threshold,
            policy: self.opposite_policy,
        }
    }
}
