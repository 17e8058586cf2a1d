//! Trade — an open or completed position with full economics.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{TradeId, WindowId};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short. Multiplies price changes into PnL.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Why a trade closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TrailingTakeProfit,
    TrailingStop,
    TakeProfit,
    StopLoss,
    Timeout,
    OppositeSignal,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TrailingTakeProfit => "trailing_take_profit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Timeout => "timeout",
            ExitReason::OppositeSignal => "opposite_signal",
            ExitReason::EndOfData => "end_of_data",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Trailing exit level state. Disarmed until unrealized profit crosses the
/// trigger; once armed, `level` only ever ratchets in the trade's favor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrailingState {
    pub armed: bool,
    pub level: Option<f64>,
}

/// A position from entry to exit.
///
/// Created by the simulator on a filtered, capacity-checked signal; mutated
/// on every subsequent price bar; closes exactly once. `pnl` is net of fees,
/// funding, and slippage and is only present on closed trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub id: TradeId,
    pub direction: Direction,
    /// Cascade window that produced the entry signal, when in cascade mode.
    pub source_window: Option<WindowId>,

    // ── Entry ──
    pub entry_time: i64,
    /// Fill price after entry slippage.
    pub entry_price: f64,
    /// Entry slippage magnitude in percent; exits reuse half of it.
    pub entry_slippage_pct: f64,

    // ── Size ──
    pub size: f64,
    pub leverage: f64,

    // ── Exit levels ──
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub trailing_tp: TrailingState,
    pub trailing_sl: TrailingState,

    // ── Lifecycle ──
    pub status: TradeStatus,
    pub exit_time: Option<i64>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,

    // ── Economics ──
    pub pnl: Option<f64>,
    pub fees_paid: f64,
    pub funding_paid: f64,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Signed percentage move from entry in the trade's favor.
    pub fn profit_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0 * self.direction.sign()
    }

    /// Unrealized PnL at `price`, gross of fees and funding.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
            * self.size
            * self.leverage
            * self.direction.sign()
    }

    /// Marks the trade closed. Caller must hold an open trade; the simulator
    /// moves trades out of its open set exactly once.
    pub fn close(&mut self, time: i64, price: f64, reason: ExitReason, net_pnl: f64) {
        debug_assert!(self.is_open(), "trade {} closed twice", self.id);
        self.status = TradeStatus::Closed;
        self.exit_time = Some(time);
        self.exit_price = Some(price);
        self.exit_reason = Some(reason);
        self.pnl = Some(net_pnl);
    }

    pub fn is_winner(&self) -> bool {
        self.pnl.is_some_and(|p| p > 0.0)
    }
}
