//! Signal-to-trade simulation.
//!
//! The simulator consumes directional signals (raw pivots or cascade
//! executions, the caller decides) and a stream of base bars, and maintains
//! one logical position slot with pyramiding up to a capacity cap. All exit
//! checks run against bar closes; fills always include slippage.
//!
//! Bar-time ordering contract with the caller: for a bar at time `t`, call
//! [`TradeSimulator::process_bar`] before forwarding any signal derived from
//! that bar, so a position opened at `t` faces its first exit check on the
//! next bar.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::{
    Candle, Direction, ExitReason, Signal, Trade, TradeId, TradeStatus, TrailingState, WindowId,
    MINUTE_MS,
};

use super::config::{SimulatorConfig, SimulatorError};
use super::funding::FundingTracker;
use super::slippage;
use super::slot::{self, Slot, SlotAction, SlotState};
use super::trailing;

/// A delayed entry fills on the first bar at or after its due time, but only
/// within this tolerance. A data gap larger than this abandons the entry.
const ENTRY_FILL_TOLERANCE_MS: i64 = 30_000;

/// Entry reserved by a signal, waiting out the configured delay.
#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    direction: Direction,
    execute_at: i64,
    source_window: Option<WindowId>,
}

/// Deterministic trade simulator over one instrument.
#[derive(Debug)]
pub struct TradeSimulator {
    config: SimulatorConfig,
    capital: f64,
    open_trades: Vec<Trade>,
    closed_trades: Vec<Trade>,
    pending: Vec<PendingEntry>,
    opposite_count: u32,
    funding: FundingTracker,
    rng: StdRng,
    next_trade_id: u64,
    last_close: Option<(i64, f64)>,
}

impl TradeSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let funding = FundingTracker::new(config.funding);
        let rng = StdRng::seed_from_u64(config.seed);
        let capital = config.initial_capital;
        Ok(TradeSimulator {
            config,
            capital,
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
            pending: Vec::new(),
            opposite_count: 0,
            funding,
            rng,
            next_trade_id: 1,
            last_close: None,
        })
    }

    /// Current stance, derived from the book. Open trades and reserved
    /// entries always share one direction, so the first entry decides.
    fn stance(&self) -> SlotState {
        if let Some(trade) = self.open_trades.first() {
            SlotState::of(trade.direction)
        } else if let Some(entry) = self.pending.first() {
            SlotState::of(entry.direction)
        } else {
            SlotState::Flat
        }
    }

    /// Feeds one directional signal at its reference price.
    pub fn on_signal(&mut self, signal: Signal, time: i64, price: f64, source: Option<WindowId>) {
        let Some(direction) = self.config.direction.map(signal) else {
            return;
        };
        let slot = Slot {
            state: self.stance(),
            opposite_count: self.opposite_count,
        };
        let (next, action) = slot::transition(slot, direction, &self.config.slot_config());
        self.opposite_count = next.opposite_count;
        match action {
            SlotAction::Open => {
                self.try_open(direction, time, price, source);
            }
            SlotAction::Ignore => {}
            SlotAction::CloseAndReverse => {
                self.close_all_open(time, price, ExitReason::OppositeSignal);
                self.pending.clear();
                let opened = self.try_open(direction, time, price, source);
                debug_assert_eq!(slot::settle_flip(opened, direction), self.stance());
            }
            SlotAction::CloseAll => {
                self.close_all_open(time, price, ExitReason::OppositeSignal);
                self.pending.clear();
            }
        }
    }

    /// Advances the simulator by one base bar: funding first, then exit
    /// checks, then delayed-entry fills.
    pub fn process_bar(&mut self, bar: &Candle) {
        let charged = self.funding.accrue(bar.time, &mut self.open_trades);
        self.capital -= charged;

        self.check_exits(bar);
        self.fill_pending(bar);

        self.last_close = Some((bar.time, bar.close));
    }

    /// Closes everything still open at the last seen close.
    pub fn finish(&mut self) {
        self.pending.clear();
        match self.last_close {
            Some((time, price)) => self.close_all_open(time, price, ExitReason::EndOfData),
            None => {
                // No bars seen: flatten at entry, still paying fees.
                for trade in std::mem::take(&mut self.open_trades) {
                    let (time, price) = (trade.entry_time, trade.entry_price);
                    self.finalize_close(trade, time, price, ExitReason::EndOfData);
                }
            }
        }
    }

    fn try_open(
        &mut self,
        direction: Direction,
        time: i64,
        price: f64,
        source: Option<WindowId>,
    ) -> bool {
        if self.config.is_no_trade_time(time) {
            return false;
        }
        if self.open_trades.len() + self.pending.len() >= self.config.effective_capacity() {
            return false;
        }
        if self.config.entry_delay_minutes > 0 {
            let delay = i64::from(self.config.entry_delay_minutes) * MINUTE_MS;
            self.pending.push(PendingEntry {
                direction,
                execute_at: time + delay,
                source_window: source,
            });
            return true;
        }
        self.open_at(direction, time, price, source)
    }

    fn open_at(
        &mut self,
        direction: Direction,
        time: i64,
        reference: f64,
        source: Option<WindowId>,
    ) -> bool {
        let size = self.config.sizing.size(self.capital);
        if size <= 0.0 || reference <= 0.0 {
            return false;
        }
        let entry_slippage_pct = self.config.slippage.entry_pct(size, &mut self.rng);
        let entry_price = slippage::entry_fill(direction, reference, entry_slippage_pct);

        let tp = self.config.take_profit_pct / 100.0;
        let sl = self.config.stop_loss_pct / 100.0;
        let (take_profit_price, stop_loss_price) = match direction {
            Direction::Long => (entry_price * (1.0 + tp), entry_price * (1.0 - sl)),
            Direction::Short => (entry_price * (1.0 - tp), entry_price * (1.0 + sl)),
        };

        let trade = Trade {
            id: TradeId(self.next_trade_id),
            direction,
            source_window: source,
            entry_time: time,
            entry_price,
            entry_slippage_pct,
            size,
            leverage: self.config.leverage,
            take_profit_price,
            stop_loss_price,
            trailing_tp: TrailingState::default(),
            trailing_sl: TrailingState::default(),
            status: TradeStatus::Open,
            exit_time: None,
            exit_price: None,
            exit_reason: None,
            pnl: None,
            fees_paid: 0.0,
            funding_paid: 0.0,
        };
        self.next_trade_id += 1;
        self.open_trades.push(trade);
        true
    }

    fn check_exits(&mut self, bar: &Candle) {
        if self.open_trades.is_empty() {
            return;
        }
        let price = bar.close;
        let mut still_open = Vec::with_capacity(self.open_trades.len());
        for mut trade in std::mem::take(&mut self.open_trades) {
            // Trails advance before the checks; a level freshly armed or
            // ratcheted from this close sits on its favorable side and
            // cannot fire on the same bar.
            let profit = trade.profit_pct(price);
            if let Some(cfg) = &self.config.trailing_take_profit {
                trailing::update(&mut trade.trailing_tp, cfg, trade.direction, profit, price);
            }
            if let Some(cfg) = &self.config.trailing_stop {
                trailing::update(&mut trade.trailing_sl, cfg, trade.direction, profit, price);
            }
            match self.exit_reason_for(&trade, bar) {
                Some(reason) => self.finalize_close(trade, bar.time, price, reason),
                None => still_open.push(trade),
            }
        }
        self.open_trades = still_open;
    }

    /// Exit precedence: armed trailing take-profit, armed trailing stop,
    /// static take-profit, static stop, holding timeout.
    fn exit_reason_for(&self, trade: &Trade, bar: &Candle) -> Option<ExitReason> {
        let price = bar.close;
        if trailing::triggered(&trade.trailing_tp, trade.direction, price) {
            return Some(ExitReason::TrailingTakeProfit);
        }
        if trailing::triggered(&trade.trailing_sl, trade.direction, price) {
            return Some(ExitReason::TrailingStop);
        }
        match trade.direction {
            Direction::Long => {
                if price >= trade.take_profit_price {
                    return Some(ExitReason::TakeProfit);
                }
                if price <= trade.stop_loss_price {
                    return Some(ExitReason::StopLoss);
                }
            }
            Direction::Short => {
                if price <= trade.take_profit_price {
                    return Some(ExitReason::TakeProfit);
                }
                if price >= trade.stop_loss_price {
                    return Some(ExitReason::StopLoss);
                }
            }
        }
        if let Some(max_minutes) = self.config.max_holding_minutes {
            if bar.time - trade.entry_time >= i64::from(max_minutes) * MINUTE_MS {
                return Some(ExitReason::Timeout);
            }
        }
        None
    }

    fn fill_pending(&mut self, bar: &Candle) {
        if self.pending.is_empty() {
            return;
        }
        let mut remaining = Vec::new();
        for entry in std::mem::take(&mut self.pending) {
            if bar.time < entry.execute_at {
                remaining.push(entry);
            } else if bar.time - entry.execute_at <= ENTRY_FILL_TOLERANCE_MS
                && !self.config.is_no_trade_time(bar.time)
            {
                self.open_at(entry.direction, bar.time, bar.close, entry.source_window);
            }
            // Due but past tolerance: the entry is abandoned.
        }
        self.pending = remaining;
    }

    /// Closes every open trade at `raw_price`.
    fn close_all_open(&mut self, time: i64, raw_price: f64, reason: ExitReason) {
        for trade in std::mem::take(&mut self.open_trades) {
            self.finalize_close(trade, time, raw_price, reason);
        }
    }

    /// Applies exit slippage, fees, and funding attribution, then books the
    /// realized result into capital. Funding was already deducted from
    /// capital when it accrued, so only `gross - fees` moves capital here;
    /// the trade's net PnL still carries its funding share.
    fn finalize_close(&mut self, mut trade: Trade, time: i64, raw_price: f64, reason: ExitReason) {
        let exit_pct = trade.entry_slippage_pct / 2.0;
        let exit_price = slippage::exit_fill(trade.direction, raw_price, exit_pct);
        let gross = trade.unrealized_pnl(exit_price);
        let fees = trade.size * self.config.fee_pct / 100.0 * 2.0;
        trade.fees_paid = fees;
        self.capital += gross - fees;
        let net = gross - fees - trade.funding_paid;
        trade.close(time, exit_price, reason, net);
        self.closed_trades.push(trade);
    }

    // ── Accessors ──

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn open_trades(&self) -> &[Trade] {
        &self.open_trades
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Consumes the simulator after [`finish`](Self::finish): closed trades
    /// in close order plus final capital.
    pub fn into_parts(self) -> (Vec<Trade>, f64) {
        (self.closed_trades, self.capital)
    }
}
