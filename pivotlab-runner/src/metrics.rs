//! Performance metrics over closed trades and the realized equity curve.
//!
//! Every metric is a pure, total function: trade list in, scalar out, no
//! NaN on empty or degenerate input. The equity curve is realized only
//! (initial capital plus cumulative net PnL at each close), so drawdown
//! reflects booked results, not open-position marks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pivotlab_core::domain::Trade;

/// Aggregate performance of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub final_capital: f64,
    pub return_pct: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown_pct: f64,
    pub total_fees: f64,
    pub total_funding: f64,
    /// Closed-trade count per exit reason, keyed by the reason's display name.
    pub exit_reasons: BTreeMap<String, usize>,
}

impl PerformanceMetrics {
    /// Computes all metrics from the closed-trade list.
    pub fn compute(trades: &[Trade], initial_capital: f64) -> Self {
        let equity = realized_equity_curve(trades, initial_capital);
        let winners = trades.iter().filter(|t| t.is_winner()).count();
        let pnl = total_pnl(trades);
        Self {
            trade_count: trades.len(),
            winning_trades: winners,
            losing_trades: trades.len() - winners,
            win_rate: win_rate(trades),
            total_pnl: pnl,
            final_capital: initial_capital + pnl,
            return_pct: return_pct(pnl, initial_capital),
            profit_factor: profit_factor(trades),
            avg_win: avg_win(trades),
            avg_loss: avg_loss(trades),
            max_drawdown_pct: max_drawdown_pct(&equity),
            total_fees: trades.iter().map(|t| t.fees_paid).sum(),
            total_funding: trades.iter().map(|t| t.funding_paid).sum(),
            exit_reasons: exit_reason_counts(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Net PnL of a trade; open trades count as zero.
fn net(trade: &Trade) -> f64 {
    trade.pnl.unwrap_or(0.0)
}

/// Sum of net PnL over all closed trades.
pub fn total_pnl(trades: &[Trade]) -> f64 {
    trades.iter().map(net).sum()
}

/// Fraction of trades that closed with positive net PnL.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Total return as a percentage of initial capital.
pub fn return_pct(total_pnl: f64, initial_capital: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    total_pnl / initial_capital * 100.0
}

/// Gross profits / gross losses, capped at 100.0 when losses are zero.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().map(net).filter(|p| *p > 0.0).sum();
    let gross_loss: f64 = trades
        .iter()
        .map(net)
        .filter(|p| *p < 0.0)
        .map(f64::abs)
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Mean net PnL over winning trades; 0.0 when there are none.
pub fn avg_win(trades: &[Trade]) -> f64 {
    mean(trades.iter().map(net).filter(|p| *p > 0.0))
}

/// Mean net PnL over losing trades (a negative number); 0.0 when none.
pub fn avg_loss(trades: &[Trade]) -> f64 {
    mean(trades.iter().map(net).filter(|p| *p < 0.0))
}

/// Maximum peak-to-trough drawdown of the equity curve, as a negative
/// percentage (-15.0 means a 15% drawdown). 0.0 for monotonic curves.
pub fn max_drawdown_pct(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak * 100.0;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Closed-trade counts keyed by exit reason display name.
pub fn exit_reason_counts(trades: &[Trade]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        if let Some(reason) = trade.exit_reason {
            *counts.entry(reason.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Realized equity after each close, starting at initial capital.
///
/// Length is `trades.len() + 1`; the simulator closes trades in exit order,
/// so the input order is already chronological.
pub fn realized_equity_curve(trades: &[Trade], initial_capital: f64) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    let mut equity = initial_capital;
    curve.push(equity);
    for trade in trades {
        equity += net(trade);
        curve.push(equity);
    }
    curve
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivotlab_core::domain::{
        Direction, ExitReason, TradeId, TradeStatus, TrailingState,
    };

    fn closed_trade(pnl: f64, reason: ExitReason) -> Trade {
        Trade {
            id: TradeId(0),
            direction: Direction::Long,
            source_window: None,
            entry_time: 60_000,
            entry_price: 100.0,
            entry_slippage_pct: 0.0,
            size: 1_000.0,
            leverage: 1.0,
            take_profit_price: 110.0,
            stop_loss_price: 95.0,
            trailing_tp: TrailingState::default(),
            trailing_sl: TrailingState::default(),
            status: TradeStatus::Closed,
            exit_time: Some(120_000),
            exit_price: Some(100.0 + pnl / 10.0),
            exit_reason: Some(reason),
            pnl: Some(pnl),
            fees_paid: 2.0,
            funding_paid: 0.5,
        }
    }

    // ── Win rate ──

    #[test]
    fn win_rate_mixed() {
        let trades = vec![
            closed_trade(100.0, ExitReason::TakeProfit),
            closed_trade(-50.0, ExitReason::StopLoss),
            closed_trade(30.0, ExitReason::TakeProfit),
            closed_trade(-10.0, ExitReason::Timeout),
        ];
        assert!((win_rate(&trades) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn win_rate_empty() {
        assert_eq!(win_rate(&[]), 0.0);
    }

    // ── Profit factor ──

    #[test]
    fn profit_factor_known_value() {
        let trades = vec![
            closed_trade(500.0, ExitReason::TakeProfit),
            closed_trade(-200.0, ExitReason::StopLoss),
            closed_trade(300.0, ExitReason::TakeProfit),
        ];
        // profits 800 / losses 200
        assert!((profit_factor(&trades) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_all_winners_capped() {
        let trades = vec![
            closed_trade(500.0, ExitReason::TakeProfit),
            closed_trade(300.0, ExitReason::TakeProfit),
        ];
        assert_eq!(profit_factor(&trades), 100.0);
    }

    #[test]
    fn profit_factor_all_losers_is_zero() {
        let trades = vec![closed_trade(-500.0, ExitReason::StopLoss)];
        assert_eq!(profit_factor(&trades), 0.0);
    }

    #[test]
    fn profit_factor_empty() {
        assert_eq!(profit_factor(&[]), 0.0);
    }

    // ── Averages ──

    #[test]
    fn avg_win_and_loss() {
        let trades = vec![
            closed_trade(100.0, ExitReason::TakeProfit),
            closed_trade(300.0, ExitReason::TakeProfit),
            closed_trade(-50.0, ExitReason::StopLoss),
        ];
        assert!((avg_win(&trades) - 200.0).abs() < 1e-12);
        assert!((avg_loss(&trades) + 50.0).abs() < 1e-12);
    }

    #[test]
    fn averages_empty_are_zero() {
        assert_eq!(avg_win(&[]), 0.0);
        assert_eq!(avg_loss(&[]), 0.0);
    }

    // ── Drawdown ──

    #[test]
    fn max_drawdown_known() {
        let eq = vec![10_000.0, 11_000.0, 9_900.0, 10_500.0];
        let expected = (9_900.0 - 11_000.0) / 11_000.0 * 100.0;
        assert!((max_drawdown_pct(&eq) - expected).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        let eq: Vec<f64> = (0..50).map(|i| 10_000.0 + i as f64 * 10.0).collect();
        assert_eq!(max_drawdown_pct(&eq), 0.0);
    }

    #[test]
    fn max_drawdown_short_input() {
        assert_eq!(max_drawdown_pct(&[]), 0.0);
        assert_eq!(max_drawdown_pct(&[10_000.0]), 0.0);
    }

    // ── Equity curve ──

    #[test]
    fn realized_equity_tracks_cumulative_pnl() {
        let trades = vec![
            closed_trade(100.0, ExitReason::TakeProfit),
            closed_trade(-40.0, ExitReason::StopLoss),
        ];
        let eq = realized_equity_curve(&trades, 10_000.0);
        assert_eq!(eq, vec![10_000.0, 10_100.0, 10_060.0]);
    }

    // ── Exit reasons ──

    #[test]
    fn exit_reason_breakdown() {
        let trades = vec![
            closed_trade(10.0, ExitReason::TakeProfit),
            closed_trade(10.0, ExitReason::TakeProfit),
            closed_trade(-10.0, ExitReason::StopLoss),
            closed_trade(-5.0, ExitReason::EndOfData),
        ];
        let counts = exit_reason_counts(&trades);
        assert_eq!(counts.get("take_profit"), Some(&2));
        assert_eq!(counts.get("stop_loss"), Some(&1));
        assert_eq!(counts.get("end_of_data"), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), 4);
    }

    // ── Aggregate ──

    #[test]
    fn compute_all_metrics_no_trades() {
        let m = PerformanceMetrics::compute(&[], 10_000.0);
        assert_eq!(m.trade_count, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.total_pnl, 0.0);
        assert_eq!(m.final_capital, 10_000.0);
        assert_eq!(m.return_pct, 0.0);
        assert_eq!(m.max_drawdown_pct, 0.0);
        assert!(m.exit_reasons.is_empty());
        assert!(m.profit_factor.is_finite());
        assert!(m.avg_win.is_finite());
        assert!(m.avg_loss.is_finite());
    }

    #[test]
    fn compute_all_metrics_with_trades() {
        let trades = vec![
            closed_trade(500.0, ExitReason::TakeProfit),
            closed_trade(-200.0, ExitReason::StopLoss),
            closed_trade(300.0, ExitReason::TrailingStop),
        ];
        let m = PerformanceMetrics::compute(&trades, 10_000.0);
        assert_eq!(m.trade_count, 3);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert!((m.total_pnl - 600.0).abs() < 1e-9);
        assert!((m.final_capital - 10_600.0).abs() < 1e-9);
        assert!((m.return_pct - 6.0).abs() < 1e-9);
        assert!((m.total_fees - 6.0).abs() < 1e-9);
        assert!((m.total_funding - 1.5).abs() < 1e-9);
        // equity dips from 10_500 to 10_300 before the last win
        let expected_dd = (10_300.0 - 10_500.0) / 10_500.0 * 100.0;
        assert!((m.max_drawdown_pct - expected_dd).abs() < 1e-9);
    }

    #[test]
    fn metrics_serialize_roundtrip() {
        let trades = vec![closed_trade(42.0, ExitReason::TakeProfit)];
        let m = PerformanceMetrics::compute(&trades, 10_000.0);
        let json = serde_json::to_string(&m).unwrap();
        let back: PerformanceMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }

    // ── Properties ──

    use proptest::prelude::*;

    fn arb_pnls() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-500.0..500.0_f64, 0..40)
    }

    proptest! {
        /// Capital always reconciles: final equals initial plus the net sum,
        /// and the equity curve ends exactly there.
        #[test]
        fn compute_reconciles_capital(pnls in arb_pnls()) {
            let trades: Vec<Trade> = pnls
                .iter()
                .map(|&p| closed_trade(p, ExitReason::TakeProfit))
                .collect();
            let m = PerformanceMetrics::compute(&trades, 10_000.0);
            let net: f64 = pnls.iter().sum();
            prop_assert!((m.final_capital - (10_000.0 + net)).abs() < 1e-6);

            let eq = realized_equity_curve(&trades, 10_000.0);
            prop_assert_eq!(eq.len(), trades.len() + 1);
            prop_assert!((eq[eq.len() - 1] - m.final_capital).abs() < 1e-6);
        }

        /// Ratio metrics stay inside their documented ranges on any input.
        #[test]
        fn ratio_metrics_stay_bounded(pnls in arb_pnls()) {
            let trades: Vec<Trade> = pnls
                .iter()
                .map(|&p| closed_trade(p, ExitReason::StopLoss))
                .collect();
            let rate = win_rate(&trades);
            prop_assert!((0.0..=1.0).contains(&rate));
            let factor = profit_factor(&trades);
            prop_assert!((0.0..=100.0).contains(&factor));

            let eq = realized_equity_curve(&trades, 10_000.0);
            let dd = max_drawdown_pct(&eq);
            prop_assert!(dd <= 0.0);
            prop_assert!(dd.is_finite());
        }
    }
}
