//! CascadeWindow — per-signal confirmation state with a monotonic lifecycle.

use serde::{Deserialize, Serialize};

use crate::domain::{Pivot, Signal, WindowId};

/// Window lifecycle state. Transitions only ever run
/// active → executed or active → expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    Active,
    Executed,
    Expired,
}

/// One timeframe's confirmation of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub interval_minutes: u32,
    pub pivot: Pivot,
    /// When the confirmation registered. Back-filled pre-primary pivots
    /// register at window open, so this never precedes `open_time`.
    pub confirm_time: i64,
}

/// A cascade window opened by one primary-timeframe pivot.
///
/// The primary timeframe counts as confirmed from the start;
/// `confirmations` holds only the other timeframes, at most one entry each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeWindow {
    pub id: WindowId,
    pub primary_pivot: Pivot,
    pub primary_interval_minutes: u32,
    pub open_time: i64,
    pub window_end_time: i64,
    pub confirmations: Vec<Confirmation>,
    pub status: WindowStatus,
    pub execution_time: Option<i64>,
    pub execution_price: Option<f64>,
}

impl CascadeWindow {
    pub fn open(
        id: WindowId,
        primary_pivot: Pivot,
        primary_interval_minutes: u32,
        horizon_ms: i64,
    ) -> Self {
        Self {
            id,
            primary_pivot,
            primary_interval_minutes,
            open_time: primary_pivot.time,
            window_end_time: primary_pivot.time + horizon_ms,
            confirmations: Vec::new(),
            status: WindowStatus::Active,
            execution_time: None,
            execution_price: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WindowStatus::Active
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// The signal the window trades: the primary pivot's.
    pub fn signal(&self) -> Signal {
        self.primary_pivot.signal
    }

    /// Distinct confirmed timeframes, primary included.
    pub fn confirmed_timeframes(&self) -> usize {
        1 + self.confirmations.len()
    }

    pub fn has_confirmation_from(&self, interval_minutes: u32) -> bool {
        interval_minutes == self.primary_interval_minutes
            || self
                .confirmations
                .iter()
                .any(|c| c.interval_minutes == interval_minutes)
    }

    /// Registers a confirmation. Only active windows take confirmations and
    /// only one per timeframe; violating calls are no-ops.
    pub fn confirm(&mut self, interval_minutes: u32, pivot: Pivot, confirm_time: i64) {
        if !self.is_active() || self.has_confirmation_from(interval_minutes) {
            return;
        }
        self.confirmations.push(Confirmation {
            interval_minutes,
            pivot,
            confirm_time,
        });
    }

    /// Active → Executed. Execution time never precedes the primary pivot.
    pub fn execute(&mut self, time: i64, price: f64) {
        if !self.is_active() {
            return;
        }
        self.status = WindowStatus::Executed;
        self.execution_time = Some(time.max(self.primary_pivot.time));
        self.execution_price = Some(price);
    }

    /// Active → Expired.
    pub fn expire(&mut self) {
        if !self.is_active() {
            return;
        }
        self.status = WindowStatus::Expired;
    }
}

/// Emitted once when a window executes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeExecution {
    pub window_id: WindowId,
    pub signal: Signal,
    pub time: i64,
    pub price: f64,
    /// Distinct confirmed timeframes at the moment of execution.
    pub confirmed_timeframes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PivotKind, MINUTE_MS};

    fn low_pivot(minute: i64, price: f64) -> Pivot {
        Pivot::new(PivotKind::Low, price, minute * MINUTE_MS, 5, 1.0)
    }

    fn sample_window() -> CascadeWindow {
        CascadeWindow::open(WindowId(1), low_pivot(60, 100.0), 60, 240 * MINUTE_MS)
    }

    #[test]
    fn open_window_counts_primary() {
        let w = sample_window();
        assert_eq!(w.status, WindowStatus::Active);
        assert_eq!(w.confirmed_timeframes(), 1);
        assert_eq!(w.window_end_time, (60 + 240) * MINUTE_MS);
        assert_eq!(w.signal(), Signal::Long);
    }

    #[test]
    fn one_confirmation_per_timeframe() {
        let mut w = sample_window();
        w.confirm(15, low_pivot(80, 99.0), 80 * MINUTE_MS);
        w.confirm(15, low_pivot(95, 98.0), 95 * MINUTE_MS);
        assert_eq!(w.confirmations.len(), 1);
        assert_eq!(w.confirmations[0].pivot.time, 80 * MINUTE_MS);
    }

    #[test]
    fn primary_timeframe_cannot_reconfirm() {
        let mut w = sample_window();
        w.confirm(60, low_pivot(120, 97.0), 120 * MINUTE_MS);
        assert!(w.confirmations.is_empty());
    }

    #[test]
    fn execution_time_clamped_to_primary() {
        let mut w = sample_window();
        w.execute(30 * MINUTE_MS, 99.5);
        assert_eq!(w.execution_time, Some(60 * MINUTE_MS));
        assert_eq!(w.status, WindowStatus::Executed);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut w = sample_window();
        w.execute(80 * MINUTE_MS, 99.5);
        let executed_at = w.execution_time;

        w.expire();
        assert_eq!(w.status, WindowStatus::Executed);
        w.execute(90 * MINUTE_MS, 42.0);
        assert_eq!(w.execution_time, executed_at);
        w.confirm(15, low_pivot(85, 98.0), 85 * MINUTE_MS);
        assert!(w.confirmations.is_empty());

        let mut w = sample_window();
        w.expire();
        assert_eq!(w.status, WindowStatus::Expired);
        w.execute(80 * MINUTE_MS, 99.5);
        assert_eq!(w.status, WindowStatus::Expired);
        assert_eq!(w.execution_time, None);
    }
}
