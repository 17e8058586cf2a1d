//! CascadeWindowManager — correlates pivots across timeframes into
//! executable signals.
//!
//! A primary-timeframe pivot opens a window whose end is that timeframe's
//! configured confirmation horizon. Other timeframes confirm while their
//! pivot time stays inside the window; pivots that closed shortly *before*
//! the primary back-fill at open, bounded by the effective proximity
//! (min of 5 minutes and the primary timeframe's horizon). Execution fires
//! on the confirmation that lifts the distinct-timeframe count to the
//! threshold.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Pivot, Signal, TimeframeConfig, TimeframeRole, WindowId, MINUTE_MS};

use super::window::{CascadeExecution, CascadeWindow};

/// Fixed proximity bound for pre-primary back-fill confirmations.
pub const PROXIMITY_MS: i64 = 5 * MINUTE_MS;

/// Confirmation horizon for one (primary-capable) timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationHorizon {
    pub interval_minutes: u32,
    pub window_minutes: u32,
}

/// Cascade-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Distinct confirmed timeframes (primary included) needed to execute.
    #[serde(default = "default_min_timeframes")]
    pub min_timeframes_required: usize,

    /// Per-timeframe confirmation window lengths. Every primary-role
    /// timeframe must have an entry.
    #[serde(default)]
    pub confirmation_windows: Vec<ConfirmationHorizon>,

    /// Require the window's own primary timeframe in the confirmed set.
    #[serde(default)]
    pub require_primary_timeframe: bool,

    /// Require a confirmation from an execution-role timeframe.
    #[serde(default)]
    pub require_hierarchical_validation: bool,
}

fn default_min_timeframes() -> usize {
    2
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            min_timeframes_required: default_min_timeframes(),
            confirmation_windows: Vec::new(),
            require_primary_timeframe: false,
            require_hierarchical_validation: false,
        }
    }
}

impl CascadeConfig {
    pub fn horizon_minutes(&self, interval_minutes: u32) -> Option<u32> {
        self.confirmation_windows
            .iter()
            .find(|h| h.interval_minutes == interval_minutes)
            .map(|h| h.window_minutes)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CascadeError {
    #[error("no timeframe configured with role PRIMARY")]
    NoPrimaryTimeframe,

    #[error("no confirmation window configured for primary timeframe {interval_minutes}m")]
    MissingConfirmationWindow { interval_minutes: u32 },
}

/// Per-signal confirmation state machine across all configured timeframes.
///
/// Drive it with [`on_pivot`](Self::on_pivot) in ascending pivot-time order
/// and [`advance_to`](Self::advance_to) as the clock moves. Windows live in
/// the surfaced set until their end time passes, then move to the finished
/// archive. The pivot memory used for back-filling is bounded per timeframe
/// and evicted by time, never kept globally.
#[derive(Debug, Clone)]
pub struct CascadeManager {
    config: CascadeConfig,
    timeframes: Vec<TimeframeConfig>,
    windows: Vec<CascadeWindow>,
    finished: Vec<CascadeWindow>,
    recent_pivots: BTreeMap<u32, VecDeque<Pivot>>,
    next_id: u64,
}

impl CascadeManager {
    pub fn new(
        timeframes: Vec<TimeframeConfig>,
        config: CascadeConfig,
    ) -> Result<Self, CascadeError> {
        let mut saw_primary = false;
        for tf in &timeframes {
            if tf.role == TimeframeRole::Primary {
                saw_primary = true;
                if config.horizon_minutes(tf.interval_minutes).is_none() {
                    return Err(CascadeError::MissingConfirmationWindow {
                        interval_minutes: tf.interval_minutes,
                    });
                }
            }
        }
        if !saw_primary {
            return Err(CascadeError::NoPrimaryTimeframe);
        }
        Ok(Self {
            config,
            timeframes,
            windows: Vec::new(),
            finished: Vec::new(),
            recent_pivots: BTreeMap::new(),
            next_id: 0,
        })
    }

    /// Feeds one pivot from `interval_minutes`. Returns the executions it
    /// triggered (possibly across several coexisting windows). Pivots from
    /// timeframes outside the configuration are ignored.
    pub fn on_pivot(&mut self, interval_minutes: u32, pivot: Pivot) -> Vec<CascadeExecution> {
        let Some(tf) = self.timeframe(interval_minutes) else {
            return Vec::new();
        };
        let opposite = tf.opposite;
        let role = tf.role;

        self.advance_to(pivot.time);

        let mut executions = Vec::new();

        // Forward confirmation into every active window on another timeframe.
        let config = &self.config;
        let timeframes = &self.timeframes;
        for window in self.windows.iter_mut().filter(|w| w.is_active()) {
            if window.has_confirmation_from(interval_minutes) {
                continue;
            }
            if pivot.time > window.window_end_time {
                continue;
            }
            if pivot.signal != expected_signal(window.signal(), opposite) {
                continue;
            }
            window.confirm(interval_minutes, pivot, pivot.time);
            if let Some(exec) = try_execute(config, timeframes, window, Some(&pivot)) {
                executions.push(exec);
            }
        }

        if role == TimeframeRole::Primary {
            if let Some(exec) = self.open_window(interval_minutes, pivot) {
                executions.push(exec);
            }
        }

        self.recent_pivots
            .entry(interval_minutes)
            .or_default()
            .push_back(pivot);

        executions
    }

    /// Expires overdue windows, archives terminal windows past their end
    /// time, and evicts pivot memory older than the proximity bound.
    pub fn advance_to(&mut self, now: i64) {
        for window in &mut self.windows {
            if window.is_active() && now > window.window_end_time {
                window.expire();
            }
        }
        let windows = std::mem::take(&mut self.windows);
        for window in windows {
            if window.is_terminal() && now > window.window_end_time {
                self.finished.push(window);
            } else {
                self.windows.push(window);
            }
        }
        let cutoff = now - PROXIMITY_MS;
        for buffer in self.recent_pivots.values_mut() {
            while buffer.front().is_some_and(|p| p.time < cutoff) {
                buffer.pop_front();
            }
        }
    }

    /// Windows still awaiting confirmation.
    pub fn active_windows(&self) -> impl Iterator<Item = &CascadeWindow> {
        self.windows.iter().filter(|w| w.is_active())
    }

    /// Executed windows still inside their own horizon.
    pub fn recently_executed(&self) -> impl Iterator<Item = &CascadeWindow> {
        self.windows
            .iter()
            .filter(|w| w.status == super::window::WindowStatus::Executed)
    }

    /// Windows opened so far.
    pub fn opened_count(&self) -> u64 {
        self.next_id
    }

    /// Consumes the manager, returning every window ever opened in id order.
    pub fn into_windows(mut self) -> Vec<CascadeWindow> {
        self.finished.append(&mut self.windows);
        self.finished.sort_by_key(|w| w.id);
        self.finished
    }

    fn timeframe(&self, interval_minutes: u32) -> Option<&TimeframeConfig> {
        self.timeframes
            .iter()
            .find(|t| t.interval_minutes == interval_minutes)
    }

    fn open_window(&mut self, interval_minutes: u32, pivot: Pivot) -> Option<CascadeExecution> {
        // Validated at construction for every primary timeframe.
        let horizon_minutes = self.config.horizon_minutes(interval_minutes)?;
        let horizon_ms = i64::from(horizon_minutes) * MINUTE_MS;

        let id = WindowId(self.next_id);
        self.next_id += 1;
        let mut window = CascadeWindow::open(id, pivot, interval_minutes, horizon_ms);

        self.backfill(&mut window);
        let exec = try_execute(&self.config, &self.timeframes, &mut window, None);
        self.windows.push(window);
        exec
    }

    /// Registers pre-primary pivots from other timeframes, earliest match
    /// per timeframe, bounded behind the primary by the effective proximity.
    fn backfill(&self, window: &mut CascadeWindow) {
        let horizon_ms = window.window_end_time - window.open_time;
        let proximity_ms = PROXIMITY_MS.min(horizon_ms);
        let primary_time = window.primary_pivot.time;

        for tf in &self.timeframes {
            if tf.interval_minutes == window.primary_interval_minutes {
                continue;
            }
            let Some(buffer) = self.recent_pivots.get(&tf.interval_minutes) else {
                continue;
            };
            let target = expected_signal(window.signal(), tf.opposite);
            let matched = buffer.iter().find(|p| {
                p.signal == target
                    && p.time <= primary_time
                    && primary_time - p.time <= proximity_ms
            });
            if let Some(p) = matched {
                window.confirm(tf.interval_minutes, *p, window.open_time);
            }
        }
    }
}

/// Signal a confirming timeframe must carry for a window trading `primary`.
fn expected_signal(primary: Signal, opposite: bool) -> Signal {
    if opposite {
        primary.invert()
    } else {
        primary
    }
}

/// Executes the window if the confirmation set satisfies the configured
/// gates. `trigger` is the pivot whose confirmation lifted the count to the
/// threshold; `None` means the threshold was already met at open, which
/// executes at the primary pivot's own time and price.
fn try_execute(
    config: &CascadeConfig,
    timeframes: &[TimeframeConfig],
    window: &mut CascadeWindow,
    trigger: Option<&Pivot>,
) -> Option<CascadeExecution> {
    if !window.is_active() {
        return None;
    }
    if window.confirmed_timeframes() < config.min_timeframes_required {
        return None;
    }
    if config.require_primary_timeframe
        && !window.has_confirmation_from(window.primary_interval_minutes)
    {
        return None;
    }
    if config.require_hierarchical_validation {
        let has_execution_role = window.confirmations.iter().any(|c| {
            timeframes
                .iter()
                .find(|t| t.interval_minutes == c.interval_minutes)
                .is_some_and(|t| t.role == TimeframeRole::Execution)
        });
        if !has_execution_role {
            return None;
        }
    }

    let (time, price) = match trigger {
        Some(p) => (p.time, p.price),
        None => (window.primary_pivot.time, window.primary_pivot.price),
    };
    let exec_time = time.max(window.primary_pivot.time);
    window.execute(exec_time, price);
    Some(CascadeExecution {
        window_id: window.id,
        signal: window.signal(),
        time: exec_time,
        price,
        confirmed_timeframes: window.confirmed_timeframes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::window::WindowStatus;
    use crate::domain::PivotKind;

    fn pivot(kind: PivotKind, minute: i64, price: f64) -> Pivot {
        Pivot::new(kind, price, minute * MINUTE_MS, 0, 1.0)
    }

    fn timeframes() -> Vec<TimeframeConfig> {
        vec![
            TimeframeConfig::new(60, TimeframeRole::Primary),
            TimeframeConfig::new(15, TimeframeRole::Confirmation),
            TimeframeConfig::new(240, TimeframeRole::Secondary),
        ]
    }

    fn config(min_required: usize) -> CascadeConfig {
        CascadeConfig {
            min_timeframes_required: min_required,
            confirmation_windows: vec![ConfirmationHorizon {
                interval_minutes: 60,
                window_minutes: 240,
            }],
            require_primary_timeframe: false,
            require_hierarchical_validation: false,
        }
    }

    fn manager(min_required: usize) -> CascadeManager {
        CascadeManager::new(timeframes(), config(min_required)).unwrap()
    }

    #[test]
    fn rejects_config_without_primary() {
        let tfs = vec![TimeframeConfig::new(15, TimeframeRole::Confirmation)];
        let err = CascadeManager::new(tfs, config(2)).unwrap_err();
        assert_eq!(err, CascadeError::NoPrimaryTimeframe);
    }

    #[test]
    fn rejects_primary_without_horizon() {
        let tfs = vec![TimeframeConfig::new(30, TimeframeRole::Primary)];
        let err = CascadeManager::new(tfs, config(2)).unwrap_err();
        assert_eq!(
            err,
            CascadeError::MissingConfirmationWindow {
                interval_minutes: 30
            }
        );
    }

    #[test]
    fn late_confirmation_executes_at_its_own_time_and_price() {
        // Primary 1h low at t0; matching 15m low 20 minutes later.
        let mut mgr = manager(2);
        let t0 = 600;
        assert!(mgr.on_pivot(60, pivot(PivotKind::Low, t0, 100.0)).is_empty());
        let execs = mgr.on_pivot(15, pivot(PivotKind::Low, t0 + 20, 99.4));
        assert_eq!(execs.len(), 1);
        let exec = &execs[0];
        assert_eq!(exec.signal, Signal::Long);
        assert_eq!(exec.time, (t0 + 20) * MINUTE_MS);
        assert_eq!(exec.price, 99.4);
        assert_eq!(exec.confirmed_timeframes, 2);
    }

    #[test]
    fn threshold_met_by_primary_alone_executes_at_open() {
        let mut mgr = manager(1);
        let execs = mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].time, 600 * MINUTE_MS);
        assert_eq!(execs[0].price, 100.0);
        assert_eq!(execs[0].confirmed_timeframes, 1);
    }

    #[test]
    fn backfills_recent_pre_primary_pivot() {
        let mut mgr = manager(2);
        // 15m pivot three minutes before the primary: inside proximity.
        assert!(mgr.on_pivot(15, pivot(PivotKind::Low, 597, 99.0)).is_empty());
        let execs = mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        assert_eq!(execs.len(), 1);
        // Threshold met at open: primary's time and price, never earlier.
        assert_eq!(execs[0].time, 600 * MINUTE_MS);
        assert_eq!(execs[0].price, 100.0);
    }

    #[test]
    fn backfill_bounded_by_proximity() {
        let mut mgr = manager(2);
        // Ten minutes back: outside the 5-minute proximity.
        mgr.on_pivot(15, pivot(PivotKind::Low, 590, 99.0));
        let execs = mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        assert!(execs.is_empty());
        assert_eq!(mgr.active_windows().count(), 1);
    }

    #[test]
    fn effective_proximity_shrinks_with_short_horizon() {
        let mut cfg = config(2);
        cfg.confirmation_windows[0].window_minutes = 3;
        let mut mgr = CascadeManager::new(timeframes(), cfg).unwrap();
        // Four minutes back: inside the 5m constant but outside the 3m
        // horizon, so it cannot back-fill.
        mgr.on_pivot(15, pivot(PivotKind::Low, 596, 99.0));
        let execs = mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        assert!(execs.is_empty());
    }

    #[test]
    fn forward_confirmation_bounded_by_window_end() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        // 241 minutes later: past the 240-minute horizon. The window has
        // already expired by the time the pivot arrives.
        let execs = mgr.on_pivot(15, pivot(PivotKind::Low, 841, 99.0));
        assert!(execs.is_empty());
        assert_eq!(mgr.active_windows().count(), 0);
    }

    #[test]
    fn mismatched_signal_does_not_confirm() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        let execs = mgr.on_pivot(15, pivot(PivotKind::High, 620, 101.0));
        assert!(execs.is_empty());
        let window = mgr.active_windows().next().unwrap();
        assert!(window.confirmations.is_empty());
    }

    #[test]
    fn opposite_timeframe_confirms_with_inverted_signal() {
        let mut tfs = timeframes();
        tfs[1].opposite = true;
        let mut mgr = CascadeManager::new(tfs, config(2)).unwrap();
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        // Opposite-flagged 15m confirms a long primary with a short pivot.
        let execs = mgr.on_pivot(15, pivot(PivotKind::High, 620, 101.0));
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].signal, Signal::Long);
    }

    #[test]
    fn distinct_timeframes_counted_once() {
        let mut mgr = manager(3);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        // Two 15m pivots: only the first one counts.
        assert!(mgr.on_pivot(15, pivot(PivotKind::Low, 615, 99.5)).is_empty());
        assert!(mgr.on_pivot(15, pivot(PivotKind::Low, 630, 99.0)).is_empty());
        // A third distinct timeframe lifts the count to the threshold.
        let execs = mgr.on_pivot(240, pivot(PivotKind::Low, 720, 98.0));
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].confirmed_timeframes, 3);
        assert_eq!(execs[0].time, 720 * MINUTE_MS);
    }

    #[test]
    fn hierarchical_validation_requires_execution_role() {
        let mut tfs = timeframes();
        tfs.push(TimeframeConfig::new(5, TimeframeRole::Execution));
        let mut cfg = config(2);
        cfg.require_hierarchical_validation = true;
        let mut mgr = CascadeManager::new(tfs, cfg).unwrap();

        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        // A confirmation-role timeframe alone no longer executes.
        assert!(mgr.on_pivot(15, pivot(PivotKind::Low, 620, 99.0)).is_empty());
        // The execution-role timeframe does.
        let execs = mgr.on_pivot(5, pivot(PivotKind::Low, 625, 99.2));
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].time, 625 * MINUTE_MS);
    }

    #[test]
    fn window_expires_without_confirmation() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        assert_eq!(mgr.active_windows().count(), 1);
        mgr.advance_to((600 + 241) * MINUTE_MS);
        assert_eq!(mgr.active_windows().count(), 0);
        let windows = mgr.into_windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].status, WindowStatus::Expired);
    }

    #[test]
    fn executed_window_surfaced_until_horizon() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        mgr.on_pivot(15, pivot(PivotKind::Low, 620, 99.0));
        assert_eq!(mgr.recently_executed().count(), 1);

        mgr.advance_to((600 + 120) * MINUTE_MS);
        assert_eq!(mgr.recently_executed().count(), 1);

        mgr.advance_to((600 + 241) * MINUTE_MS);
        assert_eq!(mgr.recently_executed().count(), 0);
        let windows = mgr.into_windows();
        assert_eq!(windows[0].status, WindowStatus::Executed);
    }

    #[test]
    fn executed_window_never_executes_twice() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        let first = mgr.on_pivot(15, pivot(PivotKind::Low, 620, 99.0));
        assert_eq!(first.len(), 1);
        // Another distinct timeframe arriving later does not re-trigger.
        let second = mgr.on_pivot(240, pivot(PivotKind::Low, 700, 98.0));
        assert!(second.is_empty());
    }

    #[test]
    fn windows_coexist_with_monotonic_ids() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        mgr.on_pivot(60, pivot(PivotKind::High, 660, 105.0));
        assert_eq!(mgr.active_windows().count(), 2);
        assert_eq!(mgr.opened_count(), 2);
        // The 15m low confirms only the long window.
        let execs = mgr.on_pivot(15, pivot(PivotKind::Low, 665, 99.0));
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].window_id, WindowId(0));

        let windows = mgr.into_windows();
        assert_eq!(windows.len(), 2);
        assert!(windows[0].id < windows[1].id);
    }

    #[test]
    fn unconfigured_timeframe_is_ignored() {
        let mut mgr = manager(2);
        mgr.on_pivot(60, pivot(PivotKind::Low, 600, 100.0));
        let execs = mgr.on_pivot(7, pivot(PivotKind::Low, 610, 99.0));
        assert!(execs.is_empty());
        let window = mgr.active_windows().next().unwrap();
        assert!(window.confirmations.is_empty());
    }
}
