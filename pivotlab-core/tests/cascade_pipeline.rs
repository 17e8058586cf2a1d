//! End-to-end pipeline tests: minute candles through aggregation, pivot
//! detection, and cascade confirmation.

use pivotlab_core::aggregate::aggregate_candles;
use pivotlab_core::cascade::{
    CascadeConfig, CascadeManager, CascadeWindow, ConfirmationHorizon, WindowStatus,
};
use pivotlab_core::domain::{
    Candle, Pivot, PriceMode, Signal, TimeframeConfig, TimeframeRole, MINUTE_MS,
};
use pivotlab_core::pivots::{detect_all, DetectorConfig};

fn flat_candle(minute: i64, close: f64) -> Candle {
    Candle {
        time: minute * MINUTE_MS,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }
}

/// Minute candles whose close is constant within each 15-minute block.
fn block_candles(block_closes: &[f64]) -> Vec<Candle> {
    let mut candles = Vec::new();
    for (b, close) in block_closes.iter().enumerate() {
        for m in 1..=15 {
            candles.push(flat_candle(b as i64 * 15 + m, *close));
        }
    }
    candles
}

fn detector() -> DetectorConfig {
    DetectorConfig {
        lookback: 1,
        min_swing_pct: 0.0,
        min_leg_bars: 0,
        price_mode: PriceMode::Close,
    }
}

/// Chronological (interval, pivot) feed; finer timeframes first at ties.
fn pivot_feed(minutes: &[Candle], intervals: &[u32]) -> Vec<(u32, Pivot)> {
    let mut events: Vec<(u32, Pivot)> = Vec::new();
    for &interval in intervals {
        let candles = aggregate_candles(minutes, 1, interval).unwrap();
        for pivot in detect_all(&candles, detector()) {
            events.push((interval, pivot));
        }
    }
    events.sort_by_key(|(interval, pivot)| (pivot.time, *interval));
    events
}

struct CascadeRun {
    executions: Vec<pivotlab_core::cascade::CascadeExecution>,
    windows: Vec<CascadeWindow>,
    last_event_time: i64,
}

fn run_cascade(
    minutes: &[Candle],
    timeframes: Vec<TimeframeConfig>,
    config: CascadeConfig,
) -> CascadeRun {
    let intervals: Vec<u32> = timeframes.iter().map(|t| t.interval_minutes).collect();
    let mut manager = CascadeManager::new(timeframes, config).unwrap();
    let mut executions = Vec::new();
    let mut last_event_time = 0;
    for (interval, pivot) in pivot_feed(minutes, &intervals) {
        last_event_time = pivot.time;
        executions.extend(manager.on_pivot(interval, pivot));
    }
    CascadeRun {
        executions,
        windows: manager.into_windows(),
        last_event_time,
    }
}

#[test]
fn scripted_two_timeframe_cascade() {
    // 15m block closes chosen so the 60m series (blocks 4, 8, 12, 16) prints
    // 100, 98, 98, 99.5: a low pivot at minute 120, then a high at 240. On
    // the 15m side the only matching confirmation after the low is the drop
    // to 96.5 closing at minute 150.
    let blocks = [
        99.0, 99.5, 99.8, 100.0, // 60m close 100
        99.5, 99.2, 97.0, 98.0, // 60m close 98 => low pivot at 120
        99.0, 96.5, 97.0, 98.0, // 15m low at 150 confirms long
        98.5, 99.0, 99.2, 99.5, // 60m close 99.5 => high pivot at 240
    ];
    let minutes = block_candles(&blocks);

    let timeframes = vec![
        TimeframeConfig::new(60, TimeframeRole::Primary),
        TimeframeConfig::new(15, TimeframeRole::Confirmation),
    ];
    let config = CascadeConfig {
        min_timeframes_required: 2,
        confirmation_windows: vec![ConfirmationHorizon {
            interval_minutes: 60,
            window_minutes: 120,
        }],
        ..CascadeConfig::default()
    };

    let run = run_cascade(&minutes, timeframes, config);
    let (executions, windows) = (run.executions, run.windows);

    assert_eq!(executions.len(), 2);

    // Long window opened at 120 executes on the 15m confirmation at 150,
    // at the confirming pivot's price.
    assert_eq!(executions[0].signal, Signal::Long);
    assert_eq!(executions[0].time, 150 * MINUTE_MS);
    assert!((executions[0].price - 96.5).abs() < 1e-9);
    assert_eq!(executions[0].confirmed_timeframes, 2);

    // Short window opened at 240 is confirmed at open by the 15m high pivot
    // closing on the same minute, back-filled within the proximity bound.
    assert_eq!(executions[1].signal, Signal::Short);
    assert_eq!(executions[1].time, 240 * MINUTE_MS);
    assert!((executions[1].price - 99.5).abs() < 1e-9);

    assert_eq!(windows.len(), 2);
    assert!(windows.iter().all(|w| w.status == WindowStatus::Executed));
    assert_eq!(windows[0].execution_time, Some(150 * MINUTE_MS));
}

/// Deterministic pseudo-random walk of minute candles via a simple LCG.
fn make_minute_candles(n: usize) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(n);
    let mut price = 100.0;
    for i in 0..n {
        let seed = (i as u64)
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let change = ((seed >> 33) % 200) as f64 / 100.0 - 1.0;
        price = (price + change).max(10.0);
        candles.push(flat_candle(i as i64 + 1, price));
    }
    candles
}

#[test]
fn execution_invariants_on_random_walk() {
    let minutes = make_minute_candles(3000);
    let timeframes = vec![
        TimeframeConfig::new(60, TimeframeRole::Primary),
        TimeframeConfig::new(15, TimeframeRole::Confirmation),
        TimeframeConfig::new(30, TimeframeRole::Confirmation),
    ];
    let config = CascadeConfig {
        min_timeframes_required: 2,
        confirmation_windows: vec![ConfirmationHorizon {
            interval_minutes: 60,
            window_minutes: 240,
        }],
        ..CascadeConfig::default()
    };

    let run = run_cascade(&minutes, timeframes, config);
    let (executions, windows) = (run.executions, run.windows);
    assert!(!executions.is_empty(), "walk produced no executions");

    for exec in &executions {
        let window = windows
            .iter()
            .find(|w| w.id == exec.window_id)
            .expect("execution references a window");
        assert_eq!(window.status, WindowStatus::Executed);
        assert_eq!(window.signal(), exec.signal);
        assert!(exec.confirmed_timeframes >= 2);
        assert!(exec.time >= window.primary_pivot.time);
        assert!(exec.time <= window.window_end_time);
    }

    for window in &windows {
        // One confirmation per timeframe, never the primary's own interval.
        let mut seen = std::collections::BTreeSet::new();
        for c in &window.confirmations {
            assert_ne!(c.interval_minutes, window.primary_interval_minutes);
            assert!(seen.insert(c.interval_minutes), "duplicate confirmation");
            assert!(c.confirm_time >= window.open_time);
            // Confirmation pivots match the window's direction.
            assert_eq!(c.pivot.signal, window.signal());
        }
        match window.status {
            WindowStatus::Executed => {
                assert!(window.execution_time.is_some());
                assert!(window.execution_price.is_some());
                assert!(window.confirmed_timeframes() >= 2);
            }
            WindowStatus::Expired => {
                assert!(window.execution_time.is_none());
                assert!(window.confirmed_timeframes() < 2);
            }
            WindowStatus::Active => {
                // Only windows whose horizon outlived the feed may remain.
                assert!(window.window_end_time >= run.last_event_time);
            }
        }
    }
}
