//! Backtest orchestration: wires the aggregation, detection, cascade, and
//! simulation layers into one bar-by-bar replay loop.
//!
//! Two entry points:
//! - [`run_single_backtest`] resolves the configured data source (CSV or
//!   synthetic) and runs.
//! - [`run_backtest_from_candles`] runs on a pre-loaded candle slice with no
//!   I/O; the parameter sweep drives this one so every combination shares a
//!   single in-memory dataset.
//!
//! Per base bar the loop advances the cascade clock, lets the simulator
//! monitor exits and accrue funding, then pushes any aggregated candles
//! closing at that bar through the per-timeframe detectors. Monitoring
//! before entries means a trade opened at bar t is first exit-checked at
//! t+1, never on its own signal bar.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pivotlab_core::aggregate::AggregateError;
use pivotlab_core::cascade::{CascadeError, CascadeManager, CascadeWindow};
use pivotlab_core::domain::{Candle, Trade};
use pivotlab_core::pivots::{DetectorConfig, PivotDetector};
use pivotlab_core::sim::{SimulatorError, TradeSimulator};

use crate::cache::CandleCache;
use crate::config::{ConfigError, DataConfig, RunConfig, RunId, SignalMode};
use crate::data::{dataset_hash, generate_synthetic_candles, load_candles_csv, DataError};
use crate::metrics::{realized_equity_curve, PerformanceMetrics};

/// Current `BacktestResult` serialization schema.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Errors from the run orchestration layer.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),

    #[error("simulator error: {0}")]
    Simulator(#[from] SimulatorError),

    #[error("no candles to run on")]
    NoCandles,
}

/// Accepted pivot count for one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotCount {
    pub interval_minutes: u32,
    pub count: usize,
}

/// Everything a finished run produced, serializable as one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for persisted artifacts. Bump on breaking changes.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    pub run_id: RunId,

    /// Echo of the configuration that produced this result.
    pub config: RunConfig,

    pub metrics: PerformanceMetrics,

    /// Closed trades in exit order.
    pub trades: Vec<Trade>,

    /// Final state of every cascade window (empty in pivot mode).
    pub windows: Vec<CascadeWindow>,

    /// Realized equity after each close, starting at initial capital.
    pub equity_curve: Vec<f64>,

    /// Accepted pivots per timeframe, in configuration order.
    pub pivot_counts: Vec<PivotCount>,

    /// Signals actually forwarded to the simulator (pivots in pivot mode,
    /// cascade executions in cascade mode).
    pub signal_count: usize,

    pub bar_count: usize,
    pub start_time: i64,
    pub end_time: i64,

    pub dataset_hash: String,
    pub synthetic_data: bool,
}

/// Resolves the configured data source and runs a single backtest.
pub fn run_single_backtest(config: &RunConfig) -> Result<BacktestResult, RunError> {
    let candles = match &config.data {
        DataConfig::Csv { path } => load_candles_csv(path)?,
        DataConfig::Synthetic {
            bars,
            seed,
            start_price,
        } => generate_synthetic_candles(*bars, *seed, *start_price, config.base_interval_minutes),
    };
    run_backtest_from_candles(config, &candles)
}

/// One timeframe's aggregated series, replay cursor, and detector.
struct TimeframeLane {
    interval_minutes: u32,
    series: Vec<Candle>,
    next: usize,
    detector: PivotDetector,
    pivot_count: usize,
}

/// Runs a backtest over a pre-loaded base-resolution candle slice.
///
/// Pure with respect to I/O, so sweep workers can evaluate combinations in
/// parallel against one shared dataset.
pub fn run_backtest_from_candles(
    config: &RunConfig,
    candles: &[Candle],
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    if candles.is_empty() {
        return Err(RunError::NoCandles);
    }

    let mut cache = CandleCache::with_capacity(
        config.base_interval_minutes,
        config.timeframes.len().max(1),
    );
    let mut lanes: Vec<TimeframeLane> = Vec::with_capacity(config.timeframes.len());
    for tf in &config.timeframes {
        let series = cache.series(candles, tf.interval_minutes)?.to_vec();
        lanes.push(TimeframeLane {
            interval_minutes: tf.interval_minutes,
            series,
            next: 0,
            detector: PivotDetector::new(DetectorConfig::from(tf)),
            pivot_count: 0,
        });
    }

    let mut manager = match config.mode {
        SignalMode::Cascade => Some(CascadeManager::new(
            config.timeframes.clone(),
            config.cascade.clone(),
        )?),
        SignalMode::Pivot => None,
    };
    let mut simulator = TradeSimulator::new(config.simulator.clone())?;

    log::debug!(
        "replaying {} bars across {} timeframes ({:?} mode)",
        candles.len(),
        lanes.len(),
        config.mode
    );

    let mut signal_count = 0usize;
    for bar in candles {
        if let Some(manager) = manager.as_mut() {
            manager.advance_to(bar.time);
        }
        simulator.process_bar(bar);

        for lane in &mut lanes {
            while lane.next < lane.series.len() && lane.series[lane.next].time <= bar.time {
                let closed = lane.series[lane.next];
                lane.next += 1;
                let Some(pivot) = lane.detector.push(closed) else {
                    continue;
                };
                lane.pivot_count += 1;
                match manager.as_mut() {
                    Some(manager) => {
                        for execution in manager.on_pivot(lane.interval_minutes, pivot) {
                            simulator.on_signal(
                                execution.signal,
                                execution.time,
                                execution.price,
                                Some(execution.window_id),
                            );
                            signal_count += 1;
                        }
                    }
                    None => {
                        simulator.on_signal(pivot.signal, pivot.time, pivot.price, None);
                        signal_count += 1;
                    }
                }
            }
        }
    }

    simulator.finish();

    let windows = manager.map(CascadeManager::into_windows).unwrap_or_default();
    let pivot_counts = lanes
        .iter()
        .map(|lane| PivotCount {
            interval_minutes: lane.interval_minutes,
            count: lane.pivot_count,
        })
        .collect();
    let (trades, final_capital) = simulator.into_parts();
    let initial_capital = config.simulator.initial_capital;
    let metrics = PerformanceMetrics::compute(&trades, initial_capital);
    let equity_curve = realized_equity_curve(&trades, initial_capital);

    log::info!(
        "run complete: {} bars, {} signals, {} trades, capital {:.2} -> {:.2}",
        candles.len(),
        signal_count,
        trades.len(),
        initial_capital,
        final_capital
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        config: config.clone(),
        metrics,
        trades,
        windows,
        equity_curve,
        pivot_counts,
        signal_count,
        bar_count: candles.len(),
        start_time: candles[0].time,
        end_time: candles[candles.len() - 1].time,
        dataset_hash: dataset_hash(candles),
        synthetic_data: matches!(config.data, DataConfig::Synthetic { .. }),
    })
}
