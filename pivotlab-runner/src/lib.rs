//! Backtest harness around `pivotlab-core`.
//!
//! The core crate is pure computation; everything operational lives here:
//! - **config**: TOML run configuration with content-addressed run ids
//! - **data**: CSV candle loading and deterministic synthetic generation
//! - **cache**: aggregated-candle memoization and the on-disk result cache
//! - **metrics**: performance statistics over a closed trade list
//! - **runner**: the bar-by-bar replay producing a [`BacktestResult`]
//! - **sweep**: parameter grid evaluation on rayon's thread pool
//! - **export**: JSON/CSV persistence and per-run artifact directories

pub mod cache;
pub mod config;
pub mod data;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use cache::{CandleCache, ResultCache, DEFAULT_SERIES_CAPACITY};
pub use config::{ConfigError, DataConfig, RunConfig, RunId, SignalMode};
pub use data::{
    dataset_hash, generate_synthetic_candles, load_candles_csv, write_candles_csv, DataError,
};
pub use export::{
    export_equity_csv, export_json, export_sweep_csv, export_trades_csv, export_windows_csv,
    import_json, load_artifacts, save_artifacts,
};
pub use metrics::PerformanceMetrics;
pub use runner::{
    run_backtest_from_candles, run_single_backtest, BacktestResult, PivotCount, RunError,
    SCHEMA_VERSION,
};
pub use sweep::{ParamGrid, ParamSweep, RankMetric, SweepOutcome, SweepResults};
