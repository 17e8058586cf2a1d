//! PivotLab Core — candle aggregation, pivot detection, cascade windows,
//! trade simulation.
//!
//! This crate contains the deterministic heart of the signal engine:
//! - Domain types (candles, pivots, timeframes, trades, cascade windows)
//! - Minute-candle aggregation into coarser timeframes (complete buckets only)
//! - Swing pivot detection with lookback, swing-size, and spacing gates
//! - Multi-timeframe cascade confirmation with per-window state machines
//! - Trade simulation with slippage, fees, funding, and trailing exits
//!
//! Everything here is pure computation over in-memory data. File loading,
//! caching, and parallel sweeps live in the runner crate.

pub mod aggregate;
pub mod cascade;
pub mod domain;
pub mod pivots;
pub mod sim;
