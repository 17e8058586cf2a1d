//! Serializable run configuration with content-addressed run ids.
//!
//! A [`RunConfig`] captures everything needed to reproduce a backtest: the
//! data source, the timeframe stack, the cascade settings, and the full
//! simulator parameter set. Two configs that serialize to the same canonical
//! JSON share a [`RunId`] and can share cached results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pivotlab_core::cascade::CascadeConfig;
use pivotlab_core::domain::TimeframeConfig;
use pivotlab_core::sim::{SimulatorConfig, SimulatorError};

use crate::sweep::ParamGrid;

/// Unique identifier for a backtest run (blake3 hash of the config JSON).
pub type RunId = String;

/// Errors raised while loading or validating a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("base interval must be positive, got {0}m")]
    ZeroBaseInterval(u32),

    #[error("no timeframes configured")]
    NoTimeframes,

    #[error("duplicate timeframe interval {0}m")]
    DuplicateInterval(u32),

    #[error("timeframe {interval_minutes}m is not a multiple of the {base_minutes}m base interval")]
    IntervalNotMultiple {
        base_minutes: u32,
        interval_minutes: u32,
    },

    #[error("timeframe {interval_minutes}m: {reason}")]
    InvalidTimeframe {
        interval_minutes: u32,
        reason: String,
    },

    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

/// Where entry signals come from.
///
/// `Pivot` forwards every accepted pivot straight to the simulator;
/// `Cascade` routes pivots through the window manager and only forwards
/// confirmed executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalMode {
    Pivot,
    #[default]
    Cascade,
}

/// Base-resolution candle source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataConfig {
    /// Load from a CSV file with header `time,open,high,low,close,volume`.
    Csv { path: PathBuf },

    /// Deterministic seeded random walk; no file I/O involved.
    Synthetic {
        #[serde(default = "default_synthetic_bars")]
        bars: usize,
        #[serde(default = "default_synthetic_seed")]
        seed: u64,
        #[serde(default = "default_start_price")]
        start_price: f64,
    },
}

fn default_synthetic_bars() -> usize {
    10_080
}

fn default_synthetic_seed() -> u64 {
    7
}

fn default_start_price() -> f64 {
    100.0
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::Synthetic {
            bars: default_synthetic_bars(),
            seed: default_synthetic_seed(),
            start_price: default_start_price(),
        }
    }
}

fn default_base_interval() -> u32 {
    1
}

/// Complete configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Resolution of the input candles, in minutes.
    #[serde(default = "default_base_interval")]
    pub base_interval_minutes: u32,

    #[serde(default)]
    pub mode: SignalMode,

    #[serde(default)]
    pub data: DataConfig,

    /// Timeframe stack, detector knobs included. Order is preserved and
    /// determines same-timestamp processing order in the run loop.
    pub timeframes: Vec<TimeframeConfig>,

    #[serde(default)]
    pub cascade: CascadeConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Optional sweep grid declaration. Stripped from generated combination
    /// configs so it never perturbs their run ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<ParamGrid>,
}

impl RunConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(raw)?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Structural validation: timeframe stack sanity plus the simulator's
    /// own parameter checks. Cascade wiring (primary role present, horizons
    /// configured) is validated where the manager is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_interval_minutes == 0 {
            return Err(ConfigError::ZeroBaseInterval(0));
        }
        if self.timeframes.is_empty() {
            return Err(ConfigError::NoTimeframes);
        }
        let mut seen: Vec<u32> = Vec::with_capacity(self.timeframes.len());
        for tf in &self.timeframes {
            if seen.contains(&tf.interval_minutes) {
                return Err(ConfigError::DuplicateInterval(tf.interval_minutes));
            }
            seen.push(tf.interval_minutes);
            if tf.interval_minutes == 0 || tf.interval_minutes % self.base_interval_minutes != 0 {
                return Err(ConfigError::IntervalNotMultiple {
                    base_minutes: self.base_interval_minutes,
                    interval_minutes: tf.interval_minutes,
                });
            }
            if !tf.min_swing_pct.is_finite() || tf.min_swing_pct < 0.0 {
                return Err(ConfigError::InvalidTimeframe {
                    interval_minutes: tf.interval_minutes,
                    reason: format!("min_swing_pct must be finite and >= 0, got {}", tf.min_swing_pct),
                });
            }
            if !tf.weight.is_finite() || tf.weight < 0.0 {
                return Err(ConfigError::InvalidTimeframe {
                    interval_minutes: tf.interval_minutes,
                    reason: format!("weight must be finite and >= 0, got {}", tf.weight),
                });
            }
        }
        self.simulator.validate()?;
        Ok(())
    }

    /// Deterministic content hash of this configuration.
    ///
    /// Two runs with identical configs share a `RunId` and can share cached
    /// results. The optional sweep declaration is part of the hash, which is
    /// why generated combinations strip it.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
