//! Candle loading, validation, and synthetic generation.
//!
//! The core assumes strictly ascending, sane input and does not defend
//! itself; this layer is the gatekeeper. CSV files are validated row by row
//! (ascending close times, OHLC sanity) and rejected before anything reaches
//! a detector. Synthetic data is a seeded random walk for demos and tests;
//! results produced from it are tagged in the run manifest.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pivotlab_core::domain::{Candle, MINUTE_MS};

/// Close time of the first synthetic candle: 2020-01-01 00:01:00 UTC.
const SYNTHETIC_EPOCH_MS: i64 = 1_577_836_800_000 + MINUTE_MS;

/// Errors from the data layer.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: candle failed sanity check (high >= low, extremes bracket open/close, positive prices)")]
    InsaneCandle { row: usize },

    #[error("row {row}: close time {time} does not advance past previous {prev}")]
    OutOfOrder { row: usize, prev: i64, time: i64 },

    #[error("{path} contains no candles")]
    Empty { path: String },
}

/// One CSV row. Column order matches the header
/// `time,open,high,low,close,volume`; `time` is epoch milliseconds (UTC).
#[derive(Debug, Serialize, Deserialize)]
struct CandleRow {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CandleRow> for Candle {
    fn from(row: CandleRow) -> Self {
        Candle {
            time: row.time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

impl From<&Candle> for CandleRow {
    fn from(c: &Candle) -> Self {
        CandleRow {
            time: c.time,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        }
    }
}

/// Loads and validates a candle CSV.
///
/// Rejects the whole file on the first unsane or out-of-order row; an empty
/// file is also an error. Row numbers in errors are 1-based data rows.
pub fn load_candles_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>, DataError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut candles: Vec<Candle> = Vec::new();
    for (i, record) in reader.deserialize::<CandleRow>().enumerate() {
        let row = i + 1;
        let candle: Candle = record?.into();
        if !candle.is_sane() {
            return Err(DataError::InsaneCandle { row });
        }
        if let Some(prev) = candles.last() {
            if candle.time <= prev.time {
                return Err(DataError::OutOfOrder {
                    row,
                    prev: prev.time,
                    time: candle.time,
                });
            }
        }
        candles.push(candle);
    }

    if candles.is_empty() {
        return Err(DataError::Empty {
            path: path.display().to_string(),
        });
    }
    log::debug!("loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

/// Writes candles as CSV with the standard header.
pub fn write_candles_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<(), DataError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut writer = csv::Writer::from_writer(file);
    for candle in candles {
        writer.serialize(CandleRow::from(candle))?;
    }
    writer.flush().map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Generates a deterministic random-walk candle series.
///
/// Same `(bars, seed, start_price, interval)` always produces the same
/// series. The walk runs around the clock with no session gaps, stamped from
/// a fixed 2020-01-01 epoch so generated files are reproducible.
pub fn generate_synthetic_candles(
    bars: usize,
    seed: u64,
    start_price: f64,
    interval_minutes: u32,
) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let interval_ms = i64::from(interval_minutes.max(1)) * MINUTE_MS;

    let mut out = Vec::with_capacity(bars);
    let mut price = start_price.max(f64::MIN_POSITIVE);
    for i in 0..bars {
        let step: f64 = rng.gen_range(-0.003..0.003);
        let open = price;
        let close = (price * (1.0 + step)).max(f64::MIN_POSITIVE);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.001));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.001));
        let volume = rng.gen_range(1.0..100.0_f64);

        out.push(Candle {
            time: SYNTHETIC_EPOCH_MS + i as i64 * interval_ms,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }
    out
}

/// Deterministic blake3 fingerprint over every candle's time and OHLCV.
pub fn dataset_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.time.to_le_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        hasher.update(&c.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
