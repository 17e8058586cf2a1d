//! Candle aggregation: base-resolution bars into coarser fixed buckets.
//!
//! Buckets are epoch-aligned on close timestamps: a base candle closing at
//! `t` belongs to the bucket closing at `ceil(t / target_ms) * target_ms`,
//! so a candle closing exactly on a boundary closes its own bucket. Only
//! buckets holding exactly N base candles are emitted; incomplete buckets
//! (gaps, the still-forming tail) are dropped without forward-fill.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Candle, MINUTE_MS};

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum AggregateError {
    #[error("target interval {target_minutes}m is not a positive multiple of base interval {base_minutes}m")]
    NotAMultiple {
        base_minutes: u32,
        target_minutes: u32,
    },
}

/// Close boundary of the bucket a close-stamped candle at `time` belongs to.
pub fn bucket_close(time: i64, target_ms: i64) -> i64 {
    let rem = time.rem_euclid(target_ms);
    if rem == 0 {
        time
    } else {
        time - rem + target_ms
    }
}

/// Aggregates an ordered base-resolution sequence into `target_minutes`
/// candles. Input order and sanity are the caller's responsibility.
///
/// The aggregated candle takes open from the first base candle, close from
/// the last, high/low from the bucket extremes, volume from the sum, and is
/// stamped at the bucket's close boundary. Output is ascending by bucket.
pub fn aggregate_candles(
    base: &[Candle],
    base_minutes: u32,
    target_minutes: u32,
) -> Result<Vec<Candle>, AggregateError> {
    if base_minutes == 0 || target_minutes == 0 || target_minutes % base_minutes != 0 {
        return Err(AggregateError::NotAMultiple {
            base_minutes,
            target_minutes,
        });
    }
    let per_bucket = (target_minutes / base_minutes) as usize;
    let target_ms = i64::from(target_minutes) * MINUTE_MS;

    let mut out = Vec::with_capacity(base.len() / per_bucket);
    let mut acc: Option<Bucket> = None;

    for candle in base {
        let boundary = bucket_close(candle.time, target_ms);
        match acc.as_mut() {
            Some(bucket) if bucket.boundary == boundary => bucket.absorb(candle),
            _ => {
                if let Some(done) = acc.take() {
                    done.emit(per_bucket, &mut out);
                }
                acc = Some(Bucket::start(boundary, candle));
            }
        }
    }
    if let Some(done) = acc.take() {
        done.emit(per_bucket, &mut out);
    }

    Ok(out)
}

struct Bucket {
    boundary: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    count: usize,
}

impl Bucket {
    fn start(boundary: i64, c: &Candle) -> Self {
        Self {
            boundary,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            count: 1,
        }
    }

    fn absorb(&mut self, c: &Candle) {
        self.high = self.high.max(c.high);
        self.low = self.low.min(c.low);
        self.close = c.close;
        self.volume += c.volume;
        self.count += 1;
    }

    /// Emits only when the bucket holds exactly the expected candle count.
    fn emit(self, per_bucket: usize, out: &mut Vec<Candle>) {
        if self.count == per_bucket {
            out.push(Candle {
                time: self.boundary,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
                volume: self.volume,
            });
        }
    }
}
