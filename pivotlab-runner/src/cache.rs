//! Explicit caches owned by the harness.
//!
//! Two caches, both with visible ownership and eviction:
//! - [`CandleCache`] memoizes aggregated candle series per target interval,
//!   capacity-bounded with oldest-first eviction.
//! - [`ResultCache`] persists `BacktestResult` JSON keyed by run id, so a
//!   sweep re-run skips combinations it has already evaluated.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pivotlab_core::aggregate::{aggregate_candles, AggregateError};
use pivotlab_core::domain::Candle;

use crate::config::RunId;
use crate::runner::BacktestResult;

/// Default number of aggregated series kept before eviction kicks in.
pub const DEFAULT_SERIES_CAPACITY: usize = 16;

/// Memoizes aggregation results per target interval.
///
/// The cache does not own the base series; callers pass it on each lookup,
/// which keeps one cache usable against exactly one dataset. Eviction drops
/// the oldest inserted series first.
#[derive(Debug, Clone)]
pub struct CandleCache {
    base_minutes: u32,
    capacity: usize,
    series: HashMap<u32, Vec<Candle>>,
    insertion_order: VecDeque<u32>,
}

impl CandleCache {
    pub fn new(base_minutes: u32) -> Self {
        Self::with_capacity(base_minutes, DEFAULT_SERIES_CAPACITY)
    }

    pub fn with_capacity(base_minutes: u32, capacity: usize) -> Self {
        Self {
            base_minutes,
            capacity: capacity.max(1),
            series: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Returns the aggregated series for `target_minutes`, computing and
    /// caching it on first request.
    pub fn series(
        &mut self,
        base: &[Candle],
        target_minutes: u32,
    ) -> Result<&[Candle], AggregateError> {
        if !self.series.contains_key(&target_minutes) {
            let aggregated = aggregate_candles(base, self.base_minutes, target_minutes)?;
            log::debug!(
                "aggregated {} base candles into {} {target_minutes}m candles",
                base.len(),
                aggregated.len()
            );
            if self.series.len() >= self.capacity {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.series.remove(&oldest);
                }
            }
            self.insertion_order.push_back(target_minutes);
            self.series.insert(target_minutes, aggregated);
        }
        Ok(self
            .series
            .get(&target_minutes)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    pub fn contains(&self, target_minutes: u32) -> bool {
        self.series.contains_key(&target_minutes)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn clear(&mut self) {
        self.series.clear();
        self.insertion_order.clear();
    }
}

/// File-backed cache of backtest results, one JSON file per run id.
#[derive(Debug, Clone)]
pub struct ResultCache {
    cache_dir: PathBuf,
}

impl ResultCache {
    /// Opens (creating if needed) a cache directory.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir).with_context(|| {
            format!("failed to create result cache dir {}", cache_dir.display())
        })?;
        Ok(Self { cache_dir })
    }

    pub fn contains(&self, run_id: &RunId) -> bool {
        self.result_path(run_id).exists()
    }

    /// Retrieves a cached result, `None` on miss.
    pub fn get(&self, run_id: &RunId) -> Result<Option<BacktestResult>> {
        let path = self.result_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read cached result {}", path.display()))?;
        let result: BacktestResult =
            serde_json::from_str(&json).context("failed to deserialize cached result")?;
        Ok(Some(result))
    }

    pub fn put(&self, result: &BacktestResult) -> Result<()> {
        let path = self.result_path(&result.run_id);
        let json =
            serde_json::to_string_pretty(result).context("failed to serialize result")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write cached result {}", path.display()))?;
        Ok(())
    }

    pub fn remove(&self, run_id: &RunId) -> Result<()> {
        let path = self.result_path(run_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove cached result {}", path.display()))?;
        }
        Ok(())
    }

    /// Deletes every cached result, leaving other files alone.
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let count = std::fs::read_dir(&self.cache_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let path = entry.path();
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json")
            })
            .count();
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn result_path(&self, run_id: &RunId) -> PathBuf {
        self.cache_dir.join(format!("{run_id}.json"))
    }
}
