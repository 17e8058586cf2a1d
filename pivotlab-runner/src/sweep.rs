//! Parameter sweep: expand a grid of parameter values into concrete run
//! configurations, evaluate each against a shared dataset, and rank the
//! outcomes.
//!
//! Combinations are independent, so evaluation runs on rayon's thread pool
//! by default. A failed combination records its error string and never
//! aborts the sweep. With a [`ResultCache`] attached, combinations whose
//! run id is already cached are served from disk.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use pivotlab_core::domain::Candle;

use crate::cache::ResultCache;
use crate::config::{RunConfig, RunId};
use crate::metrics::PerformanceMetrics;
use crate::runner::{run_backtest_from_candles, BacktestResult};

/// Value lists for the swept parameters. An empty list keeps the base
/// configuration's value for that axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(default)]
    pub take_profit_pcts: Vec<f64>,
    #[serde(default)]
    pub stop_loss_pcts: Vec<f64>,
    #[serde(default)]
    pub leverages: Vec<f64>,
    /// Applied to every timeframe.
    #[serde(default)]
    pub min_swing_pcts: Vec<f64>,
    /// Applied to every timeframe.
    #[serde(default)]
    pub lookbacks: Vec<usize>,
    #[serde(default)]
    pub min_timeframes: Vec<usize>,
}

fn effective<T: Copy>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

impl ParamGrid {
    /// Number of combinations the grid expands to, before validity
    /// filtering. Empty axes count as one.
    pub fn size(&self) -> usize {
        [
            self.take_profit_pcts.len(),
            self.stop_loss_pcts.len(),
            self.leverages.len(),
            self.min_swing_pcts.len(),
            self.lookbacks.len(),
            self.min_timeframes.len(),
        ]
        .iter()
        .map(|&n| n.max(1))
        .product()
    }

    /// Expands the grid against a base configuration. Combinations that
    /// fail validation are dropped. Every produced configuration has its
    /// own `sweep` declaration cleared so run ids depend only on the
    /// effective parameters.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<RunConfig> {
        let base_swing = base
            .timeframes
            .first()
            .map(|tf| tf.min_swing_pct)
            .unwrap_or(0.0);
        let base_lookback = base.timeframes.first().map(|tf| tf.lookback).unwrap_or(2);

        let take_profits = effective(&self.take_profit_pcts, base.simulator.take_profit_pct);
        let stop_losses = effective(&self.stop_loss_pcts, base.simulator.stop_loss_pct);
        let leverages = effective(&self.leverages, base.simulator.leverage);
        let min_swings = effective(&self.min_swing_pcts, base_swing);
        let lookbacks = effective(&self.lookbacks, base_lookback);
        let min_timeframes = effective(&self.min_timeframes, base.cascade.min_timeframes_required);

        let mut configs = Vec::with_capacity(self.size());
        for &take_profit in &take_profits {
            for &stop_loss in &stop_losses {
                for &leverage in &leverages {
                    for &min_swing in &min_swings {
                        for &lookback in &lookbacks {
                            for &min_required in &min_timeframes {
                                let mut combo = base.clone();
                                combo.sweep = None;
                                combo.simulator.take_profit_pct = take_profit;
                                combo.simulator.stop_loss_pct = stop_loss;
                                combo.simulator.leverage = leverage;
                                for tf in &mut combo.timeframes {
                                    tf.min_swing_pct = min_swing;
                                    tf.lookback = lookback;
                                }
                                combo.cascade.min_timeframes_required = min_required;
                                if combo.validate().is_ok() {
                                    configs.push(combo);
                                }
                            }
                        }
                    }
                }
            }
        }
        configs
    }
}

/// Metric a sweep ranks by. All rank descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    TotalPnl,
    ReturnPct,
    WinRate,
    ProfitFactor,
}

impl RankMetric {
    pub fn value(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            RankMetric::TotalPnl => metrics.total_pnl,
            RankMetric::ReturnPct => metrics.return_pct,
            RankMetric::WinRate => metrics.win_rate,
            RankMetric::ProfitFactor => metrics.profit_factor,
        }
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total_pnl" => Ok(RankMetric::TotalPnl),
            "return_pct" => Ok(RankMetric::ReturnPct),
            "win_rate" => Ok(RankMetric::WinRate),
            "profit_factor" => Ok(RankMetric::ProfitFactor),
            other => Err(format!(
                "unknown rank metric '{other}' (expected total_pnl, return_pct, win_rate, or profit_factor)"
            )),
        }
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RankMetric::TotalPnl => "total_pnl",
            RankMetric::ReturnPct => "return_pct",
            RankMetric::WinRate => "win_rate",
            RankMetric::ProfitFactor => "profit_factor",
        };
        f.write_str(name)
    }
}

/// One evaluated combination. `result` carries the error string when the
/// run failed.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub run_id: RunId,
    pub config: RunConfig,
    pub result: Result<BacktestResult, String>,
}

/// Drives grid evaluation over one shared candle slice.
pub struct ParamSweep<'a> {
    candles: &'a [Candle],
    cache: Option<ResultCache>,
    parallel: bool,
}

impl<'a> ParamSweep<'a> {
    pub fn new(candles: &'a [Candle]) -> Self {
        Self {
            candles,
            cache: None,
            parallel: true,
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Evaluates every combination of `grid` applied to `base`.
    /// Outcomes keep grid expansion order regardless of parallelism.
    pub fn sweep(&self, grid: &ParamGrid, base: &RunConfig) -> SweepResults {
        let configs = grid.generate_configs(base);
        log::info!(
            "sweeping {} combinations ({} declared, {})",
            configs.len(),
            grid.size(),
            if self.parallel {
                "parallel"
            } else {
                "sequential"
            }
        );

        let outcomes: Vec<SweepOutcome> = if self.parallel {
            configs
                .into_par_iter()
                .map(|config| self.evaluate(config))
                .collect()
        } else {
            configs
                .into_iter()
                .map(|config| self.evaluate(config))
                .collect()
        };

        SweepResults { outcomes }
    }

    fn evaluate(&self, config: RunConfig) -> SweepOutcome {
        let run_id = config.run_id();

        if let Some(cache) = &self.cache {
            match cache.get(&run_id) {
                Ok(Some(result)) => {
                    log::debug!("cache hit for {run_id}");
                    return SweepOutcome {
                        run_id,
                        config,
                        result: Ok(result),
                    };
                }
                Ok(None) => {}
                Err(err) => log::warn!("cache read failed for {run_id}: {err:#}"),
            }
        }

        match run_backtest_from_candles(&config, self.candles) {
            Ok(result) => {
                if let Some(cache) = &self.cache {
                    if let Err(err) = cache.put(&result) {
                        log::warn!("cache write failed for {run_id}: {err:#}");
                    }
                }
                SweepOutcome {
                    run_id,
                    config,
                    result: Ok(result),
                }
            }
            Err(err) => {
                log::warn!("combination {run_id} failed: {err}");
                SweepOutcome {
                    run_id,
                    config,
                    result: Err(err.to_string()),
                }
            }
        }
    }
}

/// All outcomes of one sweep, in grid expansion order.
#[derive(Debug, Clone)]
pub struct SweepResults {
    outcomes: Vec<SweepOutcome>,
}

impl SweepResults {
    pub fn all(&self) -> &[SweepOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    pub fn failed(&self) -> Vec<&SweepOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .collect()
    }

    /// Successful outcomes sorted descending by the given metric.
    pub fn sorted_by(&self, metric: RankMetric) -> Vec<&SweepOutcome> {
        let mut ranked: Vec<&SweepOutcome> = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .collect();
        ranked.sort_by(|a, b| {
            let va = a.result.as_ref().map(|r| metric.value(&r.metrics)).unwrap_or(f64::MIN);
            let vb = b.result.as_ref().map(|r| metric.value(&r.metrics)).unwrap_or(f64::MIN);
            vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    pub fn top_n(&self, metric: RankMetric, n: usize) -> Vec<&SweepOutcome> {
        let mut ranked = self.sorted_by(metric);
        ranked.truncate(n);
        ranked
    }

    pub fn best(&self, metric: RankMetric) -> Option<&SweepOutcome> {
        self.sorted_by(metric).into_iter().next()
    }
}
