//! PivotLab CLI — synthetic data, backtests, sweeps, and cache management.
//!
//! Commands:
//! - `generate` — write a deterministic synthetic candle CSV
//! - `run` — execute one backtest from a TOML config file
//! - `sweep` — evaluate the config's parameter grid and rank the results
//! - `cache status` — report result-cache entry count and size
//! - `cache clear` — remove cached results

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use pivotlab_runner::config::{DataConfig, RunConfig};
use pivotlab_runner::data::{generate_synthetic_candles, load_candles_csv, write_candles_csv};
use pivotlab_runner::export::{export_sweep_csv, save_artifacts};
use pivotlab_runner::runner::{run_single_backtest, BacktestResult};
use pivotlab_runner::sweep::{ParamSweep, RankMetric, SweepResults};
use pivotlab_runner::ResultCache;

#[derive(Parser)]
#[command(
    name = "pivotlab",
    about = "PivotLab CLI — multi-timeframe pivot cascade backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a deterministic synthetic candle CSV.
    Generate {
        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,

        /// Number of bars to generate.
        #[arg(long, default_value_t = 10_080)]
        bars: usize,

        /// Random-walk seed.
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// First close price.
        #[arg(long, default_value_t = 100.0)]
        start_price: f64,

        /// Bar interval in minutes.
        #[arg(long, default_value_t = 1)]
        interval_minutes: u32,
    },
    /// Execute one backtest from a TOML config file.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Candle CSV overriding the config's data source.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output directory for the artifact set.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Evaluate the config's [sweep] grid and rank the combinations.
    Sweep {
        /// Path to a TOML run config carrying a [sweep] section.
        #[arg(long)]
        config: PathBuf,

        /// Candle CSV overriding the config's data source.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Metric to rank by: total_pnl, return_pct, win_rate, profit_factor.
        #[arg(long, default_value = "return_pct")]
        metric: RankMetric,

        /// Number of top combinations to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Evaluate combinations on one thread.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Skip the on-disk result cache.
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Result cache directory.
        #[arg(long, default_value = ".pivotlab-cache")]
        cache_dir: PathBuf,

        /// Write the full ranking table to this CSV path.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Result cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report entry count and total size.
    Status {
        /// Result cache directory.
        #[arg(long, default_value = ".pivotlab-cache")]
        cache_dir: PathBuf,
    },
    /// Remove all cached results.
    Clear {
        /// Result cache directory.
        #[arg(long, default_value = ".pivotlab-cache")]
        cache_dir: PathBuf,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            out,
            bars,
            seed,
            start_price,
            interval_minutes,
        } => run_generate(&out, bars, seed, start_price, interval_minutes),
        Commands::Run {
            config,
            data,
            output_dir,
        } => run_backtest_cmd(&config, data, &output_dir),
        Commands::Sweep {
            config,
            data,
            metric,
            top,
            sequential,
            no_cache,
            cache_dir,
            export,
        } => run_sweep_cmd(
            &config, data, metric, top, sequential, no_cache, &cache_dir, export,
        ),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clear { cache_dir, confirm } => run_cache_clear(&cache_dir, confirm),
        },
    }
}

fn run_generate(
    out: &Path,
    bars: usize,
    seed: u64,
    start_price: f64,
    interval_minutes: u32,
) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be at least 1");
    }
    if start_price <= 0.0 {
        bail!("--start-price must be positive");
    }

    let candles = generate_synthetic_candles(bars, seed, start_price, interval_minutes);
    write_candles_csv(out, &candles)?;

    println!(
        "Wrote {} bars ({}m) to {}",
        candles.len(),
        interval_minutes.max(1),
        out.display()
    );
    println!(
        "Range: {} to {}",
        utc_label(candles[0].time),
        utc_label(candles[candles.len() - 1].time)
    );
    Ok(())
}

fn load_run_config(path: &Path, data_override: Option<PathBuf>) -> Result<RunConfig> {
    let mut config = RunConfig::load(path)?;
    if let Some(data_path) = data_override {
        config.data = DataConfig::Csv { path: data_path };
    }
    Ok(config)
}

fn run_backtest_cmd(config_path: &Path, data: Option<PathBuf>, output_dir: &Path) -> Result<()> {
    let config = load_run_config(config_path, data)?;
    let result = run_single_backtest(&config)?;

    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_sweep_cmd(
    config_path: &Path,
    data: Option<PathBuf>,
    metric: RankMetric,
    top: usize,
    sequential: bool,
    no_cache: bool,
    cache_dir: &Path,
    export: Option<PathBuf>,
) -> Result<()> {
    let config = load_run_config(config_path, data)?;
    let Some(grid) = config.sweep.clone() else {
        bail!(
            "{} has no [sweep] section to expand",
            config_path.display()
        );
    };

    let candles = match &config.data {
        DataConfig::Csv { path } => load_candles_csv(path)?,
        DataConfig::Synthetic {
            bars,
            seed,
            start_price,
        } => generate_synthetic_candles(*bars, *seed, *start_price, config.base_interval_minutes),
    };

    let mut sweep = ParamSweep::new(&candles).with_parallelism(!sequential);
    if !no_cache {
        sweep = sweep.with_cache(ResultCache::new(cache_dir)?);
    }

    println!(
        "Sweeping {} combinations over {} bars...",
        grid.size(),
        candles.len()
    );
    let results = sweep.sweep(&grid, &config);
    print_sweep_table(&results, metric, top);

    if let Some(path) = export {
        std::fs::write(&path, export_sweep_csv(&results)?)
            .with_context(|| format!("writing sweep CSV to {}", path.display()))?;
        println!("Full table saved to: {}", path.display());
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ResultCache::new(cache_dir)?;
    let entries = cache.len()?;
    if entries == 0 {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!("Entries: {entries}");
    println!("Total size: {}", format_size(dir_size(cache_dir)));
    Ok(())
}

fn run_cache_clear(cache_dir: &Path, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ResultCache::new(cache_dir)?;
    let entries = cache.len()?;
    if entries == 0 {
        println!("Cache is already empty.");
        return Ok(());
    }

    println!(
        "{entries} cached result(s), {} total.",
        format_size(dir_size(cache_dir))
    );
    if !confirm {
        println!();
        println!("Dry run — pass --confirm to actually delete.");
        return Ok(());
    }

    cache.clear()?;
    println!("Done. Removed {entries} result(s).");
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn utc_label(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn short_id(run_id: &str) -> &str {
    run_id.get(..12).unwrap_or(run_id)
}

fn print_summary(result: &BacktestResult) {
    println!();
    println!("=== Backtest Result ===");
    println!("Run ID:         {}", short_id(&result.run_id));
    println!("Mode:           {:?}", result.config.mode);
    println!(
        "Period:         {} to {}",
        utc_label(result.start_time),
        utc_label(result.end_time)
    );
    println!("Bars:           {}", result.bar_count);

    let pivot_parts: Vec<String> = result
        .pivot_counts
        .iter()
        .map(|c| format!("{}m: {}", c.interval_minutes, c.count))
        .collect();
    println!("Pivots:         {}", pivot_parts.join(", "));
    if !result.windows.is_empty() {
        let executed = result
            .windows
            .iter()
            .filter(|w| w.execution_time.is_some())
            .count();
        println!(
            "Windows:        {} ({} executed)",
            result.windows.len(),
            executed
        );
    }
    println!("Signals:        {}", result.signal_count);
    println!("Trades:         {}", result.metrics.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Total PnL:      {:.2}", result.metrics.total_pnl);
    println!("Return:         {:.2}%", result.metrics.return_pct);
    println!(
        "Win Rate:       {:.1}%",
        result.metrics.win_rate * 100.0
    );
    println!("Profit Factor:  {:.2}", result.metrics.profit_factor);
    println!(
        "Avg Win/Loss:   {:.2} / {:.2}",
        result.metrics.avg_win, result.metrics.avg_loss
    );
    println!("Max Drawdown:   {:.2}%", result.metrics.max_drawdown_pct);
    println!(
        "Fees/Funding:   {:.2} / {:.2}",
        result.metrics.total_fees, result.metrics.total_funding
    );
    println!("Final Capital:  {:.2}", result.metrics.final_capital);
    if !result.metrics.exit_reasons.is_empty() {
        let exits: Vec<String> = result
            .metrics
            .exit_reasons
            .iter()
            .map(|(reason, count)| format!("{reason}: {count}"))
            .collect();
        println!("Exits:          {}", exits.join(", "));
    }
    if result.synthetic_data {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_sweep_table(results: &SweepResults, metric: RankMetric, top: usize) {
    println!();
    println!(
        "Evaluated {} combinations ({} failed).",
        results.len(),
        results.failure_count()
    );

    for outcome in results.failed() {
        if let Err(message) = &outcome.result {
            eprintln!("  {} failed: {message}", short_id(&outcome.run_id));
        }
    }

    let ranked = results.top_n(metric, top);
    if ranked.is_empty() {
        println!("No successful combinations to rank.");
        return;
    }

    println!();
    println!(
        "{:<5} {:<14} {:>6} {:>6} {:>5} {:>7} {:>12}",
        "Rank", "Run", "TP%", "SL%", "Lev", "Trades", metric.to_string()
    );
    println!("{}", "-".repeat(60));
    for (rank, outcome) in ranked.iter().enumerate() {
        let Ok(result) = &outcome.result else {
            continue;
        };
        println!(
            "{:<5} {:<14} {:>6.2} {:>6.2} {:>5.1} {:>7} {:>12.2}",
            rank + 1,
            short_id(&outcome.run_id),
            outcome.config.simulator.take_profit_pct,
            outcome.config.simulator.stop_loss_pct,
            outcome.config.simulator.leverage,
            result.metrics.trade_count,
            metric.value(&result.metrics)
        );
    }
}
