//! Result persistence: JSON artifacts, CSV tables, and per-run artifact
//! directories.
//!
//! JSON is the durable format and carries a schema version; [`import_json`]
//! refuses files written by a newer schema. The CSV exporters render
//! spreadsheet-friendly tables and return the document as a `String` so
//! callers decide where it goes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::DateTime;

use pivotlab_core::cascade::{CascadeWindow, WindowStatus};
use pivotlab_core::domain::Trade;

use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::sweep::SweepResults;

/// Writes a full result as pretty-printed JSON.
pub fn export_json(result: &BacktestResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("serializing result to JSON")?;
    fs::write(path, json).with_context(|| format!("writing result to {}", path.display()))
}

/// Reads a result written by [`export_json`]. Files from a newer schema are
/// rejected rather than half-parsed.
pub fn import_json(path: &Path) -> Result<BacktestResult> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading result from {}", path.display()))?;
    let result: BacktestResult = serde_json::from_str(&json)
        .with_context(|| format!("parsing result JSON from {}", path.display()))?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

fn utc(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn window_status_str(status: WindowStatus) -> &'static str {
    match status {
        WindowStatus::Active => "active",
        WindowStatus::Executed => "executed",
        WindowStatus::Expired => "expired",
    }
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("finalizing CSV writer: {e}"))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Renders the trade table. Open trades leave the exit columns empty.
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "id",
        "direction",
        "source_window",
        "entry_time_utc",
        "entry_time_ms",
        "entry_price",
        "entry_slippage_pct",
        "size",
        "leverage",
        "take_profit_price",
        "stop_loss_price",
        "exit_time_utc",
        "exit_time_ms",
        "exit_price",
        "exit_reason",
        "pnl",
        "fees_paid",
        "funding_paid",
    ])?;
    for trade in trades {
        writer.write_record([
            trade.id.to_string(),
            trade.direction.to_string(),
            trade
                .source_window
                .map(|w| w.to_string())
                .unwrap_or_default(),
            utc(trade.entry_time),
            trade.entry_time.to_string(),
            format!("{:.6}", trade.entry_price),
            format!("{:.6}", trade.entry_slippage_pct),
            format!("{:.2}", trade.size),
            format!("{:.2}", trade.leverage),
            format!("{:.6}", trade.take_profit_price),
            format!("{:.6}", trade.stop_loss_price),
            trade.exit_time.map(utc).unwrap_or_default(),
            trade
                .exit_time
                .map(|t| t.to_string())
                .unwrap_or_default(),
            trade
                .exit_price
                .map(|p| format!("{p:.6}"))
                .unwrap_or_default(),
            trade
                .exit_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
            trade.pnl.map(|p| format!("{p:.2}")).unwrap_or_default(),
            format!("{:.2}", trade.fees_paid),
            format!("{:.2}", trade.funding_paid),
        ])?;
    }
    finish_csv(writer)
}

/// Renders the cascade window table.
pub fn export_windows_csv(windows: &[CascadeWindow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "id",
        "signal",
        "status",
        "primary_interval_minutes",
        "primary_price",
        "open_time_utc",
        "open_time_ms",
        "window_end_time_ms",
        "confirmations",
        "execution_time_ms",
        "execution_price",
    ])?;
    for window in windows {
        writer.write_record([
            window.id.to_string(),
            window.signal().to_string(),
            window_status_str(window.status).to_string(),
            window.primary_interval_minutes.to_string(),
            format!("{:.6}", window.primary_pivot.price),
            utc(window.open_time),
            window.open_time.to_string(),
            window.window_end_time.to_string(),
            window.confirmations.len().to_string(),
            window
                .execution_time
                .map(|t| t.to_string())
                .unwrap_or_default(),
            window
                .execution_price
                .map(|p| format!("{p:.6}"))
                .unwrap_or_default(),
        ])?;
    }
    finish_csv(writer)
}

/// Renders the realized equity curve, one row per closed trade plus the
/// starting row.
pub fn export_equity_csv(equity_curve: &[f64]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["index", "equity"])?;
    for (index, equity) in equity_curve.iter().enumerate() {
        writer.write_record([index.to_string(), format!("{equity:.2}")])?;
    }
    finish_csv(writer)
}

/// Renders one row per sweep combination, successes and failures alike.
/// Failed combinations leave the metric columns empty and carry the error
/// message in the last column.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "run_id",
        "take_profit_pct",
        "stop_loss_pct",
        "leverage",
        "min_swing_pct",
        "lookback",
        "min_timeframes",
        "trade_count",
        "win_rate",
        "total_pnl",
        "return_pct",
        "profit_factor",
        "max_drawdown_pct",
        "error",
    ])?;
    for outcome in results.all() {
        let config = &outcome.config;
        let swing = config
            .timeframes
            .first()
            .map(|tf| format!("{:.4}", tf.min_swing_pct))
            .unwrap_or_default();
        let lookback = config
            .timeframes
            .first()
            .map(|tf| tf.lookback.to_string())
            .unwrap_or_default();
        let mut record = vec![
            outcome.run_id.clone(),
            format!("{:.4}", config.simulator.take_profit_pct),
            format!("{:.4}", config.simulator.stop_loss_pct),
            format!("{:.2}", config.simulator.leverage),
            swing,
            lookback,
            config.cascade.min_timeframes_required.to_string(),
        ];
        match &outcome.result {
            Ok(result) => {
                let m = &result.metrics;
                record.extend([
                    m.trade_count.to_string(),
                    format!("{:.2}", m.win_rate),
                    format!("{:.2}", m.total_pnl),
                    format!("{:.2}", m.return_pct),
                    format!("{:.2}", m.profit_factor),
                    format!("{:.2}", m.max_drawdown_pct),
                    String::new(),
                ]);
            }
            Err(message) => {
                record.extend([
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    message.clone(),
                ]);
            }
        }
        writer.write_record(&record)?;
    }
    finish_csv(writer)
}

/// Writes a run's full artifact set under `output_dir/run_<id prefix>`:
/// result.json, config.toml, trades.csv, windows.csv, equity.csv.
/// Returns the artifact directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short = result.run_id.get(..12).unwrap_or(result.run_id.as_str());
    let dir = output_dir.join(format!("run_{short}"));
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating artifact directory {}", dir.display()))?;

    export_json(result, &dir.join("result.json"))?;

    let config_toml =
        toml::to_string_pretty(&result.config).context("serializing config snapshot")?;
    fs::write(dir.join("config.toml"), config_toml).context("writing config.toml")?;

    fs::write(dir.join("trades.csv"), export_trades_csv(&result.trades)?)
        .context("writing trades.csv")?;
    fs::write(
        dir.join("windows.csv"),
        export_windows_csv(&result.windows)?,
    )
    .context("writing windows.csv")?;
    fs::write(
        dir.join("equity.csv"),
        export_equity_csv(&result.equity_curve)?,
    )
    .context("writing equity.csv")?;

    log::info!("saved artifacts to {}", dir.display());
    Ok(dir)
}

/// Reads the result back from an artifact directory written by
/// [`save_artifacts`].
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    import_json(&dir.join("result.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataConfig, RunConfig, SignalMode};
    use crate::data::generate_synthetic_candles;
    use crate::runner::run_backtest_from_candles;
    use crate::sweep::{ParamGrid, ParamSweep};
    use pivotlab_core::cascade::{CascadeConfig, ConfirmationHorizon};
    use pivotlab_core::domain::{
        Direction, ExitReason, Pivot, PivotKind, TimeframeConfig, TimeframeRole, Trade, TradeId,
        TradeStatus, TrailingState, WindowId, MINUTE_MS,
    };

    fn sample_config() -> RunConfig {
        let mut tf = TimeframeConfig::new(30, TimeframeRole::Primary);
        tf.lookback = 2;
        RunConfig {
            base_interval_minutes: 1,
            mode: SignalMode::Pivot,
            data: DataConfig::default(),
            timeframes: vec![tf],
            cascade: CascadeConfig::default(),
            simulator: Default::default(),
            sweep: None,
        }
    }

    fn sample_result() -> BacktestResult {
        let candles = generate_synthetic_candles(2_000, 5, 100.0, 1);
        run_backtest_from_candles(&sample_config(), &candles).unwrap()
    }

    fn closed_trade() -> Trade {
        Trade {
            id: TradeId(1),
            direction: Direction::Long,
            source_window: Some(WindowId(3)),
            entry_time: 60 * MINUTE_MS,
            entry_price: 100.0,
            entry_slippage_pct: 0.01,
            size: 1_000.0,
            leverage: 2.0,
            take_profit_price: 105.0,
            stop_loss_price: 98.0,
            trailing_tp: TrailingState::default(),
            trailing_sl: TrailingState::default(),
            status: TradeStatus::Closed,
            exit_time: Some(180 * MINUTE_MS),
            exit_price: Some(105.0),
            exit_reason: Some(ExitReason::TakeProfit),
            pnl: Some(96.0),
            fees_paid: 4.0,
            funding_paid: 0.0,
        }
    }

    fn open_trade() -> Trade {
        let mut trade = closed_trade();
        trade.id = TradeId(2);
        trade.source_window = None;
        trade.status = TradeStatus::Open;
        trade.exit_time = None;
        trade.exit_price = None;
        trade.exit_reason = None;
        trade.pnl = None;
        trade
    }

    #[test]
    fn json_roundtrip_preserves_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let result = sample_result();

        export_json(&result, &path).unwrap();
        let restored = import_json(&path).unwrap();
        assert_eq!(restored, result);
    }

    #[test]
    fn import_rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let result = sample_result();

        let mut value = serde_json::to_value(&result).unwrap();
        value["schema_version"] = serde_json::json!(99);
        fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

        let err = import_json(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version 99"));
    }

    #[test]
    fn trades_csv_renders_open_and_closed_rows() {
        let csv_text = export_trades_csv(&[closed_trade(), open_trade()]).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        assert_eq!(reader.headers().unwrap().len(), 18);

        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "T1");
        assert_eq!(&rows[0][1], "long");
        assert_eq!(&rows[0][2], "W3");
        assert_eq!(&rows[0][14], "take_profit");
        assert_eq!(&rows[0][15], "96.00");
        // Open trade leaves every exit column empty.
        assert_eq!(&rows[1][2], "");
        assert_eq!(&rows[1][11], "");
        assert_eq!(&rows[1][14], "");
        assert_eq!(&rows[1][15], "");
    }

    #[test]
    fn empty_trades_csv_is_header_only() {
        let csv_text = export_trades_csv(&[]).unwrap();
        assert_eq!(csv_text.lines().count(), 1);
        assert!(csv_text.starts_with("id,direction,source_window"));
    }

    #[test]
    fn windows_csv_renders_status_and_execution() {
        let pivot = Pivot::new(PivotKind::Low, 100.0, 60 * MINUTE_MS, 4, 1.5);
        let mut window = CascadeWindow::open(WindowId(7), pivot, 60, 240 * MINUTE_MS);
        window.execute(90 * MINUTE_MS, 99.25);

        let csv_text = export_windows_csv(&[window]).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        assert_eq!(reader.headers().unwrap().len(), 11);
        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "W7");
        assert_eq!(&rows[0][1], "long");
        assert_eq!(&rows[0][2], "executed");
        assert_eq!(&rows[0][10], "99.250000");
    }

    #[test]
    fn equity_csv_has_one_row_per_point() {
        let csv_text = export_equity_csv(&[10_000.0, 10_100.0, 10_050.0]).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "0,10000.00");
        assert_eq!(lines[3], "2,10050.00");
    }

    #[test]
    fn sweep_csv_carries_metrics_and_errors() {
        let candles = generate_synthetic_candles(1_000, 11, 100.0, 1);
        let base = sample_config();
        let grid = ParamGrid {
            take_profit_pcts: vec![2.0, 4.0],
            ..ParamGrid::default()
        };
        let ok_results = ParamSweep::new(&candles).sweep(&grid, &base);
        let csv_text = export_sweep_csv(&ok_results).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        assert_eq!(reader.headers().unwrap().len(), 14);
        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][13], "");
        assert!(!rows[0][7].is_empty());

        // Secondary-only cascade fails at run time and lands in the error
        // column.
        let mut failing = base;
        failing.mode = SignalMode::Cascade;
        failing.timeframes[0].role = TimeframeRole::Secondary;
        failing.cascade.confirmation_windows = vec![ConfirmationHorizon {
            interval_minutes: 30,
            window_minutes: 120,
        }];
        let err_results = ParamSweep::new(&candles).sweep(&grid, &failing);
        let csv_text = export_sweep_csv(&err_results).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0][7].is_empty());
        assert!(!rows[0][13].is_empty());
    }

    #[test]
    fn artifacts_roundtrip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();

        let artifact_dir = save_artifacts(&result, dir.path()).unwrap();
        assert!(artifact_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("run_"));
        for name in ["result.json", "config.toml", "trades.csv", "windows.csv", "equity.csv"] {
            assert!(artifact_dir.join(name).exists(), "missing {name}");
        }

        let restored = load_artifacts(&artifact_dir).unwrap();
        assert_eq!(restored, result);
    }

    #[test]
    fn utc_formats_epoch_milliseconds() {
        assert_eq!(utc(0), "1970-01-01 00:00:00");
        assert_eq!(utc(1_577_836_800_000), "2020-01-01 00:00:00");
    }
}
