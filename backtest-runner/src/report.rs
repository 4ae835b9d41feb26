//! Reporting and export — JSON, CSV, and Markdown artifacts for a completed run.
//!
//! Every persisted manifest carries a `schema_version`; `load_manifest` rejects
//! versions newer than this binary understands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use backtest_core::engine::{BacktestResult as EngineResult, TradeLogEntry};
use backtest_core::domain::EquityPoint;
use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceMetrics;

pub const SCHEMA_VERSION: u32 = 1;

/// Everything a backtest run produces, flattened into one serializable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub initial_capital: f64,
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<TradeLogEntry>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunReport {
    pub fn new(
        symbol: impl Into<String>,
        initial_capital: f64,
        result: &EngineResult,
        annualization_factor: f64,
    ) -> Self {
        let equity_values: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
        let metrics = PerformanceMetrics::compute(
            &equity_values,
            &result.trade_log,
            initial_capital,
            annualization_factor,
        );
        RunReport {
            schema_version: SCHEMA_VERSION,
            symbol: symbol.into(),
            initial_capital,
            metrics,
            equity_curve: result.equity_curve.clone(),
            trade_log: result.trade_log.clone(),
        }
    }
}

pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

/// Equity curve CSV: one row per mark-to-market point.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "cash",
        "reserved_cash",
        "margin_locked",
        "position_value",
        "equity",
    ])?;
    for p in equity_curve {
        wtr.write_record([
            p.ts.to_rfc3339(),
            format!("{:.6}", p.cash),
            format!("{:.6}", p.reserved_cash),
            format!("{:.6}", p.margin_locked),
            format!("{:.6}", p.position_value),
            format!("{:.6}", p.equity),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush equity CSV writer")?;
    String::from_utf8(data).context("equity CSV output is not valid UTF-8")
}

/// Trade-log CSV: one row per fill. Rejections are not included here — they
/// belong in diagnostics, not the trade tape.
pub fn export_trades_csv(trade_log: &[TradeLogEntry]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "symbol",
        "direction",
        "quantity",
        "price",
        "commission",
        "slippage",
        "order_id",
        "realized_pnl",
    ])?;
    for entry in trade_log {
        if let TradeLogEntry::Filled(t) = entry {
            wtr.write_record([
                t.ts.to_rfc3339(),
                t.symbol.clone(),
                format!("{:?}", t.direction),
                t.quantity.to_string(),
                format!("{:.6}", t.price),
                format!("{:.6}", t.commission),
                format!("{:.6}", t.slippage),
                t.order_id.0.to_string(),
                format!("{:.6}", t.realized_pnl),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush trades CSV writer")?;
    String::from_utf8(data).context("trades CSV output is not valid UTF-8")
}

/// Save manifest.json, trades.csv, and equity.csv under `output_dir/{symbol}_{timestamp}/`.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!("{}_{}", report.symbol, chrono::Utc::now().format("%Y%m%d_%H%M%S"));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("trades.csv"), export_trades_csv(&report.trade_log)?)?;
    std::fs::write(run_dir.join("equity.csv"), export_equity_csv(&report.equity_curve)?)?;

    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<RunReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

/// Human-readable single-run Markdown summary.
pub fn generate_report(report: &RunReport) -> String {
    let mut md = String::with_capacity(1024);
    let m = &report.metrics;

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n| --- | --- |\n");
    md.push_str(&format!("| Symbol | {} |\n", report.symbol));
    md.push_str(&format!("| Initial Capital | ${:.0} |\n", report.initial_capital));
    md.push_str(&format!("| Bars | {} |\n", report.equity_curve.len()));
    md.push('\n');

    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return * 100.0));
    md.push_str(&format!("| CAGR | {:.2}% |\n", m.cagr * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown * 100.0));
    md.push_str(&format!(
        "| Max Drawdown Duration | {} intervals |\n",
        m.max_drawdown_duration_intervals
    ));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", m.trade_count));
    md.push_str(&format!("| Turnover | {:.2}x |\n", m.turnover));
    md.push('\n');

    md
}
