//! Orchestration layer for `backtest-core`: bar sourcing, and CSV/JSON/Markdown
//! reporting. The engine itself knows nothing about files; this crate owns
//! all I/O.

pub mod bar_source;
pub mod metrics;
pub mod report;

use backtest_core::config::BacktestConfig;
use backtest_core::engine::{BacktestResult as EngineResult, CancellationToken, Engine};
use backtest_core::strategy::StrategyHost;
use backtest_core::{BacktestError, Result};
use thiserror::Error;

pub use bar_source::{BarSource, BarSourceIter, CsvBarSource};
pub use metrics::PerformanceMetrics;
pub use report::RunReport;

/// Errors specific to assembling and running a backtest from configuration,
/// distinct from the engine's own `BacktestError`.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("engine error: {0}")]
    Engine(#[from] BacktestError),
    #[error("config error: {0}")]
    Config(String),
}

/// Installs a `tracing_subscriber::fmt` subscriber honoring `RUST_LOG`
/// (defaulting to `info`). Call once from a binary entrypoint; library and
/// test code should not call this.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Load a `BacktestConfig` from a TOML file on disk.
pub fn load_config(path: impl AsRef<std::path::Path>) -> std::result::Result<BacktestConfig, RunnerError> {
    let raw = std::fs::read_to_string(path.as_ref())
        .map_err(|e| RunnerError::Config(format!("failed to read config: {e}")))?;
    BacktestConfig::from_toml_str(&raw).map_err(RunnerError::Engine)
}

/// Run one backtest end to end: build the engine from `config` and `strategies`,
/// consume every bar from `bar_source`, and wrap the result into a `RunReport`
/// with computed metrics.
///
/// `annualization_factor` controls how `cagr`/`sharpe` scale interval returns
/// to a yearly basis (e.g. 252 for a daily base interval, or the explicit
/// override configured for sub-daily slippage).
pub fn run(
    config: BacktestConfig,
    strategies: StrategyHost,
    symbol: impl Into<String>,
    bar_source: impl IntoIterator<Item = Result<backtest_core::domain::Bar>>,
    annualization_factor: f64,
) -> std::result::Result<RunReport, RunnerError> {
    let initial_capital = config.initial_cash;
    let symbol = symbol.into();
    let mut engine = Engine::new(config, strategies)?;
    let result: EngineResult = engine.run(bar_source, &CancellationToken::new())?;
    Ok(RunReport::new(symbol, initial_capital, &result, annualization_factor))
}
