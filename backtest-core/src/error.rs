//! Error kinds and the fatal/non-fatal policy that governs them.
//!
//! `ConfigError` and `DataGapError` terminate a run; everything else is
//! recoverable locally (converted to a diagnostics record or a rejected order).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("data gap for {symbol} at {interval}: expected timestamp after {last}, got {got}")]
    DataGap {
        symbol: String,
        interval: String,
        last: String,
        got: String,
    },

    #[error("insufficient usable cash: {usable_cash:.2} < 0 at {ts}")]
    InsufficientCash { usable_cash: f64, ts: String },

    #[error("bar source error: {0}")]
    BarSource(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process exit codes, per the external-interfaces contract.
impl BacktestError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BacktestError::InsufficientCash { .. } => 2,
            BacktestError::Config(_) => 3,
            BacktestError::DataGap { .. } => 4,
            BacktestError::BarSource(_) | BacktestError::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BacktestError>;
