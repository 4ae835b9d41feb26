//! Event-driven backtesting engine core: chronological loop, bar aggregation,
//! portfolio accounting, simulated execution, slippage, and ATR sizing.
//!
//! External collaborators (strategy implementations, data ingestion, CLI,
//! reporting) live outside this crate; see `backtest-runner`.

pub mod bar_aggregator;
pub mod bar_store;
pub mod commission;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod risk;
pub mod sizer;
pub mod slippage;
pub mod strategy;

pub use engine::{BacktestResult, CancellationToken, Engine, TradeLogEntry};
pub use error::{BacktestError, Result};
