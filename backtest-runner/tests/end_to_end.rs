//! End-to-end: CSV bar source -> engine -> report artifacts on disk.

use backtest_core::commission::CommissionModel;
use backtest_core::config::{BacktestConfig, ShortingConfig, SizerConfig, SlippageConfig};
use backtest_core::domain::{Interval, OrderType, SignalDirection};
use backtest_core::risk::RiskConfig;
use backtest_core::strategy::{Signal, Strategy, StrategyHost};
use backtest_runner::bar_source::{BarSourceIter, CsvBarSource};
use backtest_runner::report::{generate_report, save_artifacts};
use backtest_runner::run;
use chrono::{DateTime, Utc};
use std::io::Write;

struct BuyOnce(bool);

impl Strategy for BuyOnce {
    fn on_interval(
        &mut self,
        _symbol: &str,
        _interval: Interval,
        _timestamp: DateTime<Utc>,
        _open: f64,
        _high: f64,
        _low: f64,
        _close: f64,
        _volume: f64,
    ) -> Option<Signal> {
        if self.0 {
            return None;
        }
        self.0 = true;
        Some(Signal {
            direction: SignalDirection::Bullish,
            strength: 1.0,
        })
    }

    fn subscribed_intervals(&self) -> &[Interval] {
        static DAYS: [Interval; 1] = [Interval::Days(1)];
        &DAYS
    }
}

fn config() -> BacktestConfig {
    BacktestConfig {
        base_interval: Interval::Days(1),
        additional_frequencies: vec![],
        initial_cash: 1000.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 5 },
        slippage: SlippageConfig::None,
        commissions: CommissionModel {
            per_share: 0.0,
            per_trade: 0.0,
            bps: 0.0,
        },
        risk: RiskConfig {
            max_order_quantity: -1.0,
            max_notional: -1.0,
            max_daily_drawdown_pct: -1.0,
            max_gross_exposure: -1.0,
            max_net_exposure: -1.0,
            pov_cap: -1.0,
            max_orders_per_window: -1.0,
            order_rate_window_secs: 60,
        },
        shorting: ShortingConfig {
            annual_borrow_rate: 0.0,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 252.0,
        },
        continue_on_negative_cash: false,
        rng_seed: 11,
    }
}

#[test]
fn csv_bars_through_engine_to_artifacts_on_disk() {
    let mut csv_file = tempfile::NamedTempFile::new().unwrap();
    write!(
        csv_file,
        "timestamp,open,high,low,close,volume\n\
         2024-01-01T00:00:00Z,100.0,101.0,99.0,101.0,1000\n\
         2024-01-02T00:00:00Z,101.0,104.0,100.5,103.0,1200\n\
         2024-01-03T00:00:00Z,103.0,103.5,101.0,102.0,900\n"
    )
    .unwrap();

    let source = CsvBarSource::open(csv_file.path(), "AAPL", Interval::Days(1)).unwrap();
    let mut host = StrategyHost::new();
    host.register(Box::new(BuyOnce(false)));

    let report = run(config(), host, "AAPL", BarSourceIter(source), 252.0).unwrap();
    assert_eq!(report.equity_curve.len(), 3);
    assert_eq!(report.metrics.trade_count, 1);

    let md = generate_report(&report);
    assert!(md.contains("# Backtest Report"));

    let out_dir = tempfile::tempdir().unwrap();
    let run_dir = save_artifacts(&report, out_dir.path()).unwrap();
    assert!(run_dir.join("manifest.json").exists());
    assert!(run_dir.join("trades.csv").exists());
    assert!(run_dir.join("equity.csv").exists());
}
