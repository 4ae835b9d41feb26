//! End-to-end engine scenarios: shorting/margin accounting, the negative-cash
//! guard, ATR warm-up reuse, and POV rejection.

use backtest_core::commission::CommissionModel;
use backtest_core::config::{BacktestConfig, ShortingConfig, SizerConfig, SlippageConfig};
use backtest_core::diagnostics::DiagnosticKind;
use backtest_core::domain::{Bar, Interval, OrderType, SignalDirection};
use backtest_core::engine::{CancellationToken, Engine, TradeLogEntry};
use backtest_core::risk::RiskConfig;
use backtest_core::strategy::{Signal, Strategy, StrategyHost};
use backtest_core::BacktestError;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n)
}

fn bar(day_n: i64, symbol: &str, open: f64, close: f64, volume: f64) -> Bar {
    Bar {
        symbol: symbol.into(),
        interval: Interval::Days(1),
        timestamp: day(day_n),
        open,
        high: open.max(close) + 0.01,
        low: open.min(close) - 0.01,
        close,
        volume,
    }
}

fn no_commission() -> CommissionModel {
    CommissionModel {
        per_share: 0.0,
        per_trade: 0.0,
        bps: 0.0,
    }
}

fn disabled_risk() -> RiskConfig {
    RiskConfig {
        max_order_quantity: -1.0,
        max_notional: -1.0,
        max_daily_drawdown_pct: -1.0,
        max_gross_exposure: -1.0,
        max_net_exposure: -1.0,
        pov_cap: -1.0,
        max_orders_per_window: -1.0,
        order_rate_window_secs: 60,
    }
}

/// Fires a single bearish signal on the first bar it sees, then stays silent.
struct BearishOnce {
    intervals: Vec<Interval>,
    fired: bool,
}

impl Strategy for BearishOnce {
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
        if self.fired {
            return None;
        }
        self.fired = true;
        Some(Signal {
            direction: SignalDirection::Bearish,
            strength: 1.0,
        })
    }

    fn subscribed_intervals(&self) -> &[Interval] {
        &self.intervals
    }
}

/// Scenario 2 (shorting from flat, analogous margin math to the source note):
/// sell 2 AAPL at $10 from a $20 account. After the fill: cash=$40,
/// qty=-2, margin_locked=$30, usable_cash=$10, equity=cash+qty*price=$20.
#[test]
fn short_sell_margin_math_scenario_2() {
    let mut host = StrategyHost::new();
    host.register(Box::new(BearishOnce {
        intervals: vec![Interval::Days(1)],
        fired: false,
    }));

    let config = BacktestConfig {
        base_interval: Interval::Days(1),
        additional_frequencies: vec![],
        initial_cash: 20.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 2 },
        slippage: SlippageConfig::None,
        commissions: no_commission(),
        risk: disabled_risk(),
        shorting: ShortingConfig {
            annual_borrow_rate: 0.0,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 252.0,
        },
        continue_on_negative_cash: true,
        rng_seed: 1,
    };

    let mut engine = Engine::new(config, host).unwrap();
    let bars = vec![
        Ok(bar(0, "AAPL", 10.0, 10.0, 1000.0)),
        Ok(bar(1, "AAPL", 10.0, 10.0, 1000.0)),
    ];
    let result = engine.run(bars, &CancellationToken::new()).unwrap();

    let pos = result.final_positions.get("AAPL").unwrap();
    assert_eq!(pos.quantity, -2);

    let last_equity_point = result.equity_curve.last().unwrap();
    assert!((last_equity_point.cash - 40.0).abs() < 1e-9);
    assert!((last_equity_point.margin_locked - 30.0).abs() < 1e-9);
    assert!((last_equity_point.equity - 20.0).abs() < 1e-9);

    let fills: Vec<_> = result
        .trade_log
        .iter()
        .filter_map(|e| match e {
            TradeLogEntry::Filled(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].quantity, 2);
}

/// Fires a single bullish signal on the first bar it sees, then stays silent.
struct BullishOnce {
    intervals: Vec<Interval>,
    fired: bool,
}

impl Strategy for BullishOnce {
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
        if self.fired {
            return None;
        }
        self.fired = true;
        Some(Signal {
            direction: SignalDirection::Bullish,
            strength: 1.0,
        })
    }

    fn subscribed_intervals(&self) -> &[Interval] {
        &self.intervals
    }
}

#[test]
fn negative_cash_guard_terminates_without_continue_flag() {
    let mut host = StrategyHost::new();
    host.register(Box::new(BullishOnce {
        intervals: vec![Interval::Days(1)],
        fired: false,
    }));
    // The buy order's cost vastly exceeds the account; once it fills at the
    // next bar's open, cash goes deeply negative and the run aborts there.
    let config = BacktestConfig {
        base_interval: Interval::Days(1),
        additional_frequencies: vec![],
        initial_cash: 100.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 1000 },
        slippage: SlippageConfig::None,
        commissions: no_commission(),
        risk: disabled_risk(),
        shorting: ShortingConfig {
            annual_borrow_rate: 0.0,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 252.0,
        },
        continue_on_negative_cash: false,
        rng_seed: 1,
    };

    let mut engine = Engine::new(config, host).unwrap();
    let bars = vec![
        Ok(bar(0, "AAPL", 100.0, 100.0, 10_000.0)),
        Ok(bar(1, "AAPL", 100.0, 100.0, 10_000.0)),
        Ok(bar(2, "AAPL", 100.0, 100.0, 10_000.0)),
    ];
    let err = engine.run(bars, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, BacktestError::InsufficientCash { .. }));
}

#[test]
fn pov_rejection_leaves_portfolio_unchanged_scenario_5() {
    let mut host = StrategyHost::new();
    host.register(Box::new(BearishOnce {
        intervals: vec![Interval::Days(1)],
        fired: false,
    }));
    let mut risk = disabled_risk();
    risk.pov_cap = 0.1;

    let config = BacktestConfig {
        base_interval: Interval::Days(1),
        additional_frequencies: vec![],
        initial_cash: 10_000.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 200 },
        slippage: SlippageConfig::None,
        commissions: no_commission(),
        risk,
        shorting: ShortingConfig {
            annual_borrow_rate: 0.0,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 252.0,
        },
        continue_on_negative_cash: false,
        rng_seed: 1,
    };

    let mut engine = Engine::new(config, host).unwrap();
    let bars = vec![
        Ok(bar(0, "AAPL", 100.0, 100.0, 1000.0)), // order qty 200, volume 1000 -> pov 0.2 > 0.1
        Ok(bar(1, "AAPL", 100.0, 100.0, 1000.0)),
    ];
    let result = engine.run(bars, &CancellationToken::new()).unwrap();

    assert!(result
        .final_positions
        .get("AAPL")
        .map_or(true, |p| p.is_flat()));
    let rejections: Vec<_> = result
        .trade_log
        .iter()
        .filter_map(|e| match e {
            TradeLogEntry::Rejected(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].reason, "pov_exceeded");
}

/// Scenario 6: base=1m, strategy subscribed to 5m; after 10 one-minute bars
/// the 5m aggregator has closed exactly twice.
#[test]
fn dual_frequency_aggregation_scenario_6() {
    use std::sync::{Arc, Mutex};

    struct RecordFiveMinuteCloses {
        closes: Arc<Mutex<Vec<f64>>>,
    }

    impl Strategy for RecordFiveMinuteCloses {
        fn on_interval(
            &mut self,
            _symbol: &str,
            _interval: Interval,
            _timestamp: DateTime<Utc>,
            _open: f64,
            _high: f64,
            _low: f64,
            _close: f64,
            volume: f64,
        ) -> Option<Signal> {
            self.closes.lock().unwrap().push(volume);
            None
        }

        fn subscribed_intervals(&self) -> &[Interval] {
            static FIVE_MIN: [Interval; 1] = [Interval::Minutes(5)];
            &FIVE_MIN
        }
    }

    let closes = Arc::new(Mutex::new(Vec::new()));
    let mut host = StrategyHost::new();
    host.register(Box::new(RecordFiveMinuteCloses {
        closes: closes.clone(),
    }));

    let config = BacktestConfig {
        base_interval: Interval::Minutes(1),
        additional_frequencies: vec![Interval::Minutes(5)],
        initial_cash: 10_000.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 0 },
        slippage: SlippageConfig::None,
        commissions: no_commission(),
        risk: disabled_risk(),
        shorting: ShortingConfig {
            annual_borrow_rate: 0.0,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 252.0,
        },
        continue_on_negative_cash: false,
        rng_seed: 1,
    };

    let mut engine = Engine::new(config, host).unwrap();
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
    let bars: Vec<_> = (0..10)
        .map(|i| {
            Ok(Bar {
                symbol: "AAPL".into(),
                interval: Interval::Minutes(1),
                timestamp: base + chrono::Duration::minutes(i + 1),
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 10.0,
            })
        })
        .collect();
    engine.run(bars, &CancellationToken::new()).unwrap();

    let closes = closes.lock().unwrap();
    assert_eq!(closes.len(), 2);
    assert_eq!(closes[0], 50.0);
    assert_eq!(closes[1], 50.0);
}

/// Fires a single bearish signal the first time it sees each distinct symbol.
struct BearishOncePerSymbol {
    intervals: Vec<Interval>,
    fired: HashSet<String>,
}

impl Strategy for BearishOncePerSymbol {
    fn on_interval(
        &mut self,
        symbol: &str,
        _interval: Interval,
        _timestamp: DateTime<Utc>,
        _open: f64,
        _high: f64,
        _low: f64,
        _close: f64,
        _volume: f64,
    ) -> Option<Signal> {
        if !self.fired.insert(symbol.to_string()) {
            return None;
        }
        Some(Signal {
            direction: SignalDirection::Bearish,
            strength: 1.0,
        })
    }

    fn subscribed_intervals(&self) -> &[Interval] {
        &self.intervals
    }
}

/// Two symbols closing on the same timestamp each tick must produce exactly
/// one `EquityPoint` per tick (not one per symbol-bar), and end-of-day borrow
/// accrual must run once per tick rather than once per symbol that closed
/// a trading day.
#[test]
fn multi_symbol_tick_batches_equity_and_accrual_once_per_timestamp() {
    let mut host = StrategyHost::new();
    host.register(Box::new(BearishOncePerSymbol {
        intervals: vec![Interval::Days(1)],
        fired: HashSet::new(),
    }));

    let config = BacktestConfig {
        base_interval: Interval::Days(1),
        additional_frequencies: vec![],
        initial_cash: 1000.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 1 },
        slippage: SlippageConfig::None,
        commissions: no_commission(),
        risk: disabled_risk(),
        shorting: ShortingConfig {
            annual_borrow_rate: 0.1,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 10.0,
        },
        continue_on_negative_cash: false,
        rng_seed: 1,
    };

    let mut engine = Engine::new(config, host).unwrap();
    let bars = vec![
        Ok(bar(0, "AAPL", 100.0, 100.0, 1000.0)),
        Ok(bar(0, "MSFT", 100.0, 100.0, 1000.0)),
        Ok(bar(1, "AAPL", 100.0, 100.0, 1000.0)),
        Ok(bar(1, "MSFT", 100.0, 100.0, 1000.0)),
        Ok(bar(2, "AAPL", 100.0, 100.0, 1000.0)),
        Ok(bar(2, "MSFT", 100.0, 100.0, 1000.0)),
    ];
    let result = engine.run(bars, &CancellationToken::new()).unwrap();

    // One EquityPoint per tick (3 distinct timestamps), not one per bar (6).
    assert_eq!(result.equity_curve.len(), 3);
    let timestamps: Vec<_> = result.equity_curve.iter().map(|p| p.ts).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(
        sorted.len(),
        timestamps.len(),
        "equity_history must be strictly increasing in timestamp (I4), got {timestamps:?}"
    );

    // day0: signals fire for both symbols, nothing has filled yet.
    assert!((result.equity_curve[0].equity - 1000.0).abs() < 1e-9);
    // day1: both orders fill at this bar's open (100) -> cash=1200, then a
    // single end-of-day accrual deducts borrow cost for both symbols at once.
    assert!((result.equity_curve[1].equity - 1000.0).abs() < 1e-9);
    // day2: no new fills; last tick's accrual (2.0 total) has already reduced
    // cash to 1198, marked against both short positions at 100 -> 998. If
    // accrual ran twice in the day1 tick (once per symbol-bar) this would be
    // off by the extra deduction.
    assert!(
        (result.equity_curve[2].equity - 998.0).abs() < 1e-9,
        "equity={}, expected 998.0 (accrual must run once per tick, not once per symbol)",
        result.equity_curve[2].equity
    );

    assert_eq!(result.final_positions.get("AAPL").unwrap().quantity, -1);
    assert_eq!(result.final_positions.get("MSFT").unwrap().quantity, -1);
}

/// Zero-volume history forces `MultiFactorSlippage` into its spread-only
/// fallback; the resulting fill must surface a `SlippageNumericalFallback`
/// diagnostic, and `BacktestResult` must carry it back to the caller instead
/// of dropping the accumulated `Diagnostics` log.
#[test]
fn slippage_fallback_surfaces_as_diagnostic_on_the_result() {
    let mut host = StrategyHost::new();
    host.register(Box::new(BullishOnce {
        intervals: vec![Interval::Days(1)],
        fired: false,
    }));

    let config = BacktestConfig {
        base_interval: Interval::Days(1),
        additional_frequencies: vec![],
        initial_cash: 1000.0,
        default_order_type: OrderType::Market,
        slippage_guard: 0.0,
        position_sizer: SizerConfig::Fixed { quantity: 1 },
        slippage: SlippageConfig::MultiFactor {
            short_window: 2,
            medium_window: 3,
            long_window: 5,
            noise_sigma: 0.0,
            floor: 0.0,
            cap: 1.0,
            impact_coefficient: 1.0,
            annualization_factor: Some(252.0),
        },
        commissions: no_commission(),
        risk: disabled_risk(),
        shorting: ShortingConfig {
            annual_borrow_rate: 0.0,
            maintenance_margin_multiplier: 1.5,
            trading_days_per_year: 252.0,
        },
        continue_on_negative_cash: false,
        rng_seed: 1,
    };

    let mut engine = Engine::new(config, host).unwrap();
    // Zero volume throughout means `mean_volume <= 0.0` the moment there is
    // any history, forcing every estimate into the spread-only fallback.
    let bars = vec![
        Ok(bar(0, "AAPL", 100.0, 100.0, 0.0)),
        Ok(bar(1, "AAPL", 100.0, 100.0, 0.0)),
    ];
    let result = engine.run(bars, &CancellationToken::new()).unwrap();

    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SlippageNumericalFallback));
}
