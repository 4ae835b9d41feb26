//! The chronological driver: pull bar -> aggregate -> dispatch market event ->
//! signals -> size -> risk -> orders -> fills -> mark-to-market.

use crate::bar_aggregator::BarAggregator;
use crate::bar_store::BarStore;
use crate::commission::CommissionModel;
use crate::config::{BacktestConfig, SizerConfig, SlippageConfig, ShortingConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::domain::{Bar, Direction, Event, IdGen, Interval, OrderId, OrderType, Portfolio, SignalDirection};
use crate::error::{BacktestError, Result};
use crate::execution::ExecutionHandler;
use crate::risk::{RiskCheckInput, RiskManager};
use crate::sizer::{AtrSizer, FixedSizer, Sizer};
use crate::slippage::{MultiFactorSlippage, NoSlippage, SlippageModel, SlippageWindows};
use crate::strategy::StrategyHost;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation: checked once per tick; the loop finishes the
/// current tick and returns the equity curve built so far.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: u64,
    pub price: f64,
    pub commission: f64,
    pub slippage: f64,
    pub order_id: OrderId,
    /// Realized P&L booked by this fill (nonzero only when it reduces or
    /// flips an existing position); zero for fills that open or add to one.
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub order_quantity: i64,
    pub reason: RejectReasonCode,
}

/// Wraps `RejectReason::code()`'s `&'static str` so `#[derive(Deserialize)]`
/// on `RejectionRecord`/`TradeLogEntry` doesn't require `'de: 'static`: a bare
/// `&'static str` field forces that bound on the containing enum's impl,
/// which cannot hold for an arbitrary deserializer lifetime. Hiding the
/// lifetime behind a named type with a hand-written `Deserialize` (which
/// leaks the decoded string) sidesteps the derive's bound inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectReasonCode(pub &'static str);

impl From<&'static str> for RejectReasonCode {
    fn from(s: &'static str) -> Self {
        RejectReasonCode(s)
    }
}

impl std::fmt::Display for RejectReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::ops::Deref for RejectReasonCode {
    type Target = str;

    fn deref(&self) -> &str {
        self.0
    }
}

impl PartialEq<&str> for RejectReasonCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for RejectReasonCode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for RejectReasonCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(RejectReasonCode(Box::leak(s.into_boxed_str())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TradeLogEntry {
    Filled(TradeRecord),
    Rejected(RejectionRecord),
}

use crate::domain::{EquityPoint, Position};

#[derive(Debug)]
pub struct BacktestResult {
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<TradeLogEntry>,
    pub final_positions: HashMap<String, Position>,
    /// Non-fatal warnings accumulated over the run (negative-cash-continued,
    /// slippage numerical fallbacks, risk rejections) for the caller to
    /// inspect or print.
    pub diagnostics: Vec<crate::diagnostics::DiagnosticRecord>,
}

/// True if the next bar on a contiguous schedule would fall on a different
/// calendar day. Daily-and-up base intervals are trivially true (one bar per day).
fn is_last_interval_of_day(interval: Interval, ts: DateTime<Utc>) -> bool {
    match interval {
        Interval::Days(_) => true,
        Interval::Minutes(m) => {
            let next = ts + chrono::Duration::minutes(i64::from(m));
            next.date_naive() != ts.date_naive()
        }
    }
}

fn build_sizer(cfg: &SizerConfig) -> Box<dyn Sizer> {
    match *cfg {
        SizerConfig::Atr {
            period,
            atr_multiplier,
            risk_per_trade,
            initial_position_size,
            decimal_places,
        } => Box::new(AtrSizer::new(
            period,
            atr_multiplier,
            risk_per_trade,
            initial_position_size,
            decimal_places,
        )),
        SizerConfig::Fixed { quantity } => Box::new(FixedSizer { quantity }),
    }
}

fn build_slippage(cfg: &SlippageConfig, rng_seed: u64) -> Box<dyn SlippageModel> {
    match cfg.clone() {
        SlippageConfig::None => Box::new(NoSlippage),
        SlippageConfig::MultiFactor {
            short_window,
            medium_window,
            long_window,
            noise_sigma,
            floor,
            cap,
            impact_coefficient,
            annualization_factor,
        } => Box::new(MultiFactorSlippage::new(
            SlippageWindows {
                short: short_window,
                medium: medium_window,
                long: long_window,
            },
            noise_sigma,
            floor,
            cap,
            annualization_factor.unwrap_or(252.0),
            impact_coefficient,
            rng_seed,
        )),
    }
}

pub struct Engine {
    config: BacktestConfig,
    bar_store: BarStore,
    aggregator: BarAggregator,
    execution: ExecutionHandler,
    risk: RiskManager,
    sizer: Box<dyn Sizer>,
    slippage: Box<dyn SlippageModel>,
    commission: CommissionModel,
    shorting: ShortingConfig,
    portfolio: Portfolio,
    id_gen: IdGen,
    strategies: StrategyHost,
    diagnostics: Diagnostics,
    trade_log: Vec<TradeLogEntry>,
    last_close: HashMap<String, f64>,
    last_target_size: HashMap<String, i64>,
    recent_order_timestamps: VecDeque<i64>,
    current_trading_date: Option<NaiveDate>,
    daily_starting_equity: f64,
}

impl Engine {
    pub fn new(config: BacktestConfig, strategies: StrategyHost) -> Result<Self> {
        config.validate()?;
        let sizer = build_sizer(&config.position_sizer);
        let slippage = build_slippage(&config.slippage, config.rng_seed);
        let targets = config.additional_frequencies.clone();
        let initial_cash = config.initial_cash;
        let commission = config.commissions;
        let risk = RiskManager::new(config.risk);
        let shorting = config.shorting;

        Ok(Engine {
            config,
            bar_store: BarStore::new(),
            aggregator: BarAggregator::new(targets),
            execution: ExecutionHandler::new(),
            risk,
            sizer,
            slippage,
            commission,
            shorting,
            portfolio: Portfolio::new(initial_cash),
            id_gen: IdGen::default(),
            strategies,
            diagnostics: Diagnostics::default(),
            trade_log: Vec::new(),
            last_close: HashMap::new(),
            last_target_size: HashMap::new(),
            recent_order_timestamps: VecDeque::new(),
            current_trading_date: None,
            daily_starting_equity: initial_cash,
        })
    }

    pub fn run(
        &mut self,
        bar_source: impl IntoIterator<Item = Result<Bar>>,
        cancellation: &CancellationToken,
    ) -> Result<BacktestResult> {
        let mut bars = bar_source.into_iter().peekable();
        let mut tick: Vec<Bar> = Vec::new();

        while let Some(bar_result) = bars.next() {
            if cancellation.is_cancelled() {
                break;
            }
            let bar = bar_result?;
            let ts = bar.timestamp;
            tick.push(bar);

            // Same-timestamp bars from other symbols belong to this tick too;
            // collect them all before running steps 3-7 once for the tick.
            while matches!(bars.peek(), Some(Ok(next)) if next.timestamp == ts) {
                tick.push(bars.next().expect("peeked Some")?);
            }

            tick.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            let batch = std::mem::take(&mut tick);
            tracing::debug!(ts = %ts, symbols = batch.len(), "processing tick");
            self.process_tick(batch)?;
        }

        Ok(BacktestResult {
            equity_curve: std::mem::take(&mut self.portfolio.equity_history),
            trade_log: std::mem::take(&mut self.trade_log),
            final_positions: self.portfolio.positions.clone(),
            diagnostics: std::mem::take(&mut self.diagnostics).into_records(),
        })
    }

    /// Processes every bar that shares one timestamp as a single tick:
    /// symbols are visited in lexicographic order (the caller pre-sorts
    /// `bars`), and `record_equity`/`accrue_end_of_day` run exactly once for
    /// the whole tick, not once per symbol.
    fn process_tick(&mut self, bars: Vec<Bar>) -> Result<()> {
        let ts = bars[0].timestamp;
        let is_last_of_day = is_last_interval_of_day(bars[0].interval, ts);

        // 1. Drain deferred orders whose execution timestamp equals this tick,
        // one symbol at a time.
        for bar in &bars {
            let mkt_fills = self.execution.drain_mkt_fills(bar, &self.commission, self.slippage.as_mut());
            for fill in mkt_fills {
                self.apply_fill(fill);
            }
            let moc_fills =
                self.execution
                    .drain_moc_fills(bar, is_last_of_day, &self.commission, self.slippage.as_mut());
            for fill in moc_fills {
                self.apply_fill(fill);
            }
        }

        // Negative-usable-cash guard, evaluated once at the start of the tick.
        let usable_cash = self.portfolio.usable_cash();
        if usable_cash < 0.0 {
            if self.config.continue_on_negative_cash {
                self.diagnostics.push(
                    ts,
                    DiagnosticKind::NegativeCashContinued,
                    format!("usable_cash={usable_cash:.2} at {ts}"),
                );
            } else {
                tracing::error!(usable_cash, %ts, "usable cash went negative, aborting run");
                return Err(BacktestError::InsufficientCash {
                    usable_cash,
                    ts: ts.to_rfc3339(),
                });
            }
        }

        let bar_date = ts.date_naive();
        if self.current_trading_date != Some(bar_date) {
            self.current_trading_date = Some(bar_date);
            self.daily_starting_equity = self.portfolio.equity(&self.last_close);
        }

        // 2-4. Ingest every symbol's bar into BarStore (fatal on ordering
        // violation), then aggregate higher frequencies; emit the base
        // MarketEvent too. `last_close` is updated for the whole tick before
        // any signal fires, so exposure checks see every symbol's current price.
        let mut closed_intervals: Vec<Bar> = Vec::new();
        for bar in &bars {
            self.bar_store.append(bar.clone())?;
            self.last_close.insert(bar.symbol.clone(), bar.close);
            self.slippage.record_bar(bar);
            tracing::debug!(symbol = %bar.symbol, interval = %bar.interval, close = bar.close, "bar ingested");
            for closed in self.aggregator.ingest(bar) {
                tracing::debug!(symbol = %closed.symbol, interval = %closed.interval, "interval closed");
                closed_intervals.push(closed);
            }
            closed_intervals.push(bar.clone());
        }

        // 5. Drain signals: size -> risk -> order -> defer.
        for closed_bar in &closed_intervals {
            let signals = self.strategies.dispatch(
                &closed_bar.symbol,
                closed_bar.interval,
                closed_bar.timestamp,
                closed_bar.open,
                closed_bar.high,
                closed_bar.low,
                closed_bar.close,
                closed_bar.volume,
            );
            if signals.is_empty() {
                continue;
            }
            let bar = bars
                .iter()
                .find(|b| b.symbol == closed_bar.symbol)
                .expect("a closed interval always has a matching tick bar for its symbol");
            for signal in signals {
                self.handle_signal(bar, signal.direction, signal.strength);
            }
        }

        // 6. Mark-to-market exactly once for the tick; accrue shorting costs
        // and margin once at day close, not once per symbol that closed one.
        self.portfolio.record_equity(ts, &self.last_close);
        if is_last_of_day {
            self.accrue_end_of_day();
        }

        Ok(())
    }

    fn handle_signal(&mut self, bar: &Bar, direction: SignalDirection, _strength: f64) {
        let equity = self.portfolio.equity(&self.last_close);
        let size = self
            .sizer
            .size(&bar.symbol, bar, equity)
            .unwrap_or_else(|| *self.last_target_size.get(&bar.symbol).unwrap_or(&0));
        self.last_target_size.insert(bar.symbol.clone(), size);

        let target_holding: i64 = match direction {
            SignalDirection::Bullish => size,
            SignalDirection::Bearish => -size,
            SignalDirection::Flat => 0,
        };

        let current_quantity = self
            .portfolio
            .position(&bar.symbol)
            .map_or(0, |p| p.quantity);
        let order_quantity = target_holding - current_quantity;
        if order_quantity == 0 {
            return;
        }

        let order_direction = if order_quantity > 0 {
            Direction::Buy
        } else {
            Direction::Sell
        };

        let gross_exposure_after = self.gross_exposure_after(&bar.symbol, target_holding, bar.close);
        let net_exposure_after = self.net_exposure_after(&bar.symbol, target_holding, bar.close, equity);

        let now_secs = bar.timestamp.timestamp();
        let recent: Vec<i64> = self.recent_order_timestamps.iter().copied().collect();
        let risk_input = RiskCheckInput {
            order_quantity,
            is_reducing: target_holding.abs() < current_quantity.abs(),
            last_close: bar.close,
            last_volume: bar.volume,
            equity,
            daily_starting_equity: self.daily_starting_equity,
            gross_exposure_after,
            net_exposure_after,
            recent_order_timestamps: &recent,
            now_secs,
        };

        if let Err(reason) = self.risk.evaluate(&risk_input) {
            self.diagnostics.push(
                bar.timestamp,
                DiagnosticKind::RiskRejection,
                format!("{} rejected: {}", bar.symbol, reason.code()),
            );
            self.trade_log.push(TradeLogEntry::Rejected(RejectionRecord {
                ts: bar.timestamp,
                symbol: bar.symbol.clone(),
                order_quantity,
                reason: reason.code().into(),
            }));
            return;
        }

        self.recent_order_timestamps.push_back(now_secs);
        let window_start = now_secs - self.config.risk.order_rate_window_secs;
        while matches!(self.recent_order_timestamps.front(), Some(&t) if t < window_start) {
            self.recent_order_timestamps.pop_front();
        }

        let order_id = self.id_gen.next_order_id();
        let estimated_cost =
            order_quantity.unsigned_abs() as f64 * bar.close * (1.0 + self.config.slippage_guard);
        if order_direction == Direction::Buy {
            self.portfolio.reserve_for_order(order_id, estimated_cost);
        }

        tracing::debug!(
            symbol = %bar.symbol,
            order_id = %order_id,
            quantity = order_quantity,
            direction = ?order_direction,
            "order scheduled"
        );
        self.execution.submit(
            order_id,
            bar.symbol.clone(),
            self.config.default_order_type,
            order_direction,
            order_quantity.unsigned_abs(),
        );
    }

    fn gross_exposure_after(&self, symbol: &str, new_quantity: i64, price: f64) -> f64 {
        let equity = self.portfolio.equity(&self.last_close).max(1e-9);
        let mut gross = 0.0;
        for (sym, pos) in &self.portfolio.positions {
            if sym == symbol {
                continue;
            }
            let px = self.last_close.get(sym).copied().unwrap_or(pos.avg_cost);
            gross += (pos.quantity as f64 * px).abs();
        }
        gross += (new_quantity as f64 * price).abs();
        gross / equity
    }

    fn net_exposure_after(&self, symbol: &str, new_quantity: i64, price: f64, equity: f64) -> f64 {
        let equity = equity.max(1e-9);
        let mut net = 0.0;
        for (sym, pos) in &self.portfolio.positions {
            if sym == symbol {
                continue;
            }
            let px = self.last_close.get(sym).copied().unwrap_or(pos.avg_cost);
            net += pos.quantity as f64 * px;
        }
        net += new_quantity as f64 * price;
        net / equity
    }

    fn apply_fill(&mut self, fill: Event) {
        if let Event::Fill {
            order_id,
            symbol,
            direction,
            quantity,
            fill_price,
            commission,
            slippage,
            slippage_fallback,
            ts,
        } = fill
        {
            if slippage_fallback {
                self.diagnostics.push(
                    ts,
                    DiagnosticKind::SlippageNumericalFallback,
                    format!("{symbol} fell back to spread-only slippage at {ts}"),
                );
            }

            let signed_qty = direction.sign() as i64 * quantity as i64;
            let position = self.portfolio.position_mut(&symbol);
            let realized_pnl = position.apply_fill(signed_qty, fill_price);

            let cash_delta = -direction.sign() * fill_price * quantity as f64 - commission;
            self.portfolio.cash += cash_delta;
            self.portfolio.total_commission += commission;
            self.portfolio.total_slippage += slippage.abs();
            self.portfolio.release_order_reservation(order_id);

            self.trade_log.push(TradeLogEntry::Filled(TradeRecord {
                ts,
                symbol,
                direction,
                quantity,
                price: fill_price,
                commission,
                slippage,
                order_id,
                realized_pnl,
            }));
        }
    }

    fn accrue_end_of_day(&mut self) {
        let daily_rate = self.shorting.annual_borrow_rate / self.shorting.trading_days_per_year;
        let mut margin_locked = 0.0;
        let mut total_borrow_cost = 0.0;
        for (symbol, position) in self.portfolio.positions.iter_mut() {
            if position.quantity >= 0 {
                continue;
            }
            let price = self.last_close.get(symbol).copied().unwrap_or(position.avg_cost);
            let notional = position.quantity.unsigned_abs() as f64 * price;
            let borrow_cost = notional * daily_rate;
            position.accrued_borrow_cost += borrow_cost;
            total_borrow_cost += borrow_cost;
            margin_locked += notional * self.shorting.maintenance_margin_multiplier;
        }
        self.portfolio.cash -= total_borrow_cost;
        self.portfolio.margin_locked = margin_locked;
    }
}
