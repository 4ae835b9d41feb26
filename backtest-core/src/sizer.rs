//! Position sizing: an ATR-based sizer with Wilder smoothing, and a fixed-size sizer.

use crate::domain::Bar;
use std::collections::HashMap;

/// Target absolute share count, or `None` when the sizer cannot yet produce one
/// (ATR warm-up). Callers reuse the previous size in that case.
pub trait Sizer {
    fn size(&mut self, symbol: &str, bar: &Bar, total_equity: f64) -> Option<i64>;
}

#[derive(Debug, Clone)]
struct AtrState {
    prev_close: Option<f64>,
    /// True-range values accumulated until the warm-up window is full.
    warmup_trs: Vec<f64>,
    atr: Option<f64>,
}

impl Default for AtrState {
    fn default() -> Self {
        AtrState {
            prev_close: None,
            warmup_trs: Vec::new(),
            atr: None,
        }
    }
}

/// `capital_to_risk = risk_per_trade_pct * equity`, `stop_distance = ATR * atr_multiplier`,
/// `target_qty = floor(capital_to_risk / stop_distance, decimal_places)`.
pub struct AtrSizer {
    pub period: usize,
    pub atr_multiplier: f64,
    pub risk_per_trade_pct: f64,
    pub initial_position_size: i64,
    pub decimal_places: i32,
    state: HashMap<String, AtrState>,
    first_call_done: bool,
}

impl AtrSizer {
    pub fn new(
        period: usize,
        atr_multiplier: f64,
        risk_per_trade_pct: f64,
        initial_position_size: i64,
        decimal_places: i32,
    ) -> Self {
        AtrSizer {
            period,
            atr_multiplier,
            risk_per_trade_pct,
            initial_position_size,
            decimal_places,
            state: HashMap::new(),
            first_call_done: false,
        }
    }

    fn update_atr(&mut self, symbol: &str, bar: &Bar) -> Option<f64> {
        let state = self.state.entry(symbol.to_string()).or_default();
        let tr = bar.true_range(state.prev_close);
        state.prev_close = Some(bar.close);

        match state.atr {
            Some(prev_atr) => {
                let n = self.period as f64;
                let atr = ((n - 1.0) * prev_atr + tr) / n;
                state.atr = Some(atr);
            }
            None => {
                state.warmup_trs.push(tr);
                if state.warmup_trs.len() == self.period {
                    let seed = state.warmup_trs.iter().sum::<f64>() / self.period as f64;
                    state.atr = Some(seed);
                    state.warmup_trs.clear();
                }
            }
        }
        state.atr
    }

    fn round_down(value: f64, decimal_places: i32) -> f64 {
        let factor = 10f64.powi(decimal_places);
        (value * factor).floor() / factor
    }
}

impl Sizer for AtrSizer {
    fn size(&mut self, symbol: &str, bar: &Bar, total_equity: f64) -> Option<i64> {
        let atr = self.update_atr(symbol, bar);

        if !self.first_call_done {
            self.first_call_done = true;
            if atr.is_none() {
                return Some(self.initial_position_size);
            }
        }

        let atr = atr?;
        if atr <= 0.0 {
            return Some(0);
        }

        let capital_to_risk = self.risk_per_trade_pct * total_equity;
        let stop_distance = atr * self.atr_multiplier;
        let target = Self::round_down(capital_to_risk / stop_distance, self.decimal_places);
        Some(target.floor() as i64)
    }
}

/// Always returns the same configured share count; ignores ATR entirely.
pub struct FixedSizer {
    pub quantity: i64,
}

impl Sizer for FixedSizer {
    fn size(&mut self, _symbol: &str, _bar: &Bar, _total_equity: f64) -> Option<i64> {
        Some(self.quantity)
    }
}
