//! Cash, margin, and per-symbol positions for one backtest run.

use super::ids::OrderId;
use super::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the equity curve, recorded once per bar in `post_bar`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub cash: f64,
    pub reserved_cash: f64,
    pub margin_locked: f64,
    pub position_value: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub reserved_cash: f64,
    pub margin_locked: f64,
    pub positions: HashMap<String, Position>,
    pub equity_history: Vec<EquityPoint>,
    /// Cash reserved against each order still awaiting a fill, keyed by order id.
    pub in_flight_orders: HashMap<OrderId, f64>,
    pub total_commission: f64,
    pub total_slippage: f64,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Portfolio {
            cash: initial_cash,
            reserved_cash: 0.0,
            margin_locked: 0.0,
            positions: HashMap::new(),
            equity_history: Vec::new(),
            in_flight_orders: HashMap::new(),
            total_commission: 0.0,
            total_slippage: 0.0,
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn position_mut(&mut self, symbol: &str) -> &mut Position {
        self.positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol))
    }

    /// Cash actually available to size new orders against: cash minus what is
    /// already reserved for in-flight orders and locked as maintenance margin.
    pub fn usable_cash(&self) -> f64 {
        self.cash - self.reserved_cash - self.margin_locked
    }

    pub fn reserve_for_order(&mut self, order_id: OrderId, amount: f64) {
        self.reserved_cash += amount;
        self.in_flight_orders.insert(order_id, amount);
    }

    pub fn release_order_reservation(&mut self, order_id: OrderId) {
        if let Some(amount) = self.in_flight_orders.remove(&order_id) {
            self.reserved_cash -= amount;
        }
    }

    /// Sum of `quantity * mark_price` across all held positions.
    pub fn position_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| {
                let price = prices.get(&p.symbol).copied().unwrap_or(p.avg_cost);
                p.market_value(price)
            })
            .sum()
    }

    /// Canonical equity: cash plus the marked value of every open position.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        self.cash + self.position_value(prices)
    }

    pub fn record_equity(&mut self, ts: DateTime<Utc>, prices: &HashMap<String, f64>) {
        let position_value = self.position_value(prices);
        let point = EquityPoint {
            ts,
            cash: self.cash,
            reserved_cash: self.reserved_cash,
            margin_locked: self.margin_locked,
            position_value,
            equity: self.cash + position_value,
        };
        self.equity_history.push(point);
    }
}
