//! The tagged event variants that flow through the event queue each tick.

use super::ids::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Flat,
}

/// Market vs market-on-close; there are no limit/stop order types (spec Non-goal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    MarketOnClose,
}

/// One event in the per-tick FIFO queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Market {
        ts: DateTime<Utc>,
    },
    Signal {
        symbol: String,
        direction: SignalDirection,
        target_holding: i64,
        strength: f64,
        ts: DateTime<Utc>,
    },
    Order {
        id: OrderId,
        symbol: String,
        order_type: OrderType,
        direction: Direction,
        quantity: u64,
        estimated_cost: f64,
        ts: DateTime<Utc>,
    },
    Fill {
        order_id: OrderId,
        symbol: String,
        direction: Direction,
        quantity: u64,
        fill_price: f64,
        commission: f64,
        slippage: f64,
        /// Set when the slippage model fell back to a spread-only estimate
        /// because of a numerical edge case (e.g. zero volume).
        slippage_fallback: bool,
        ts: DateTime<Utc>,
    },
}
