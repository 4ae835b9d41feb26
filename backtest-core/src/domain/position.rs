//! A single symbol's holding. Quantity is signed: negative means short.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: f64,
    pub accrued_borrow_cost: f64,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Position {
            symbol: symbol.into(),
            quantity: 0,
            avg_cost: 0.0,
            accrued_borrow_cost: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// Apply a signed fill quantity (positive = bought, negative = sold) at `fill_price`.
    /// Returns realized P&L booked by this fill, if any (when reducing or flipping a position).
    pub fn apply_fill(&mut self, signed_qty: i64, fill_price: f64) -> f64 {
        if signed_qty == 0 {
            return 0.0;
        }

        let same_direction = self.quantity == 0
            || (self.quantity > 0 && signed_qty > 0)
            || (self.quantity < 0 && signed_qty < 0);

        if same_direction {
            let total_cost = self.avg_cost * self.quantity as f64 + fill_price * signed_qty as f64;
            self.quantity += signed_qty;
            self.avg_cost = if self.quantity != 0 {
                total_cost / self.quantity as f64
            } else {
                0.0
            };
            0.0
        } else {
            let closing_qty = signed_qty.abs().min(self.quantity.abs());
            let realized = closing_qty as f64
                * (fill_price - self.avg_cost)
                * if self.quantity > 0 { 1.0 } else { -1.0 };

            self.quantity += signed_qty;
            if self.quantity == 0 {
                self.avg_cost = 0.0;
            } else if self.quantity.signum() != (self.quantity - signed_qty).signum() {
                // flipped through flat: remaining quantity opens fresh at fill_price
                self.avg_cost = fill_price;
            }
            realized
        }
    }
}
