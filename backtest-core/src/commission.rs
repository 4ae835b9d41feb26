//! Commission model: per-share, per-trade, and bps-of-notional components summed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionModel {
    pub per_share: f64,
    pub per_trade: f64,
    pub bps: f64,
}

impl CommissionModel {
    pub fn compute(&self, quantity: u64, price: f64) -> f64 {
        let notional = quantity as f64 * price;
        self.per_share * quantity as f64 + self.per_trade + self.bps / 10_000.0 * notional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_all_three_components() {
        let model = CommissionModel {
            per_share: 0.01,
            per_trade: 1.0,
            bps: 5.0,
        };
        // 100 shares at $50: 1.0 (per_share) + 1.0 (per_trade) + 5/10000*5000 = 2.5 -> 4.5
        assert_eq!(model.compute(100, 50.0), 4.5);
    }

    #[test]
    fn zero_model_is_free() {
        let model = CommissionModel {
            per_share: 0.0,
            per_trade: 0.0,
            bps: 0.0,
        };
        assert_eq!(model.compute(1_000, 100.0), 0.0);
    }

    proptest::proptest! {
        /// Commission never decreases as quantity grows, for any non-negative
        /// model and price — each component is monotone in quantity.
        #[test]
        fn commission_is_monotone_in_quantity(
            per_share in 0.0f64..5.0,
            per_trade in 0.0f64..50.0,
            bps in 0.0f64..100.0,
            price in 0.01f64..10_000.0,
            qty_a in 0u64..1_000_000,
            qty_extra in 0u64..1_000_000,
        ) {
            let model = CommissionModel { per_share, per_trade, bps };
            let qty_b = qty_a + qty_extra;
            proptest::prop_assert!(model.compute(qty_b, price) >= model.compute(qty_a, price) - 1e-9);
        }
    }
}
