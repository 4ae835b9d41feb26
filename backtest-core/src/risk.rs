//! Sequential pre-trade risk checks. Each cap is disabled by configuring `-1`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_order_quantity: f64,
    pub max_notional: f64,
    pub max_daily_drawdown_pct: f64,
    pub max_gross_exposure: f64,
    pub max_net_exposure: f64,
    pub pov_cap: f64,
    pub max_orders_per_window: f64,
    pub order_rate_window_secs: i64,
}

impl RiskConfig {
    fn enabled(cap: f64) -> bool {
        cap >= 0.0
    }
}

/// Everything a risk check needs about the order under evaluation and the
/// portfolio/market state it is being evaluated against.
pub struct RiskCheckInput<'a> {
    pub order_quantity: i64,
    pub is_reducing: bool,
    pub last_close: f64,
    pub last_volume: f64,
    pub equity: f64,
    pub daily_starting_equity: f64,
    pub gross_exposure_after: f64,
    pub net_exposure_after: f64,
    pub recent_order_timestamps: &'a [i64],
    pub now_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    MaxOrderQuantityExceeded,
    MaxNotionalExceeded,
    DailyDrawdownBreachedNonReducingOnly,
    GrossExposureExceeded,
    NetExposureExceeded,
    PovExceeded,
    OrderRateExceeded,
}

impl RejectReason {
    /// The machine-readable reason string recorded in the trade log.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MaxOrderQuantityExceeded => "max_order_quantity_exceeded",
            RejectReason::MaxNotionalExceeded => "max_notional_exceeded",
            RejectReason::DailyDrawdownBreachedNonReducingOnly => {
                "daily_drawdown_breached_non_reducing_only"
            }
            RejectReason::GrossExposureExceeded => "gross_exposure_exceeded",
            RejectReason::NetExposureExceeded => "net_exposure_exceeded",
            RejectReason::PovExceeded => "pov_exceeded",
            RejectReason::OrderRateExceeded => "order_rate_exceeded",
        }
    }
}

pub struct RiskManager {
    pub config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        RiskManager { config }
    }

    /// Runs the seven checks in spec order; the first failure rejects.
    pub fn evaluate(&self, input: &RiskCheckInput) -> Result<(), RejectReason> {
        let cfg = &self.config;

        if RiskConfig::enabled(cfg.max_order_quantity)
            && input.order_quantity.unsigned_abs() as f64 > cfg.max_order_quantity
        {
            return Err(RejectReason::MaxOrderQuantityExceeded);
        }

        let notional = input.order_quantity.unsigned_abs() as f64 * input.last_close;
        if RiskConfig::enabled(cfg.max_notional) && notional > cfg.max_notional {
            return Err(RejectReason::MaxNotionalExceeded);
        }

        if RiskConfig::enabled(cfg.max_daily_drawdown_pct) && !input.is_reducing {
            let decline = 1.0 - input.equity / input.daily_starting_equity;
            if decline >= cfg.max_daily_drawdown_pct {
                return Err(RejectReason::DailyDrawdownBreachedNonReducingOnly);
            }
        }

        if RiskConfig::enabled(cfg.max_gross_exposure)
            && input.gross_exposure_after > cfg.max_gross_exposure
        {
            return Err(RejectReason::GrossExposureExceeded);
        }

        if RiskConfig::enabled(cfg.max_net_exposure)
            && input.net_exposure_after.abs() > cfg.max_net_exposure
        {
            return Err(RejectReason::NetExposureExceeded);
        }

        if RiskConfig::enabled(cfg.pov_cap) && input.last_volume > 0.0 {
            let pov = input.order_quantity.unsigned_abs() as f64 / input.last_volume;
            if pov > cfg.pov_cap {
                return Err(RejectReason::PovExceeded);
            }
        }

        if RiskConfig::enabled(cfg.max_orders_per_window) {
            let window_start = input.now_secs - self.config.order_rate_window_secs;
            let count = input
                .recent_order_timestamps
                .iter()
                .filter(|&&t| t >= window_start)
                .count();
            if count as f64 >= cfg.max_orders_per_window {
                return Err(RejectReason::OrderRateExceeded);
            }
        }

        Ok(())
    }
}
