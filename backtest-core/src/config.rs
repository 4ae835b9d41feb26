//! Engine-level configuration: everything the core needs to run a backtest,
//! independent of how bars are sourced or strategies are wired up (the
//! runner crate owns that application-level assembly).

use crate::commission::CommissionModel;
use crate::domain::{Interval, OrderType};
use crate::error::{BacktestError, Result};
use crate::risk::RiskConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShortingConfig {
    pub annual_borrow_rate: f64,
    pub maintenance_margin_multiplier: f64,
    pub trading_days_per_year: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SizerConfig {
    Atr {
        period: usize,
        atr_multiplier: f64,
        risk_per_trade: f64,
        initial_position_size: i64,
        decimal_places: i32,
    },
    Fixed {
        quantity: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SlippageConfig {
    None,
    MultiFactor {
        short_window: usize,
        medium_window: usize,
        long_window: usize,
        noise_sigma: f64,
        floor: f64,
        cap: f64,
        impact_coefficient: f64,
        /// Required when `base_interval` is sub-daily (§9 open question): the
        /// model's parameters are daily-calibrated and must not silently
        /// auto-rescale.
        annualization_factor: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub base_interval: Interval,
    pub additional_frequencies: Vec<Interval>,
    pub initial_cash: f64,
    pub default_order_type: OrderType,
    pub slippage_guard: f64,
    pub position_sizer: SizerConfig,
    pub slippage: SlippageConfig,
    pub commissions: CommissionModel,
    pub risk: RiskConfig,
    pub shorting: ShortingConfig,
    pub continue_on_negative_cash: bool,
    pub rng_seed: u64,
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_cash <= 0.0 {
            return Err(BacktestError::Config(
                "initial_cash must be positive".into(),
            ));
        }
        if let SlippageConfig::MultiFactor {
            annualization_factor,
            ..
        } = &self.slippage
        {
            if self.base_interval.is_sub_daily() && annualization_factor.is_none() {
                return Err(BacktestError::Config(
                    "multi_factor slippage requires an explicit annualization_factor override \
                     when base_interval is sub-daily (parameters are daily-calibrated)"
                        .into(),
                ));
            }
        }
        if matches!(self.position_sizer, SizerConfig::Atr { period, .. } if period == 0) {
            return Err(BacktestError::Config(
                "atr sizer period must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BacktestError::Config(e.to_string()))
    }
}
