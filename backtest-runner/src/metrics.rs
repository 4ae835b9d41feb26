//! Performance metrics — pure functions over an equity curve and trade log.
//!
//! Every metric takes the data it needs and returns a scalar; nothing here
//! depends on the engine or the bar source.

use backtest_core::engine::{TradeLogEntry, TradeRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration_intervals: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub turnover: f64,
    pub trade_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(
        equity_curve: &[f64],
        trade_log: &[TradeLogEntry],
        initial_capital: f64,
        annualization_factor: f64,
    ) -> Self {
        let fills: Vec<&TradeRecord> = trade_log
            .iter()
            .filter_map(|e| match e {
                TradeLogEntry::Filled(r) => Some(r),
                TradeLogEntry::Rejected(_) => None,
            })
            .collect();
        let (max_dd, dd_duration) = max_drawdown_with_duration(equity_curve);

        PerformanceMetrics {
            total_return: total_return(equity_curve),
            cagr: cagr(equity_curve, annualization_factor),
            sharpe: sharpe_ratio(equity_curve, annualization_factor),
            max_drawdown: max_dd,
            max_drawdown_duration_intervals: dd_duration,
            win_rate: win_rate(&fills),
            profit_factor: profit_factor(&fills),
            turnover: turnover(&fills, initial_capital),
            trade_count: fills.len(),
        }
    }
}

fn interval_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&final_eq)) if initial > 0.0 => (final_eq - initial) / initial,
        _ => 0.0,
    }
}

/// Compound annual growth rate, using `annualization_factor` intervals per year.
pub fn cagr(equity_curve: &[f64], annualization_factor: f64) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let initial = equity_curve[0];
    let final_eq = *equity_curve.last().unwrap();
    if initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = equity_curve.len() as f64 / annualization_factor;
    if years <= 0.0 {
        return 0.0;
    }
    (final_eq / initial).powf(1.0 / years) - 1.0
}

pub fn sharpe_ratio(equity_curve: &[f64], annualization_factor: f64) -> f64 {
    let returns = interval_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean(&returns) / std) * annualization_factor.sqrt()
}

/// Max drawdown as a negative fraction, plus how many intervals the trough
/// took to form from its preceding peak.
pub fn max_drawdown_with_duration(equity_curve: &[f64]) -> (f64, usize) {
    if equity_curve.len() < 2 {
        return (0.0, 0);
    }
    let mut peak = equity_curve[0];
    let mut peak_idx = 0;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;

    for (i, &eq) in equity_curve.iter().enumerate() {
        if eq > peak {
            peak = eq;
            peak_idx = i;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
                max_dd_duration = i - peak_idx;
            }
        }
    }
    (max_dd, max_dd_duration)
}

/// Fraction of realizing fills (those that closed or reduced a position) with
/// positive realized P&L. Fills that only open or add to a position carry
/// zero realized P&L and are excluded from the denominator.
pub fn win_rate(fills: &[&TradeRecord]) -> f64 {
    let realizing: Vec<&&TradeRecord> = fills.iter().filter(|t| t.realized_pnl != 0.0).collect();
    if realizing.is_empty() {
        return 0.0;
    }
    let winners = realizing.iter().filter(|t| t.realized_pnl > 0.0).count();
    winners as f64 / realizing.len() as f64
}

/// Gross realized profit divided by gross realized loss, capped at 100.0.
pub fn profit_factor(fills: &[&TradeRecord]) -> f64 {
    let gross_profit: f64 = fills.iter().filter(|t| t.realized_pnl > 0.0).map(|t| t.realized_pnl).sum();
    let gross_loss: f64 = fills.iter().filter(|t| t.realized_pnl < 0.0).map(|t| t.realized_pnl.abs()).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Total traded notional divided by starting capital.
pub fn turnover(fills: &[&TradeRecord], initial_capital: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    let notional: f64 = fills.iter().map(|t| t.price * t.quantity as f64).sum();
    notional / initial_capital
}
