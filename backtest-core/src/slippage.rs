//! Per-fill slippage: an EDGE spread estimate, market impact, and a
//! momentum/liquidity term, combined and perturbed by deterministic noise.

use crate::domain::{Bar, Direction};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlippageEstimate {
    pub slippage_frac: f64,
    /// Set when a numerical edge case (e.g. zero volume) forced a fall back
    /// to a spread-only estimate — surfaced to diagnostics, never fatal.
    pub fallback_triggered: bool,
}

pub trait SlippageModel {
    /// Record one more bar of history for the rolling windows. Called for
    /// every bar ingested, whether or not it produces a fill.
    fn record_bar(&mut self, bar: &Bar);

    /// Estimate the fractional slippage for a fill of `trade_qty` shares in
    /// `direction`, referencing the most recently recorded bar for `symbol`.
    /// Callers combine `slippage_frac` with `direction.sign()` and a reference
    /// price themselves, and surface `fallback_triggered` to diagnostics.
    fn estimate(&mut self, symbol: &str, direction: Direction, trade_qty: u64) -> SlippageEstimate;
}

pub struct NoSlippage;

impl SlippageModel for NoSlippage {
    fn record_bar(&mut self, _bar: &Bar) {}

    fn estimate(&mut self, _symbol: &str, _direction: Direction, _trade_qty: u64) -> SlippageEstimate {
        SlippageEstimate {
            slippage_frac: 0.0,
            fallback_triggered: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlippageWindows {
    pub short: usize,
    pub medium: usize,
    pub long: usize,
}

pub struct MultiFactorSlippage {
    windows: SlippageWindows,
    noise_sigma: f64,
    floor: f64,
    cap: f64,
    annualization_factor: f64,
    impact_coefficient: f64,
    history: HashMap<String, VecDeque<Bar>>,
    rng: StdRng,
}

impl MultiFactorSlippage {
    pub fn new(
        windows: SlippageWindows,
        noise_sigma: f64,
        floor: f64,
        cap: f64,
        annualization_factor: f64,
        impact_coefficient: f64,
        rng_seed: u64,
    ) -> Self {
        MultiFactorSlippage {
            windows,
            noise_sigma,
            floor,
            cap,
            annualization_factor,
            impact_coefficient,
            history: HashMap::new(),
            rng: StdRng::seed_from_u64(rng_seed),
        }
    }

    fn window_slice<'a>(history: &'a VecDeque<Bar>, n: usize) -> Vec<&'a Bar> {
        let len = history.len();
        let start = len.saturating_sub(n);
        history.iter().skip(start).collect()
    }

    fn log_returns(bars: &[&Bar]) -> Vec<f64> {
        bars.windows(2)
            .map(|pair| (pair[1].close / pair[0].close).ln())
            .collect()
    }

    fn sample_std(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
        var.sqrt()
    }

    fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// EDGE spread estimate (Ardia et al. 2024 in spirit): four components,
    /// one per open/close-equals-extreme indicator, combined by inverse-variance
    /// weighting over the log high/low range. Floored at zero.
    fn edge_spread(bars: &[&Bar]) -> f64 {
        if bars.len() < 2 {
            return 0.0;
        }
        let ranges: Vec<f64> = bars.iter().map(|b| b.high.ln() - b.low.ln()).collect();
        let categories: [fn(&Bar) -> bool; 4] = [
            |b| (b.open - b.high).abs() < f64::EPSILON,
            |b| (b.open - b.low).abs() < f64::EPSILON,
            |b| (b.close - b.high).abs() < f64::EPSILON,
            |b| (b.close - b.low).abs() < f64::EPSILON,
        ];

        let overall_mean = Self::mean(&ranges);
        let overall_var = Self::sample_std(&ranges).powi(2).max(1e-12);

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for category in categories {
            let flagged: Vec<f64> = bars
                .iter()
                .zip(ranges.iter())
                .filter(|(b, _)| category(*b))
                .map(|(_, r)| *r)
                .collect();

            let (component_mean, component_var) = if flagged.len() >= 2 {
                (Self::mean(&flagged), Self::sample_std(&flagged).powi(2).max(1e-12))
            } else {
                (overall_mean, overall_var)
            };

            let weight = 1.0 / component_var;
            weighted_sum += weight * component_mean;
            weight_total += weight;
        }

        if weight_total <= 0.0 {
            0.0
        } else {
            (weighted_sum / weight_total).max(0.0)
        }
    }
}

impl SlippageModel for MultiFactorSlippage {
    fn record_bar(&mut self, bar: &Bar) {
        let series = self.history.entry(bar.symbol.clone()).or_default();
        series.push_back(bar.clone());
        while series.len() > self.windows.long + 1 {
            series.pop_front();
        }
    }

    fn estimate(&mut self, symbol: &str, direction: Direction, trade_qty: u64) -> SlippageEstimate {
        let history = match self.history.get(symbol) {
            Some(h) if !h.is_empty() => h,
            _ => {
                return SlippageEstimate {
                    slippage_frac: 0.0,
                    fallback_triggered: false,
                }
            }
        };

        let today = history.back().expect("checked non-empty above");
        let medium_slice = Self::window_slice(history, self.windows.medium);
        let spread = Self::edge_spread(&medium_slice);

        let medium_returns = Self::log_returns(&medium_slice);
        let vol_medium = Self::sample_std(&medium_returns) * self.annualization_factor.sqrt();

        let medium_volumes: Vec<f64> = medium_slice.iter().map(|b| b.volume).collect();
        let mean_volume = Self::mean(&medium_volumes);
        let volume_std = Self::sample_std(&medium_volumes);

        let mut fallback_triggered = false;

        let turnover_cv = if mean_volume > 0.0 {
            volume_std / mean_volume
        } else {
            fallback_triggered = true;
            0.0
        };

        let return_today = if !medium_returns.is_empty() && medium_slice.len() >= 2 {
            *medium_returns.last().unwrap_or(&0.0)
        } else {
            0.0
        };

        let amihud = if today.close > 0.0 && today.volume > 0.0 {
            return_today.abs() / (today.close * today.volume)
        } else {
            fallback_triggered = true;
            0.0
        };

        let participation = if today.volume > 0.0 {
            trade_qty as f64 / today.volume
        } else {
            fallback_triggered = true;
            0.0
        };

        if fallback_triggered {
            let frac = (spread / 2.0).clamp(self.floor, self.cap);
            return SlippageEstimate {
                slippage_frac: frac,
                fallback_triggered: true,
            };
        }

        let momentum_cost = (direction.sign() * return_today).signum() * return_today.abs();
        let liquidity_cost = amihud * 1.0e6 + turnover_cv;

        let market_impact =
            self.impact_coefficient * vol_medium * participation.powf(0.6) * (-turnover_cv).exp();

        let mut slippage_frac = spread / 2.0 + market_impact + momentum_cost * liquidity_cost;

        if self.noise_sigma > 0.0 {
            let noise_dist = LogNormal::new(0.0_f64, self.noise_sigma).expect("valid sigma");
            let noise: f64 = noise_dist.sample(&mut self.rng);
            slippage_frac *= noise;
        }

        slippage_frac = slippage_frac.clamp(self.floor, self.cap);

        SlippageEstimate {
            slippage_frac,
            fallback_triggered: false,
        }
    }
}
