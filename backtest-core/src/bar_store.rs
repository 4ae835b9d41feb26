//! Append-only per-(symbol, interval) OHLCV history with O(1) "last N bars".

use crate::domain::{Bar, Interval};
use crate::error::{BacktestError, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct BarStore {
    series: HashMap<(String, Interval), Vec<Bar>>,
}

impl BarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bar, enforcing strictly increasing timestamps per (symbol, interval) — I5.
    pub fn append(&mut self, bar: Bar) -> Result<()> {
        let key = (bar.symbol.clone(), bar.interval);
        let series = self.series.entry(key).or_default();
        if let Some(last) = series.last() {
            if bar.timestamp <= last.timestamp {
                return Err(BacktestError::DataGap {
                    symbol: bar.symbol.clone(),
                    interval: bar.interval.to_string(),
                    last: last.timestamp.to_rfc3339(),
                    got: bar.timestamp.to_rfc3339(),
                });
            }
        }
        series.push(bar);
        Ok(())
    }

    pub fn last(&self, symbol: &str, interval: Interval) -> Option<&Bar> {
        self.series.get(&(symbol.to_string(), interval))?.last()
    }

    /// Last `n` bars, oldest first. Fewer than `n` are returned during warm-up.
    pub fn last_n(&self, symbol: &str, interval: Interval, n: usize) -> &[Bar] {
        match self.series.get(&(symbol.to_string(), interval)) {
            Some(series) => {
                let start = series.len().saturating_sub(n);
                &series[start..]
            }
            None => &[],
        }
    }

    pub fn len(&self, symbol: &str, interval: Interval) -> usize {
        self.series
            .get(&(symbol.to_string(), interval))
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, symbol: &str, interval: Interval) -> bool {
        self.len(symbol, interval) == 0
    }
}
