//! Resamples a base-frequency bar stream into one or more higher frequencies.
//!
//! One "building bar" is kept per (symbol, target frequency). Each base bar
//! extends every building bar; when the base bar's timestamp lands on a
//! frequency's boundary, that building bar finalizes and a fresh one starts
//! with the *next* base bar (this bar, which closed it, is not inside the
//! next building bar).

use crate::domain::{Bar, Interval};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct BuildingBar {
    bar: Bar,
}

#[derive(Debug, Default)]
pub struct BarAggregator {
    targets: Vec<Interval>,
    building: HashMap<(String, Interval), BuildingBar>,
}

impl BarAggregator {
    pub fn new(targets: Vec<Interval>) -> Self {
        BarAggregator {
            targets,
            building: HashMap::new(),
        }
    }

    /// Feed one base-interval bar; returns finalized bars for any target
    /// frequency whose boundary this base bar closed, in target-frequency order.
    pub fn ingest(&mut self, base_bar: &Bar) -> Vec<Bar> {
        let mut closed = Vec::new();
        for &target in &self.targets {
            if target == base_bar.interval {
                continue;
            }
            let key = (base_bar.symbol.clone(), target);
            let is_first_ever = !self.building.contains_key(&key);

            let entry = self.building.entry(key.clone()).or_insert_with(|| BuildingBar {
                bar: Bar {
                    symbol: base_bar.symbol.clone(),
                    interval: target,
                    timestamp: base_bar.timestamp,
                    open: base_bar.open,
                    high: base_bar.high,
                    low: base_bar.low,
                    close: base_bar.close,
                    volume: base_bar.volume,
                },
            });

            if !is_first_ever {
                entry.bar.high = entry.bar.high.max(base_bar.high);
                entry.bar.low = entry.bar.low.min(base_bar.low);
                entry.bar.close = base_bar.close;
                entry.bar.volume += base_bar.volume;
                entry.bar.timestamp = base_bar.timestamp;
            }

            // Edge case: a base bar with no prior building bar never closes a
            // higher-frequency interval on its own arrival.
            if !is_first_ever && boundary_closes(target, base_bar.timestamp) {
                let finished = self.building.remove(&key).expect("just inserted").bar;
                closed.push(finished);
            }
        }
        closed
    }
}

/// True if `ts` lands on the closing boundary of `interval`.
fn boundary_closes(interval: Interval, ts: chrono::DateTime<chrono::Utc>) -> bool {
    match interval {
        Interval::Minutes(m) => {
            let epoch_minutes = ts.timestamp() / 60;
            epoch_minutes % i64::from(m) == 0
        }
        Interval::Days(d) => {
            let epoch_days = ts.timestamp() / 86_400;
            epoch_days % i64::from(d) == 0
        }
    }
}
