//! The external strategy interface and the host that dispatches bar closes to it.

use crate::domain::{Interval, SignalDirection};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct Signal {
    pub direction: SignalDirection,
    pub strength: f64,
}

/// Implemented by external strategies. The core only ever calls `on_interval`;
/// target quantity is decided by the sizer, never by the strategy itself.
pub trait Strategy {
    fn on_interval(
        &mut self,
        symbol: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Option<Signal>;

    /// The frequencies this strategy wants bar closes for.
    fn subscribed_intervals(&self) -> &[Interval];
}

/// Dispatches closed bars, at whichever frequency they closed, to every
/// strategy subscribed to that frequency.
#[derive(Default)]
pub struct StrategyHost {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    /// Dispatch one closed bar to every subscribed strategy, collecting signals.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &mut self,
        symbol: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Vec<Signal> {
        self.strategies
            .iter_mut()
            .filter(|s| s.subscribed_intervals().contains(&interval))
            .filter_map(|s| s.on_interval(symbol, interval, timestamp, open, high, low, close, volume))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBullish {
        intervals: Vec<Interval>,
    }

    impl Strategy for AlwaysBullish {
        fn on_interval(
            &mut self,
            _symbol: &str,
            _interval: Interval,
            _timestamp: DateTime<Utc>,
            _open: f64,
            _high: f64,
            _low: f64,
            _close: f64,
            _volume: f64,
        ) -> Option<Signal> {
            Some(Signal {
                direction: SignalDirection::Bullish,
                strength: 1.0,
            })
        }

        fn subscribed_intervals(&self) -> &[Interval] {
            &self.intervals
        }
    }

    #[test]
    fn host_only_dispatches_to_subscribed_interval() {
        let mut host = StrategyHost::new();
        host.register(Box::new(AlwaysBullish {
            intervals: vec![Interval::Days(1)],
        }));

        let ts = Utc::now();
        let signals = host.dispatch("AAPL", Interval::Minutes(5), ts, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!(signals.is_empty());

        let signals = host.dispatch("AAPL", Interval::Days(1), ts, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert_eq!(signals.len(), 1);
    }
}
