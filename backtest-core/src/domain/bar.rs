//! Bar — the fundamental market data unit, and the intervals bars are sampled at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A sampling interval, either sub-daily (minutes) or daily-and-up (days).
///
/// Alignment for `Days` intervals follows calendar day boundaries; alignment
/// for `Minutes` intervals follows modulo arithmetic on epoch seconds (see
/// `BarAggregator`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Minutes(u32),
    Days(u32),
}

impl Interval {
    /// Interval length in seconds. Only meaningful for sub-daily intervals.
    pub fn as_seconds(&self) -> i64 {
        match self {
            Interval::Minutes(m) => i64::from(*m) * 60,
            Interval::Days(d) => i64::from(*d) * 86_400,
        }
    }

    pub fn is_sub_daily(&self) -> bool {
        matches!(self, Interval::Minutes(_))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Minutes(m) => write!(f, "{m}m"),
            Interval::Days(d) => write!(f, "{d}d"),
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s.split_at(s.len().saturating_sub(1));
        let count: u32 = count
            .parse()
            .map_err(|_| format!("invalid interval count in {s:?}"))?;
        match unit {
            "m" => Ok(Interval::Minutes(count)),
            "d" => Ok(Interval::Days(count)),
            other => Err(format!("unknown interval unit {other:?} in {s:?}")),
        }
    }
}

/// OHLCV bar for a single symbol over a single interval.
///
/// `timestamp` is the *close time* of the interval it represents, never the
/// open time — the event loop and execution handler both depend on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub interval: Interval,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Basic OHLCV sanity check: high/low bound the other prices, prices positive.
    pub fn is_sane(&self) -> bool {
        !self.is_void()
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// True range given the previous bar's close (None for the first bar in a series).
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => hl.max((self.high - pc).abs()).max((self.low - pc).abs()),
            None => hl,
        }
    }
}
