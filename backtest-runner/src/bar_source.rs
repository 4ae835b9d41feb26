//! Bar sourcing: the engine consumes `Result<Bar>` from any iterator, but
//! something has to own parsing and I/O errors. `BarSource` is that seam; a
//! minimal CSV-backed implementation is provided here so the crate is
//! runnable end-to-end without pulling in a market-data client.

use backtest_core::domain::{Bar, Interval};
use backtest_core::{BacktestError, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Produces bars in strictly increasing timestamp order for a single symbol.
/// Implementations may read from disk, a database, or a live feed; the
/// engine only ever asks for the next bar.
pub trait BarSource {
    fn next_bar(&mut self) -> Option<Result<Bar>>;
}

impl<T: BarSource> Iterator for BarSourceIter<T> {
    type Item = Result<Bar>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_bar()
    }
}

/// Adapts any `BarSource` into the plain iterator the engine expects.
pub struct BarSourceIter<T>(pub T);

/// Reads OHLCV bars from a CSV file with a `timestamp,open,high,low,close,volume`
/// header (RFC 3339 timestamps). `symbol` and `interval` are supplied by the
/// caller since the file itself carries neither.
pub struct CsvBarSource {
    symbol: String,
    interval: Interval,
    reader: csv::Reader<BufReader<File>>,
}

impl CsvBarSource {
    pub fn open(path: impl AsRef<Path>, symbol: impl Into<String>, interval: Interval) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        Ok(CsvBarSource {
            symbol: symbol.into(),
            interval,
            reader,
        })
    }

    fn parse_record(&self, record: &csv::StringRecord) -> Result<Bar> {
        let field = |idx: usize, name: &str| -> Result<&str> {
            record
                .get(idx)
                .ok_or_else(|| BacktestError::BarSource(format!("missing column {name} in CSV row")))
        };
        let parse_f64 = |s: &str, name: &str| -> Result<f64> {
            s.parse::<f64>()
                .map_err(|e| BacktestError::BarSource(format!("invalid {name} {s:?}: {e}")))
        };

        let ts_raw = field(0, "timestamp")?;
        let timestamp: DateTime<Utc> = ts_raw
            .parse()
            .map_err(|e| BacktestError::BarSource(format!("invalid timestamp {ts_raw:?}: {e}")))?;

        Ok(Bar {
            symbol: self.symbol.clone(),
            interval: self.interval,
            timestamp,
            open: parse_f64(field(1, "open")?, "open")?,
            high: parse_f64(field(2, "high")?, "high")?,
            low: parse_f64(field(3, "low")?, "low")?,
            close: parse_f64(field(4, "close")?, "close")?,
            volume: parse_f64(field(5, "volume")?, "volume")?,
        })
    }
}

impl BarSource for CsvBarSource {
    fn next_bar(&mut self) -> Option<Result<Bar>> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => Some(self.parse_record(&record)),
            Ok(false) => None,
            Err(e) => Some(Err(BacktestError::BarSource(e.to_string()))),
        }
    }
}
