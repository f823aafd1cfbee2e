#![allow(dead_code)]

use backtester::domain::candle::Candle;
use backtester::domain::error::BacktesterError;
use backtester::domain::indicator::IndicatorSeries;
use backtester::domain::stock_data::StockData;
use backtester::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory candle source keyed by file path. The files must still exist on
/// disk because the cache hashes their bytes.
pub struct MockDataPort {
    pub candles: HashMap<PathBuf, Vec<Candle>>,
    pub loads: AtomicUsize,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            candles: HashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_candles(mut self, path: &Path, candles: Vec<Candle>) -> Self {
        self.candles.insert(path.to_path_buf(), candles);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DataPort for MockDataPort {
    fn decode_candles(&self, path: &Path, _bytes: &[u8]) -> Result<Vec<Candle>, BacktesterError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.candles
            .get(path)
            .cloned()
            .ok_or_else(|| BacktesterError::SourceRead {
                path: path.to_path_buf(),
                reason: "not registered".into(),
            })
    }

    fn list_instrument_files(&self, _dir: &Path) -> Result<Vec<PathBuf>, BacktesterError> {
        let mut files: Vec<PathBuf> = self.candles.keys().cloned().collect();
        files.sort();
        Ok(files)
    }
}

/// A valid candle around `close`.
pub fn make_candle(date: &str, close: f64) -> Candle {
    Candle {
        date: date.to_string(),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

/// `count` candles with a repeating zig-zag close pattern.
pub fn zigzag_candles(count: usize, base: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let close = base + [0.0, 2.0, 1.0, 3.0, 1.5, 4.0, 0.5][i % 7] + i as f64 * 0.1;
            make_candle(&format!("2024-{:02}-{:02}", 1 + i / 28, 1 + i % 28), close)
        })
        .collect()
}

pub fn candles_to_csv(candles: &[Candle]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.date, c.open, c.high, c.low, c.close, c.volume
        ));
    }
    out
}

pub fn write_csv(dir: &Path, instrument: &str, candles: &[Candle]) -> PathBuf {
    let path = dir.join(format!("{instrument}.csv"));
    fs::write(&path, candles_to_csv(candles)).unwrap();
    path
}

/// StockData carrying only a close series, for simulator-level tests.
pub fn stock_with_closes(closes: &[f64]) -> StockData {
    let mut indicators = IndicatorSeries::new();
    indicators.insert("ClosePrice".into(), closes.to_vec());
    StockData {
        dates: (0..closes.len()).map(|i| format!("d{i}")).collect(),
        indicators,
        quantile_indicators: Default::default(),
    }
}

pub fn encoded(data: &StockData) -> Vec<u8> {
    bincode::serialize(data).unwrap()
}
