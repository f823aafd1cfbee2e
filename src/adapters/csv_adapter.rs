//! CSV candle source.
//!
//! One file per instrument, header row skipped, columns
//! `date, open, high, low, close, volume` in that order. Malformed rows are
//! dropped rather than reported.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::candle::Candle;
use crate::domain::error::BacktesterError;
use crate::ports::data_port::DataPort;

const COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvAdapter;

impl CsvAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parse candles from raw CSV bytes.
    pub fn parse_candles(bytes: &[u8]) -> Vec<Candle> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let mut dropped = 0usize;
        let candles: Vec<Candle> = rdr
            .records()
            .filter_map(|record| {
                let candle = record.ok().and_then(|r| parse_record(&r));
                if candle.is_none() {
                    dropped += 1;
                }
                candle
            })
            .collect();

        if dropped > 0 {
            tracing::debug!(dropped, retained = candles.len(), "dropped malformed rows");
        }
        candles
    }
}

fn parse_record(record: &csv::StringRecord) -> Option<Candle> {
    if record.len() != COLUMNS {
        return None;
    }
    let number = |i: usize| record.get(i)?.parse::<f64>().ok();
    let candle = Candle {
        date: record.get(0)?.to_string(),
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5)?,
    };
    candle.is_valid().then_some(candle)
}

impl DataPort for CsvAdapter {
    fn decode_candles(&self, _path: &Path, bytes: &[u8]) -> Result<Vec<Candle>, BacktesterError> {
        Ok(Self::parse_candles(bytes))
    }

    fn list_instrument_files(&self, dir: &Path) -> Result<Vec<PathBuf>, BacktesterError> {
        let entries = fs::read_dir(dir).map_err(|e| BacktesterError::SourceRead {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}
