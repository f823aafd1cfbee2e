//! Candle source port trait.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::candle::Candle;
use crate::domain::error::BacktesterError;

pub trait DataPort: Send + Sync {
    /// Retained candles decoded from the already-read bytes of `path`.
    fn decode_candles(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Candle>, BacktesterError>;

    /// Retained candles of one instrument file, in file order.
    fn load_candles(&self, path: &Path) -> Result<Vec<Candle>, BacktesterError> {
        let bytes = fs::read(path).map_err(|e| BacktesterError::SourceRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.decode_candles(path, &bytes)
    }

    /// Instrument files of a dataset directory, sorted by path.
    fn list_instrument_files(&self, dir: &Path) -> Result<Vec<PathBuf>, BacktesterError>;
}

/// Instrument name of a source file: its base name without extension.
pub fn instrument_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
