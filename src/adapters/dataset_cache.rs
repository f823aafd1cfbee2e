//! Content-addressed cache of computed [`StockData`].
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<dir name>-<path digest>/ChecksumTable.json   path -> hex sha256
//! <root>/<dir name>-<path digest>/<instrument>.bin     bincode envelope
//! ```
//!
//! The path digest is the first 16 hex digits of the sha256 of the
//! canonical dataset directory, so two directories sharing a base name never
//! share a cache directory. Each source file is read once per load; its
//! checksum and its candles come from the same bytes.
//!
//! A blob is reused only when the checksum table holds the current hash of
//! the source file. A matching entry whose blob is missing or unreadable is
//! an integrity error, never silently recomputed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::domain::dataset::Dataset;
use crate::domain::error::BacktesterError;
use crate::domain::indicator::MIN_WINDOW;
use crate::domain::stock_data::StockData;
use crate::ports::data_port::{DataPort, instrument_name};

pub const CHECKSUM_TABLE: &str = "ChecksumTable.json";
const ENVELOPE_VERSION: u32 = 1;
const DIR_DIGEST_LEN: usize = 16;

pub type ChecksumTable = BTreeMap<String, String>;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    window: usize,
    data: StockData,
}

pub struct DatasetCache {
    root: PathBuf,
    source: Arc<dyn DataPort>,
}

impl DatasetCache {
    /// Cache rooted at `root`, reading instrument files as CSV.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_source(root, Arc::new(CsvAdapter::new()))
    }

    pub fn with_source(root: impl Into<PathBuf>, source: Arc<dyn DataPort>) -> Self {
        Self {
            root: root.into(),
            source,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache directory scoped to one dataset directory.
    pub fn cache_dir(&self, dataset_dir: &Path) -> PathBuf {
        let resolved = fs::canonicalize(dataset_dir).unwrap_or_else(|_| dataset_dir.to_path_buf());
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let digest = sha256_hex(resolved.to_string_lossy().as_bytes());
        self.root.join(format!("{name}-{}", &digest[..DIR_DIGEST_LEN]))
    }

    /// Load one instrument file, reusing its cached blob when unchanged.
    pub fn load_stock_data(&self, path: &Path, window: usize) -> Result<StockData, BacktesterError> {
        check_window(window)?;
        let dataset_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let cache_dir = self.prepare(dataset_dir)?;
        let mut table = read_table(&cache_dir)?;

        let (checksum, data) = self.resolve(&cache_dir, &table, path, window)?;
        table.insert(table_key(path), checksum);
        write_table(&cache_dir, &table)?;
        Ok(data)
    }

    /// Load every instrument file of `dataset_dir` in parallel.
    ///
    /// The checksum table is read once before the fan-out and written once
    /// after it. Any failing file aborts the whole load.
    pub fn load_dataset(&self, dataset_dir: &Path, window: usize) -> Result<Dataset, BacktesterError> {
        check_window(window)?;
        let files = self.source.list_instrument_files(dataset_dir)?;
        let cache_dir = self.prepare(dataset_dir)?;
        let mut table = read_table(&cache_dir)?;

        let loaded: Vec<Result<(PathBuf, String, StockData), BacktesterError>> = files
            .par_iter()
            .map(|path| {
                let (checksum, data) = self.resolve(&cache_dir, &table, path, window)?;
                Ok((path.clone(), checksum, data))
            })
            .collect();

        let mut dataset = Dataset::new();
        for result in loaded {
            let (path, checksum, data) = result?;
            table.insert(table_key(&path), checksum);
            dataset.insert(instrument_name(&path), data);
        }
        write_table(&cache_dir, &table)?;

        tracing::info!(
            dataset = %dataset_dir.display(),
            instruments = dataset.len(),
            window,
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Remove the cache directory of `dataset_dir`. Returns whether it existed.
    pub fn clear(&self, dataset_dir: &Path) -> Result<bool, BacktesterError> {
        let cache_dir = self.cache_dir(dataset_dir);
        if !cache_dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&cache_dir).map_err(|e| BacktesterError::CacheWrite {
            path: cache_dir.clone(),
            reason: e.to_string(),
        })?;
        tracing::info!(cache = %cache_dir.display(), "cache cleared");
        Ok(true)
    }

    fn prepare(&self, dataset_dir: &Path) -> Result<PathBuf, BacktesterError> {
        let cache_dir = self.cache_dir(dataset_dir);
        fs::create_dir_all(&cache_dir).map_err(|e| BacktesterError::CacheWrite {
            path: cache_dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(cache_dir)
    }

    fn resolve(
        &self,
        cache_dir: &Path,
        table: &ChecksumTable,
        path: &Path,
        window: usize,
    ) -> Result<(String, StockData), BacktesterError> {
        let bytes = fs::read(path).map_err(|e| BacktesterError::SourceRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let checksum = sha256_hex(&bytes);
        let blob = cache_dir.join(format!("{}.bin", instrument_name(path)));

        if table.get(&table_key(path)) == Some(&checksum) {
            let envelope = read_blob(&blob)?;
            if envelope.version == ENVELOPE_VERSION && envelope.window == window {
                tracing::debug!(file = %path.display(), "cache hit");
                return Ok((checksum, envelope.data));
            }
            tracing::warn!(
                file = %path.display(),
                cached_window = envelope.window,
                window,
                "stale cache entry, recomputing"
            );
        } else {
            tracing::debug!(file = %path.display(), "cache miss");
        }

        let candles = self.source.decode_candles(path, &bytes)?;
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            window,
            data: StockData::from_candles(&candles, window),
        };
        write_blob(&blob, &envelope)?;
        Ok((checksum, envelope.data))
    }
}

fn check_window(window: usize) -> Result<(), BacktesterError> {
    if window < MIN_WINDOW {
        return Err(BacktesterError::InvalidParameter {
            name: "window".into(),
            reason: format!("must be at least {MIN_WINDOW}, got {window}"),
        });
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn table_key(path: &Path) -> String {
    path.display().to_string()
}

fn read_table(cache_dir: &Path) -> Result<ChecksumTable, BacktesterError> {
    let path = cache_dir.join(CHECKSUM_TABLE);
    if !path.exists() {
        return Ok(ChecksumTable::new());
    }
    let content = fs::read_to_string(&path).map_err(|e| BacktesterError::CacheIntegrity {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| BacktesterError::CacheIntegrity {
        path,
        reason: e.to_string(),
    })
}

fn write_table(cache_dir: &Path, table: &ChecksumTable) -> Result<(), BacktesterError> {
    let path = cache_dir.join(CHECKSUM_TABLE);
    let json = serde_json::to_string_pretty(table).map_err(|e| BacktesterError::CacheWrite {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    write_atomic(&path, json.as_bytes())
}

fn read_blob(path: &Path) -> Result<Envelope, BacktesterError> {
    let bytes = fs::read(path).map_err(|e| BacktesterError::CacheIntegrity {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    bincode::deserialize(&bytes).map_err(|e| BacktesterError::CacheIntegrity {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_blob(path: &Path, envelope: &Envelope) -> Result<(), BacktesterError> {
    let bytes = bincode::serialize(envelope).map_err(|e| BacktesterError::CacheWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BacktesterError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|e| BacktesterError::CacheWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
