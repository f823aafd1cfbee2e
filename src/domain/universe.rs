//! Instrument selection and per-instrument fan-out.
//!
//! Parses instrument lists from configuration or the command line, and maps
//! work over every instrument of a dataset on the rayon pool. Results are
//! always re-keyed by instrument name, never by completion order.

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;

use crate::domain::dataset::Dataset;
use crate::domain::stock_data::StockData;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in instrument list")]
    EmptyToken,

    #[error("duplicate instrument: {0}")]
    DuplicateInstrument(String),
}

/// Parse a comma separated instrument list, preserving order and case.
pub fn parse_instruments(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut instruments = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(UniverseError::DuplicateInstrument(trimmed.to_string()));
        }
        instruments.push(trimmed.to_string());
    }

    Ok(instruments)
}

/// Apply `f` to every instrument of `dataset` in parallel.
pub fn map_instruments<T, F>(dataset: &Dataset, f: F) -> BTreeMap<String, T>
where
    T: Send,
    F: Fn(&str, &StockData) -> T + Sync + Send,
{
    let entries: Vec<(&str, &StockData)> = dataset.iter().collect();
    entries
        .par_iter()
        .map(|&(name, data)| (name.to_string(), f(name, data)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_instruments_basic() {
        let result = parse_instruments("CBA,BHP,WBC,NAB").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC", "NAB"]);
    }

    #[test]
    fn parse_instruments_with_whitespace() {
        let result = parse_instruments("  CBA , BHP ,WBC,  NAB  ").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC", "NAB"]);
    }

    #[test]
    fn parse_instruments_keeps_case() {
        let result = parse_instruments("msft,Aapl").unwrap();
        assert_eq!(result, vec!["msft", "Aapl"]);
    }

    #[test]
    fn parse_instruments_empty_token() {
        let result = parse_instruments("CBA,,BHP");
        assert_eq!(result, Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_instruments_duplicate() {
        let result = parse_instruments("CBA,BHP,CBA");
        assert!(matches!(result, Err(UniverseError::DuplicateInstrument(s)) if s == "CBA"));
    }

    #[test]
    fn map_instruments_keys_by_name() {
        let mut ds = Dataset::new();
        for (name, len) in [("C", 3usize), ("A", 1), ("B", 2)] {
            ds.insert(
                name,
                StockData {
                    dates: vec![String::new(); len],
                    ..StockData::default()
                },
            );
        }
        let lens = map_instruments(&ds, |_, data| data.len());
        let expected: BTreeMap<String, usize> =
            [("A".to_string(), 1), ("B".to_string(), 2), ("C".to_string(), 3)]
                .into_iter()
                .collect();
        assert_eq!(lens, expected);
    }
}
