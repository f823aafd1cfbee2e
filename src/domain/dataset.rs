//! In-memory dataset: instrument name -> [`StockData`], ordered by name.
//!
//! The accessors here are the only surface predicate programs can observe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::LookupError;
use crate::domain::stock_data::StockData;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    stocks: BTreeMap<String, StockData>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: impl Into<String>, data: StockData) {
        self.stocks.insert(instrument.into(), data);
    }

    pub fn get(&self, instrument: &str) -> Option<&StockData> {
        self.stocks.get(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.stocks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StockData)> {
        self.stocks.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    /// Copy of the dataset restricted to `names`. Unknown names are an error.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Dataset, LookupError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.stock(name).map(|data| (name.to_string(), data.clone()))
            })
            .collect()
    }

    fn stock(&self, instrument: &str) -> Result<&StockData, LookupError> {
        self.stocks
            .get(instrument)
            .ok_or_else(|| LookupError::UnknownInstrument(instrument.to_string()))
    }

    fn at<T: Copy>(instrument: &str, values: &[T], time: usize) -> Result<T, LookupError> {
        values
            .get(time)
            .copied()
            .ok_or_else(|| LookupError::TimeOutOfRange {
                instrument: instrument.to_string(),
                time,
                len: values.len(),
            })
    }

    pub fn date(&self, instrument: &str, time: usize) -> Result<&str, LookupError> {
        let data = self.stock(instrument)?;
        data.dates
            .get(time)
            .map(String::as_str)
            .ok_or_else(|| LookupError::TimeOutOfRange {
                instrument: instrument.to_string(),
                time,
                len: data.dates.len(),
            })
    }

    pub fn dates(&self, instrument: &str) -> Result<&[String], LookupError> {
        Ok(&self.stock(instrument)?.dates)
    }

    pub fn indicator_series(&self, name: &str, instrument: &str) -> Result<&[f64], LookupError> {
        self.stock(instrument)?
            .series(name)
            .ok_or_else(|| LookupError::UnknownIndicator {
                name: name.to_string(),
                instrument: instrument.to_string(),
            })
    }

    pub fn ind_quantile_series(
        &self,
        name: &str,
        percentile: &str,
        instrument: &str,
    ) -> Result<&[f64], LookupError> {
        let data = self.stock(instrument)?;
        let series = data
            .quantile_indicators
            .get(percentile)
            .ok_or_else(|| LookupError::UnknownPercentile(percentile.to_string()))?;
        series
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| LookupError::UnknownIndicator {
                name: name.to_string(),
                instrument: instrument.to_string(),
            })
    }

    /// `Indicator(name, instrument, time)`
    pub fn indicator(&self, name: &str, instrument: &str, time: usize) -> Result<f64, LookupError> {
        Self::at(instrument, self.indicator_series(name, instrument)?, time)
    }

    /// `IndQuantile(name, percentile, instrument, time)`
    pub fn ind_quantile(
        &self,
        name: &str,
        percentile: &str,
        instrument: &str,
        time: usize,
    ) -> Result<f64, LookupError> {
        Self::at(
            instrument,
            self.ind_quantile_series(name, percentile, instrument)?,
            time,
        )
    }
}

impl FromIterator<(String, StockData)> for Dataset {
    fn from_iter<I: IntoIterator<Item = (String, StockData)>>(iter: I) -> Self {
        Self {
            stocks: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorSeries;

    fn make_stock(closes: &[f64]) -> StockData {
        let mut indicators = IndicatorSeries::new();
        indicators.insert("ClosePrice".into(), closes.to_vec());
        let mut q = IndicatorSeries::new();
        q.insert("ClosePrice".into(), closes.iter().map(|c| c * 2.0).collect());
        StockData {
            dates: (0..closes.len()).map(|i| format!("d{i}")).collect(),
            indicators,
            quantile_indicators: [("0.75".to_string(), q)].into_iter().collect(),
        }
    }

    fn make_dataset() -> Dataset {
        let mut ds = Dataset::new();
        ds.insert("ZZZ", make_stock(&[1.0, 2.0]));
        ds.insert("AAA", make_stock(&[10.0, 11.0, 12.0]));
        ds
    }

    #[test]
    fn instruments_sorted_by_name() {
        let ds = make_dataset();
        assert_eq!(ds.instruments().collect::<Vec<_>>(), vec!["AAA", "ZZZ"]);
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn indicator_lookup() {
        let ds = make_dataset();
        assert_eq!(ds.indicator("ClosePrice", "AAA", 2), Ok(12.0));
        assert_eq!(ds.ind_quantile("ClosePrice", "0.75", "AAA", 1), Ok(22.0));
        assert_eq!(ds.date("ZZZ", 1), Ok("d1"));
    }

    #[test]
    fn unknown_instrument() {
        let ds = make_dataset();
        assert_eq!(
            ds.indicator("ClosePrice", "XYZ", 0),
            Err(LookupError::UnknownInstrument("XYZ".into()))
        );
    }

    #[test]
    fn unknown_indicator_and_percentile() {
        let ds = make_dataset();
        assert!(matches!(
            ds.indicator("RSI", "AAA", 0),
            Err(LookupError::UnknownIndicator { .. })
        ));
        assert_eq!(
            ds.ind_quantile("ClosePrice", "0.50", "AAA", 0),
            Err(LookupError::UnknownPercentile("0.50".into()))
        );
    }

    #[test]
    fn time_out_of_range() {
        let ds = make_dataset();
        assert_eq!(
            ds.indicator("ClosePrice", "ZZZ", 2),
            Err(LookupError::TimeOutOfRange {
                instrument: "ZZZ".into(),
                time: 2,
                len: 2
            })
        );
        assert!(ds.date("ZZZ", 5).is_err());
    }

    #[test]
    fn subset_keeps_requested_instruments() {
        let ds = make_dataset();
        let sub = ds.subset(&["ZZZ"]).unwrap();
        assert_eq!(sub.instruments().collect::<Vec<_>>(), vec!["ZZZ"]);
        assert!(ds.subset(&["NOPE"]).is_err());
    }
}
