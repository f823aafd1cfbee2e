//! Materialised indicator data for one instrument.

use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::indicator::{self, IndicatorKind, IndicatorSeries, IndicatorShape};
use crate::domain::quantile::{self, PERCENTILES, QuantileIndicators, percentile_label};

/// Dates, indicator series and rolling quantile series for one instrument,
/// all aligned to the same trimmed time axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockData {
    pub dates: Vec<String>,
    pub indicators: IndicatorSeries,
    pub quantile_indicators: QuantileIndicators,
}

impl StockData {
    /// Run the indicator engine over `candles`.
    ///
    /// Every output holds `candles.len() - 2 * window` values (or none when
    /// there are too few candles):
    /// - instant / lagged series drop `2 * window` leading values
    /// - windowed series drop `window` after their own windowing
    /// - quantiles of instant / lagged series drop `window`
    /// - quantiles of windowed series are already aligned
    pub fn from_candles(candles: &[Candle], window: usize) -> Self {
        let dates = indicator::drop_front(
            candles.iter().map(|c| c.date.clone()).collect(),
            window.saturating_mul(2),
        );

        let mut indicators = IndicatorSeries::new();
        let mut quantile_indicators: QuantileIndicators = PERCENTILES
            .iter()
            .map(|&p| (percentile_label(p), IndicatorSeries::new()))
            .collect();

        for kind in IndicatorKind::ALL {
            let raw = indicator::calculate(kind, candles, window);
            let quantile_trim = match kind.shape() {
                IndicatorShape::Instant | IndicatorShape::Lagged => window,
                IndicatorShape::Windowed => 0,
            };

            let rolling = quantile::rolling_quantiles(&raw, &PERCENTILES, window);
            for (&p, values) in PERCENTILES.iter().zip(rolling) {
                if let Some(series) = quantile_indicators.get_mut(&percentile_label(p)) {
                    series.insert(
                        kind.name().to_string(),
                        indicator::drop_front(values, quantile_trim),
                    );
                }
            }

            indicators.insert(
                kind.name().to_string(),
                indicator::drop_front(raw, kind.trim(window)),
            );
        }

        Self {
            dates,
            indicators,
            quantile_indicators,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.indicators.get(name).map(Vec::as_slice)
    }

    pub fn quantile_series(&self, percentile: &str, name: &str) -> Option<&[f64]> {
        self.quantile_indicators
            .get(percentile)
            .and_then(|series| series.get(name))
            .map(Vec::as_slice)
    }

    pub fn close_prices(&self) -> Option<&[f64]> {
        self.series(IndicatorKind::ClosePrice.name())
    }

    /// True when every indicator and quantile series matches `dates` in length.
    pub fn is_aligned(&self) -> bool {
        let len = self.dates.len();
        self.indicators.values().all(|v| v.len() == len)
            && self
                .quantile_indicators
                .values()
                .flat_map(|series| series.values())
                .all(|v| v.len() == len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let close = 50.0 + (i % 7) as f64;
                Candle {
                    date: format!("2024-{:03}", i),
                    open: close - 0.25,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 100.0 + (i % 3) as f64,
                }
            })
            .collect()
    }

    #[test]
    fn all_outputs_share_length() {
        let data = StockData::from_candles(&make_candles(40), 4);
        assert_eq!(data.len(), 32);
        assert!(data.is_aligned());
        assert_eq!(data.quantile_indicators.len(), PERCENTILES.len());
        for series in data.quantile_indicators.values() {
            assert_eq!(series.len(), IndicatorKind::ALL.len());
        }
    }

    #[test]
    fn dates_and_instant_series_point_at_same_candle() {
        let candles = make_candles(30);
        let data = StockData::from_candles(&candles, 3);
        assert_eq!(data.dates[0], candles[6].date);
        assert_eq!(data.close_prices().unwrap()[0], candles[6].close);
        let last = data.len() - 1;
        assert_eq!(data.dates[last], candles[29].date);
    }

    #[test]
    fn quantile_values_come_from_their_window() {
        let candles = make_candles(30);
        let window = 3;
        let data = StockData::from_candles(&candles, window);
        // Quantile index t covers raw close window [t + w, t + 2w).
        let raw: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let q = data.quantile_series("0.95", "ClosePrice").unwrap();
        for (t, value) in q.iter().enumerate() {
            let start = t + window;
            assert!(raw[start..start + window].contains(value));
        }
    }

    #[test]
    fn too_few_candles_yield_empty_aligned_data() {
        let data = StockData::from_candles(&make_candles(5), 3);
        assert!(data.is_empty());
        assert!(data.is_aligned());
    }

    #[test]
    fn huge_window_yields_empty_aligned_data() {
        let data = StockData::from_candles(&make_candles(10), usize::MAX / 2 + 1);
        assert!(data.is_empty());
        assert!(data.is_aligned());
    }

    #[test]
    fn missing_series_lookup_is_none() {
        let data = StockData::from_candles(&make_candles(20), 2);
        assert!(data.series("MACD").is_none());
        assert!(data.quantile_series("0.50", "ClosePrice").is_none());
    }
}
