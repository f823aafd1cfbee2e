//! Instant indicators: one value per candle, no lookback.

use crate::domain::candle::Candle;

pub fn series<F>(candles: &[Candle], f: F) -> Vec<f64>
where
    F: Fn(&Candle) -> f64,
{
    candles.iter().map(f).collect()
}

/// 100 * (close / open - 1)
pub fn price_percent_change_open_to_close(candle: &Candle) -> f64 {
    100.0 * (candle.close / candle.open - 1.0)
}

/// Where the close sits inside the day's range: 100 * (close - low) / (high - low)
pub fn closing_bias(candle: &Candle) -> f64 {
    100.0 * ((candle.close - candle.low) / (candle.high - candle.low))
}

/// Body size relative to range: 100 * (close - open) / (high - low)
pub fn extension_ratio(candle: &Candle) -> f64 {
    100.0 * ((candle.close - candle.open) / (candle.high - candle.low))
}
