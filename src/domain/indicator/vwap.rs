//! VWAP (Volume Weighted Average Price) over the window.
//!
//! VWAP = sum(close * volume) / sum(volume)

use crate::domain::candle::Candle;
use crate::domain::indicator::windowed_series;

pub fn vwap(window: &[Candle]) -> f64 {
    let (weighted, volume) = window.iter().fold((0.0, 0.0), |(w, v), c| {
        (w + c.close * c.volume, v + c.volume)
    });
    weighted / volume
}

pub fn calculate_vwap(candles: &[Candle], window: usize) -> Vec<f64> {
    windowed_series(candles, window, vwap)
}
