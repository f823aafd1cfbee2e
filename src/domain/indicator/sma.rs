//! Simple Moving Average: mean close over the window.

use crate::domain::candle::Candle;
use crate::domain::indicator::windowed_series;

pub fn sma(window: &[Candle]) -> f64 {
    let sum: f64 = window.iter().map(|c| c.close).sum();
    sum / window.len() as f64
}

pub fn calculate_sma(candles: &[Candle], window: usize) -> Vec<f64> {
    windowed_series(candles, window, sma)
}
