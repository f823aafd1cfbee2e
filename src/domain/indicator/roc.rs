//! ROC (Rate of Change) indicator implementation.
//!
//! Formula: ROC = 100 * (last.close - first.close) / first.close, taken over
//! the first and last candle of each window.

use crate::domain::candle::Candle;
use crate::domain::indicator::windowed_series;

pub fn roc(window: &[Candle]) -> f64 {
    match (window.first(), window.last()) {
        (Some(first), Some(last)) => 100.0 * ((last.close - first.close) / first.close),
        _ => f64::NAN,
    }
}

pub fn calculate_roc(candles: &[Candle], window: usize) -> Vec<f64> {
    windowed_series(candles, window, roc)
}
