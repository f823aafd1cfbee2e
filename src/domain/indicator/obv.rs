//! OBV (On-Balance Volume) indicator implementation.

use crate::domain::candle::Candle;
use crate::domain::indicator::windowed_series;

/// Net volume over the window.
///
/// If close[i] > close[i-1]: add volume[i]
/// If close[i] < close[i-1]: subtract volume[i]
/// If close[i] == close[i-1]: unchanged
///
/// The first candle in the window only provides the reference close.
pub fn obv(window: &[Candle]) -> f64 {
    window.windows(2).fold(0.0, |obv, pair| {
        if pair[1].close > pair[0].close {
            obv + pair[1].volume
        } else if pair[1].close < pair[0].close {
            obv - pair[1].volume
        } else {
            obv
        }
    })
}

pub fn calculate_obv(candles: &[Candle], window: usize) -> Vec<f64> {
    windowed_series(candles, window, obv)
}
