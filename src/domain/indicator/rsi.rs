//! RSI (Relative Strength Index) indicator implementation.
//!
//! Counts close-to-close moves inside the window rather than averaging their
//! size: a move `>= 0` is an up move, a move `< 0` a down move.
//!
//! Formula: RSI = 100 - (100 / (1 + ups / downs))
//! If downs == 0: RSI = 100

use crate::domain::candle::Candle;
use crate::domain::indicator::windowed_series;

pub fn rsi(window: &[Candle]) -> f64 {
    let (ups, downs) = window
        .windows(2)
        .map(|pair| pair[1].close - pair[0].close)
        .fold((0usize, 0usize), |(u, d), change| {
            if change >= 0.0 { (u + 1, d) } else { (u, d + 1) }
        });

    if downs == 0 {
        return 100.0;
    }
    100.0 - (100.0 / (1.0 + ups as f64 / downs as f64))
}

pub fn calculate_rsi(candles: &[Candle], window: usize) -> Vec<f64> {
    windowed_series(candles, window, rsi)
}
