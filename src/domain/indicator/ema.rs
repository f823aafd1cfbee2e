//! Exponential Moving Average indicator.
//!
//! alpha = 2/(window+1), EMA[0] = C[0], EMA[i] = alpha*(C[i] - EMA[i-1]) + EMA[i-1].
//! Every candle yields a value; the early values are removed by the alignment
//! trim rather than flagged here.

use crate::domain::candle::Candle;

pub fn calculate_ema(candles: &[Candle], window: usize) -> Vec<f64> {
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut values = Vec::with_capacity(candles.len());
    let mut prev: Option<f64> = None;

    for candle in candles {
        let ema = match prev {
            None => candle.close,
            Some(p) => alpha * (candle.close - p) + p,
        };
        values.push(ema);
        prev = Some(ema);
    }

    values
}
