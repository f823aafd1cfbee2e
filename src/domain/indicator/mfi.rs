//! MFI (Money Flow Index) indicator implementation.
//!
//! Money flow for candle i is typical_price[i] * volume[i]. It is positive when
//! the typical price rose against the previous candle and negative otherwise
//! (ties count as negative).
//!
//! Formula: MFI = 100 - 100 / (1 + positive / negative)
//! If negative == 0: MFI = 100

use crate::domain::candle::Candle;
use crate::domain::indicator::windowed_series;

pub fn mfi(window: &[Candle]) -> f64 {
    let mut positive = 0.0;
    let mut negative = 0.0;

    for pair in window.windows(2) {
        let today = pair[1].typical_price();
        let flow = today * pair[1].volume;
        if today > pair[0].typical_price() {
            positive += flow;
        } else {
            negative += flow;
        }
    }

    if negative == 0.0 {
        return 100.0;
    }
    100.0 - (100.0 / (1.0 + positive / negative))
}

pub fn calculate_mfi(candles: &[Candle], window: usize) -> Vec<f64> {
    windowed_series(candles, window, mfi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candle(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            date: "2024-01-01".into(),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn mfi_rising_prices_is_100() {
        let candles = vec![
            make_candle(11.0, 9.0, 10.0, 100.0),
            make_candle(12.0, 10.0, 11.0, 100.0),
            make_candle(13.0, 11.0, 12.0, 100.0),
        ];
        assert!((mfi(&candles) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn mfi_balanced_flow_is_50() {
        // tp: 10, 12, 10 -> +12*100, -10*120
        let candles = vec![
            make_candle(11.0, 9.0, 10.0, 100.0),
            make_candle(13.0, 11.0, 12.0, 100.0),
            make_candle(11.0, 9.0, 10.0, 120.0),
        ];
        assert!((mfi(&candles) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn mfi_unchanged_typical_price_is_negative_flow() {
        let candles = vec![
            make_candle(11.0, 9.0, 10.0, 100.0),
            make_candle(11.0, 9.0, 10.0, 100.0),
        ];
        assert!(mfi(&candles).abs() < 1e-9);
    }

    #[test]
    fn mfi_series_length() {
        let candles: Vec<Candle> = (0..6)
            .map(|i| make_candle(11.0 + i as f64, 9.0, 10.0, 100.0))
            .collect();
        assert_eq!(calculate_mfi(&candles, 4).len(), 2);
    }
}
