//! Candle representation.

/// One OHLCV observation for one instrument on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Candles with no traded volume or a zero range carry no information and
    /// are dropped at ingestion.
    pub fn is_valid(&self) -> bool {
        self.volume != 0.0 && self.high != self.low
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (2 * close + high + low) / 4
    pub fn weighted_close(&self) -> f64 {
        (2.0 * self.close + self.high + self.low) / 4.0
    }

    /// (high + low) / 2
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle {
            date: "2024-01-15".into(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn typical_price() {
        let candle = sample_candle();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((candle.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn weighted_close() {
        // (210 + 110 + 90) / 4 = 102.5
        assert!((sample_candle().weighted_close() - 102.5).abs() < f64::EPSILON);
    }

    #[test]
    fn median_price() {
        assert!((sample_candle().median_price() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_volume_is_invalid() {
        let candle = Candle {
            volume: 0.0,
            ..sample_candle()
        };
        assert!(!candle.is_valid());
    }

    #[test]
    fn flat_range_is_invalid() {
        let candle = Candle {
            high: 100.0,
            low: 100.0,
            ..sample_candle()
        };
        assert!(!candle.is_valid());
        assert!(sample_candle().is_valid());
    }
}
