//! Technical indicator engine.
//!
//! Every indicator is identified by an [`IndicatorKind`] and falls into one of
//! three shapes:
//! - `Instant`: one value per candle, no window (prices, volume, candle ratios)
//! - `Lagged`: one value per candle, seeded from the first candle (EMA)
//! - `Windowed`: one value per window start over `window` consecutive candles
//!
//! Raw series are produced by [`calculate`]. Dropping [`IndicatorKind::trim`]
//! leading values puts every series for an instrument on one time axis.

pub mod ema;
pub mod instant;
pub mod mfi;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod vwap;

use crate::domain::candle::Candle;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WINDOW: usize = 40;

/// Smallest window for which every windowed indicator sees at least one
/// close-to-close move.
pub const MIN_WINDOW: usize = 2;

/// Named indicator time series for one instrument, keyed by indicator name.
pub type IndicatorSeries = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorKind {
    OpenPrice,
    ClosePrice,
    HighPrice,
    LowPrice,
    TradingVolume,
    WeightedClose,
    TypicalPrice,
    MedianPrice,
    PricePercentChangeOpenToClose,
    ClosingBias,
    ExtensionRatio,
    Ema,
    Sma,
    Rsi,
    Vwap,
    Obv,
    Roc,
    Mfi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorShape {
    Instant,
    Lagged,
    Windowed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown indicator '{0}'")]
pub struct UnknownIndicator(pub String);

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 18] = [
        IndicatorKind::OpenPrice,
        IndicatorKind::ClosePrice,
        IndicatorKind::HighPrice,
        IndicatorKind::LowPrice,
        IndicatorKind::TradingVolume,
        IndicatorKind::WeightedClose,
        IndicatorKind::TypicalPrice,
        IndicatorKind::MedianPrice,
        IndicatorKind::PricePercentChangeOpenToClose,
        IndicatorKind::ClosingBias,
        IndicatorKind::ExtensionRatio,
        IndicatorKind::Ema,
        IndicatorKind::Sma,
        IndicatorKind::Rsi,
        IndicatorKind::Vwap,
        IndicatorKind::Obv,
        IndicatorKind::Roc,
        IndicatorKind::Mfi,
    ];

    /// Series key used in [`IndicatorSeries`] and in predicate programs.
    pub fn name(self) -> &'static str {
        match self {
            IndicatorKind::OpenPrice => "OpenPrice",
            IndicatorKind::ClosePrice => "ClosePrice",
            IndicatorKind::HighPrice => "HighPrice",
            IndicatorKind::LowPrice => "LowPrice",
            IndicatorKind::TradingVolume => "TradingVolume",
            IndicatorKind::WeightedClose => "WeightedClose",
            IndicatorKind::TypicalPrice => "TypicalPrice",
            IndicatorKind::MedianPrice => "MedianPrice",
            IndicatorKind::PricePercentChangeOpenToClose => "PricePercentChangeOpenToClose",
            IndicatorKind::ClosingBias => "ClosingBias",
            IndicatorKind::ExtensionRatio => "ExtensionRatio",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Vwap => "VWAP",
            IndicatorKind::Obv => "OBV",
            IndicatorKind::Roc => "ROC",
            IndicatorKind::Mfi => "MFI",
        }
    }

    pub fn shape(self) -> IndicatorShape {
        match self {
            IndicatorKind::Ema => IndicatorShape::Lagged,
            IndicatorKind::Sma
            | IndicatorKind::Rsi
            | IndicatorKind::Vwap
            | IndicatorKind::Obv
            | IndicatorKind::Roc
            | IndicatorKind::Mfi => IndicatorShape::Windowed,
            _ => IndicatorShape::Instant,
        }
    }

    /// Number of leading values dropped from the raw series so that every
    /// indicator ends up with `len - 2 * window` values.
    pub fn trim(self, window: usize) -> usize {
        match self.shape() {
            IndicatorShape::Instant | IndicatorShape::Lagged => window.saturating_mul(2),
            IndicatorShape::Windowed => window,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorKind {
    type Err = UnknownIndicator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "PricePercentageChangeOpenToClose" {
            return Ok(IndicatorKind::PricePercentChangeOpenToClose);
        }
        IndicatorKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownIndicator(s.to_string()))
    }
}

/// Raw, untrimmed series for one indicator.
///
/// Instant and lagged indicators yield one value per candle; windowed
/// indicators yield `len - window` values.
pub fn calculate(kind: IndicatorKind, candles: &[Candle], window: usize) -> Vec<f64> {
    match kind {
        IndicatorKind::OpenPrice => instant::series(candles, |c| c.open),
        IndicatorKind::ClosePrice => instant::series(candles, |c| c.close),
        IndicatorKind::HighPrice => instant::series(candles, |c| c.high),
        IndicatorKind::LowPrice => instant::series(candles, |c| c.low),
        IndicatorKind::TradingVolume => instant::series(candles, |c| c.volume),
        IndicatorKind::WeightedClose => instant::series(candles, Candle::weighted_close),
        IndicatorKind::TypicalPrice => instant::series(candles, Candle::typical_price),
        IndicatorKind::MedianPrice => instant::series(candles, Candle::median_price),
        IndicatorKind::PricePercentChangeOpenToClose => {
            instant::series(candles, instant::price_percent_change_open_to_close)
        }
        IndicatorKind::ClosingBias => instant::series(candles, instant::closing_bias),
        IndicatorKind::ExtensionRatio => instant::series(candles, instant::extension_ratio),
        IndicatorKind::Ema => ema::calculate_ema(candles, window),
        IndicatorKind::Sma => sma::calculate_sma(candles, window),
        IndicatorKind::Rsi => rsi::calculate_rsi(candles, window),
        IndicatorKind::Vwap => vwap::calculate_vwap(candles, window),
        IndicatorKind::Obv => obv::calculate_obv(candles, window),
        IndicatorKind::Roc => roc::calculate_roc(candles, window),
        IndicatorKind::Mfi => mfi::calculate_mfi(candles, window),
    }
}

/// Apply `f` to every `window`-sized slice starting at `0..len - window`.
pub(crate) fn windowed_series<F>(candles: &[Candle], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[Candle]) -> f64,
{
    let count = candles.len().saturating_sub(window);
    (0..count).map(|i| f(&candles[i..i + window])).collect()
}

/// Drop the first `n` values, yielding an empty series when `n >= len`.
pub fn drop_front<T>(mut values: Vec<T>, n: usize) -> Vec<T> {
    values.drain(..n.min(values.len()));
    values
}
