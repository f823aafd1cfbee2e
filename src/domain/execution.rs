//! Execution events produced by the backtest simulator.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "Buy"),
            Signal::Sell => write!(f, "Sell"),
        }
    }
}

/// A single buy or sell at a time index of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionData {
    pub signal: Signal,
    pub time: String,
    pub time_index: usize,
    pub price: f64,
}

impl ExecutionData {
    pub fn buy(time: impl Into<String>, time_index: usize, price: f64) -> Self {
        Self {
            signal: Signal::Buy,
            time: time.into(),
            time_index,
            price,
        }
    }

    pub fn sell(time: impl Into<String>, time_index: usize, price: f64) -> Self {
        Self {
            signal: Signal::Sell,
            time: time.into(),
            time_index,
            price,
        }
    }
}

/// Price paid when buying at `price` with a flat proportional cost.
pub fn cost_adjusted_buy(price: f64, transaction_cost: f64) -> f64 {
    price * (1.0 + transaction_cost)
}

/// Proceeds received when selling at `price` with a flat proportional cost.
pub fn cost_adjusted_sell(price: f64, transaction_cost: f64) -> f64 {
    price * (1.0 - transaction_cost)
}
