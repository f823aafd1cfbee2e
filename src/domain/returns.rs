//! Returns per completed Buy -> Sell round trip.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::BacktesterError;
use crate::domain::execution::{ExecutionData, Signal, cost_adjusted_buy, cost_adjusted_sell};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// `sell(1 - c) - buy(1 + c)`
    Simple,
    /// `ln(sell(1 - c)) - ln(buy(1 + c))`
    Log,
    /// `sell(1 - c) / buy(1 + c)`
    Ratio,
}

impl ReturnKind {
    pub fn apply(self, sell: f64, buy: f64, transaction_cost: f64) -> f64 {
        let proceeds = cost_adjusted_sell(sell, transaction_cost);
        let paid = cost_adjusted_buy(buy, transaction_cost);
        match self {
            ReturnKind::Simple => proceeds - paid,
            ReturnKind::Log => proceeds.ln() - paid.ln(),
            ReturnKind::Ratio => proceeds / paid,
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnKind::Simple => write!(f, "SimpleReturns"),
            ReturnKind::Log => write!(f, "LogReturns"),
            ReturnKind::Ratio => write!(f, "DivReturns"),
        }
    }
}

impl FromStr for ReturnKind {
    type Err = BacktesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SimpleReturns" | "simple" => Ok(ReturnKind::Simple),
            "LogReturns" | "log" => Ok(ReturnKind::Log),
            "DivReturns" | "RatioReturns" | "ratio" => Ok(ReturnKind::Ratio),
            other => Err(BacktesterError::InvalidParameter {
                name: "return_type".into(),
                reason: format!("unknown return type '{other}'"),
            }),
        }
    }
}

/// One return per Buy -> Sell pair, in order.
///
/// A Sell while expecting a Buy, or a Buy while expecting a Sell, is an
/// ordering violation. A trailing Buy with no Sell contributes nothing.
pub fn calculate_returns(
    executions: &[ExecutionData],
    kind: ReturnKind,
    transaction_cost: f64,
) -> Result<Vec<f64>, BacktesterError> {
    let mut returns = Vec::with_capacity(executions.len() / 2);
    let mut open: Option<f64> = None;

    for (index, execution) in executions.iter().enumerate() {
        match (open, execution.signal) {
            (None, Signal::Buy) => open = Some(execution.price),
            (Some(buy), Signal::Sell) => {
                returns.push(kind.apply(execution.price, buy, transaction_cost));
                open = None;
            }
            (None, Signal::Sell) => return Err(out_of_order(index, Signal::Buy, Signal::Sell)),
            (Some(_), Signal::Buy) => return Err(out_of_order(index, Signal::Sell, Signal::Buy)),
        }
    }

    Ok(returns)
}

/// [`calculate_returns`] for every instrument; the first ordering error wins.
pub fn returns_for_all(
    executions: &BTreeMap<String, Vec<ExecutionData>>,
    kind: ReturnKind,
    transaction_cost: f64,
) -> Result<BTreeMap<String, Vec<f64>>, BacktesterError> {
    executions
        .iter()
        .map(|(name, events)| {
            calculate_returns(events, kind, transaction_cost).map(|returns| (name.clone(), returns))
        })
        .collect()
}

fn out_of_order(index: usize, expected: Signal, found: Signal) -> BacktesterError {
    BacktesterError::ExecutionOrder {
        index,
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
