//! Configuration validation.
//!
//! Validates all config fields before a dataset is loaded or a backtest runs.
//! Every key is optional unless noted; absent keys fall back to the defaults
//! below.

use std::str::FromStr;

use crate::domain::backtest::ExecutionKind;
use crate::domain::error::BacktesterError;
use crate::domain::indicator::{DEFAULT_WINDOW, MIN_WINDOW};
use crate::domain::returns::ReturnKind;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_CACHE_DIR: &str = "StockData";
pub const DEFAULT_EXECUTION: &str = "StopLossProfitTake";
pub const DEFAULT_TRANSACTION_COST: f64 = 0.0025;
pub const DEFAULT_PROFIT_TAKE: f64 = 0.3;
pub const DEFAULT_STOP_LOSS: f64 = -0.3;
pub const DEFAULT_TIME_PERIOD: usize = 100;
pub const DEFAULT_RETURN_TYPE: &str = "SimpleReturns";

/// Parse `[section] key` as `T`, or `None` when the key is absent.
pub fn parse_value<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, BacktesterError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if !config.has_key(section, key) {
        return Ok(None);
    }
    let raw = config.get_string(section, key).unwrap_or_default();
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| BacktesterError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{}': {e}", raw.trim()),
        })
}

pub fn validate_dataset_config(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    if !config.has_key("dataset", "path") {
        return Err(BacktesterError::ConfigMissing {
            section: "dataset".to_string(),
            key: "path".to_string(),
        });
    }
    validate_window(config)
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    if !config.has_key("strategy", "program") {
        return Err(BacktesterError::ConfigMissing {
            section: "strategy".to_string(),
            key: "program".to_string(),
        });
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    validate_execution(config)?;
    validate_transaction_cost(config)?;
    validate_profit_take(config)?;
    validate_stop_loss(config)?;
    validate_time_period(config)?;
    validate_minibatch(config)?;
    validate_seed(config)?;
    validate_return_type(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> BacktesterError {
    BacktesterError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_window(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let window = parse_value::<usize>(config, "indicators", "window")?.unwrap_or(DEFAULT_WINDOW);
    if window < MIN_WINDOW {
        return Err(invalid(
            "indicators",
            "window",
            "window must be at least 2",
        ));
    }
    Ok(())
}

fn validate_execution(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    if let Some(name) = config.get_string("backtest", "execution") {
        ExecutionKind::from_str(&name)
            .map_err(|_| invalid("backtest", "execution", &format!("unknown execution type '{name}'")))?;
    }
    Ok(())
}

fn validate_transaction_cost(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let value = parse_value::<f64>(config, "backtest", "transaction_cost")?
        .unwrap_or(DEFAULT_TRANSACTION_COST);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "transaction_cost",
            "transaction_cost must be in [0, 1)",
        ));
    }
    Ok(())
}

fn validate_profit_take(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let value = parse_value::<f64>(config, "backtest", "profit_take")?.unwrap_or(DEFAULT_PROFIT_TAKE);
    if value.is_nan() || value <= 0.0 {
        return Err(invalid(
            "backtest",
            "profit_take",
            "profit_take must be positive",
        ));
    }
    Ok(())
}

fn validate_stop_loss(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let value = parse_value::<f64>(config, "backtest", "stop_loss")?.unwrap_or(DEFAULT_STOP_LOSS);
    if value.is_nan() || value >= 0.0 {
        return Err(invalid(
            "backtest",
            "stop_loss",
            "stop_loss must be negative",
        ));
    }
    Ok(())
}

fn validate_time_period(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let value = parse_value::<i64>(config, "backtest", "time_period")?
        .unwrap_or(DEFAULT_TIME_PERIOD as i64);
    if value < 1 {
        return Err(invalid(
            "backtest",
            "time_period",
            "time_period must be at least 1",
        ));
    }
    Ok(())
}

fn validate_minibatch(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    if let Some(value) = parse_value::<i64>(config, "backtest", "minibatch_size")? {
        if value < 1 {
            return Err(invalid(
                "backtest",
                "minibatch_size",
                "minibatch_size must be at least 1",
            ));
        }
    }
    Ok(())
}

fn validate_seed(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    parse_value::<u64>(config, "backtest", "seed")?;
    Ok(())
}

fn validate_return_type(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    if let Some(name) = config.get_string("backtest", "return_type") {
        ReturnKind::from_str(&name)
            .map_err(|_| invalid("backtest", "return_type", &format!("unknown return type '{name}'")))?;
    }
    Ok(())
}

/// Keys read from each section. Anything else is most likely a typo.
pub const KNOWN_KEYS: [(&str, &[&str]); 4] = [
    ("dataset", &["path", "cache_dir"]),
    ("indicators", &["window"]),
    ("strategy", &["program"]),
    (
        "backtest",
        &[
            "execution",
            "transaction_cost",
            "profit_take",
            "stop_loss",
            "time_period",
            "minibatch_size",
            "seed",
            "return_type",
        ],
    ),
];

/// `section.key` names present in `config` that nothing reads.
pub fn unknown_keys(config: &dyn ConfigPort) -> Vec<String> {
    let mut unknown: Vec<String> = KNOWN_KEYS
        .iter()
        .flat_map(|(section, known)| {
            config
                .keys(section)
                .into_iter()
                .filter(|key| !known.contains(&key.as_str()))
                .map(move |key| format!("{section}.{key}"))
        })
        .collect();
    unknown.sort();
    unknown
}
