//! Core domain types and logic.

pub mod candle;
pub mod indicator;
pub mod quantile;
pub mod stock_data;
pub mod dataset;
pub mod registry;
pub mod predicate;
pub mod predicate_parser;
pub mod predicate_eval;
pub mod strategy;
pub mod universe;
pub mod execution;
pub mod market_timing;
pub mod backtest;
pub mod returns;
pub mod config_validation;
pub mod error;
