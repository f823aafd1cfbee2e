//! Compiled strategy predicates.
//!
//! A [`Strategy`] is compiled once and then evaluated at every time index of
//! one instrument ([`Strategy::run`]) or of every instrument in a dataset
//! ([`Strategy::run_all`]). A runtime error at a single index yields `false`
//! for that index only.

use std::collections::BTreeMap;

use crate::domain::dataset::Dataset;
use crate::domain::error::{BacktesterError, LookupError, ParseError};
use crate::domain::predicate::Expr;
use crate::domain::predicate_eval::Interpreter;
use crate::domain::predicate_parser;
use crate::domain::universe::map_instruments;

pub const VALIDATION_OK: &str = "The strategy program is OK.";

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    source: String,
    expr: Expr,
}

/// Outcome of [`validate_strategy`]; never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyValidation {
    pub ok: bool,
    pub diagnostic: String,
}

impl Strategy {
    pub fn compile(program: &str) -> Result<Self, ParseError> {
        let expr = predicate_parser::parse(program)?;
        Ok(Self {
            source: program.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// One boolean per time index of `instrument`, in order.
    pub fn run(&self, dataset: &Dataset, instrument: &str) -> Result<Vec<bool>, BacktesterError> {
        let data = dataset
            .get(instrument)
            .ok_or_else(|| LookupError::UnknownInstrument(instrument.to_string()))?;
        Ok(self.evaluate_series(dataset, instrument, data.len()))
    }

    /// Evaluate every instrument of `dataset` in parallel.
    pub fn run_all(&self, dataset: &Dataset) -> BTreeMap<String, Vec<bool>> {
        map_instruments(dataset, |instrument, data| {
            self.evaluate_series(dataset, instrument, data.len())
        })
    }

    fn evaluate_series(&self, dataset: &Dataset, instrument: &str, len: usize) -> Vec<bool> {
        let interpreter = Interpreter::new(dataset, instrument);
        let mut failures = 0usize;
        let signals: Vec<bool> = (0..len)
            .map(|time| match interpreter.evaluate(&self.expr, time) {
                Ok(value) => value,
                Err(e) => {
                    if failures == 0 {
                        tracing::debug!(instrument, time, error = %e, "predicate failed");
                    }
                    failures += 1;
                    false
                }
            })
            .collect();

        if failures > 0 {
            tracing::debug!(
                instrument,
                failures,
                total = len,
                "predicate runtime errors mapped to false"
            );
        }
        signals
    }
}

/// Compile `program` and report the result as a diagnostic string.
pub fn validate_strategy(program: &str) -> StrategyValidation {
    match Strategy::compile(program) {
        Ok(_) => StrategyValidation {
            ok: true,
            diagnostic: VALIDATION_OK.to_string(),
        },
        Err(e) => StrategyValidation {
            ok: false,
            diagnostic: e.display_with_context(program),
        },
    }
}
