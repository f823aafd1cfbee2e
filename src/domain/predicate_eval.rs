//! Predicate evaluation engine.
//!
//! Tree-walking interpreter over a parsed [`Expr`]. The only observable state
//! is the [`Dataset`] reached through the two accessor calls.
//!
//! # Evaluation Semantics
//!
//! - `&&`: short-circuits on the first `false`
//! - `||`: short-circuits on the first `true`
//! - Number equality is exact
//! - Accessor time arguments are truncated towards zero; negative or
//!   non-finite values are runtime errors
//! - Division by zero is a runtime error

use crate::domain::dataset::Dataset;
use crate::domain::error::LookupError;
use crate::domain::predicate::{BinaryOp, Expr, UnaryOp, ValueType};
use crate::domain::quantile::percentile_label;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("invalid time index {0}")]
    InvalidTime(f64),

    #[error("division by zero")]
    DivisionByZero,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'e> {
    Number(f64),
    Bool(bool),
    Text(&'e str),
}

impl<'e> Value<'e> {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Bool,
            Value::Text(_) => ValueType::Text,
        }
    }

    fn as_number(self) -> Result<f64, EvalError> {
        match self {
            Value::Number(n) => Ok(n),
            other => Err(EvalError::TypeMismatch {
                expected: ValueType::Number,
                found: other.value_type(),
            }),
        }
    }

    fn as_bool(self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::TypeMismatch {
                expected: ValueType::Bool,
                found: other.value_type(),
            }),
        }
    }

    fn as_text(self) -> Result<&'e str, EvalError> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(EvalError::TypeMismatch {
                expected: ValueType::Text,
                found: other.value_type(),
            }),
        }
    }
}

/// Evaluation context bound to one instrument of one dataset.
///
/// Each concurrent evaluation builds its own interpreter; nothing here is
/// shared between instruments.
pub struct Interpreter<'a> {
    dataset: &'a Dataset,
    instrument: &'a str,
}

impl<'a> Interpreter<'a> {
    pub fn new(dataset: &'a Dataset, instrument: &'a str) -> Self {
        Self {
            dataset,
            instrument,
        }
    }

    pub fn instrument(&self) -> &'a str {
        self.instrument
    }

    /// Evaluate a bool-typed expression at `time`.
    pub fn evaluate(&self, expr: &Expr, time: usize) -> Result<bool, EvalError> {
        self.eval(expr, time)?.as_bool()
    }

    fn eval<'e>(&self, expr: &'e Expr, time: usize) -> Result<Value<'e>, EvalError>
    where
        'a: 'e,
    {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Text(s) => Ok(Value::Text(s)),
            Expr::Instrument => Ok(Value::Text(self.instrument)),
            Expr::Time => Ok(Value::Number(time as f64)),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, time)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
                    UnaryOp::Negate => Ok(Value::Number(-value.as_number()?)),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, time),
            Expr::Indicator {
                name,
                instrument,
                time: at,
            } => {
                let name = self.eval(name, time)?.as_text()?;
                let instrument = self.eval(instrument, time)?.as_text()?;
                let index = time_index(self.eval(at, time)?.as_number()?)?;
                Ok(Value::Number(self.dataset.indicator(name, instrument, index)?))
            }
            Expr::IndQuantile {
                name,
                percentile,
                instrument,
                time: at,
            } => {
                let name = self.eval(name, time)?.as_text()?;
                let label = match self.eval(percentile, time)? {
                    Value::Number(p) => percentile_label(p),
                    other => other.as_text()?.to_string(),
                };
                let instrument = self.eval(instrument, time)?.as_text()?;
                let index = time_index(self.eval(at, time)?.as_number()?)?;
                Ok(Value::Number(
                    self.dataset.ind_quantile(name, &label, instrument, index)?,
                ))
            }
        }
    }

    fn eval_binary<'e>(
        &self,
        op: BinaryOp,
        left: &'e Expr,
        right: &'e Expr,
        time: usize,
    ) -> Result<Value<'e>, EvalError>
    where
        'a: 'e,
    {
        match op {
            BinaryOp::And => {
                if !self.eval(left, time)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(right, time)?.as_bool()?))
            }
            BinaryOp::Or => {
                if self.eval(left, time)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(right, time)?.as_bool()?))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let l = self.eval(left, time)?;
                let r = self.eval(right, time)?;
                if l.value_type() != r.value_type() {
                    return Err(EvalError::TypeMismatch {
                        expected: l.value_type(),
                        found: r.value_type(),
                    });
                }
                let equal = l == r;
                Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            _ => {
                let l = self.eval(left, time)?.as_number()?;
                let r = self.eval(right, time)?.as_number()?;
                let value = match op {
                    BinaryOp::Lt => Value::Bool(l < r),
                    BinaryOp::Le => Value::Bool(l <= r),
                    BinaryOp::Gt => Value::Bool(l > r),
                    BinaryOp::Ge => Value::Bool(l >= r),
                    BinaryOp::Add => Value::Number(l + r),
                    BinaryOp::Sub => Value::Number(l - r),
                    BinaryOp::Mul => Value::Number(l * r),
                    BinaryOp::Div if r == 0.0 => return Err(EvalError::DivisionByZero),
                    BinaryOp::Div => Value::Number(l / r),
                    BinaryOp::And | BinaryOp::Or | BinaryOp::Eq | BinaryOp::Ne => {
                        unreachable!("handled above")
                    }
                };
                Ok(value)
            }
        }
    }
}

fn time_index(value: f64) -> Result<usize, EvalError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value.trunc() as usize)
    } else {
        Err(EvalError::InvalidTime(value))
    }
}
