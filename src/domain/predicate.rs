//! Predicate AST data structures.
//!
//! - `Expr`: expression tree produced by the parser
//! - `UnaryOp` / `BinaryOp`: operators, in C precedence
//! - `ValueType`: static type attached to every sub-expression

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Bool,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Text(String),
    /// The instrument currently being evaluated.
    Instrument,
    /// The time index currently being evaluated.
    Time,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Indicator {
        name: Box<Expr>,
        instrument: Box<Expr>,
        time: Box<Expr>,
    },
    IndQuantile {
        name: Box<Expr>,
        percentile: Box<Expr>,
        instrument: Box<Expr>,
        time: Box<Expr>,
    },
}

impl Expr {
    /// Indicator names that appear as literals in accessor calls.
    pub fn referenced_indicators(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_indicators(&mut names);
        names
    }

    fn collect_indicators(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) | Expr::Bool(_) | Expr::Text(_) | Expr::Instrument | Expr::Time => {}
            Expr::Unary { operand, .. } => operand.collect_indicators(names),
            Expr::Binary { left, right, .. } => {
                left.collect_indicators(names);
                right.collect_indicators(names);
            }
            Expr::Indicator {
                name,
                instrument,
                time,
            } => {
                if let Expr::Text(n) = name.as_ref() {
                    names.insert(n.clone());
                }
                instrument.collect_indicators(names);
                time.collect_indicators(names);
            }
            Expr::IndQuantile {
                name,
                percentile,
                instrument,
                time,
            } => {
                if let Expr::Text(n) = name.as_ref() {
                    names.insert(n.clone());
                }
                percentile.collect_indicators(names);
                instrument.collect_indicators(names);
                time.collect_indicators(names);
            }
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Number => write!(f, "number"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Text => write!(f, "string"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Negate => write!(f, "-"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Text(s) => write!(f, "\"{}\"", s),
            Expr::Instrument => write!(f, "instrument"),
            Expr::Time => write!(f, "time"),
            Expr::Unary { op, operand } => write!(f, "{}({})", op, operand),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Indicator {
                name,
                instrument,
                time,
            } => write!(f, "Indicator({}, {}, {})", name, instrument, time),
            Expr::IndQuantile {
                name,
                percentile,
                instrument,
                time,
            } => write!(
                f,
                "IndQuantile({}, {}, {}, {})",
                name, percentile, instrument, time
            ),
        }
    }
}
