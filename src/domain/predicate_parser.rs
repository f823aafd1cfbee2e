//! Predicate language parser.
//!
//! The user expression is spliced into a fixed function template and the
//! whole text is parsed, so a program can never escape the function body:
//!
//! ```text
//! bool execute(string instrument, int time) { return <expression>; }
//! ```
//!
//! Recursive descent in C precedence (lowest first): `||`, `&&`, `==`/`!=`,
//! `<`/`<=`/`>`/`>=`, `+`/`-`, `*`/`/`, unary `!`/`-`, primary. Every
//! sub-expression is typed while it is parsed and the body must be `bool`.
//! Error positions are reported relative to the user expression.
//!
//! Nesting depth and operand count are capped so that parsing, evaluation
//! and dropping of the tree stay within a worker thread's stack.

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::predicate::{BinaryOp, Expr, UnaryOp, ValueType};
use crate::domain::quantile::{PERCENTILES, percentile_label};

pub const FUNCTION_PREFIX: &str = "bool execute(string instrument, int time) { return ";
pub const FUNCTION_SUFFIX: &str = "; }";

/// Splice a user expression into the function template.
pub fn wrap(program: &str) -> String {
    format!("{FUNCTION_PREFIX}{program}{FUNCTION_SUFFIX}")
}

/// Deepest allowed nesting of parentheses, unary operators and call arguments.
pub const MAX_NESTING: usize = 64;

/// Most operands a single expression may hold.
pub const MAX_OPERANDS: usize = 512;

type Typed = (Expr, ValueType);

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    operands: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            operands: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn describe_next(&self) -> String {
        let word = self.peek_word();
        if word.is_empty() {
            self.peek()
                .map(|c| format!("'{c}'"))
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            format!("'{word}'")
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(
                self.pos,
                format!("expected '{}', found {}", expected, self.describe_next()),
            )),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(
                self.pos,
                format!("expected '{}', found {}", keyword, self.describe_next()),
            ))
        }
    }

    fn peek_word(&self) -> &'a str {
        let remaining = self.remaining();
        let end = remaining
            .char_indices()
            .find(|(i, c)| !(c.is_alphanumeric() || *c == '_') || (*i == 0 && c.is_ascii_digit()))
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        &remaining[..end]
    }

    /// Consume `op` unless it is the prefix of a longer operator in `longer`.
    fn consume_operator(&mut self, op: &str, longer: &[&str]) -> bool {
        self.skip_whitespace();
        let remaining = self.remaining();
        if remaining.starts_with(op) && !longer.iter().any(|l| remaining.starts_with(l)) {
            self.pos += op.len();
            true
        } else {
            false
        }
    }

    fn parse_function(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword("bool")?;
        self.expect_keyword("execute")?;
        self.expect_char('(')?;
        self.expect_keyword("string")?;
        self.expect_keyword("instrument")?;
        self.expect_char(',')?;
        self.expect_keyword("int")?;
        self.expect_keyword("time")?;
        self.expect_char(')')?;
        self.expect_char('{')?;
        self.expect_keyword("return")?;

        self.skip_whitespace();
        let start = self.pos;
        let (expr, ty) = self.parse_or()?;
        if ty != ValueType::Bool {
            return Err(self.error(
                start,
                format!("strategy must evaluate to bool, found {}", ty),
            ));
        }

        self.expect_char(';')?;
        self.expect_char('}')?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(
                self.pos,
                format!("unexpected input after expression: '{}'", self.remaining()),
            ));
        }
        Ok(expr)
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn require(
        &self,
        position: usize,
        op: impl std::fmt::Display,
        expected: ValueType,
        found: ValueType,
    ) -> Result<(), ParseError> {
        if expected == found {
            Ok(())
        } else {
            Err(self.error(
                position,
                format!("operator '{}' expects {} operands, found {}", op, expected, found),
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Typed, ParseError> {
        let (mut left, left_ty) = self.parse_and()?;
        let mut ty = left_ty;
        loop {
            let at = self.skip_then_pos();
            if !(self.consume_operator("||", &[]) || self.consume_keyword("or")) {
                break;
            }
            let (right, right_ty) = self.parse_and()?;
            self.require(at, BinaryOp::Or, ValueType::Bool, ty)?;
            self.require(at, BinaryOp::Or, ValueType::Bool, right_ty)?;
            left = Self::binary(BinaryOp::Or, left, right);
            ty = ValueType::Bool;
        }
        Ok((left, ty))
    }

    fn parse_and(&mut self) -> Result<Typed, ParseError> {
        let (mut left, mut ty) = self.parse_equality()?;
        loop {
            let at = self.skip_then_pos();
            if !(self.consume_operator("&&", &[]) || self.consume_keyword("and")) {
                break;
            }
            let (right, right_ty) = self.parse_equality()?;
            self.require(at, BinaryOp::And, ValueType::Bool, ty)?;
            self.require(at, BinaryOp::And, ValueType::Bool, right_ty)?;
            left = Self::binary(BinaryOp::And, left, right);
            ty = ValueType::Bool;
        }
        Ok((left, ty))
    }

    fn parse_equality(&mut self) -> Result<Typed, ParseError> {
        let (mut left, mut ty) = self.parse_comparison()?;
        loop {
            let at = self.skip_then_pos();
            let op = if self.consume_operator("==", &[]) {
                BinaryOp::Eq
            } else if self.consume_operator("!=", &[]) {
                BinaryOp::Ne
            } else {
                break;
            };
            let (right, right_ty) = self.parse_comparison()?;
            if ty != right_ty {
                return Err(self.error(
                    at,
                    format!("cannot compare {} with {} using '{}'", ty, right_ty, op),
                ));
            }
            left = Self::binary(op, left, right);
            ty = ValueType::Bool;
        }
        Ok((left, ty))
    }

    fn parse_comparison(&mut self) -> Result<Typed, ParseError> {
        let (mut left, mut ty) = self.parse_additive()?;
        loop {
            let at = self.skip_then_pos();
            let op = if self.consume_operator("<=", &[]) {
                BinaryOp::Le
            } else if self.consume_operator(">=", &[]) {
                BinaryOp::Ge
            } else if self.consume_operator("<", &[]) {
                BinaryOp::Lt
            } else if self.consume_operator(">", &[]) {
                BinaryOp::Gt
            } else {
                break;
            };
            let (right, right_ty) = self.parse_additive()?;
            self.require(at, op, ValueType::Number, ty)?;
            self.require(at, op, ValueType::Number, right_ty)?;
            left = Self::binary(op, left, right);
            ty = ValueType::Bool;
        }
        Ok((left, ty))
    }

    fn parse_additive(&mut self) -> Result<Typed, ParseError> {
        let (mut left, ty) = self.parse_multiplicative()?;
        loop {
            let at = self.skip_then_pos();
            let op = if self.consume_operator("+", &[]) {
                BinaryOp::Add
            } else if self.consume_operator("-", &[]) {
                BinaryOp::Sub
            } else {
                break;
            };
            let (right, right_ty) = self.parse_multiplicative()?;
            self.require(at, op, ValueType::Number, ty)?;
            self.require(at, op, ValueType::Number, right_ty)?;
            left = Self::binary(op, left, right);
        }
        Ok((left, ty))
    }

    fn parse_multiplicative(&mut self) -> Result<Typed, ParseError> {
        let (mut left, ty) = self.parse_unary()?;
        loop {
            let at = self.skip_then_pos();
            let op = if self.consume_operator("*", &[]) {
                BinaryOp::Mul
            } else if self.consume_operator("/", &[]) {
                BinaryOp::Div
            } else {
                break;
            };
            let (right, right_ty) = self.parse_unary()?;
            self.require(at, op, ValueType::Number, ty)?;
            self.require(at, op, ValueType::Number, right_ty)?;
            left = Self::binary(op, left, right);
        }
        Ok((left, ty))
    }

    fn parse_unary(&mut self) -> Result<Typed, ParseError> {
        let at = self.skip_then_pos();
        if self.depth >= MAX_NESTING {
            return Err(self.error(at, "expression nested too deeply"));
        }
        self.operands += 1;
        if self.operands > MAX_OPERANDS {
            return Err(self.error(at, "expression too long"));
        }

        self.depth += 1;
        let result = self.parse_unary_operand(at);
        self.depth -= 1;
        result
    }

    fn parse_unary_operand(&mut self, at: usize) -> Result<Typed, ParseError> {
        let op = if self.consume_operator("!", &["!="]) || self.consume_keyword("not") {
            UnaryOp::Not
        } else if self.consume_operator("-", &[]) {
            UnaryOp::Negate
        } else {
            return self.parse_primary();
        };

        let (operand, ty) = self.parse_unary()?;
        let expected = match op {
            UnaryOp::Not => ValueType::Bool,
            UnaryOp::Negate => ValueType::Number,
        };
        if ty != expected {
            return Err(self.error(
                at,
                format!("operator '{}' expects a {} operand, found {}", op, expected, ty),
            ));
        }
        Ok((
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    fn parse_primary(&mut self) -> Result<Typed, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        match self.peek() {
            Some('(') => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect_char(')')?;
                return Ok(inner);
            }
            Some('"') => return self.parse_string(),
            Some(ch) if ch.is_ascii_digit() || ch == '.' => {
                let n = self.parse_number()?;
                return Ok((Expr::Number(n), ValueType::Number));
            }
            _ => {}
        }

        let word = self.peek_word();
        let typed = match word {
            "true" => (Expr::Bool(true), ValueType::Bool),
            "false" => (Expr::Bool(false), ValueType::Bool),
            "instrument" | "stock" => (Expr::Instrument, ValueType::Text),
            "time" => (Expr::Time, ValueType::Number),
            "Indicator" => {
                self.pos += word.len();
                return self.parse_indicator_call();
            }
            "IndQuantile" => {
                self.pos += word.len();
                return self.parse_quantile_call();
            }
            "" => {
                return Err(self.error(
                    start,
                    format!("expected expression, found {}", self.describe_next()),
                ));
            }
            other => {
                return Err(self.error(start, format!("unknown identifier '{}'", other)));
            }
        };
        self.pos += word.len();
        Ok(typed)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error(start, "expected number"));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error(start, format!("invalid number: {}", num_str)))
    }

    fn parse_string(&mut self) -> Result<Typed, ParseError> {
        let start = self.pos;
        self.advance();
        let body_start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == '"' {
                let text = self.input[body_start..self.pos].to_string();
                self.advance();
                return Ok((Expr::Text(text), ValueType::Text));
            }
            self.advance();
        }
        Err(self.error(start, "unterminated string literal"))
    }

    fn parse_argument(&mut self, expected: &[ValueType], what: &str) -> Result<Typed, ParseError> {
        let at = self.skip_then_pos();
        let (expr, ty) = self.parse_or()?;
        if !expected.contains(&ty) {
            let wanted: Vec<String> = expected.iter().map(|t| t.to_string()).collect();
            return Err(self.error(
                at,
                format!("{} must be {}, found {}", what, wanted.join(" or "), ty),
            ));
        }
        Ok((expr, ty))
    }

    fn check_indicator_name(&self, at: usize, name: Expr) -> Result<Expr, ParseError> {
        match name {
            Expr::Text(text) => match text.parse::<IndicatorKind>() {
                Ok(kind) => Ok(Expr::Text(kind.name().to_string())),
                Err(e) => Err(self.error(at, e.to_string())),
            },
            other => Ok(other),
        }
    }

    fn check_percentile(&self, at: usize, percentile: Expr) -> Result<Expr, ParseError> {
        let label = match &percentile {
            Expr::Text(text) => text.clone(),
            Expr::Number(n) => percentile_label(*n),
            _ => return Ok(percentile),
        };
        if PERCENTILES.iter().any(|&p| percentile_label(p) == label) {
            Ok(Expr::Text(label))
        } else {
            Err(self.error(at, format!("unknown percentile '{}'", label)))
        }
    }

    fn parse_indicator_call(&mut self) -> Result<Typed, ParseError> {
        self.expect_char('(')?;
        let name_at = self.skip_then_pos();
        let (name, _) = self.parse_argument(&[ValueType::Text], "indicator name")?;
        let name = self.check_indicator_name(name_at, name)?;
        self.expect_char(',')?;
        let (instrument, _) = self.parse_argument(&[ValueType::Text], "instrument")?;
        self.expect_char(',')?;
        let (time, _) = self.parse_argument(&[ValueType::Number], "time")?;
        self.expect_char(')')?;
        Ok((
            Expr::Indicator {
                name: Box::new(name),
                instrument: Box::new(instrument),
                time: Box::new(time),
            },
            ValueType::Number,
        ))
    }

    fn parse_quantile_call(&mut self) -> Result<Typed, ParseError> {
        self.expect_char('(')?;
        let name_at = self.skip_then_pos();
        let (name, _) = self.parse_argument(&[ValueType::Text], "indicator name")?;
        let name = self.check_indicator_name(name_at, name)?;
        self.expect_char(',')?;
        let pct_at = self.skip_then_pos();
        let (percentile, _) =
            self.parse_argument(&[ValueType::Text, ValueType::Number], "percentile")?;
        let percentile = self.check_percentile(pct_at, percentile)?;
        self.expect_char(',')?;
        let (instrument, _) = self.parse_argument(&[ValueType::Text], "instrument")?;
        self.expect_char(',')?;
        let (time, _) = self.parse_argument(&[ValueType::Number], "time")?;
        self.expect_char(')')?;
        Ok((
            Expr::IndQuantile {
                name: Box::new(name),
                percentile: Box::new(percentile),
                instrument: Box::new(instrument),
                time: Box::new(time),
            },
            ValueType::Number,
        ))
    }

    fn skip_then_pos(&mut self) -> usize {
        self.skip_whitespace();
        self.pos
    }
}

/// Parse and type-check a strategy expression.
pub fn parse(program: &str) -> Result<Expr, ParseError> {
    let source = wrap(program);
    let mut parser = Parser::new(&source);
    parser.parse_function().map_err(|e| ParseError {
        position: e
            .position
            .saturating_sub(FUNCTION_PREFIX.len())
            .min(program.len()),
        message: e.message,
    })
}
