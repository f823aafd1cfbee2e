//! Domain error types.

use std::path::PathBuf;

/// A parse error with position information for predicate compilation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let column = input
            .char_indices()
            .take_while(|(i, _)| *i < self.position)
            .count();
        let caret = " ".repeat(column) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Failure of a read-only lookup into a [`Dataset`](crate::domain::dataset::Dataset).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("unknown indicator '{name}' for instrument '{instrument}'")]
    UnknownIndicator { name: String, instrument: String },

    #[error("unknown percentile '{0}'")]
    UnknownPercentile(String),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("time index {time} out of range for '{instrument}' (length {len})")]
    TimeOutOfRange {
        instrument: String,
        time: usize,
        len: usize,
    },
}

/// Top-level error type for the backtester.
#[derive(Debug, thiserror::Error)]
pub enum BacktesterError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to read {}: {reason}", .path.display())]
    SourceRead { path: PathBuf, reason: String },

    #[error("cache integrity violation for {}: {reason}", .path.display())]
    CacheIntegrity { path: PathBuf, reason: String },

    #[error("failed to write cache entry {}: {reason}", .path.display())]
    CacheWrite { path: PathBuf, reason: String },

    #[error(transparent)]
    StrategyCompile(#[from] ParseError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("minibatch size {size} too large for series of length {len}")]
    MinibatchTooLarge { size: usize, len: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("execution {index}: found {found} signal while expecting {expected} signal")]
    ExecutionOrder {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("signal length {signals} does not match series length {series} for '{instrument}'")]
    SignalLengthMismatch {
        instrument: String,
        signals: usize,
        series: usize,
    },

    #[error("indicator '{name}' is missing for '{instrument}'")]
    MissingIndicator { instrument: String, name: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },
}

impl From<&BacktesterError> for std::process::ExitCode {
    fn from(err: &BacktesterError) -> Self {
        let code: u8 = match err {
            BacktesterError::Io(_) | BacktesterError::SourceRead { .. } => 1,
            BacktesterError::ConfigParse { .. }
            | BacktesterError::ConfigMissing { .. }
            | BacktesterError::ConfigInvalid { .. } => 2,
            BacktesterError::CacheIntegrity { .. } | BacktesterError::CacheWrite { .. } => 3,
            BacktesterError::StrategyCompile(_) => 4,
            BacktesterError::Lookup(_) | BacktesterError::MissingIndicator { .. } => 5,
            BacktesterError::MinibatchTooLarge { .. }
            | BacktesterError::InvalidParameter { .. }
            | BacktesterError::ExecutionOrder { .. }
            | BacktesterError::SignalLengthMismatch { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_context_points_at_column() {
        let err = ParseError {
            message: "expected ')'".to_string(),
            position: 4,
        };
        let ctx = err.display_with_context("a < (b");
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines[0], "a < (b");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn lookup_error_converts_into_backtester_error() {
        let err: BacktesterError = LookupError::UnknownInstrument("XYZ".into()).into();
        assert!(matches!(err, BacktesterError::Lookup(_)));
        assert_eq!(err.to_string(), "unknown instrument 'XYZ'");
    }

    #[test]
    fn execution_order_message_names_both_signals() {
        let err = BacktesterError::ExecutionOrder {
            index: 0,
            expected: "Buy".into(),
            found: "Sell".into(),
        };
        assert_eq!(
            err.to_string(),
            "execution 0: found Sell signal while expecting Buy signal"
        );
    }

    #[test]
    fn exit_codes_group_by_error_class() {
        use std::process::ExitCode;
        let code = |e: &BacktesterError| format!("{:?}", ExitCode::from(e));
        let parse = BacktesterError::from(ParseError {
            message: "x".into(),
            position: 0,
        });
        assert_eq!(code(&parse), format!("{:?}", ExitCode::from(4)));
        let batch = BacktesterError::MinibatchTooLarge { size: 10, len: 5 };
        assert_eq!(code(&batch), format!("{:?}", ExitCode::from(6)));
        let cache = BacktesterError::CacheIntegrity {
            path: PathBuf::from("x"),
            reason: "missing".into(),
        };
        assert_eq!(code(&cache), format!("{:?}", ExitCode::from(3)));
    }
}
