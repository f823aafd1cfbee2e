//! CLI definition and dispatch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::adapters::dataset_cache::DatasetCache;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self, BacktestConfig, ExecutionKind, ExitPolicy};
use crate::domain::config_validation::{
    DEFAULT_CACHE_DIR, DEFAULT_EXECUTION, DEFAULT_PROFIT_TAKE, DEFAULT_RETURN_TYPE,
    DEFAULT_STOP_LOSS, DEFAULT_TIME_PERIOD, DEFAULT_TRANSACTION_COST, parse_value, unknown_keys,
    validate_backtest_config, validate_dataset_config, validate_strategy_config,
};
use crate::domain::dataset::Dataset;
use crate::domain::error::BacktesterError;
use crate::domain::execution::ExecutionData;
use crate::domain::indicator::DEFAULT_WINDOW;
use crate::domain::registry::{DEFAULT_DATASET_ID, DatasetRegistry};
use crate::domain::returns::{self, ReturnKind};
use crate::domain::strategy::{Strategy, validate_strategy};
use crate::domain::universe::parse_instruments;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "backtester", about = "Strategy evaluation and backtesting over cached indicator data")]
pub struct Cli {
    /// INI configuration file; command line flags take precedence
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default, Clone)]
pub struct DatasetArgs {
    /// Directory of per-instrument CSV files
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Root directory of the indicator cache
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Indicator window
    #[arg(long)]
    pub window: Option<usize>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct BacktestArgs {
    /// StopLossProfitTake, TimestopHit or MarketTiming
    #[arg(long)]
    pub execution: Option<String>,
    #[arg(long)]
    pub transaction_cost: Option<f64>,
    #[arg(long)]
    pub profit_take: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub stop_loss: Option<f64>,
    #[arg(long)]
    pub time_period: Option<usize>,
    /// Length of a random contiguous sub-range to simulate
    #[arg(long)]
    pub minibatch: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// SimpleReturns, LogReturns or DivReturns
    #[arg(long)]
    pub return_type: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that a strategy program compiles
    Validate {
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Evaluate a strategy at every time index
    Signals {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(short, long)]
        strategy: Option<String>,
        /// Comma separated instrument names (default: all)
        #[arg(long)]
        instruments: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Simulate a strategy and print returns per instrument
    Backtest {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        params: BacktestArgs,
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(long)]
        instruments: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show instruments of a dataset with their lengths and date ranges
    Info {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Remove the cached indicator data of a dataset
    ClearCache {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
}

/// Resolved `[dataset]` and `[indicators]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSettings {
    pub path: PathBuf,
    pub cache_dir: PathBuf,
    pub window: usize,
}

/// Resolved `[backtest]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub config: BacktestConfig,
    pub return_kind: ReturnKind,
}

pub fn run(cli: Cli) -> ExitCode {
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    match cli.command {
        Command::Validate { strategy } => {
            apply_strategy_override(&mut config, strategy);
            run_validate(&config)
        }
        Command::Signals {
            dataset,
            strategy,
            instruments,
            json,
        } => {
            apply_dataset_overrides(&mut config, &dataset);
            apply_strategy_override(&mut config, strategy);
            report(run_signals(&config, instruments.as_deref(), json))
        }
        Command::Backtest {
            dataset,
            params,
            strategy,
            instruments,
            json,
        } => {
            apply_dataset_overrides(&mut config, &dataset);
            apply_backtest_overrides(&mut config, &params);
            apply_strategy_override(&mut config, strategy);
            report(run_backtest(&config, instruments.as_deref(), json))
        }
        Command::Info { dataset } => {
            apply_dataset_overrides(&mut config, &dataset);
            report(run_info(&config))
        }
        Command::ClearCache { dataset } => {
            apply_dataset_overrides(&mut config, &dataset);
            report(run_clear_cache(&config))
        }
    }
}

fn fail(e: &BacktesterError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

fn report(result: Result<(), BacktesterError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

/// Load the configuration file, or start from an empty configuration.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, BacktesterError> {
    let Some(path) = path else {
        return Ok(FileConfigAdapter::default());
    };
    eprintln!("Loading config from {}", path.display());
    let config = FileConfigAdapter::from_file(path).map_err(|e| BacktesterError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    for key in unknown_keys(&config) {
        tracing::warn!(key = %key, "ignoring unknown config key");
    }
    Ok(config)
}

pub fn apply_dataset_overrides(config: &mut FileConfigAdapter, args: &DatasetArgs) {
    if let Some(path) = &args.path {
        config.set("dataset", "path", path.display().to_string());
    }
    if let Some(cache_dir) = &args.cache_dir {
        config.set("dataset", "cache_dir", cache_dir.display().to_string());
    }
    if let Some(window) = args.window {
        config.set("indicators", "window", window.to_string());
    }
}

pub fn apply_backtest_overrides(config: &mut FileConfigAdapter, args: &BacktestArgs) {
    let overrides = [
        ("execution", args.execution.clone()),
        ("transaction_cost", args.transaction_cost.map(|v| v.to_string())),
        ("profit_take", args.profit_take.map(|v| v.to_string())),
        ("stop_loss", args.stop_loss.map(|v| v.to_string())),
        ("time_period", args.time_period.map(|v| v.to_string())),
        ("minibatch_size", args.minibatch.map(|v| v.to_string())),
        ("seed", args.seed.map(|v| v.to_string())),
        ("return_type", args.return_type.clone()),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            config.set("backtest", key, value);
        }
    }
}

pub fn apply_strategy_override(config: &mut FileConfigAdapter, strategy: Option<String>) {
    if let Some(program) = strategy {
        config.set("strategy", "program", program);
    }
}

pub fn build_dataset_settings(config: &dyn ConfigPort) -> Result<DatasetSettings, BacktesterError> {
    validate_dataset_config(config)?;
    let path = config
        .get_string("dataset", "path")
        .map(PathBuf::from)
        .ok_or_else(|| BacktesterError::ConfigMissing {
            section: "dataset".into(),
            key: "path".into(),
        })?;
    let cache_dir = config
        .get_string("dataset", "cache_dir")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string());
    let window = parse_value::<usize>(config, "indicators", "window")?.unwrap_or(DEFAULT_WINDOW);

    Ok(DatasetSettings {
        path,
        cache_dir: PathBuf::from(cache_dir),
        window,
    })
}

pub fn build_backtest_settings(config: &dyn ConfigPort) -> Result<BacktestSettings, BacktesterError> {
    validate_backtest_config(config)?;

    let execution = config
        .get_string("backtest", "execution")
        .unwrap_or_else(|| DEFAULT_EXECUTION.to_string());
    let policy = match ExecutionKind::from_str(&execution)? {
        ExecutionKind::StopLossProfitTake => ExitPolicy::StopLossProfitTake {
            profit_take: parse_value(config, "backtest", "profit_take")?
                .unwrap_or(DEFAULT_PROFIT_TAKE),
            stop_loss: parse_value(config, "backtest", "stop_loss")?.unwrap_or(DEFAULT_STOP_LOSS),
        },
        ExecutionKind::TimestopHit => ExitPolicy::TimeStop {
            time_period: parse_value(config, "backtest", "time_period")?
                .unwrap_or(DEFAULT_TIME_PERIOD),
        },
        ExecutionKind::MarketTiming => ExitPolicy::MarketTiming,
    };

    let return_type = config
        .get_string("backtest", "return_type")
        .unwrap_or_else(|| DEFAULT_RETURN_TYPE.to_string());

    Ok(BacktestSettings {
        config: BacktestConfig {
            policy,
            transaction_cost: parse_value(config, "backtest", "transaction_cost")?
                .unwrap_or(DEFAULT_TRANSACTION_COST),
            minibatch: parse_value(config, "backtest", "minibatch_size")?,
            seed: parse_value(config, "backtest", "seed")?,
        },
        return_kind: ReturnKind::from_str(&return_type)?,
    })
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, BacktesterError> {
    validate_strategy_config(config)?;
    let program = config.get_string("strategy", "program").unwrap_or_default();
    Strategy::compile(&program).map_err(|e| {
        eprintln!("{}", e.display_with_context(&program));
        BacktesterError::from(e)
    })
}

/// Load the configured dataset through the cache and make it active.
pub fn load_dataset(
    settings: &DatasetSettings,
    registry: &mut DatasetRegistry,
) -> Result<Arc<Dataset>, BacktesterError> {
    eprintln!(
        "Loading dataset {} (window {})",
        settings.path.display(),
        settings.window
    );
    let cache = DatasetCache::new(&settings.cache_dir);
    let dataset = cache.load_dataset(&settings.path, settings.window)?;
    Ok(registry.insert(DEFAULT_DATASET_ID, dataset))
}

fn select_instruments(
    dataset: Arc<Dataset>,
    instruments: Option<&str>,
) -> Result<Arc<Dataset>, BacktesterError> {
    let Some(list) = instruments else {
        return Ok(dataset);
    };
    let names = parse_instruments(list).map_err(|e| BacktesterError::InvalidParameter {
        name: "instruments".into(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(dataset.subset(&names)?))
}

fn run_validate(config: &dyn ConfigPort) -> ExitCode {
    if let Err(e) = validate_strategy_config(config) {
        return fail(&e);
    }
    let program = config.get_string("strategy", "program").unwrap_or_default();
    let validation = validate_strategy(&program);
    println!("{}", validation.diagnostic);
    if validation.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(4)
    }
}

fn run_signals(
    config: &dyn ConfigPort,
    instruments: Option<&str>,
    json: bool,
) -> Result<(), BacktesterError> {
    let settings = build_dataset_settings(config)?;
    let strategy = build_strategy(config)?;

    let mut registry = DatasetRegistry::new();
    let dataset = select_instruments(load_dataset(&settings, &mut registry)?, instruments)?;
    let signals = strategy.run_all(&dataset);

    if json {
        println!("{}", to_json(&signals)?);
    } else {
        for (name, values) in &signals {
            let hits = values.iter().filter(|&&v| v).count();
            println!("Instrument: {name}, Signals: {hits} of {}", values.len());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InstrumentReport<'a> {
    executions: &'a [ExecutionData],
    returns: &'a [f64],
}

fn run_backtest(
    config: &dyn ConfigPort,
    instruments: Option<&str>,
    json: bool,
) -> Result<(), BacktesterError> {
    let settings = build_dataset_settings(config)?;
    let backtest_settings = build_backtest_settings(config)?;
    let strategy = build_strategy(config)?;

    let mut registry = DatasetRegistry::new();
    let dataset = select_instruments(load_dataset(&settings, &mut registry)?, instruments)?;

    eprintln!(
        "Running {} backtest over {} instruments",
        backtest_settings.config.policy.kind(),
        dataset.len()
    );
    let signals = strategy.run_all(&dataset);
    let results = backtest::run_backtest_all(&signals, &dataset, &backtest_settings.config)?;

    let mut executions = BTreeMap::new();
    let mut first_error = None;
    for (name, result) in results {
        match result {
            Ok(events) => {
                executions.insert(name, events);
            }
            Err(e) => {
                eprintln!("warning: skipping {name} ({e})");
                first_error.get_or_insert(e);
            }
        }
    }
    if executions.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let all_returns = returns::returns_for_all(
        &executions,
        backtest_settings.return_kind,
        backtest_settings.config.transaction_cost,
    )?;

    if json {
        let reports: BTreeMap<&str, InstrumentReport<'_>> = executions
            .iter()
            .filter_map(|(name, events)| {
                all_returns.get(name).map(|returns| {
                    (
                        name.as_str(),
                        InstrumentReport {
                            executions: events,
                            returns,
                        },
                    )
                })
            })
            .collect();
        println!("{}", to_json(&reports)?);
    } else {
        for (name, values) in &all_returns {
            let joined: Vec<String> = values.iter().map(|r| r.to_string()).collect();
            println!("Instrument: {name}, Returns: {}", joined.join(", "));
        }
    }
    Ok(())
}

fn run_info(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let settings = build_dataset_settings(config)?;
    let mut registry = DatasetRegistry::new();
    let dataset = load_dataset(&settings, &mut registry)?;

    for (name, data) in dataset.iter() {
        match (data.dates.first(), data.dates.last()) {
            (Some(first), Some(last)) => {
                println!("{name}: {} points, {first} to {last}", data.len());
            }
            _ => println!("{name}: no data after trimming"),
        }
    }
    eprintln!("{} instruments", dataset.len());
    Ok(())
}

fn run_clear_cache(config: &dyn ConfigPort) -> Result<(), BacktesterError> {
    let settings = build_dataset_settings(config)?;
    let cache = DatasetCache::new(&settings.cache_dir);
    let target = cache.cache_dir(&settings.path);
    if cache.clear(&settings.path)? {
        println!("Removed {}", target.display());
    } else {
        println!("No cache at {}", target.display());
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, BacktesterError> {
    serde_json::to_string_pretty(value).map_err(|e| BacktesterError::Io(std::io::Error::other(e)))
}
