//! Backtest simulator.
//!
//! Converts a boolean signal sequence into an ordered list of
//! [`ExecutionData`] events under one of three exit policies. Every policy can
//! be restricted to a random contiguous minibatch of the series.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::domain::dataset::Dataset;
use crate::domain::error::{BacktesterError, LookupError};
use crate::domain::execution::{ExecutionData, cost_adjusted_buy, cost_adjusted_sell};
use crate::domain::market_timing::{TimingState, timing_states};
use crate::domain::stock_data::StockData;

const CLOSE_PRICE: &str = "ClosePrice";

/// Name of an exit policy as written in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    StopLossProfitTake,
    TimestopHit,
    MarketTiming,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionKind::StopLossProfitTake => write!(f, "StopLossProfitTake"),
            ExecutionKind::TimestopHit => write!(f, "TimestopHit"),
            ExecutionKind::MarketTiming => write!(f, "MarketTiming"),
        }
    }
}

impl FromStr for ExecutionKind {
    type Err = BacktesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "StopLossProfitTake" | "stop-loss" => Ok(ExecutionKind::StopLossProfitTake),
            "TimestopHit" | "TimeStop" | "time-stop" => Ok(ExecutionKind::TimestopHit),
            "MarketTiming" | "market-timing" => Ok(ExecutionKind::MarketTiming),
            other => Err(BacktesterError::InvalidParameter {
                name: "execution".into(),
                reason: format!("unknown execution type '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitPolicy {
    /// Exit on the first close whose cost-adjusted return reaches either bound.
    StopLossProfitTake { profit_take: f64, stop_loss: f64 },
    /// Exit a fixed number of indices after entry.
    TimeStop { time_period: usize },
    /// Enter and exit on the transitions of the market-timing state machine.
    MarketTiming,
}

impl ExitPolicy {
    pub fn kind(&self) -> ExecutionKind {
        match self {
            ExitPolicy::StopLossProfitTake { .. } => ExecutionKind::StopLossProfitTake,
            ExitPolicy::TimeStop { .. } => ExecutionKind::TimestopHit,
            ExitPolicy::MarketTiming => ExecutionKind::MarketTiming,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub policy: ExitPolicy,
    pub transaction_cost: f64,
    /// Length of the random sub-range; `None` runs over the whole series.
    pub minibatch: Option<usize>,
    /// Seed for minibatch sampling; `None` draws from system entropy.
    pub seed: Option<u64>,
}

impl BacktestConfig {
    pub fn new(policy: ExitPolicy, transaction_cost: f64) -> Self {
        Self {
            policy,
            transaction_cost,
            minibatch: None,
            seed: None,
        }
    }

    /// Parameter checks shared by every instrument of a batch.
    pub fn validate(&self) -> Result<(), BacktesterError> {
        if !(0.0..1.0).contains(&self.transaction_cost) {
            return Err(invalid(
                "transaction_cost",
                format!("must be in [0, 1), got {}", self.transaction_cost),
            ));
        }
        match self.policy {
            ExitPolicy::StopLossProfitTake {
                profit_take,
                stop_loss,
            } => {
                if profit_take.is_nan() || profit_take <= 0.0 {
                    return Err(invalid(
                        "profit_take",
                        format!("must be positive, got {profit_take}"),
                    ));
                }
                if stop_loss.is_nan() || stop_loss >= 0.0 {
                    return Err(invalid(
                        "stop_loss",
                        format!("must be negative, got {stop_loss}"),
                    ));
                }
            }
            ExitPolicy::TimeStop { time_period } => {
                if time_period == 0 {
                    return Err(invalid("time_period", "must be at least 1".to_string()));
                }
            }
            ExitPolicy::MarketTiming => {}
        }
        if self.minibatch == Some(0) {
            return Err(invalid("minibatch_size", "must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: String) -> BacktesterError {
    BacktesterError::InvalidParameter {
        name: name.to_string(),
        reason,
    }
}

/// Index range the policy runs over.
///
/// Without a minibatch this is `0..len`. With a minibatch of `k` it is a
/// uniformly drawn `start..start + k` with `start` in `[0, len - k - 1]`.
pub fn sample_range<R: Rng + ?Sized>(
    len: usize,
    minibatch: Option<usize>,
    rng: &mut R,
) -> Result<Range<usize>, BacktesterError> {
    let Some(size) = minibatch else {
        return Ok(0..len);
    };
    if len < 2 || size >= len - 1 {
        return Err(BacktesterError::MinibatchTooLarge { size, len });
    }
    let start = rng.gen_range(0..=len - size - 1);
    Ok(start..start + size)
}

/// Simulate one instrument.
///
/// `signals` must hold one value per index of `data`. An empty signal
/// sequence produces no events.
pub fn run_backtest<R: Rng + ?Sized>(
    signals: &[bool],
    instrument: &str,
    data: &StockData,
    config: &BacktestConfig,
    rng: &mut R,
) -> Result<Vec<ExecutionData>, BacktesterError> {
    config.validate()?;
    if signals.is_empty() {
        return Ok(Vec::new());
    }
    if signals.len() != data.len() {
        return Err(BacktesterError::SignalLengthMismatch {
            instrument: instrument.to_string(),
            signals: signals.len(),
            series: data.len(),
        });
    }
    let closes = data
        .series(CLOSE_PRICE)
        .filter(|closes| closes.len() == signals.len())
        .ok_or_else(|| BacktesterError::MissingIndicator {
            instrument: instrument.to_string(),
            name: CLOSE_PRICE.to_string(),
        })?;

    let range = sample_range(signals.len(), config.minibatch, rng)?;
    let market = Market {
        dates: &data.dates,
        closes,
    };

    let events = match config.policy {
        ExitPolicy::StopLossProfitTake {
            profit_take,
            stop_loss,
        } => stop_loss_profit_take(
            signals,
            &market,
            range,
            profit_take,
            stop_loss,
            config.transaction_cost,
        ),
        ExitPolicy::TimeStop { time_period } => time_stop(signals, &market, range, time_period),
        ExitPolicy::MarketTiming => market_timing(signals, &market, range),
    };

    tracing::debug!(
        instrument,
        policy = %config.policy.kind(),
        events = events.len(),
        "backtest complete"
    );
    Ok(events)
}

/// Simulate every instrument of `signals` in parallel.
///
/// Configuration errors fail the whole batch. Anything else fails only the
/// instrument it belongs to.
pub fn run_backtest_all(
    signals: &BTreeMap<String, Vec<bool>>,
    dataset: &Dataset,
    config: &BacktestConfig,
) -> Result<BTreeMap<String, Result<Vec<ExecutionData>, BacktesterError>>, BacktesterError> {
    config.validate()?;

    let entries: Vec<(u64, &String, &Vec<bool>)> = signals
        .iter()
        .enumerate()
        .map(|(ordinal, (name, values))| (ordinal as u64, name, values))
        .collect();

    let results: BTreeMap<_, _> = entries
        .par_iter()
        .map(|&(ordinal, name, values)| {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal)),
                None => StdRng::from_entropy(),
            };
            let result = dataset
                .get(name)
                .ok_or_else(|| BacktesterError::from(LookupError::UnknownInstrument(name.clone())))
                .and_then(|data| run_backtest(values, name, data, config, &mut rng));
            (name.clone(), result)
        })
        .collect();

    let failed = results.values().filter(|r| r.is_err()).count();
    tracing::info!(
        instruments = results.len(),
        failed,
        policy = %config.policy.kind(),
        "backtest batch complete"
    );
    Ok(results)
}

struct Market<'a> {
    dates: &'a [String],
    closes: &'a [f64],
}

impl Market<'_> {
    fn buy(&self, index: usize) -> ExecutionData {
        ExecutionData::buy(self.dates[index].clone(), index, self.closes[index])
    }

    fn sell(&self, index: usize) -> ExecutionData {
        ExecutionData::sell(self.dates[index].clone(), index, self.closes[index])
    }

    fn last_index(&self) -> usize {
        self.closes.len() - 1
    }
}

fn stop_loss_profit_take(
    signals: &[bool],
    market: &Market<'_>,
    range: Range<usize>,
    profit_take: f64,
    stop_loss: f64,
    transaction_cost: f64,
) -> Vec<ExecutionData> {
    let mut events = Vec::new();
    let mut cursor = range.start;

    while cursor < range.end {
        let Some(entry) = (cursor..range.end).find(|&i| signals[i]) else {
            break;
        };

        let paid = cost_adjusted_buy(market.closes[entry], transaction_cost);
        let exit = (entry + 1..market.closes.len())
            .find(|&i| {
                let ret = cost_adjusted_sell(market.closes[i], transaction_cost) / paid - 1.0;
                ret <= stop_loss || ret >= profit_take
            })
            .unwrap_or(market.last_index());

        events.push(market.buy(entry));
        events.push(market.sell(exit));
        cursor = exit + 1;
    }
    events
}

fn time_stop(
    signals: &[bool],
    market: &Market<'_>,
    range: Range<usize>,
    time_period: usize,
) -> Vec<ExecutionData> {
    let mut events = Vec::new();
    let mut cursor = range.start;

    while cursor < range.end {
        if !signals[cursor] {
            cursor += 1;
            continue;
        }

        let target = cursor.saturating_add(time_period);
        let exit = if target < range.end {
            target
        } else if target > market.last_index() {
            market.last_index()
        } else {
            range.end
        };

        events.push(market.buy(cursor));
        events.push(market.sell(exit));
        cursor = target;
    }
    events
}

fn market_timing(signals: &[bool], market: &Market<'_>, range: Range<usize>) -> Vec<ExecutionData> {
    let states = timing_states(signals);
    let mut events = Vec::new();
    let mut expecting_enter = true;

    for i in range {
        match states[i] {
            TimingState::Enter if expecting_enter => {
                events.push(market.buy(i));
                expecting_enter = false;
            }
            TimingState::Exit if !expecting_enter => {
                events.push(market.sell(i));
                expecting_enter = true;
            }
            _ => {}
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::Signal;
    use crate::domain::indicator::IndicatorSeries;

    fn stock(closes: &[f64]) -> StockData {
        let mut indicators = IndicatorSeries::new();
        indicators.insert("ClosePrice".into(), closes.to_vec());
        StockData {
            dates: (0..closes.len()).map(|i| format!("d{i}")).collect(),
            indicators,
            quantile_indicators: Default::default(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn slpt(profit_take: f64, stop_loss: f64) -> BacktestConfig {
        BacktestConfig::new(
            ExitPolicy::StopLossProfitTake {
                profit_take,
                stop_loss,
            },
            0.0,
        )
    }

    fn indices(events: &[ExecutionData]) -> Vec<(Signal, usize)> {
        events.iter().map(|e| (e.signal, e.time_index)).collect()
    }

    #[test]
    fn execution_kind_parses_names() {
        assert_eq!(
            "StopLossProfitTake".parse::<ExecutionKind>().unwrap(),
            ExecutionKind::StopLossProfitTake
        );
        assert_eq!(
            "TimestopHit".parse::<ExecutionKind>().unwrap(),
            ExecutionKind::TimestopHit
        );
        assert_eq!(
            "MarketTiming".parse::<ExecutionKind>().unwrap(),
            ExecutionKind::MarketTiming
        );
        assert!("Hold".parse::<ExecutionKind>().is_err());
        assert_eq!(ExecutionKind::TimestopHit.to_string(), "TimestopHit");
    }

    #[test]
    fn stop_loss_two_candle_example() {
        let data = stock(&[10.0, 11.0]);
        let events =
            run_backtest(&[true, true], "X", &data, &slpt(0.05, -0.05), &mut rng()).unwrap();
        assert_eq!(
            events,
            vec![
                ExecutionData::buy("d0", 0, 10.0),
                ExecutionData::sell("d1", 1, 11.0),
            ]
        );
    }

    #[test]
    fn stop_loss_hits_lower_bound() {
        let data = stock(&[10.0, 9.9, 9.0, 9.5, 12.0]);
        let signals = [true, false, false, true, false];
        let events = run_backtest(&signals, "X", &data, &slpt(0.2, -0.05), &mut rng()).unwrap();
        assert_eq!(
            indices(&events),
            vec![
                (Signal::Buy, 0),
                (Signal::Sell, 2),
                (Signal::Buy, 3),
                (Signal::Sell, 4),
            ]
        );
    }

    #[test]
    fn stop_loss_forces_exit_at_last_index() {
        let data = stock(&[10.0, 10.1, 10.2, 10.1]);
        let events = run_backtest(
            &[true, false, false, false],
            "X",
            &data,
            &slpt(0.5, -0.5),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(indices(&events), vec![(Signal::Buy, 0), (Signal::Sell, 3)]);
    }

    #[test]
    fn stop_loss_accounts_for_transaction_cost() {
        // 5% gain on the close is eaten by a 3% cost on each side.
        let data = stock(&[10.0, 10.5, 11.0]);
        let mut config = slpt(0.05, -0.5);
        config.transaction_cost = 0.03;
        let events = run_backtest(&[true, false, false], "X", &data, &config, &mut rng()).unwrap();
        assert_eq!(indices(&events), vec![(Signal::Buy, 0), (Signal::Sell, 2)]);
    }

    #[test]
    fn stop_loss_without_entry_is_empty() {
        let data = stock(&[10.0, 11.0, 12.0]);
        let events =
            run_backtest(&[false; 3], "X", &data, &slpt(0.05, -0.05), &mut rng()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn time_stop_jumps_cursor_by_period() {
        let data = stock(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let signals = [true, true, true, false, false, true, false, false];
        let config = BacktestConfig::new(ExitPolicy::TimeStop { time_period: 2 }, 0.0);
        let events = run_backtest(&signals, "X", &data, &config, &mut rng()).unwrap();
        assert_eq!(
            indices(&events),
            vec![
                (Signal::Buy, 0),
                (Signal::Sell, 2),
                (Signal::Buy, 2),
                (Signal::Sell, 4),
                (Signal::Buy, 5),
                (Signal::Sell, 7),
            ]
        );
        assert_eq!(events[5].price, 8.0);
    }

    #[test]
    fn time_stop_clamps_to_last_index() {
        let data = stock(&[1.0, 2.0, 3.0, 4.0]);
        let signals = [false, false, true, false];
        let config = BacktestConfig::new(ExitPolicy::TimeStop { time_period: 5 }, 0.0);
        let events = run_backtest(&signals, "X", &data, &config, &mut rng()).unwrap();
        assert_eq!(indices(&events), vec![(Signal::Buy, 2), (Signal::Sell, 3)]);
    }

    #[test]
    fn time_stop_with_huge_period_exits_at_last_index() {
        let data = stock(&[1.0, 2.0, 3.0, 4.0]);
        let signals = [false, true, false, false];
        let config = BacktestConfig::new(
            ExitPolicy::TimeStop {
                time_period: usize::MAX,
            },
            0.0,
        );
        let events = run_backtest(&signals, "X", &data, &config, &mut rng()).unwrap();
        assert_eq!(indices(&events), vec![(Signal::Buy, 1), (Signal::Sell, 3)]);
    }

    #[test]
    fn market_timing_two_point_example() {
        let data = stock(&[10.0, 11.0]);
        let config = BacktestConfig::new(ExitPolicy::MarketTiming, 0.0);
        let events = run_backtest(&[true, false], "X", &data, &config, &mut rng()).unwrap();
        assert_eq!(indices(&events), vec![(Signal::Buy, 0), (Signal::Sell, 1)]);
    }

    #[test]
    fn market_timing_closes_open_position() {
        let data = stock(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let config = BacktestConfig::new(ExitPolicy::MarketTiming, 0.0);
        let signals = [false, true, false, false, true, true];
        let events = run_backtest(&signals, "X", &data, &config, &mut rng()).unwrap();
        assert_eq!(
            indices(&events),
            vec![
                (Signal::Buy, 1),
                (Signal::Sell, 2),
                (Signal::Buy, 4),
                (Signal::Sell, 5),
            ]
        );
    }

    #[test]
    fn empty_signals_are_a_no_op() {
        let config = BacktestConfig {
            minibatch: Some(10),
            ..slpt(0.1, -0.1)
        };
        let events = run_backtest(&[], "X", &StockData::default(), &config, &mut rng()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let data = stock(&[1.0, 2.0, 3.0]);
        let err = run_backtest(&[true], "X", &data, &slpt(0.1, -0.1), &mut rng()).unwrap_err();
        assert!(matches!(
            err,
            BacktesterError::SignalLengthMismatch {
                signals: 1,
                series: 3,
                ..
            }
        ));
    }

    #[test]
    fn missing_close_price_is_rejected() {
        let data = StockData {
            dates: vec!["d0".into(), "d1".into()],
            ..StockData::default()
        };
        let err = run_backtest(&[true, true], "X", &data, &slpt(0.1, -0.1), &mut rng())
            .unwrap_err();
        assert!(matches!(err, BacktesterError::MissingIndicator { .. }));
    }

    #[test]
    fn sample_range_bounds() {
        let mut r = rng();
        assert_eq!(sample_range(10, None, &mut r).unwrap(), 0..10);
        for _ in 0..200 {
            let range = sample_range(10, Some(4), &mut r).unwrap();
            assert_eq!(range.len(), 4);
            assert!(range.start <= 5);
        }
    }

    #[test]
    fn sample_range_rejects_large_minibatch() {
        let mut r = rng();
        assert!(matches!(
            sample_range(10, Some(9), &mut r),
            Err(BacktesterError::MinibatchTooLarge { size: 9, len: 10 })
        ));
        assert!(sample_range(10, Some(8), &mut r).is_ok());
        assert!(sample_range(1, Some(1), &mut r).is_err());
    }

    #[test]
    fn minibatch_events_stay_inside_range_for_entries() {
        let closes: Vec<f64> = (0..50).map(|i| 10.0 + i as f64).collect();
        let data = stock(&closes);
        let mut config = BacktestConfig::new(ExitPolicy::MarketTiming, 0.0);
        config.minibatch = Some(10);
        let signals: Vec<bool> = (0..50).map(|i| i % 3 == 0).collect();
        let events = run_backtest(&signals, "X", &data, &config, &mut rng()).unwrap();
        assert!(!events.is_empty());
        let first = events[0].time_index;
        let last = events[events.len() - 1].time_index;
        assert!(last - first < 10);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(slpt(0.1, -0.1).validate().is_ok());
        assert!(slpt(0.0, -0.1).validate().is_err());
        assert!(slpt(0.1, 0.1).validate().is_err());
        assert!(
            BacktestConfig::new(ExitPolicy::TimeStop { time_period: 0 }, 0.0)
                .validate()
                .is_err()
        );
        assert!(
            BacktestConfig::new(ExitPolicy::MarketTiming, 1.0)
                .validate()
                .is_err()
        );
        assert!(
            BacktestConfig::new(ExitPolicy::MarketTiming, -0.01)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn run_all_isolates_failures_per_instrument() {
        let mut dataset = Dataset::new();
        dataset.insert("AAA", stock(&[10.0, 11.0]));
        dataset.insert("BBB", stock(&[10.0, 11.0, 12.0]));

        let mut signals = BTreeMap::new();
        signals.insert("AAA".to_string(), vec![true, true]);
        signals.insert("BBB".to_string(), vec![true]);
        signals.insert("ZZZ".to_string(), vec![true]);

        let results = run_backtest_all(&signals, &dataset, &slpt(0.05, -0.05)).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results["AAA"].as_ref().unwrap().len(), 2);
        assert!(matches!(
            results["BBB"],
            Err(BacktesterError::SignalLengthMismatch { .. })
        ));
        assert!(matches!(
            results["ZZZ"],
            Err(BacktesterError::Lookup(LookupError::UnknownInstrument(_)))
        ));
    }

    #[test]
    fn run_all_fails_fast_on_config_error() {
        let dataset = Dataset::new();
        let signals = BTreeMap::new();
        let config = BacktestConfig::new(ExitPolicy::TimeStop { time_period: 0 }, 0.0);
        assert!(run_backtest_all(&signals, &dataset, &config).is_err());
    }

    #[test]
    fn run_all_with_seed_is_deterministic() {
        let closes: Vec<f64> = (0..40).map(|i| 10.0 + (i % 7) as f64).collect();
        let mut dataset = Dataset::new();
        let mut signals = BTreeMap::new();
        for name in ["A", "B", "C"] {
            dataset.insert(name, stock(&closes));
            signals.insert(name.to_string(), (0..40).map(|i| i % 4 == 1).collect());
        }
        let config = BacktestConfig {
            minibatch: Some(12),
            seed: Some(42),
            ..BacktestConfig::new(ExitPolicy::MarketTiming, 0.001)
        };
        let first = run_backtest_all(&signals, &dataset, &config).unwrap();
        let second = run_backtest_all(&signals, &dataset, &config).unwrap();
        for name in ["A", "B", "C"] {
            assert_eq!(
                first[name].as_ref().unwrap(),
                second[name].as_ref().unwrap()
            );
        }
    }
}
