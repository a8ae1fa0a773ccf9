//! Parallel parameter sweep over cointegrated pairs.
//!
//! The sweep is a flat task list: every (cost rate, open threshold) combination crossed
//! with every pair selected by at least one configured slice. Overlapping slices share
//! tasks, so each key is simulated once.

use anyhow::{Context, Result};
use dashmap::DashMap;
use pair_selector::CointegratedPair;
use pairs_core::config::{validate_thresholds, Config, SweepConfig};
use pairs_core::{to_decimal, PriceTable};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::simulator::{BacktestResult, BacktestSimulator, SimulatorConfig};

/// Identifies one simulation: pair rank and parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamKey {
    /// Position of the pair in the distance ranking.
    pub rank: usize,
    pub cost_rate: Decimal,
    pub open_threshold: Decimal,
}

/// One unit of sweep work.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepTask {
    pub key: ParamKey,
    /// Index into the cointegrated pair list.
    pub pair_index: usize,
    pub open_threshold: f64,
}

/// Build the deduplicated task list.
///
/// Fails when an open threshold does not fit between the configured close and stop
/// thresholds.
pub fn plan_tasks(
    pairs: &[CointegratedPair],
    base: &SimulatorConfig,
    sweep: &SweepConfig,
) -> pairs_core::Result<Vec<SweepTask>> {
    let mut selected = BTreeSet::new();
    for slice in &sweep.slices {
        selected.extend(slice.range(pairs.len()));
    }

    let strategy = &base.strategy;
    let mut thresholds = Vec::with_capacity(sweep.open_thresholds.len());
    for open in &sweep.open_thresholds {
        validate_thresholds(strategy.close_threshold, *open, strategy.stop_threshold)?;
        thresholds.push((*open, to_decimal(*open, "open threshold")?));
    }

    let capacity = selected.len() * thresholds.len() * sweep.cost_rates.len();
    let mut tasks = Vec::with_capacity(capacity);
    for cost_rate in &sweep.cost_rates {
        for (open, open_key) in &thresholds {
            for pair_index in &selected {
                tasks.push(SweepTask {
                    key: ParamKey {
                        rank: pairs[*pair_index].rank,
                        cost_rate: *cost_rate,
                        open_threshold: *open_key,
                    },
                    pair_index: *pair_index,
                    open_threshold: *open,
                });
            }
        }
    }

    Ok(tasks)
}

/// Results of a sweep keyed by parameter tuple.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub results: BTreeMap<ParamKey, BacktestResult>,
    /// Tasks dropped because the pair lacked data or produced degenerate bands.
    pub failed: usize,
    /// Tasks never started because the sweep was cancelled.
    pub cancelled: usize,
}

/// Flat, serializable view of one sweep result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    #[serde(flatten)]
    pub key: ParamKey,
    pub pair: String,
    pub total_profit: Decimal,
    pub round_trips: usize,
    pub total_costs: Decimal,
    pub cumulative_profits: Vec<Decimal>,
}

impl SweepOutcome {
    pub fn records(&self) -> Vec<SweepRecord> {
        self.results
            .iter()
            .map(|(key, result)| SweepRecord {
                key: *key,
                pair: result.pair.clone(),
                total_profit: result.total_profit(),
                round_trips: result.round_trips(),
                total_costs: result.total_costs,
                cumulative_profits: result.cumulative_profits.clone(),
            })
            .collect()
    }
}

/// Runs the sweep on a dedicated rayon pool.
#[derive(Debug, Clone)]
pub struct ParameterSweep {
    base: SimulatorConfig,
    sweep: SweepConfig,
    cancel: Arc<AtomicBool>,
}

impl ParameterSweep {
    pub fn new(base: SimulatorConfig, sweep: SweepConfig) -> Self {
        Self {
            base,
            sweep,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(SimulatorConfig::from_config(config), config.sweep.clone())
    }

    /// Flag checked before each task starts. Setting it lets running tasks finish and
    /// skips the rest.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(
        &self,
        table: &PriceTable,
        pairs: &[CointegratedPair],
        trading: Range<usize>,
    ) -> Result<SweepOutcome> {
        let tasks = plan_tasks(pairs, &self.base, &self.sweep)
            .context("Failed to plan sweep tasks")?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.sweep.workers)
            .build()
            .context("Failed to create rayon thread pool")?;

        info!(
            tasks = tasks.len(),
            pairs = pairs.len(),
            workers = pool.current_num_threads(),
            "Starting parameter sweep"
        );

        let results: DashMap<ParamKey, BacktestResult> = DashMap::new();
        let failed = AtomicUsize::new(0);
        let cancelled = AtomicUsize::new(0);

        pool.install(|| {
            tasks.par_iter().try_for_each(|task| -> Result<()> {
                if self.cancel.load(Ordering::Relaxed) {
                    cancelled.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }

                let pair = &pairs[task.pair_index];
                let config = self
                    .base
                    .with_params(task.key.cost_rate, task.open_threshold);
                match BacktestSimulator::new(config).run(table, pair, trading.clone()) {
                    Ok(result) => {
                        results.insert(task.key, result);
                        Ok(())
                    }
                    Err(e) if e.is_pair_local() => {
                        warn!(
                            pair = %pair.pair.key(),
                            rank = task.key.rank,
                            error = %e,
                            "Skipping sweep task"
                        );
                        failed.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(e) => Err(e).with_context(|| {
                        format!("Backtest failed for pair {}", pair.pair.key())
                    }),
                }
            })
        })?;

        let outcome = SweepOutcome {
            results: results.into_iter().collect(),
            failed: failed.into_inner(),
            cancelled: cancelled.into_inner(),
        };

        info!(
            completed = outcome.results.len(),
            failed = outcome.failed,
            cancelled = outcome.cancelled,
            "Parameter sweep finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pair_selector::Regression;
    use pairs_core::{CandidatePair, PairSlice, PriceBar};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn table() -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2019, 1, 2).unwrap();
        let y = [99.0, 98.0, 99.0, 100.0];
        let rows = y
            .iter()
            .enumerate()
            .flat_map(|(i, close)| {
                let date = start + Duration::days(i as i64);
                [
                    PriceBar::new(date, "y", *close, 10.0),
                    PriceBar::new(date, "x", 100.0, 10.0),
                ]
            })
            .collect();
        PriceTable::new(rows)
    }

    fn pair(rank: usize, low: &str) -> CointegratedPair {
        CointegratedPair {
            rank,
            pair: CandidatePair::new("y", 99.0, low, 50.0, 0.01 * rank as f64),
            regression: Regression {
                intercept: 0.0,
                hedge_ratio: 1.0,
                intercept_std_error: 0.0,
                hedge_ratio_std_error: 0.0,
                r_squared: 1.0,
                nobs: 2,
                residuals: vec![1.0, -1.0],
            },
        }
    }

    fn sweep_config(slices: Vec<PairSlice>) -> SweepConfig {
        SweepConfig {
            cost_rates: vec![Decimal::ZERO, dec("0.001")],
            open_thresholds: vec![1.0, 1.5],
            slices,
            workers: 2,
        }
    }

    #[test]
    fn test_overlapping_slices_planned_once() {
        let pairs: Vec<_> = (0..5).map(|r| pair(r * 2, "x")).collect();
        let sweep = sweep_config(vec![
            PairSlice::Head(2),
            PairSlice::Head(3),
            PairSlice::Tail(1),
        ]);

        let tasks = plan_tasks(&pairs, &SimulatorConfig::default(), &sweep).unwrap();
        // Pairs 0, 1, 2 and 4, two cost rates, two thresholds
        assert_eq!(tasks.len(), 16);

        let keys: BTreeSet<ParamKey> = tasks.iter().map(|t| t.key).collect();
        assert_eq!(keys.len(), tasks.len());
        let ranks: BTreeSet<usize> = keys.iter().map(|k| k.rank).collect();
        assert_eq!(ranks.into_iter().collect::<Vec<_>>(), vec![0, 2, 4, 8]);
    }

    #[test]
    fn test_threshold_outside_bands_rejected() {
        let pairs = vec![pair(0, "x")];
        let mut sweep = sweep_config(vec![PairSlice::All]);
        sweep.open_thresholds.push(3.5);
        assert!(plan_tasks(&pairs, &SimulatorConfig::default(), &sweep).is_err());
    }

    #[test]
    fn test_sweep_results_keyed_by_params() {
        let pairs = vec![pair(0, "x"), pair(1, "absent")];
        let sweep = ParameterSweep::new(
            SimulatorConfig::default(),
            sweep_config(vec![PairSlice::All]),
        );

        let outcome = sweep.run(&table(), &pairs, 0..4).unwrap();
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.failed, 4);
        assert_eq!(outcome.cancelled, 0);

        let key = ParamKey {
            rank: 0,
            cost_rate: Decimal::ZERO,
            open_threshold: dec("1.5"),
        };
        assert_eq!(outcome.results[&key].total_profit(), dec("20400"));
        assert_eq!(outcome.results[&key].dates.len(), 4);

        // At 1.0 sigma the spread starts inside the open band and never crosses into it
        let key = ParamKey {
            open_threshold: dec("1"),
            ..key
        };
        assert_eq!(outcome.results[&key].round_trips(), 0);

        let records = outcome.records();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.pair == "y-x"));
        let json = serde_json::to_value(&records[0]).unwrap();
        assert!(json.get("rank").is_some());
        assert!(json.get("cost_rate").is_some());
    }

    #[test]
    fn test_unsizable_pair_does_not_abort_sweep() {
        let mut bad = pair(1, "x");
        bad.regression.intercept = 100.0;
        bad.regression.hedge_ratio = 1e-30;
        let pairs = vec![pair(0, "x"), bad];
        let sweep = ParameterSweep::new(
            SimulatorConfig::default(),
            sweep_config(vec![PairSlice::All]),
        );

        let outcome = sweep.run(&table(), &pairs, 0..4).unwrap();
        // The bad pair only fails where it tries to open, at the 1.5 threshold
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.results.len(), 6);

        let key = ParamKey {
            rank: 0,
            cost_rate: Decimal::ZERO,
            open_threshold: dec("1.5"),
        };
        assert_eq!(outcome.results[&key].total_profit(), dec("20400"));
        assert!(!outcome.results.contains_key(&ParamKey { rank: 1, ..key }));
    }

    #[test]
    fn test_cancelled_sweep_skips_tasks() {
        let pairs = vec![pair(0, "x")];
        let sweep = ParameterSweep::new(
            SimulatorConfig::default(),
            sweep_config(vec![PairSlice::All]),
        );
        sweep.cancel_handle().store(true, Ordering::Relaxed);

        let outcome = sweep.run(&table(), &pairs, 0..4).unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.cancelled, 4);
    }
}
