//! Integration tests for component interactions.
//!
//! These tests run ranking, cointegration filtering, simulation and the sweep together
//! on a synthetic market with one planted cointegrated pair.

use backtester::{BacktestSimulator, Direction, ParamKey, ParameterSweep, SimulatorConfig};
use chrono::{Duration, NaiveDate};
use pair_selector::{rank_pairs, CointegrationFilter};
use pairs_core::config::{SignalMode, SweepConfig};
use pairs_core::{Config, DateWindow, PairSlice, PriceBar, PriceTable};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const FORMATION_DAYS: usize = 120;

/// Trading-window closes of the high asset: spread at 0, 1, 2.25, 1 and 0 sigma.
const TRADING_HIGH: [f64; 10] = [
    218.3775, 218.6225, 218.9287, 218.6225, 218.3775, 218.3775, 218.3775, 218.3775,
    218.3775, 218.3775,
];
const TRADING_LOW: f64 = 104.2014;

fn shocks(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        })
        .collect()
}

fn random_walk(n: usize, seed: u64) -> Vec<f64> {
    let mut level = 100.0;
    shocks(n, seed)
        .into_iter()
        .map(|e| {
            level += e;
            level
        })
        .collect()
}

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 1).unwrap() + Duration::days(i as i64)
}

/// `cu` tracks twice `al` plus stationary noise; `zn` wanders on its own.
fn market() -> PriceTable {
    let mut al = random_walk(FORMATION_DAYS, 10);
    let mut cu: Vec<f64> = al
        .iter()
        .zip(shocks(FORMATION_DAYS, 110))
        .map(|(x, e)| 10.0 + 2.0 * x + 0.8 * e)
        .collect();
    let zn = random_walk(FORMATION_DAYS + TRADING_HIGH.len(), 3);

    cu.extend_from_slice(&TRADING_HIGH);
    al.extend(std::iter::repeat(TRADING_LOW).take(TRADING_HIGH.len()));

    let mut rows = Vec::new();
    for (asset, closes) in [("cu", &cu), ("al", &al), ("zn", &zn)] {
        for (i, close) in closes.iter().enumerate() {
            rows.push(PriceBar::new(day(i), asset, *close, 1_000.0));
        }
    }
    PriceTable::new(rows)
}

fn config() -> Config {
    let mut config = Config::default();
    config.formation = DateWindow::new(day(0) - Duration::days(1), day(FORMATION_DAYS - 1));
    config.trading = DateWindow::new(
        day(FORMATION_DAYS - 1),
        day(FORMATION_DAYS + TRADING_HIGH.len() - 1),
    );
    config.validate().unwrap();
    config
}

#[test]
fn test_windows_map_to_positions() {
    let table = market();
    let config = config();

    assert_eq!(
        table.date_index(config.formation.start, config.formation.end),
        (0, FORMATION_DAYS)
    );
    assert_eq!(
        table.date_index(config.trading.start, config.trading.end),
        (FORMATION_DAYS, FORMATION_DAYS + 10)
    );
}

#[test]
fn test_planted_pair_end_to_end() {
    let table = market();
    let config = config();
    let (fs, fe) = table.date_index(config.formation.start, config.formation.end);
    let (ts, te) = table.date_index(config.trading.start, config.trading.end);

    let ranked = rank_pairs(&table, fs..fe).unwrap();
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].key(), "cu-al");

    let pairs = CointegrationFilter::from_config(&config.selection)
        .filter(&table, &ranked, fs..fe)
        .unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].rank, 0);
    assert!((pairs[0].regression.hedge_ratio - 2.0).abs() < 0.05);

    let result = BacktestSimulator::new(SimulatorConfig::from_config(&config))
        .run(&table, &pairs[0], ts..te)
        .unwrap();

    assert_eq!(result.dates.first(), Some(&day(FORMATION_DAYS)));
    assert_eq!(result.round_trips(), 1);
    assert!(result.open_position.is_none());

    let trade = &result.trades[0];
    assert_eq!(trade.direction, Direction::Reverse);
    assert_eq!((trade.entry_day, trade.exit_day), (2, 4));
    assert_eq!(trade.y_position, Decimal::from(-4560));

    // The low leg is flat in price, so the whole profit comes from the short high leg
    let profit = trade.profit.to_f64().unwrap();
    assert!((profit - 4560.0 * (218.9287 - 218.3775)).abs() < 1e-6);
    assert!(result.is_profitable());
    assert_eq!(result.total_profit(), trade.profit);
    assert_eq!(result.y_signals, vec![0, 0, -1, -1, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_strict_mode_reproduces_idle_book() {
    let table = market();
    let mut config = config();
    config.strategy.signal_mode = SignalMode::Strict;
    let ranked = rank_pairs(&table, 0..FORMATION_DAYS).unwrap();
    let pairs = CointegrationFilter::from_config(&config.selection)
        .filter(&table, &ranked, 0..FORMATION_DAYS)
        .unwrap();

    let result = BacktestSimulator::new(SimulatorConfig::from_config(&config))
        .run(&table, &pairs[0], FORMATION_DAYS..FORMATION_DAYS + 10)
        .unwrap();
    assert_eq!(result.round_trips(), 0);
    assert_eq!(result.total_profit(), Decimal::ZERO);
}

#[test]
fn test_sweep_over_planted_pair() {
    let table = market();
    let mut config = config();
    config.sweep = SweepConfig {
        cost_rates: vec![Decimal::ZERO, Decimal::new(1, 3), Decimal::new(2, 3)],
        open_thresholds: vec![1.5],
        slices: vec![PairSlice::Head(1), PairSlice::All],
        workers: 2,
    };

    let ranked = rank_pairs(&table, 0..FORMATION_DAYS).unwrap();
    let pairs = CointegrationFilter::from_config(&config.selection)
        .filter(&table, &ranked, 0..FORMATION_DAYS)
        .unwrap();

    let outcome = ParameterSweep::from_config(&config)
        .run(&table, &pairs, FORMATION_DAYS..FORMATION_DAYS + 10)
        .unwrap();
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.failed, 0);

    let profits: Vec<Decimal> = config
        .sweep
        .cost_rates
        .iter()
        .map(|cost_rate| {
            let key = ParamKey {
                rank: 0,
                cost_rate: *cost_rate,
                open_threshold: Decimal::new(15, 1),
            };
            outcome.results[&key].total_profit()
        })
        .collect();
    assert!(profits[0] > profits[1]);
    assert!(profits[1] > profits[2]);

    let records = outcome.records();
    assert!(records.iter().all(|r| r.pair == "cu-al" && r.round_trips == 1));
}

#[test]
fn test_price_rows_from_json() {
    let json = r#"[
        {"date": "2019-01-02", "asset": "cu", "close": 48000.0, "volume": 1200.0},
        {"date": "2019-01-02", "asset": "al", "close": 13500.0, "volume": 800.0},
        {"date": "2019-01-03", "asset": "cu", "close": 48150.0, "volume": 900.0},
        {"date": "2019-01-03", "asset": "al", "close": 13480.0, "volume": 700.0}
    ]"#;

    let table = PriceTable::from_json_reader(json.as_bytes()).unwrap();
    assert_eq!(table.row_count(), 4);
    assert_eq!(table.assets(), &["cu".to_string(), "al".to_string()]);
    assert_eq!(table.prices("cu", 0..2), vec![48000.0, 48150.0]);
    assert_eq!(table.price_diffs("al", 0..2), vec![-20.0]);

    assert!(PriceTable::from_json_reader(r#"[{"date": "2019-01-02"}]"#.as_bytes()).is_err());
}
