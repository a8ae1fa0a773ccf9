//! Configuration for the pairs pipeline.
//!
//! Values are layered: built-in defaults, then an optional file, then `PAIRS__*`
//! environment variables (for example `PAIRS__ACCOUNT__COST_RATE=0.001`).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::types::DateWindow;
use crate::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Window used to rank pairs and estimate the cointegration model.
    pub formation: DateWindow,
    /// Out-of-sample window the strategy is simulated over.
    pub trading: DateWindow,
    pub selection: SelectionConfig,
    pub strategy: StrategyConfig,
    pub account: AccountConfig,
    pub sweep: SweepConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            formation: DateWindow::new(ymd(2018, 1, 1), ymd(2019, 1, 1)),
            trading: DateWindow::new(ymd(2019, 1, 1), ymd(2020, 1, 1)),
            selection: SelectionConfig::default(),
            strategy: StrategyConfig::default(),
            account: AccountConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Cointegration filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Significance level for every ADF gate. 0.5 is exploratory, 0.05 is production.
    pub significance: f64,
    /// Fixed maximum ADF lag; `None` uses the sample-size rule.
    pub max_lag: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            significance: 0.5,
            max_lag: None,
        }
    }
}

/// How transitions feed the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    /// Reset the aggregate signal to hold after every evaluation, so positions never
    /// change. Kept to reproduce historical research output.
    Strict,
    /// Act on the signal computed by the transition.
    #[default]
    Corrected,
}

/// Spread band thresholds, in units of the formation residual standard deviation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub open_threshold: f64,
    pub close_threshold: f64,
    pub stop_threshold: f64,
    /// Close positions when the spread escapes into a stop band.
    pub stop_loss: bool,
    pub signal_mode: SignalMode,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            open_threshold: 1.5,
            close_threshold: 0.5,
            stop_threshold: 3.0,
            stop_loss: false,
            signal_mode: SignalMode::Corrected,
        }
    }
}

impl StrategyConfig {
    /// Same settings with a different open threshold.
    pub fn with_open_threshold(&self, open_threshold: f64) -> Self {
        Self {
            open_threshold,
            ..self.clone()
        }
    }
}

/// Simulated account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Starting cash.
    pub initial_cash: Decimal,
    /// Minimum tradeable quantity increment.
    pub lot_size: Decimal,
    /// Proportional cost charged on gross notional, per side.
    pub cost_rate: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::new(1_000_000, 0),
            lot_size: Decimal::new(10, 0),
            cost_rate: Decimal::ZERO,
        }
    }
}

impl AccountConfig {
    pub fn with_cost_rate(&self, cost_rate: Decimal) -> Self {
        Self {
            cost_rate,
            ..self.clone()
        }
    }
}

/// A sub-range of the cointegrated pair list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PairSlice {
    /// The first `n` pairs.
    Head(usize),
    /// The last `n` pairs.
    Tail(usize),
    /// Every pair.
    All,
}

impl PairSlice {
    /// Positions selected from a list of `len` items, clamped to the list.
    pub fn range(&self, len: usize) -> Range<usize> {
        match *self {
            PairSlice::Head(n) => 0..n.min(len),
            PairSlice::Tail(n) => len.saturating_sub(n)..len,
            PairSlice::All => 0..len,
        }
    }

    /// Apply the slice to a list.
    pub fn apply<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }
}

impl fmt::Display for PairSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairSlice::Head(n) => write!(f, "head:{}", n),
            PairSlice::Tail(n) => write!(f, "tail:{}", n),
            PairSlice::All => write!(f, "all"),
        }
    }
}

impl FromStr for PairSlice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "all" {
            return Ok(PairSlice::All);
        }

        let invalid = || Error::Config {
            message: format!("invalid pair slice '{}', expected head:N, tail:N or all", s),
        };
        let (kind, count) = s.split_once(':').ok_or_else(invalid)?;
        let count: usize = count.parse().map_err(|_| invalid())?;

        match kind {
            "head" => Ok(PairSlice::Head(count)),
            "tail" => Ok(PairSlice::Tail(count)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for PairSlice {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PairSlice> for String {
    fn from(value: PairSlice) -> Self {
        value.to_string()
    }
}

/// Parameter grid for the outer sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub cost_rates: Vec<Decimal>,
    pub open_thresholds: Vec<f64>,
    pub slices: Vec<PairSlice>,
    /// Worker threads; 0 lets the pool pick one per core.
    pub workers: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            // 0.000 through 0.010 in steps of 0.001
            cost_rates: (0..=10).map(|i| Decimal::new(i, 3)).collect(),
            open_thresholds: vec![1.0, 1.5, 2.0, 2.5],
            slices: vec![
                PairSlice::Head(5),
                PairSlice::Head(10),
                PairSlice::Head(20),
                PairSlice::All,
                PairSlice::Tail(5),
                PairSlice::Tail(10),
                PairSlice::Tail(20),
            ],
            workers: 0,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("PAIRS")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sweep.cost_rates")
                .with_list_parse_key("sweep.open_thresholds")
                .with_list_parse_key("sweep.slices"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            file = ?path,
            formation_start = %config.formation.start,
            trading_start = %config.trading.start,
            significance = config.selection.significance,
            signal_mode = ?config.strategy.signal_mode,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        for (name, window) in [("formation", &self.formation), ("trading", &self.trading)] {
            if window.start >= window.end {
                return Err(config_error(format!(
                    "{} window start {} must precede end {}",
                    name, window.start, window.end
                )));
            }
        }

        let alpha = self.selection.significance;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(config_error(format!(
                "significance must be in (0, 1], got {}",
                alpha
            )));
        }

        let s = &self.strategy;
        validate_thresholds(s.close_threshold, s.open_threshold, s.stop_threshold)?;
        for open in &self.sweep.open_thresholds {
            validate_thresholds(s.close_threshold, *open, s.stop_threshold)?;
        }

        let a = &self.account;
        if a.initial_cash <= Decimal::ZERO {
            return Err(config_error("initial cash must be positive".into()));
        }
        if a.lot_size <= Decimal::ZERO {
            return Err(config_error("lot size must be positive".into()));
        }
        if a.cost_rate < Decimal::ZERO || self.sweep.cost_rates.iter().any(|c| *c < Decimal::ZERO)
        {
            return Err(config_error("cost rates must not be negative".into()));
        }

        Ok(())
    }
}

/// Require `0 < close < open < stop`.
pub fn validate_thresholds(close: f64, open: f64, stop: f64) -> Result<()> {
    let ordered = close > 0.0 && close < open && open < stop;
    if !ordered || !stop.is_finite() {
        return Err(config_error(format!(
            "thresholds must satisfy 0 < close < open < stop, got close={} open={} stop={}",
            close, open, stop
        )));
    }
    Ok(())
}

fn config_error(message: String) -> Error {
    Error::Config { message }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selection.significance, 0.5);
        assert_eq!(config.account.lot_size, Decimal::new(10, 0));
        assert_eq!(config.sweep.cost_rates.len(), 11);
        assert_eq!(config.sweep.cost_rates[10], Decimal::new(1, 2));
        assert_eq!(config.strategy.signal_mode, SignalMode::Corrected);
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        assert!(validate_thresholds(0.5, 1.5, 3.0).is_ok());
        assert!(validate_thresholds(0.0, 1.5, 3.0).is_err());
        assert!(validate_thresholds(1.5, 1.5, 3.0).is_err());
        assert!(validate_thresholds(0.5, 3.5, 3.0).is_err());
        assert!(validate_thresholds(0.5, 1.5, f64::INFINITY).is_err());

        let mut config = Config::default();
        config.sweep.open_thresholds.push(0.25);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut config = Config::default();
        config.trading = DateWindow::new(ymd(2020, 1, 1), ymd(2019, 1, 1));
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_invalid_account_rejected() {
        let mut config = Config::default();
        config.account.lot_size = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sweep.cost_rates = vec![Decimal::new(-1, 3)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pair_slice_parse_and_apply() {
        let items = [0, 1, 2, 3, 4, 5, 6];
        assert_eq!("head:3".parse::<PairSlice>().unwrap(), PairSlice::Head(3));
        assert_eq!("Tail:2".parse::<PairSlice>().unwrap(), PairSlice::Tail(2));
        assert_eq!("all".parse::<PairSlice>().unwrap(), PairSlice::All);
        assert!("middle:2".parse::<PairSlice>().is_err());
        assert!("head:x".parse::<PairSlice>().is_err());

        assert_eq!(PairSlice::Head(3).apply(&items), &[0, 1, 2]);
        assert_eq!(PairSlice::Tail(2).apply(&items), &[5, 6]);
        assert_eq!(PairSlice::Head(20).apply(&items).len(), 7);
        assert_eq!(PairSlice::Tail(20).apply(&items).len(), 7);
        assert_eq!(PairSlice::All.apply(&items).len(), 7);
        assert_eq!(PairSlice::Tail(2).range(items.len()), 5..7);
        assert_eq!(PairSlice::Head(3).range(0), 0..0);
    }

    #[test]
    fn test_pair_slice_serde_as_string() {
        let json = serde_json::to_string(&PairSlice::Tail(5)).unwrap();
        assert_eq!(json, "\"tail:5\"");
        let back: PairSlice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PairSlice::Tail(5));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "pairs-config-test-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{
                "selection": { "significance": 0.05 },
                "strategy": { "open_threshold": 2.0, "signal_mode": "strict" },
                "sweep": { "slices": ["head:3", "all"], "open_thresholds": [2.0] }
            }"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.selection.significance, 0.05);
        assert_eq!(config.strategy.open_threshold, 2.0);
        assert_eq!(config.strategy.close_threshold, 0.5);
        assert_eq!(config.strategy.signal_mode, SignalMode::Strict);
        assert_eq!(config.sweep.slices, vec![PairSlice::Head(3), PairSlice::All]);
        assert_eq!(config.account.initial_cash, Decimal::new(1_000_000, 0));
    }

    #[test]
    fn test_env_override_uses_double_underscore_after_prefix() {
        std::env::set_var("PAIRS__ACCOUNT__COST_RATE", "0.003");
        std::env::set_var("PAIRS_SELECTION__SIGNIFICANCE", "0.01");
        let config = Config::load(None);
        std::env::remove_var("PAIRS__ACCOUNT__COST_RATE");
        std::env::remove_var("PAIRS_SELECTION__SIGNIFICANCE");
        let config = config.unwrap();

        let diff = (config.account.cost_rate - Decimal::new(3, 3)).abs();
        assert!(diff < Decimal::new(1, 9));
        // A single underscore after the prefix is not picked up
        assert_eq!(config.selection.significance, 0.5);
    }
}
