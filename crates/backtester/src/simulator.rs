//! Backtest simulator for one cointegrated pair over the trading window.

use chrono::NaiveDate;
use pair_selector::{CointegratedPair, Regression};
use pairs_core::config::{AccountConfig, Config, SignalMode, StrategyConfig};
use pairs_core::{to_decimal, Error, PriceTable, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use crate::signals::{effective_action, raw_actions, Action, Direction, Zone, ZoneBands};

/// Configuration for the backtest simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Starting cash, lot size and cost rate.
    pub account: AccountConfig,
    /// Band thresholds and signal handling.
    pub strategy: StrategyConfig,
}

impl SimulatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            account: config.account.clone(),
            strategy: config.strategy.clone(),
        }
    }

    /// Same settings with one sweep parameter combination applied.
    pub fn with_params(&self, cost_rate: Decimal, open_threshold: f64) -> Self {
        Self {
            account: self.account.with_cost_rate(cost_rate),
            strategy: self.strategy.with_open_threshold(open_threshold),
        }
    }
}

/// An open pair position and the bookkeeping needed to close it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub direction: Direction,
    pub entry_day: usize,
    pub entry_date: Option<NaiveDate>,
    /// Signed quantity of the high asset.
    pub y_position: Decimal,
    /// Signed quantity of the low asset.
    pub x_position: Decimal,
    pub entry_y_price: f64,
    pub entry_x_price: f64,
    /// Account value before the opening debit.
    pub entry_account: Decimal,
    /// Sum of absolute leg notionals at entry.
    pub gross_notional: Decimal,
    pub entry_cost: Decimal,
}

/// Record of one round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: uuid::Uuid,
    pub direction: Direction,
    pub entry_day: usize,
    pub exit_day: usize,
    pub entry_date: Option<NaiveDate>,
    pub exit_date: Option<NaiveDate>,
    pub y_position: Decimal,
    pub x_position: Decimal,
    pub entry_y_price: f64,
    pub entry_x_price: f64,
    pub exit_y_price: f64,
    pub exit_x_price: f64,
    pub entry_cost: Decimal,
    pub exit_cost: Decimal,
    pub gross_notional: Decimal,
    /// Account change from just before the open to just after the close.
    pub profit: Decimal,
    /// Profit over gross entry notional.
    pub return_pct: f64,
    /// Closed by the stop band rather than by reversion.
    pub stopped_out: bool,
}

/// Account and position carried from one day to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeState {
    pub account: Decimal,
    pub position: Option<OpenPosition>,
    pub total_costs: Decimal,
}

/// Where and when a leg trades.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub day: usize,
    pub date: Option<NaiveDate>,
    pub y_price: f64,
    pub x_price: f64,
}

impl TradeState {
    pub fn new(account: Decimal) -> Self {
        Self {
            account,
            position: None,
            total_costs: Decimal::ZERO,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.position.as_ref().map(|p| p.direction)
    }

    /// State after opening a hedged position.
    ///
    /// The high leg takes as many whole lots as the account affords; the low leg is
    /// sized against it through the hedge ratio. Fails with
    /// [`Error::InsufficientCapital`] when not even one high-asset lot fits.
    pub fn open(
        &self,
        fill: Fill,
        direction: Direction,
        hedge_ratio: f64,
        account: &AccountConfig,
    ) -> Result<Self> {
        let y = to_decimal(fill.y_price, "high asset price")?;
        let x = to_decimal(fill.x_price, "low asset price")?;
        let beta = to_decimal(hedge_ratio, "hedge ratio")?;
        let lot = account.lot_size;

        let lots = checked_div(checked_div(self.account, y, "account / price")?, lot, "lots")?
            .floor();
        if lots <= Decimal::ZERO {
            return Err(Error::InsufficientCapital {
                account: self.account,
                price: fill.y_price,
                lot_size: lot,
            });
        }

        let y_position = Decimal::from(direction.y_sign()) * lots * lot;
        let buy_y = y_position * y;
        let hedge = checked_div(checked_div(buy_y, beta, "hedge notional")?, x, "hedge qty")?;
        let x_position = checked_div(-hedge, lot, "hedge lots")?.floor() * lot;
        let buy_x = x_position * x;

        let gross_notional = buy_y.abs() + buy_x.abs();
        let cost = gross_notional * account.cost_rate;

        Ok(Self {
            account: self.account - buy_y - buy_x - cost,
            position: Some(OpenPosition {
                direction,
                entry_day: fill.day,
                entry_date: fill.date,
                y_position,
                x_position,
                entry_y_price: fill.y_price,
                entry_x_price: fill.x_price,
                entry_account: self.account,
                gross_notional,
                entry_cost: cost,
            }),
            total_costs: self.total_costs + cost,
        })
    }

    /// State after unwinding both legs, plus the round-trip record.
    ///
    /// Closing a flat state is an error; callers gate closes on the open direction.
    pub fn close(
        &self,
        fill: Fill,
        cost_rate: Decimal,
        stopped_out: bool,
    ) -> Result<(Self, TradeRecord)> {
        let position = self.position.as_ref().ok_or_else(|| Error::Config {
            message: format!("close requested on day {} with no open position", fill.day),
        })?;
        let y = to_decimal(fill.y_price, "high asset price")?;
        let x = to_decimal(fill.x_price, "low asset price")?;

        let buy_y = -position.y_position * y;
        let buy_x = -position.x_position * x;
        let cost = (buy_y.abs() + buy_x.abs()) * cost_rate;
        let account = self.account - buy_y - buy_x - cost;

        let profit = account - position.entry_account;
        let return_pct = if position.gross_notional.is_zero() {
            0.0
        } else {
            (profit / position.gross_notional).to_f64().unwrap_or(0.0)
        };

        let record = TradeRecord {
            id: uuid::Uuid::new_v4(),
            direction: position.direction,
            entry_day: position.entry_day,
            exit_day: fill.day,
            entry_date: position.entry_date,
            exit_date: fill.date,
            y_position: position.y_position,
            x_position: position.x_position,
            entry_y_price: position.entry_y_price,
            entry_x_price: position.entry_x_price,
            exit_y_price: fill.y_price,
            exit_x_price: fill.x_price,
            entry_cost: position.entry_cost,
            exit_cost: cost,
            gross_notional: position.gross_notional,
            profit,
            return_pct,
            stopped_out,
        };

        let next = Self {
            account,
            position: None,
            total_costs: self.total_costs + cost,
        };
        Ok((next, record))
    }
}

fn checked_div(num: Decimal, den: Decimal, what: &str) -> Result<Decimal> {
    num.checked_div(den)
        .ok_or_else(|| Error::NonFinite(format!("{} ({} / {})", what, num, den)))
}

/// Result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Pair key, `high-low`.
    pub pair: String,
    pub open_threshold: f64,
    pub cost_rate: Decimal,
    pub signal_mode: SignalMode,
    pub dates: Vec<NaiveDate>,
    /// Trading-window spread `y - hedge_ratio * x - intercept`.
    pub spread: Vec<f64>,
    pub zones: Vec<Option<Zone>>,
    /// Position sign of the high asset at the end of each day.
    pub y_signals: Vec<i8>,
    /// Position sign of the low asset at the end of each day.
    pub x_signals: Vec<i8>,
    /// Realized profit booked on each day.
    pub profits: Vec<Decimal>,
    pub cumulative_profits: Vec<Decimal>,
    /// Realized return booked on each day.
    pub returns: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub total_costs: Decimal,
    pub initial_account: Decimal,
    pub final_account: Decimal,
    /// Position still open when the window ends.
    pub open_position: Option<OpenPosition>,
    /// Opens dropped because the account could not buy one lot.
    pub skipped_opens: usize,
}

impl BacktestResult {
    pub fn total_profit(&self) -> Decimal {
        self.cumulative_profits.last().copied().unwrap_or(Decimal::ZERO)
    }

    /// Check if the backtest was profitable.
    pub fn is_profitable(&self) -> bool {
        self.total_profit() > Decimal::ZERO
    }

    pub fn round_trips(&self) -> usize {
        self.trades.len()
    }
}

/// The backtest simulator engine.
#[derive(Debug, Clone, Default)]
pub struct BacktestSimulator {
    config: SimulatorConfig,
}

impl BacktestSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Simulate a cointegrated pair over a positional trading window.
    pub fn run(
        &self,
        table: &PriceTable,
        pair: &CointegratedPair,
        trading: Range<usize>,
    ) -> Result<BacktestResult> {
        let y = table.window_prices(&pair.pair.high, trading.clone())?;
        let x = table.window_prices(&pair.pair.low, trading.clone())?;
        let dates = table.dates_in(trading);

        self.simulate(&pair.pair.key(), &y, &x, &pair.regression, dates)
    }

    /// Simulate aligned high/low price paths against a formation regression.
    ///
    /// `dates` labels the days and may be empty.
    pub fn simulate(
        &self,
        pair: &str,
        y: &[f64],
        x: &[f64],
        regression: &Regression,
        dates: &[NaiveDate],
    ) -> Result<BacktestResult> {
        if y.len() != x.len() {
            return Err(Error::MisalignedSeries {
                left: "high".to_string(),
                left_len: y.len(),
                right: "low".to_string(),
                right_len: x.len(),
            });
        }

        let strategy = &self.config.strategy;
        let account = &self.config.account;
        let bands = ZoneBands::new(
            regression.residual_mean(),
            regression.residual_std(),
            strategy,
        )?;

        let spread = regression.spread(y, x);
        let zones = bands.classify_all(&spread);
        let actions = raw_actions(&zones, strategy.stop_loss);

        let days = y.len();
        let mut y_signals = vec![0i8; days];
        let mut x_signals = vec![0i8; days];
        let mut profits = vec![Decimal::ZERO; days];
        let mut returns = vec![0.0; days];
        let mut trades = Vec::new();
        let mut skipped_opens = 0usize;
        let mut state = TradeState::new(account.initial_cash);

        for day in 0..days {
            if day > 0 {
                y_signals[day] = y_signals[day - 1];
                x_signals[day] = x_signals[day - 1];
            }

            let fill = Fill {
                day,
                date: dates.get(day).copied(),
                y_price: y[day],
                x_price: x[day],
            };

            match effective_action(actions[day], strategy.signal_mode, state.direction()) {
                Action::Hold => {}
                Action::Open(direction) => {
                    match state.open(fill, direction, regression.hedge_ratio, account) {
                        Ok(next) => {
                            state = next;
                            y_signals[day] = direction.y_sign();
                            x_signals[day] = -direction.y_sign();
                            debug!(pair, day, ?direction, account = %state.account, "Opened");
                        }
                        Err(e @ Error::InsufficientCapital { .. }) => {
                            debug!(pair, day, error = %e, "Open skipped");
                            skipped_opens += 1;
                        }
                        Err(Error::NonFinite(what)) => {
                            return Err(Error::DegenerateSeries {
                                asset: pair.to_string(),
                                reason: format!("cannot size hedge leg: {}", what),
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Action::Close(_) | Action::StopLoss(_) => {
                    let stopped_out = matches!(actions[day], Action::StopLoss(_));
                    let (next, trade) = state.close(fill, account.cost_rate, stopped_out)?;
                    debug!(pair, day, profit = %trade.profit, stopped_out, "Closed");
                    profits[day] = trade.profit;
                    returns[day] = trade.return_pct;
                    trades.push(trade);
                    state = next;
                    y_signals[day] = 0;
                    x_signals[day] = 0;
                }
            }
        }

        let cumulative_profits = profits
            .iter()
            .scan(Decimal::ZERO, |acc, p| {
                *acc += *p;
                Some(*acc)
            })
            .collect();

        Ok(BacktestResult {
            pair: pair.to_string(),
            open_threshold: strategy.open_threshold,
            cost_rate: account.cost_rate,
            signal_mode: strategy.signal_mode,
            dates: dates.iter().take(days).copied().collect(),
            spread,
            zones,
            y_signals,
            x_signals,
            profits,
            cumulative_profits,
            returns,
            trades,
            total_costs: state.total_costs,
            initial_account: account.initial_cash,
            final_account: state.account,
            open_position: state.position,
            skipped_opens,
        })
    }
}
