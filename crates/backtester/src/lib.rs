//! Backtester
//!
//! Trading-window simulation of cointegrated futures pairs.
//!
//! # Features
//!
//! - **Spread Signals**: seven-band zone classification with an explicit transition table
//! - **Backtest Simulator**: lot-rounded hedged positions, proportional costs and a
//!   per-round-trip trade log
//! - **Parameter Sweep**: cost rate × open threshold × pair slice on a rayon pool with
//!   cooperative cancellation
//!
//! # Example
//!
//! ```ignore
//! use backtester::{BacktestSimulator, ParameterSweep, SimulatorConfig};
//!
//! let simulator = BacktestSimulator::new(SimulatorConfig::from_config(&config));
//! let result = simulator.run(&table, &pairs[0], start..end)?;
//! println!("Profit: {}", result.total_profit());
//!
//! let outcome = ParameterSweep::from_config(&config).run(&table, &pairs, start..end)?;
//! ```

pub mod signals;
pub mod simulator;
pub mod sweep;

// Re-exports
pub use signals::{
    effective_action, raw_actions, transition, Action, Direction, Zone, ZoneBands,
};
pub use simulator::{
    BacktestResult, BacktestSimulator, Fill, OpenPosition, SimulatorConfig, TradeRecord,
    TradeState,
};
pub use sweep::{plan_tasks, ParamKey, ParameterSweep, SweepOutcome, SweepRecord, SweepTask};
