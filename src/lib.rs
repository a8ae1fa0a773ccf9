//! Pairs Trader: distance and cointegration pairs trading for futures
//!
//! This is the root crate that provides benchmark and integration-test access to the
//! workspace. For actual functionality, use the individual crates directly:
//!
//! - `pairs-core`: price table, configuration, error taxonomy
//! - `pair-selector`: distance ranking, ADF test, cointegration filter
//! - `backtester`: spread signals, pair simulation, parameter sweep
//! - `sweep-runner`: command-line pipeline

// Re-export for benchmarks
pub use backtester as backtest;
pub use pair_selector as selection;
pub use pairs_core as core;
