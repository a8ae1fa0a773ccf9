//! Pairs Core
//!
//! Shared building blocks for the pairs trading pipeline:
//!
//! - [`table::PriceTable`]: positional access to daily close prices
//! - [`types`]: price rows, date windows and ranked pair candidates
//! - [`config::Config`]: layered configuration
//! - [`Error`]: the error taxonomy shared by every stage

pub mod config;
pub mod error;
pub mod table;
pub mod types;

pub use config::{Config, PairSlice, SignalMode, StrategyConfig};
pub use error::{Error, Result};
pub use table::{CumulativeReturnSeries, PriceTable};
pub use types::{to_decimal, CandidatePair, DateWindow, PriceBar};
